//! GLSL vertex shader generation from decoded material state.
//!
//! GameCube materials describe a fixed function vertex pipeline: per
//! channel lighting fed from vertex colors or material registers, and up
//! to eight texture coordinate generators applying 2x4 or 3x4 matrix
//! projections. [`vertex_shader_source`] emits an equivalent GLSL 330
//! vertex shader as plain text, in the pipeline's evaluation order:
//! attribute declarations, channel lighting, texture coordinate
//! generation, post matrix chaining, then the hardware's z == 0
//! coordinate clamp.
//!
//! Emission is deterministic and has no side effects beyond the returned
//! string, so generated shaders can be cached keyed on material identity.

use std::fmt::Write;

use j3d_lib::formats::mat3::{
    AttenuationFunction, ColorSource, DiffuseFunction, Material, TexCoordGen, TexGenSrc,
    TexGenType, TexMatrixProjection, TEX_MATRIX_BASE, TEX_MATRIX_IDENTITY,
};
use j3d_lib::formats::shp1::VertexAttribute;
use j3d_lib::formats::vtx1::ArrayType;

fn has_attribute(attributes: &[VertexAttribute], array_type: ArrayType) -> bool {
    attributes.iter().any(|a| a.array_type == Some(array_type))
}

fn has_tex_attribute(attributes: &[VertexAttribute], slot: usize) -> bool {
    attributes
        .iter()
        .any(|a| a.array_type.and_then(|t| t.tex_slot()) == Some(slot))
}

/// Maps a raw tex matrix id to its slot in the material's matrix array.
fn tex_matrix_slot(matrix_source: u8) -> usize {
    usize::from(matrix_source.saturating_sub(TEX_MATRIX_BASE)) / 3
}

/// Generates GLSL 330 vertex shader source for one material.
///
/// The attribute list comes from the shape the material draws, so only
/// the inputs the vertex layout actually provides are declared.
pub fn vertex_shader_source(material: &Material, attributes: &[VertexAttribute]) -> String {
    let mut out = String::with_capacity(4096);

    out.push_str("#version 330 core\n\n");

    write_attribute_inputs(&mut out, material, attributes);
    write_outputs(&mut out, material);
    write_uniforms(&mut out);

    out.push_str("void main()\n{\n");
    out.push_str("\tmat4 MVP = ProjMtx * ViewMtx * ModelMtx;\n");
    out.push_str("\tmat4 MV = ViewMtx * ModelMtx;\n");
    if has_attribute(attributes, ArrayType::Position) {
        // Models without per vertex matrix indices are rigid and use the
        // single skinning matrix bound at slot 0.
        if has_attribute(attributes, ArrayType::PositionMatrixIndex) {
            out.push_str("\tgl_Position = MVP * SkinningMtxs[RawPosMtxIndex] * vec4(RawPosition, 1);\n");
        } else {
            out.push_str("\tgl_Position = MVP * SkinningMtxs[0] * vec4(RawPosition, 1);\n");
        }
        out.push_str("\tvec4 worldPos = ModelMtx * vec4(RawPosition, 1);\n");
    }
    out.push('\n');

    // With fewer than two channel controls colors_1 is never written by
    // the channel loop, so it is filled from the vertex color or white.
    if material.channel_control_count < 2 {
        if has_attribute(attributes, ArrayType::Color1) {
            out.push_str("\tcolors_1 = RawColor1;\n");
        } else {
            out.push_str("\tcolors_1 = vec4(1, 1, 1, 1);\n");
        }
    }
    out.push('\n');

    write_channel_controls(&mut out, material, attributes);
    write_tex_gens(&mut out, material);

    out.push_str("}\n");
    out
}

fn write_attribute_inputs(out: &mut String, material: &Material, attributes: &[VertexAttribute]) {
    out.push_str("// Vertex inputs\n");
    if has_attribute(attributes, ArrayType::PositionMatrixIndex) {
        out.push_str("in int RawPosMtxIndex;\n");
    }
    if has_attribute(attributes, ArrayType::Position) {
        out.push_str("in vec3 RawPosition;\n");
    }
    if has_attribute(attributes, ArrayType::Normal) {
        out.push_str("in vec3 RawNormal;\n");
    }
    if has_attribute(attributes, ArrayType::Color0) {
        out.push_str("in vec4 RawColor0;\n");
    }
    if has_attribute(attributes, ArrayType::Color1) {
        out.push_str("in vec4 RawColor1;\n");
    }
    for i in 0..8 {
        let has_uv = has_tex_attribute(attributes, i);
        let has_matrix = material
            .tex_gens
            .get(i)
            .map_or(false, |gen| gen.matrix_source != TEX_MATRIX_IDENTITY);
        if has_uv || has_matrix {
            let components = if has_matrix { 3 } else { 2 };
            let _ = writeln!(out, "in vec{components} RawTex{i};");
        }
    }
    out.push('\n');
}

fn write_outputs(out: &mut String, material: &Material) {
    let _ = writeln!(out, "// Channel controls: {}", material.channel_control_count);
    out.push_str("out vec4 colors_0;\n");
    out.push_str("out vec4 colors_1;\n\n");

    let _ = writeln!(out, "// Tex gens: {}", material.tex_gen_count);
    for i in 0..material.tex_gen_count {
        let _ = writeln!(out, "out vec3 TexGen{i};");
    }
    out.push('\n');
}

fn write_uniforms(out: &mut String) {
    out.push_str(
        "uniform mat4 ModelMtx;\n\
         uniform mat4 ViewMtx;\n\
         uniform mat4 ProjMtx;\n\
         uniform mat4 SkinningMtxs[10];\n\
         \n\
         uniform mat4 TexMtx[10];\n\
         uniform mat4 PostMtx[20];\n\
         uniform vec4 COLOR0_Amb;\n\
         uniform vec4 COLOR0_Mat;\n\
         uniform vec4 COLOR1_Mat;\n\
         uniform vec4 COLOR1_Amb;\n\
         \n\
         struct GXLight\n\
         {\n\
         \tvec4 Position;\n\
         \tvec4 Direction;\n\
         \tvec4 Color;\n\
         \tvec4 CosAtten;\n\
         \tvec4 DistAtten;\n\
         };\n\
         \n\
         layout(std140) uniform LightBlock\n\
         {\n\
         \tGXLight Lights[8];\n\
         };\n\n",
    );
}

fn write_channel_controls(out: &mut String, material: &Material, attributes: &[VertexAttribute]) {
    out.push_str(
        "\tvec4 ambColor = vec4(1,1,1,1);\n\
         \tvec4 matColor = vec4(1,1,1,1);\n\
         \tvec4 lightAccum = vec4(0,0,0,0);\n\
         \tvec4 lightFunc;\n",
    );
    out.push_str("\tvec3 ldir; float dist; float dist2; float attn;\n");
    out.push_str("\tvec3 cosAttn; vec3 distAttn;\n");

    if has_attribute(attributes, ArrayType::Normal) {
        out.push_str("\tvec3 _norm0 = RawNormal.xyz;\n");
    } else {
        out.push_str("\tvec3 _norm0 = vec3(0.0, 0.0, 0.0);\n");
    }

    for (i, control) in material
        .channel_controls
        .iter()
        .take(usize::from(material.channel_control_count))
        .enumerate()
    {
        // Channels alternate color then alpha for colors_0 and colors_1.
        let (channel, swizzle) = match i {
            0 => ("0", ".rgb"),
            1 => ("0", ".a"),
            2 => ("1", ".rgb"),
            3 => ("1", ".a"),
            other => {
                tracing::warn!(index = other, "unsupported channel control index");
                continue;
            }
        };
        let is_alpha = i % 2 != 0;

        let amb_src = match control.ambient_source {
            ColorSource::Vertex => format!("RawColor{channel}"),
            ColorSource::Register => format!("COLOR{channel}_Amb"),
        };
        let mat_src = match control.material_source {
            ColorSource::Vertex => format!("RawColor{channel}"),
            ColorSource::Register => format!("COLOR{channel}_Mat"),
        };
        let _ = writeln!(out, "\t// Channel control {i}");
        let _ = writeln!(out, "\tambColor = {amb_src};");
        let _ = writeln!(out, "\tmatColor = {mat_src};");

        for light in 0..8 {
            if control.light_enabled(light) {
                let _ = writeln!(out, "\t// Channel {i} light {light}");
                write_light(out, control, light, swizzle, is_alpha);
            }
        }

        if control.lighting_enabled {
            out.push_str("\tvec4 illum = clamp(ambColor + lightAccum, 0, 1);\n");
            out.push_str("\tlightFunc = illum;\n");
        } else {
            out.push_str("\tlightFunc = vec4(1.0, 1.0, 1.0, 1.0);\n");
        }
        let _ = writeln!(out, "\tcolors_{channel}{swizzle} = (matColor * lightFunc){swizzle};");

        // With one or three controls the trailing alpha channel of the
        // pair is never written, so it takes the material alpha.
        if material.channel_control_count == 1 || material.channel_control_count == 3 {
            let _ = writeln!(out, "\tcolors_{channel}.a = matColor.a;");
        }
    }
}

fn write_light(
    out: &mut String,
    control: &j3d_lib::formats::mat3::ChannelControl,
    light: usize,
    swizzle: &str,
    is_alpha: bool,
) {
    match control.attenuation_function {
        AttenuationFunction::None => {
            let _ = writeln!(
                out,
                "\tldir = normalize(Lights[{light}].Position.xyz - worldPos.xyz);"
            );
            out.push_str("\tattn = 1.0;\n");
            out.push_str("\tif(length(ldir) == 0.0)\n\t\tldir = _norm0;\n");
        }
        AttenuationFunction::Spec => {
            let _ = writeln!(
                out,
                "\tldir = normalize(Lights[{light}].Position.xyz - worldPos.xyz);"
            );
            let _ = writeln!(
                out,
                "\tattn = (dot(_norm0, ldir) >= 0.0) ? max(0.0, dot(_norm0, Lights[{light}].Direction.xyz)) : 0.0;"
            );
            let _ = writeln!(out, "\tcosAttn = Lights[{light}].CosAtten.xyz;");
            let normalize = if control.diffuse_function == DiffuseFunction::None {
                ""
            } else {
                "normalize"
            };
            let _ = writeln!(out, "\tdistAttn = {normalize}(Lights[{light}].DistAtten.xyz);");
            out.push_str(
                "\tattn = max(0.0, dot(cosAttn, vec3(1.0, attn, attn*attn))) / dot(distAttn, vec3(1.0, attn, attn*attn));\n",
            );
        }
        AttenuationFunction::Spot => {
            let _ = writeln!(
                out,
                "\tldir = normalize(Lights[{light}].Position.xyz - worldPos.xyz);"
            );
            out.push_str("\tdist2 = dot(ldir, ldir);\n");
            out.push_str("\tdist = sqrt(dist2);\n");
            out.push_str("\tldir = ldir/dist;\n");
            let _ = writeln!(
                out,
                "\tattn = max(0.0, dot(ldir, Lights[{light}].Direction.xyz));"
            );
            let _ = writeln!(
                out,
                "\tattn = max(0.0, Lights[{light}].CosAtten.x + Lights[{light}].CosAtten.y*attn + Lights[{light}].CosAtten.z*attn*attn) / dot(Lights[{light}].DistAtten.xyz, vec3(1.0, dist, dist2));"
            );
        }
    }

    match control.diffuse_function {
        DiffuseFunction::None => {
            let _ = writeln!(out, "\tlightAccum{swizzle} += attn * Lights[{light}].Color;");
        }
        DiffuseFunction::Signed | DiffuseFunction::Clamp => {
            let clamp = if control.diffuse_function == DiffuseFunction::Clamp {
                "max(0.0, "
            } else {
                "("
            };
            let cast = if is_alpha { "float" } else { "vec3" };
            let _ = writeln!(
                out,
                "\tlightAccum{swizzle} += attn * {clamp}dot(ldir, _norm0)) * {cast}(Lights[{light}].Color{swizzle});"
            );
        }
    }
    out.push('\n');
}

fn tex_gen_source(gen: &TexCoordGen) -> String {
    match gen.source {
        TexGenSrc::Position => "vec4(RawPosition.xyz, 1.0)".to_string(),
        TexGenSrc::Normal => "vec4(_norm0.xyz, 1.0)".to_string(),
        TexGenSrc::Binormal => "vec4(RawBinormal.xyz, 1.0)".to_string(),
        TexGenSrc::Tangent => "vec4(RawTangent.xyz, 1.0)".to_string(),
        TexGenSrc::Color0 => "colors_0".to_string(),
        TexGenSrc::Color1 => "colors_1".to_string(),
        TexGenSrc::Tex0
        | TexGenSrc::Tex1
        | TexGenSrc::Tex2
        | TexGenSrc::Tex3
        | TexGenSrc::Tex4
        | TexGenSrc::Tex5
        | TexGenSrc::Tex6
        | TexGenSrc::Tex7 => {
            let slot = gen.source as usize - TexGenSrc::Tex0 as usize;
            format!("vec4(RawTex{slot}.xy, 1.0, 1.0)")
        }
        TexGenSrc::TexCoord0
        | TexGenSrc::TexCoord1
        | TexGenSrc::TexCoord2
        | TexGenSrc::TexCoord3
        | TexGenSrc::TexCoord4
        | TexGenSrc::TexCoord5
        | TexGenSrc::TexCoord6 => {
            let slot = gen.source as usize - TexGenSrc::TexCoord0 as usize;
            format!("vec4(TexGen{slot}.xy, 1.0, 1.0)")
        }
    }
}

fn write_tex_gens(out: &mut String, material: &Material) {
    let _ = writeln!(out, "\t// {} texture coordinate generators", material.tex_gen_count);
    out.push_str("\tvec4 coord;\n");

    for i in 0..usize::from(material.tex_gen_count) {
        let gen = material.tex_gens.get(i).copied().unwrap_or_default();
        // Scope block so per generator temporaries can be redeclared.
        out.push_str("\t{\n");

        let source = tex_gen_source(&gen);
        let _ = writeln!(out, "\t\tcoord = {source};");

        match gen.gen_type {
            TexGenType::Matrix3x4 | TexGenType::Matrix2x4 => {
                if gen.matrix_source != TEX_MATRIX_IDENTITY {
                    let projection = material
                        .tex_matrices
                        .get(tex_matrix_slot(gen.matrix_source))
                        .map_or(TexMatrixProjection::St, |m| m.projection);
                    match projection {
                        TexMatrixProjection::Stq => {
                            let _ = writeln!(
                                out,
                                "\t\tTexGen{i}.xyz = vec3(dot(coord, TexMtx[{i}][0]), dot(coord, TexMtx[{i}][1]), dot(coord, TexMtx[{i}][2]));"
                            );
                        }
                        TexMatrixProjection::St => {
                            let _ = writeln!(
                                out,
                                "\t\tTexGen{i}.xyz = vec3(dot(coord, TexMtx[{i}][0]), dot(coord, TexMtx[{i}][1]), 1);"
                            );
                        }
                    }
                } else {
                    let _ = writeln!(out, "\t\tTexGen{i} = coord.xyz;");
                }
            }
            TexGenType::Srtg => {
                let _ = writeln!(out, "\t\tTexGen{i} = vec3({source}.rg, 1);");
            }
            other => {
                tracing::warn!(gen = i, gen_type = ?other, "unsupported tex gen type");
            }
        }

        // A post matrix chains a second 3x4 transform onto the generated
        // coordinate. Files often carry post matrices without post tex
        // gens, in which case the matrix id falls back to the gen's own.
        for k in 0..material.post_tex_matrices.len() {
            let matrix_source = material
                .post_tex_gens
                .get(k)
                .or_else(|| material.tex_gens.get(k))
                .map(|gen| gen.matrix_source)
                .unwrap_or(TEX_MATRIX_BASE);
            let slot = tex_matrix_slot(matrix_source);
            let _ = writeln!(out, "\t\tvec4 P0 = PostMtx[{slot}][0];");
            let _ = writeln!(out, "\t\tvec4 P1 = PostMtx[{slot}][1];");
            let _ = writeln!(out, "\t\tvec4 P2 = PostMtx[{slot}][2];");
            let _ = writeln!(
                out,
                "\t\tTexGen{i}.xyz = vec3(dot(P0.xyz, TexGen{i}.xyz) + P0.w, dot(P1.xyz, TexGen{i}.xyz) + P1.w, dot(P2.xyz, TexGen{i}.xyz) + P2.w);"
            );
        }

        // Hardware quirk: coordinates with no projection component get
        // halved and clamped.
        let _ = writeln!(out, "\t\tif(TexGen{i}.z == 0.0)");
        let _ = writeln!(
            out,
            "\t\t\tTexGen{i}.xy = clamp(TexGen{i}.xy / 2.0, vec2(-1.0, -1.0), vec2(1.0, 1.0));"
        );
        out.push_str("\t}\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use j3d_lib::formats::mat3::ChannelControl;

    fn attribute(array_type: ArrayType) -> VertexAttribute {
        VertexAttribute {
            array_type: Some(array_type),
            data_type: 3,
        }
    }

    fn basic_material() -> Material {
        Material {
            channel_control_count: 1,
            channel_controls: vec![ChannelControl::default()],
            ..Material::default()
        }
    }

    #[test]
    fn declares_only_enabled_attributes() {
        let material = basic_material();
        let attributes = [
            attribute(ArrayType::Position),
            attribute(ArrayType::Color0),
        ];
        let source = vertex_shader_source(&material, &attributes);

        assert!(source.contains("in vec3 RawPosition;"));
        assert!(source.contains("in vec4 RawColor0;"));
        assert!(!source.contains("in vec4 RawColor1;"));
        assert!(!source.contains("in vec3 RawNormal;"));
        assert!(!source.contains("in int RawPosMtxIndex;"));
    }

    #[test]
    fn rigid_models_use_the_first_skinning_matrix() {
        let material = basic_material();
        let source = vertex_shader_source(&material, &[attribute(ArrayType::Position)]);
        assert!(source.contains("gl_Position = MVP * SkinningMtxs[0] * vec4(RawPosition, 1);"));

        let skinned = [
            attribute(ArrayType::PositionMatrixIndex),
            attribute(ArrayType::Position),
        ];
        let source = vertex_shader_source(&basic_material(), &skinned);
        assert!(source
            .contains("gl_Position = MVP * SkinningMtxs[RawPosMtxIndex] * vec4(RawPosition, 1);"));
    }

    #[test]
    fn single_channel_control_gets_the_alpha_fixup() {
        let source = vertex_shader_source(&basic_material(), &[attribute(ArrayType::Position)]);
        assert!(source.contains("colors_0.a = matColor.a;"));
        // colors_1 is never written by the single control, so it falls
        // back to white.
        assert!(source.contains("colors_1 = vec4(1, 1, 1, 1);"));
    }

    #[test]
    fn unlit_channels_pass_the_material_color_through() {
        let mut material = basic_material();
        material.channel_controls[0] = ChannelControl {
            lighting_enabled: false,
            material_source: ColorSource::Vertex,
            ..ChannelControl::default()
        };
        let attributes = [attribute(ArrayType::Position), attribute(ArrayType::Color0)];
        let source = vertex_shader_source(&material, &attributes);

        assert!(source.contains("matColor = RawColor0;"));
        assert!(source.contains("lightFunc = vec4(1.0, 1.0, 1.0, 1.0);"));
        assert!(!source.contains("vec4 illum"));
    }

    #[test]
    fn lit_channel_emits_per_light_accumulation() {
        let mut material = basic_material();
        material.channel_controls[0] = ChannelControl {
            lighting_enabled: true,
            lit_mask: 0b101,
            diffuse_function: DiffuseFunction::Clamp,
            attenuation_function: AttenuationFunction::Spot,
            ..ChannelControl::default()
        };
        let attributes = [attribute(ArrayType::Position), attribute(ArrayType::Normal)];
        let source = vertex_shader_source(&material, &attributes);

        assert!(source.contains("ldir = normalize(Lights[0].Position.xyz - worldPos.xyz);"));
        assert!(source.contains("ldir = normalize(Lights[2].Position.xyz - worldPos.xyz);"));
        assert!(!source.contains("Lights[1].Position"));
        assert!(source
            .contains("lightAccum.rgb += attn * max(0.0, dot(ldir, _norm0)) * vec3(Lights[0].Color.rgb);"));
        assert!(source.contains("vec4 illum = clamp(ambColor + lightAccum, 0, 1);"));
    }

    #[test]
    fn identity_tex_gen_passes_the_coordinate_through() {
        let mut material = basic_material();
        material.tex_gen_count = 1;
        material.tex_gens = vec![TexCoordGen {
            gen_type: TexGenType::Matrix2x4,
            source: TexGenSrc::Tex0,
            matrix_source: TEX_MATRIX_IDENTITY,
        }];
        let attributes = [attribute(ArrayType::Position), attribute(ArrayType::Tex0)];
        let source = vertex_shader_source(&material, &attributes);

        assert!(source.contains("out vec3 TexGen0;"));
        assert!(source.contains("in vec2 RawTex0;"));
        assert!(source.contains("coord = vec4(RawTex0.xy, 1.0, 1.0);"));
        assert!(source.contains("TexGen0 = coord.xyz;"));
        assert!(source.contains("if(TexGen0.z == 0.0)"));
    }

    #[test]
    fn stq_projection_emits_three_rows() {
        use j3d_lib::formats::mat3::TexMatrix;

        let mut material = basic_material();
        material.tex_gen_count = 1;
        material.tex_gens = vec![TexCoordGen {
            gen_type: TexGenType::Matrix2x4,
            source: TexGenSrc::Tex0,
            matrix_source: TEX_MATRIX_BASE,
        }];
        material.tex_matrices = vec![TexMatrix {
            projection: TexMatrixProjection::Stq,
            ..TexMatrix::default()
        }];
        let attributes = [attribute(ArrayType::Position), attribute(ArrayType::Tex0)];
        let source = vertex_shader_source(&material, &attributes);

        // A non identity matrix widens the attribute to three channels.
        assert!(source.contains("in vec3 RawTex0;"));
        assert!(source.contains(
            "TexGen0.xyz = vec3(dot(coord, TexMtx[0][0]), dot(coord, TexMtx[0][1]), dot(coord, TexMtx[0][2]));"
        ));
    }
}
