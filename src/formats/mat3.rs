//! `MAT3` material decoding.
//!
//! The material chunk is the most indirected part of the container. A
//! material record is a fixed stride block of indices into roughly thirty
//! shared sub record pools located by the chunk's offset table, so two
//! materials sharing a blend mode or a TEV stage share one pool entry. On
//! top of that a remap table deduplicates whole material records: several
//! logical material slots may point at one physical record.
//!
//! Decoding resolves every index into owned values. Physical records are
//! decoded once; lookups by logical slot go through [`Mat3::material`].

use std::io::{Read, Seek, SeekFrom};

use binread::BinReaderExt;

use crate::error::Error;
use crate::section::{expect_pad_u16, expect_pad_u8, SectionTable};
use crate::strings::read_string_table;
use crate::{Color4f, DecodeOptions, Vector2, Vector3};

const CHUNK: &str = "MAT3";

const SECTION_COUNT: usize = 30;
const MATERIAL_ENTRY_SIZE: u64 = 0x14C;

// Offset table slots for the sub record pools.
const SLOT_MATERIALS: usize = 0;
const SLOT_REMAP: usize = 1;
const SLOT_NAMES: usize = 2;
const SLOT_CULL_MODE: usize = 4;
const SLOT_MATERIAL_COLORS: usize = 5;
const SLOT_CHANNEL_COUNTS: usize = 6;
const SLOT_CHANNEL_CONTROLS: usize = 7;
const SLOT_AMBIENT_COLORS: usize = 8;
const SLOT_LIGHT_COLORS: usize = 9;
const SLOT_TEX_GEN_COUNTS: usize = 10;
const SLOT_TEX_GENS: usize = 11;
const SLOT_POST_TEX_GENS: usize = 12;
const SLOT_TEX_MATRICES: usize = 13;
const SLOT_POST_TEX_MATRICES: usize = 14;
const SLOT_TEXTURE_INDICES: usize = 15;
const SLOT_TEV_ORDERS: usize = 16;
const SLOT_TEV_COLORS: usize = 17;
const SLOT_KONST_COLORS: usize = 18;
const SLOT_TEV_STAGE_COUNTS: usize = 19;
const SLOT_TEV_STAGES: usize = 20;
const SLOT_TEV_SWAP_MODES: usize = 21;
const SLOT_TEV_SWAP_TABLES: usize = 22;
const SLOT_FOG: usize = 23;
const SLOT_ALPHA_TEST: usize = 24;
const SLOT_BLEND: usize = 25;
const SLOT_Z_MODE: usize = 26;
const SLOT_Z_COMP_LOC: usize = 27;
const SLOT_DITHER: usize = 28;
const SLOT_NBT_SCALE: usize = 29;

macro_rules! gx_enum {
    ($(#[$meta:meta])* $vis:vis enum $name:ident ($what:literal, default $default:ident) {
        $($variant:ident = $value:literal),+ $(,)?
    }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        $vis enum $name {
            $($variant),+
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl $name {
            pub(crate) fn from_raw(value: u32, options: &DecodeOptions) -> Result<Self, Error> {
                match value {
                    $($value => Ok($name::$variant),)+
                    other => {
                        if options.strict {
                            return Err(Error::Unsupported {
                                chunk: CHUNK,
                                what: $what,
                                value: other,
                            });
                        }
                        tracing::warn!(what = $what, value = other, "unknown enum value, using default");
                        Ok($name::$default)
                    }
                }
            }
        }
    };
}

gx_enum! {
    pub enum CullMode ("cull mode", default Back) {
        None = 0,
        Front = 1,
        Back = 2,
        All = 3,
    }
}

gx_enum! {
    /// Where a color channel reads its material or ambient color from.
    pub enum ColorSource ("color source", default Register) {
        Register = 0,
        Vertex = 1,
    }
}

gx_enum! {
    pub enum DiffuseFunction ("diffuse function", default None) {
        None = 0,
        Signed = 1,
        Clamp = 2,
    }
}

gx_enum! {
    pub enum AttenuationFunction ("attenuation function", default None) {
        Spec = 0,
        Spot = 1,
        None = 2,
    }
}

gx_enum! {
    pub enum TexGenType ("tex gen type", default Matrix2x4) {
        Matrix3x4 = 0,
        Matrix2x4 = 1,
        Bump0 = 2,
        Bump1 = 3,
        Bump2 = 4,
        Bump3 = 5,
        Bump4 = 6,
        Bump5 = 7,
        Bump6 = 8,
        Bump7 = 9,
        Srtg = 10,
    }
}

gx_enum! {
    /// The attribute or prior coordinate a tex gen samples.
    pub enum TexGenSrc ("tex gen source", default Position) {
        Position = 0,
        Normal = 1,
        Binormal = 2,
        Tangent = 3,
        Tex0 = 4,
        Tex1 = 5,
        Tex2 = 6,
        Tex3 = 7,
        Tex4 = 8,
        Tex5 = 9,
        Tex6 = 10,
        Tex7 = 11,
        TexCoord0 = 12,
        TexCoord1 = 13,
        TexCoord2 = 14,
        TexCoord3 = 15,
        TexCoord4 = 16,
        TexCoord5 = 17,
        TexCoord6 = 18,
        Color0 = 19,
        Color1 = 20,
    }
}

gx_enum! {
    pub enum TexMatrixProjection ("tex matrix projection", default Stq) {
        Stq = 0,
        St = 1,
    }
}

/// The tex matrix id carried by a [`TexCoordGen`] when no matrix applies.
pub const TEX_MATRIX_IDENTITY: u8 = 60;

/// First dynamic tex matrix id; ids step by 3 per matrix slot.
pub const TEX_MATRIX_BASE: u8 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ZMode {
    pub enabled: bool,
    pub function: u8,
    pub update_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelControl {
    pub lighting_enabled: bool,
    pub material_source: ColorSource,
    pub lit_mask: u8,
    pub diffuse_function: DiffuseFunction,
    pub attenuation_function: AttenuationFunction,
    pub ambient_source: ColorSource,
}

impl ChannelControl {
    pub fn light_enabled(&self, light: usize) -> bool {
        self.lit_mask & (1 << light) != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TexCoordGen {
    pub gen_type: TexGenType,
    pub source: TexGenSrc,
    /// Raw matrix id, [`TEX_MATRIX_IDENTITY`] for none.
    pub matrix_source: u8,
}

impl Default for TexCoordGen {
    fn default() -> Self {
        Self {
            gen_type: TexGenType::Matrix2x4,
            source: TexGenSrc::Position,
            matrix_source: TEX_MATRIX_IDENTITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TexMatrix {
    pub projection: TexMatrixProjection,
    pub mapping: u8,
    pub center: Vector3,
    pub scale: Vector2,
    /// Rotation in degrees.
    pub rotation: f32,
    pub translation: Vector2,
    pub matrix: [[f32; 4]; 4],
}

impl Default for TexMatrix {
    fn default() -> Self {
        Self {
            projection: TexMatrixProjection::Stq,
            mapping: 0,
            center: Vector3::ZERO,
            scale: Vector2::new(1.0, 1.0),
            rotation: 0.0,
            translation: Vector2::new(0.0, 0.0),
            matrix: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }
}

/// Binds a TEV stage to a tex coordinate, texture map and color channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TevOrder {
    pub tex_coord_id: u8,
    pub tex_map: u8,
    pub channel_id: u8,
}

/// One TEV combiner stage. The combiner inputs and ops are kept raw since
/// this crate only consumes the vertex side of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TevStage {
    pub color_inputs: [u8; 4],
    pub color_op: u8,
    pub color_bias: u8,
    pub color_scale: u8,
    pub color_clamp: bool,
    pub color_reg: u8,
    pub alpha_inputs: [u8; 4],
    pub alpha_op: u8,
    pub alpha_bias: u8,
    pub alpha_scale: u8,
    pub alpha_clamp: bool,
    pub alpha_reg: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TevSwapMode {
    pub ras_sel: u8,
    pub tex_sel: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TevSwapModeTable {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FogInfo {
    pub fog_type: u8,
    pub enabled: bool,
    pub center: u16,
    pub start: f32,
    pub end: f32,
    pub near: f32,
    pub far: f32,
    pub color: Color4f,
    pub adjustment_table: [f32; 10],
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlphaTest {
    pub comp0: u8,
    pub reference0: f32,
    pub operation: u8,
    pub comp1: u8,
    pub reference1: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlendInfo {
    pub mode: u8,
    pub source_factor: u8,
    pub destination_factor: u8,
    pub logic_op: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NbtScale {
    pub unknown: u8,
    pub scale: Vector3,
}

/// One physical material record with every index resolved.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Material {
    pub flag: u8,
    pub cull_mode: CullMode,
    pub channel_control_count: u8,
    pub tex_gen_count: u8,
    pub tev_stage_count: u8,
    pub z_comp_loc: bool,
    pub z_mode: ZMode,
    pub dither: bool,
    pub material_colors: [Color4f; 2],
    pub channel_controls: Vec<ChannelControl>,
    pub ambient_colors: [Color4f; 2],
    pub light_colors: Vec<Color4f>,
    pub tex_gens: Vec<TexCoordGen>,
    pub post_tex_gens: Vec<TexCoordGen>,
    pub tex_matrices: Vec<TexMatrix>,
    pub post_tex_matrices: Vec<TexMatrix>,
    /// Raw indices into the chunk's texture remap table, -1 for unused.
    pub texture_indexes: [i16; 8],
    pub konst_colors: [Color4f; 4],
    pub konst_color_sels: [u8; 16],
    pub konst_alpha_sels: [u8; 16],
    pub tev_orders: Vec<TevOrder>,
    pub tev_colors: [Color4f; 4],
    pub tev_stages: Vec<TevStage>,
    pub tev_swap_modes: Vec<TevSwapMode>,
    pub tev_swap_tables: [TevSwapModeTable; 4],
    pub fog: FogInfo,
    pub alpha_test: AlphaTest,
    pub blend: BlendInfo,
    pub nbt_scale: NbtScale,
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mat3 {
    /// Physical material records, indexed through [`Mat3::remap`].
    pub materials: Vec<Material>,
    /// Logical slot to physical record indirection.
    pub remap: Vec<u16>,
    /// Material names by logical slot.
    pub name_table: Vec<String>,
    /// Indirection from a material's texture index to the texture chunk.
    /// The entry count is inferred from offset deltas and may carry one
    /// spurious trailing entry.
    pub texture_remap: Vec<u16>,
}

impl Mat3 {
    /// Looks up the physical material behind a logical slot.
    pub fn material(&self, logical: usize) -> Option<&Material> {
        let physical = *self.remap.get(logical)?;
        self.materials.get(usize::from(physical))
    }

    pub fn name(&self, logical: usize) -> Option<&str> {
        self.name_table.get(logical).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.remap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remap.is_empty()
    }

    pub(crate) fn read<R: Read + Seek>(
        reader: &mut R,
        chunk_start: u64,
        chunk_size: u32,
        options: &DecodeOptions,
    ) -> Result<Self, Error> {
        let count = reader.read_be::<u16>()?;
        expect_pad_u16(reader, CHUNK)?;
        let sections = SectionTable::read(reader, CHUNK, chunk_start, chunk_size, SECTION_COUNT)?;

        sections.seek_to(reader, SLOT_REMAP)?;
        let mut remap = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            remap.push(reader.read_be::<u16>()?);
        }

        sections.seek_to(reader, SLOT_NAMES)?;
        let name_table = read_string_table(reader, CHUNK)?;
        if name_table.len() != usize::from(count) {
            tracing::warn!(
                names = name_table.len(),
                materials = count,
                "material name count mismatch"
            );
        }

        let texture_remap_count = sections.entry_count(SLOT_TEXTURE_INDICES, 2);
        sections.seek_to(reader, SLOT_TEXTURE_INDICES)?;
        let mut texture_remap = Vec::with_capacity(texture_remap_count);
        for _ in 0..texture_remap_count {
            texture_remap.push(reader.read_be::<u16>()?);
        }

        let physical_count = remap.iter().copied().max().map_or(0, |max| max + 1);
        let mut materials = Vec::with_capacity(usize::from(physical_count));
        for p in 0..u64::from(physical_count) {
            reader.seek(SeekFrom::Start(
                chunk_start
                    + u64::from(sections.offset(SLOT_MATERIALS))
                    + p * MATERIAL_ENTRY_SIZE,
            ))?;
            materials.push(read_material(reader, &sections, options)?);
        }

        Ok(Mat3 {
            materials,
            remap,
            name_table,
            texture_remap,
        })
    }
}

/// Decodes one material record, resolving every pool index.
///
/// The reader must sit at the start of the record; pool reads save and
/// restore the record cursor.
fn read_material<R: Read + Seek>(
    reader: &mut R,
    sections: &SectionTable,
    options: &DecodeOptions,
) -> Result<Material, Error> {
    let flag = reader.read_be::<u8>()?;
    if flag != 1 && flag != 4 {
        if options.strict {
            return Err(Error::Unsupported {
                chunk: CHUNK,
                what: "material flag",
                value: u32::from(flag),
            });
        }
        tracing::warn!(flag, "unexpected material flag");
    }

    let cull_index = reader.read_be::<u8>()?;
    let cull_mode = match sections.read_entry(
        reader,
        SLOT_CULL_MODE,
        4,
        u32::from(cull_index),
        |r| Ok(r.read_be::<u32>()?),
    )? {
        Some(raw) => CullMode::from_raw(raw, options)?,
        None => CullMode::default(),
    };

    let channel_control_count =
        u8_entry(reader, sections, SLOT_CHANNEL_COUNTS)?.unwrap_or_default();
    let tex_gen_count = u8_entry(reader, sections, SLOT_TEX_GEN_COUNTS)?.unwrap_or_default();
    let tev_stage_count = u8_entry(reader, sections, SLOT_TEV_STAGE_COUNTS)?.unwrap_or_default();
    let z_comp_loc = u8_entry(reader, sections, SLOT_Z_COMP_LOC)?.unwrap_or_default() != 0;

    let z_mode_index = reader.read_be::<u8>()?;
    let z_mode = sections
        .read_entry(reader, SLOT_Z_MODE, 4, u32::from(z_mode_index), |r| {
            read_z_mode(r)
        })?
        .unwrap_or_default();

    let dither = u8_entry(reader, sections, SLOT_DITHER)?.unwrap_or_default() != 0;

    let mut material_colors = [Color4f::default(); 2];
    for color in material_colors.iter_mut() {
        let index = reader.read_be::<i16>()?;
        *color = required_entry(reader, sections, SLOT_MATERIAL_COLORS, 4, index, read_color32)?;
    }

    let mut channel_controls = Vec::new();
    for _ in 0..4 {
        let index = reader.read_be::<i16>()?;
        if let Some(control) =
            optional_entry(reader, sections, SLOT_CHANNEL_CONTROLS, 8, index, |r| {
                read_channel_control(r, options)
            })?
        {
            channel_controls.push(control);
        }
    }

    let mut ambient_colors = [Color4f::default(); 2];
    for color in ambient_colors.iter_mut() {
        let index = reader.read_be::<i16>()?;
        *color = required_entry(reader, sections, SLOT_AMBIENT_COLORS, 4, index, read_color32)?;
    }

    let mut light_colors = Vec::new();
    for _ in 0..8 {
        let index = reader.read_be::<i16>()?;
        if let Some(color) =
            optional_entry(reader, sections, SLOT_LIGHT_COLORS, 8, index, read_color_short)?
        {
            light_colors.push(color);
        }
    }

    let mut tex_gens = Vec::new();
    for _ in 0..8 {
        let index = reader.read_be::<i16>()?;
        if let Some(gen) = optional_entry(reader, sections, SLOT_TEX_GENS, 4, index, |r| {
            read_tex_coord_gen(r, options)
        })? {
            tex_gens.push(gen);
        }
    }

    let mut post_tex_gens = Vec::new();
    for _ in 0..8 {
        let index = reader.read_be::<i16>()?;
        let gen = required_entry(reader, sections, SLOT_POST_TEX_GENS, 4, index, |r| {
            read_tex_coord_gen(r, options)
        })?;
        post_tex_gens.push(gen);
    }

    let mut tex_matrices = Vec::new();
    for _ in 0..10 {
        let index = reader.read_be::<i16>()?;
        let matrix = required_entry(reader, sections, SLOT_TEX_MATRICES, 100, index, |r| {
            read_tex_matrix(r, options)
        })?;
        tex_matrices.push(matrix);
    }

    let mut post_tex_matrices = Vec::new();
    for _ in 0..20 {
        let index = reader.read_be::<i16>()?;
        if let Some(matrix) =
            optional_entry(reader, sections, SLOT_POST_TEX_MATRICES, 100, index, |r| {
                read_tex_matrix(r, options)
            })?
        {
            post_tex_matrices.push(matrix);
        }
    }

    let mut texture_indexes = [0i16; 8];
    for index in texture_indexes.iter_mut() {
        *index = reader.read_be::<i16>()?;
    }

    let mut konst_colors = [Color4f::default(); 4];
    for color in konst_colors.iter_mut() {
        let index = reader.read_be::<i16>()?;
        *color = required_entry(reader, sections, SLOT_KONST_COLORS, 4, index, read_color32)?;
    }

    let mut konst_color_sels = [0u8; 16];
    for sel in konst_color_sels.iter_mut() {
        *sel = reader.read_be::<u8>()?;
    }
    let mut konst_alpha_sels = [0u8; 16];
    for sel in konst_alpha_sels.iter_mut() {
        *sel = reader.read_be::<u8>()?;
    }

    let mut tev_orders = Vec::new();
    for _ in 0..16 {
        let index = reader.read_be::<i16>()?;
        if let Some(order) =
            optional_entry(reader, sections, SLOT_TEV_ORDERS, 4, index, read_tev_order)?
        {
            tev_orders.push(order);
        }
    }

    let mut tev_colors = [Color4f::default(); 4];
    for color in tev_colors.iter_mut() {
        let index = reader.read_be::<i16>()?;
        *color = required_entry(reader, sections, SLOT_TEV_COLORS, 8, index, read_color_short)?;
    }

    let mut tev_stages = Vec::new();
    for _ in 0..16 {
        let index = reader.read_be::<i16>()?;
        if let Some(stage) =
            optional_entry(reader, sections, SLOT_TEV_STAGES, 20, index, read_tev_stage)?
        {
            tev_stages.push(stage);
        }
    }

    let mut tev_swap_modes = Vec::new();
    for _ in 0..16 {
        let index = reader.read_be::<i16>()?;
        if let Some(mode) =
            optional_entry(reader, sections, SLOT_TEV_SWAP_MODES, 4, index, read_tev_swap_mode)?
        {
            tev_swap_modes.push(mode);
        }
    }

    let mut tev_swap_tables = [TevSwapModeTable::default(); 4];
    for table in tev_swap_tables.iter_mut() {
        let index = reader.read_be::<i16>()?;
        *table = required_entry(
            reader,
            sections,
            SLOT_TEV_SWAP_TABLES,
            4,
            index,
            read_tev_swap_table,
        )?;
    }

    // Twelve unused index slots.
    reader.seek(SeekFrom::Current(24))?;

    let fog_index = reader.read_be::<i16>()?;
    let fog = required_entry(reader, sections, SLOT_FOG, 44, fog_index, read_fog)?;

    let alpha_index = reader.read_be::<i16>()?;
    let alpha_test = required_entry(
        reader,
        sections,
        SLOT_ALPHA_TEST,
        8,
        alpha_index,
        read_alpha_test,
    )?;

    let blend_index = reader.read_be::<i16>()?;
    let blend = required_entry(reader, sections, SLOT_BLEND, 4, blend_index, read_blend)?;

    let nbt_index = reader.read_be::<i16>()?;
    let nbt_scale = required_entry(reader, sections, SLOT_NBT_SCALE, 16, nbt_index, read_nbt_scale)?;

    Ok(Material {
        flag,
        cull_mode,
        channel_control_count,
        tex_gen_count,
        tev_stage_count,
        z_comp_loc,
        z_mode,
        dither,
        material_colors,
        channel_controls,
        ambient_colors,
        light_colors,
        tex_gens,
        post_tex_gens,
        tex_matrices,
        post_tex_matrices,
        texture_indexes,
        konst_colors,
        konst_color_sels,
        konst_alpha_sels,
        tev_orders,
        tev_colors,
        tev_stages,
        tev_swap_modes,
        tev_swap_tables,
        fog,
        alpha_test,
        blend,
        nbt_scale,
    })
}

/// Reads a u8 pool index from the record, then the single byte entry it
/// points at.
fn u8_entry<R: Read + Seek>(
    reader: &mut R,
    sections: &SectionTable,
    slot: usize,
) -> Result<Option<u8>, Error> {
    let index = reader.read_be::<u8>()?;
    sections.read_entry(reader, slot, 1, u32::from(index), |r| Ok(r.read_be::<u8>()?))
}

/// Resolves an entry that every material carries, substituting the default
/// when the pool is absent or the index is negative.
fn required_entry<R, T, F>(
    reader: &mut R,
    sections: &SectionTable,
    slot: usize,
    entry_size: u32,
    index: i16,
    f: F,
) -> Result<T, Error>
where
    R: Read + Seek,
    T: Default,
    F: FnOnce(&mut R) -> Result<T, Error>,
{
    if index < 0 {
        return Ok(T::default());
    }
    Ok(sections
        .read_entry(reader, slot, entry_size, u32::from(index as u16), f)?
        .unwrap_or_default())
}

/// Resolves an entry that is only present when its index is non negative.
fn optional_entry<R, T, F>(
    reader: &mut R,
    sections: &SectionTable,
    slot: usize,
    entry_size: u32,
    index: i16,
    f: F,
) -> Result<Option<T>, Error>
where
    R: Read + Seek,
    F: FnOnce(&mut R) -> Result<T, Error>,
{
    if index < 0 {
        return Ok(None);
    }
    sections.read_entry(reader, slot, entry_size, u32::from(index as u16), f)
}

fn read_color32<R: Read + Seek>(reader: &mut R) -> Result<Color4f, Error> {
    Ok(Color4f::new(
        f32::from(reader.read_be::<u8>()?) / 255.0,
        f32::from(reader.read_be::<u8>()?) / 255.0,
        f32::from(reader.read_be::<u8>()?) / 255.0,
        f32::from(reader.read_be::<u8>()?) / 255.0,
    ))
}

/// TEV register colors are signed 16 bit and may exceed the 0..255 range.
fn read_color_short<R: Read + Seek>(reader: &mut R) -> Result<Color4f, Error> {
    Ok(Color4f::new(
        f32::from(reader.read_be::<i16>()?) / 255.0,
        f32::from(reader.read_be::<i16>()?) / 255.0,
        f32::from(reader.read_be::<i16>()?) / 255.0,
        f32::from(reader.read_be::<i16>()?) / 255.0,
    ))
}

fn read_z_mode<R: Read + Seek>(reader: &mut R) -> Result<ZMode, Error> {
    let z_mode = ZMode {
        enabled: reader.read_be::<u8>()? != 0,
        function: reader.read_be::<u8>()?,
        update_enabled: reader.read_be::<u8>()? != 0,
    };
    expect_pad_u8(reader, CHUNK)?;
    Ok(z_mode)
}

fn read_channel_control<R: Read + Seek>(
    reader: &mut R,
    options: &DecodeOptions,
) -> Result<ChannelControl, Error> {
    let lighting_enabled = reader.read_be::<u8>()? != 0;
    let material_source = ColorSource::from_raw(u32::from(reader.read_be::<u8>()?), options)?;
    let lit_mask = reader.read_be::<u8>()?;
    let diffuse_function = DiffuseFunction::from_raw(u32::from(reader.read_be::<u8>()?), options)?;
    let attenuation_function =
        AttenuationFunction::from_raw(u32::from(reader.read_be::<u8>()?), options)?;
    let ambient_source = ColorSource::from_raw(u32::from(reader.read_be::<u8>()?), options)?;
    expect_pad_u16(reader, CHUNK)?;
    Ok(ChannelControl {
        lighting_enabled,
        material_source,
        lit_mask,
        diffuse_function,
        attenuation_function,
        ambient_source,
    })
}

fn read_tex_coord_gen<R: Read + Seek>(
    reader: &mut R,
    options: &DecodeOptions,
) -> Result<TexCoordGen, Error> {
    let gen_type = TexGenType::from_raw(u32::from(reader.read_be::<u8>()?), options)?;
    let source = TexGenSrc::from_raw(u32::from(reader.read_be::<u8>()?), options)?;
    let matrix_source = reader.read_be::<u8>()?;
    expect_pad_u8(reader, CHUNK)?;
    Ok(TexCoordGen {
        gen_type,
        source,
        matrix_source,
    })
}

fn read_tex_matrix<R: Read + Seek>(
    reader: &mut R,
    options: &DecodeOptions,
) -> Result<TexMatrix, Error> {
    let projection = TexMatrixProjection::from_raw(u32::from(reader.read_be::<u8>()?), options)?;
    let mapping = reader.read_be::<u8>()?;
    expect_pad_u16(reader, CHUNK)?;
    let center = crate::read_vector3(reader)?;
    let scale = Vector2::new(reader.read_be::<f32>()?, reader.read_be::<f32>()?);
    let rotation = f32::from(reader.read_be::<i16>()?) * (180.0 / 32768.0);
    expect_pad_u16(reader, CHUNK)?;
    let translation = Vector2::new(reader.read_be::<f32>()?, reader.read_be::<f32>()?);
    let mut matrix = [[0.0f32; 4]; 4];
    for row in matrix.iter_mut() {
        for value in row.iter_mut() {
            *value = reader.read_be::<f32>()?;
        }
    }
    Ok(TexMatrix {
        projection,
        mapping,
        center,
        scale,
        rotation,
        translation,
        matrix,
    })
}

fn read_tev_order<R: Read + Seek>(reader: &mut R) -> Result<TevOrder, Error> {
    let order = TevOrder {
        tex_coord_id: reader.read_be::<u8>()?,
        tex_map: reader.read_be::<u8>()?,
        channel_id: reader.read_be::<u8>()?,
    };
    expect_pad_u8(reader, CHUNK)?;
    Ok(order)
}

fn read_tev_stage<R: Read + Seek>(reader: &mut R) -> Result<TevStage, Error> {
    expect_pad_u8(reader, CHUNK)?;
    let mut color_inputs = [0u8; 4];
    for input in color_inputs.iter_mut() {
        *input = reader.read_be::<u8>()?;
    }
    let color_op = reader.read_be::<u8>()?;
    let color_bias = reader.read_be::<u8>()?;
    let color_scale = reader.read_be::<u8>()?;
    let color_clamp = reader.read_be::<u8>()? != 0;
    let color_reg = reader.read_be::<u8>()?;
    let mut alpha_inputs = [0u8; 4];
    for input in alpha_inputs.iter_mut() {
        *input = reader.read_be::<u8>()?;
    }
    let alpha_op = reader.read_be::<u8>()?;
    let alpha_bias = reader.read_be::<u8>()?;
    let alpha_scale = reader.read_be::<u8>()?;
    let alpha_clamp = reader.read_be::<u8>()? != 0;
    let alpha_reg = reader.read_be::<u8>()?;
    expect_pad_u8(reader, CHUNK)?;
    Ok(TevStage {
        color_inputs,
        color_op,
        color_bias,
        color_scale,
        color_clamp,
        color_reg,
        alpha_inputs,
        alpha_op,
        alpha_bias,
        alpha_scale,
        alpha_clamp,
        alpha_reg,
    })
}

fn read_tev_swap_mode<R: Read + Seek>(reader: &mut R) -> Result<TevSwapMode, Error> {
    let mode = TevSwapMode {
        ras_sel: reader.read_be::<u8>()?,
        tex_sel: reader.read_be::<u8>()?,
    };
    expect_pad_u16(reader, CHUNK)?;
    Ok(mode)
}

fn read_tev_swap_table<R: Read + Seek>(reader: &mut R) -> Result<TevSwapModeTable, Error> {
    Ok(TevSwapModeTable {
        r: reader.read_be::<u8>()?,
        g: reader.read_be::<u8>()?,
        b: reader.read_be::<u8>()?,
        a: reader.read_be::<u8>()?,
    })
}

fn read_fog<R: Read + Seek>(reader: &mut R) -> Result<FogInfo, Error> {
    let fog_type = reader.read_be::<u8>()?;
    let enabled = reader.read_be::<u8>()? != 0;
    let center = reader.read_be::<u16>()?;
    let start = reader.read_be::<f32>()?;
    let end = reader.read_be::<f32>()?;
    let near = reader.read_be::<f32>()?;
    let far = reader.read_be::<f32>()?;
    let color = read_color32(reader)?;
    let mut adjustment_table = [0.0f32; 10];
    for value in adjustment_table.iter_mut() {
        *value = f32::from(reader.read_be::<u16>()?) / 256.0;
    }
    Ok(FogInfo {
        fog_type,
        enabled,
        center,
        start,
        end,
        near,
        far,
        color,
        adjustment_table,
    })
}

fn read_alpha_test<R: Read + Seek>(reader: &mut R) -> Result<AlphaTest, Error> {
    let comp0 = reader.read_be::<u8>()?;
    let reference0 = f32::from(reader.read_be::<u8>()?) / 255.0;
    let operation = reader.read_be::<u8>()?;
    let comp1 = reader.read_be::<u8>()?;
    let reference1 = f32::from(reader.read_be::<u8>()?) / 255.0;
    for _ in 0..3 {
        expect_pad_u8(reader, CHUNK)?;
    }
    Ok(AlphaTest {
        comp0,
        reference0,
        operation,
        comp1,
        reference1,
    })
}

fn read_blend<R: Read + Seek>(reader: &mut R) -> Result<BlendInfo, Error> {
    Ok(BlendInfo {
        mode: reader.read_be::<u8>()?,
        source_factor: reader.read_be::<u8>()?,
        destination_factor: reader.read_be::<u8>()?,
        logic_op: reader.read_be::<u8>()?,
    })
}

fn read_nbt_scale<R: Read + Seek>(reader: &mut R) -> Result<NbtScale, Error> {
    let unknown = reader.read_be::<u8>()?;
    for _ in 0..3 {
        expect_pad_u8(reader, CHUNK)?;
    }
    Ok(NbtScale {
        unknown,
        scale: crate::read_vector3(reader)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexlit::hex;
    use std::io::Cursor;

    #[test]
    fn color_short_allows_overrange_registers() {
        let mut reader = Cursor::new(hex!("00FF 0000 01FE FF01"));
        let color = read_color_short(&mut reader).unwrap();
        assert_eq!(1.0, color.r);
        assert_eq!(0.0, color.g);
        assert_eq!(2.0, color.b);
        assert_eq!(-1.0, color.a);
    }

    #[test]
    fn channel_control_decodes_fields() {
        let mut reader = Cursor::new(hex!("01 01 03 02 02 00 FFFF"));
        let control = read_channel_control(&mut reader, &DecodeOptions::default()).unwrap();
        assert!(control.lighting_enabled);
        assert_eq!(ColorSource::Vertex, control.material_source);
        assert!(control.light_enabled(0));
        assert!(control.light_enabled(1));
        assert!(!control.light_enabled(2));
        assert_eq!(DiffuseFunction::Clamp, control.diffuse_function);
        assert_eq!(AttenuationFunction::None, control.attenuation_function);
        assert_eq!(ColorSource::Register, control.ambient_source);
    }

    #[test]
    fn channel_control_bad_padding_fails() {
        let mut reader = Cursor::new(hex!("01 00 00 00 02 00 0000"));
        let result = read_channel_control(&mut reader, &DecodeOptions::default());
        assert!(matches!(result, Err(Error::InvalidPadding { .. })));
    }

    #[test]
    fn tev_stage_requires_sentinel_bytes() {
        let mut data = [0u8; 20];
        data[0] = 0xFF;
        data[19] = 0xFF;
        let stage = read_tev_stage(&mut Cursor::new(data)).unwrap();
        assert_eq!([0, 0, 0, 0], stage.color_inputs);

        let mut bad = data;
        bad[19] = 0;
        assert!(read_tev_stage(&mut Cursor::new(bad)).is_err());
    }

    #[test]
    fn unknown_enum_value_defaults_unless_strict() {
        let lenient = DecodeOptions::default();
        assert_eq!(
            CullMode::Back,
            CullMode::from_raw(9, &lenient).unwrap()
        );

        let strict = DecodeOptions { strict: true };
        assert!(matches!(
            CullMode::from_raw(9, &strict),
            Err(Error::Unsupported { .. })
        ));
    }

    #[test]
    fn shared_physical_records_decode_once() {
        // Two logical slots remapping to one physical record. Every pool
        // except the record, remap and name sections is absent, so the
        // record's indices all resolve to defaults.
        let mut data = vec![0u8; 8];
        data.extend_from_slice(&2u16.to_be_bytes());
        data.extend_from_slice(&[0xFF, 0xFF]);
        let mut offsets = [0u32; SECTION_COUNT];
        offsets[SLOT_MATERIALS] = 132;
        offsets[SLOT_REMAP] = 464;
        offsets[SLOT_NAMES] = 468;
        for offset in offsets {
            data.extend_from_slice(&offset.to_be_bytes());
        }
        // One material record: flag then u8 indices, the rest -1.
        let mut record = vec![0xFFu8; MATERIAL_ENTRY_SIZE as usize];
        record[0] = 1;
        for byte in record.iter_mut().take(8).skip(1) {
            *byte = 0;
        }
        // Konst selector blocks sit after the u8 header, the color and
        // matrix index runs: 8 + 148 bytes in.
        for byte in record.iter_mut().skip(156).take(32) {
            *byte = 0;
        }
        data.extend_from_slice(&record);
        // Remap table at 464.
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes());
        // Name table at 468.
        data.extend_from_slice(&2u16.to_be_bytes());
        data.extend_from_slice(&[0xFF, 0xFF]);
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&12u16.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&14u16.to_be_bytes());
        data.extend_from_slice(b"a\0b\0");

        let chunk_size = data.len() as u32;
        let mut reader = Cursor::new(data);
        reader.set_position(8);
        let mat3 = Mat3::read(&mut reader, 0, chunk_size, &DecodeOptions::default()).unwrap();

        assert_eq!(2, mat3.len());
        assert_eq!(1, mat3.materials.len());
        assert!(std::ptr::eq(
            mat3.material(0).unwrap(),
            mat3.material(1).unwrap()
        ));
        assert_eq!(Some("a"), mat3.name(0));
        assert_eq!(Some("b"), mat3.name(1));

        let material = mat3.material(0).unwrap();
        assert!(material.channel_controls.is_empty());
        assert_eq!(CullMode::Back, material.cull_mode);
        assert_eq!([-1i16; 8], material.texture_indexes);
        assert_eq!(8, material.post_tex_gens.len());
        assert_eq!(10, material.tex_matrices.len());
    }
}
