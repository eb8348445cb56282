//! Runtime model state tying decoded chunks to per frame evaluation.
//!
//! A [`Model`] owns the decoded container plus the mutable copies that
//! change every frame: the joint pose, the animated material table, and
//! the derived world and draw matrices. The decoded source tables are
//! never written after load; [`Model::tick`] rebuilds the copies from
//! them, applies every loaded animation, then recomputes the matrices.

use glam::Mat4;

use j3d_lib::formats::inf1::{Inf1, NodeKind};
use j3d_lib::formats::mat3::Mat3;
use j3d_lib::formats::shp1::Shape;
use j3d_lib::formats::tex1::Tex1;
use j3d_lib::{Bck, Bmd, Bmt, Brk};

use crate::anim::{AnimationRegistry, AnimationTrack, JointAnimation, RegisterAnimation};
use crate::shader::vertex_shader_source;
use crate::skinning::{JointPose, Skeleton};
use crate::ModelError;

/// One shape draw with the material the hierarchy bound for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    /// Logical material slot.
    pub material: u16,
    /// Logical shape slot.
    pub shape: u16,
}

/// Resolves which material each shape draws with.
///
/// The hierarchy interleaves material and shape nodes in traversal order.
/// A material node becomes the current material, and every shape node
/// after it draws with that material until the next material node. The
/// stream is already in traversal order, so a single scan with a local
/// current material binding reproduces the depth first walk.
pub fn assign_vertex_layouts(scene: &Inf1) -> Vec<DrawCall> {
    let mut calls = Vec::new();
    let mut current_material: Option<u16> = None;
    for node in &scene.nodes {
        match node.kind {
            NodeKind::Material(slot) => current_material = Some(slot),
            NodeKind::Shape(shape) => match current_material {
                Some(material) => calls.push(DrawCall { material, shape }),
                None => {
                    tracing::warn!(shape, "shape appears before any material node, skipping");
                }
            },
            NodeKind::Joint(_) => {}
        }
    }
    calls
}

type AnimationsChanged = Box<dyn FnMut(&str)>;

/// A loaded model with its per frame animated state.
pub struct Model {
    source: Bmd,
    skeleton: Skeleton,
    base_materials: Mat3,
    textures: Tex1,
    draw_calls: Vec<DrawCall>,

    // Rebuilt from the base tables on every tick.
    materials: Mat3,
    pose: Vec<JointPose>,
    world_transforms: Vec<Mat4>,
    draw_matrices: Vec<Mat4>,

    animations: AnimationRegistry,
    on_animations_changed: Option<AnimationsChanged>,
}

impl Model {
    pub fn new(source: Bmd) -> Result<Self, ModelError> {
        let skeleton = Skeleton::new(&source.joints, &source.envelopes, &source.draw_table)?;
        let draw_calls = assign_vertex_layouts(&source.scene);

        for call in &draw_calls {
            if usize::from(call.material) >= source.materials.len() {
                return Err(ModelError::InvalidIndex {
                    what: "draw call material",
                    index: usize::from(call.material),
                    count: source.materials.len(),
                });
            }
            if usize::from(call.shape) >= source.shapes.remap.len() {
                return Err(ModelError::InvalidIndex {
                    what: "draw call shape",
                    index: usize::from(call.shape),
                    count: source.shapes.remap.len(),
                });
            }
        }

        let base_materials = source.materials.clone();
        let textures = source.textures.clone();
        let materials = base_materials.clone();
        let pose = skeleton.bind_pose();
        let world_transforms = skeleton.world_transforms(&pose);
        let draw_matrices = skeleton.draw_matrices(&world_transforms);

        Ok(Self {
            source,
            skeleton,
            base_materials,
            textures,
            draw_calls,
            materials,
            pose,
            world_transforms,
            draw_matrices,
            animations: AnimationRegistry::default(),
            on_animations_changed: None,
        })
    }

    pub fn source(&self) -> &Bmd {
        &self.source
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    /// The material table with this frame's animation applied.
    pub fn materials(&self) -> &Mat3 {
        &self.materials
    }

    pub fn textures(&self) -> &Tex1 {
        &self.textures
    }

    pub fn draw_calls(&self) -> &[DrawCall] {
        &self.draw_calls
    }

    pub fn pose(&self) -> &[JointPose] {
        &self.pose
    }

    pub fn world_transforms(&self) -> &[Mat4] {
        &self.world_transforms
    }

    /// Skinning matrices in draw table order, one per draw matrix slot.
    pub fn draw_matrices(&self) -> &[Mat4] {
        &self.draw_matrices
    }

    /// The physical shape a draw call renders.
    pub fn shape(&self, call: &DrawCall) -> Option<&Shape> {
        let physical = *self.source.shapes.remap.get(usize::from(call.shape))?;
        self.source.shapes.shapes.get(usize::from(physical))
    }

    /// Generates the vertex shader for a draw call from its animated
    /// material and the shape's vertex layout.
    pub fn shader_source(&self, call: &DrawCall) -> Option<String> {
        let material = self.materials.material(usize::from(call.material))?;
        let shape = self.shape(call)?;
        Some(vertex_shader_source(material, &shape.attributes))
    }

    /// Swaps in an external material table (`bmt3` container), keeping
    /// the rest of the model. Missing sections leave the current data.
    pub fn replace_materials(&mut self, substitute: &Bmt) {
        if let Some(materials) = &substitute.materials {
            self.base_materials = materials.clone();
            self.materials = materials.clone();
        }
        if let Some(textures) = &substitute.textures {
            self.textures = textures.clone();
        }
    }

    /// Called with the animation's name after every load or unload.
    pub fn set_on_animations_changed(&mut self, callback: AnimationsChanged) {
        self.on_animations_changed = Some(callback);
    }

    pub fn animations(&self) -> &AnimationRegistry {
        &self.animations
    }

    pub fn animations_mut(&mut self) -> &mut AnimationRegistry {
        &mut self.animations
    }

    pub fn load_register_animation(&mut self, name: impl Into<String>, data: Brk) {
        let name = name.into();
        self.animations
            .insert(AnimationTrack::Register(RegisterAnimation::new(
                name.clone(),
                data.register_anim,
            )));
        self.notify_animations_changed(&name);
    }

    pub fn load_joint_animation(&mut self, name: impl Into<String>, data: Bck) {
        let name = name.into();
        self.animations
            .insert(AnimationTrack::Joint(JointAnimation::new(
                name.clone(),
                data.joint_anim,
            )));
        self.notify_animations_changed(&name);
    }

    pub fn unload_animation(&mut self, name: &str) -> Option<AnimationTrack> {
        let removed = self.animations.remove(name);
        if removed.is_some() {
            self.notify_animations_changed(name);
        }
        removed
    }

    fn notify_animations_changed(&mut self, name: &str) {
        if let Some(callback) = &mut self.on_animations_changed {
            callback(name);
        }
    }

    /// Advances playback and rebuilds the animated state for this frame.
    ///
    /// The pose resets to the bind pose and the materials to the base
    /// table before tracks apply, so a stopped animation leaves no
    /// residue from its last playing frame.
    pub fn tick(&mut self, delta_seconds: f32) {
        for track in self.animations.iter_mut() {
            track.playback_mut().tick(delta_seconds);
        }

        self.pose = self.skeleton.bind_pose();
        self.materials = self.base_materials.clone();
        for track in self.animations.iter() {
            match track {
                AnimationTrack::Register(anim) => anim.apply(&mut self.materials),
                AnimationTrack::Joint(anim) => anim.apply(&mut self.pose),
            }
        }

        self.world_transforms = self.skeleton.world_transforms(&self.pose);
        self.draw_matrices = self.skeleton.draw_matrices(&self.world_transforms);
    }
}
