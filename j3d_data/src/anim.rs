//! Animation playback and curve evaluation.
//!
//! Tracks own their playback state and are evaluated against caller owned
//! copies of material or pose data, never against the decoded source
//! tables. Wall time converts to animation frames at a fixed 30 frames per
//! second, and each loop mode folds the running frame counter into the
//! track's frame range before channels are sampled.

use glam::Vec3;
use itertools::Itertools;

use j3d_lib::formats::ank1::Ank1;
use j3d_lib::formats::mat3::Mat3;
use j3d_lib::formats::trk1::{ColorTarget, Trk1};
use j3d_lib::{Color4f, Keyframe, LoopMode};

use crate::skinning::JointPose;

/// Animation frames advanced per second of wall time.
pub const FRAME_RATE: f32 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// The per track playback state machine.
#[derive(Debug, Clone)]
pub struct Playback {
    pub loop_mode: LoopMode,
    length: f32,
    elapsed: f32,
    state: PlaybackState,
}

impl Playback {
    pub fn new(loop_mode: LoopMode, length: u16) -> Self {
        Self {
            loop_mode,
            length: f32::from(length),
            elapsed: 0.0,
            state: PlaybackState::Stopped,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// Rewinds to the first frame and begins playing.
    pub fn start(&mut self) {
        self.elapsed = 0.0;
        self.state = PlaybackState::Playing;
    }

    /// Rewinds to the first frame and stops.
    pub fn stop(&mut self) {
        self.elapsed = 0.0;
        self.state = PlaybackState::Stopped;
    }

    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == PlaybackState::Paused {
            self.state = PlaybackState::Playing;
        }
    }

    /// Advances elapsed time while playing.
    pub fn tick(&mut self, delta_seconds: f32) {
        if self.state == PlaybackState::Playing {
            self.elapsed += delta_seconds;
        }
    }

    /// The current frame after loop folding.
    pub fn frame(&self) -> f32 {
        let raw = self.elapsed * FRAME_RATE;
        let length = self.length;
        if length <= 0.0 {
            return 0.0;
        }

        match self.loop_mode {
            LoopMode::Once => raw.min(length),
            LoopMode::Loop => raw.rem_euclid(length),
            LoopMode::YoYo => {
                if raw <= length {
                    raw
                } else if raw <= 2.0 * length {
                    2.0 * length - raw
                } else {
                    0.0
                }
            }
            LoopMode::YoYoLoop => {
                let folded = raw.rem_euclid(2.0 * length);
                if folded <= length {
                    folded
                } else {
                    2.0 * length - folded
                }
            }
        }
    }
}

/// Evaluates one channel at a frame time with cubic Hermite blending.
///
/// An empty channel is zero and a single key is a constant. Frames past
/// the final key hold its value rather than extrapolating.
pub fn sample(keys: &[Keyframe], frame: f32) -> f32 {
    let (first, last) = match (keys.first(), keys.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return 0.0,
    };
    if keys.len() == 1 {
        return first.value;
    }
    if frame <= first.time {
        return first.value;
    }
    if frame >= last.time {
        return last.value;
    }

    let mut upper = 1;
    while keys[upper].time < frame {
        upper += 1;
    }
    let k0 = &keys[upper - 1];
    let k1 = &keys[upper];

    // Tangents scale by the key time delta before blending.
    let delta = k1.time - k0.time;
    let t = (frame - k0.time) / delta;
    hermite(
        k0.value,
        k1.value,
        k0.tangent_out * delta,
        k1.tangent_in * delta,
        t,
    )
}

fn hermite(v0: f32, v1: f32, m0: f32, m1: f32, t: f32) -> f32 {
    let t2 = t * t;
    let t3 = t2 * t;
    (2.0 * t3 - 3.0 * t2 + 1.0) * v0
        + (t3 - 2.0 * t2 + t) * m0
        + (-2.0 * t3 + 3.0 * t2) * v1
        + (t3 - t2) * m1
}

fn sample_color(target: &ColorTarget, frame: f32) -> Color4f {
    Color4f::new(
        sample(&target.channels[0], frame),
        sample(&target.channels[1], frame),
        sample(&target.channels[2], frame),
        sample(&target.channels[3], frame),
    )
}

/// A TEV register color animation bound to materials by name.
#[derive(Debug, Clone)]
pub struct RegisterAnimation {
    pub name: String,
    pub data: Trk1,
    pub playback: Playback,
}

impl RegisterAnimation {
    pub fn new(name: impl Into<String>, data: Trk1) -> Self {
        let playback = Playback::new(data.loop_mode, data.length);
        Self {
            name: name.into(),
            data,
            playback,
        }
    }

    /// Writes the sampled register colors into an animated material copy.
    pub fn apply(&self, materials: &mut Mat3) {
        let frame = self.playback.frame();
        for target in &self.data.register_targets {
            let register = usize::from(target.register_index);
            if let Some(material) = lookup_material(materials, &target.material_name) {
                material.tev_colors[register % 4] = sample_color(target, frame);
            }
        }
        for target in &self.data.konst_targets {
            let register = usize::from(target.register_index);
            if let Some(material) = lookup_material(materials, &target.material_name) {
                material.konst_colors[register % 4] = sample_color(target, frame);
            }
        }
    }
}

fn lookup_material<'a>(
    materials: &'a mut Mat3,
    name: &str,
) -> Option<&'a mut j3d_lib::formats::mat3::Material> {
    let logical = materials.name_table.iter().position(|n| n == name);
    let Some(logical) = logical else {
        tracing::warn!(material = name, "animation targets a material not in the model");
        return None;
    };
    let physical = usize::from(*materials.remap.get(logical)?);
    materials.materials.get_mut(physical)
}

/// A joint pose animation applied by skeleton order.
#[derive(Debug, Clone)]
pub struct JointAnimation {
    pub name: String,
    pub data: Ank1,
    pub playback: Playback,
}

impl JointAnimation {
    pub fn new(name: impl Into<String>, data: Ank1) -> Self {
        let playback = Playback::new(data.loop_mode, data.length);
        Self {
            name: name.into(),
            data,
            playback,
        }
    }

    /// Overwrites a pose copy with the sampled scale, rotation and
    /// translation for every animated joint.
    pub fn apply(&self, poses: &mut [JointPose]) {
        let frame = self.playback.frame();
        if self.data.tracks.len() > poses.len() {
            tracing::warn!(
                tracks = self.data.tracks.len(),
                joints = poses.len(),
                "animation has more tracks than the skeleton has joints"
            );
        }
        for (track, pose) in self.data.tracks.iter().zip(poses.iter_mut()) {
            pose.scale = sample_axes(&track.scale, frame);
            pose.rotation = sample_axes(&track.rotation, frame);
            pose.translation = sample_axes(&track.translation, frame);
        }
    }
}

fn sample_axes(axes: &[Vec<Keyframe>; 3], frame: f32) -> Vec3 {
    Vec3::new(
        sample(&axes[0], frame),
        sample(&axes[1], frame),
        sample(&axes[2], frame),
    )
}

/// A loaded animation of any kind, dispatched by variant.
#[derive(Debug, Clone)]
pub enum AnimationTrack {
    Register(RegisterAnimation),
    Joint(JointAnimation),
}

impl AnimationTrack {
    pub fn name(&self) -> &str {
        match self {
            AnimationTrack::Register(anim) => &anim.name,
            AnimationTrack::Joint(anim) => &anim.name,
        }
    }

    pub fn playback(&self) -> &Playback {
        match self {
            AnimationTrack::Register(anim) => &anim.playback,
            AnimationTrack::Joint(anim) => &anim.playback,
        }
    }

    pub fn playback_mut(&mut self) -> &mut Playback {
        match self {
            AnimationTrack::Register(anim) => &mut anim.playback,
            AnimationTrack::Joint(anim) => &mut anim.playback,
        }
    }
}

/// An insertion ordered collection of named tracks.
///
/// The registry itself is plain data; the owning model invokes its change
/// callback after mutating it.
#[derive(Debug, Clone, Default)]
pub struct AnimationRegistry {
    tracks: Vec<AnimationTrack>,
}

impl AnimationRegistry {
    /// Adds a track, replacing any existing track with the same name in
    /// place to keep insertion order stable.
    pub fn insert(&mut self, track: AnimationTrack) {
        match self
            .tracks
            .iter()
            .find_position(|t| t.name() == track.name())
        {
            Some((i, _)) => self.tracks[i] = track,
            None => self.tracks.push(track),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<AnimationTrack> {
        let (i, _) = self.tracks.iter().find_position(|t| t.name() == name)?;
        Some(self.tracks.remove(i))
    }

    pub fn get(&self, name: &str) -> Option<&AnimationTrack> {
        self.tracks.iter().find(|t| t.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut AnimationTrack> {
        self.tracks.iter_mut().find(|t| t.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnimationTrack> {
        self.tracks.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut AnimationTrack> {
        self.tracks.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn key(time: f32, value: f32, tangent: f32) -> Keyframe {
        Keyframe {
            time,
            value,
            tangent_in: tangent,
            tangent_out: tangent,
        }
    }

    #[test]
    fn zero_tangent_keys_interpolate_linearly_at_midpoint() {
        let keys = [key(0.0, 0.0, 0.0), key(10.0, 10.0, 0.0)];
        assert_relative_eq!(0.0, sample(&keys, 0.0));
        assert_relative_eq!(5.0, sample(&keys, 5.0));
        assert_relative_eq!(10.0, sample(&keys, 10.0));
    }

    #[test]
    fn sampling_past_the_last_key_holds_its_value() {
        let keys = [key(0.0, 1.0, 0.0), key(10.0, 4.0, 2.0)];
        assert_relative_eq!(4.0, sample(&keys, 15.0));
    }

    #[test]
    fn empty_and_constant_channels() {
        assert_eq!(0.0, sample(&[], 3.0));
        assert_eq!(7.5, sample(&[key(0.0, 7.5, 0.0)], 100.0));
    }

    #[test]
    fn tangents_scale_by_key_time_delta() {
        // With matching tangents equal to the slope, Hermite reproduces
        // the line exactly at any sample point.
        let keys = [key(0.0, 0.0, 1.0), key(4.0, 4.0, 1.0)];
        assert_relative_eq!(1.0, sample(&keys, 1.0));
        assert_relative_eq!(3.0, sample(&keys, 3.0));
    }

    #[test]
    fn playback_state_transitions() {
        let mut playback = Playback::new(LoopMode::Once, 30);
        assert_eq!(PlaybackState::Stopped, playback.state());

        playback.tick(1.0);
        assert_relative_eq!(0.0, playback.frame());

        playback.start();
        playback.tick(0.5);
        assert_relative_eq!(15.0, playback.frame());

        playback.pause();
        playback.tick(1.0);
        assert_relative_eq!(15.0, playback.frame());

        playback.resume();
        playback.tick(0.1);
        assert_relative_eq!(18.0, playback.frame());

        playback.stop();
        assert_relative_eq!(0.0, playback.frame());
    }

    #[test]
    fn loop_modes_fold_time() {
        let raw_frames = |loop_mode, seconds: f32| {
            let mut playback = Playback::new(loop_mode, 10);
            playback.start();
            playback.tick(seconds);
            playback.frame()
        };

        // 15 raw frames into a 10 frame track.
        let half_past = 15.0 / FRAME_RATE;
        assert_relative_eq!(10.0, raw_frames(LoopMode::Once, half_past));
        assert_relative_eq!(5.0, raw_frames(LoopMode::Loop, half_past));
        assert_relative_eq!(5.0, raw_frames(LoopMode::YoYo, half_past));
        assert_relative_eq!(5.0, raw_frames(LoopMode::YoYoLoop, half_past));

        // 25 raw frames: the single yoyo pass has finished.
        let late = 25.0 / FRAME_RATE;
        assert_relative_eq!(10.0, raw_frames(LoopMode::Once, late));
        assert_relative_eq!(0.0, raw_frames(LoopMode::YoYo, late));
        assert_relative_eq!(5.0, raw_frames(LoopMode::YoYoLoop, late));
    }

    #[test]
    fn registry_preserves_insertion_order_on_replace() {
        let track = |name: &str| {
            AnimationTrack::Register(RegisterAnimation::new(name, Trk1::default()))
        };

        let mut registry = AnimationRegistry::default();
        registry.insert(track("walk"));
        registry.insert(track("run"));
        registry.insert(track("walk"));

        let names: Vec<_> = registry.iter().map(AnimationTrack::name).collect();
        assert_eq!(vec!["walk", "run"], names);

        assert!(registry.remove("walk").is_some());
        assert!(registry.get("walk").is_none());
        assert_eq!(1, registry.len());
    }
}
