//! # j3d_data
//!
//! High level evaluation built on the decoded structures from
//! [`j3d_lib`]: skeleton posing and skinning, animation playback with
//! Hermite curve sampling, and GLSL vertex shader generation from
//! fixed function material state.
//!
//! The split mirrors the two halves of the workspace. `j3d_lib` decodes
//! files into immutable data; this crate owns everything that changes per
//! frame. A [`model::Model`] ties the two together and recomputes its
//! animated material and pose copies on every [`model::Model::tick`].
//!
//! ```no_run
//! use j3d_data::model::Model;
//! use j3d_lib::DecodeOptions;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = std::fs::read("model.bmd")?;
//! let bmd = j3d_lib::Bmd::from_bytes(&bytes, &DecodeOptions::default())?;
//! let mut model = Model::new(bmd)?;
//! model.tick(1.0 / 60.0);
//! # Ok(())
//! # }
//! ```

pub mod anim;
pub mod model;
pub mod shader;
pub mod skinning;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Decode(#[from] j3d_lib::Error),

    /// A decoded table references an entry outside its target array.
    #[error("{what} index {index} out of range ({count} entries)")]
    InvalidIndex {
        what: &'static str,
        index: usize,
        count: usize,
    },
}
