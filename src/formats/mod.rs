//! Decoders for the individual chunk tags.

pub mod ank1;
pub mod drw1;
pub mod evp1;
pub mod inf1;
pub mod jnt1;
pub mod mat3;
pub mod shp1;
pub mod tex1;
pub mod trk1;
pub mod vtx1;
