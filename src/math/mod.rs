//! SoA (structure-of-arrays, lane count = 4) vector/quaternion/transform
//! algebra, plus the scalar "estimated" helpers shared with the IK jobs.
//!
//! Each SoA lane packs the same component of four joints side by side in a
//! `glam::Vec4`, so a single `SoaVec3` or `SoaQuat` describes four joints at
//! once and every arithmetic op below is already four-wide.

mod scalar;
mod soa;

pub use scalar::*;
pub use soa::*;
