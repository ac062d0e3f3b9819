//! Data-oriented skeletal animation runtime: immutable skeleton/animation
//! data, SoA-4 keyframe sampling, pose blending, hierarchical local-to-model
//! composition, and analytic two-bone/aim IK.
//!
//! Every job in this crate follows the same shape: a plain struct of
//! borrowed inputs and outputs, a cheap `validate`, and a `run` that returns
//! whether it actually computed something. None of them allocate; callers
//! own every buffer (rest poses, sampling contexts, output spans) and reuse
//! them across frames.

pub mod animation;
pub mod blending_job;
pub mod error;
pub mod ik;
pub mod local_to_model_job;
pub mod math;
pub mod sampling_job;
pub mod skeleton;

pub use animation::Animation;
pub use blending_job::{BlendingJob, Layer};
pub use error::ArchiveError;
pub use ik::{AimIkJob, AimIkResult, TwoBoneIkJob, TwoBoneIkResult};
pub use local_to_model_job::LocalToModelJob;
pub use sampling_job::{SamplingContext, SamplingJob};
pub use skeleton::Skeleton;
