//! Hierarchical local-to-model matrix composition (spec.md §4.4
//! "LocalToModelJob").
//!
//! Grounded on `original_source/src/animation/runtime/local_to_model_job.cc`'s
//! `Transpose16x16`-then-parent-multiply shape and `anim_pose.rs`'s
//! `compute_joint_trs` stack-based parent-before-child traversal: since the
//! skeleton's topological invariant (`parent[i] < i`) guarantees a joint's
//! parent is always already computed, a single forward pass suffices.

use glam::Mat4;

use crate::math::SoaTransform;
use crate::skeleton::Skeleton;

/// Composes `local_transforms` (one [`SoaTransform`] per SoA joint group)
/// into model-space matrices, walking the hierarchy root-to-leaf.
pub struct LocalToModelJob<'a> {
    pub skeleton: &'a Skeleton,
    pub local_transforms: &'a [SoaTransform],
    /// Applied to root joints (those with no parent) before any local
    /// transform, e.g. to place a character in the world.
    pub root: Option<Mat4>,
    /// Inclusive joint index range to compute; joints outside the range are
    /// left untouched in `output`. `None` means the whole skeleton.
    pub from_to: Option<(usize, usize)>,
    pub output: &'a mut [Mat4],
}

impl<'a> LocalToModelJob<'a> {
    pub fn validate(&self) -> bool {
        let num_joints = self.skeleton.num_joints();
        let num_soa_joints = self.skeleton.num_soa_joints();
        if self.local_transforms.len() < num_soa_joints || self.output.len() < num_joints {
            return false;
        }
        if let Some((from, to)) = self.from_to {
            if from > to || to >= num_joints.max(1) {
                return false;
            }
        }
        true
    }

    pub fn run(&mut self) -> bool {
        if !self.validate() {
            return false;
        }
        let num_joints = self.skeleton.num_joints();
        let (from, to) = self.from_to.unwrap_or((0, num_joints.saturating_sub(1)));
        let root = self.root.unwrap_or(Mat4::IDENTITY);

        for group in 0..self.skeleton.num_soa_joints() {
            let aos = self.local_transforms[group].transpose_soa_to_aos();
            for lane in 0..4 {
                let joint = group * 4 + lane;
                if joint >= num_joints || joint < from || joint > to {
                    continue;
                }
                let local = aos[lane];
                self.output[joint] = match self.skeleton.parent(joint) {
                    Some(parent) => self.output[parent] * local,
                    None => root * local,
                };
            }
        }

        true
    }
}
