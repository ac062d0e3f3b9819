//! Weighted pose blending (spec.md §4.2 "BlendingJob").
//!
//! Grounded on `original_source/src/animation/runtime/blending_job.cc`'s
//! `BlendLayers`/`BlendBindPose`/`Normalize` pipeline: zero-or-negative-weight
//! layers are skipped, the skeleton rest pose tops up whatever weight a
//! joint's layers leave short of `threshold`, and the result is renormalized
//! by however much weight actually landed (>= threshold, never exactly 1
//! unless the layers summed past it). Additive layers have no equivalent in
//! that file (this ozz version predates additive blending); their nlerp-based
//! accumulation follows spec.md §4.3 directly and is applied after the normal
//! blend, in argument order (see DESIGN.md).

use glam::Vec4;

use crate::math::{SoaQuat, SoaTransform, SoaVec3};

/// Default per-joint-group accumulated weight below which the rest pose
/// tops up the remainder, mirroring ozz's `BlendingJob::threshold` default.
pub const DEFAULT_THRESHOLD: f32 = 0.1;

/// One weighted input pose. `joint_weights`, if present, must have the same
/// length as `transform` (one [`Vec4`] per SoA joint group) and scales
/// `weight` per joint group on top of the layer-wide scalar.
#[derive(Clone, Copy)]
pub struct Layer<'a> {
    pub transform: &'a [SoaTransform],
    pub weight: f32,
    pub joint_weights: Option<&'a [Vec4]>,
}

impl<'a> Layer<'a> {
    #[inline]
    fn group_weight(&self, group: usize) -> Vec4 {
        let w = Vec4::splat(self.weight);
        match self.joint_weights {
            Some(jw) => w * jw[group].max(Vec4::ZERO),
            None => w,
        }
    }
}

/// Blends `layers` (normal, override-style) and `additive_layers` (applied
/// on top, in order) against `rest_pose` into `output`. A group's
/// accumulated weight below `threshold` is topped up from the rest pose;
/// `threshold` must be `> 0` (ozz's own default is [`DEFAULT_THRESHOLD`]).
pub struct BlendingJob<'a> {
    pub rest_pose: &'a [SoaTransform],
    pub layers: &'a [Layer<'a>],
    pub additive_layers: &'a [Layer<'a>],
    pub threshold: f32,
    pub output: &'a mut [SoaTransform],
}

impl<'a> BlendingJob<'a> {
    pub fn validate(&self) -> bool {
        if !(self.threshold > 0.0) {
            return false;
        }
        let num_groups = self.rest_pose.len();
        if self.output.len() < num_groups {
            return false;
        }
        let shapes_ok = |layers: &[Layer]| {
            layers.iter().all(|l| {
                l.transform.len() >= num_groups
                    && l.joint_weights.map_or(true, |jw| jw.len() >= num_groups)
            })
        };
        shapes_ok(self.layers) && shapes_ok(self.additive_layers)
    }

    pub fn run(&mut self) -> bool {
        if !self.validate() {
            return false;
        }
        let num_groups = self.rest_pose.len();

        for group in 0..num_groups {
            let mut acc_weight = Vec4::ZERO;
            let mut acc_translation = SoaVec3::ZERO;
            let mut acc_scale = SoaVec3::ZERO;
            let mut acc_rotation = SoaQuat::IDENTITY.mul_lane(Vec4::ZERO);
            let mut rotation_seeded = Vec4::ZERO;

            for layer in self.layers {
                // Whole layers below zero weight are skipped outright, per
                // `BlendLayers`; a per-joint mask can still zero out
                // individual lanes of a kept layer.
                if layer.weight <= 0.0 {
                    continue;
                }
                let w = layer.group_weight(group);
                let pose = &layer.transform[group];
                acc_translation = acc_translation.add(pose.translation.mul_lane(w));
                acc_scale = acc_scale.add(pose.scale.mul_lane(w));

                // Keep the accumulating rotation sum on one hemisphere by
                // flipping any new contribution whose dot with the running
                // sum (once seeded) is negative.
                let seeded_mask = glam::BVec4::new(
                    rotation_seeded.x != 0.0,
                    rotation_seeded.y != 0.0,
                    rotation_seeded.z != 0.0,
                    rotation_seeded.w != 0.0,
                );
                let dot = acc_rotation.dot(pose.rotation);
                let flip_mask = glam::BVec4::new(
                    seeded_mask.x && dot.x < 0.0,
                    seeded_mask.y && dot.y < 0.0,
                    seeded_mask.z && dot.z < 0.0,
                    seeded_mask.w && dot.w < 0.0,
                );
                let fixed = pose.rotation.negate_where(flip_mask);
                acc_rotation = acc_rotation.add(fixed.mul_lane(w));

                acc_weight = acc_weight + w;
                rotation_seeded = Vec4::ONE;
            }

            // Only the shortfall below `threshold` (not all the way to 1)
            // comes from the rest pose, exactly like `BlendBindPose`: once
            // the layers alone clear the threshold the output is their pure
            // weighted average, with no rest-pose contribution at all.
            let threshold = Vec4::splat(self.threshold);
            let rest_weight = (threshold - acc_weight).max(Vec4::ZERO);
            if rest_weight.cmpgt(Vec4::ZERO).any() {
                let rest = &self.rest_pose[group];
                acc_translation = acc_translation.add(rest.translation.mul_lane(rest_weight));
                acc_scale = acc_scale.add(rest.scale.mul_lane(rest_weight));

                let dot = acc_rotation.dot(rest.rotation);
                let flip_mask = glam::BVec4::new(dot.x < 0.0, dot.y < 0.0, dot.z < 0.0, dot.w < 0.0);
                let fixed = rest.rotation.negate_where(flip_mask);
                acc_rotation = acc_rotation.add(fixed.mul_lane(rest_weight));

                acc_weight = acc_weight.max(threshold);
            }

            // Normalize by however much weight actually landed on this
            // group (>= threshold by construction, never zero).
            let norm = crate::math::rcp_est_v4(acc_weight);
            let mut blended = SoaTransform {
                translation: acc_translation.mul_lane(norm),
                rotation: acc_rotation.normalize_est(),
                scale: acc_scale.mul_lane(norm),
            };

            for layer in self.additive_layers {
                let w = layer.group_weight(group);
                // Negative `layer.weight` is a legal subtract (spec.md §4.3:
                // "negative layer weight subtracts"), so only an exactly-zero
                // weight (no per-joint mask can push it negative, only to
                // zero via the `max(0, ...)` clamp in `group_weight`) skips.
                if w.cmpeq(Vec4::ZERO).all() {
                    continue;
                }
                let pose = &layer.transform[group];
                blended.translation = blended.translation.add(pose.translation.mul_lane(w));
                blended.scale = blended
                    .scale
                    .mul_components(SoaVec3::ONE.lerp(pose.scale, w));
                let identity_to_delta = SoaQuat::IDENTITY.nlerp_est(pose.rotation, w);
                blended.rotation = blended.rotation.mul(identity_to_delta);
            }

            self.output[group] = blended;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    fn pose_with_translation(t: Vec3) -> SoaTransform {
        SoaTransform {
            translation: SoaVec3::splat(t),
            rotation: SoaQuat::IDENTITY,
            scale: SoaVec3::ONE,
        }
    }

    #[test]
    fn two_layers_with_opposite_translation_and_equal_weight_cancel_to_zero() {
        let rest_pose = vec![SoaTransform::IDENTITY];
        let pose_a = vec![pose_with_translation(Vec3::new(1.0, 0.0, 0.0))];
        let pose_b = vec![pose_with_translation(Vec3::new(-1.0, 0.0, 0.0))];
        let layers = [
            Layer { transform: &pose_a, weight: 0.5, joint_weights: None },
            Layer { transform: &pose_b, weight: 0.5, joint_weights: None },
        ];
        let mut output = vec![SoaTransform::IDENTITY];
        let mut job = BlendingJob {
            rest_pose: &rest_pose,
            layers: &layers,
            additive_layers: &[],
            threshold: DEFAULT_THRESHOLD,
            output: &mut output,
        };
        assert!(job.run());
        let (t, _, _) = output[0].lane(0);
        assert!(t.length() < 1e-4);
    }

    #[test]
    fn full_weight_takes_no_rest_pose_contribution() {
        let rest_pose = vec![pose_with_translation(Vec3::new(99.0, 99.0, 99.0))];
        let pose_a = vec![pose_with_translation(Vec3::new(2.0, 3.0, 4.0))];
        let layers = [Layer { transform: &pose_a, weight: 1.0, joint_weights: None }];
        let mut output = vec![SoaTransform::IDENTITY];
        let mut job = BlendingJob {
            rest_pose: &rest_pose,
            layers: &layers,
            additive_layers: &[],
            threshold: DEFAULT_THRESHOLD,
            output: &mut output,
        };
        assert!(job.run());
        let (t, _, _) = output[0].lane(0);
        assert!((t - Vec3::new(2.0, 3.0, 4.0)).length() < 1e-4);
    }

    /// Weights summing to exactly `threshold` (seed scenario 4): the pure
    /// weighted blend, no rest-pose contribution on top.
    #[test]
    fn weights_summing_to_exactly_threshold_take_no_rest_pose_contribution() {
        let rest_pose = vec![pose_with_translation(Vec3::new(99.0, 99.0, 99.0))];
        let pose_a = vec![pose_with_translation(Vec3::new(10.0, 0.0, 0.0))];
        let pose_b = vec![pose_with_translation(Vec3::new(0.0, 10.0, 0.0))];
        let layers = [
            Layer { transform: &pose_a, weight: 0.04, joint_weights: None },
            Layer { transform: &pose_b, weight: 0.06, joint_weights: None },
        ];
        let mut output = vec![SoaTransform::IDENTITY];
        let mut job = BlendingJob {
            rest_pose: &rest_pose,
            layers: &layers,
            additive_layers: &[],
            threshold: DEFAULT_THRESHOLD,
            output: &mut output,
        };
        assert!(job.run());
        let (t, _, _) = output[0].lane(0);
        let expected = (Vec3::new(10.0, 0.0, 0.0) * 0.04 + Vec3::new(0.0, 10.0, 0.0) * 0.06) / 0.10;
        assert!((t - expected).length() < 1e-4);
    }

    /// A layer below `threshold` still contributes its share; the rest pose
    /// only tops up the shortfall down to `threshold`, never all the way to 1.
    #[test]
    fn layer_below_threshold_still_contributes_and_rest_tops_up_shortfall() {
        let rest_pose = vec![pose_with_translation(Vec3::new(5.0, 5.0, 5.0))];
        let pose_a = vec![pose_with_translation(Vec3::new(100.0, 100.0, 100.0))];
        let layers = [Layer { transform: &pose_a, weight: 0.01, joint_weights: None }];
        let mut output = vec![SoaTransform::IDENTITY];
        let mut job = BlendingJob {
            rest_pose: &rest_pose,
            layers: &layers,
            additive_layers: &[],
            threshold: DEFAULT_THRESHOLD,
            output: &mut output,
        };
        assert!(job.run());
        let (t, _, _) = output[0].lane(0);
        let expected = (Vec3::new(100.0, 100.0, 100.0) * 0.01 + Vec3::new(5.0, 5.0, 5.0) * 0.09) / 0.10;
        assert!((t - expected).length() < 1e-4);
    }

    #[test]
    fn additive_layer_applies_on_top_of_normal_blend() {
        let rest_pose = vec![SoaTransform::IDENTITY];
        let pose_a = vec![pose_with_translation(Vec3::new(1.0, 0.0, 0.0))];
        let additive = vec![SoaTransform {
            translation: SoaVec3::splat(Vec3::new(0.0, 2.0, 0.0)),
            rotation: SoaQuat::splat(Quat::from_rotation_z(0.0)),
            scale: SoaVec3::ONE,
        }];
        let layers = [Layer { transform: &pose_a, weight: 1.0, joint_weights: None }];
        let additive_layers = [Layer { transform: &additive, weight: 1.0, joint_weights: None }];
        let mut output = vec![SoaTransform::IDENTITY];
        let mut job = BlendingJob {
            rest_pose: &rest_pose,
            layers: &layers,
            additive_layers: &additive_layers,
            threshold: DEFAULT_THRESHOLD,
            output: &mut output,
        };
        assert!(job.run());
        let (t, _, _) = output[0].lane(0);
        assert!((t - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn negative_additive_weight_subtracts_instead_of_adding() {
        let rest_pose = vec![SoaTransform::IDENTITY];
        let pose_a = vec![pose_with_translation(Vec3::new(1.0, 0.0, 0.0))];
        let additive = vec![pose_with_translation(Vec3::new(0.0, 2.0, 0.0))];
        let layers = [Layer { transform: &pose_a, weight: 1.0, joint_weights: None }];
        let additive_layers = [Layer { transform: &additive, weight: -1.0, joint_weights: None }];
        let mut output = vec![SoaTransform::IDENTITY];
        let mut job = BlendingJob {
            rest_pose: &rest_pose,
            layers: &layers,
            additive_layers: &additive_layers,
            threshold: DEFAULT_THRESHOLD,
            output: &mut output,
        };
        assert!(job.run());
        let (t, _, _) = output[0].lane(0);
        assert!((t - Vec3::new(1.0, -2.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn non_positive_threshold_fails_validation() {
        let rest_pose = vec![SoaTransform::IDENTITY];
        let mut output = vec![SoaTransform::IDENTITY];
        let job = BlendingJob {
            rest_pose: &rest_pose,
            layers: &[],
            additive_layers: &[],
            threshold: 0.0,
            output: &mut output,
        };
        assert!(!job.validate());
    }

    #[test]
    fn all_zero_weight_layers_fall_back_entirely_to_rest_pose() {
        let rest_pose = vec![pose_with_translation(Vec3::new(3.0, 4.0, 5.0))];
        let pose_a = vec![pose_with_translation(Vec3::new(100.0, 0.0, 0.0))];
        let layers = [Layer { transform: &pose_a, weight: 0.0, joint_weights: None }];
        let mut output = vec![SoaTransform::IDENTITY];
        let mut job = BlendingJob {
            rest_pose: &rest_pose,
            layers: &layers,
            additive_layers: &[],
            threshold: DEFAULT_THRESHOLD,
            output: &mut output,
        };
        assert!(job.run());
        let (t, _, _) = output[0].lane(0);
        assert!((t - Vec3::new(3.0, 4.0, 5.0)).length() < 1e-4);
    }
}
