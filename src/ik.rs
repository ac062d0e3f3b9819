//! Analytic inverse kinematics (spec.md §4.5 "TwoBoneIkJob" / "AimIkJob").
//!
//! No direct teacher counterpart — `Blodir-wgpu-test-3` has no IK solver —
//! so these are built in the teacher's glam-based job-struct idiom (a plain
//! struct of `Mat4`/`Vec3`/`Quat` inputs plus a `run(&mut self) -> bool`),
//! with the algorithms themselves taken directly from
//! `original_source/src/animation/runtime/ik_two_bone_job.cc` and
//! `ik_aim_job.cc`: both solvers work in the space of one of the input
//! joints (mid/start for two-bone, joint for aim) so the corrections they
//! produce compose directly with that joint's existing local rotation.

use glam::{Mat4, Quat, Vec3};

use crate::math::{from_vectors, quat_from_axis_angle, quat_from_axis_cos_angle};

const EPSILON: f32 = 1e-6;

/// Solves the rotation of `start_joint` and `mid_joint` (both model-space)
/// that bends the chain so `end_joint` reaches `target`.
pub struct TwoBoneIkJob {
    pub start_joint: Mat4,
    pub mid_joint: Mat4,
    pub end_joint: Mat4,
    pub target: Vec3,
    /// Mid joint's local bend axis, normalized. Defaults to `Vec3::Z`.
    pub mid_axis: Vec3,
    /// Model-space reference direction defining the bend plane. Defaults to
    /// `Vec3::Y`.
    pub pole_vector: Vec3,
    pub twist_angle: f32,
    /// Fraction of the chain's reach, in `[0, 1]`, past which the target is
    /// softened rather than causing the chain to lock straight. `1.0`
    /// disables softening.
    pub soften: f32,
    pub weight: f32,
}

impl Default for TwoBoneIkJob {
    fn default() -> Self {
        Self {
            start_joint: Mat4::IDENTITY,
            mid_joint: Mat4::IDENTITY,
            end_joint: Mat4::IDENTITY,
            target: Vec3::ZERO,
            mid_axis: Vec3::Z,
            pole_vector: Vec3::Y,
            twist_angle: 0.0,
            soften: 1.0,
            weight: 1.0,
        }
    }
}

/// Output of a [`TwoBoneIkJob`] run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TwoBoneIkResult {
    pub start_joint_correction: Quat,
    pub mid_joint_correction: Quat,
    pub reached: bool,
}

impl TwoBoneIkJob {
    pub fn validate(&self) -> bool {
        (self.mid_axis.length() - 1.0).abs() < 1e-2
    }

    pub fn run(&self) -> Option<TwoBoneIkResult> {
        if !self.validate() {
            return None;
        }

        if self.weight <= 0.0 {
            return Some(TwoBoneIkResult {
                start_joint_correction: Quat::IDENTITY,
                mid_joint_correction: Quat::IDENTITY,
                reached: false,
            });
        }

        let inv_start = self.start_joint.inverse();
        let inv_mid = self.mid_joint.inverse();

        let start_ms = inv_mid.transform_point3(self.start_joint.w_axis.truncate());
        let end_ms = inv_mid.transform_point3(self.end_joint.w_axis.truncate());
        let mid_ss = inv_start.transform_point3(self.mid_joint.w_axis.truncate());
        let end_ss = inv_start.transform_point3(self.end_joint.w_axis.truncate());

        let start_mid_ms = -start_ms;
        let mid_end_ms = end_ms;
        let start_mid_ss = mid_ss;
        let mid_end_ss = end_ss - mid_ss;
        let start_end_ss = end_ss;

        let start_mid_ss_len2 = start_mid_ss.length_squared();
        let mid_end_ss_len2 = mid_end_ss.length_squared();
        let start_end_ss_len2 = start_end_ss.length_squared();

        let (start_target_ss, start_target_ss_len2, reached_soft) = soften_target(
            inv_start,
            self.target,
            start_mid_ss_len2,
            mid_end_ss_len2,
            self.soften,
        );

        let mid_rot_ms = compute_mid_joint(
            start_mid_ss_len2,
            mid_end_ss_len2,
            start_end_ss_len2,
            start_target_ss_len2,
            start_mid_ms,
            mid_end_ms,
            self.mid_axis,
        );

        let start_rot_ss = compute_start_joint(
            inv_start,
            self.mid_joint,
            mid_rot_ms,
            start_mid_ss,
            mid_end_ms,
            start_target_ss,
            start_target_ss_len2,
            self.pole_vector,
            self.mid_axis,
            self.twist_angle,
        );

        let (start_joint_correction, mid_joint_correction) =
            weight_output(start_rot_ss, mid_rot_ms, self.weight);

        Some(TwoBoneIkResult {
            start_joint_correction,
            mid_joint_correction,
            reached: reached_soft && self.weight >= 1.0,
        })
    }
}

fn soften_target(
    inv_start: Mat4,
    target: Vec3,
    start_mid_ss_len2: f32,
    mid_end_ss_len2: f32,
    soften: f32,
) -> (Vec3, f32, bool) {
    let start_target_original_ss = inv_start.transform_point3(target);
    let start_target_original_ss_len2 = start_target_original_ss.length_squared();

    let start_mid_ss_len = start_mid_ss_len2.sqrt();
    let mid_end_ss_len = mid_end_ss_len2.sqrt();
    let start_target_original_ss_len = start_target_original_ss_len2.sqrt();

    let bone_len_diff_abs = (start_mid_ss_len - mid_end_ss_len).abs();
    let bones_chain_len = start_mid_ss_len + mid_end_ss_len;
    let da = bones_chain_len * soften.clamp(0.0, 1.0);
    let ds = bones_chain_len - da;

    let x = start_target_original_ss_len > da;
    let y = start_target_original_ss_len > 0.0;
    let z = start_target_original_ss_len > bone_len_diff_abs;
    let w = ds > 0.0;

    let (start_target_ss, start_target_ss_len2) = if x && y && w {
        let alpha = (start_target_original_ss_len - da) / ds;
        let ratio = (3.0 / (alpha + 3.0)).powi(4);
        let start_target_ss_len = da + ds * (1.0 - ratio);
        let scale = start_target_ss_len / start_target_original_ss_len;
        (start_target_original_ss * scale, start_target_ss_len * start_target_ss_len)
    } else {
        (start_target_original_ss, start_target_original_ss_len2)
    };

    let reached = !x && z;
    (start_target_ss, start_target_ss_len2, reached)
}

#[allow(clippy::too_many_arguments)]
fn compute_mid_joint(
    start_mid_ss_len2: f32,
    mid_end_ss_len2: f32,
    start_end_ss_len2: f32,
    start_target_ss_len2: f32,
    start_mid_ms: Vec3,
    mid_end_ms: Vec3,
    mid_axis: Vec3,
) -> Quat {
    let sum_len2 = start_mid_ss_len2 + mid_end_ss_len2;
    let half_rlen = 0.5 / (start_mid_ss_len2 * mid_end_ss_len2).sqrt().max(EPSILON);

    let cos_corrected = ((sum_len2 - start_target_ss_len2) * half_rlen).clamp(-1.0, 1.0);
    let cos_initial = ((sum_len2 - start_end_ss_len2) * half_rlen).clamp(-1.0, 1.0);

    let mid_corrected_angle = cos_corrected.acos();

    let bent_side_ref = start_mid_ms.cross(mid_axis);
    let bent_side_flip = bent_side_ref.dot(mid_end_ms) < 0.0;
    let mid_initial_angle = if bent_side_flip { -cos_initial.acos() } else { cos_initial.acos() };

    let mid_angles_diff = mid_corrected_angle - mid_initial_angle;
    quat_from_axis_angle(mid_axis, mid_angles_diff)
}

#[allow(clippy::too_many_arguments)]
fn compute_start_joint(
    inv_start: Mat4,
    mid_joint: Mat4,
    mid_rot_ms: Quat,
    start_mid_ss: Vec3,
    mid_end_ms: Vec3,
    start_target_ss: Vec3,
    start_target_ss_len2: f32,
    pole_vector: Vec3,
    mid_axis: Vec3,
    twist_angle: f32,
) -> Quat {
    let pole_ss = inv_start.transform_vector3(pole_vector);

    let mid_end_ss_final =
        inv_start.transform_vector3(mid_joint.transform_vector3(mid_rot_ms * mid_end_ms));
    let start_end_ss_final = start_mid_ss + mid_end_ss_final;

    let end_to_target_rot_ss = from_vectors(start_end_ss_final, start_target_ss);

    if start_target_ss_len2 <= 0.0 {
        return end_to_target_rot_ss;
    }

    let ref_plane_normal_ss = start_target_ss.cross(pole_ss);
    let mid_axis_ss = inv_start.transform_vector3(mid_joint.transform_vector3(mid_axis));
    let joint_plane_normal_ss = end_to_target_rot_ss * mid_axis_ss;

    let ref_len = ref_plane_normal_ss.length().max(EPSILON);
    let joint_len = joint_plane_normal_ss.length().max(EPSILON);
    let rotate_plane_cos_angle =
        (ref_plane_normal_ss / ref_len).dot(joint_plane_normal_ss / joint_len);

    let rotate_plane_axis = start_target_ss.normalize_or_zero();
    let flip = joint_plane_normal_ss.dot(pole_ss) < 0.0;
    let rotate_plane_axis_flipped = if flip { -rotate_plane_axis } else { rotate_plane_axis };

    let rotate_plane_ss =
        quat_from_axis_cos_angle(rotate_plane_axis_flipped, rotate_plane_cos_angle.clamp(-1.0, 1.0));

    if twist_angle != 0.0 {
        let twist_ss = quat_from_axis_angle(rotate_plane_axis, twist_angle);
        twist_ss * rotate_plane_ss * end_to_target_rot_ss
    } else {
        rotate_plane_ss * end_to_target_rot_ss
    }
}

fn sign_fixup(q: Quat) -> Quat {
    if q.w < 0.0 {
        -q
    } else {
        q
    }
}

fn weight_output(start_rot: Quat, mid_rot: Quat, weight: f32) -> (Quat, Quat) {
    let start_fu = sign_fixup(start_rot);
    let mid_fu = sign_fixup(mid_rot);
    if weight < 1.0 {
        let w = weight.max(0.0);
        let start = crate::math::nlerp_est(Quat::IDENTITY, start_fu, w);
        let mid = crate::math::nlerp_est(Quat::IDENTITY, mid_fu, w);
        (start, mid)
    } else {
        (start_fu, mid_fu)
    }
}

/// Solves the rotation of `joint` (model-space) that aims its local
/// `forward` axis (optionally offset) at `target`.
pub struct AimIkJob {
    pub joint: Mat4,
    pub target: Vec3,
    /// Joint-local unit vector to aim at the target. Defaults to `Vec3::X`.
    pub forward: Vec3,
    /// Joint-local offset of the point that should aim at the target.
    /// Defaults to zero (no offset, simple forward-vector aim).
    pub offset: Vec3,
    /// Joint-local up vector, rotated along with the aim correction so the
    /// rotate-plane step has a stable reference. Defaults to `Vec3::Y`.
    pub up: Vec3,
    pub pole_vector: Vec3,
    pub twist_angle: f32,
    pub weight: f32,
}

impl Default for AimIkJob {
    fn default() -> Self {
        Self {
            joint: Mat4::IDENTITY,
            target: Vec3::ZERO,
            forward: Vec3::X,
            offset: Vec3::ZERO,
            up: Vec3::Y,
            pole_vector: Vec3::Y,
            twist_angle: 0.0,
            weight: 1.0,
        }
    }
}

/// Output of an [`AimIkJob`] run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AimIkResult {
    pub joint_correction: Quat,
    pub reached: bool,
}

impl AimIkJob {
    pub fn validate(&self) -> bool {
        (self.forward.length() - 1.0).abs() < 1e-2
    }

    pub fn run(&self) -> Option<AimIkResult> {
        if !self.validate() {
            return None;
        }

        let inv_joint = self.joint.inverse();
        let joint_to_target_js = inv_joint.transform_point3(self.target);
        let joint_to_target_js_len2 = joint_to_target_js.length_squared();

        let offsetted_forward =
            compute_offsetted_forward(self.forward, self.offset, joint_to_target_js);
        let reached = offsetted_forward.is_some();

        let offsetted_forward = match offsetted_forward {
            Some(f) if joint_to_target_js_len2 > 0.0 => f,
            _ => {
                return Some(AimIkResult { joint_correction: Quat::IDENTITY, reached });
            }
        };

        let joint_to_target_rot_js = from_vectors(offsetted_forward, joint_to_target_js);
        let corrected_up_js = joint_to_target_rot_js * self.up;

        let pole_vector_js = inv_joint.transform_vector3(self.pole_vector);
        let ref_joint_normal_js = pole_vector_js.cross(joint_to_target_js);
        let joint_normal_js = corrected_up_js.cross(joint_to_target_js);
        let ref_len2 = ref_joint_normal_js.length_squared();
        let joint_len2 = joint_normal_js.length_squared();

        let rotate_plane_axis_js = joint_to_target_js.normalize_or_zero();
        let rotate_plane_js =
            if joint_to_target_js_len2 > 0.0 && joint_len2 > 0.0 && ref_len2 > 0.0 {
                let rotate_plane_cos_angle = (joint_normal_js / joint_len2.sqrt())
                    .dot(ref_joint_normal_js / ref_len2.sqrt());
                let flip = ref_joint_normal_js.dot(corrected_up_js) < 0.0;
                let axis = if flip { -rotate_plane_axis_js } else { rotate_plane_axis_js };
                quat_from_axis_cos_angle(axis, rotate_plane_cos_angle.clamp(-1.0, 1.0))
            } else {
                Quat::IDENTITY
            };

        let twisted = if self.twist_angle != 0.0 {
            let twist_js = quat_from_axis_angle(rotate_plane_axis_js, self.twist_angle);
            twist_js * rotate_plane_js * joint_to_target_rot_js
        } else {
            rotate_plane_js * joint_to_target_rot_js
        };

        let joint_correction = if self.weight < 1.0 {
            let w = self.weight.max(0.0);
            crate::math::nlerp_est(Quat::IDENTITY, twisted, w)
        } else {
            sign_fixup(twisted)
        };

        Some(AimIkResult { joint_correction, reached })
    }
}

/// Recomputes the forward vector so that the offset point aims at `target`,
/// per the sphere-intersection construction in `ik_aim_job.cc`. Returns
/// `None` when `offset`'s perpendicular distance from the aim axis exceeds
/// the target distance (the offset point can never reach the target).
fn compute_offsetted_forward(forward: Vec3, offset: Vec3, target: Vec3) -> Option<Vec3> {
    let ao_len = forward.dot(offset);
    let ac_len2 = offset.length_squared() - ao_len * ao_len;
    let r2 = target.length_squared();
    if ac_len2 > r2 {
        return None;
    }
    let ai_len = (r2 - ac_len2).max(0.0).sqrt();
    Some(offset + forward * (ai_len - ao_len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn two_bone_reaches_a_target_within_chain_length() {
        let job = TwoBoneIkJob {
            start_joint: Mat4::IDENTITY,
            mid_joint: Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)),
            end_joint: Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)),
            target: Vec3::new(1.4, 1.0, 0.0),
            mid_axis: Vec3::Z,
            pole_vector: Vec3::Y,
            twist_angle: 0.0,
            soften: 1.0,
            weight: 1.0,
        };
        let result = job.run().expect("validate should pass");
        assert!(result.reached);

        let new_mid_local = result.mid_joint_correction;
        let mid_to_end_model = new_mid_local * Vec3::new(1.0, 0.0, 0.0);
        let new_start_local = result.start_joint_correction;
        let start_to_mid_model = new_start_local * Vec3::new(1.0, 0.0, 0.0);
        let end_pos = start_to_mid_model + new_start_local * mid_to_end_model;
        assert!((end_pos - job.target).length() < 0.2);
    }

    #[test]
    fn two_bone_does_not_reach_an_overextended_target() {
        let job = TwoBoneIkJob {
            start_joint: Mat4::IDENTITY,
            mid_joint: Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)),
            end_joint: Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)),
            target: Vec3::new(10.0, 0.0, 0.0),
            mid_axis: Vec3::Z,
            pole_vector: Vec3::Y,
            twist_angle: 0.0,
            soften: 1.0,
            weight: 1.0,
        };
        let result = job.run().unwrap();
        assert!(!result.reached);
    }

    #[test]
    fn two_bone_zero_weight_gives_identity_and_unreached() {
        let job = TwoBoneIkJob {
            target: Vec3::new(1.5, 0.5, 0.0),
            mid_joint: Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)),
            end_joint: Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)),
            weight: 0.0,
            ..Default::default()
        };
        let result = job.run().unwrap();
        assert!(!result.reached);
        assert_relative_eq!(result.start_joint_correction, Quat::IDENTITY, epsilon = 1e-6);
        assert_relative_eq!(result.mid_joint_correction, Quat::IDENTITY, epsilon = 1e-6);
    }

    #[test]
    fn aim_rotates_forward_axis_onto_target() {
        let job = AimIkJob {
            joint: Mat4::IDENTITY,
            target: Vec3::new(0.0, 1.0, 0.0),
            forward: Vec3::X,
            offset: Vec3::ZERO,
            up: Vec3::Y,
            pole_vector: Vec3::Y,
            twist_angle: 0.0,
            weight: 1.0,
        };
        let result = job.run().unwrap();
        assert!(result.reached);
        let rotated = result.joint_correction * Vec3::X;
        assert_relative_eq!(rotated, Vec3::Y, epsilon = 1e-4);
    }

    #[test]
    fn aim_unreachable_offset_reports_not_reached() {
        let job = AimIkJob {
            joint: Mat4::IDENTITY,
            target: Vec3::new(0.1, 0.0, 0.0),
            forward: Vec3::X,
            offset: Vec3::new(0.0, 5.0, 0.0),
            up: Vec3::Y,
            pole_vector: Vec3::Y,
            twist_angle: 0.0,
            weight: 1.0,
        };
        let result = job.run().unwrap();
        assert!(!result.reached);
        assert_relative_eq!(result.joint_correction, Quat::IDENTITY, epsilon = 1e-6);
    }
}
