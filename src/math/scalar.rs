//! Scalar "estimated" math shared by the sampling job (hot path) and the IK
//! jobs (single-joint-chain solvers). Named `_est` to match the spec/ozz API
//! shape: callers must treat these as approximations (no bit-exact hardware
//! rsqrt guarantee), even though this build computes them directly since
//! stable Rust has no portable estimated-reciprocal intrinsic to reach for.

use glam::{Quat, Vec3, Vec4};

const EPSILON: f32 = 1e-6;

/// Estimated reciprocal square root, scalar lane.
#[inline]
pub fn rsqrt_est(x: f32) -> f32 {
    1.0 / x.sqrt()
}

/// Estimated reciprocal square root, 4-wide lane.
#[inline]
pub fn rsqrt_est_v4(x: Vec4) -> Vec4 {
    Vec4::new(
        rsqrt_est(x.x),
        rsqrt_est(x.y),
        rsqrt_est(x.z),
        rsqrt_est(x.w),
    )
}

/// Estimated reciprocal, scalar lane.
#[inline]
pub fn rcp_est(x: f32) -> f32 {
    1.0 / x
}

/// Estimated reciprocal, 4-wide lane.
#[inline]
pub fn rcp_est_v4(x: Vec4) -> Vec4 {
    Vec4::new(rcp_est(x.x), rcp_est(x.y), rcp_est(x.z), rcp_est(x.w))
}

/// Component-wise lerp of two quaternions followed by an estimated-rsqrt
/// normalization. Valid when `a` and `b` lie on the same hemisphere (the
/// short-path invariant callers are responsible for upholding).
#[inline]
pub fn nlerp_est(a: Quat, b: Quat, t: f32) -> Quat {
    let x = a.x + (b.x - a.x) * t;
    let y = a.y + (b.y - a.y) * t;
    let z = a.z + (b.z - a.z) * t;
    let w = a.w + (b.w - a.w) * t;
    let len2 = x * x + y * y + z * z + w * w;
    let rl = rsqrt_est(len2.max(EPSILON));
    Quat::from_xyzw(x * rl, y * rl, z * rl, w * rl)
}

/// Builds the quaternion rotating by `angle` radians around `axis`. `axis` is
/// assumed unit-length; a near-zero axis yields the identity quaternion
/// instead of propagating NaNs.
#[inline]
pub fn quat_from_axis_angle(axis: Vec3, angle: f32) -> Quat {
    if axis.length_squared() < EPSILON {
        return Quat::IDENTITY;
    }
    Quat::from_axis_angle(axis, angle)
}

/// Builds the quaternion rotating around `axis` (assumed unit-length) by the
/// angle whose cosine is `cos_angle`, using the half-angle identities
/// directly instead of an `acos` + `from_axis_angle` round trip.
#[inline]
pub fn quat_from_axis_cos_angle(axis: Vec3, cos_angle: f32) -> Quat {
    if axis.length_squared() < EPSILON {
        return Quat::IDENTITY;
    }
    let cos_angle = cos_angle.clamp(-1.0, 1.0);
    let cos_half = ((1.0 + cos_angle) * 0.5).max(0.0).sqrt();
    let sin_half = ((1.0 - cos_angle) * 0.5).max(0.0).sqrt();
    Quat::from_xyzw(axis.x * sin_half, axis.y * sin_half, axis.z * sin_half, cos_half)
}

/// Picks an arbitrary unit vector orthogonal to `v` (assumed unit-length).
fn arbitrary_orthogonal(v: Vec3) -> Vec3 {
    let fallback = if v.x.abs() < v.y.abs() && v.x.abs() < v.z.abs() {
        Vec3::X
    } else if v.y.abs() < v.z.abs() {
        Vec3::Y
    } else {
        Vec3::Z
    };
    v.cross(fallback).normalize()
}

/// The rotation aligning unit vector `from` with unit vector `to`. The
/// degenerate anti-parallel case yields a 180 degree rotation around an
/// arbitrary axis orthogonal to `from`.
pub fn from_unit_vectors(from: Vec3, to: Vec3) -> Quat {
    let cos_angle = from.dot(to).clamp(-1.0, 1.0);
    if cos_angle > 1.0 - EPSILON {
        return Quat::IDENTITY;
    }
    if cos_angle < -1.0 + EPSILON {
        let axis = arbitrary_orthogonal(from);
        return quat_from_axis_angle(axis, std::f32::consts::PI);
    }
    let axis = from.cross(to).normalize();
    quat_from_axis_cos_angle(axis, cos_angle)
}

/// As [`from_unit_vectors`], but `from`/`to` need not be pre-normalized.
pub fn from_vectors(from: Vec3, to: Vec3) -> Quat {
    let from_len2 = from.length_squared();
    let to_len2 = to.length_squared();
    if from_len2 < EPSILON || to_len2 < EPSILON {
        return Quat::IDENTITY;
    }
    from_unit_vectors(from * rsqrt_est(from_len2), to * rsqrt_est(to_len2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rsqrt_est_matches_exact_within_tolerance() {
        for x in [0.25f32, 1.0, 2.0, 9.0, 100.0] {
            let exact = 1.0 / x.sqrt();
            assert_relative_eq!(rsqrt_est(x), exact, epsilon = 1e-3);
        }
    }

    #[test]
    fn from_unit_vectors_identity_for_same_direction() {
        let q = from_unit_vectors(Vec3::X, Vec3::X);
        assert_relative_eq!(q, Quat::IDENTITY, epsilon = 1e-5);
    }

    #[test]
    fn from_unit_vectors_handles_opposite_direction() {
        let q = from_unit_vectors(Vec3::X, -Vec3::X);
        let rotated = q * Vec3::X;
        assert_relative_eq!(rotated, -Vec3::X, epsilon = 1e-4);
    }

    #[test]
    fn from_vectors_rotates_onto_target() {
        let from = Vec3::new(1.0, 0.0, 0.0) * 3.0;
        let to = Vec3::new(0.0, 1.0, 0.0) * 2.0;
        let q = from_vectors(from, to);
        let rotated = (q * from.normalize()).normalize();
        assert_relative_eq!(rotated, to.normalize(), epsilon = 1e-4);
    }

    #[test]
    fn quat_from_axis_cos_angle_matches_axis_angle() {
        let axis = Vec3::Z;
        let angle = 1.1f32;
        let a = quat_from_axis_cos_angle(axis, angle.cos());
        let b = Quat::from_axis_angle(axis, angle);
        assert_relative_eq!(a, b, epsilon = 1e-4);
    }
}
