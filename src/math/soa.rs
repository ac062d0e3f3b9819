//! SoA-4 transform algebra: each field below packs one component of four
//! joints into a single `glam::Vec4` lane, so the whole struct describes
//! four joints' worth of data and every operation processes all four at once.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use super::scalar::rsqrt_est_v4;

/// Four joints' worth of a vec3 field (translation or scale), one lane per axis.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct SoaVec3 {
    pub x: Vec4,
    pub y: Vec4,
    pub z: Vec4,
}

impl SoaVec3 {
    pub const ZERO: Self = Self {
        x: Vec4::ZERO,
        y: Vec4::ZERO,
        z: Vec4::ZERO,
    };
    pub const ONE: Self = Self {
        x: Vec4::ONE,
        y: Vec4::ONE,
        z: Vec4::ONE,
    };

    #[inline]
    pub fn splat(v: Vec3) -> Self {
        Self {
            x: Vec4::splat(v.x),
            y: Vec4::splat(v.y),
            z: Vec4::splat(v.z),
        }
    }

    #[inline]
    pub fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }

    #[inline]
    pub fn mul_lane(self, w: Vec4) -> Self {
        Self {
            x: self.x * w,
            y: self.y * w,
            z: self.z * w,
        }
    }

    #[inline]
    pub fn mul_components(self, rhs: Self) -> Self {
        Self {
            x: self.x * rhs.x,
            y: self.y * rhs.y,
            z: self.z * rhs.z,
        }
    }

    #[inline]
    pub fn lerp(self, rhs: Self, t: Vec4) -> Self {
        Self {
            x: self.x + (rhs.x - self.x) * t,
            y: self.y + (rhs.y - self.y) * t,
            z: self.z + (rhs.z - self.z) * t,
        }
    }

    /// Extracts joint `lane` (0..4) as a standalone `Vec3`.
    #[inline]
    pub fn lane(&self, lane: usize) -> Vec3 {
        Vec3::new(
            self.x.to_array()[lane],
            self.y.to_array()[lane],
            self.z.to_array()[lane],
        )
    }

    /// Builds a SoA group from four standalone `Vec3`s.
    #[inline]
    pub fn from_lanes(v: [Vec3; 4]) -> Self {
        Self {
            x: Vec4::new(v[0].x, v[1].x, v[2].x, v[3].x),
            y: Vec4::new(v[0].y, v[1].y, v[2].y, v[3].y),
            z: Vec4::new(v[0].z, v[1].z, v[2].z, v[3].z),
        }
    }
}

impl Default for SoaVec3 {
    fn default() -> Self {
        Self::ZERO
    }
}

/// Four joints' worth of a quaternion field, one lane per component.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct SoaQuat {
    pub x: Vec4,
    pub y: Vec4,
    pub z: Vec4,
    pub w: Vec4,
}

impl SoaQuat {
    pub const IDENTITY: Self = Self {
        x: Vec4::ZERO,
        y: Vec4::ZERO,
        z: Vec4::ZERO,
        w: Vec4::ONE,
    };

    #[inline]
    pub fn splat(q: Quat) -> Self {
        Self {
            x: Vec4::splat(q.x),
            y: Vec4::splat(q.y),
            z: Vec4::splat(q.z),
            w: Vec4::splat(q.w),
        }
    }

    #[inline]
    pub fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
            w: self.w + rhs.w,
        }
    }

    #[inline]
    pub fn mul_lane(self, w: Vec4) -> Self {
        Self {
            x: self.x * w,
            y: self.y * w,
            z: self.z * w,
            w: self.w * w,
        }
    }

    /// Per-lane dot product.
    #[inline]
    pub fn dot(self, rhs: Self) -> Vec4 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z + self.w * rhs.w
    }

    /// Negates lanes where `mask` is true (used to keep an accumulating sum
    /// of quaternions on the short-path hemisphere).
    #[inline]
    pub fn negate_where(self, mask: glam::BVec4) -> Self {
        let flip = Vec4::select(mask, Vec4::splat(-1.0), Vec4::ONE);
        self.mul_lane(flip)
    }

    #[inline]
    pub fn conjugate(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
            z: -self.z,
            w: self.w,
        }
    }

    /// Full per-lane quaternion product `self * rhs`.
    #[inline]
    pub fn mul(self, rhs: Self) -> Self {
        Self {
            x: self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            y: self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            z: self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            w: self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        }
    }

    /// Component-wise lerp followed by estimated-rsqrt normalization; valid
    /// when `self`/`rhs` lanes already share a hemisphere.
    #[inline]
    pub fn nlerp_est(self, rhs: Self, t: Vec4) -> Self {
        let lerped = Self {
            x: self.x + (rhs.x - self.x) * t,
            y: self.y + (rhs.y - self.y) * t,
            z: self.z + (rhs.z - self.z) * t,
            w: self.w + (rhs.w - self.w) * t,
        };
        lerped.normalize_est()
    }

    #[inline]
    pub fn normalize_est(self) -> Self {
        let len2 = self.dot(self);
        let rl = rsqrt_est_v4(len2.max(Vec4::splat(1e-12)));
        self.mul_lane(rl)
    }

    #[inline]
    pub fn lane(&self, lane: usize) -> Quat {
        Quat::from_xyzw(
            self.x.to_array()[lane],
            self.y.to_array()[lane],
            self.z.to_array()[lane],
            self.w.to_array()[lane],
        )
    }

    #[inline]
    pub fn from_lanes(q: [Quat; 4]) -> Self {
        Self {
            x: Vec4::new(q[0].x, q[1].x, q[2].x, q[3].x),
            y: Vec4::new(q[0].y, q[1].y, q[2].y, q[3].y),
            z: Vec4::new(q[0].z, q[1].z, q[2].z, q[3].z),
            w: Vec4::new(q[0].w, q[1].w, q[2].w, q[3].w),
        }
    }
}

impl Default for SoaQuat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Four joints' worth of local SRT transform.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct SoaTransform {
    pub translation: SoaVec3,
    pub rotation: SoaQuat,
    pub scale: SoaVec3,
}

impl SoaTransform {
    pub const IDENTITY: Self = Self {
        translation: SoaVec3::ZERO,
        rotation: SoaQuat::IDENTITY,
        scale: SoaVec3::ONE,
    };

    #[inline]
    pub fn lane(&self, lane: usize) -> (Vec3, Quat, Vec3) {
        (
            self.translation.lane(lane),
            self.rotation.lane(lane),
            self.scale.lane(lane),
        )
    }

    #[inline]
    pub fn from_lanes(lanes: [(Vec3, Quat, Vec3); 4]) -> Self {
        Self {
            translation: SoaVec3::from_lanes([lanes[0].0, lanes[1].0, lanes[2].0, lanes[3].0]),
            rotation: SoaQuat::from_lanes([lanes[0].1, lanes[1].1, lanes[2].1, lanes[3].1]),
            scale: SoaVec3::from_lanes([lanes[0].2, lanes[1].2, lanes[2].2, lanes[3].2]),
        }
    }

    /// Builds the SoA 4x4 affine matrices for this group in one vectorized
    /// pass, then splits them into four standalone `Mat4`s.
    #[inline]
    pub fn transpose_soa_to_aos(&self) -> [Mat4; 4] {
        let t = &self.translation;
        let r = &self.rotation;
        let s = &self.scale;

        let two = Vec4::splat(2.0);
        let one = Vec4::ONE;

        let xx = r.x * r.x * two;
        let yy = r.y * r.y * two;
        let zz = r.z * r.z * two;
        let xy = r.x * r.y * two;
        let xz = r.x * r.z * two;
        let yz = r.y * r.z * two;
        let wx = r.w * r.x * two;
        let wy = r.w * r.y * two;
        let wz = r.w * r.z * two;

        let c0x = (one - (yy + zz)) * s.x;
        let c0y = (xy + wz) * s.x;
        let c0z = (xz - wy) * s.x;

        let c1x = (xy - wz) * s.y;
        let c1y = (one - (xx + zz)) * s.y;
        let c1z = (yz + wx) * s.y;

        let c2x = (xz + wy) * s.z;
        let c2y = (yz - wx) * s.z;
        let c2z = (one - (xx + yy)) * s.z;

        let c0x = c0x.to_array();
        let c0y = c0y.to_array();
        let c0z = c0z.to_array();
        let c1x = c1x.to_array();
        let c1y = c1y.to_array();
        let c1z = c1z.to_array();
        let c2x = c2x.to_array();
        let c2y = c2y.to_array();
        let c2z = c2z.to_array();
        let tx = t.x.to_array();
        let ty = t.y.to_array();
        let tz = t.z.to_array();

        std::array::from_fn(|lane| {
            Mat4::from_cols(
                Vec4::new(c0x[lane], c0y[lane], c0z[lane], 0.0),
                Vec4::new(c1x[lane], c1y[lane], c1z[lane], 0.0),
                Vec4::new(c2x[lane], c2y[lane], c2z[lane], 0.0),
                Vec4::new(tx[lane], ty[lane], tz[lane], 1.0),
            )
        })
    }
}

impl Default for SoaTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}
