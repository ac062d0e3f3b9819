//! Immutable joint hierarchy + rest pose (spec.md §3 "Skeleton").
//!
//! Grounded on `Blodir-wgpu-test-3/src/renderer/render_resources/
//! skeletonfile.rs`'s serde-struct shape for on-disk skeleton data.

use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;
use crate::math::SoaTransform;

/// Root sentinel value for [`Skeleton::joint_parents`].
pub const NO_PARENT: i16 = -1;

/// Maximum joint count the runtime accepts (spec.md §3).
pub const MAX_JOINTS: usize = 1024;

/// Immutable after construction. Joint `i`'s parent index is always `< i`
/// (topological order), so index order is already a valid depth-first walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skeleton {
    joint_parents: Vec<i16>,
    rest_pose: Vec<SoaTransform>,
    joint_names: Vec<String>,
}

impl Skeleton {
    /// Builds a skeleton from its parts, validating the invariants in
    /// spec.md §3. Padding lanes in the last SoA group are filled with
    /// identity transforms so [`LocalToModelJob`](crate::local_to_model_job::LocalToModelJob)
    /// never reads garbage there.
    pub fn new(
        joint_parents: Vec<i16>,
        rest_pose_lanes: Vec<(glam::Vec3, glam::Quat, glam::Vec3)>,
        joint_names: Vec<String>,
    ) -> Result<Self, ArchiveError> {
        let num_joints = joint_parents.len();
        if num_joints > MAX_JOINTS {
            return Err(ArchiveError::TooManyJoints(num_joints));
        }
        if rest_pose_lanes.len() != num_joints {
            return Err(ArchiveError::ShapeMismatch {
                expected: num_joints,
                got: rest_pose_lanes.len(),
            });
        }
        if !joint_names.is_empty() && joint_names.len() != num_joints {
            return Err(ArchiveError::ShapeMismatch {
                expected: num_joints,
                got: joint_names.len(),
            });
        }
        for (i, &parent) in joint_parents.iter().enumerate() {
            if parent != NO_PARENT && parent as usize >= i {
                return Err(ArchiveError::NonTopologicalParent { joint: i, parent });
            }
        }

        let num_soa_joints = Self::num_soa_joints_for(num_joints);
        let mut rest_pose = Vec::with_capacity(num_soa_joints);
        for group in 0..num_soa_joints {
            let mut lanes = [
                (glam::Vec3::ZERO, glam::Quat::IDENTITY, glam::Vec3::ONE),
                (glam::Vec3::ZERO, glam::Quat::IDENTITY, glam::Vec3::ONE),
                (glam::Vec3::ZERO, glam::Quat::IDENTITY, glam::Vec3::ONE),
                (glam::Vec3::ZERO, glam::Quat::IDENTITY, glam::Vec3::ONE),
            ];
            for lane in 0..4 {
                let joint = group * 4 + lane;
                if joint < num_joints {
                    lanes[lane] = rest_pose_lanes[joint];
                }
            }
            rest_pose.push(SoaTransform::from_lanes(lanes));
        }

        Ok(Self {
            joint_parents,
            rest_pose,
            joint_names,
        })
    }

    #[inline]
    fn num_soa_joints_for(num_joints: usize) -> usize {
        (num_joints + 3) / 4
    }

    #[inline]
    pub fn num_joints(&self) -> usize {
        self.joint_parents.len()
    }

    #[inline]
    pub fn num_soa_joints(&self) -> usize {
        Self::num_soa_joints_for(self.num_joints())
    }

    #[inline]
    pub fn joint_parents(&self) -> &[i16] {
        &self.joint_parents
    }

    #[inline]
    pub fn parent(&self, joint: usize) -> Option<usize> {
        match self.joint_parents[joint] {
            NO_PARENT => None,
            p => Some(p as usize),
        }
    }

    #[inline]
    pub fn rest_pose(&self) -> &[SoaTransform] {
        &self.rest_pose
    }

    #[inline]
    pub fn joint_names(&self) -> &[String] {
        &self.joint_names
    }

    pub fn joint_index_by_name(&self, name: &str) -> Option<usize> {
        self.joint_names.iter().position(|n| n == name)
    }

    /// Parses the §6 persistent skeleton format: `u32 num_joints`, the
    /// parent index array (i16 each), one SoaTransform per SoA group (48
    /// floats = 192 bytes: translation/rotation/scale each stored as four
    /// 4-wide arrays for a uniform stride, translation/scale's fourth array
    /// unused padding), then a length-prefixed string table.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArchiveError> {
        let mut cursor = ByteCursor::new(bytes);
        let num_joints = cursor.read_u32()? as usize;
        if num_joints > MAX_JOINTS {
            return Err(ArchiveError::TooManyJoints(num_joints));
        }

        let mut joint_parents = Vec::with_capacity(num_joints);
        for _ in 0..num_joints {
            joint_parents.push(cursor.read_i16()?);
        }

        let num_soa_joints = Self::num_soa_joints_for(num_joints);
        let mut rest_pose_lanes = Vec::with_capacity(num_joints);
        for group in 0..num_soa_joints {
            let mut floats = [0f32; 48];
            for f in floats.iter_mut() {
                *f = cursor.read_f32()?;
            }
            for lane in 0..4 {
                let joint = group * 4 + lane;
                if joint >= num_joints {
                    break;
                }
                // Translation/rotation/scale each occupy a 16-float (4x4)
                // span for a uniform stride; translation and scale only use
                // their first three arrays, leaving the fourth unused.
                let t = glam::Vec3::new(
                    floats[lane],
                    floats[4 + lane],
                    floats[8 + lane],
                );
                let r = glam::Quat::from_xyzw(
                    floats[16 + lane],
                    floats[20 + lane],
                    floats[24 + lane],
                    floats[28 + lane],
                );
                let s = glam::Vec3::new(
                    floats[32 + lane],
                    floats[36 + lane],
                    floats[40 + lane],
                );
                rest_pose_lanes.push((t, r, s));
            }
        }

        let mut joint_names = Vec::with_capacity(num_joints);
        for _ in 0..num_joints {
            let len = cursor.read_u32()? as usize;
            joint_names.push(cursor.read_string(len)?);
        }

        Self::new(joint_parents, rest_pose_lanes, joint_names)
    }
}

pub(crate) struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ArchiveError> {
        if self.pos + n > self.bytes.len() {
            return Err(ArchiveError::UnexpectedEof);
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u32(&mut self) -> Result<u32, ArchiveError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_u16(&mut self) -> Result<u16, ArchiveError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_i16(&mut self) -> Result<i16, ArchiveError> {
        Ok(i16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_f32(&mut self) -> Result<f32, ArchiveError> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_string(&mut self, len: usize) -> Result<String, ArchiveError> {
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ArchiveError::InvalidUtf8)
    }
}
