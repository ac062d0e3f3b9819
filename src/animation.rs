//! Compressed keyframe animation clip (spec.md §3 "Animation").
//!
//! Keyframes are stored pre-sorted per track, time-major, exactly as the
//! sampling job's cursor cache expects to consume them (see
//! `sampling_job.rs`). Grounded on `original_source/src/animation/runtime/
//! animation.cc`'s three-stream layout (translations/rotations/scales) and
//! its half-float / packed-quaternion compression.

use half::f16;

use crate::error::ArchiveError;
use crate::skeleton::ByteCursor;

/// Reciprocal of the largest representable signed 16-bit fixed-point
/// magnitude, used to decode a rotation component back into `[-1, 1]`.
const QUAT_INT_SCALE: f32 = 1.0 / 32_767.0;

/// Translation keyframe: half-float xyz, track-indexed, time-sorted per track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranslationKey {
    pub ratio: f32,
    pub track: u16,
    pub value: [f16; 3],
}

impl TranslationKey {
    #[inline]
    pub fn decompressed(&self) -> glam::Vec3 {
        glam::Vec3::new(
            self.value[0].to_f32(),
            self.value[1].to_f32(),
            self.value[2].to_f32(),
        )
    }
}

/// Scale keyframe, same shape as [`TranslationKey`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleKey {
    pub ratio: f32,
    pub track: u16,
    pub value: [f16; 3],
}

impl ScaleKey {
    #[inline]
    pub fn decompressed(&self) -> glam::Vec3 {
        glam::Vec3::new(
            self.value[0].to_f32(),
            self.value[1].to_f32(),
            self.value[2].to_f32(),
        )
    }
}

/// Rotation keyframe. `xyz` are quantized to signed 16-bit fixed point
/// (scale [`QUAT_INT_SCALE`]); `w` is reconstructed from the unit-length
/// constraint, with its sign carried as the top bit of `track_and_sign`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationKey {
    pub ratio: f32,
    track_and_sign: u16,
    pub value: [i16; 3],
}

impl RotationKey {
    const SIGN_BIT: u16 = 0x8000;
    const TRACK_MASK: u16 = 0x7fff;

    pub fn new(ratio: f32, track: u16, w_negative: bool, value: [i16; 3]) -> Self {
        debug_assert!(track & !Self::TRACK_MASK == 0, "track index must fit in 15 bits");
        let sign = if w_negative { Self::SIGN_BIT } else { 0 };
        Self {
            ratio,
            track_and_sign: track | sign,
            value,
        }
    }

    #[inline]
    pub fn track(&self) -> u16 {
        self.track_and_sign & Self::TRACK_MASK
    }

    #[inline]
    pub fn w_negative(&self) -> bool {
        self.track_and_sign & Self::SIGN_BIT != 0
    }

    /// Reconstructs the unit quaternion: `xyz` dequantized directly, `w`
    /// recovered via `sqrt(max(eps, 1 - x^2 - y^2 - z^2))` with the stored
    /// sign bit re-applied.
    pub fn decompressed(&self) -> glam::Quat {
        let x = self.value[0] as f32 * QUAT_INT_SCALE;
        let y = self.value[1] as f32 * QUAT_INT_SCALE;
        let z = self.value[2] as f32 * QUAT_INT_SCALE;
        let w2 = (1.0 - x * x - y * y - z * z).max(1e-10);
        let w = if self.w_negative() { -w2.sqrt() } else { w2.sqrt() };
        glam::Quat::from_xyzw(x, y, z, w)
    }
}

/// An immutable, compressed animation clip: three time-sorted keyframe
/// streams (one per SRT channel), each independently indexable by track.
#[derive(Debug, Clone)]
pub struct Animation {
    duration: f32,
    num_tracks: usize,
    name: String,
    translations: Vec<TranslationKey>,
    rotations: Vec<RotationKey>,
    scales: Vec<ScaleKey>,
    /// `track_starts[t]..track_starts[t + 1]` bounds track `t`'s run within
    /// the matching stream; both streams are grouped by track, then sorted
    /// by ratio within the group, so each track's keys are contiguous.
    translation_track_starts: Vec<u32>,
    rotation_track_starts: Vec<u32>,
    scale_track_starts: Vec<u32>,
}

fn track_starts(num_tracks: usize, track_of: impl Fn(usize) -> u16, len: usize) -> Vec<u32> {
    let mut starts = vec![len as u32; num_tracks + 1];
    let mut track = num_tracks;
    for i in (0..len).rev() {
        let t = track_of(i) as usize;
        while track > t {
            track -= 1;
            starts[track] = i as u32;
        }
    }
    starts
}

impl Animation {
    pub fn new(
        duration: f32,
        num_tracks: usize,
        name: String,
        translations: Vec<TranslationKey>,
        rotations: Vec<RotationKey>,
        scales: Vec<ScaleKey>,
    ) -> Result<Self, ArchiveError> {
        if !(duration > 0.0) {
            return Err(ArchiveError::NonPositiveDuration(duration));
        }
        for (i, k) in translations.iter().enumerate() {
            if k.track as usize >= num_tracks {
                return Err(ArchiveError::TrackOutOfRange { track: k.track, num_tracks });
            }
            if i > 0 {
                let prev = &translations[i - 1];
                if prev.track > k.track || (prev.track == k.track && prev.ratio > k.ratio) {
                    return Err(ArchiveError::UnsortedKeyframes { index: i });
                }
            }
        }
        for (i, k) in rotations.iter().enumerate() {
            if k.track() as usize >= num_tracks {
                return Err(ArchiveError::TrackOutOfRange { track: k.track(), num_tracks });
            }
            if i > 0 {
                let prev = &rotations[i - 1];
                if prev.track() > k.track() || (prev.track() == k.track() && prev.ratio > k.ratio) {
                    return Err(ArchiveError::UnsortedKeyframes { index: i });
                }
            }
        }
        for (i, k) in scales.iter().enumerate() {
            if k.track as usize >= num_tracks {
                return Err(ArchiveError::TrackOutOfRange { track: k.track, num_tracks });
            }
            if i > 0 {
                let prev = &scales[i - 1];
                if prev.track > k.track || (prev.track == k.track && prev.ratio > k.ratio) {
                    return Err(ArchiveError::UnsortedKeyframes { index: i });
                }
            }
        }

        let translation_track_starts =
            track_starts(num_tracks, |i| translations[i].track, translations.len());
        let rotation_track_starts =
            track_starts(num_tracks, |i| rotations[i].track(), rotations.len());
        let scale_track_starts = track_starts(num_tracks, |i| scales[i].track, scales.len());

        Ok(Self {
            duration,
            num_tracks,
            name,
            translations,
            rotations,
            scales,
            translation_track_starts,
            rotation_track_starts,
            scale_track_starts,
        })
    }

    #[inline]
    pub fn duration(&self) -> f32 {
        self.duration
    }

    #[inline]
    pub fn num_tracks(&self) -> usize {
        self.num_tracks
    }

    #[inline]
    pub fn num_soa_tracks(&self) -> usize {
        (self.num_tracks + 3) / 4
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn translations(&self) -> &[TranslationKey] {
        &self.translations
    }

    /// The time-sorted run of translation keys belonging to `track`.
    #[inline]
    pub fn translation_track(&self, track: usize) -> &[TranslationKey] {
        let start = self.translation_track_starts[track] as usize;
        let end = self.translation_track_starts[track + 1] as usize;
        &self.translations[start..end]
    }

    /// The time-sorted run of rotation keys belonging to `track`.
    #[inline]
    pub fn rotation_track(&self, track: usize) -> &[RotationKey] {
        let start = self.rotation_track_starts[track] as usize;
        let end = self.rotation_track_starts[track + 1] as usize;
        &self.rotations[start..end]
    }

    /// The time-sorted run of scale keys belonging to `track`.
    #[inline]
    pub fn scale_track(&self, track: usize) -> &[ScaleKey] {
        let start = self.scale_track_starts[track] as usize;
        let end = self.scale_track_starts[track + 1] as usize;
        &self.scales[start..end]
    }

    #[inline]
    pub fn rotations(&self) -> &[RotationKey] {
        &self.rotations
    }

    #[inline]
    pub fn scales(&self) -> &[ScaleKey] {
        &self.scales
    }

    /// Parses the §6 persistent animation format: header (duration_bits,
    /// num_tracks), then three length-prefixed keyframe streams. The format
    /// carries no name field, so archives round-trip through an empty name;
    /// callers that need one track it alongside the archive themselves.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArchiveError> {
        let mut cursor = ByteCursor::new(bytes);
        let duration = cursor.read_f32()?;
        let num_tracks = cursor.read_u32()? as usize;
        let name = String::new();

        let num_translations = cursor.read_u32()? as usize;
        let mut translations = Vec::with_capacity(num_translations);
        for _ in 0..num_translations {
            let track = cursor.read_u16()?;
            let ratio = cursor.read_f32()?;
            let value = [
                f16::from_bits(cursor.read_u16()?),
                f16::from_bits(cursor.read_u16()?),
                f16::from_bits(cursor.read_u16()?),
            ];
            translations.push(TranslationKey { ratio, track, value });
        }

        let num_rotations = cursor.read_u32()? as usize;
        let mut rotations = Vec::with_capacity(num_rotations);
        for _ in 0..num_rotations {
            let track_and_sign = cursor.read_u16()?;
            let ratio = cursor.read_f32()?;
            let value = [
                cursor.read_i16()?,
                cursor.read_i16()?,
                cursor.read_i16()?,
            ];
            rotations.push(RotationKey {
                ratio,
                track_and_sign,
                value,
            });
        }

        let num_scales = cursor.read_u32()? as usize;
        let mut scales = Vec::with_capacity(num_scales);
        for _ in 0..num_scales {
            let track = cursor.read_u16()?;
            let ratio = cursor.read_f32()?;
            let value = [
                f16::from_bits(cursor.read_u16()?),
                f16::from_bits(cursor.read_u16()?),
                f16::from_bits(cursor.read_u16()?),
            ];
            scales.push(ScaleKey { ratio, track, value });
        }

        Self::new(duration, num_tracks, name, translations, rotations, scales)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(ratio: f32, track: u16) -> TranslationKey {
        TranslationKey {
            ratio,
            track,
            value: [f16::from_f32(1.0), f16::from_f32(-1.0), f16::from_f32(5.0)],
        }
    }

    #[test]
    fn translation_key_decompresses_to_exact_half_float_value() {
        let k = key(0.3, 0);
        let v = k.decompressed();
        assert_eq!(v, glam::Vec3::new(1.0, -1.0, 5.0));
    }

    #[test]
    fn rotation_key_round_trips_a_known_quaternion() {
        let q = glam::Quat::from_rotation_y(0.7).normalize();
        let (sign, x, y, z) = if q.w < 0.0 {
            (true, -q.x, -q.y, -q.z)
        } else {
            (false, q.x, q.y, q.z)
        };
        let to_i16 = |c: f32| (c * 32_767.0).round() as i16;
        let k = RotationKey::new(0.0, 3, sign, [to_i16(x), to_i16(y), to_i16(z)]);
        assert_eq!(k.track(), 3);
        let decoded = k.decompressed();
        assert!((decoded.dot(q)).abs() > 0.999);
    }

    #[test]
    fn rejects_non_positive_duration() {
        let err = Animation::new(0.0, 1, "clip".into(), vec![], vec![], vec![]).unwrap_err();
        assert!(matches!(err, ArchiveError::NonPositiveDuration(_)));
    }

    #[test]
    fn rejects_unsorted_keyframes() {
        let err = Animation::new(
            1.0,
            1,
            "clip".into(),
            vec![key(0.5, 0), key(0.1, 0)],
            vec![],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, ArchiveError::UnsortedKeyframes { .. }));
    }

    #[test]
    fn rejects_track_out_of_range() {
        let err = Animation::new(1.0, 1, "clip".into(), vec![key(0.0, 7)], vec![], vec![])
            .unwrap_err();
        assert!(matches!(err, ArchiveError::TrackOutOfRange { .. }));
    }
}
