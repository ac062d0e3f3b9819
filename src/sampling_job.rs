//! Keyframe decompression + interpolation (spec.md §4.1 "SamplingJob").
//!
//! Grounded on `original_source/src/animation/runtime/sampling_job.cc`'s
//! incremental cursor cache: advancing `ratio` forward moves each track's
//! bracket cursor by a handful of steps rather than re-searching from
//! scratch, and `anim_pose.rs`'s `bin_search_anim_indices`/
//! `interpolate_channel_value_vec3` for the bracket + lerp shape this keeps.

use glam::{Quat, Vec3};

use crate::animation::Animation;
use crate::math::SoaTransform;

/// Per-track bracket cursor, reused across calls so that monotonically
/// increasing sampling time only ever nudges the cursor forward.
#[derive(Debug, Clone)]
pub struct SamplingContext {
    num_tracks: usize,
    last_ratio: f32,
    translation_cursors: Vec<usize>,
    rotation_cursors: Vec<usize>,
    scale_cursors: Vec<usize>,
}

impl SamplingContext {
    pub fn new(num_tracks: usize) -> Self {
        Self {
            num_tracks,
            last_ratio: -1.0,
            translation_cursors: vec![1; num_tracks],
            rotation_cursors: vec![1; num_tracks],
            scale_cursors: vec![1; num_tracks],
        }
    }

    /// Reuses the allocation for an animation with a different track count,
    /// resetting every cursor.
    pub fn resize(&mut self, num_tracks: usize) {
        self.num_tracks = num_tracks;
        self.last_ratio = -1.0;
        self.translation_cursors.clear();
        self.translation_cursors.resize(num_tracks, 1);
        self.rotation_cursors.clear();
        self.rotation_cursors.resize(num_tracks, 1);
        self.scale_cursors.clear();
        self.scale_cursors.resize(num_tracks, 1);
    }

    /// Forces every cursor back to a cold state; use when jumping to an
    /// unrelated point in time (e.g. a hard animation restart or a large
    /// rewind) where advancing step by step would be more expensive than a
    /// fresh bracket search.
    pub fn invalidate(&mut self) {
        self.last_ratio = -1.0;
        self.translation_cursors.iter_mut().for_each(|c| *c = 1);
        self.rotation_cursors.iter_mut().for_each(|c| *c = 1);
        self.scale_cursors.iter_mut().for_each(|c| *c = 1);
    }

    #[inline]
    pub fn num_tracks(&self) -> usize {
        self.num_tracks
    }

    /// The ratio sampled by the most recent `SamplingJob::run`, or `-1.0` if
    /// this context has never been run or was just invalidated.
    #[inline]
    pub fn last_ratio(&self) -> f32 {
        self.last_ratio
    }
}

/// Moves `cursor` so that `keys[cursor - 1].ratio <= ratio <= keys[cursor].ratio`
/// (clamped at the ends), then returns `(prev, next)` bracket indices.
///
/// Unlike spec.md §3/§4.2's `animation_ref`/`last_time`-guarded cursor (which
/// resets to a cold seed on animation switch or backward time before
/// stepping forward), this search is bidirectional: it walks forward when
/// the cached bracket is behind `ratio` and backward when it has overshot.
/// That makes it self-correcting regardless of what the cursor last pointed
/// into — a fresh animation with a different key layout, or a hard
/// rewind — so there is no separate invalidation path to keep in sync; do
/// not reintroduce one without removing this backward-walking half.
fn bracket(len: usize, ratio_of: impl Fn(usize) -> f32, ratio: f32, cursor: &mut usize) -> (usize, usize) {
    if len <= 1 {
        return (0, 0);
    }
    let mut c = (*cursor).clamp(1, len - 1);
    while c < len - 1 && ratio_of(c) < ratio {
        c += 1;
    }
    while c > 1 && ratio_of(c - 1) > ratio {
        c -= 1;
    }
    *cursor = c;
    (c - 1, c)
}

#[inline]
fn local_ratio(prev_ratio: f32, next_ratio: f32, ratio: f32) -> f32 {
    let span = next_ratio - prev_ratio;
    if span <= f32::EPSILON {
        0.0
    } else {
        ((ratio - prev_ratio) / span).clamp(0.0, 1.0)
    }
}

/// Samples `animation` at normalized time `ratio` (expected in `[0, 1]`;
/// callers implement clamp/loop/ping-pong wrapping before calling in, per
/// spec.md §4.1) into `output`, one [`SoaTransform`] per SoA track group.
pub struct SamplingJob<'a> {
    pub animation: &'a Animation,
    pub ratio: f32,
    pub context: &'a mut SamplingContext,
    pub output: &'a mut [SoaTransform],
}

impl<'a> SamplingJob<'a> {
    /// Validates shapes without sampling. Mirrors the teacher jobs' pattern
    /// of a cheap `validate` callers can use before `run`.
    pub fn validate(&self) -> bool {
        // The context only needs to be at least as big as this animation
        // (spec.md §3: `max_soa_tracks >= animation.num_soa_tracks`) so one
        // context sized for the largest clip can be rebound across smaller
        // ones; cursors for tracks beyond `num_tracks` are simply unused.
        self.context.num_tracks() >= self.animation.num_tracks()
            && self.output.len() >= self.animation.num_soa_tracks()
            && self.ratio.is_finite()
    }

    pub fn run(&mut self) -> bool {
        if !self.validate() {
            return false;
        }
        let ratio = self.ratio.clamp(0.0, 1.0);
        let anim = self.animation;
        let num_tracks = anim.num_tracks();
        let num_soa_tracks = anim.num_soa_tracks();

        for group in 0..num_soa_tracks {
            let mut lanes = [
                (Vec3::ZERO, Quat::IDENTITY, Vec3::ONE),
                (Vec3::ZERO, Quat::IDENTITY, Vec3::ONE),
                (Vec3::ZERO, Quat::IDENTITY, Vec3::ONE),
                (Vec3::ZERO, Quat::IDENTITY, Vec3::ONE),
            ];
            for lane in 0..4 {
                let track = group * 4 + lane;
                if track >= num_tracks {
                    break;
                }
                let t = sample_translation(anim, track, ratio, &mut self.context.translation_cursors[track]);
                let r = sample_rotation(anim, track, ratio, &mut self.context.rotation_cursors[track]);
                let s = sample_scale(anim, track, ratio, &mut self.context.scale_cursors[track]);
                lanes[lane] = (t, r, s);
            }
            self.output[group] = SoaTransform::from_lanes(lanes);
        }

        self.context.last_ratio = ratio;
        true
    }
}

fn sample_translation(anim: &Animation, track: usize, ratio: f32, cursor: &mut usize) -> Vec3 {
    let keys = anim.translation_track(track);
    if keys.is_empty() {
        return Vec3::ZERO;
    }
    let (prev, next) = bracket(keys.len(), |i| keys[i].ratio, ratio, cursor);
    let t = local_ratio(keys[prev].ratio, keys[next].ratio, ratio);
    keys[prev].decompressed().lerp(keys[next].decompressed(), t)
}

fn sample_scale(anim: &Animation, track: usize, ratio: f32, cursor: &mut usize) -> Vec3 {
    let keys = anim.scale_track(track);
    if keys.is_empty() {
        return Vec3::ONE;
    }
    let (prev, next) = bracket(keys.len(), |i| keys[i].ratio, ratio, cursor);
    let t = local_ratio(keys[prev].ratio, keys[next].ratio, ratio);
    keys[prev].decompressed().lerp(keys[next].decompressed(), t)
}

fn sample_rotation(anim: &Animation, track: usize, ratio: f32, cursor: &mut usize) -> Quat {
    let keys = anim.rotation_track(track);
    if keys.is_empty() {
        return Quat::IDENTITY;
    }
    let (prev, next) = bracket(keys.len(), |i| keys[i].ratio, ratio, cursor);
    let t = local_ratio(keys[prev].ratio, keys[next].ratio, ratio);
    let a = keys[prev].decompressed();
    let mut b = keys[next].decompressed();
    if a.dot(b) < 0.0 {
        b = -b;
    }
    crate::math::nlerp_est(a, b, t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{RotationKey, ScaleKey, TranslationKey};
    use half::f16;

    fn single_track_animation() -> Animation {
        let translations = vec![
            TranslationKey { ratio: 0.0, track: 0, value: [f16::from_f32(0.0); 3] },
            TranslationKey {
                ratio: 1.0,
                track: 0,
                value: [f16::from_f32(1.0), f16::from_f32(-1.0), f16::from_f32(5.0)],
            },
        ];
        let rotations = vec![
            RotationKey::new(0.0, 0, false, [0, 0, 0]),
            RotationKey::new(1.0, 0, false, [0, 0, 0]),
        ];
        let scales = vec![
            ScaleKey { ratio: 0.0, track: 0, value: [f16::from_f32(1.0); 3] },
            ScaleKey { ratio: 1.0, track: 0, value: [f16::from_f32(1.0); 3] },
        ];
        Animation::new(1.0, 1, "clip".into(), translations, rotations, scales).unwrap()
    }

    #[test]
    fn samples_translation_at_thirty_percent() {
        let anim = single_track_animation();
        let mut ctx = SamplingContext::new(1);
        let mut output = vec![SoaTransform::IDENTITY; anim.num_soa_tracks()];
        let mut job = SamplingJob {
            animation: &anim,
            ratio: 0.3,
            context: &mut ctx,
            output: &mut output,
        };
        assert!(job.run());
        let (t, _, _) = output[0].lane(0);
        assert!((t - Vec3::new(0.3, -0.3, 1.5)).length() < 1e-3);
    }

    #[test]
    fn cursor_advances_monotonically_across_frames() {
        let anim = single_track_animation();
        let mut ctx = SamplingContext::new(1);
        let mut output = vec![SoaTransform::IDENTITY; anim.num_soa_tracks()];
        for ratio in [0.0, 0.2, 0.4, 0.6, 0.8, 1.0] {
            let mut job = SamplingJob {
                animation: &anim,
                ratio,
                context: &mut ctx,
                output: &mut output,
            };
            assert!(job.run());
        }
        let (t, _, _) = output[0].lane(0);
        assert!((t - Vec3::new(1.0, -1.0, 5.0)).length() < 1e-3);
    }

    #[test]
    fn validate_rejects_undersized_context() {
        let anim = Animation::new(
            1.0,
            2,
            "clip".into(),
            vec![
                TranslationKey { ratio: 0.0, track: 0, value: [f16::from_f32(0.0); 3] },
                TranslationKey { ratio: 1.0, track: 0, value: [f16::from_f32(0.0); 3] },
                TranslationKey { ratio: 0.0, track: 1, value: [f16::from_f32(0.0); 3] },
                TranslationKey { ratio: 1.0, track: 1, value: [f16::from_f32(0.0); 3] },
            ],
            vec![
                RotationKey::new(0.0, 0, false, [0, 0, 0]),
                RotationKey::new(1.0, 0, false, [0, 0, 0]),
                RotationKey::new(0.0, 1, false, [0, 0, 0]),
                RotationKey::new(1.0, 1, false, [0, 0, 0]),
            ],
            vec![
                ScaleKey { ratio: 0.0, track: 0, value: [f16::from_f32(1.0); 3] },
                ScaleKey { ratio: 1.0, track: 0, value: [f16::from_f32(1.0); 3] },
                ScaleKey { ratio: 0.0, track: 1, value: [f16::from_f32(1.0); 3] },
                ScaleKey { ratio: 1.0, track: 1, value: [f16::from_f32(1.0); 3] },
            ],
        )
        .unwrap();
        let mut ctx = SamplingContext::new(1);
        let mut output = vec![SoaTransform::IDENTITY; anim.num_soa_tracks()];
        let job = SamplingJob {
            animation: &anim,
            ratio: 0.5,
            context: &mut ctx,
            output: &mut output,
        };
        assert!(!job.validate());
    }

    #[test]
    fn oversized_context_rebinds_to_a_smaller_animation() {
        let anim = single_track_animation();
        let mut ctx = SamplingContext::new(4);
        let mut output = vec![SoaTransform::IDENTITY; anim.num_soa_tracks()];
        let mut job = SamplingJob {
            animation: &anim,
            ratio: 0.3,
            context: &mut ctx,
            output: &mut output,
        };
        assert!(job.run());
        let (t, _, _) = output[0].lane(0);
        assert!((t - Vec3::new(0.3, -0.3, 1.5)).length() < 1e-3);
    }
}
