use thiserror::Error;

use crate::scheme::sps::SpsInfo;

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// profile_idc for which PTS=DTS is safe without an explicit reorder offset.
/// Baseline and constrained_baseline share profile_idc 66 (distinguished
/// only by `constraint_set1_flag`, not profile_idc); 88 is Extended, which
/// permits B-slices and reorder and must not be included here.
const BASELINE_PROFILE_IDCS: [u8; 1] = [66];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimestampError {
    #[error("timestamp generation requested for profile_idc {profile_idc}, which may reorder frames, without an explicit DTS offset")]
    UnsupportedProfileForTsGen { profile_idc: u8 },
}

/// Constant-framerate PTS/DTS synthesis. `framerate` is `(frames, seconds)`;
/// `pts(n) = floor(n * seconds * T / frames)` where `T` is
/// nanoseconds-per-second, matching the host time unit used for chunk
/// timestamps elsewhere in the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct TimestampGenerator {
    frames: u64,
    seconds: u64,
    max_b_reorder: u32,
    counter: u64,
}

impl TimestampGenerator {
    /// `max_b_reorder` is taken from the referenced SPS's
    /// `max_num_reorder_frames` when present, else defaults to 2.
    /// Rejects profiles known to reorder unless the caller has already
    /// established an explicit offset (i.e. went through
    /// [`Self::with_explicit_offset`] instead).
    pub fn new(framerate: (u64, u64), sps: Option<&SpsInfo>) -> Result<Self, TimestampError> {
        if let Some(sps) = sps {
            if !BASELINE_PROFILE_IDCS.contains(&sps.profile_idc) && sps.max_num_reorder_frames.is_none() {
                return Err(TimestampError::UnsupportedProfileForTsGen {
                    profile_idc: sps.profile_idc,
                });
            }
        }

        let max_b_reorder = sps.and_then(|s| s.max_num_reorder_frames).unwrap_or(2);
        Ok(Self {
            frames: framerate.0,
            seconds: framerate.1,
            max_b_reorder,
            counter: 0,
        })
    }

    pub fn with_explicit_offset(framerate: (u64, u64), max_b_reorder: u32) -> Self {
        Self {
            frames: framerate.0,
            seconds: framerate.1,
            max_b_reorder,
            counter: 0,
        }
    }

    /// Produces the next AU's (pts, dts) pair and advances the internal counter.
    pub fn next(&mut self) -> (i64, i64) {
        let n = self.counter;
        self.counter += 1;

        let pts = self.pts_for(n);
        let frame_period = self.pts_for(1) as i64;
        let dts = pts - frame_period * self.max_b_reorder as i64;
        (pts, dts)
    }

    fn pts_for(&self, n: u64) -> i64 {
        ((n as u128 * self.seconds as u128 * NANOS_PER_SECOND as u128) / self.frames as u128) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_framerate_pts_advances_by_frame_period() {
        let mut gen = TimestampGenerator::with_explicit_offset((30, 1), 0);
        let (pts0, dts0) = gen.next();
        let (pts1, _) = gen.next();
        assert_eq!(pts0, 0);
        assert_eq!(dts0, 0);
        assert_eq!(pts1, (NANOS_PER_SECOND / 30) as i64);
    }

    #[test]
    fn dts_lags_pts_by_reorder_offset() {
        let mut gen = TimestampGenerator::with_explicit_offset((25, 1), 2);
        gen.next();
        gen.next();
        let (pts, dts) = gen.next();
        let frame_period = (NANOS_PER_SECOND / 25) as i64;
        assert_eq!(dts, pts - frame_period * 2);
    }

    #[test]
    fn baseline_profile_does_not_require_an_explicit_offset() {
        let sps = SpsInfo {
            seq_parameter_set_id: 0,
            profile_idc: 66,
            constraint_set1_flag: false,
            constraint_set3_flag: false,
            constraint_set4_flag: false,
            constraint_set5_flag: false,
            level_idc: 30,
            chroma_format_idc: 1,
            separate_colour_plane_flag: false,
            frame_mbs_only_flag: true,
            pic_width_in_mbs_minus1: 0,
            pic_height_in_map_units_minus1: 0,
            frame_cropping_flag: false,
            frame_crop_left_offset: 0,
            frame_crop_right_offset: 0,
            frame_crop_top_offset: 0,
            frame_crop_bottom_offset: 0,
            log2_max_frame_num_minus4: 0,
            pic_order_cnt_type: 0,
            max_num_reorder_frames: None,
        };
        assert!(TimestampGenerator::new((30, 1), Some(&sps)).is_ok());
    }

    #[test]
    fn non_baseline_profile_without_reorder_info_is_rejected() {
        let sps = SpsInfo {
            seq_parameter_set_id: 0,
            profile_idc: 100,
            constraint_set1_flag: false,
            constraint_set3_flag: false,
            constraint_set4_flag: false,
            constraint_set5_flag: false,
            level_idc: 30,
            chroma_format_idc: 1,
            separate_colour_plane_flag: false,
            frame_mbs_only_flag: true,
            pic_width_in_mbs_minus1: 0,
            pic_height_in_map_units_minus1: 0,
            frame_cropping_flag: false,
            frame_crop_left_offset: 0,
            frame_crop_right_offset: 0,
            frame_crop_top_offset: 0,
            frame_crop_bottom_offset: 0,
            log2_max_frame_num_minus4: 0,
            pic_order_cnt_type: 0,
            max_num_reorder_frames: None,
        };
        let err = TimestampGenerator::new((30, 1), Some(&sps)).unwrap_err();
        assert_eq!(err, TimestampError::UnsupportedProfileForTsGen { profile_idc: 100 });
    }
}
