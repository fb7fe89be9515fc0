use crate::scheme::sps::SpsInfo;

/// Resolved picture dimensions derived from a parsed SPS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureDimensions {
    pub width: u32,
    pub height: u32,
}

fn chroma_subsample(chroma_format_idc: u8, separate_colour_plane_flag: bool) -> (u32, u32) {
    if separate_colour_plane_flag {
        return (1, 1);
    }
    match chroma_format_idc {
        1 => (2, 2),
        2 => (2, 1),
        3 => (1, 1),
        _ => (1, 1),
    }
}

/// `ChromaArrayType` per H.264 §7.4.2.1.1: 0 for monochrome or separate
/// colour planes, else `chroma_format_idc`.
fn chroma_array_type(sps: &SpsInfo) -> u8 {
    if sps.separate_colour_plane_flag {
        0
    } else {
        sps.chroma_format_idc
    }
}

pub fn derive_dimensions(sps: &SpsInfo) -> PictureDimensions {
    let width_in_mbs = sps.pic_width_in_mbs_minus1 + 1;
    let height_in_map_units = sps.pic_height_in_map_units_minus1 + 1;
    let frame_mbs_only = sps.frame_mbs_only_flag as u32;
    let height_in_mbs = (2 - frame_mbs_only) * height_in_map_units;

    let (sub_width_c, sub_height_c) = chroma_subsample(sps.chroma_format_idc, sps.separate_colour_plane_flag);

    let (crop_unit_x, crop_unit_y) = if chroma_array_type(sps) == 0 {
        (1, 2 - frame_mbs_only)
    } else {
        (sub_width_c, sub_height_c * (2 - frame_mbs_only))
    };

    let raw_width = 16 * width_in_mbs;
    let raw_height = 16 * height_in_mbs;

    let width = if sps.frame_cropping_flag {
        raw_width - crop_unit_x * (sps.frame_crop_left_offset + sps.frame_crop_right_offset)
    } else {
        raw_width
    };
    let height = if sps.frame_cropping_flag {
        raw_height - crop_unit_y * (sps.frame_crop_top_offset + sps.frame_crop_bottom_offset)
    } else {
        raw_height
    };

    PictureDimensions { width, height }
}

/// A recognized H.264 profile name, matched from `(profile_idc,
/// constraint_set*)` against the Annex A profile table (most specific entry
/// first).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    HighCavlc444Intra,
    ConstrainedBaseline,
    Baseline,
    Main,
    Extended,
    ConstrainedHigh,
    ProgressiveHigh,
    High,
    High10Intra,
    High10,
    High422Intra,
    High422,
    High444Intra,
    High444Predictive,
}

impl Profile {
    pub fn name(&self) -> &'static str {
        match self {
            Profile::HighCavlc444Intra => "high_cavlc_4_4_4_intra",
            Profile::ConstrainedBaseline => "constrained_baseline",
            Profile::Baseline => "baseline",
            Profile::Main => "main",
            Profile::Extended => "extended",
            Profile::ConstrainedHigh => "constrained_high",
            Profile::ProgressiveHigh => "progressive_high",
            Profile::High => "high",
            Profile::High10Intra => "high_10_intra",
            Profile::High10 => "high_10",
            Profile::High422Intra => "high_4_2_2_intra",
            Profile::High422 => "high_4_2_2",
            Profile::High444Intra => "high_4_4_4_intra",
            Profile::High444Predictive => "high_4_4_4_predictive",
        }
    }
}

pub fn recognize_profile(sps: &SpsInfo) -> Option<Profile> {
    let set1 = sps.constraint_set1_flag;
    let set3 = sps.constraint_set3_flag;
    let set4 = sps.constraint_set4_flag;
    let set5 = sps.constraint_set5_flag;

    match sps.profile_idc {
        44 => Some(Profile::HighCavlc444Intra),
        66 if set1 => Some(Profile::ConstrainedBaseline),
        66 => Some(Profile::Baseline),
        77 => Some(Profile::Main),
        88 => Some(Profile::Extended),
        100 if set4 && set5 => Some(Profile::ConstrainedHigh),
        100 if set4 => Some(Profile::ProgressiveHigh),
        100 => Some(Profile::High),
        110 if set3 => Some(Profile::High10Intra),
        110 => Some(Profile::High10),
        122 if set3 => Some(Profile::High422Intra),
        122 => Some(Profile::High422),
        244 if set3 => Some(Profile::High444Intra),
        244 => Some(Profile::High444Predictive),
        _ => None,
    }
}
