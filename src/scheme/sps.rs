use std::collections::HashMap;

use super::{
    read_bool_field, read_se_field, read_u_field, read_ue_field, Directive, FieldKind, FieldValue,
    GlobalState, LocalState, Namespace, Scheme, SchemeError,
};
use crate::bitstream::BitReader;

/// profile_idc values that carry the extended chroma/bit-depth/scaling-matrix
/// syntax (H.264 §7.3.2.1.1).
const HIGH_PROFILE_IDCS: [u64; 9] = [100, 110, 122, 244, 44, 83, 86, 118, 128];

fn is_high_profile(local: &LocalState) -> bool {
    HIGH_PROFILE_IDCS.contains(&local.get_u64("profile_idc").unwrap_or(0))
}

fn not_frame_mbs_only(local: &LocalState) -> bool {
    !local.get_bool("frame_mbs_only_flag").unwrap_or(true)
}

fn frame_cropping_flag(local: &LocalState) -> bool {
    local.get_bool("frame_cropping_flag").unwrap_or(false)
}

fn vui_parameters_present(local: &LocalState) -> bool {
    local.get_bool("vui_parameters_present_flag").unwrap_or(false)
}

/// Reads one `scaling_list(size)` (H.264 §7.3.2.1.1.1) and discards its content -
/// downstream code only needs to know a scaling matrix was present, not its
/// values, so this is an `execute()` directive rather than a declarative one.
fn skip_scaling_list(reader: &mut BitReader, size: u32) -> Result<(), SchemeError> {
    let mut last_scale: i64 = 8;
    let mut next_scale: i64 = 8;
    for j in 0..size {
        if next_scale != 0 {
            let delta_scale = read_se_field(reader, "delta_scale")?;
            next_scale = (last_scale + delta_scale + 256) % 256;
        }
        let scale = if next_scale == 0 { last_scale } else { next_scale };
        last_scale = scale;
        let _ = j;
    }
    Ok(())
}

fn parse_high_profile_fields(
    reader: &mut BitReader,
    local: &mut LocalState,
    _global: &GlobalState,
) -> Result<(), SchemeError> {
    let chroma_format_idc = read_ue_field(reader, "chroma_format_idc")?;
    local.set("chroma_format_idc", FieldValue::U(chroma_format_idc));

    if chroma_format_idc == 3 {
        let flag = read_bool_field(reader, "separate_colour_plane_flag")?;
        local.set("separate_colour_plane_flag", FieldValue::Bool(flag));
    }

    let bit_depth_luma_minus8 = read_ue_field(reader, "bit_depth_luma_minus8")?;
    local.set("bit_depth_luma_minus8", FieldValue::U(bit_depth_luma_minus8));
    let bit_depth_chroma_minus8 = read_ue_field(reader, "bit_depth_chroma_minus8")?;
    local.set("bit_depth_chroma_minus8", FieldValue::U(bit_depth_chroma_minus8));

    let bypass_flag = read_bool_field(reader, "qpprime_y_zero_transform_bypass_flag")?;
    local.set(
        "qpprime_y_zero_transform_bypass_flag",
        FieldValue::Bool(bypass_flag),
    );

    let scaling_matrix_present = read_bool_field(reader, "seq_scaling_matrix_present_flag")?;
    local.set(
        "seq_scaling_matrix_present_flag",
        FieldValue::Bool(scaling_matrix_present),
    );

    if scaling_matrix_present {
        let list_count = if chroma_format_idc != 3 { 8 } else { 12 };
        for i in 0..list_count {
            let present = read_bool_field(reader, "seq_scaling_list_present_flag")?;
            if present {
                let size = if i < 6 { 16 } else { 64 };
                skip_scaling_list(reader, size)?;
            }
        }
    }

    Ok(())
}

/// pic_order_cnt_type-dependent fields (H.264 §7.3.2.1.1).
fn parse_poc_fields(
    reader: &mut BitReader,
    local: &mut LocalState,
    _global: &GlobalState,
) -> Result<(), SchemeError> {
    match local.get_u64("pic_order_cnt_type") {
        Some(0) => {
            let v = read_ue_field(reader, "log2_max_pic_order_cnt_lsb_minus4")?;
            local.set("log2_max_pic_order_cnt_lsb_minus4", FieldValue::U(v));
        }
        Some(1) => {
            let delta_always_zero = read_bool_field(reader, "delta_pic_order_always_zero_flag")?;
            local.set(
                "delta_pic_order_always_zero_flag",
                FieldValue::Bool(delta_always_zero),
            );
            let offset_for_non_ref_pic = read_se_field(reader, "offset_for_non_ref_pic")?;
            local.set("offset_for_non_ref_pic", FieldValue::S(offset_for_non_ref_pic));
            let offset_for_top_to_bottom_field =
                read_se_field(reader, "offset_for_top_to_bottom_field")?;
            local.set(
                "offset_for_top_to_bottom_field",
                FieldValue::S(offset_for_top_to_bottom_field),
            );
            let num_ref_frames_in_poc_cycle =
                read_ue_field(reader, "num_ref_frames_in_pic_order_cnt_cycle")?;
            local.set(
                "num_ref_frames_in_pic_order_cnt_cycle",
                FieldValue::U(num_ref_frames_in_poc_cycle),
            );
            let mut offsets = Vec::with_capacity(num_ref_frames_in_poc_cycle as usize);
            for _ in 0..num_ref_frames_in_poc_cycle {
                offsets.push(FieldValue::S(read_se_field(reader, "offset_for_ref_frame")?));
            }
            local.set("offset_for_ref_frame", FieldValue::List(offsets));
        }
        _ => {}
    }
    Ok(())
}

/// HRD parameters (H.264 §E.1.2), nested under the VUI.
fn parse_hrd_parameters(
    reader: &mut BitReader,
    local: &mut LocalState,
    _global: &GlobalState,
) -> Result<(), SchemeError> {
    let cpb_cnt_minus1 = read_ue_field(reader, "cpb_cnt_minus1")?;
    local.set("cpb_cnt_minus1", FieldValue::U(cpb_cnt_minus1));
    local.set(
        "bit_rate_scale",
        FieldValue::U(read_u_field(reader, "bit_rate_scale", 4)?),
    );
    local.set(
        "cpb_size_scale",
        FieldValue::U(read_u_field(reader, "cpb_size_scale", 4)?),
    );

    let mut schedule = Vec::with_capacity(cpb_cnt_minus1 as usize + 1);
    for _ in 0..=cpb_cnt_minus1 {
        let mut entry = HashMap::new();
        entry.insert(
            "bit_rate_value_minus1",
            FieldValue::U(read_ue_field(reader, "bit_rate_value_minus1")?),
        );
        entry.insert(
            "cpb_size_value_minus1",
            FieldValue::U(read_ue_field(reader, "cpb_size_value_minus1")?),
        );
        entry.insert(
            "cbr_flag",
            FieldValue::Bool(read_bool_field(reader, "cbr_flag")?),
        );
        schedule.push(FieldValue::Map(entry));
    }
    local.set("hrd_schedule", FieldValue::List(schedule));

    local.set(
        "initial_cpb_removal_delay_length_minus1",
        FieldValue::U(read_u_field(reader, "initial_cpb_removal_delay_length_minus1", 5)?),
    );
    local.set(
        "cpb_removal_delay_length_minus1",
        FieldValue::U(read_u_field(reader, "cpb_removal_delay_length_minus1", 5)?),
    );
    local.set(
        "dpb_output_delay_length_minus1",
        FieldValue::U(read_u_field(reader, "dpb_output_delay_length_minus1", 5)?),
    );
    local.set(
        "time_offset_length",
        FieldValue::U(read_u_field(reader, "time_offset_length", 5)?),
    );
    Ok(())
}

/// vui_parameters() (H.264 Annex E), including timing info and optional NAL/VCL HRD.
fn parse_vui(
    reader: &mut BitReader,
    local: &mut LocalState,
    global: &GlobalState,
) -> Result<(), SchemeError> {
    let aspect_ratio_info_present = read_bool_field(reader, "aspect_ratio_info_present_flag")?;
    local.set(
        "aspect_ratio_info_present_flag",
        FieldValue::Bool(aspect_ratio_info_present),
    );
    if aspect_ratio_info_present {
        let aspect_ratio_idc = read_u_field(reader, "aspect_ratio_idc", 8)?;
        local.set("aspect_ratio_idc", FieldValue::U(aspect_ratio_idc));
        if aspect_ratio_idc == 255 {
            local.set("sar_width", FieldValue::U(read_u_field(reader, "sar_width", 16)?));
            local.set("sar_height", FieldValue::U(read_u_field(reader, "sar_height", 16)?));
        }
    }

    let overscan_info_present = read_bool_field(reader, "overscan_info_present_flag")?;
    local.set("overscan_info_present_flag", FieldValue::Bool(overscan_info_present));
    if overscan_info_present {
        local.set(
            "overscan_appropriate_flag",
            FieldValue::Bool(read_bool_field(reader, "overscan_appropriate_flag")?),
        );
    }

    let video_signal_type_present = read_bool_field(reader, "video_signal_type_present_flag")?;
    local.set(
        "video_signal_type_present_flag",
        FieldValue::Bool(video_signal_type_present),
    );
    if video_signal_type_present {
        local.set("video_format", FieldValue::U(read_u_field(reader, "video_format", 3)?));
        local.set(
            "video_full_range_flag",
            FieldValue::Bool(read_bool_field(reader, "video_full_range_flag")?),
        );
        let colour_description_present = read_bool_field(reader, "colour_description_present_flag")?;
        local.set(
            "colour_description_present_flag",
            FieldValue::Bool(colour_description_present),
        );
        if colour_description_present {
            local.set(
                "colour_primaries",
                FieldValue::U(read_u_field(reader, "colour_primaries", 8)?),
            );
            local.set(
                "transfer_characteristics",
                FieldValue::U(read_u_field(reader, "transfer_characteristics", 8)?),
            );
            local.set(
                "matrix_coefficients",
                FieldValue::U(read_u_field(reader, "matrix_coefficients", 8)?),
            );
        }
    }

    let chroma_loc_info_present = read_bool_field(reader, "chroma_loc_info_present_flag")?;
    local.set(
        "chroma_loc_info_present_flag",
        FieldValue::Bool(chroma_loc_info_present),
    );
    if chroma_loc_info_present {
        local.set(
            "chroma_sample_loc_type_top_field",
            FieldValue::U(read_ue_field(reader, "chroma_sample_loc_type_top_field")?),
        );
        local.set(
            "chroma_sample_loc_type_bottom_field",
            FieldValue::U(read_ue_field(reader, "chroma_sample_loc_type_bottom_field")?),
        );
    }

    let timing_info_present = read_bool_field(reader, "timing_info_present_flag")?;
    local.set("timing_info_present_flag", FieldValue::Bool(timing_info_present));
    if timing_info_present {
        local.set(
            "num_units_in_tick",
            FieldValue::U(read_u_field(reader, "num_units_in_tick", 32)?),
        );
        local.set("time_scale", FieldValue::U(read_u_field(reader, "time_scale", 32)?));
        local.set(
            "fixed_frame_rate_flag",
            FieldValue::Bool(read_bool_field(reader, "fixed_frame_rate_flag")?),
        );
    }

    let nal_hrd_present = read_bool_field(reader, "nal_hrd_parameters_present_flag")?;
    local.set(
        "nal_hrd_parameters_present_flag",
        FieldValue::Bool(nal_hrd_present),
    );
    if nal_hrd_present {
        parse_hrd_parameters(reader, local, global)?;
    }

    let vcl_hrd_present = read_bool_field(reader, "vcl_hrd_parameters_present_flag")?;
    local.set(
        "vcl_hrd_parameters_present_flag",
        FieldValue::Bool(vcl_hrd_present),
    );
    if vcl_hrd_present {
        parse_hrd_parameters(reader, local, global)?;
    }

    if nal_hrd_present || vcl_hrd_present {
        local.set(
            "low_delay_hrd_flag",
            FieldValue::Bool(read_bool_field(reader, "low_delay_hrd_flag")?),
        );
    }

    local.set(
        "pic_struct_present_flag",
        FieldValue::Bool(read_bool_field(reader, "pic_struct_present_flag")?),
    );

    let bitstream_restriction_present = read_bool_field(reader, "bitstream_restriction_flag")?;
    local.set(
        "bitstream_restriction_flag",
        FieldValue::Bool(bitstream_restriction_present),
    );
    if bitstream_restriction_present {
        local.set(
            "motion_vectors_over_pic_boundaries_flag",
            FieldValue::Bool(read_bool_field(reader, "motion_vectors_over_pic_boundaries_flag")?),
        );
        local.set(
            "max_bytes_per_pic_denom",
            FieldValue::U(read_ue_field(reader, "max_bytes_per_pic_denom")?),
        );
        local.set(
            "max_bits_per_mb_denom",
            FieldValue::U(read_ue_field(reader, "max_bits_per_mb_denom")?),
        );
        local.set(
            "log2_max_mv_length_horizontal",
            FieldValue::U(read_ue_field(reader, "log2_max_mv_length_horizontal")?),
        );
        local.set(
            "log2_max_mv_length_vertical",
            FieldValue::U(read_ue_field(reader, "log2_max_mv_length_vertical")?),
        );
        let max_num_reorder_frames = read_ue_field(reader, "max_num_reorder_frames")?;
        local.set("max_num_reorder_frames", FieldValue::U(max_num_reorder_frames));
        local.set(
            "max_dec_frame_buffering",
            FieldValue::U(read_ue_field(reader, "max_dec_frame_buffering")?),
        );
    }

    Ok(())
}

pub const SPS_SCHEME: Scheme = &[
    Directive::Field {
        name: "profile_idc",
        kind: FieldKind::U(8),
    },
    Directive::Field {
        name: "constraint_set0_flag",
        kind: FieldKind::Bool,
    },
    Directive::Field {
        name: "constraint_set1_flag",
        kind: FieldKind::Bool,
    },
    Directive::Field {
        name: "constraint_set2_flag",
        kind: FieldKind::Bool,
    },
    Directive::Field {
        name: "constraint_set3_flag",
        kind: FieldKind::Bool,
    },
    Directive::Field {
        name: "constraint_set4_flag",
        kind: FieldKind::Bool,
    },
    Directive::Field {
        name: "constraint_set5_flag",
        kind: FieldKind::Bool,
    },
    Directive::Field {
        name: "reserved_zero_2bits",
        kind: FieldKind::U(2),
    },
    Directive::Field {
        name: "level_idc",
        kind: FieldKind::U(8),
    },
    Directive::Field {
        name: "seq_parameter_set_id",
        kind: FieldKind::Ue,
    },
    Directive::If {
        cond: is_high_profile,
        body: &[Directive::Execute {
            run: parse_high_profile_fields,
        }],
    },
    Directive::Field {
        name: "log2_max_frame_num_minus4",
        kind: FieldKind::Ue,
    },
    Directive::Field {
        name: "pic_order_cnt_type",
        kind: FieldKind::Ue,
    },
    Directive::Execute {
        run: parse_poc_fields,
    },
    Directive::Field {
        name: "max_num_ref_frames",
        kind: FieldKind::Ue,
    },
    Directive::Field {
        name: "gaps_in_frame_num_value_allowed_flag",
        kind: FieldKind::Bool,
    },
    Directive::Field {
        name: "pic_width_in_mbs_minus1",
        kind: FieldKind::Ue,
    },
    Directive::Field {
        name: "pic_height_in_map_units_minus1",
        kind: FieldKind::Ue,
    },
    Directive::Field {
        name: "frame_mbs_only_flag",
        kind: FieldKind::Bool,
    },
    Directive::If {
        cond: not_frame_mbs_only,
        body: &[Directive::Field {
            name: "mb_adaptive_frame_field_flag",
            kind: FieldKind::Bool,
        }],
    },
    Directive::Field {
        name: "direct_8x8_inference_flag",
        kind: FieldKind::Bool,
    },
    Directive::Field {
        name: "frame_cropping_flag",
        kind: FieldKind::Bool,
    },
    Directive::If {
        cond: frame_cropping_flag,
        body: &[
            Directive::Field {
                name: "frame_crop_left_offset",
                kind: FieldKind::Ue,
            },
            Directive::Field {
                name: "frame_crop_right_offset",
                kind: FieldKind::Ue,
            },
            Directive::Field {
                name: "frame_crop_top_offset",
                kind: FieldKind::Ue,
            },
            Directive::Field {
                name: "frame_crop_bottom_offset",
                kind: FieldKind::Ue,
            },
        ],
    },
    Directive::Field {
        name: "vui_parameters_present_flag",
        kind: FieldKind::Bool,
    },
    Directive::If {
        cond: vui_parameters_present,
        body: &[Directive::Execute { run: parse_vui }],
    },
    Directive::SaveAsGlobal {
        namespace: Namespace::Sps,
        key: |local| local.get_u64("seq_parameter_set_id").unwrap_or(0) as u8,
    },
];

/// Typed view over a parsed SPS's field map, for the AU splitter, format
/// derivation, and timestamp generator, which all need strongly typed access
/// rather than a `HashMap<&str, FieldValue>`.
#[derive(Debug, Clone)]
pub struct SpsInfo {
    pub seq_parameter_set_id: u8,
    pub profile_idc: u8,
    pub constraint_set1_flag: bool,
    pub constraint_set3_flag: bool,
    pub constraint_set4_flag: bool,
    pub constraint_set5_flag: bool,
    pub level_idc: u8,
    pub chroma_format_idc: u8,
    pub separate_colour_plane_flag: bool,
    pub frame_mbs_only_flag: bool,
    pub pic_width_in_mbs_minus1: u32,
    pub pic_height_in_map_units_minus1: u32,
    pub frame_cropping_flag: bool,
    pub frame_crop_left_offset: u32,
    pub frame_crop_right_offset: u32,
    pub frame_crop_top_offset: u32,
    pub frame_crop_bottom_offset: u32,
    pub log2_max_frame_num_minus4: u32,
    pub pic_order_cnt_type: u32,
    pub max_num_reorder_frames: Option<u32>,
}

impl SpsInfo {
    pub fn from_fields(fields: &HashMap<&'static str, FieldValue>) -> Self {
        let get_u64 = |name: &str| fields.get(name).and_then(FieldValue::as_u64).unwrap_or(0);
        let get_bool = |name: &str| fields.get(name).and_then(FieldValue::as_bool).unwrap_or(false);

        Self {
            seq_parameter_set_id: get_u64("seq_parameter_set_id") as u8,
            profile_idc: get_u64("profile_idc") as u8,
            constraint_set1_flag: get_bool("constraint_set1_flag"),
            constraint_set3_flag: get_bool("constraint_set3_flag"),
            constraint_set4_flag: get_bool("constraint_set4_flag"),
            constraint_set5_flag: get_bool("constraint_set5_flag"),
            level_idc: get_u64("level_idc") as u8,
            chroma_format_idc: if fields.contains_key("chroma_format_idc") {
                get_u64("chroma_format_idc") as u8
            } else {
                1
            },
            separate_colour_plane_flag: get_bool("separate_colour_plane_flag"),
            frame_mbs_only_flag: get_bool("frame_mbs_only_flag"),
            pic_width_in_mbs_minus1: get_u64("pic_width_in_mbs_minus1") as u32,
            pic_height_in_map_units_minus1: get_u64("pic_height_in_map_units_minus1") as u32,
            frame_cropping_flag: get_bool("frame_cropping_flag"),
            frame_crop_left_offset: get_u64("frame_crop_left_offset") as u32,
            frame_crop_right_offset: get_u64("frame_crop_right_offset") as u32,
            frame_crop_top_offset: get_u64("frame_crop_top_offset") as u32,
            frame_crop_bottom_offset: get_u64("frame_crop_bottom_offset") as u32,
            log2_max_frame_num_minus4: get_u64("log2_max_frame_num_minus4") as u32,
            pic_order_cnt_type: get_u64("pic_order_cnt_type") as u32,
            max_num_reorder_frames: fields
                .get("max_num_reorder_frames")
                .and_then(FieldValue::as_u64)
                .map(|v| v as u32),
        }
    }

    pub fn max_frame_num(&self) -> u32 {
        1 << (self.log2_max_frame_num_minus4 + 4)
    }
}
