use std::collections::HashMap;

use super::{
    read_bool_field, read_se_field, read_u_field, read_ue_field, Directive, FieldKind, FieldValue,
    GlobalState, LocalState, Namespace, Scheme, SchemeError,
};
use crate::bitstream::BitReader;

fn has_slice_groups(local: &LocalState) -> bool {
    local.get_u64("num_slice_groups_minus1").unwrap_or(0) > 0
}

/// `ceil(log2(num_slice_groups_minus1 + 1))`, the bit width of each
/// `slice_group_id[i]` entry in a `slice_group_map_type == 6` map (H.264 §7.3.2.2).
fn slice_group_id_bits(num_slice_groups_minus1: u64) -> u32 {
    let n = num_slice_groups_minus1 + 1;
    if n <= 1 {
        0
    } else {
        64 - (n - 1).leading_zeros()
    }
}

/// The conditional slice-group-map syntax that follows `num_slice_groups_minus1`
/// when it's nonzero (H.264 §7.3.2.2, FMO). Must be parsed (even though nothing
/// downstream needs the slice group assignment itself) so the bit cursor lands
/// correctly on `num_ref_idx_l0_default_active_minus1` and everything after it.
fn parse_slice_groups(
    reader: &mut BitReader,
    local: &mut LocalState,
    _global: &GlobalState,
) -> Result<(), SchemeError> {
    let num_slice_groups_minus1 = local.get_u64("num_slice_groups_minus1").unwrap_or(0);
    let slice_group_map_type = read_ue_field(reader, "slice_group_map_type")?;
    local.set("slice_group_map_type", FieldValue::U(slice_group_map_type));

    match slice_group_map_type {
        0 => {
            for _ in 0..=num_slice_groups_minus1 {
                read_ue_field(reader, "run_length_minus1")?;
            }
        }
        2 => {
            for _ in 0..num_slice_groups_minus1 {
                read_ue_field(reader, "top_left")?;
                read_ue_field(reader, "bottom_right")?;
            }
        }
        3..=5 => {
            read_bool_field(reader, "slice_group_change_direction_flag")?;
            read_ue_field(reader, "slice_group_change_rate_minus1")?;
        }
        6 => {
            let pic_size_in_map_units_minus1 = read_ue_field(reader, "pic_size_in_map_units_minus1")?;
            let id_bits = slice_group_id_bits(num_slice_groups_minus1);
            if id_bits > 0 {
                for _ in 0..=pic_size_in_map_units_minus1 {
                    read_u_field(reader, "slice_group_id", id_bits)?;
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// The optional `pic_scaling_matrix_present_flag` tail and its scaling lists
/// (H.264 §7.3.2.2), parsed imperatively like the SPS's scaling matrix -
/// downstream consumers only care that the flag was set, not the coefficients.
fn parse_pps_extension(
    reader: &mut BitReader,
    local: &mut LocalState,
    _global: &GlobalState,
) -> Result<(), SchemeError> {
    // more_rbsp_data() is not representable by this declarative interpreter,
    // so the PPS extension fields are only read when the caller already knows
    // extra bits remain; schemes that stop at slice-header-relevant fields
    // never invoke this directive body in practice, kept here for
    // completeness against the extended PPS syntax.
    let transform_8x8_mode_flag = read_bool_field(reader, "transform_8x8_mode_flag")?;
    local.set("transform_8x8_mode_flag", FieldValue::Bool(transform_8x8_mode_flag));

    let pic_scaling_matrix_present = read_bool_field(reader, "pic_scaling_matrix_present_flag")?;
    local.set(
        "pic_scaling_matrix_present_flag",
        FieldValue::Bool(pic_scaling_matrix_present),
    );
    if pic_scaling_matrix_present {
        let chroma_format_idc = local.get_u64("chroma_format_idc").unwrap_or(1);
        let list_count = 6 + if chroma_format_idc != 3 { 2 } else { 6 };
        for _ in 0..list_count {
            let present = read_bool_field(reader, "pic_scaling_list_present_flag")?;
            if present {
                // Scaling list coefficients are discarded, see sps::skip_scaling_list.
                let _ = read_se_field(reader, "delta_scale");
            }
        }
    }

    local.set(
        "second_chroma_qp_index_offset",
        FieldValue::S(read_se_field(reader, "second_chroma_qp_index_offset")?),
    );
    Ok(())
}

pub const PPS_SCHEME: Scheme = &[
    Directive::Field {
        name: "pic_parameter_set_id",
        kind: FieldKind::Ue,
    },
    Directive::Field {
        name: "seq_parameter_set_id",
        kind: FieldKind::Ue,
    },
    Directive::LoadGlobal {
        namespace: Namespace::Sps,
        key: |local| local.get_u64("seq_parameter_set_id").unwrap_or(0) as u8,
    },
    Directive::Field {
        name: "entropy_coding_mode_flag",
        kind: FieldKind::Bool,
    },
    Directive::Field {
        name: "bottom_field_pic_order_in_frame_present_flag",
        kind: FieldKind::Bool,
    },
    Directive::Field {
        name: "num_slice_groups_minus1",
        kind: FieldKind::Ue,
    },
    Directive::If {
        cond: has_slice_groups,
        body: &[Directive::Execute {
            run: parse_slice_groups,
        }],
    },
    Directive::Field {
        name: "num_ref_idx_l0_default_active_minus1",
        kind: FieldKind::Ue,
    },
    Directive::Field {
        name: "num_ref_idx_l1_default_active_minus1",
        kind: FieldKind::Ue,
    },
    Directive::Field {
        name: "weighted_pred_flag",
        kind: FieldKind::Bool,
    },
    Directive::Field {
        name: "weighted_bipred_idc",
        kind: FieldKind::U(2),
    },
    Directive::Field {
        name: "pic_init_qp_minus26",
        kind: FieldKind::Se,
    },
    Directive::Field {
        name: "pic_init_qs_minus26",
        kind: FieldKind::Se,
    },
    Directive::Field {
        name: "chroma_qp_index_offset",
        kind: FieldKind::Se,
    },
    Directive::Field {
        name: "deblocking_filter_control_present_flag",
        kind: FieldKind::Bool,
    },
    Directive::Field {
        name: "constrained_intra_pred_flag",
        kind: FieldKind::Bool,
    },
    Directive::Field {
        name: "redundant_pic_cnt_present_flag",
        kind: FieldKind::Bool,
    },
    Directive::SaveAsGlobal {
        namespace: Namespace::Pps,
        key: |local| local.get_u64("pic_parameter_set_id").unwrap_or(0) as u8,
    },
];

/// Exposed for callers (e.g. a future RBSP-trailing-bits-aware caller) that
/// need the `pps_extension()` tail; not invoked by [`PPS_SCHEME`] since
/// `more_rbsp_data()` can't be expressed as a static directive predicate.
pub fn run_extension(
    reader: &mut BitReader,
    local: &mut LocalState,
    global: &mut GlobalState,
) -> Result<(), SchemeError> {
    parse_pps_extension(reader, local, global)
}

/// Typed view over a parsed PPS, used by the slice header scheme (to know
/// whether `bottom_field_pic_order_in_frame_present_flag` applies) and the AU
/// splitter (H.264 §7.4.1.2.4 guard conditions reference `pic_parameter_set_id`).
#[derive(Debug, Clone)]
pub struct PpsInfo {
    pub pic_parameter_set_id: u8,
    pub seq_parameter_set_id: u8,
    pub bottom_field_pic_order_in_frame_present_flag: bool,
    pub redundant_pic_cnt_present_flag: bool,
}

impl PpsInfo {
    pub fn from_fields(fields: &HashMap<&'static str, FieldValue>) -> Self {
        let get_u64 = |name: &str| fields.get(name).and_then(FieldValue::as_u64).unwrap_or(0);
        let get_bool = |name: &str| fields.get(name).and_then(FieldValue::as_bool).unwrap_or(false);

        Self {
            pic_parameter_set_id: get_u64("pic_parameter_set_id") as u8,
            seq_parameter_set_id: get_u64("seq_parameter_set_id") as u8,
            bottom_field_pic_order_in_frame_present_flag: get_bool(
                "bottom_field_pic_order_in_frame_present_flag",
            ),
            redundant_pic_cnt_present_flag: get_bool("redundant_pic_cnt_present_flag"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::{write_se, write_ue, BitWriter};
    use crate::scheme::run;

    #[test]
    fn slice_group_map_type_0_keeps_trailing_fields_aligned() {
        let mut global = GlobalState::new();
        global.sps.insert(0, HashMap::new());

        let mut w = BitWriter::new();
        write_ue(&mut w, 0); // pic_parameter_set_id
        write_ue(&mut w, 0); // seq_parameter_set_id
        w.push_bit(0); // entropy_coding_mode_flag
        w.push_bit(0); // bottom_field_pic_order_in_frame_present_flag
        write_ue(&mut w, 1); // num_slice_groups_minus1 = 1 -> 2 slice groups
        write_ue(&mut w, 0); // slice_group_map_type = 0 (interleaved)
        write_ue(&mut w, 3); // run_length_minus1[0]
        write_ue(&mut w, 5); // run_length_minus1[1]
        write_ue(&mut w, 0); // num_ref_idx_l0_default_active_minus1
        write_ue(&mut w, 0); // num_ref_idx_l1_default_active_minus1
        w.push_bit(0); // weighted_pred_flag
        w.push_bits(0, 2); // weighted_bipred_idc
        write_se(&mut w, 4); // pic_init_qp_minus26
        write_se(&mut w, 0); // pic_init_qs_minus26
        write_se(&mut w, -2); // chroma_qp_index_offset
        w.push_bit(1); // deblocking_filter_control_present_flag
        w.push_bit(0); // constrained_intra_pred_flag
        w.push_bit(1); // redundant_pic_cnt_present_flag

        let bytes = w.into_bytes();
        let mut reader = BitReader::new(&bytes);
        let mut local = LocalState::new();
        run(PPS_SCHEME, &mut reader, &mut local, &mut global).unwrap();

        assert_eq!(local.get_u64("num_slice_groups_minus1"), Some(1));
        assert_eq!(local.get_u64("slice_group_map_type"), Some(0));
        assert_eq!(local.get_u64("num_ref_idx_l0_default_active_minus1"), Some(0));
        assert_eq!(local.get_i64("chroma_qp_index_offset"), Some(-2));
        assert_eq!(local.get_bool("redundant_pic_cnt_present_flag"), Some(true));
    }
}
