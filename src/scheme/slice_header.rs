use std::collections::HashMap;

use super::{sps::SpsInfo, Directive, FieldKind, FieldValue, LocalState, Namespace, Scheme};

/// nal_unit_type value that denotes an IDR slice.
pub const IDR_SLICE_NAL_UNIT_TYPE: u8 = 5;

fn loaded_sps(local: &LocalState) -> SpsInfo {
    SpsInfo::from_fields(local.as_map())
}

fn slice_is_idr(local: &LocalState) -> bool {
    local.get_u64("nal_unit_type") == Some(IDR_SLICE_NAL_UNIT_TYPE as u64)
}

fn field_pic_flag_present(local: &LocalState) -> bool {
    !loaded_sps(local).frame_mbs_only_flag
}

fn slice_is_field_pic(local: &LocalState) -> bool {
    local.get_bool("field_pic_flag").unwrap_or(false)
}

fn frame_num_bits(local: &LocalState) -> u32 {
    loaded_sps(local).log2_max_frame_num_minus4 + 4
}

fn poc_lsb_bits(local: &LocalState) -> u32 {
    local.get_u64("log2_max_pic_order_cnt_lsb_minus4").unwrap_or(0) as u32 + 4
}

fn poc_type_is_0(local: &LocalState) -> bool {
    loaded_sps(local).pic_order_cnt_type == 0
}

fn poc_type_is_1_without_delta_always_zero(local: &LocalState) -> bool {
    loaded_sps(local).pic_order_cnt_type == 1
        && !local.get_bool("delta_pic_order_always_zero_flag").unwrap_or(false)
}

fn bottom_field_pic_order_present(local: &LocalState) -> bool {
    local
        .get_bool("bottom_field_pic_order_in_frame_present_flag")
        .unwrap_or(false)
        && !slice_is_field_pic(local)
}

/// slice_header() (H.264 §7.3.3), restricted to the fields
/// new-primary-picture detection requires (H.264 §7.4.1.2.4). Everything after
/// `dec_ref_pic_marking()` (reference list modification, weighted
/// prediction tables) is irrelevant to AU boundary detection and is
/// intentionally not parsed.
pub const SLICE_HEADER_SCHEME: Scheme = &[
    Directive::Field {
        name: "first_mb_in_slice",
        kind: FieldKind::Ue,
    },
    Directive::Field {
        name: "slice_type",
        kind: FieldKind::Ue,
    },
    Directive::Field {
        name: "pic_parameter_set_id",
        kind: FieldKind::Ue,
    },
    Directive::LoadGlobal {
        namespace: Namespace::Pps,
        key: |local| local.get_u64("pic_parameter_set_id").unwrap_or(0) as u8,
    },
    Directive::LoadGlobal {
        namespace: Namespace::Sps,
        key: |local| local.get_u64("seq_parameter_set_id").unwrap_or(0) as u8,
    },
    Directive::Calculate {
        name: "frame_num_bits",
        derive: |local| FieldValue::U(frame_num_bits(local) as u64),
    },
    Directive::Execute {
        run: |reader, local, _global| {
            let bits = local.get_u64("frame_num_bits").unwrap_or(4) as u32;
            let value = super::read_u_field(reader, "frame_num", bits)?;
            local.set("frame_num", FieldValue::U(value));
            Ok(())
        },
    },
    Directive::If {
        cond: field_pic_flag_present,
        body: &[
            Directive::Field {
                name: "field_pic_flag",
                kind: FieldKind::Bool,
            },
            Directive::If {
                cond: slice_is_field_pic,
                body: &[Directive::Field {
                    name: "bottom_field_flag",
                    kind: FieldKind::Bool,
                }],
            },
        ],
    },
    Directive::If {
        cond: slice_is_idr,
        body: &[Directive::Field {
            name: "idr_pic_id",
            kind: FieldKind::Ue,
        }],
    },
    Directive::If {
        cond: poc_type_is_0,
        body: &[
            Directive::Calculate {
                name: "poc_lsb_bits",
                derive: |local| FieldValue::U(poc_lsb_bits(local) as u64),
            },
            Directive::Execute {
                run: |reader, local, _global| {
                    let bits = local.get_u64("poc_lsb_bits").unwrap_or(4) as u32;
                    let value = super::read_u_field(reader, "pic_order_cnt_lsb", bits)?;
                    local.set("pic_order_cnt_lsb", FieldValue::U(value));
                    Ok(())
                },
            },
            Directive::If {
                cond: bottom_field_pic_order_present,
                body: &[Directive::Field {
                    name: "delta_pic_order_cnt_bottom",
                    kind: FieldKind::Se,
                }],
            },
        ],
    },
    Directive::If {
        cond: poc_type_is_1_without_delta_always_zero,
        body: &[
            Directive::Field {
                name: "delta_pic_order_cnt_0",
                kind: FieldKind::Se,
            },
            Directive::If {
                cond: bottom_field_pic_order_present,
                body: &[Directive::Field {
                    name: "delta_pic_order_cnt_1",
                    kind: FieldKind::Se,
                }],
            },
        ],
    },
];

/// Typed view over the fields [`SLICE_HEADER_SCHEME`] produces, combined with
/// the NALU header fields recorded alongside them. This is what the access
/// unit splitter compares between consecutive VCL NALUs.
#[derive(Debug, Clone)]
pub struct SliceHeaderInfo {
    pub nal_unit_type: u8,
    pub nal_ref_idc: u8,
    pub first_mb_in_slice: u32,
    pub pic_parameter_set_id: u8,
    pub frame_num: u32,
    pub field_pic_flag: bool,
    pub bottom_field_flag: bool,
    pub idr_pic_id: Option<u32>,
    pub pic_order_cnt_type: u32,
    pub pic_order_cnt_lsb: Option<u32>,
    pub delta_pic_order_cnt_bottom: Option<i32>,
    pub delta_pic_order_cnt_0: Option<i32>,
    pub delta_pic_order_cnt_1: Option<i32>,
}

impl SliceHeaderInfo {
    pub fn from_fields(fields: &HashMap<&'static str, FieldValue>) -> Self {
        let get_u64 = |name: &str| fields.get(name).and_then(FieldValue::as_u64).unwrap_or(0);
        let get_i64 = |name: &str| fields.get(name).and_then(FieldValue::as_i64);
        let get_bool = |name: &str| fields.get(name).and_then(FieldValue::as_bool).unwrap_or(false);

        Self {
            nal_unit_type: get_u64("nal_unit_type") as u8,
            nal_ref_idc: get_u64("nal_ref_idc") as u8,
            first_mb_in_slice: get_u64("first_mb_in_slice") as u32,
            pic_parameter_set_id: get_u64("pic_parameter_set_id") as u8,
            frame_num: get_u64("frame_num") as u32,
            field_pic_flag: get_bool("field_pic_flag"),
            bottom_field_flag: get_bool("bottom_field_flag"),
            idr_pic_id: fields.get("idr_pic_id").and_then(FieldValue::as_u64).map(|v| v as u32),
            pic_order_cnt_type: get_u64("pic_order_cnt_type"),
            pic_order_cnt_lsb: fields
                .get("pic_order_cnt_lsb")
                .and_then(FieldValue::as_u64)
                .map(|v| v as u32),
            delta_pic_order_cnt_bottom: get_i64("delta_pic_order_cnt_bottom").map(|v| v as i32),
            delta_pic_order_cnt_0: get_i64("delta_pic_order_cnt_0").map(|v| v as i32),
            delta_pic_order_cnt_1: get_i64("delta_pic_order_cnt_1").map(|v| v as i32),
        }
    }

    pub fn is_idr(&self) -> bool {
        self.nal_unit_type == IDR_SLICE_NAL_UNIT_TYPE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_header_info_projects_idr_slice_correctly() {
        let mut fields: HashMap<&'static str, FieldValue> = HashMap::new();
        fields.insert("nal_unit_type", FieldValue::U(IDR_SLICE_NAL_UNIT_TYPE as u64));
        fields.insert("nal_ref_idc", FieldValue::U(3));
        fields.insert("first_mb_in_slice", FieldValue::U(0));
        fields.insert("pic_parameter_set_id", FieldValue::U(0));
        fields.insert("frame_num", FieldValue::U(0));
        fields.insert("idr_pic_id", FieldValue::U(5));
        fields.insert("pic_order_cnt_type", FieldValue::U(0));
        fields.insert("pic_order_cnt_lsb", FieldValue::U(12));

        let info = SliceHeaderInfo::from_fields(&fields);
        assert!(info.is_idr());
        assert_eq!(info.idr_pic_id, Some(5));
        assert_eq!(info.pic_order_cnt_lsb, Some(12));
        assert_eq!(info.delta_pic_order_cnt_bottom, None);
    }

    #[test]
    fn non_idr_slice_has_no_idr_pic_id() {
        let mut fields: HashMap<&'static str, FieldValue> = HashMap::new();
        fields.insert("nal_unit_type", FieldValue::U(1));
        fields.insert("frame_num", FieldValue::U(3));

        let info = SliceHeaderInfo::from_fields(&fields);
        assert!(!info.is_idr());
        assert_eq!(info.idr_pic_id, None);
        assert_eq!(info.frame_num, 3);
    }
}
