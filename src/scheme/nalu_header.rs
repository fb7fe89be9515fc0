use super::{Directive, FieldKind, LocalState, Scheme};

/// forbidden_zero_bit:u1, nal_ref_idc:u2, nal_unit_type:u5 - the one-byte NALU header.
pub const NALU_HEADER_SCHEME: Scheme = &[
    Directive::Field {
        name: "forbidden_zero_bit",
        kind: FieldKind::U(1),
    },
    Directive::Field {
        name: "nal_ref_idc",
        kind: FieldKind::U(2),
    },
    Directive::Field {
        name: "nal_unit_type",
        kind: FieldKind::U(5),
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NaluHeaderInfo {
    pub forbidden_zero_bit: bool,
    pub nal_ref_idc: u8,
    pub nal_unit_type: u8,
}

impl NaluHeaderInfo {
    pub fn from_local(local: &LocalState) -> Self {
        Self {
            forbidden_zero_bit: local.get_u64("forbidden_zero_bit").unwrap_or(0) != 0,
            nal_ref_idc: local.get_u64("nal_ref_idc").unwrap_or(0) as u8,
            nal_unit_type: local.get_u64("nal_unit_type").unwrap_or(0) as u8,
        }
    }
}
