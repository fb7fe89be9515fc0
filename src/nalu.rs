use std::collections::HashMap;

use derivative::Derivative;

use crate::scheme::FieldValue;

/// `nal_unit_type` tag set, closed over the 5-bit syntax element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluType {
    Unspecified,
    NonIdr,
    PartA,
    PartB,
    PartC,
    Idr,
    Sei,
    Sps,
    Pps,
    Aud,
    EndOfSeq,
    EndOfStream,
    FillerData,
    SpsExtension,
    PrefixNalUnit,
    SubsetSps,
    Reserved(u8),
    AuxiliaryNonPart,
    Extension,
}

impl NaluType {
    pub fn from_nal_unit_type(nal_unit_type: u8) -> Self {
        match nal_unit_type {
            0 | 24..=31 => NaluType::Unspecified,
            1 => NaluType::NonIdr,
            2 => NaluType::PartA,
            3 => NaluType::PartB,
            4 => NaluType::PartC,
            5 => NaluType::Idr,
            6 => NaluType::Sei,
            7 => NaluType::Sps,
            8 => NaluType::Pps,
            9 => NaluType::Aud,
            10 => NaluType::EndOfSeq,
            11 => NaluType::EndOfStream,
            12 => NaluType::FillerData,
            13 => NaluType::SpsExtension,
            14 => NaluType::PrefixNalUnit,
            15 => NaluType::SubsetSps,
            16..=18 => NaluType::Reserved(nal_unit_type),
            19 => NaluType::AuxiliaryNonPart,
            20 => NaluType::Extension,
            21..=23 => NaluType::Reserved(nal_unit_type),
            _ => NaluType::Unspecified,
        }
    }

    /// VCL NALU types: these, and only these, carry a primary coded picture.
    pub fn is_vcl(&self) -> bool {
        matches!(self, NaluType::Idr | NaluType::NonIdr | NaluType::PartA)
    }

    pub fn is_idr(&self) -> bool {
        matches!(self, NaluType::Idr)
    }

    /// NALU types 14-18 that always force a new access unit boundary when
    /// they precede a VCL NALU, alongside AUD/SPS/PPS/SEI.
    pub fn forces_au_boundary(&self) -> bool {
        matches!(
            self,
            NaluType::Aud
                | NaluType::Sps
                | NaluType::Pps
                | NaluType::Sei
                | NaluType::PrefixNalUnit
                | NaluType::SubsetSps
                | NaluType::Reserved(16..=18)
        )
    }
}

/// Whether a parsed NALU's fields were read successfully off the bitstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluStatus {
    Valid,
    Error,
}

/// Presentation/decoding timestamps, each absent until assigned by the
/// timestamp generator or carried over from the host's input buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timestamps {
    pub pts: Option<i64>,
    pub dts: Option<i64>,
}

/// One parsed NALU. `payload` always starts with the one-byte
/// NALU header; `stripped_prefix` holds whatever framing preceded it in the
/// input (a start code or a length prefix) so byte-identical re-framing is
/// possible without re-deriving it.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Nalu {
    #[derivative(Debug = "ignore")]
    pub parsed_fields: HashMap<&'static str, FieldValue>,
    pub nalu_type: NaluType,
    pub nal_ref_idc: u8,
    #[derivative(Debug = "ignore")]
    pub stripped_prefix: Vec<u8>,
    #[derivative(Debug = "ignore")]
    pub payload: Vec<u8>,
    pub status: NaluStatus,
    pub timestamps: Timestamps,
}

impl Nalu {
    pub fn is_vcl(&self) -> bool {
        self.nalu_type.is_vcl()
    }

    pub fn byte_size(&self) -> usize {
        self.payload.len()
    }
}
