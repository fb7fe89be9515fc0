use std::collections::HashMap;

use thiserror::Error;

use crate::bitstream::{strip_emulation_prevention, BitReader};
use crate::nalu::{Nalu, NaluStatus, NaluType, Timestamps};
use crate::scheme::nalu_header::{NaluHeaderInfo, NALU_HEADER_SCHEME};
use crate::scheme::pps::PPS_SCHEME;
use crate::scheme::slice_header::SLICE_HEADER_SCHEME;
use crate::scheme::sps::SPS_SCHEME;
use crate::scheme::{run, FieldValue, GlobalState, LocalState, SchemeError};

#[derive(Debug, Error)]
pub enum NaluError {
    #[error("forbidden_zero_bit was set in the NALU header")]
    MalformedHeader,

    #[error("NALU body failed to parse: {0}")]
    Scheme(#[from] SchemeError),
}

/// Orchestrates unprefix -> header parse -> dispatch on type -> body parse for
/// a single NALU. Owns the cross-NALU [`GlobalState`] that SPS/PPS parsing
/// populates and slice header parsing reads back.
#[derive(Debug, Default)]
pub struct NaluParser {
    global: GlobalState,
}

impl NaluParser {
    pub fn new() -> Self {
        Self {
            global: GlobalState::new(),
        }
    }

    pub fn global_state(&self) -> &GlobalState {
        &self.global
    }

    /// Parses one already-framed NALU payload (no start code/length prefix,
    /// first byte is the NALU header). Bit-level failures never propagate:
    /// they are caught here and downgraded to `status = Error`, leaving
    /// `global` untouched for that NALU.
    pub fn parse_nalu(&mut self, stripped_prefix: Vec<u8>, payload: Vec<u8>, pts: Option<i64>) -> Nalu {
        match self.try_parse(&payload) {
            Ok((nalu_type, nal_ref_idc, fields)) => Nalu {
                parsed_fields: fields,
                nalu_type,
                nal_ref_idc,
                stripped_prefix,
                payload,
                status: NaluStatus::Valid,
                timestamps: Timestamps { pts, dts: None },
            },
            Err(err) => {
                tracing::warn!(?err, "dropping malformed NALU");
                let nalu_type = payload
                    .first()
                    .map(|&b| NaluType::from_nal_unit_type(b & 0x1F))
                    .unwrap_or(NaluType::Unspecified);
                Nalu {
                    parsed_fields: HashMap::new(),
                    nalu_type,
                    nal_ref_idc: 0,
                    stripped_prefix,
                    payload,
                    status: NaluStatus::Error,
                    timestamps: Timestamps { pts, dts: None },
                }
            }
        }
    }

    fn try_parse(
        &mut self,
        payload: &[u8],
    ) -> Result<(NaluType, u8, HashMap<&'static str, FieldValue>), NaluError> {
        if payload.is_empty() {
            return Err(NaluError::MalformedHeader);
        }

        let mut header_reader = BitReader::new(&payload[..1]);
        let mut header_local = LocalState::new();
        run(NALU_HEADER_SCHEME, &mut header_reader, &mut header_local, &mut self.global)?;
        let header = NaluHeaderInfo::from_local(&header_local);

        if header.forbidden_zero_bit {
            return Err(NaluError::MalformedHeader);
        }

        let nalu_type = NaluType::from_nal_unit_type(header.nal_unit_type);
        let cleaned = strip_emulation_prevention(&payload[1..]);
        let mut body_reader = BitReader::new(&cleaned);
        let mut local = LocalState::new();
        local.merge(header_local.as_map());

        let scheme = match nalu_type {
            NaluType::Sps => Some(SPS_SCHEME),
            NaluType::Pps => Some(PPS_SCHEME),
            NaluType::Idr | NaluType::NonIdr | NaluType::PartA => Some(SLICE_HEADER_SCHEME),
            _ => None,
        };

        if let Some(scheme) = scheme {
            run(scheme, &mut body_reader, &mut local, &mut self.global)?;
        }

        Ok((nalu_type, header.nal_ref_idc, local.into_map()))
    }
}
