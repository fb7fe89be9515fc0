use crate::nalu::{Nalu, NaluType};
use crate::scheme::slice_header::SliceHeaderInfo;

/// Groups parsed NALUs into access units using the H.264 §7.4.1.2.4
/// primary-coded-picture detection rules.
#[derive(Debug, Default)]
pub struct AuSplitter {
    buffered: Vec<Nalu>,
}

impl AuSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one parsed NALU in. Returns a completed access unit if this NALU
    /// closed one, or `None` if it was merely buffered.
    ///
    /// Non-VCL NALUs never close an AU by themselves; a VCL NALU that starts
    /// a new primary coded picture closes everything up to and including the
    /// previously buffered VCL NALU, leaving any non-VCL NALUs that arrived
    /// after it (AUD, SPS, PPS, SEI, 14-18) in the buffer as the new AU's
    /// prefix. A malformed NALU can't be compared against anything, so it
    /// always closes out whatever preceded it.
    pub fn put_nalu(&mut self, nalu: Nalu) -> Option<Vec<Nalu>> {
        let closes_previous = self.is_new_au(&nalu);

        let completed = if closes_previous {
            let last_vcl_index = self.buffered.iter().rposition(|n| n.is_vcl());
            match last_vcl_index {
                Some(i) => {
                    let completed = self.buffered.drain(..=i).collect::<Vec<_>>();
                    Some(completed)
                }
                None => None,
            }
        } else {
            None
        };

        self.buffered.push(nalu);
        completed
    }

    /// Emits whatever remains buffered at end of stream: always flush,
    /// dropping the remainder only if it contains no primary coded picture.
    pub fn flush(&mut self) -> Option<Vec<Nalu>> {
        let remaining = std::mem::take(&mut self.buffered);
        if remaining.iter().any(|n| n.is_vcl()) {
            Some(remaining)
        } else {
            None
        }
    }

    fn is_new_au(&self, nalu: &Nalu) -> bool {
        if !nalu.is_vcl() {
            // Non-VCL NALUs (including malformed ones) never close an AU by
            // themselves; a malformed one still taints whatever AU it ends
            // up bundled into, via the status check in `finish_au`.
            return false;
        }
        if nalu.status != crate::nalu::NaluStatus::Valid {
            // Can't compare a malformed VCL NALU's fields against anything.
            return true;
        }

        let candidate = SliceHeaderInfo::from_fields(&nalu.parsed_fields);
        let Some(last_nalu) = self.buffered.iter().rev().find(|n| n.is_vcl()) else {
            return true;
        };
        if last_nalu.status != crate::nalu::NaluStatus::Valid {
            return true;
        }
        let last = SliceHeaderInfo::from_fields(&last_nalu.parsed_fields);

        first_mb_in_slice_zero(&candidate)
            || frame_num_differs(&last, &candidate)
            || pps_id_differs(&last, &candidate)
            || field_pic_flag_differs(&last, &candidate)
            || nal_ref_idc_differs_one_zero(&last, &candidate)
            || pic_order_cnt_differs(&last, &candidate)
            || idr_and_non_idr(&last, &candidate)
            || idrs_where_idr_pic_id_differs(&last, &candidate)
    }
}

// Ported from the Membrane-derived guard decomposition: one predicate per
// H.264 §7.4.1.2.4 condition, each named after what it checks.

fn first_mb_in_slice_zero(candidate: &SliceHeaderInfo) -> bool {
    candidate.first_mb_in_slice == 0
}

fn frame_num_differs(last: &SliceHeaderInfo, curr: &SliceHeaderInfo) -> bool {
    last.frame_num != curr.frame_num
}

fn pps_id_differs(last: &SliceHeaderInfo, curr: &SliceHeaderInfo) -> bool {
    last.pic_parameter_set_id != curr.pic_parameter_set_id
}

fn field_pic_flag_differs(last: &SliceHeaderInfo, curr: &SliceHeaderInfo) -> bool {
    last.field_pic_flag != curr.field_pic_flag
        || (last.field_pic_flag && curr.field_pic_flag && last.bottom_field_flag != curr.bottom_field_flag)
}

fn nal_ref_idc_differs_one_zero(last: &SliceHeaderInfo, curr: &SliceHeaderInfo) -> bool {
    (last.nal_ref_idc == 0 || curr.nal_ref_idc == 0) && last.nal_ref_idc != curr.nal_ref_idc
}

fn pic_order_cnt_differs(last: &SliceHeaderInfo, curr: &SliceHeaderInfo) -> bool {
    if last.pic_order_cnt_type != curr.pic_order_cnt_type {
        return false;
    }
    match last.pic_order_cnt_type {
        0 => {
            last.pic_order_cnt_lsb != curr.pic_order_cnt_lsb
                || last.delta_pic_order_cnt_bottom != curr.delta_pic_order_cnt_bottom
        }
        1 => {
            last.delta_pic_order_cnt_0 != curr.delta_pic_order_cnt_0
                || last.delta_pic_order_cnt_1 != curr.delta_pic_order_cnt_1
        }
        _ => false,
    }
}

fn idr_and_non_idr(last: &SliceHeaderInfo, curr: &SliceHeaderInfo) -> bool {
    last.is_idr() != curr.is_idr()
}

fn idrs_where_idr_pic_id_differs(last: &SliceHeaderInfo, curr: &SliceHeaderInfo) -> bool {
    last.is_idr() && curr.is_idr() && last.idr_pic_id != curr.idr_pic_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nalu::{NaluStatus, Timestamps};
    use std::collections::HashMap;

    fn slice_nalu(nal_unit_type: u8, frame_num: u64, first_mb: u64) -> Nalu {
        let mut fields = HashMap::new();
        fields.insert("nal_unit_type", crate::scheme::FieldValue::U(nal_unit_type as u64));
        fields.insert("nal_ref_idc", crate::scheme::FieldValue::U(1));
        fields.insert("frame_num", crate::scheme::FieldValue::U(frame_num));
        fields.insert("first_mb_in_slice", crate::scheme::FieldValue::U(first_mb));
        fields.insert("pic_parameter_set_id", crate::scheme::FieldValue::U(0));
        Nalu {
            parsed_fields: fields,
            nalu_type: NaluType::from_nal_unit_type(nal_unit_type),
            nal_ref_idc: 1,
            stripped_prefix: vec![0, 0, 0, 1],
            payload: vec![nal_unit_type, 0],
            status: NaluStatus::Valid,
            timestamps: Timestamps::default(),
        }
    }

    fn non_vcl_nalu(nal_unit_type: u8) -> Nalu {
        Nalu {
            parsed_fields: HashMap::new(),
            nalu_type: NaluType::from_nal_unit_type(nal_unit_type),
            nal_ref_idc: 0,
            stripped_prefix: vec![0, 0, 0, 1],
            payload: vec![nal_unit_type, 0],
            status: NaluStatus::Valid,
            timestamps: Timestamps::default(),
        }
    }

    #[test]
    fn single_idr_au_closes_on_flush() {
        let mut splitter = AuSplitter::new();
        assert!(splitter.put_nalu(non_vcl_nalu(7)).is_none()); // sps
        assert!(splitter.put_nalu(non_vcl_nalu(8)).is_none()); // pps
        assert!(splitter.put_nalu(slice_nalu(5, 0, 0)).is_none()); // idr

        let au = splitter.flush().unwrap();
        assert_eq!(au.len(), 3);
    }

    #[test]
    fn second_vcl_with_differing_frame_num_closes_previous_au() {
        let mut splitter = AuSplitter::new();
        splitter.put_nalu(slice_nalu(1, 0, 0));
        let completed = splitter.put_nalu(slice_nalu(1, 1, 4));
        assert!(completed.is_some());
        assert_eq!(completed.unwrap().len(), 1);
    }

    #[test]
    fn same_frame_num_and_nonzero_first_mb_stays_in_the_same_au() {
        let mut splitter = AuSplitter::new();
        splitter.put_nalu(slice_nalu(1, 0, 0));
        let completed = splitter.put_nalu(slice_nalu(1, 0, 4));
        assert!(completed.is_none());
    }

    #[test]
    fn idr_and_non_idr_always_start_a_new_au() {
        let mut splitter = AuSplitter::new();
        splitter.put_nalu(slice_nalu(5, 0, 0));
        let completed = splitter.put_nalu(slice_nalu(1, 0, 4));
        assert!(completed.is_some());
    }

    #[test]
    fn flush_drops_a_non_vcl_only_remainder() {
        let mut splitter = AuSplitter::new();
        splitter.put_nalu(non_vcl_nalu(9)); // aud only, no picture ever arrives
        assert!(splitter.flush().is_none());
    }

    #[test]
    fn malformed_non_vcl_nalu_does_not_close_the_au_by_itself() {
        let mut splitter = AuSplitter::new();
        splitter.put_nalu(slice_nalu(1, 0, 0));
        let mut bad = non_vcl_nalu(6);
        bad.status = NaluStatus::Error;
        let completed = splitter.put_nalu(bad);
        assert!(completed.is_none());
    }

    #[test]
    fn malformed_vcl_nalu_forces_its_own_boundary() {
        let mut splitter = AuSplitter::new();
        splitter.put_nalu(slice_nalu(1, 0, 0));
        let mut bad = slice_nalu(1, 0, 0);
        bad.status = NaluStatus::Error;
        let completed = splitter.put_nalu(bad);
        assert!(completed.is_some());
        assert_eq!(completed.unwrap().len(), 1);
    }
}
