use std::sync::LazyLock;

use bytes::{BufMut, BytesMut};
use memchr::memmem::Finder;

use crate::stream_structure::StreamStructure;

/// One reframed NALU, still carrying the bytes that preceded it in the input
/// framing (a start code or a length prefix) so the Filter can reconstruct
/// `stripped_prefix` without re-deriving it from the stream structure.
#[derive(Debug, Clone)]
pub struct SplitNalu {
    pub stripped_prefix: Vec<u8>,
    pub payload: Vec<u8>,
    pub pts: Option<i64>,
}

fn find_start_of_next_nalu(buf: &[u8]) -> Option<usize> {
    static FINDER: LazyLock<Finder> = LazyLock::new(|| Finder::new(&[0, 0, 1]));

    if buf.len() < 4 {
        return None;
    }

    // A start code at the very front of the buffer would otherwise make us
    // hand the parser a bare prefix with no NALU bytes before it; check for
    // the 3-byte form shifted in by one first.
    if buf[0] != 0 && buf[1..4] == [0, 0, 1] {
        return Some(5);
    }

    FINDER.find(&buf[2..]).map(|i| i + 5)
}

/// Reframes a chunked byte stream into NALU-sized payloads.
/// Handles both Annex B start-code scanning and AVCC/AVC3 length-prefixed
/// framing behind one state machine, selected by the configured
/// [`StreamStructure`].
#[derive(Debug)]
pub struct NaluSplitter {
    structure: StreamStructure,
    buffer: BytesMut,
    pts: Option<i64>,
    previous_search_end: usize,
}

impl NaluSplitter {
    pub fn new(structure: StreamStructure) -> Self {
        Self {
            structure,
            buffer: BytesMut::new(),
            pts: None,
            previous_search_end: 0,
        }
    }

    pub fn structure(&self) -> StreamStructure {
        self.structure
    }

    pub fn push(&mut self, bytestream: &[u8], pts: Option<i64>) -> Vec<SplitNalu> {
        match self.structure {
            StreamStructure::AnnexB => self.push_annex_b(bytestream, pts),
            StreamStructure::Avc1 { length_size } | StreamStructure::Avc3 { length_size } => {
                self.push_length_prefixed(bytestream, pts, length_size)
            }
        }
    }

    pub fn flush(&mut self) -> Vec<SplitNalu> {
        match self.structure {
            StreamStructure::AnnexB => self.flush_annex_b(),
            StreamStructure::Avc1 { .. } | StreamStructure::Avc3 { .. } => {
                // AVCC framing is self-delimiting; nothing to withhold across calls
                // beyond what push_length_prefixed already emitted.
                Vec::new()
            }
        }
    }

    fn push_annex_b(&mut self, bytestream: &[u8], pts: Option<i64>) -> Vec<SplitNalu> {
        let mut output_pts = if self.buffer.is_empty() { pts } else { self.pts };

        self.buffer.put(bytestream);
        let mut result = Vec::new();

        while let Some(i) = find_start_of_next_nalu(&self.buffer[self.previous_search_end..]) {
            let nalu = self.buffer.split_to(self.previous_search_end + i);
            self.previous_search_end = 0;
            result.push(split_annex_b_nalu(&nalu, output_pts));
            output_pts = pts;
        }

        // Reprocess the final 3 bytes next time in case a start code straddles
        // this push's boundary.
        self.previous_search_end = self.buffer.len().saturating_sub(3);
        self.pts = pts;

        result
    }

    fn flush_annex_b(&mut self) -> Vec<SplitNalu> {
        if self.buffer.is_empty() {
            return Vec::new();
        }

        let mut result = Vec::new();
        while let Some(i) = find_start_of_next_nalu(&self.buffer[self.previous_search_end..]) {
            let nalu = self.buffer.split_to(self.previous_search_end + i);
            self.previous_search_end = 0;
            result.push(split_annex_b_nalu(&nalu, self.pts));
        }

        result.push(split_annex_b_nalu(&self.buffer, self.pts));
        self.buffer = BytesMut::new();
        self.previous_search_end = 0;

        result
    }

    fn push_length_prefixed(
        &mut self,
        bytestream: &[u8],
        pts: Option<i64>,
        length_size: u8,
    ) -> Vec<SplitNalu> {
        self.buffer.put(bytestream);
        self.pts = pts;

        let mut result = Vec::new();
        let length_size = length_size as usize;
        loop {
            if self.buffer.len() < length_size {
                break;
            }
            let len = read_length_prefix(&self.buffer[..length_size]);
            if self.buffer.len() < length_size + len {
                break;
            }
            let mut frame = self.buffer.split_to(length_size + len);
            let prefix = frame.split_to(length_size);
            result.push(SplitNalu {
                stripped_prefix: prefix.to_vec(),
                payload: frame.to_vec(),
                pts,
            });
        }
        result
    }
}

fn read_length_prefix(bytes: &[u8]) -> usize {
    let mut value: usize = 0;
    for &b in bytes {
        value = (value << 8) | b as usize;
    }
    value
}

/// Splits a complete Annex B chunk (prefix + payload + trailing start code, if
/// any) produced by the scanner into its `stripped_prefix`/`payload` halves.
fn split_annex_b_nalu(raw: &[u8], pts: Option<i64>) -> SplitNalu {
    const START_CODE_4: [u8; 4] = [0, 0, 0, 1];
    const START_CODE_3: [u8; 3] = [0, 0, 1];

    let prefix_len = if raw.starts_with(&START_CODE_4) {
        4
    } else if raw.starts_with(&START_CODE_3) {
        3
    } else {
        0
    };

    // The scanner hands us this NALU's bytes up to (and including) the next
    // start code; trim that trailing start code back off the payload.
    let mut end = raw.len();
    if end >= prefix_len + 4 && raw[end - 4..] == START_CODE_4 {
        end -= 4;
    } else if end >= prefix_len + 3 && raw[end - 3..] == START_CODE_3 {
        end -= 3;
    }

    SplitNalu {
        stripped_prefix: raw[..prefix_len].to_vec(),
        payload: raw[prefix_len..end].to_vec(),
        pts,
    }
}

/// Writes `length_size` big-endian bytes then `payload`, the AVCC inverse of
/// [`NaluSplitter::push`]'s length-prefixed branch.
pub fn write_length_prefixed(out: &mut BytesMut, payload: &[u8], length_size: u8) {
    match length_size {
        1 => out.put_u8(payload.len() as u8),
        2 => out.put_u16(payload.len() as u16),
        4 => out.put_u32(payload.len() as u32),
        n => {
            let mut bytes = (payload.len() as u32).to_be_bytes().to_vec();
            bytes.drain(..4 - n as usize);
            out.extend_from_slice(&bytes);
        }
    }
    out.extend_from_slice(payload);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_two_annex_b_nalus_with_4_byte_start_codes() {
        let data = [0, 0, 0, 1, 0x67, 0xAA, 0, 0, 0, 1, 0x68, 0xBB];
        let mut splitter = NaluSplitter::new(StreamStructure::AnnexB);
        let mut out = splitter.push(&data, Some(1));
        out.extend(splitter.flush());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].payload, vec![0x67, 0xAA]);
        assert_eq!(out[1].payload, vec![0x68, 0xBB]);
    }

    #[test]
    fn withholds_pending_tail_until_flush() {
        let data = [0, 0, 0, 1, 0x67, 0xAA];
        let mut splitter = NaluSplitter::new(StreamStructure::AnnexB);
        let out = splitter.push(&data, None);
        assert!(out.is_empty());
        let flushed = splitter.flush();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].payload, vec![0x67, 0xAA]);
    }

    #[test]
    fn reads_avcc_length_prefixed_nalus() {
        let mut data = Vec::new();
        data.extend_from_slice(&4u32.to_be_bytes());
        data.extend_from_slice(&[0x67, 0xAA, 0xBB, 0xCC]);
        data.extend_from_slice(&2u32.to_be_bytes());
        data.extend_from_slice(&[0x68, 0xDD]);

        let mut splitter = NaluSplitter::new(StreamStructure::Avc1 { length_size: 4 });
        let out = splitter.push(&data, Some(7));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].payload, vec![0x67, 0xAA, 0xBB, 0xCC]);
        assert_eq!(out[1].payload, vec![0x68, 0xDD]);
        assert_eq!(out[0].pts, Some(7));
    }

    #[test]
    fn avcc_buffers_a_partial_nalu_until_more_bytes_arrive() {
        let mut splitter = NaluSplitter::new(StreamStructure::Avc1 { length_size: 4 });
        let mut first = 4u32.to_be_bytes().to_vec();
        first.extend_from_slice(&[0x67, 0xAA]);
        let out = splitter.push(&first, None);
        assert!(out.is_empty());

        let out = splitter.push(&[0xBB, 0xCC], None);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].payload, vec![0x67, 0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn write_length_prefixed_round_trips_with_the_reader() {
        let mut buf = BytesMut::new();
        write_length_prefixed(&mut buf, &[1, 2, 3], 2);
        assert_eq!(&buf[..], &[0, 3, 1, 2, 3]);
    }
}
