use std::collections::HashSet;

use bytes::{Bytes, BytesMut};
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::au_splitter::AuSplitter;
use crate::dcr::{DcrError, DecoderConfigurationRecord};
use crate::format::{derive_dimensions, recognize_profile, PictureDimensions, Profile};
use crate::nalu::{Nalu, NaluStatus, NaluType};
use crate::nalu_parser::NaluParser;
use crate::nalu_splitter::{write_length_prefixed, NaluSplitter, SplitNalu};
use crate::scheme::sps::SpsInfo;
use crate::stream_structure::StreamStructure;
use crate::timestamp::{TimestampError, TimestampGenerator};

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("both a config-supplied parameter set and a DCR-carried one are present")]
    ParameterSetConflict,

    #[error("stream structure change mid-stream is not supported")]
    UnsupportedStreamStructureChange,

    #[error(transparent)]
    UnsupportedProfileForTsGen(#[from] TimestampError),

    #[error(transparent)]
    MalformedDcr(#[from] DcrError),
}

/// Granularity the host hands input buffers in at, for an `H264{..}` input
/// stream format (spec §6: `alignment ∈ {nalu, au}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Au,
    Nalu,
}

/// Internal input mode, distinguishing a genuinely unaligned bytestream from
/// the two `H264{alignment, ..}` modes. `Bytestream` and `Alignment::Nalu`
/// both drive the splitter one NALU-completion-at-a-time, but per spec §4.9
/// they diverge on two points: whether `push()` forces a `flush()` of any
/// residual NALU (only when alignment is guaranteed, i.e. not bytestream),
/// and whether the host's input pts is attached to the NALU that completes
/// inside a pushed buffer (only in true `nalu_aligned` mode; bytestream mode
/// carries no input timestamps at all, relying on best-effort generation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputMode {
    Bytestream,
    Nalu,
    Au,
}

impl InputMode {
    fn forces_flush_on_push(&self) -> bool {
        !matches!(self, InputMode::Bytestream)
    }

    fn carries_input_pts(&self) -> bool {
        !matches!(self, InputMode::Bytestream)
    }
}

impl From<Alignment> for InputMode {
    fn from(alignment: Alignment) -> Self {
        match alignment {
            Alignment::Au => InputMode::Au,
            Alignment::Nalu => InputMode::Nalu,
        }
    }
}

/// Granularity the host wants output buffers grouped at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputAlignment {
    Au,
    Nalu,
}

impl Default for OutputAlignment {
    fn default() -> Self {
        OutputAlignment::Au
    }
}

/// The stream structure the host wants on output; `FollowInput` mirrors
/// whatever the input used.
#[derive(Debug, Clone, Copy)]
pub enum OutputStreamStructureConfig {
    FollowInput,
    AnnexB,
    Avc1 { length_size: u8 },
    Avc3 { length_size: u8 },
}

impl Default for OutputStreamStructureConfig {
    fn default() -> Self {
        OutputStreamStructureConfig::FollowInput
    }
}

/// How presentation timestamps are synthesized when the host does not supply
/// them.
#[derive(Debug, Clone, Copy)]
pub struct BestEffortTimestamps {
    pub framerate: (u64, u64),
    pub add_dts_offset: Option<u32>,
}

/// Host-facing configuration.
#[derive(Debug, Clone, Default)]
pub struct FilterConfig {
    pub sps: Vec<Bytes>,
    pub pps: Vec<Bytes>,
    pub output_alignment: OutputAlignment,
    pub skip_until_keyframe: bool,
    pub repeat_parameter_sets: bool,
    pub output_stream_structure: OutputStreamStructureConfig,
    pub generate_best_effort_timestamps: Option<BestEffortTimestamps>,
}

impl FilterConfig {
    pub fn new() -> Self {
        Self {
            skip_until_keyframe: true,
            ..Default::default()
        }
    }
}

/// Tagged description of the input framing the host has committed to.
#[derive(Debug, Clone)]
pub enum InputStreamFormat {
    Bytestream,
    H264 {
        alignment: Alignment,
        stream_structure: InputStreamStructure,
    },
}

#[derive(Debug, Clone)]
pub enum InputStreamStructure {
    AnnexB,
    Avc1 { dcr: Bytes },
    Avc3 { dcr: Bytes },
}

/// Per-NALU metadata attached to an output buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NaluMetadata {
    pub nalu_type: NaluType,
    pub prefixed_poslen: (usize, usize),
    pub unprefixed_poslen: (usize, usize),
    pub new_access_unit: bool,
    pub end_access_unit: bool,
}

/// One output buffer: either one AU or one NALU's worth of payload bytes,
/// depending on the configured output alignment.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    pub payload: Bytes,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub key_frame: bool,
    pub nalus: Vec<NaluMetadata>,
}

/// Resolved output stream description, derived the first time an SPS is seen.
#[derive(Debug, Clone)]
pub struct OutputStreamDescription {
    pub alignment: OutputAlignment,
    pub dimensions: PictureDimensions,
    pub profile: Option<Profile>,
    pub framerate: Option<(u64, u64)>,
    pub stream_structure: StreamStructure,
}

/// Composes the NALU splitter, parser, and AU splitter into the full
/// pipeline: mode detection, parameter-set cache, IDR repetition,
/// skip-until-keyframe, stream-structure conversion, and output
/// buffer/metadata assembly.
pub struct Filter {
    config: FilterConfig,
    mode: Option<InputMode>,
    input_structure: Option<StreamStructure>,
    splitter: Option<NaluSplitter>,
    parser: NaluParser,
    au_splitter: AuSplitter,
    sps_cache: FxHashMap<u8, (SpsInfo, Bytes)>,
    pps_cache: FxHashMap<u8, Bytes>,
    seen_idr: bool,
    timestamp_gen: Option<TimestampGenerator>,
    stream_description: Option<OutputStreamDescription>,
}

impl Filter {
    pub fn new(config: FilterConfig) -> Self {
        Self {
            config,
            mode: None,
            input_structure: None,
            splitter: None,
            parser: NaluParser::new(),
            au_splitter: AuSplitter::new(),
            sps_cache: FxHashMap::default(),
            pps_cache: FxHashMap::default(),
            seen_idr: false,
            timestamp_gen: None,
            stream_description: None,
        }
    }

    pub fn stream_description(&self) -> Option<&OutputStreamDescription> {
        self.stream_description.as_ref()
    }

    /// Establishes (or validates, if already set) the input alignment and
    /// stream structure. Parses an AVCC DCR when present and seeds the
    /// parameter-set cache from it. Fatal on a config/DCR parameter-set
    /// conflict or a mid-stream structural change.
    pub fn set_input_format(&mut self, format: InputStreamFormat) -> Result<(), FilterError> {
        let (mode, structure) = match format {
            InputStreamFormat::Bytestream => {
                self.seed_config_parameter_sets();
                (InputMode::Bytestream, StreamStructure::AnnexB)
            }
            InputStreamFormat::H264 {
                alignment,
                stream_structure: InputStreamStructure::AnnexB,
            } => {
                self.seed_config_parameter_sets();
                (InputMode::from(alignment), StreamStructure::AnnexB)
            }
            InputStreamFormat::H264 {
                alignment,
                stream_structure: InputStreamStructure::Avc1 { dcr },
            } => {
                let record = self.parse_and_seed_dcr(dcr)?;
                (InputMode::from(alignment), StreamStructure::Avc1 { length_size: record.length_size })
            }
            InputStreamFormat::H264 {
                alignment,
                stream_structure: InputStreamStructure::Avc3 { dcr },
            } => {
                let record = self.parse_and_seed_dcr(dcr)?;
                (InputMode::from(alignment), StreamStructure::Avc3 { length_size: record.length_size })
            }
        };

        if let Some(existing) = self.input_structure {
            if existing.is_incompatible_change(&structure) {
                return Err(FilterError::UnsupportedStreamStructureChange);
            }
        }

        self.mode = Some(mode);
        self.input_structure = Some(structure);
        self.splitter = Some(NaluSplitter::new(structure));
        Ok(())
    }

    fn parse_and_seed_dcr(&mut self, dcr: Bytes) -> Result<DecoderConfigurationRecord, FilterError> {
        let record = DecoderConfigurationRecord::parse(dcr)?;
        if !self.config.sps.is_empty() || !self.config.pps.is_empty() {
            return Err(FilterError::ParameterSetConflict);
        }
        self.seed_parameter_sets(&record.spss, &record.ppss);
        Ok(record)
    }

    fn seed_config_parameter_sets(&mut self) {
        let sps = self.config.sps.clone();
        let pps = self.config.pps.clone();
        self.seed_parameter_sets(&sps, &pps);
    }

    /// Runs each raw SPS/PPS blob through the parser as if it were an
    /// in-band NALU, so the same cache-update path (`cache_parameter_set_if_present`)
    /// handles both in-band and out-of-band parameter sets. SPS must precede
    /// PPS: a PPS references its SPS via `load_global` while parsing.
    fn seed_parameter_sets(&mut self, spss: &[Bytes], ppss: &[Bytes]) {
        for sps in spss {
            let nalu = self.parser.parse_nalu(Vec::new(), sps.to_vec(), None);
            if nalu.status == NaluStatus::Valid {
                self.cache_parameter_set_if_present(&nalu);
            } else {
                tracing::warn!("dropping unparseable out-of-band sps");
            }
        }
        for pps in ppss {
            let nalu = self.parser.parse_nalu(Vec::new(), pps.to_vec(), None);
            if nalu.status == NaluStatus::Valid {
                self.cache_parameter_set_if_present(&nalu);
            } else {
                tracing::warn!("dropping unparseable out-of-band pps");
            }
        }
    }

    /// Feeds one input buffer through the pipeline, returning zero or more
    /// completed output buffers.
    pub fn push(&mut self, data: &[u8], pts: Option<i64>) -> Result<Vec<OutputBuffer>, FilterError> {
        let mode = self.mode.unwrap_or(InputMode::Bytestream);
        let splitter = self
            .splitter
            .get_or_insert_with(|| NaluSplitter::new(StreamStructure::AnnexB));

        let push_pts = if mode.carries_input_pts() { pts } else { None };
        let mut split = splitter.push(data, push_pts);
        if mode.forces_flush_on_push() {
            split.extend(splitter.flush());
        }

        self.process_split_nalus(split)
    }

    pub fn flush(&mut self) -> Result<Vec<OutputBuffer>, FilterError> {
        let Some(splitter) = self.splitter.as_mut() else {
            return Ok(Vec::new());
        };
        let split = splitter.flush();
        let mut out = self.process_split_nalus(split)?;

        if let Some(au) = self.au_splitter.flush() {
            out.extend(self.finish_au(au)?);
        }

        Ok(out)
    }

    fn process_split_nalus(&mut self, split: Vec<SplitNalu>) -> Result<Vec<OutputBuffer>, FilterError> {
        let mut out = Vec::new();
        for s in split {
            let nalu = self.parser.parse_nalu(s.stripped_prefix, s.payload, s.pts);
            self.cache_parameter_set_if_present(&nalu);

            if nalu.status == NaluStatus::Error {
                tracing::warn!("dropping malformed nalu, still honoring any au boundary it forces");
            }

            if let Some(au) = self.au_splitter.put_nalu(nalu) {
                out.extend(self.finish_au(au)?);
            }
        }
        Ok(out)
    }

    fn cache_parameter_set_if_present(&mut self, nalu: &Nalu) {
        match nalu.nalu_type {
            NaluType::Sps => {
                let info = SpsInfo::from_fields(&nalu.parsed_fields);
                let id = info.seq_parameter_set_id;
                let is_new = match self.sps_cache.get(&id) {
                    Some((_, bytes)) => bytes.as_ref() != nalu.payload.as_slice(),
                    None => true,
                };
                self.sps_cache
                    .insert(id, (info.clone(), Bytes::copy_from_slice(&nalu.payload)));
                if is_new || self.stream_description.is_none() {
                    tracing::debug!(seq_parameter_set_id = id, "sps cache updated");
                    self.update_stream_description(&info);
                }
            }
            NaluType::Pps => {
                let id = nalu
                    .parsed_fields
                    .get("pic_parameter_set_id")
                    .and_then(crate::scheme::FieldValue::as_u64)
                    .unwrap_or(0) as u8;
                self.pps_cache.insert(id, Bytes::copy_from_slice(&nalu.payload));
                tracing::debug!(pic_parameter_set_id = id, "pps cache updated");
            }
            _ => {}
        }
    }

    fn update_stream_description(&mut self, sps: &SpsInfo) {
        let dimensions = derive_dimensions(sps);
        let profile = recognize_profile(sps);
        let structure = self.resolved_output_structure();
        let framerate = self.config.generate_best_effort_timestamps.map(|t| t.framerate);
        self.stream_description = Some(OutputStreamDescription {
            alignment: self.config.output_alignment,
            dimensions,
            profile,
            framerate,
            stream_structure: structure,
        });
    }

    fn resolved_output_structure(&self) -> StreamStructure {
        match self.config.output_stream_structure {
            OutputStreamStructureConfig::FollowInput => {
                self.input_structure.unwrap_or(StreamStructure::AnnexB)
            }
            OutputStreamStructureConfig::AnnexB => StreamStructure::AnnexB,
            OutputStreamStructureConfig::Avc1 { length_size } => StreamStructure::Avc1 { length_size },
            OutputStreamStructureConfig::Avc3 { length_size } => StreamStructure::Avc3 { length_size },
        }
    }

    fn finish_au(&mut self, mut au: Vec<Nalu>) -> Result<Vec<OutputBuffer>, FilterError> {
        if au.iter().any(|n| n.status == NaluStatus::Error) {
            tracing::warn!("dropping au containing a malformed nalu");
            return Ok(Vec::new());
        }

        let output_structure = self.resolved_output_structure();
        let key_frame = au.iter().any(|n| n.nalu_type.is_idr());

        if matches!(output_structure, StreamStructure::Avc1 { .. }) {
            au.retain(|n| !matches!(n.nalu_type, NaluType::Sps | NaluType::Pps));
        } else if key_frame {
            // `repeat_parameter_sets` asks for this on every IDR AU regardless of
            // framing; independent of that flag, an input structure that never
            // carries parameter sets in-band (AVC1, DCR-only) must still have them
            // injected once conversion lands on a structure that does (AnnexB/AVC3) -
            // otherwise the converted stream would carry no parameter sets at all.
            let input_carries_in_band = self
                .input_structure
                .map(|s| s.carries_parameter_sets_in_band())
                .unwrap_or(true);
            if self.config.repeat_parameter_sets || !input_carries_in_band {
                self.prepend_cached_parameter_sets(&mut au);
            }
        }

        if self.config.skip_until_keyframe && !self.seen_idr && !key_frame {
            tracing::debug!("dropping au before the first keyframe");
            return Ok(Vec::new());
        }
        if key_frame {
            self.seen_idr = true;
        }

        if au.is_empty() {
            return Ok(Vec::new());
        }

        let (pts, dts) = self.resolve_timestamps(&au)?;

        match self.config.output_alignment {
            OutputAlignment::Au => Ok(vec![self.assemble_au_buffer(&au, output_structure, pts, dts, key_frame)]),
            OutputAlignment::Nalu => Ok(self.assemble_nalu_buffers(&au, output_structure, pts, dts, key_frame)),
        }
    }

    fn prepend_cached_parameter_sets(&self, au: &mut Vec<Nalu>) {
        let present_sps: HashSet<u8> = au
            .iter()
            .filter(|n| n.nalu_type == NaluType::Sps)
            .map(|n| {
                n.parsed_fields
                    .get("seq_parameter_set_id")
                    .and_then(crate::scheme::FieldValue::as_u64)
                    .unwrap_or(0) as u8
            })
            .collect();
        let present_pps: HashSet<u8> = au
            .iter()
            .filter(|n| n.nalu_type == NaluType::Pps)
            .map(|n| {
                n.parsed_fields
                    .get("pic_parameter_set_id")
                    .and_then(crate::scheme::FieldValue::as_u64)
                    .unwrap_or(0) as u8
            })
            .collect();

        let mut prefix = Vec::new();
        for (id, (_, bytes)) in &self.sps_cache {
            if !present_sps.contains(id) {
                prefix.push(raw_nalu(bytes.clone()));
            }
        }
        for (id, bytes) in &self.pps_cache {
            if !present_pps.contains(id) {
                prefix.push(raw_nalu(bytes.clone()));
            }
        }

        for nalu in prefix.into_iter().rev() {
            au.insert(0, nalu);
        }
    }

    fn resolve_timestamps(&mut self, au: &[Nalu]) -> Result<(Option<i64>, Option<i64>), FilterError> {
        if let Some(pts) = au.iter().find_map(|n| n.timestamps.pts) {
            return Ok((Some(pts), Some(pts)));
        }

        let Some(best_effort) = self.config.generate_best_effort_timestamps else {
            return Ok((None, None));
        };

        let gen = match &mut self.timestamp_gen {
            Some(gen) => gen,
            None => {
                let sps = self.sps_cache.values().next().map(|(info, _)| info.clone());
                let gen = match best_effort.add_dts_offset {
                    Some(offset) => TimestampGenerator::with_explicit_offset(best_effort.framerate, offset),
                    None => TimestampGenerator::new(best_effort.framerate, sps.as_ref())?,
                };
                self.timestamp_gen.insert(gen)
            }
        };

        let (pts, dts) = gen.next();
        Ok((Some(pts), Some(dts)))
    }

    fn assemble_au_buffer(
        &self,
        au: &[Nalu],
        output_structure: StreamStructure,
        pts: Option<i64>,
        dts: Option<i64>,
        key_frame: bool,
    ) -> OutputBuffer {
        let mut payload = BytesMut::new();
        let mut metas = Vec::new();

        for (i, nalu) in au.iter().enumerate() {
            let start = payload.len();
            write_framed_nalu(&mut payload, &nalu.payload, output_structure);
            let end = payload.len();
            let prefix_len = end - start - nalu.payload.len();

            metas.push(NaluMetadata {
                nalu_type: nalu.nalu_type,
                prefixed_poslen: (start, end - start),
                unprefixed_poslen: (start + prefix_len, nalu.payload.len()),
                new_access_unit: i == 0,
                end_access_unit: i == au.len() - 1,
            });
        }

        OutputBuffer {
            payload: payload.freeze(),
            pts,
            dts,
            key_frame,
            nalus: metas,
        }
    }

    fn assemble_nalu_buffers(
        &self,
        au: &[Nalu],
        output_structure: StreamStructure,
        pts: Option<i64>,
        dts: Option<i64>,
        key_frame: bool,
    ) -> Vec<OutputBuffer> {
        au.iter()
            .enumerate()
            .map(|(i, nalu)| {
                let mut payload = BytesMut::new();
                write_framed_nalu(&mut payload, &nalu.payload, output_structure);
                let prefix_len = payload.len() - nalu.payload.len();
                let meta = NaluMetadata {
                    nalu_type: nalu.nalu_type,
                    prefixed_poslen: (0, payload.len()),
                    unprefixed_poslen: (prefix_len, nalu.payload.len()),
                    new_access_unit: i == 0,
                    end_access_unit: i == au.len() - 1,
                };
                OutputBuffer {
                    payload: payload.freeze(),
                    pts,
                    dts,
                    key_frame,
                    nalus: vec![meta],
                }
            })
            .collect()
    }
}

fn raw_nalu(payload: Bytes) -> Nalu {
    let nal_unit_type = payload.first().map(|&b| b & 0x1F).unwrap_or(0);
    Nalu {
        parsed_fields: std::collections::HashMap::new(),
        nalu_type: NaluType::from_nal_unit_type(nal_unit_type),
        nal_ref_idc: payload.first().map(|&b| (b >> 5) & 0b11).unwrap_or(0),
        stripped_prefix: Vec::new(),
        payload: payload.to_vec(),
        status: NaluStatus::Valid,
        timestamps: crate::nalu::Timestamps::default(),
    }
}

fn write_framed_nalu(out: &mut BytesMut, payload: &[u8], structure: StreamStructure) {
    match structure {
        StreamStructure::AnnexB => {
            out.extend_from_slice(&[0, 0, 0, 1]);
            out.extend_from_slice(payload);
        }
        StreamStructure::Avc1 { length_size } | StreamStructure::Avc3 { length_size } => {
            write_length_prefixed(out, payload, length_size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_avc3_dcr() -> Bytes {
        Bytes::from_static(&[1, 0x42, 0, 0x1E, 0xFF, 0xE0, 0])
    }

    #[test]
    fn new_filter_has_no_stream_description_yet() {
        let filter = Filter::new(FilterConfig::new());
        assert!(filter.stream_description().is_none());
    }

    #[test]
    fn bytestream_input_uses_annex_b_and_bytestream_mode() {
        let mut filter = Filter::new(FilterConfig::new());
        filter.set_input_format(InputStreamFormat::Bytestream).unwrap();
        assert_eq!(filter.input_structure, Some(StreamStructure::AnnexB));
        assert_eq!(filter.mode, Some(InputMode::Bytestream));
    }

    #[test]
    fn nalu_aligned_input_is_distinct_from_bytestream_mode() {
        let mut filter = Filter::new(FilterConfig::new());
        filter
            .set_input_format(InputStreamFormat::H264 {
                alignment: Alignment::Nalu,
                stream_structure: InputStreamStructure::AnnexB,
            })
            .unwrap();
        assert_eq!(filter.mode, Some(InputMode::Nalu));
    }

    #[test]
    fn nalu_aligned_push_forces_a_flush_of_any_residual_nalu() {
        // A single NALU with no trailing start code: bytestream mode would
        // withhold it until an explicit `flush()`, but nalu_aligned mode
        // knows this buffer is already a whole NALU and must not wait.
        let mut filter = Filter::new(FilterConfig::new());
        filter
            .set_input_format(InputStreamFormat::H264 {
                alignment: Alignment::Nalu,
                stream_structure: InputStreamStructure::AnnexB,
            })
            .unwrap();

        let mut data = Vec::new();
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(&TEST_SPS);
        let out = filter.push(&data, Some(5)).unwrap();
        assert!(out.is_empty()); // sps alone never closes an au

        data.clear();
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(&TEST_PPS);
        let out = filter.push(&data, Some(6)).unwrap();
        assert!(out.is_empty());

        data.clear();
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(&TEST_IDR);
        let mut out = filter.push(&data, Some(7)).unwrap();
        out.extend(filter.flush().unwrap());
        assert_eq!(out.len(), 1);
        assert!(out[0].key_frame);
        // Each of the three buffers carried its own pts through (nalu_aligned
        // mode, not bytestream); the au resolves to the first one present.
        assert_eq!(out[0].pts, Some(5));
    }

    #[test]
    fn bytestream_mode_never_attaches_the_hosts_chunk_pts_to_a_nalu() {
        // Per spec §4.9 step 3, bytestream mode carries no input timestamps;
        // only best-effort generation (or an absent pts) should apply.
        let mut filter = Filter::new(FilterConfig::new());
        filter.set_input_format(InputStreamFormat::Bytestream).unwrap();

        let mut data = Vec::new();
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(&TEST_SPS);
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(&TEST_PPS);
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(&TEST_IDR);

        let mut out = filter.push(&data, Some(123)).unwrap();
        out.extend(filter.flush().unwrap());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].pts, None);
    }

    #[test]
    fn skip_until_keyframe_drops_leading_non_idr_aus() {
        let mut config = FilterConfig::new();
        config.skip_until_keyframe = true;
        let mut filter = Filter::new(config);
        filter.set_input_format(InputStreamFormat::Bytestream).unwrap();

        let mut data = Vec::new();
        data.extend_from_slice(&[0, 0, 0, 1, 0b0000_0001, 0b1_1_1_00000]); // non_idr
        let mut out = filter.push(&data, None).unwrap();
        out.extend(filter.flush().unwrap());
        assert!(out.is_empty());
    }

    #[test]
    fn mid_stream_structure_change_is_rejected() {
        let mut filter = Filter::new(FilterConfig::new());
        filter.set_input_format(InputStreamFormat::Bytestream).unwrap();
        let err = filter.set_input_format(InputStreamFormat::H264 {
            alignment: Alignment::Nalu,
            stream_structure: InputStreamStructure::Avc3 { dcr: minimal_avc3_dcr() },
        });
        assert!(matches!(err, Err(FilterError::UnsupportedStreamStructureChange)));
    }

    // Bit-exact fixtures: an SPS (baseline profile, 4-bit frame_num, poc type 0
    // with 4-bit lsb, 176x128, frame_mbs_only), its matching PPS (id 0, no
    // slice groups, no bottom-field poc), and an IDR/non-IDR slice header each
    // referencing them. Anything past the fields the schemes actually read is
    // padded with zero bits.
    const TEST_SPS: [u8; 8] = [0x67, 0x42, 0x00, 0x1E, 0xF4, 0x16, 0x23, 0x00];
    const TEST_PPS: [u8; 3] = [0x68, 0xCE, 0x38];
    const TEST_IDR: [u8; 3] = [0x25, 0xE1, 0x00];

    #[test]
    fn annex_b_fixture_parses_without_panicking() {
        let mut filter = Filter::new(FilterConfig::new());
        filter.set_input_format(InputStreamFormat::Bytestream).unwrap();

        let mut data = Vec::new();
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(&TEST_SPS);
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(&TEST_PPS);
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(&TEST_IDR);

        let mut out = filter.push(&data, Some(0)).unwrap();
        out.extend(filter.flush().unwrap());
        assert!(!out.is_empty());
        assert!(out[0].key_frame);
    }

    #[test]
    fn au_with_a_malformed_vcl_nalu_is_dropped_but_the_next_au_still_comes_through() {
        let mut filter = Filter::new(FilterConfig::new());
        filter.set_input_format(InputStreamFormat::Bytestream).unwrap();

        let mut data = Vec::new();
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(&TEST_SPS);
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(&TEST_PPS);
        // forbidden_zero_bit=1, type=1 (non_idr) -> status=error; it forces its
        // own au boundary (closing sps+pps with it), dropping that whole au.
        data.extend_from_slice(&[0, 0, 0, 1, 0b1010_0001, 0x00]);
        // a well-formed idr follows and should still come through on its own.
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(&TEST_IDR);

        let mut out = filter.push(&data, Some(0)).unwrap();
        out.extend(filter.flush().unwrap());
        assert_eq!(out.len(), 1);
        assert!(out[0].key_frame);
        assert_eq!(out[0].nalus.len(), 1);
    }

    #[test]
    fn avc1_output_strips_in_band_parameter_sets() {
        let mut config = FilterConfig::new();
        config.output_stream_structure = OutputStreamStructureConfig::Avc1 { length_size: 4 };
        let mut filter = Filter::new(config);
        filter.set_input_format(InputStreamFormat::Bytestream).unwrap();

        let mut data = Vec::new();
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(&TEST_SPS);
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(&TEST_PPS);
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(&TEST_IDR);

        let mut out = filter.push(&data, Some(0)).unwrap();
        out.extend(filter.flush().unwrap());
        assert_eq!(out.len(), 1);
        assert!(out[0].nalus.iter().all(|m| !matches!(m.nalu_type, NaluType::Sps | NaluType::Pps)));
    }

    #[test]
    fn avc1_to_annex_b_conversion_injects_parameter_sets_without_repeat_flag() {
        let sps = Bytes::from_static(&TEST_SPS);
        let pps = Bytes::from_static(&TEST_PPS);
        let dcr = DecoderConfigurationRecord::generate(&[sps], &[pps], 4).unwrap();

        let mut config = FilterConfig::new();
        config.output_stream_structure = OutputStreamStructureConfig::AnnexB;
        assert!(!config.repeat_parameter_sets);
        let mut filter = Filter::new(config);
        filter
            .set_input_format(InputStreamFormat::H264 {
                alignment: Alignment::Nalu,
                stream_structure: InputStreamStructure::Avc1 { dcr },
            })
            .unwrap();

        let mut data = BytesMut::new();
        write_length_prefixed(&mut data, &TEST_IDR, 4);

        let mut out = filter.push(&data, Some(0)).unwrap();
        out.extend(filter.flush().unwrap());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].nalus.len(), 3);
        assert_eq!(out[0].nalus[0].nalu_type, NaluType::Sps);
        assert_eq!(out[0].nalus[1].nalu_type, NaluType::Pps);
        assert!(matches!(out[0].nalus[2].nalu_type, NaluType::Idr));
        assert!(out[0].payload.starts_with(&[0, 0, 0, 1]));
    }
}
