//! Splits an H.264/AVC elementary stream into NAL units, classifies and
//! groups them into access units, derives picture format and timestamps, and
//! reframes between Annex B and AVCC/AVC3 on the way out.

mod bitstream;
mod scheme;

pub use bitstream::BitstreamError;

mod au_splitter;
mod dcr;
mod filter;
mod format;
mod nalu;
mod nalu_parser;
mod nalu_splitter;
mod stream_structure;
mod timestamp;

pub use au_splitter::AuSplitter;
pub use dcr::{DcrError, DecoderConfigurationRecord};
pub use filter::*;
pub use format::{derive_dimensions, recognize_profile, PictureDimensions, Profile};
pub use nalu::{Nalu, NaluStatus, NaluType, Timestamps};
pub use nalu_parser::{NaluError, NaluParser};
pub use nalu_splitter::{write_length_prefixed, NaluSplitter, SplitNalu};
pub use scheme::sps::SpsInfo;
pub use scheme::{FieldValue, GlobalState, SchemeError};
pub use stream_structure::StreamStructure;
pub use timestamp::{TimestampError, TimestampGenerator};

pub mod prelude;
