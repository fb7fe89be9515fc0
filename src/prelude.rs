pub use crate::au_splitter::AuSplitter;
pub use crate::bitstream::BitstreamError;
pub use crate::dcr::{DcrError, DecoderConfigurationRecord};
pub use crate::filter::*;
pub use crate::format::{derive_dimensions, recognize_profile, PictureDimensions, Profile};
pub use crate::nalu::{Nalu, NaluStatus, NaluType, Timestamps};
pub use crate::nalu_parser::{NaluError, NaluParser};
pub use crate::nalu_splitter::{write_length_prefixed, NaluSplitter, SplitNalu};
pub use crate::scheme::sps::SpsInfo;
pub use crate::scheme::{FieldValue, GlobalState, SchemeError};
pub use crate::stream_structure::StreamStructure;
pub use crate::timestamp::{TimestampError, TimestampGenerator};
