use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DcrError {
    #[error("configurationVersion byte did not indicate AVCC (expected 1)")]
    NotAvcc,

    #[error("malformed decoder configuration record: {0}")]
    MalformedDcr(&'static str),
}

/// A parsed AVC Decoder Configuration Record (ISO/IEC 14496-15 §5.3.3.1.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfigurationRecord {
    pub profile: u8,
    pub profile_compatibility: u8,
    pub level: u8,
    pub length_size: u8,
    pub spss: Vec<Bytes>,
    pub ppss: Vec<Bytes>,
}

impl DecoderConfigurationRecord {
    pub fn parse(mut bytes: Bytes) -> Result<Self, DcrError> {
        let configuration_version = bytes.try_get_u8().map_err(|_| DcrError::MalformedDcr("configurationVersion"))?;
        if configuration_version != 1 {
            return Err(DcrError::NotAvcc);
        }

        let profile = bytes.try_get_u8().map_err(|_| DcrError::MalformedDcr("AVCProfileIndication"))?;
        let profile_compatibility = bytes.try_get_u8().map_err(|_| DcrError::MalformedDcr("profile_compatibility"))?;
        let level = bytes.try_get_u8().map_err(|_| DcrError::MalformedDcr("AVCLevelIndication"))?;

        let length_size_byte = bytes.try_get_u8().map_err(|_| DcrError::MalformedDcr("lengthSizeMinusOne"))?;
        let length_size = (length_size_byte & 0b11) + 1;

        let sps_count_byte = bytes.try_get_u8().map_err(|_| DcrError::MalformedDcr("numOfSequenceParameterSets"))?;
        let sps_count = sps_count_byte & 0x1F;
        let spss = (0..sps_count)
            .map(|_| Self::parse_nalu(&mut bytes))
            .collect::<Result<_, _>>()?;

        let pps_count = bytes.try_get_u8().map_err(|_| DcrError::MalformedDcr("numOfPictureParameterSets"))?;
        let ppss = (0..pps_count)
            .map(|_| Self::parse_nalu(&mut bytes))
            .collect::<Result<_, _>>()?;

        Ok(Self {
            profile,
            profile_compatibility,
            level,
            length_size,
            spss,
            ppss,
        })
    }

    fn parse_nalu(bytes: &mut Bytes) -> Result<Bytes, DcrError> {
        let len = bytes.try_get_u16().map_err(|_| DcrError::MalformedDcr("nalUnitLength"))? as usize;
        if bytes.len() < len {
            return Err(DcrError::MalformedDcr("nalUnit"));
        }
        let nalu = bytes.slice(0..len);
        *bytes = bytes.slice(len..);
        Ok(nalu)
    }

    /// Builds an AVCC DCR from the first cached SPS and all cached PPS,
    /// matching `smelter-core`'s `build_avc_decoder_config` byte layout.
    /// `length_size` is normally 4; 1, 2, and 4 are also valid.
    pub fn generate(spss: &[Bytes], ppss: &[Bytes], length_size: u8) -> Option<Bytes> {
        let sps = spss.first()?;
        if ppss.is_empty() || sps.len() < 4 {
            return None;
        }

        let mut buf = BytesMut::new();
        buf.put_u8(1); // configurationVersion
        buf.put_u8(sps[1]); // AVCProfileIndication
        buf.put_u8(sps[2]); // profile_compatibility
        buf.put_u8(sps[3]); // AVCLevelIndication
        buf.put_u8(0xFC | (length_size.saturating_sub(1) & 0b11));

        buf.put_u8(0xE0 | spss.len() as u8);
        for sps in spss {
            buf.put_u16(sps.len() as u16);
            buf.extend_from_slice(sps);
        }

        buf.put_u8(ppss.len() as u8);
        for pps in ppss {
            buf.put_u16(pps.len() as u16);
            buf.extend_from_slice(pps);
        }

        Some(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_single_sps_single_pps_record() {
        let mut data = Vec::new();
        data.push(1); // version
        data.push(0x42); // profile
        data.push(0x00); // compat
        data.push(0x1E); // level
        data.push(0xFF); // length_size = 4
        data.push(0xE1); // 1 sps
        data.extend_from_slice(&4u16.to_be_bytes());
        data.extend_from_slice(&[0x67, 0x42, 0x00, 0x1E]);
        data.push(1); // 1 pps
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&[0x68]);

        let dcr = DecoderConfigurationRecord::parse(Bytes::from(data)).unwrap();
        assert_eq!(dcr.profile, 0x42);
        assert_eq!(dcr.level, 0x1E);
        assert_eq!(dcr.length_size, 4);
        assert_eq!(dcr.spss, vec![Bytes::from_static(&[0x67, 0x42, 0x00, 0x1E])]);
        assert_eq!(dcr.ppss, vec![Bytes::from_static(&[0x68])]);
    }

    #[test]
    fn rejects_a_non_avcc_configuration_version() {
        let data = vec![2u8, 0, 0, 0, 0, 0, 0];
        let err = DecoderConfigurationRecord::parse(Bytes::from(data)).unwrap_err();
        assert_eq!(err, DcrError::NotAvcc);
    }

    #[test]
    fn generate_round_trips_through_parse() {
        let sps = Bytes::from_static(&[0x67, 0x42, 0x00, 0x1E]);
        let pps = Bytes::from_static(&[0x68, 0xCE]);
        let record = DecoderConfigurationRecord::generate(&[sps.clone()], &[pps.clone()], 4).unwrap();
        let parsed = DecoderConfigurationRecord::parse(record).unwrap();
        assert_eq!(parsed.profile, 0x42);
        assert_eq!(parsed.level, 0x1E);
        assert_eq!(parsed.length_size, 4);
        assert_eq!(parsed.spss, vec![sps]);
        assert_eq!(parsed.ppss, vec![pps]);
    }

    #[test]
    fn generate_returns_none_without_any_pps() {
        let sps = Bytes::from_static(&[0x67, 0x42, 0x00, 0x1E]);
        assert!(DecoderConfigurationRecord::generate(&[sps], &[], 4).is_none());
    }
}
