//! Model file header (§6.1): magic, then `(i32 key, i32 value)` pairs
//! until the `Eof` sentinel key, then the weight payload.

use crate::utils::error::{EngineError, Result};
use std::collections::HashMap;
use std::io::Read;

pub const MODEL_MAGIC: u32 = 0x0A00_ABCD;

/// Header key codes (§6.1). `Eof` terminates the key/value section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(dead_code)]
pub enum HeaderKey {
    Version,
    ArchType,
    Dim,
    HiddenDim,
    NLayers,
    NHeads,
    NKvHeads,
    VocabSize,
    SeqLen,
    HeadSize,
    RopeTheta,
    RopeType,
    RopeScalingFactor,
    RopeScalingLowFreqFactor,
    RopeScalingHighFreqFactor,
    RopeScalingOrigMaxSeqLen,
    WeightType,
    Eof,
    Unknown(i32),
}

impl HeaderKey {
    fn from_i32(v: i32) -> Self {
        match v {
            0 => HeaderKey::Version,
            1 => HeaderKey::ArchType,
            2 => HeaderKey::Dim,
            3 => HeaderKey::HiddenDim,
            4 => HeaderKey::NLayers,
            5 => HeaderKey::NHeads,
            6 => HeaderKey::NKvHeads,
            7 => HeaderKey::VocabSize,
            8 => HeaderKey::SeqLen,
            9 => HeaderKey::HeadSize,
            10 => HeaderKey::RopeTheta,
            11 => HeaderKey::RopeType,
            12 => HeaderKey::RopeScalingFactor,
            13 => HeaderKey::RopeScalingLowFreqFactor,
            14 => HeaderKey::RopeScalingHighFreqFactor,
            15 => HeaderKey::RopeScalingOrigMaxSeqLen,
            16 => HeaderKey::WeightType,
            255 => HeaderKey::Eof,
            other => HeaderKey::Unknown(other),
        }
    }
}

/// Parsed header fields needed to build the operator graph (§4.9,
/// §6.1). Raw, unrecognized keys are kept around for forward
/// compatibility with newer model files but are not otherwise used.
#[derive(Debug, Clone, Default)]
pub struct ModelHeader {
    pub dim: u32,
    pub hidden_dim: u32,
    pub n_layers: u32,
    pub n_heads: u32,
    pub n_kv_heads: u32,
    pub vocab_size: u32,
    pub seq_len: u32,
    pub head_size: u32,
    pub rope_theta: f32,
    pub rope_type: u32,
    pub rope_scaling_factor: f32,
    pub rope_scaling_low_freq_factor: f32,
    pub rope_scaling_high_freq_factor: f32,
    pub rope_scaling_orig_max_seq_len: u32,
    pub weight_type: u32,
    pub raw: HashMap<i32, i32>,
}

fn read_i32(r: &mut impl Read) -> Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(|e| EngineError::FileIntegrity(e.to_string()))?;
    Ok(i32::from_le_bytes(buf))
}

impl ModelHeader {
    /// Read the magic and every `(key, value)` pair up to `Eof`. The
    /// reader is left positioned at the first weight byte (§6.1).
    pub fn read(r: &mut impl Read) -> Result<Self> {
        let magic = read_i32(r)? as u32;
        if magic != MODEL_MAGIC {
            return Err(EngineError::FileIntegrity(format!(
                "bad model magic: expected {:#010x}, got {:#010x}",
                MODEL_MAGIC, magic
            )));
        }

        let mut header = ModelHeader::default();
        loop {
            let key = read_i32(r)?;
            if HeaderKey::from_i32(key) == HeaderKey::Eof {
                break;
            }
            let value = read_i32(r)?;
            header.raw.insert(key, value);
            match HeaderKey::from_i32(key) {
                HeaderKey::Dim => header.dim = value as u32,
                HeaderKey::HiddenDim => header.hidden_dim = value as u32,
                HeaderKey::NLayers => header.n_layers = value as u32,
                HeaderKey::NHeads => header.n_heads = value as u32,
                HeaderKey::NKvHeads => header.n_kv_heads = value as u32,
                HeaderKey::VocabSize => header.vocab_size = value as u32,
                HeaderKey::SeqLen => header.seq_len = value as u32,
                HeaderKey::HeadSize => header.head_size = value as u32,
                HeaderKey::RopeTheta => header.rope_theta = f32::from_bits(value as u32),
                HeaderKey::RopeType => header.rope_type = value as u32,
                HeaderKey::RopeScalingFactor => header.rope_scaling_factor = f32::from_bits(value as u32),
                HeaderKey::RopeScalingLowFreqFactor => header.rope_scaling_low_freq_factor = f32::from_bits(value as u32),
                HeaderKey::RopeScalingHighFreqFactor => header.rope_scaling_high_freq_factor = f32::from_bits(value as u32),
                HeaderKey::RopeScalingOrigMaxSeqLen => header.rope_scaling_orig_max_seq_len = value as u32,
                HeaderKey::WeightType => header.weight_type = value as u32,
                _ => {} // unknown/forward-compatible key: kept in `raw`, otherwise ignored
            }
        }
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn write_i32(buf: &mut Vec<u8>, v: i32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    #[test]
    fn parses_a_minimal_header() {
        let mut buf = Vec::new();
        write_i32(&mut buf, MODEL_MAGIC as i32);
        write_i32(&mut buf, 2); // Dim
        write_i32(&mut buf, 4096);
        write_i32(&mut buf, 4); // NLayers
        write_i32(&mut buf, 32);
        write_i32(&mut buf, 255); // Eof
        buf.extend_from_slice(&[1, 2, 3, 4]); // start of weight payload

        let mut cursor = Cursor::new(buf);
        let header = ModelHeader::read(&mut cursor).unwrap();
        assert_eq!(header.dim, 4096);
        assert_eq!(header.n_layers, 32);

        let mut remainder = Vec::new();
        std::io::Read::read_to_end(&mut cursor, &mut remainder).unwrap();
        assert_eq!(remainder, vec![1, 2, 3, 4]);
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut buf = Vec::new();
        write_i32(&mut buf, 0xDEAD_BEEFu32 as i32);
        let mut cursor = Cursor::new(buf);
        let err = ModelHeader::read(&mut cursor).unwrap_err();
        assert!(matches!(err, EngineError::FileIntegrity(_)));
    }
}
