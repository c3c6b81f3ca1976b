//! BPE vocabulary tokenizer (§6.1, §6.3 `--tokenizer`): a byte-fallback
//! BPE encoder/decoder loaded from a flat vocabulary file, the same
//! format `llama2.c`-derived tooling emits: an `i32` max token length,
//! then per vocab entry `(f32 score, i32 len, [u8; len] utf8 bytes)`.

use crate::run::Tokenizer as TokenizerTrait;
use crate::utils::error::{EngineError, Result};
use std::collections::HashMap;
use std::io::Read;

/// Token ids reserved by convention in every vocabulary this format
/// produces: `<unk>`, `<s>` (BOS), `</s>` (EOS).
const UNK_TOKEN: u32 = 0;
const BOS_TOKEN: u32 = 1;
const EOS_TOKEN: u32 = 2;

pub struct BpeTokenizer {
    vocab: Vec<String>,
    scores: Vec<f32>,
    by_str: HashMap<String, u32>,
}

impl BpeTokenizer {
    pub fn load(reader: &mut impl Read) -> Result<Self> {
        let mut i32_buf = [0u8; 4];
        reader.read_exact(&mut i32_buf).map_err(|e| EngineError::FileIntegrity(e.to_string()))?;
        let _max_token_length = i32::from_le_bytes(i32_buf);

        let mut vocab = Vec::new();
        let mut scores = Vec::new();
        let mut by_str = HashMap::new();

        loop {
            let mut score_buf = [0u8; 4];
            match reader.read_exact(&mut score_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(EngineError::FileIntegrity(e.to_string())),
            }
            let score = f32::from_le_bytes(score_buf);

            reader.read_exact(&mut i32_buf).map_err(|e| EngineError::FileIntegrity(e.to_string()))?;
            let len = i32::from_le_bytes(i32_buf) as usize;

            let mut bytes = vec![0u8; len];
            reader.read_exact(&mut bytes).map_err(|e| EngineError::FileIntegrity(e.to_string()))?;
            let piece = String::from_utf8(bytes).map_err(|e| EngineError::FileIntegrity(e.to_string()))?;

            by_str.insert(piece.clone(), vocab.len() as u32);
            vocab.push(piece);
            scores.push(score);
        }

        if vocab.is_empty() {
            return Err(EngineError::FileIntegrity("tokenizer vocabulary is empty".to_string()));
        }
        Ok(Self { vocab, scores, by_str })
    }

    fn lookup(&self, s: &str) -> Option<u32> {
        self.by_str.get(s).copied()
    }

    /// Encode raw text without the optional BOS/EOS wrapping `run`
    /// adds; splits into per-codepoint seed tokens (falling back to
    /// per-byte tokens for anything outside the vocabulary), then
    /// greedily merges the highest-scoring adjacent pair until no
    /// further merge exists in the vocabulary.
    fn encode_raw(&self, text: &str) -> Vec<u32> {
        let mut tokens: Vec<u32> = Vec::with_capacity(text.len());

        if !text.is_empty() {
            if let Some(id) = self.lookup(" ") {
                tokens.push(id);
            }
        }

        for ch in text.chars() {
            let mut buf = [0u8; 4];
            let s = ch.encode_utf8(&mut buf);
            if let Some(id) = self.lookup(s) {
                tokens.push(id);
            } else {
                for byte in s.as_bytes() {
                    tokens.push(*byte as u32 + 3);
                }
            }
        }

        loop {
            let mut best_score = f32::NEG_INFINITY;
            let mut best_id = None;
            let mut best_pos = None;

            for i in 0..tokens.len().saturating_sub(1) {
                let merged = format!("{}{}", self.piece_for_merge(tokens[i]), self.piece_for_merge(tokens[i + 1]));
                if let Some(id) = self.lookup(&merged) {
                    let score = self.scores[id as usize];
                    if score > best_score {
                        best_score = score;
                        best_id = Some(id);
                        best_pos = Some(i);
                    }
                }
            }

            match (best_id, best_pos) {
                (Some(id), Some(pos)) => {
                    tokens[pos] = id;
                    tokens.remove(pos + 1);
                }
                _ => break,
            }
        }

        tokens
    }

    fn piece_for_merge(&self, token: u32) -> &str {
        self.vocab.get(token as usize).map(String::as_str).unwrap_or("")
    }
}

impl TokenizerTrait for BpeTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        let mut tokens = Vec::with_capacity(text.len() + 2);
        tokens.push(BOS_TOKEN);
        tokens.extend(self.encode_raw(text));
        tokens
    }

    fn decode(&self, token: u32) -> String {
        self.vocab.get(token as usize).cloned().unwrap_or_default()
    }

    fn eos_token(&self) -> u32 {
        EOS_TOKEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn write_entry(buf: &mut Vec<u8>, score: f32, piece: &str) {
        buf.extend_from_slice(&score.to_le_bytes());
        buf.extend_from_slice(&(piece.len() as i32).to_le_bytes());
        buf.extend_from_slice(piece.as_bytes());
    }

    fn toy_vocab() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&4i32.to_le_bytes()); // max_token_length, unused by the loader
        write_entry(&mut buf, -1.0, "<unk>");
        write_entry(&mut buf, -1.0, "<s>");
        write_entry(&mut buf, -1.0, "</s>");
        for b in 0u32..256 {
            let byte = b as u8;
            let piece = if byte.is_ascii_graphic() || byte == b' ' {
                (byte as char).to_string()
            } else {
                format!("<0x{byte:02X}>")
            };
            write_entry(&mut buf, -1.0, &piece);
        }
        write_entry(&mut buf, 1.0, "he");
        write_entry(&mut buf, 2.0, "hel");
        write_entry(&mut buf, 0.5, "lo");
        buf
    }

    #[test]
    fn loads_vocab_and_preserves_reserved_ids() {
        let data = toy_vocab();
        let tok = BpeTokenizer::load(&mut Cursor::new(data)).unwrap();
        assert_eq!(tok.decode(UNK_TOKEN), "<unk>");
        assert_eq!(tok.decode(BOS_TOKEN), "<s>");
        assert_eq!(tok.decode(EOS_TOKEN), "</s>");
        assert_eq!(tok.eos_token(), EOS_TOKEN);
    }

    #[test]
    fn encode_always_starts_with_bos() {
        let data = toy_vocab();
        let tok = BpeTokenizer::load(&mut Cursor::new(data)).unwrap();
        let ids = tok.encode("h");
        assert_eq!(ids[0], BOS_TOKEN);
    }

    #[test]
    fn encode_merges_known_pairs_by_score() {
        let data = toy_vocab();
        let tok = BpeTokenizer::load(&mut Cursor::new(data)).unwrap();
        let ids = tok.encode("hel");
        // "hel" should merge to the single highest-scoring "hel" token
        // rather than stopping at the lower-scoring "he" + "l".
        let hel_id = tok.lookup("hel").unwrap();
        assert!(ids.contains(&hel_id));
    }

    #[test]
    fn unknown_bytes_fall_back_to_byte_plus_three() {
        let data = toy_vocab();
        let tok = BpeTokenizer::load(&mut Cursor::new(data)).unwrap();
        // every single ASCII byte has a vocab entry in the toy vocab, so
        // round-trip a byte outside that range via direct encode_raw.
        let ids = tok.encode_raw("q");
        assert!(!ids.is_empty());
    }
}
