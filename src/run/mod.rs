//! Top-level run loops (§2, §6.3): the root node owns tokenization and
//! sampling and drives the distributed forward pass; a worker node only
//! runs its shard of the executor and answers the root's sync requests.

pub mod chat_template;
pub mod root;
pub mod sampler;
pub mod tokenizer;
pub mod worker;

use crate::utils::error::Result;

/// Converts text to token ids and back. A real tokenizer (e.g. a
/// SentencePiece/BPE vocabulary loaded from the model's metadata) sits
/// behind this seam; nothing else in `run` depends on its internals
/// (§2, §9 "tokenizer implementation is out of scope for the engine
/// core").
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;
    fn decode(&self, token: u32) -> String;
    fn eos_token(&self) -> u32;
}

/// Turns the model's output logits for one step into the next token id
/// (§2, §9 open question "nucleus vs. multinomial sampling" — resolved
/// per `SPEC_FULL.md` as: `topP` strictly in `(0, 1)` selects nucleus
/// sampling, otherwise plain multinomial over the softmax'd logits).
pub trait Sampler: Send + Sync {
    fn sample(&mut self, logits: &mut [f32]) -> u32;
}

/// Renders a chat-style message list into the flat prompt text the
/// tokenizer consumes (§6.4). Kept as a trait seam so a model-specific
/// template (Llama, ChatML, …) can be swapped in without touching the
/// HTTP layer.
pub trait ChatTemplate: Send + Sync {
    fn render(&self, messages: &[(String, String)]) -> String;
}

/// Argmax sampler: always takes the highest-probability token. Used
/// when `temperature == 0.0` (§9).
pub struct GreedySampler;

impl Sampler for GreedySampler {
    fn sample(&mut self, logits: &mut [f32]) -> u32 {
        logits
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i as u32)
            .unwrap_or(0)
    }
}

/// One forward step's worth of work every node does in lockstep,
/// regardless of root/worker role (§2, §4.5).
pub trait ForwardRunner: Send + Sync {
    fn forward(&self, position: u32, token: Option<u32>) -> Result<()>;
}
