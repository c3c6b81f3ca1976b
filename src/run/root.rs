//! Root node run loop (§2): tokenizes the prompt, drives one forward
//! step per generated token across every node via the executor's
//! `WithRoot`-synced position pipe, and samples the next token from
//! the logits buffer.

use crate::device::ExecutionBuffers;
use crate::executor::Executor;
use crate::run::{ChatTemplate, Sampler, Tokenizer};
use crate::utils::error::Result;

/// Everything the root needs to run one generation request end to end.
pub struct RootRunner<'a> {
    pub executor: &'a Executor,
    pub buffers: &'a ExecutionBuffers,
    pub position_pipe_index: usize,
    pub token_pipe_index: usize,
    pub logits_pipe_index: usize,
    pub tokenizer: &'a dyn Tokenizer,
    pub template: &'a dyn ChatTemplate,
}

impl<'a> RootRunner<'a> {
    /// Run the prompt through the network once per token (prefill),
    /// then keep sampling and forwarding until `max_new_tokens` is hit
    /// or the tokenizer's EOS token is sampled (§2, §6.3 `--steps`).
    ///
    /// `--steps` values larger than the model's `seqLen` are clamped
    /// silently to `seqLen - promptLen` rather than erroring, since a
    /// generation request that simply runs out of context is not a
    /// configuration mistake (§9 open question, resolved).
    pub fn generate(&self, messages: &[(String, String)], max_new_tokens: usize, seq_len: usize, sampler: &mut dyn Sampler) -> Result<Vec<u32>> {
        let prompt = self.template.render(messages);
        let prompt_tokens = self.tokenizer.encode(&prompt);
        let budget = max_new_tokens.min(seq_len.saturating_sub(prompt_tokens.len()));

        let mut generated = Vec::with_capacity(budget);
        let mut position = 0u32;

        for &token in &prompt_tokens {
            self.step(position, token)?;
            position += 1;
        }

        let mut next_token = *prompt_tokens.last().unwrap_or(&self.tokenizer.eos_token());
        for _ in 0..budget {
            self.step(position, next_token)?;
            position += 1;

            let logits = self.buffers.pipe(self.logits_pipe_index).as_f32_mut();
            next_token = sampler.sample(logits);
            if next_token == self.tokenizer.eos_token() {
                break;
            }
            generated.push(next_token);
        }
        Ok(generated)
    }

    fn step(&self, position: u32, token: u32) -> Result<()> {
        self.buffers.pipe(self.position_pipe_index).as_f32_mut()[0] = position as f32;
        self.buffers.pipe(self.token_pipe_index).as_f32_mut()[0] = token as f32;
        self.executor.forward()
    }
}
