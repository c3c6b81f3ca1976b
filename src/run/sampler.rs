//! Temperature/top-p sampler (§9 "topp strictly in (0,1) selects
//! nucleus sampling, otherwise plain multinomial over the softmax'd
//! logits"; `temperature == 0.0` is greedy argmax).

use crate::run::Sampler as SamplerTrait;

/// xorshift* RNG, the same generator and constants the reference
/// sampler uses to turn a seed into a reproducible token stream.
struct XorShiftRng {
    state: u64,
}

impl XorShiftRng {
    fn new(seed: u64) -> Self {
        Self { state: if seed == 0 { 1 } else { seed } }
    }

    fn next_u32(&mut self) -> u32 {
        self.state ^= self.state >> 12;
        self.state ^= self.state << 25;
        self.state ^= self.state >> 27;
        (self.state.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 32) as u32
    }

    /// Random f32 in [0, 1).
    fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / 16_777_216.0
    }
}

pub struct TemperatureSampler {
    temperature: f32,
    topp: f32,
    rng: XorShiftRng,
}

impl TemperatureSampler {
    pub fn new(temperature: f32, topp: f32, seed: u64) -> Self {
        Self { temperature, topp, rng: XorShiftRng::new(seed) }
    }

    fn sample_argmax(logits: &[f32]) -> u32 {
        logits
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i as u32)
            .unwrap_or(0)
    }

    fn sample_mult(probs: &[f32], coin: f32) -> u32 {
        let mut cdf = 0.0;
        for (i, p) in probs.iter().enumerate() {
            cdf += p;
            if coin < cdf {
                return i as u32;
            }
        }
        (probs.len() - 1) as u32
    }

    /// Nucleus sampling: restrict to the smallest prefix (by
    /// descending probability) whose cumulative mass exceeds `topp`,
    /// then sample from that truncated, renormalized distribution.
    fn sample_topp(probs: &[f32], topp: f32, coin: f32) -> u32 {
        let n = probs.len();
        let cutoff = (1.0 - topp) / (n as f32 - 1.0).max(1.0);
        let mut candidates: Vec<(usize, f32)> = probs.iter().enumerate().filter(|(_, &p)| p >= cutoff).map(|(i, &p)| (i, p)).collect();
        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut cumulative = 0.0;
        let mut last_idx = candidates.len().saturating_sub(1);
        for (i, (_, p)) in candidates.iter().enumerate() {
            cumulative += p;
            if cumulative > topp {
                last_idx = i;
                break;
            }
        }

        let r = coin * cumulative;
        let mut cdf = 0.0;
        for (idx, p) in candidates.iter().take(last_idx + 1) {
            cdf += p;
            if r < cdf {
                return *idx as u32;
            }
        }
        candidates[last_idx].0 as u32
    }
}

fn softmax(logits: &mut [f32]) {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for x in logits.iter_mut() {
        *x = (*x - max).exp();
        sum += *x;
    }
    for x in logits.iter_mut() {
        *x /= sum;
    }
}

impl SamplerTrait for TemperatureSampler {
    fn sample(&mut self, logits: &mut [f32]) -> u32 {
        if self.temperature == 0.0 {
            return Self::sample_argmax(logits);
        }
        for x in logits.iter_mut() {
            *x /= self.temperature;
        }
        softmax(logits);
        let coin = self.rng.next_f32();
        if self.topp <= 0.0 || self.topp >= 1.0 {
            Self::sample_mult(logits, coin)
        } else {
            Self::sample_topp(logits, self.topp, coin)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_temperature_is_deterministic_argmax() {
        let mut sampler = TemperatureSampler::new(0.0, 0.9, 42);
        let mut logits = vec![0.1, 5.0, 0.2, -1.0];
        assert_eq!(sampler.sample(&mut logits), 1);
    }

    #[test]
    fn nonzero_temperature_is_reproducible_given_the_same_seed() {
        let mut a = TemperatureSampler::new(0.8, 0.9, 7);
        let mut b = TemperatureSampler::new(0.8, 0.9, 7);
        let logits = vec![1.0, 2.0, 0.5, 3.0, 0.1];
        let mut la = logits.clone();
        let mut lb = logits.clone();
        assert_eq!(a.sample(&mut la), b.sample(&mut lb));
    }

    #[test]
    fn topp_outside_unit_interval_falls_back_to_multinomial() {
        let mut sampler = TemperatureSampler::new(1.0, 1.0, 1);
        let mut logits = vec![1.0, 1.0, 1.0, 1.0];
        let token = sampler.sample(&mut logits);
        assert!((token as usize) < 4);
    }

    #[test]
    fn xorshift_rng_produces_values_in_unit_interval() {
        let mut rng = XorShiftRng::new(123);
        for _ in 0..100 {
            let v = rng.next_f32();
            assert!((0.0..1.0).contains(&v));
        }
    }
}
