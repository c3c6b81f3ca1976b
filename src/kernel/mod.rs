//! Numeric kernels (§4.2): the only place any SIMD tiering would live.
//! Every kernel here is the portable scalar reference the spec requires
//! to exist regardless of SIMD tier; kernel signatures are shaped so a
//! `target_arch`-gated tier could be slotted in later without changing
//! call sites (§9 design notes).

pub mod activation;
pub mod attention;
pub mod embedding;
pub mod matmul;
pub mod merge;
pub mod norm;
pub mod rope;
pub mod select;
pub mod sgemm;
pub mod shift;
pub mod softmax;

/// Split a range of length `len` across `n_threads` so that, if
/// `len % n_threads == r`, the first `r` threads take
/// `floor(len/n_threads)+1` elements and the rest take the floor value
/// (§4.2). Returns `[start, end)` for `thread_index`.
pub fn split_range(len: usize, n_threads: usize, thread_index: usize) -> (usize, usize) {
    assert!(n_threads > 0);
    assert!(thread_index < n_threads);
    let base = len / n_threads;
    let remainder = len % n_threads;
    let start = thread_index * base + thread_index.min(remainder);
    let extra = if thread_index < remainder { 1 } else { 0 };
    let end = start + base + extra;
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_range_covers_everything_once_and_front_loads_remainder() {
        for len in 0..40usize {
            for n_threads in 1..=8usize {
                let mut covered = vec![false; len];
                let mut sizes = Vec::new();
                for t in 0..n_threads {
                    let (s, e) = split_range(len, n_threads, t);
                    sizes.push(e - s);
                    for c in &mut covered[s..e] {
                        assert!(!*c);
                        *c = true;
                    }
                }
                assert!(covered.iter().all(|&c| c));
                // first r threads get one more than the rest
                for w in sizes.windows(2) {
                    assert!(w[0] >= w[1]);
                    assert!(w[0] - w[1] <= 1);
                }
            }
        }
    }
}
