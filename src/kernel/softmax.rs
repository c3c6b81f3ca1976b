//! Numerically stable softmax (§4.2).

/// Softmax `x[0..n)` in place. `n == 0` is a no-op. If the denominator
/// would be zero (can only happen if every entry is `-inf`), it is
/// replaced with `1e-6` rather than dividing by zero.
pub fn softmax(x: &mut [f32], n: usize) {
    if n == 0 {
        return;
    }
    let max = x[..n].iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for v in x[..n].iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    if sum == 0.0 {
        sum = 1e-6;
    }
    for v in x[..n].iter_mut() {
        *v /= sum;
    }
}
