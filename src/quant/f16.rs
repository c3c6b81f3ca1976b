//! f16 <-> f32 conversion: a table-driven path and a direct bit-shuffle path.
//!
//! Both paths must agree for every finite f32 value (§4.1). The table is
//! built once behind a `OnceLock` and treated as read-only process-wide
//! state (§9 "Global mutable state").

use std::sync::OnceLock;

/// IEEE 754 half-precision value, stored as its raw bit pattern.
pub type F16 = u16;

/// Bit-by-bit reference conversion (subnormal half values normalized via
/// an explicit shift loop). Used only to build the LUT, so the LUT and
/// the direct path below are two independent algorithms that must agree.
fn convert_f16_to_f32_reference(value: F16) -> f32 {
    let sign = (value & 0x8000) as u32;
    let exp = (value & 0x7C00) >> 10;
    let mant = (value & 0x03FF) as u32;

    let bits: u32 = if exp == 0 {
        if mant == 0 {
            sign << 16
        } else {
            // subnormal half -> normalized f32
            let mut e = -1i32;
            let mut m = mant;
            loop {
                m <<= 1;
                e -= 1;
                if m & 0x0400 != 0 {
                    break;
                }
            }
            m &= 0x03FF;
            let f32_exp = (127 - 15 + 1 + e) as u32;
            (sign << 16) | (f32_exp << 23) | (m << 13)
        }
    } else if exp == 0x1F {
        (sign << 16) | 0x7F80_0000 | (mant << 13)
    } else {
        let f32_exp = exp as u32 + (127 - 15);
        (sign << 16) | (f32_exp << 23) | (mant << 13)
    };

    f32::from_bits(bits)
}

/// Branchless magic-number-multiply conversion (the non-NEON path the
/// original engine uses): shift the mantissa/exponent bits into an f32
/// slot, let float multiplication do the exponent rebias, then patch in
/// the sign and the inf/NaN exponent pattern.
fn convert_f16_to_f32_magic(value: F16) -> f32 {
    const MAGIC_BITS: u32 = (254u32 - 15) << 23;
    const INF_NAN_BITS: u32 = (127u32 + 16) << 23;
    let magic = f32::from_bits(MAGIC_BITS);
    let inf_nan = f32::from_bits(INF_NAN_BITS);

    let mut bits = (value as u32 & 0x7FFF) << 13;
    let scaled = f32::from_bits(bits) * magic;
    bits = scaled.to_bits();
    if scaled >= inf_nan {
        bits |= 255u32 << 23;
    }
    bits |= (value as u32 & 0x8000) << 16;
    f32::from_bits(bits)
}

fn convert_f32_to_f16_direct(x: f32) -> F16 {
    let i = x.to_bits() as i32;
    let s = (i >> 16) & 0x0000_8000;
    let mut e = ((i >> 23) & 0x0000_00ff) - (127 - 15);
    let mut m = i & 0x007f_ffff;

    if e <= 0 {
        if e < -10 {
            return s as F16;
        }
        m |= 0x0080_0000;
        let t = 14 - e;
        let a = (1 << (t - 1)) - 1;
        let b = (m >> t) & 1;
        m = (m + a + b) >> t;
        return (s | m) as F16;
    }
    if e == 0xff - (127 - 15) {
        if m == 0 {
            return (s | 0x7c00) as F16;
        }
        m >>= 13;
        return (s | 0x7c00 | m | ((m == 0) as i32)) as F16;
    }
    m += 0x0000_0fff + ((m >> 13) & 1);
    if m & 0x0080_0000 != 0 {
        m = 0;
        e += 1;
    }
    debug_assert!(e <= 30);
    (s | (e << 10) | (m >> 13)) as F16
}

struct F16Lut {
    to_f32: Vec<f32>,
}

static F16_LUT: OnceLock<F16Lut> = OnceLock::new();

fn lut() -> &'static F16Lut {
    F16_LUT.get_or_init(|| {
        let mut to_f32 = vec![0.0f32; 65536];
        for (v, slot) in to_f32.iter_mut().enumerate() {
            *slot = convert_f16_to_f32_reference(v as F16);
        }
        F16Lut { to_f32 }
    })
}

/// Table-driven f16 -> f32.
#[inline]
pub fn f16_to_f32_lut(value: F16) -> f32 {
    lut().to_f32[value as usize]
}

/// Direct bit-shuffle f16 -> f32. Must equal `f16_to_f32_lut` for every
/// finite input.
#[inline]
pub fn f16_to_f32(value: F16) -> f32 {
    convert_f16_to_f32_magic(value)
}

/// f32 -> f16, round-to-nearest-even as in the source implementation.
#[inline]
pub fn f32_to_f16(value: f32) -> F16 {
    convert_f32_to_f16_direct(value)
}

/// Force the LUT to materialize (called once during process init).
pub fn init_lut() {
    lut();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lut_matches_direct_path() {
        init_lut();
        for v in 0u32..=0xFFFF {
            let h = v as F16;
            let a = f16_to_f32_lut(h);
            let b = f16_to_f32(h);
            if a.is_finite() {
                assert_eq!(a.to_bits(), b.to_bits(), "mismatch at 0x{:04x}", h);
            }
        }
    }

    #[test]
    fn round_trip_is_idempotent() {
        for bits in [0.0f32, 1.0, -1.0, 0.5, 3.14159, -100.25, 65504.0, 1e-5] {
            let h = f32_to_f16(bits);
            let back = f16_to_f32(h);
            let h2 = f32_to_f16(back);
            assert_eq!(h, h2);
        }
    }

    #[test]
    fn zero_round_trips_exactly() {
        assert_eq!(f16_to_f32(f32_to_f16(0.0)), 0.0);
        assert_eq!(f16_to_f32(f32_to_f16(-0.0)).to_bits(), (-0.0f32).to_bits());
    }
}
