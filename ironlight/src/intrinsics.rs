/*
 * Copyright 2024 Fluence Labs Limited
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Integer and floating point helpers shared by the superscalar programs and the VM.
//!
//! Floating point operations are computed in round-to-nearest and then corrected
//! with the exact rounding error, which gives IEEE-754 results for every rounding
//! mode without touching the FPU control register. VM operands always stay in the
//! normal range, so the error terms below are exact.

const MANTISSA_SIZE: u64 = 52;
const MANTISSA_MASK: u64 = (1 << MANTISSA_SIZE) - 1;
const EXPONENT_MASK: u64 = 0x7ff;
const EXPONENT_BIAS: u64 = 0x3ff;
const CONST_EXPONENT_BITS: u64 = 0x300;
const STATIC_EXPONENT_BITS: u64 = 4;
const DYNAMIC_EXPONENT_BITS: u64 = 4;

pub const DYNAMIC_MANTISSA_MASK: u64 = (1 << (MANTISSA_SIZE + DYNAMIC_EXPONENT_BITS)) - 1;
pub const SCALE_MASK: u64 = 0x80F0000000000000;

#[inline(always)]
pub fn mulh(a: u64, b: u64) -> u64 {
    ((a as u128 * b as u128) >> 64) as u64
}

#[inline(always)]
pub fn smulh(a: i64, b: i64) -> i64 {
    ((a as i128 * b as i128) >> 64) as i64
}

#[inline(always)]
pub fn sign_extend_2s_compl(x: u32) -> u64 {
    x as i32 as i64 as u64
}

#[inline(always)]
pub fn is_zero_or_power_of_2(x: u64) -> bool {
    x & x.wrapping_sub(1) == 0
}

/// Positive double in [1, 2^32) built from random bits.
#[inline(always)]
pub fn get_small_positive_float_bits(entropy: u64) -> u64 {
    let exponent = ((entropy >> 59) + EXPONENT_BIAS) & EXPONENT_MASK;
    (exponent << MANTISSA_SIZE) | (entropy & MANTISSA_MASK)
}

#[inline(always)]
pub fn get_static_exponent(entropy: u64) -> u64 {
    let mut exponent = CONST_EXPONENT_BITS;
    exponent |= (entropy >> (64 - STATIC_EXPONENT_BITS)) << DYNAMIC_EXPONENT_BITS;
    exponent << MANTISSA_SIZE
}

#[inline(always)]
pub fn get_float_mask(entropy: u64) -> u64 {
    const MASK_22BIT: u64 = (1u64 << 22) - 1;
    (entropy & MASK_22BIT) | get_static_exponent(entropy)
}

/// Keeps the low mantissa and exponent bits of `x` and forces the rest from `mask`.
#[inline(always)]
pub fn mask_register_exponent_mantissa(x: f64, mask: u64) -> f64 {
    f64::from_bits((x.to_bits() & DYNAMIC_MANTISSA_MASK) | mask)
}

/// IEEE-754 rounding directions selectable by `CFROUND`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum RoundingMode {
    #[default]
    Nearest,
    Down,
    Up,
    TowardZero,
}

impl RoundingMode {
    pub fn from_bits(bits: u64) -> Self {
        match bits & 3 {
            0 => RoundingMode::Nearest,
            1 => RoundingMode::Down,
            2 => RoundingMode::Up,
            _ => RoundingMode::TowardZero,
        }
    }
}

fn next_up(x: f64) -> f64 {
    if x.is_nan() || x == f64::INFINITY {
        return x;
    }
    if x == 0.0 {
        return f64::from_bits(1);
    }
    let bits = x.to_bits();
    if x > 0.0 {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}

fn next_down(x: f64) -> f64 {
    -next_up(-x)
}

/// Moves the round-to-nearest result one ulp when the exact value lies on the
/// other side of it. `error_sign` is the sign of `exact - nearest`.
#[inline(always)]
fn round_directed(nearest: f64, error_sign: f64, mode: RoundingMode) -> f64 {
    if error_sign == 0.0 || !nearest.is_finite() {
        return nearest;
    }

    match mode {
        RoundingMode::Nearest => nearest,
        RoundingMode::Down if error_sign < 0.0 => next_down(nearest),
        RoundingMode::Up if error_sign > 0.0 => next_up(nearest),
        RoundingMode::TowardZero if nearest > 0.0 && error_sign < 0.0 => next_down(nearest),
        RoundingMode::TowardZero if nearest < 0.0 && error_sign > 0.0 => next_up(nearest),
        _ => nearest,
    }
}

#[inline(always)]
pub fn add(a: f64, b: f64, mode: RoundingMode) -> f64 {
    let sum = a + b;
    if sum == 0.0 {
        // exact zero: only its sign depends on the rounding direction
        return if mode == RoundingMode::Down && !(a.to_bits() == 0 && b.to_bits() == 0) {
            -0.0
        } else {
            sum
        };
    }

    // TwoSum
    let b_virtual = sum - a;
    let a_virtual = sum - b_virtual;
    let error = (a - a_virtual) + (b - b_virtual);
    round_directed(sum, error, mode)
}

#[inline(always)]
pub fn sub(a: f64, b: f64, mode: RoundingMode) -> f64 {
    add(a, -b, mode)
}

#[inline(always)]
pub fn mul(a: f64, b: f64, mode: RoundingMode) -> f64 {
    let product = a * b;
    let error = a.mul_add(b, -product);
    round_directed(product, error, mode)
}

#[inline(always)]
pub fn div(a: f64, b: f64, mode: RoundingMode) -> f64 {
    let quotient = a / b;
    // a - q * b has the sign of (exact - q) * b
    let remainder = (-quotient).mul_add(b, a);
    let error_sign = if b < 0.0 { -remainder } else { remainder };
    round_directed(quotient, error_sign, mode)
}

#[inline(always)]
pub fn sqrt(a: f64, mode: RoundingMode) -> f64 {
    let root = a.sqrt();
    let remainder = (-root).mul_add(root, a);
    round_directed(root, remainder, mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODES: [RoundingMode; 4] = [
        RoundingMode::Nearest,
        RoundingMode::Down,
        RoundingMode::Up,
        RoundingMode::TowardZero,
    ];

    #[test]
    fn high_multiplications() {
        assert_eq!(mulh(u64::MAX, u64::MAX), u64::MAX - 1);
        assert_eq!(mulh(1 << 63, 4), 2);
        assert_eq!(smulh(-1, 1), -1);
        assert_eq!(smulh(i64::MIN, i64::MIN), 1 << 62);
        assert_eq!(smulh(i64::MIN, -1), 0);
    }

    #[test]
    fn sign_extension() {
        assert_eq!(sign_extend_2s_compl(0x7fffffff), 0x7fffffff);
        assert_eq!(sign_extend_2s_compl(0x80000000), 0xffffffff80000000);
        assert_eq!(sign_extend_2s_compl(0xffffffff), u64::MAX);
    }

    #[test]
    fn powers_of_two() {
        assert!(is_zero_or_power_of_2(0));
        assert!(is_zero_or_power_of_2(1));
        assert!(is_zero_or_power_of_2(1 << 31));
        assert!(!is_zero_or_power_of_2(3));
        assert!(!is_zero_or_power_of_2(0xffffffff));
    }

    #[test]
    fn small_positive_floats_are_in_range() {
        for entropy in [0u64, u64::MAX, 0x8000000000000000, 0x0123456789abcdef] {
            let value = f64::from_bits(get_small_positive_float_bits(entropy));
            assert!((1.0..4294967296.0).contains(&value), "{value}");
        }
    }

    #[test]
    fn float_mask_keeps_e_registers_positive_and_bounded() {
        for entropy in [0u64, u64::MAX, 0xdeadbeefcafebabe] {
            let mask = get_float_mask(entropy);
            for raw in [-2147483648.0f64, -1.0, 0.0, 1.0, 2147483647.0] {
                let value = mask_register_exponent_mantissa(raw, mask);
                assert!(value > 0.0 && value < 2.0, "{value}");
                assert!(value >= f64::from_bits(0x300 << 52));
            }
        }
    }

    #[test]
    fn exact_results_ignore_rounding_mode() {
        for mode in MODES {
            assert_eq!(add(1.5, 2.25, mode), 3.75);
            assert_eq!(mul(3.0, 0.5, mode), 1.5);
            assert_eq!(div(1.0, 4.0, mode), 0.25);
            assert_eq!(sqrt(16.0, mode), 4.0);
        }
    }

    #[test]
    fn directed_addition() {
        let tiny = f64::EPSILON / 4.0;
        assert_eq!(add(1.0, tiny, RoundingMode::Nearest), 1.0);
        assert_eq!(add(1.0, tiny, RoundingMode::Down), 1.0);
        assert_eq!(add(1.0, tiny, RoundingMode::TowardZero), 1.0);
        assert_eq!(add(1.0, tiny, RoundingMode::Up), 1.0 + f64::EPSILON);

        assert_eq!(add(-1.0, -tiny, RoundingMode::Down), -1.0 - f64::EPSILON);
        assert_eq!(add(-1.0, -tiny, RoundingMode::Up), -1.0);
        assert_eq!(add(-1.0, -tiny, RoundingMode::TowardZero), -1.0);
        assert_eq!(sub(1.0, tiny, RoundingMode::Down), 1.0 - f64::EPSILON / 2.0);
    }

    #[test]
    fn exact_zero_sign() {
        assert!(add(1.0, -1.0, RoundingMode::Nearest).is_sign_positive());
        assert!(add(1.0, -1.0, RoundingMode::Up).is_sign_positive());
        assert!(add(1.0, -1.0, RoundingMode::Down).is_sign_negative());
        assert!(add(0.0, 0.0, RoundingMode::Down).is_sign_positive());
        assert!(add(-0.0, -0.0, RoundingMode::Up).is_sign_negative());
        assert!(sub(2.0, 2.0, RoundingMode::Down).is_sign_negative());
    }

    #[test]
    fn directed_multiplication_and_division() {
        let third_down = div(1.0, 3.0, RoundingMode::Down);
        let third_up = div(1.0, 3.0, RoundingMode::Up);
        assert_eq!(next_up(third_down), third_up);
        assert_eq!(div(1.0, 3.0, RoundingMode::TowardZero), third_down);
        assert_eq!(div(-1.0, 3.0, RoundingMode::TowardZero), -third_down);
        assert_eq!(div(-1.0, 3.0, RoundingMode::Down), -third_up);

        let a = 1.0 + f64::EPSILON;
        // (1 + e)^2 = 1 + 2e + e^2, the e^2 part is lost in nearest mode
        assert_eq!(mul(a, a, RoundingMode::Nearest), 1.0 + 2.0 * f64::EPSILON);
        assert_eq!(mul(a, a, RoundingMode::Up), 1.0 + 3.0 * f64::EPSILON);
        assert_eq!(mul(a, a, RoundingMode::Down), 1.0 + 2.0 * f64::EPSILON);
    }

    #[test]
    fn directed_square_root() {
        let down = sqrt(2.0, RoundingMode::Down);
        let up = sqrt(2.0, RoundingMode::Up);
        assert_eq!(next_up(down), up);
        assert!(mul(down, down, RoundingMode::Up) <= 2.0);
        assert!(mul(up, up, RoundingMode::Down) >= 2.0);
        assert_eq!(sqrt(2.0, RoundingMode::TowardZero), down);
    }

    #[test]
    fn directed_results_bracket_the_nearest_one() {
        use rand::Rng;
        use rand::SeedableRng;

        let mut rng = rand::rngs::StdRng::seed_from_u64(0x1e);
        let mut random_operand = || {
            let sign = if rng.gen::<bool>() { -1.0 } else { 1.0 };
            sign * rng.gen_range(1.0..2.0) * 2f64.powi(rng.gen_range(-40..40))
        };

        for _ in 0..10_000 {
            let (a, b) = (random_operand(), random_operand());
            let operations: [fn(f64, f64, RoundingMode) -> f64; 4] =
                [add, sub, mul, div];

            for operation in operations {
                let nearest = operation(a, b, RoundingMode::Nearest);
                let down = operation(a, b, RoundingMode::Down);
                let up = operation(a, b, RoundingMode::Up);
                let toward_zero = operation(a, b, RoundingMode::TowardZero);

                assert!(down <= nearest && nearest <= up, "{a} {b}");
                assert!(up == down || next_up(down) == up, "{a} {b}");
                let expected = if nearest > 0.0 { down } else { up };
                assert_eq!(toward_zero, expected, "{a} {b}");
            }
        }
    }

    #[test]
    fn rounding_mode_from_low_bits() {
        assert_eq!(RoundingMode::from_bits(0), RoundingMode::Nearest);
        assert_eq!(RoundingMode::from_bits(5), RoundingMode::Down);
        assert_eq!(RoundingMode::from_bits(6), RoundingMode::Up);
        assert_eq!(RoundingMode::from_bits(u64::MAX), RoundingMode::TowardZero);
    }
}
