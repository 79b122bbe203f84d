//! Integer arithmetic used by the statistics path
//!
//! Both helpers are pure and allocation-free so they can run inside the
//! firing context. No floating point is involved anywhere.

/// Truncating signed division (rounds toward zero) for any sign combination.
///
/// The quotient is computed on the absolute values and the sign is restored
/// from `sign(n) XOR sign(d)`. `d` must not be zero.
///
/// `i64::MIN / -1` saturates to `i64::MAX`.
pub fn signed_div(n: i64, d: i64) -> i64 {
    debug_assert!(d != 0, "signed_div called with a zero divisor");

    let quotient = n.unsigned_abs() / d.unsigned_abs();
    let negative = (n < 0) != (d < 0);

    if negative {
        // 2^63 casts to i64::MIN, which is already the correct negative result
        (quotient as i64).wrapping_neg()
    } else {
        i64::try_from(quotient).unwrap_or(i64::MAX)
    }
}

/// Integer square root rounded to the nearest integer.
///
/// Binary digit-by-digit method: start at the highest power of four not
/// above `x` and refine one result bit per step. The remainder left over
/// decides rounding: `x - r^2 > r` means `sqrt(x) >= r + 0.5`.
pub fn isqrt_rounded(x: u64) -> u64 {
    let mut remainder = x;
    let mut root = 0u64;
    let mut bit = 1u64 << 62;

    while bit > remainder {
        bit >>= 2;
    }

    while bit != 0 {
        if remainder >= root + bit {
            remainder -= root + bit;
            root = (root >> 1) + bit;
        } else {
            root >>= 1;
        }
        bit >>= 2;
    }

    if remainder > root {
        root + 1
    } else {
        root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_div_sign_combinations() {
        assert_eq!(signed_div(7, 2), 3);
        assert_eq!(signed_div(-7, 2), -3);
        assert_eq!(signed_div(7, -2), -3);
        assert_eq!(signed_div(-7, -2), 3);
        assert_eq!(signed_div(0, -5), 0);
    }

    #[test]
    fn test_signed_div_extremes() {
        assert_eq!(signed_div(i64::MIN, 1), i64::MIN);
        assert_eq!(signed_div(i64::MIN, -1), i64::MAX);
        assert_eq!(signed_div(i64::MAX, -1), -i64::MAX);
        assert_eq!(signed_div(i64::MIN, i64::MIN), 1);
    }

    #[test]
    fn test_isqrt_rounded_small_values() {
        let expected = [(0, 0), (1, 1), (2, 1), (3, 2), (4, 2), (6, 2), (7, 3), (8, 3), (9, 3)];
        for (x, root) in expected {
            assert_eq!(isqrt_rounded(x), root, "isqrt_rounded({})", x);
        }
    }

    #[test]
    fn test_isqrt_rounded_matches_float_reference() {
        for x in 0u64..=10_000 {
            let reference = (x as f64).sqrt().round() as u64;
            assert_eq!(isqrt_rounded(x), reference, "isqrt_rounded({})", x);
        }
    }

    #[test]
    fn test_isqrt_rounded_max_input() {
        // floor(sqrt(2^64 - 1)) = 2^32 - 1, remainder exceeds it so the result rounds up
        assert_eq!(isqrt_rounded(u64::MAX), 1u64 << 32);
    }
}
