//! One-time passcode generation.

use rand::{rngs::OsRng, Rng};

/// Default number of digits in a generated passcode.
pub const DEFAULT_OTP_LENGTH: u32 = 6;

// u64 holds at most 19 decimal digits; the CLI already caps the
// configurable length well below this.
const MAX_OTP_LENGTH: u32 = 18;

/// Generate a numeric passcode of exactly `length` digits, left-zero-padded,
/// uniform over `[0, 10^length)`.
///
/// The value is drawn from the operating system CSPRNG; no time- or
/// counter-derived seeding is involved.
#[must_use]
pub fn generate(length: u32) -> String {
    let length = length.clamp(1, MAX_OTP_LENGTH);
    let upper = 10u64.pow(length);
    let value = OsRng.gen_range(0..upper);
    format!("{value:0width$}", width = length as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn codes_are_fixed_length_digits_within_range() {
        for _ in 0..10_000 {
            let code = generate(DEFAULT_OTP_LENGTH);
            assert_eq!(code.len(), 6);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
            let value: u64 = code.parse().unwrap();
            assert!(value < 1_000_000);
        }
    }

    #[test]
    fn leading_zeros_are_preserved() {
        // With 10k draws of 6 digits, codes below 100000 are all but certain;
        // any of them would be truncated if padding were missing.
        let saw_leading_zero = (0..10_000)
            .map(|_| generate(6))
            .any(|code| code.starts_with('0'));
        assert!(saw_leading_zero);
    }

    #[test]
    fn codes_spread_across_the_range() {
        let mut leading: HashSet<u8> = HashSet::new();
        for _ in 0..10_000 {
            leading.insert(generate(6).as_bytes()[0]);
        }
        // All ten leading digits should appear; each has p ~ 1/10 per draw.
        assert_eq!(leading.len(), 10);
    }

    #[test]
    fn honors_configured_length() {
        for length in [4, 5, 6, 8, 10] {
            let code = generate(length);
            assert_eq!(code.len(), length as usize);
        }
    }
}
