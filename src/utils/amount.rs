//! Human-decimal ↔ atomic-unit conversion.
//!
//! Ledgers record token amounts as integers scaled by `10^decimals`. The
//! integer path never touches floating point so precision holds up to 18
//! decimals.

use crate::error::SwapError;

/// Largest decimal precision supported by SPL-style mints.
pub const MAX_DECIMALS: u8 = 18;

/// Parse a human-readable decimal string into atomic units.
///
/// The fractional part is truncated (not rounded) to `decimals` digits,
/// matching ledger semantics. Negative, empty, non-numeric or overflowing
/// input is rejected with [`SwapError::InvalidAmount`].
pub fn to_atomic(human: &str, decimals: u8) -> Result<u64, SwapError> {
    if decimals > MAX_DECIMALS {
        return Err(SwapError::InvalidAmount(format!(
            "unsupported decimal precision {decimals}"
        )));
    }

    let trimmed = human.trim();
    if trimmed.is_empty() {
        return Err(SwapError::InvalidAmount("empty amount".to_string()));
    }
    if trimmed.starts_with('-') {
        return Err(SwapError::InvalidAmount(format!("negative amount: {trimmed}")));
    }

    let (whole, frac) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(SwapError::InvalidAmount(format!("not a number: {trimmed}")));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(SwapError::InvalidAmount(format!("not a number: {trimmed}")));
    }

    let scale = 10u128.pow(decimals as u32);

    let whole_part: u128 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| SwapError::InvalidAmount(format!("amount too large: {trimmed}")))?
    };

    // Truncate the fraction to the mint's precision, then right-pad so the
    // digits line up with 10^decimals.
    let truncated: String = frac.chars().take(decimals as usize).collect();
    let frac_part: u128 = if truncated.is_empty() {
        0
    } else {
        let padded = format!("{truncated:0<width$}", width = decimals as usize);
        padded
            .parse()
            .map_err(|_| SwapError::InvalidAmount(format!("not a number: {trimmed}")))?
    };

    let atomic = whole_part
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_part))
        .ok_or_else(|| SwapError::InvalidAmount(format!("amount too large: {trimmed}")))?;

    u64::try_from(atomic)
        .map_err(|_| SwapError::InvalidAmount(format!("amount too large: {trimmed}")))
}

/// Render atomic units as a human-readable decimal string.
///
/// Exact integer division; trailing zeros in the fraction are trimmed and
/// whole values render without a decimal point.
pub fn to_human(atomic: u64, decimals: u8) -> String {
    if decimals == 0 {
        return atomic.to_string();
    }

    let scale = 10u128.pow(decimals as u32);
    let value = atomic as u128;
    let whole = value / scale;
    let frac = value % scale;

    if frac == 0 {
        return whole.to_string();
    }

    let frac_str = format!("{frac:0>width$}", width = decimals as usize);
    let frac_str = frac_str.trim_end_matches('0');
    format!("{whole}.{frac_str}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_one_point_five_with_nine_decimals() {
        assert_eq!(to_atomic("1.5", 9).unwrap(), 1_500_000_000);
        assert_eq!(to_human(1_500_000_000, 9), "1.5");
    }

    #[test]
    fn truncates_excess_fraction_digits() {
        // 9-decimal mint: the tenth fractional digit is dropped, not rounded.
        assert_eq!(to_atomic("1.1234567899", 9).unwrap(), 1_123_456_789);
        assert_eq!(to_atomic("0.9999999999", 9).unwrap(), 999_999_999);
    }

    #[test]
    fn zero_decimals_passes_through() {
        assert_eq!(to_atomic("42", 0).unwrap(), 42);
        assert_eq!(to_atomic("42.9", 0).unwrap(), 42);
        assert_eq!(to_human(42, 0), "42");
    }

    #[test]
    fn handles_eighteen_decimals_without_precision_loss() {
        assert_eq!(
            to_atomic("1.000000000000000001", 18).unwrap(),
            1_000_000_000_000_000_001
        );
        assert_eq!(to_human(1_000_000_000_000_000_001, 18), "1.000000000000000001");
    }

    #[test]
    fn accepts_bare_fraction_and_trailing_dot() {
        assert_eq!(to_atomic(".5", 9).unwrap(), 500_000_000);
        assert_eq!(to_atomic("5.", 9).unwrap(), 5_000_000_000);
    }

    #[test]
    fn rejects_bad_input() {
        for bad in ["", " ", "-1", "1.2.3", "abc", "1e9", ".", "1,5"] {
            assert!(
                matches!(to_atomic(bad, 9), Err(SwapError::InvalidAmount(_))),
                "expected InvalidAmount for {bad:?}"
            );
        }
    }

    #[test]
    fn rejects_overflow() {
        // u64::MAX lamports is ~18.4e9 SOL; one more digit overflows.
        assert!(to_atomic("18446744073.709551615", 9).is_ok());
        assert!(to_atomic("18446744073.709551616", 9).is_err());
        assert!(to_atomic("99999999999999999999", 9).is_err());
    }

    #[test]
    fn round_trips_representable_values() {
        let cases = [
            ("0.000000001", 9),
            ("123.456", 6),
            ("1000000", 2),
            ("0.1", 1),
            ("7", 18),
        ];
        for (human, decimals) in cases {
            let atomic = to_atomic(human, decimals).unwrap();
            assert_eq!(to_human(atomic, decimals), human, "round trip for {human}");
        }
    }

    #[test]
    fn trims_trailing_fraction_zeros() {
        assert_eq!(to_human(1_500_000_000, 9), "1.5");
        assert_eq!(to_human(1_000_000_000, 9), "1");
        assert_eq!(to_human(1_050_000_000, 9), "1.05");
    }
}
