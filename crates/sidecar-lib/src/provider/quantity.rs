//! Kubernetes resource quantity parsing
//!
//! Quantities are parsed into an exact rational value so unit conversion
//! rounds the same way the API server does: CPU rounds up to the next
//! millicore, memory rounds up to the next byte and is then truncated to MiB.

use crate::error::ProviderError;

pub const BYTES_PER_MIB: i64 = 1024 * 1024;

/// Largest decimal exponent accepted; keeps every value inside `i128`
const MAX_EXPONENT: i32 = 30;

/// Exact value `num / den` with `den > 0`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantity {
    num: i128,
    den: i128,
}

impl Quantity {
    /// `ceil(value * factor)` as an `i64`
    fn ceil_scaled(&self, factor: i128) -> Option<i64> {
        let n = self.num.checked_mul(factor)?;
        let q = if n >= 0 {
            (n + self.den - 1) / self.den
        } else {
            n / self.den
        };
        i64::try_from(q).ok()
    }
}

/// Parse a quantity such as `250m`, `1.5`, `12345n`, `512Mi`, `1G` or `1e3`
pub fn parse(input: &str) -> Result<Quantity, ProviderError> {
    let invalid = || ProviderError::Quantity(input.to_string());
    let s = input.trim();

    let sign_len = usize::from(s.starts_with(['+', '-']));
    let number_end = s[sign_len..]
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .map_or(s.len(), |i| i + sign_len);
    let (number, suffix) = s.split_at(number_end);

    let (binary, suffix_exp): (i128, i32) = match suffix {
        "" => (1, 0),
        "Ki" => (1 << 10, 0),
        "Mi" => (1 << 20, 0),
        "Gi" => (1 << 30, 0),
        "Ti" => (1 << 40, 0),
        "Pi" => (1 << 50, 0),
        "Ei" => (1 << 60, 0),
        "n" => (1, -9),
        "u" => (1, -6),
        "m" => (1, -3),
        "k" => (1, 3),
        "M" => (1, 6),
        "G" => (1, 9),
        "T" => (1, 12),
        "P" => (1, 15),
        "E" => (1, 18),
        other => match other.strip_prefix(['e', 'E']) {
            Some(exp) => {
                let exp: i32 = exp.parse().map_err(|_| invalid())?;
                if exp.unsigned_abs() > MAX_EXPONENT.unsigned_abs() {
                    return Err(invalid());
                }
                (1, exp)
            }
            None => return Err(invalid()),
        },
    };

    let negative = number.starts_with('-');
    let digits = &number[sign_len..];
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid());
    }
    if int_part.len() + frac_part.len() > MAX_EXPONENT as usize {
        return Err(invalid());
    }

    let mut mantissa: i128 = 0;
    for c in int_part.chars().chain(frac_part.chars()) {
        let d = c.to_digit(10).ok_or_else(invalid)?;
        mantissa = mantissa * 10 + i128::from(d);
    }
    if negative {
        mantissa = -mantissa;
    }

    // Both terms are bounded by MAX_EXPONENT here
    let exp10 = i64::from(suffix_exp) - frac_part.len() as i64;
    if exp10.unsigned_abs() > u64::from(MAX_EXPONENT.unsigned_abs()) {
        return Err(invalid());
    }
    let pow = 10i128.pow(exp10.unsigned_abs() as u32);

    let (num, den) = if exp10 >= 0 {
        (mantissa.checked_mul(pow), 1)
    } else {
        (Some(mantissa), pow)
    };
    let num = num.and_then(|n| n.checked_mul(binary)).ok_or_else(invalid)?;

    Ok(Quantity { num, den })
}

/// CPU quantity in millicores, rounded up
pub fn cpu_millicores(input: &str) -> Result<i64, ProviderError> {
    parse(input)?
        .ceil_scaled(1000)
        .ok_or_else(|| ProviderError::Quantity(input.to_string()))
}

/// Memory quantity in whole MiB
pub fn memory_mb(input: &str) -> Result<i64, ProviderError> {
    let bytes = parse(input)?
        .ceil_scaled(1)
        .ok_or_else(|| ProviderError::Quantity(input.to_string()))?;
    Ok(bytes / BYTES_PER_MIB)
}
