// humanizer.rs
use thiserror::Error;

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
const UNIT: u64 = 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HumanizeError {
    #[error("byte count must not be negative, got {0}")]
    InvalidArgument(i64),
    #[error("byte count {0} is too large to humanize (limit is 1 PB)")]
    OutOfRange(u64),
}

/// Formats a byte count with binary units, e.g. `1536` -> `"1.5 KB"`.
///
/// The value keeps at most two decimals (rounded half away from zero) and
/// drops trailing zeros. Negative counts and counts of 1 PB or more are
/// rejected.
pub fn humanize(length: i64) -> Result<String, HumanizeError> {
    if length < 0 {
        return Err(HumanizeError::InvalidArgument(length));
    }
    if length == 0 {
        return Ok("0 B".to_string());
    }

    let length = length as u64;
    let mut magnitude = 0;
    let mut divisor = 1u64;
    while length / divisor >= UNIT {
        magnitude += 1;
        divisor *= UNIT;
    }
    let unit = UNITS
        .get(magnitude)
        .ok_or(HumanizeError::OutOfRange(length))?;

    Ok(format!("{} {}", format_scaled(length, divisor), unit))
}

/// Same as [`humanize`] for lengths reported by the file system.
pub fn humanize_len(length: u64) -> Result<String, HumanizeError> {
    i64::try_from(length)
        .map_err(|_| HumanizeError::OutOfRange(length))
        .and_then(humanize)
}

// `length / divisor` with up to two decimals, no trailing zeros.
fn format_scaled(length: u64, divisor: u64) -> String {
    let hundredths = (length as u128 * 200 + divisor as u128) / (divisor as u128 * 2);
    let whole = hundredths / 100;
    let fraction = hundredths % 100;

    match fraction {
        0 => whole.to_string(),
        f if f % 10 == 0 => format!("{}.{}", whole, f / 10),
        f => format!("{}.{:02}", whole, f),
    }
}
