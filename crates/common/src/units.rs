//! Human-readable byte-size and duration parsing for configuration values.
//!
//! Grounded on the original collaborator's `read_memory_with_mul` /
//! `read_time_with_mul` (`config.c`): a leading decimal run followed by an
//! optional unit suffix. We additionally provide the inverse formatting
//! used by the `INFO` config echo, mirroring `memory_to_string` /
//! `time_to_string`.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum UnitParseError {
    #[error("'{0}' has no leading digits")]
    NoDigits(String),
    #[error("unrecognised unit suffix '{0}'")]
    BadSuffix(String),
}

/// Parses a memory size with an optional `kb`/`mb`/`gb` suffix (case
/// insensitive). A bare number is bytes.
pub fn parse_memory(s: &str) -> Result<u64, UnitParseError> {
    let (num, suffix) = split_digits(s)?;
    let mul: u64 = match suffix.to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "kb" => 1024,
        "mb" => 1024 * 1024,
        "gb" => 1024 * 1024 * 1024,
        other => return Err(UnitParseError::BadSuffix(other.to_string())),
    };
    Ok(num * mul)
}

/// Parses a duration with an optional `m` (minutes) or `d` (days) suffix.
/// A bare number is seconds, matching the original's `switch (*time_string)`
/// default case.
pub fn parse_duration(s: &str) -> Result<Duration, UnitParseError> {
    let (num, suffix) = split_digits(s)?;
    let mul: u64 = match suffix.to_ascii_lowercase().as_str() {
        "" | "s" => 1,
        "m" => 60,
        "d" => 60 * 60 * 24,
        other => return Err(UnitParseError::BadSuffix(other.to_string())),
    };
    Ok(Duration::from_secs(num * mul))
}

fn split_digits(s: &str) -> Result<(u64, &str), UnitParseError> {
    let s = s.trim();
    let digit_len = s.chars().take_while(|c| c.is_ascii_digit()).count();
    if digit_len == 0 {
        return Err(UnitParseError::NoDigits(s.to_string()));
    }
    let num: u64 = s[..digit_len]
        .parse()
        .map_err(|_| UnitParseError::NoDigits(s.to_string()))?;
    Ok((num, &s[digit_len..]))
}

/// Formats a byte count the way `memory_to_string` does: the largest unit
/// under which the value is still `>= 1`.
pub fn format_memory(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes < KB {
        format!("{bytes}b")
    } else if bytes < MB {
        format!("{}Kb", bytes / KB)
    } else if bytes < GB {
        format!("{}Mb", bytes / MB)
    } else {
        format!("{}Gb", bytes / GB)
    }
}

/// Formats a duration the way `time_to_string` does.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 60 * 60 {
        format!("{}m", secs / 60)
    } else if secs < 60 * 60 * 24 {
        format!("{}h", secs / (60 * 60))
    } else {
        format!("{}d", secs / (60 * 60 * 24))
    }
}
