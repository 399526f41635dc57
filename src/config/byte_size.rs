use std::fmt;

use snafu::Snafu;

const DECIMAL_UNITS: [&str; 6] = ["B", "kB", "MB", "GB", "TB", "PB"];

/// A byte count, parsed from strings like `"512"`, `"20MB"` or `"1.5GiB"`.
///
/// SI suffixes (`KB`, `MB`, ...) use powers of 1000, IEC suffixes (`KiB`,
/// `MiB`, ...) powers of 1024.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub fn parse(value: &str) -> Result<Self, ByteSizeError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ByteSizeError::Empty);
        }

        let num_end = trimmed
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(trimmed.len());
        if num_end == 0 {
            return Err(ByteSizeError::NoNumber {
                value: trimmed.to_string(),
            });
        }

        let (number, suffix) = trimmed.split_at(num_end);
        let multiplier = multiplier(&suffix.trim().to_uppercase()).ok_or_else(|| {
            ByteSizeError::UnknownSuffix {
                value: trimmed.to_string(),
                suffix: suffix.trim().to_string(),
            }
        })?;

        if let Ok(whole) = number.parse::<u64>() {
            return Ok(ByteSize(whole.saturating_mul(multiplier)));
        }
        let fractional: f64 = number.parse().map_err(|_| ByteSizeError::NoNumber {
            value: trimmed.to_string(),
        })?;
        Ok(ByteSize((fractional * multiplier as f64).round() as u64))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

fn multiplier(suffix: &str) -> Option<u64> {
    let value = match suffix {
        "" | "B" => 1,
        "K" | "KB" => 1000,
        "KI" | "KIB" => 1 << 10,
        "M" | "MB" => 1000u64.pow(2),
        "MI" | "MIB" => 1 << 20,
        "G" | "GB" => 1000u64.pow(3),
        "GI" | "GIB" => 1 << 30,
        "T" | "TB" => 1000u64.pow(4),
        "TI" | "TIB" => 1 << 40,
        _ => return None,
    };
    Some(value)
}

/// Human-readable SI form: `"512 B"`, `"2.0 kB"`, `"15 MB"`.
impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 < 10 {
            return write!(f, "{} B", self.0);
        }
        let mut exponent = 0;
        let mut scaled = self.0;
        while scaled >= 1000 && exponent < DECIMAL_UNITS.len() - 1 {
            scaled /= 1000;
            exponent += 1;
        }
        let value = self.0 as f64 / 1000f64.powi(exponent as i32);
        let unit = DECIMAL_UNITS[exponent];
        if value < 10.0 {
            write!(f, "{value:.1} {unit}")
        } else {
            write!(f, "{value:.0} {unit}")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum ByteSizeError {
    #[snafu(display("Byte size is empty"))]
    Empty,
    #[snafu(display("Byte size '{value}' does not start with a number"))]
    NoNumber { value: String },
    #[snafu(display("Byte size '{value}' has unknown suffix '{suffix}'"))]
    UnknownSuffix { value: String, suffix: String },
}
