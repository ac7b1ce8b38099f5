//! Telemetry line parser
//!
//! Converts one assembled line into a [`Record`] or a classified
//! [`ParseFailure`]. Wire format (fixed ASCII CSV, one record per line):
//!
//! ```text
//! timestamp_ms,pressure1,...,pressure8,fsr_left,fsr_right[,ignored...]
//! ```
//!
//! Every outcome is a value; nothing here panics on device input.

use thiserror::Error;

use crate::types::{Record, RECORD_FIELD_COUNT};

/// Classification of a rejected line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseFailureKind {
    #[error("empty line")]
    EmptyLine,

    #[error("expected at least {} fields, found {found}", RECORD_FIELD_COUNT)]
    FieldCount { found: usize },

    #[error("field {field} is not a number")]
    NumericConversion { field: usize },
}

/// A rejected line together with its raw content for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {raw_line:?}")]
pub struct ParseFailure {
    pub kind: ParseFailureKind,
    pub raw_line: String,
}

impl ParseFailure {
    fn new(kind: ParseFailureKind, raw_line: &str) -> Self {
        Self {
            kind,
            raw_line: raw_line.to_string(),
        }
    }
}

/// Parse one telemetry line.
///
/// Fields beyond the eleventh are ignored. The timestamp must be finite so
/// the live window can always order against it; channel values accept any
/// floating point text Rust understands.
pub fn parse_line(line: &str) -> Result<Record, ParseFailure> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(ParseFailure::new(ParseFailureKind::EmptyLine, line));
    }

    let found = trimmed.split(',').count();
    if found < RECORD_FIELD_COUNT {
        return Err(ParseFailure::new(ParseFailureKind::FieldCount { found }, trimmed));
    }

    let mut values = [0.0_f64; RECORD_FIELD_COUNT];
    for (field, (slot, text)) in values.iter_mut().zip(trimmed.split(',')).enumerate() {
        *slot = match text.trim().parse::<f64>() {
            Ok(v) if field > 0 || v.is_finite() => v,
            _ => {
                return Err(ParseFailure::new(
                    ParseFailureKind::NumericConversion { field },
                    trimmed,
                ))
            }
        };
    }

    Ok(Record::from_fields(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_formed_line() {
        let record = parse_line("12.0,1,2,3,4,5,6,7,8,0.5,0.25").unwrap();
        assert_eq!(record.timestamp_ms, 12.0);
        assert_eq!(record.pressure, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(record.fsr_left, 0.5);
        assert_eq!(record.fsr_right, 0.25);
    }

    #[test]
    fn test_surrounding_whitespace_and_crlf() {
        let record = parse_line("  100, 1 ,2,3,4,5,6,7,8,9,10\r").unwrap();
        assert_eq!(record.timestamp_ms, 100.0);
        assert_eq!(record.pressure[0], 1.0);
        assert_eq!(record.fsr_right, 10.0);
    }

    #[test]
    fn test_empty_line() {
        let err = parse_line("   \r").unwrap_err();
        assert_eq!(err.kind, ParseFailureKind::EmptyLine);
    }

    #[test]
    fn test_too_few_fields() {
        let err = parse_line("1,2,3,4,5,6,7,8,9,10").unwrap_err();
        assert_eq!(err.kind, ParseFailureKind::FieldCount { found: 10 });
        assert_eq!(err.raw_line, "1,2,3,4,5,6,7,8,9,10");
    }

    #[test]
    fn test_non_numeric_field() {
        let err = parse_line("abc,1,2,3,4,5,6,7,8,9,10").unwrap_err();
        assert_eq!(err.kind, ParseFailureKind::NumericConversion { field: 0 });
        assert_eq!(err.raw_line, "abc,1,2,3,4,5,6,7,8,9,10");

        let err = parse_line("1,2,3,4,5,6,7,8,9,10,x").unwrap_err();
        assert_eq!(err.kind, ParseFailureKind::NumericConversion { field: 10 });
    }

    #[test]
    fn test_empty_field_is_conversion_error() {
        let err = parse_line("1,2,,4,5,6,7,8,9,10,11").unwrap_err();
        assert_eq!(err.kind, ParseFailureKind::NumericConversion { field: 2 });
    }

    #[test]
    fn test_extra_fields_ignored() {
        let record = parse_line("1,2,3,4,5,6,7,8,9,10,11,garbage").unwrap();
        assert_eq!(record.timestamp_ms, 1.0);
        assert_eq!(record.fsr_right, 11.0);
    }

    #[test]
    fn test_non_finite_timestamp_rejected() {
        let err = parse_line("nan,1,2,3,4,5,6,7,8,9,10").unwrap_err();
        assert_eq!(err.kind, ParseFailureKind::NumericConversion { field: 0 });

        // Channel values may still be non-finite
        let record = parse_line("5,nan,2,3,4,5,6,7,8,9,inf").unwrap();
        assert!(record.pressure[0].is_nan());
        assert!(record.fsr_right.is_infinite());
    }

    #[test]
    fn test_failure_display_includes_raw_line() {
        let err = parse_line("1,2").unwrap_err();
        assert_eq!(
            err.to_string(),
            "expected at least 11 fields, found 2: \"1,2\""
        );
    }
}
