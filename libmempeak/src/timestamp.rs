//! Textual timestamps as written by `nvidia-smi` and by [`crate::intervals::IntervalWriter`].
use chrono::NaiveDateTime;

/// Format accepted when parsing; the fraction is optional and of any precision.
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.f";

/// Format used when writing, always with microseconds.
pub const TIMESTAMP_WRITE_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.6f";

pub fn parse_timestamp(s: &str, format: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s.trim(), format)
}

#[must_use]
pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_WRITE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    #[test]
    fn parses_nvidia_smi_timestamps() {
        let t = parse_timestamp("2021/03/25 14:02:11.123456", TIMESTAMP_FORMAT).unwrap();
        assert_eq!(t.date(), NaiveDate::from_ymd_opt(2021, 3, 25).unwrap());
        assert_eq!(t.hour(), 14);
        assert_eq!(t.nanosecond(), 123_456_000);
    }

    #[test]
    fn millisecond_precision_is_accepted() {
        let t = parse_timestamp(" 2021/03/25 14:02:11.250 ", TIMESTAMP_FORMAT).unwrap();
        assert_eq!(t.nanosecond(), 250_000_000);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_timestamp("yesterday", TIMESTAMP_FORMAT).is_err());
        assert!(parse_timestamp("2021-03-25 14:02:11.1", TIMESTAMP_FORMAT).is_err());
    }

    #[test]
    fn formatting_round_trips() {
        let t = parse_timestamp("2021/03/25 14:02:11.000042", TIMESTAMP_FORMAT).unwrap();
        assert_eq!(format_timestamp(&t), "2021/03/25 14:02:11.000042");
    }
}
