//! Canonical blob filename convention.
//!
//! Every persisted image is named
//! `<mac_nocolons>_<YYYYMMDD>_<HHMMSS>_<UUUUUU>.jpg`, local wall-clock
//! time at finalize with microsecond precision, e.g.
//! `34ab95fa3a6c_20250414_115521_331015.jpg`. Downstream tooling (the
//! gallery viewer) recovers sender and reception time by parsing the name,
//! so format and parser live together here.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::protocol::Mac;

/// A blob filename: sender MAC plus local reception timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageFilename {
    pub mac: Mac,
    pub timestamp: NaiveDateTime,
}

impl ImageFilename {
    pub fn new(mac: Mac, timestamp: NaiveDateTime) -> Self {
        Self { mac, timestamp }
    }

    /// Parse a filename produced by [`Display`](Self#impl-Display-for-ImageFilename).
    ///
    /// Strict on shape: exactly four underscore-separated fields, a
    /// lowercase 12-hex-digit MAC, fixed-width date, time, and microsecond
    /// fields, and a `.jpg` extension (any case). Anything else is not one
    /// of ours.
    pub fn parse(name: &str) -> Option<Self> {
        let (stem, extension) = name.rsplit_once('.')?;
        if !extension.eq_ignore_ascii_case("jpg") {
            return None;
        }

        let mut parts = stem.split('_');
        let mac_part = parts.next()?;
        let date_part = parts.next()?;
        let time_part = parts.next()?;
        let micro_part = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        if mac_part.len() != 12
            || !mac_part
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return None;
        }
        let mac: Mac = mac_part.parse().ok()?;

        if date_part.len() != 8 || time_part.len() != 6 || micro_part.len() != 6 {
            return None;
        }
        let date = NaiveDate::parse_from_str(date_part, "%Y%m%d").ok()?;
        let time = NaiveTime::parse_from_str(time_part, "%H%M%S").ok()?;
        if !micro_part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let micros: u32 = micro_part.parse().ok()?;
        let timestamp = date.and_time(time).with_nanosecond(micros * 1_000)?;

        Some(Self { mac, timestamp })
    }
}

impl fmt::Display for ImageFilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let micros = (self.timestamp.nanosecond() / 1_000) % 1_000_000;
        write!(
            f,
            "{}_{}_{}_{micros:06}.jpg",
            self.mac.path_form(),
            self.timestamp.format("%Y%m%d"),
            self.timestamp.format("%H%M%S"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn formats_the_documented_example() {
        let mac: Mac = "34:ab:95:fa:3a:6c".parse().unwrap();
        let timestamp = NaiveDate::from_ymd_opt(2025, 4, 14)
            .unwrap()
            .and_hms_micro_opt(11, 55, 21, 331_015)
            .unwrap();
        let name = ImageFilename::new(mac, timestamp).to_string();
        assert_eq!(name, "34ab95fa3a6c_20250414_115521_331015.jpg");
    }

    #[test]
    fn parses_what_it_formats() {
        let mac: Mac = "0a:1b:2c:3d:4e:5f".parse().unwrap();
        let timestamp = NaiveDate::from_ymd_opt(2026, 1, 31)
            .unwrap()
            .and_hms_micro_opt(23, 59, 59, 7)
            .unwrap();
        let original = ImageFilename::new(mac, timestamp);
        let parsed = ImageFilename::parse(&original.to_string()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn microseconds_are_zero_padded() {
        let mac: Mac = "0a:1b:2c:3d:4e:5f".parse().unwrap();
        let timestamp = NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_micro_opt(0, 0, 1, 42)
            .unwrap();
        let name = ImageFilename::new(mac, timestamp).to_string();
        assert!(name.ends_with("_000042.jpg"), "{name}");
    }

    #[test]
    fn accepts_uppercase_extension() {
        let parsed = ImageFilename::parse("34ab95fa3a6c_20250414_115521_331015.JPG");
        assert!(parsed.is_some());
    }

    #[test_case("34ab95fa3a6c_20250414_115521_331015.png"; "wrong extension")]
    #[test_case("34ab95fa3a6c_20250414_115521.jpg"; "missing microseconds")]
    #[test_case("34ab95fa3a6c_20250414_115521_331015_extra.jpg"; "extra field")]
    #[test_case("34AB95FA3A6C_20250414_115521_331015.jpg"; "uppercase mac")]
    #[test_case("34ab95fa3a_20250414_115521_331015.jpg"; "short mac")]
    #[test_case("34ab95fa3a6c_20251414_115521_331015.jpg"; "month out of range")]
    #[test_case("34ab95fa3a6c_20250414_259999_331015.jpg"; "time out of range")]
    #[test_case("34ab95fa3a6c_20250414_115521_33101.jpg"; "short microseconds")]
    #[test_case("34ab95fa3a6c_20250414_115521_33101x.jpg"; "non numeric microseconds")]
    #[test_case("notes.txt"; "unrelated file")]
    #[test_case("../../etc/passwd"; "path traversal")]
    fn rejects_nonconforming_names(name: &str) {
        assert!(ImageFilename::parse(name).is_none());
    }
}
