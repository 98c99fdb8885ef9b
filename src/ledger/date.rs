use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::COVERED_DATE_FORMAT;
use crate::error::PublishError;

static DATE_SHAPE: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"\A\d{4}\.\d{2}\.\d{2}\z").unwrap());

/// The calendar day whose melt data a post depicts, written `YYYY.MM.DD`.
///
/// Ordering is chronological, which for this fixed-width format is also the
/// lexical order of the string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoveredDate(NaiveDate);

impl CoveredDate {
    #[must_use]
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    #[must_use]
    pub fn as_naive(&self) -> NaiveDate {
        self.0
    }
}

impl FromStr for CoveredDate {
    type Err = PublishError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !DATE_SHAPE.is_match(s) {
            return Err(PublishError::InvalidDate(s.to_string()));
        }
        NaiveDate::parse_from_str(s, COVERED_DATE_FORMAT)
            .map(Self)
            .map_err(|_| PublishError::InvalidDate(s.to_string()))
    }
}

impl fmt::Display for CoveredDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(COVERED_DATE_FORMAT))
    }
}

impl Serialize for CoveredDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CoveredDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let date: CoveredDate = "2023.12.16".parse().unwrap();
        assert_eq!(date.to_string(), "2023.12.16");
        assert_eq!(
            date.as_naive(),
            NaiveDate::from_ymd_opt(2023, 12, 16).unwrap()
        );
    }

    #[test]
    fn test_rejects_other_formats() {
        for bad in [
            "2023-12-16",
            "2023.12.6",
            "23.12.16",
            "2023.13.01",
            "2023.02.30",
            "",
            " 2023.12.16 ",
            "2023.12.16\n",
        ] {
            assert!(
                matches!(bad.parse::<CoveredDate>(), Err(PublishError::InvalidDate(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_ordering_is_chronological() {
        let a: CoveredDate = "2023.12.31".parse().unwrap();
        let b: CoveredDate = "2024.01.01".parse().unwrap();
        assert!(a < b);
    }
}
