//! Shared domain types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, de};
use thiserror::Error;

/// Account role, claimed once by creating the matching profile and released
/// by deleting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Student,
    Tutor,
}

/// Tutor qualification, ordered so a level filter admits everything at or
/// above the requested rung.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Level {
    HighSchool,
    Bachelor,
    Master,
    Phd,
}

/// Hourly rate in whole cents. Renders as a two-decimal string and accepts
/// either that or a plain number on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, sqlx::Type)]
#[sqlx(transparent)]
pub struct HourlyRate(i64);

impl HourlyRate {
    pub fn from_cents(cents: i64) -> Option<Self> {
        (cents >= 0).then_some(Self(cents))
    }

    pub fn from_major(amount: f64) -> Option<Self> {
        if !amount.is_finite() || !(0.0..1e8).contains(&amount) {
            return None;
        }
        Some(Self((amount * 100.0).round() as i64))
    }

    pub fn cents(self) -> i64 {
        self.0
    }
}

impl fmt::Display for HourlyRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

#[derive(Debug, Error)]
#[error("hourly rate must be a non-negative amount with at most two decimals")]
pub struct ParseRateError;

impl FromStr for HourlyRate {
    type Err = ParseRateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty()
            || whole.len() > 8
            || !whole.bytes().all(|b| b.is_ascii_digit())
            || frac.len() > 2
            || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(ParseRateError);
        }

        let whole: i64 = whole.parse().map_err(|_| ParseRateError)?;
        let cents = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| ParseRateError)? * 10,
            _ => frac.parse::<i64>().map_err(|_| ParseRateError)?,
        };
        Ok(Self(whole * 100 + cents))
    }
}

impl Serialize for HourlyRate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HourlyRate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => {
                HourlyRate::from_major(n).ok_or_else(|| de::Error::custom(ParseRateError))
            }
            Raw::Text(s) => s.parse().map_err(de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_renders_two_decimals() {
        assert_eq!(HourlyRate::from_cents(3500).unwrap().to_string(), "35.00");
        assert_eq!(HourlyRate::from_cents(45).unwrap().to_string(), "0.45");
        assert_eq!(HourlyRate::from_cents(40).unwrap().to_string(), "0.40");
    }

    #[test]
    fn rate_parses_flexible_input() {
        assert_eq!("35".parse::<HourlyRate>().unwrap().cents(), 3500);
        assert_eq!("35.5".parse::<HourlyRate>().unwrap().cents(), 3550);
        assert_eq!("35.50".parse::<HourlyRate>().unwrap().cents(), 3550);
        assert_eq!("0.99".parse::<HourlyRate>().unwrap().cents(), 99);
    }

    #[test]
    fn rate_rejects_bad_input() {
        assert!("-3".parse::<HourlyRate>().is_err());
        assert!("35.505".parse::<HourlyRate>().is_err());
        assert!("abc".parse::<HourlyRate>().is_err());
        assert!("3,50".parse::<HourlyRate>().is_err());
        assert!("".parse::<HourlyRate>().is_err());
    }

    #[test]
    fn rate_deserializes_from_string_or_number() {
        let from_text: HourlyRate = serde_json::from_str("\"35.00\"").unwrap();
        let from_number: HourlyRate = serde_json::from_str("35.0").unwrap();
        assert_eq!(from_text, from_number);
        assert_eq!(from_text.cents(), 3500);
    }

    #[test]
    fn levels_order_upward() {
        assert!(Level::HighSchool < Level::Bachelor);
        assert!(Level::Bachelor < Level::Master);
        assert!(Level::Master < Level::Phd);
    }
}
