use chrono::format::{Item, StrftimeItems};
use chrono::{Locale, NaiveDate, NaiveTime, TimeZone, Utc};
use std::fmt::Write;

use crate::error::ConfigError;

/// Locale-aware date formatting, passed explicitly through a run.
///
/// Every date embedded in a document goes through one of these, so two runs
/// configured with different locales never influence each other.
#[derive(Clone, Debug)]
pub struct DateFormat {
    locale: Locale,
    pattern: String,
}

impl DateFormat {
    /// `pattern` is a chrono strftime pattern, e.g. `"%A %d %B %Y"`.
    pub fn new(locale: &str, pattern: impl Into<String>) -> Result<Self, ConfigError> {
        let parsed = Locale::try_from(locale)
            .map_err(|_| ConfigError::UnknownLocale(locale.to_string()))?;
        let pattern = pattern.into();
        if StrftimeItems::new(&pattern).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::InvalidPattern(pattern));
        }
        Ok(DateFormat {
            locale: parsed,
            pattern,
        })
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Format `date` in this locale, e.g. `lundi 15 janvier 2024`.
    pub fn format(&self, date: NaiveDate) -> String {
        let midnight = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
        let mut out = String::new();
        if write!(out, "{}", midnight.format_localized(&self.pattern, self.locale)).is_err() {
            return date.format("%Y-%m-%d").to_string();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_in_french() {
        let fmt = DateFormat::new("fr_FR", "%A %d %B %Y").unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(fmt.format(date), "lundi 15 janvier 2024");
    }

    #[test]
    fn unpadded_day() {
        let fmt = DateFormat::new("fr_FR", "%A %-d %B %Y").unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 2, 5).unwrap();
        assert_eq!(fmt.format(date), "lundi 5 février 2024");
    }

    #[test]
    fn locale_is_per_instance() {
        let fr = DateFormat::new("fr_FR", "%A").unwrap();
        let en = DateFormat::new("en_US", "%A").unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(fr.format(date), "lundi");
        assert_eq!(en.format(date), "Monday");
    }

    #[test]
    fn rejects_bad_pattern() {
        match DateFormat::new("fr_FR", "%A %Q") {
            Err(ConfigError::InvalidPattern(pattern)) => assert_eq!(pattern, "%A %Q"),
            other => panic!("unexpected: {:?}", other.map(|f| f.pattern().to_string())),
        }
    }

    #[test]
    fn rejects_unknown_locale() {
        assert!(matches!(
            DateFormat::new("xx_YY", "%A"),
            Err(ConfigError::UnknownLocale(_))
        ));
    }
}
