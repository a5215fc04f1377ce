//! Validation of incoming exercise entries.
//!
//! Clients post `description`, `duration` and an optional `date`, either as
//! JSON or as a urlencoded form. Everything arrives as text (JSON numbers are
//! accepted for `duration`) and is normalized here before it reaches the store.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serializer};

use crate::error::ApiError;

/// Calendar dates are stored and compared in this format.
pub static DATE_FORMAT: &str = "%Y-%m-%d";
/// Format used when dates are echoed back to clients, e.g. `Sun Jan 15 2023`.
pub static DISPLAY_FORMAT: &str = "%a %b %d %Y";

static DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Raw exercise fields as posted by a client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExerciseForm {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub duration: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

/// A validated entry, ready to be appended to a user's log.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExercise {
    pub description: String,
    pub duration: i64,
    pub date: NaiveDate,
}

impl NewExercise {
    /// Normalizes `form`. A missing date falls back to `today`.
    pub fn validate(form: &ExerciseForm, today: NaiveDate) -> Result<Self, ApiError> {
        let description = non_empty(&form.description).ok_or(ApiError::MissingField)?;
        let raw_duration = non_empty(&form.duration).ok_or(ApiError::MissingField)?;

        let date = match non_empty(&form.date) {
            None => today,
            Some(raw) => parse_date(raw).ok_or(ApiError::InvalidDate)?,
        };

        let duration = parse_duration(raw_duration).ok_or(ApiError::InvalidDuration)?;

        Ok(NewExercise {
            description: description.to_string(),
            duration,
            date,
        })
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Parses a calendar date. Full timestamps are accepted and truncated to
/// their date part.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();

    let date = NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|d| d.date_naive()))
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|d| d.date())
        })
        .or_else(|| NaiveDate::parse_from_str(raw, DISPLAY_FORMAT).ok())?;

    // Stored dates must sort lexicographically.
    if (1..=9999).contains(&date.year()) {
        Some(date)
    } else {
        None
    }
}

/// Reads the leading integer of `raw`, so `"30"`, `"30 min"` and `"30.5"` all
/// give 30.
pub fn parse_duration(raw: &str) -> Option<i64> {
    let raw = raw.trim_start();
    let (negative, rest) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };

    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or_else(|| rest.len());
    let value = rest.get(..end)?.parse::<i64>().ok()?;

    Some(if negative { -value } else { value })
}

pub fn display_date(date: NaiveDate) -> String {
    date.format(DISPLAY_FORMAT).to_string()
}

pub fn serialize_display_date<S>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&display_date(*date))
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct FieldVisitor;

    impl<'de> Visitor<'de> for FieldVisitor {
        type Value = Option<String>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a string or a number")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
            d.deserialize_any(FieldVisitor)
        }
    }

    deserializer.deserialize_any(FieldVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 6, 1).unwrap()
    }

    fn form(description: &str, duration: &str, date: Option<&str>) -> ExerciseForm {
        ExerciseForm {
            description: Some(description.to_string()),
            duration: Some(duration.to_string()),
            date: date.map(String::from),
        }
    }

    #[test]
    fn test_missing_description_or_duration() {
        let missing_description = ExerciseForm {
            duration: Some("30".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            NewExercise::validate(&missing_description, today()),
            Err(ApiError::MissingField)
        ));

        let blank_duration = form("run", "  ", None);
        assert!(matches!(
            NewExercise::validate(&blank_duration, today()),
            Err(ApiError::MissingField)
        ));
    }

    #[test]
    fn test_date_defaults_to_today() {
        let exercise = NewExercise::validate(&form("run", "30", None), today()).unwrap();
        assert_eq!(exercise.date, today());

        let exercise = NewExercise::validate(&form("run", "30", Some("")), today()).unwrap();
        assert_eq!(exercise.date, today());
    }

    #[test]
    fn test_invalid_date_rejected() {
        for raw in &["2023-02-30", "not a date", "2023-13-01", "15/01/2023"] {
            assert!(
                matches!(
                    NewExercise::validate(&form("run", "30", Some(raw)), today()),
                    Err(ApiError::InvalidDate)
                ),
                "{} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_accepted_date_formats() {
        let exp = NaiveDate::from_ymd_opt(2023, 1, 15).unwrap();
        assert_eq!(parse_date("2023-01-15"), Some(exp));
        assert_eq!(parse_date("2023-01-15T08:30:00Z"), Some(exp));
        assert_eq!(parse_date("2023-01-15 08:30:00"), Some(exp));
        assert_eq!(parse_date("Sun Jan 15 2023"), Some(exp));
        // Wrong weekday for that date.
        assert_eq!(parse_date("Mon Jan 15 2023"), None);
    }

    #[test]
    fn test_duration_is_leading_integer() {
        assert_eq!(parse_duration("30"), Some(30));
        assert_eq!(parse_duration("30 min"), Some(30));
        assert_eq!(parse_duration("30.5"), Some(30));
        assert_eq!(parse_duration("-5"), Some(-5));
        assert_eq!(parse_duration("abc"), None);

        assert!(matches!(
            NewExercise::validate(&form("run", "half an hour", None), today()),
            Err(ApiError::InvalidDuration)
        ));
    }

    #[test]
    fn test_display_date() {
        let date = NaiveDate::from_ymd_opt(2023, 1, 5).unwrap();
        assert_eq!(display_date(date), "Thu Jan 05 2023");
    }

    #[test]
    fn test_form_accepts_numeric_duration() {
        let form: ExerciseForm =
            serde_json::from_str(r#"{"description": "swim", "duration": 45}"#).unwrap();
        assert_eq!(form.duration.as_deref(), Some("45"));
        assert_eq!(form.date, None);

        let form: ExerciseForm = serde_json::from_str(r#"{"duration": null}"#).unwrap();
        assert_eq!(form.duration, None);
    }
}
