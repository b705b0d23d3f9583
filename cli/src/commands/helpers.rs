use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;

use fittrack_core::models::Intensity;

/// Parse a calendar date: `YYYY-MM-DD`, `today` or `yesterday`. `None` means today.
pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.trim().to_lowercase().as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            other => NaiveDate::parse_from_str(other, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday")
            }),
        },
    }
}

/// Like [`parse_date`], but leaves an absent value absent.
pub(crate) fn parse_optional_date(date_str: Option<String>) -> Result<Option<NaiveDate>> {
    date_str.map(|s| parse_date(Some(s))).transpose()
}

/// Parse a meal time: `YYYY-MM-DD HH:MM`, `YYYY-MM-DDTHH:MM[:SS]` or `now`.
pub(crate) fn parse_meal_time(time_str: Option<String>) -> Result<NaiveDateTime> {
    let Some(s) = time_str else {
        return Ok(now_minute());
    };
    let s = s.trim();
    if s.eq_ignore_ascii_case("now") {
        return Ok(now_minute());
    }
    for format in [
        "%Y-%m-%d %H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%dT%H:%M:%S",
    ] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(t);
        }
    }
    bail!("Invalid time '{s}'. Use 'YYYY-MM-DD HH:MM', 'YYYY-MM-DDTHH:MM' or 'now'")
}

fn now_minute() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now)
}

pub(crate) fn parse_intensity(s: &str) -> Result<Intensity> {
    s.parse()
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_none() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(None).unwrap(), today);
    }

    #[test]
    fn test_parse_date_keywords() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(Some("today".to_string())).unwrap(), today);
        assert_eq!(
            parse_date(Some("Yesterday".to_string())).unwrap(),
            today - chrono::Duration::days(1)
        );
    }

    #[test]
    fn test_parse_date_iso() {
        let date = parse_date(Some("2024-01-15".to_string())).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn test_parse_date_invalid() {
        assert!(parse_date(Some("nope".to_string())).is_err());
        assert!(parse_date(Some("2024-02-30".to_string())).is_err());
    }

    #[test]
    fn test_parse_optional_date() {
        assert!(parse_optional_date(None).unwrap().is_none());
        assert_eq!(
            parse_optional_date(Some("2024-06-01".to_string())).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 1)
        );
    }

    #[test]
    fn test_parse_meal_time_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        for s in [
            "2024-06-01 12:30",
            "2024-06-01 12:30:00",
            "2024-06-01T12:30",
            "2024-06-01T12:30:00",
        ] {
            assert_eq!(parse_meal_time(Some(s.to_string())).unwrap(), expected);
        }
    }

    #[test]
    fn test_parse_meal_time_now() {
        let before = Local::now().naive_local() - chrono::Duration::minutes(1);
        let t = parse_meal_time(Some("now".to_string())).unwrap();
        assert!(t >= before);
        assert!(parse_meal_time(None).unwrap() >= before);
    }

    #[test]
    fn test_parse_meal_time_invalid() {
        assert!(parse_meal_time(Some("lunchtime".to_string())).is_err());
        assert!(parse_meal_time(Some("2024-06-01".to_string())).is_err());
    }

    #[test]
    fn test_parse_intensity() {
        assert_eq!(parse_intensity("HIGH").unwrap(), Intensity::High);
        assert!(parse_intensity("extreme").is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world this is long", 10), "hello w...");
        assert_eq!(truncate("Crème fraîche", 10), "Crème f...");
    }

    #[test]
    fn test_no_neg_zero() {
        assert_eq!(no_neg_zero(-0.0).to_bits(), 0.0_f64.to_bits());
        assert_eq!(no_neg_zero(5.0), 5.0);
    }

    #[test]
    fn test_json_error() {
        assert_eq!(json_error("nope"), r#"{"error":"nope"}"#);
    }
}
