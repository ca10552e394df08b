use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use thiserror::Error;

const DUE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid date '{value}': expected format YYYY-MM-DD")]
pub struct ParseDueError {
    value: String,
}

pub fn now_utc_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(TIMESTAMP_FORMAT)
        .expect("UTC timestamp formatting should never fail")
}

pub fn today_utc() -> Date {
    OffsetDateTime::now_utc().date()
}

pub fn parse_due(raw: &str) -> Result<Date, ParseDueError> {
    Date::parse(raw.trim(), DUE_FORMAT).map_err(|_| ParseDueError {
        value: raw.to_string(),
    })
}

pub fn format_due(date: Date) -> String {
    date.format(DUE_FORMAT)
        .expect("calendar date formatting should never fail")
}

/// Negative when `due` is already past.
pub fn days_until(due: Date, today: Date) -> i64 {
    (due - today).whole_days()
}

#[cfg(test)]
mod tests {
    use super::{days_until, format_due, now_utc_rfc3339, parse_due};
    use time::macros::date;

    #[test]
    fn due_dates_round_trip() {
        let parsed = parse_due("2024-02-29").expect("leap day should parse");
        assert_eq!(parsed, date!(2024 - 02 - 29));
        assert_eq!(format_due(parsed), "2024-02-29");
    }

    #[test]
    fn rejects_non_iso_dates() {
        assert!(parse_due("2023-02-29").is_err());
        assert!(parse_due("02/03/2024").is_err());
        let err = parse_due("tomorrow").expect_err("words are not dates");
        assert!(err.to_string().contains("YYYY-MM-DD"));
    }

    #[test]
    fn days_until_is_signed() {
        let today = date!(2024 - 01 - 10);
        assert_eq!(days_until(date!(2024 - 01 - 08), today), -2);
        assert_eq!(days_until(date!(2024 - 01 - 10), today), 0);
        assert_eq!(days_until(date!(2024 - 01 - 13), today), 3);
    }

    #[test]
    fn timestamps_are_second_precision_utc() {
        let stamp = now_utc_rfc3339();
        assert_eq!(stamp.len(), "2024-01-01T00:00:00Z".len());
        assert!(stamp.ends_with('Z'));
    }
}
