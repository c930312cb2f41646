// File: ./src/model/due.rs
// Due dates as they appear in checklist suffixes and on reminder records.
use chrono::{Datelike, Month, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

/// Glyph sequence that separates an item's text from its due-date suffix.
pub const SUFFIX_SEPARATOR: &str = " – ";

const DATE_FORMAT: &str = "%A %-d %b";
const TIME_FORMAT: &str = "%-I:%M %p";

/// A reminder due date.
///
/// `Day` carries no time-of-day component; `At` does. The two never compare
/// equal, even when they fall on the same calendar day. Both are floating
/// (wall-clock) values, the same way the reminders store keeps due-date
/// components.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum DueDate {
    Day(NaiveDate),
    At(NaiveDateTime),
}

impl DueDate {
    /// Builds a due date from a point in time, keeping the time only when it is significant.
    pub fn from_datetime(value: NaiveDateTime, include_time: bool) -> Self {
        if include_time {
            DueDate::At(value)
        } else {
            DueDate::Day(value.date())
        }
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            DueDate::Day(d) => *d,
            DueDate::At(dt) => dt.date(),
        }
    }

    pub fn has_time(&self) -> bool {
        matches!(self, DueDate::At(_))
    }

    /// Renders the suffix appended to a checklist line, separator included.
    pub fn to_suffix(&self) -> String {
        format_suffix(self)
    }
}

/// Formats `due` as `" – Saturday 12 Jul"` or `" – Saturday 12 Jul at 9:00 PM"`.
///
/// chrono's formatter is locale-independent, so weekday and month names are
/// always English.
pub fn format_suffix(due: &DueDate) -> String {
    match due {
        DueDate::Day(d) => format!("{}{}", SUFFIX_SEPARATOR, d.format(DATE_FORMAT)),
        DueDate::At(dt) => format!(
            "{}{} at {}",
            SUFFIX_SEPARATOR,
            dt.format(DATE_FORMAT),
            dt.format(TIME_FORMAT)
        ),
    }
}

/// `format(date, includeTime)` in one call.
pub fn format(value: NaiveDateTime, include_time: bool) -> String {
    format_suffix(&DueDate::from_datetime(value, include_time))
}

/// True when the two sides would render different suffixes.
///
/// The file can only express minute precision and no year, so rendered text
/// is the only comparison that cannot flip-flop between passes.
pub fn dates_differ(a: Option<&DueDate>, b: Option<&DueDate>) -> bool {
    a.map(format_suffix) != b.map(format_suffix)
}

/// Parses a suffix produced by [`format_suffix`].
///
/// The leading separator is optional. The suffix carries no year, so the
/// year is chosen relative to `reference`: among the previous, current and
/// next year, the closest date whose weekday matches wins. When no candidate
/// has the named weekday, the closest candidate is used anyway.
pub fn parse_suffix(suffix: &str, reference: NaiveDate) -> Option<DueDate> {
    let body = suffix
        .trim()
        .strip_prefix(SUFFIX_SEPARATOR.trim())
        .unwrap_or(suffix.trim())
        .trim();

    let (date_part, time_part) = match body.split_once(" at ") {
        Some((d, t)) => (d.trim(), Some(t.trim())),
        None => (body, None),
    };

    let date = parse_date_part(date_part, reference)?;
    match time_part {
        None => Some(DueDate::Day(date)),
        Some(t) => parse_time_part(t).map(|time| DueDate::At(date.and_time(time))),
    }
}

fn parse_date_part(text: &str, reference: NaiveDate) -> Option<NaiveDate> {
    let mut tokens = text.split_whitespace();
    let weekday = tokens.next()?.parse::<Weekday>().ok()?;
    let day = tokens.next()?.parse::<u32>().ok()?;
    let month = tokens.next()?.parse::<Month>().ok()?;
    if tokens.next().is_some() {
        return None;
    }
    resolve_year(weekday, day, month.number_from_month(), reference)
}

fn resolve_year(weekday: Weekday, day: u32, month: u32, reference: NaiveDate) -> Option<NaiveDate> {
    let candidates: Vec<NaiveDate> = (reference.year() - 1..=reference.year() + 1)
        .filter_map(|year| NaiveDate::from_ymd_opt(year, month, day))
        .collect();
    let distance = |d: &&NaiveDate| (**d - reference).num_days().abs();

    candidates
        .iter()
        .filter(|d| d.weekday() == weekday)
        .min_by_key(distance)
        .or_else(|| candidates.iter().min_by_key(distance))
        .copied()
}

fn parse_time_part(text: &str) -> Option<NaiveTime> {
    let mut normalized = text.trim().to_ascii_uppercase();
    if !normalized.contains(' ') && (normalized.ends_with("AM") || normalized.ends_with("PM")) {
        normalized.insert(normalized.len() - 2, ' ');
    }
    NaiveTime::parse_from_str(&normalized, "%I:%M %p").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()
    }

    #[test]
    fn test_format_day_only() {
        let due = DueDate::Day(NaiveDate::from_ymd_opt(2025, 7, 12).unwrap());
        assert_eq!(due.to_suffix(), " – Saturday 12 Jul");
    }

    #[test]
    fn test_format_with_time() {
        let dt = NaiveDate::from_ymd_opt(2025, 7, 12)
            .unwrap()
            .and_hms_opt(21, 0, 0)
            .unwrap();
        assert_eq!(format(dt, true), " – Saturday 12 Jul at 9:00 PM");
        assert_eq!(format(dt, false), " – Saturday 12 Jul");
    }

    #[test]
    fn test_parse_inverts_format() {
        let dt = NaiveDate::from_ymd_opt(2025, 7, 12)
            .unwrap()
            .and_hms_opt(9, 5, 0)
            .unwrap();
        let due = DueDate::At(dt);
        assert_eq!(parse_suffix(&due.to_suffix(), reference()), Some(due));

        let day = DueDate::Day(dt.date());
        assert_eq!(parse_suffix(&day.to_suffix(), reference()), Some(day));
    }

    #[test]
    fn test_parse_accepts_compact_lowercase_time() {
        let parsed = parse_suffix("Saturday 12 Jul at 9:00pm", reference()).unwrap();
        assert_eq!(
            parsed,
            DueDate::At(
                NaiveDate::from_ymd_opt(2025, 7, 12)
                    .unwrap()
                    .and_hms_opt(21, 0, 0)
                    .unwrap()
            )
        );
    }

    #[test]
    fn test_year_follows_weekday() {
        // 12 Jul is a Saturday in 2025 and a Sunday in 2026.
        let late_reference = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        let parsed = parse_suffix(" – Saturday 12 Jul", late_reference).unwrap();
        assert_eq!(parsed.date(), NaiveDate::from_ymd_opt(2025, 7, 12).unwrap());

        let parsed = parse_suffix(" – Sunday 12 Jul", late_reference).unwrap();
        assert_eq!(parsed.date(), NaiveDate::from_ymd_opt(2026, 7, 12).unwrap());
    }

    #[test]
    fn test_mismatched_weekday_falls_back_to_closest() {
        let parsed = parse_suffix("Monday 3 Jul", reference()).unwrap();
        // 3 Jul is not a Monday in 2024, 2025 or 2026.
        assert_eq!(parsed.date(), NaiveDate::from_ymd_opt(2025, 7, 3).unwrap());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert_eq!(parse_suffix("someday", reference()), None);
        assert_eq!(parse_suffix("Saturday 40 Jul", reference()), None);
        assert_eq!(parse_suffix("Saturday 12 Jul at noon", reference()), None);
        assert_eq!(parse_suffix("Saturday 12 Jul 2025", reference()), None);
    }

    #[test]
    fn test_day_and_time_never_equal() {
        let date = NaiveDate::from_ymd_opt(2025, 7, 12).unwrap();
        let day = DueDate::Day(date);
        let at = DueDate::At(date.and_hms_opt(0, 0, 0).unwrap());
        assert_ne!(day, at);
        assert!(dates_differ(Some(&day), Some(&at)));
        assert!(dates_differ(Some(&day), None));
        assert!(!dates_differ(None, None));
    }

    #[test]
    fn test_seconds_do_not_count_as_difference() {
        let date = NaiveDate::from_ymd_opt(2025, 7, 12).unwrap();
        let a = DueDate::At(date.and_hms_opt(21, 0, 0).unwrap());
        let b = DueDate::At(date.and_hms_opt(21, 0, 42).unwrap());
        assert!(!dates_differ(Some(&a), Some(&b)));
    }
}
