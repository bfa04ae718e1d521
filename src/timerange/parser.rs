//! Time expression parsing.
//!
//! Turns the text typed into a from/to field into an absolute instant. Three
//! families are tried in order: the canonical `YYYY-MM-DD HH:mm:ss` form,
//! relative offsets (`5m ago`, `now`), and a pluggable natural-language
//! fallback. All relative forms are evaluated against a caller-supplied
//! `now`, so the parser never reads the system clock itself.
//!
//! Wall-clock readings (the canonical form, `tomorrow at 9am`, `1y ago`) are
//! placed on the timeline with the zone's offset for that date, not the
//! offset in effect now.

use crate::timerange::natural::{BuiltinNaturalParser, NaturalLanguageParser, NaturalTime};
use crate::timerange::zone::Zone;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Duration, Month, OffsetDateTime, PrimitiveDateTime};

/// The only textual form guaranteed to survive `format` -> `parse`.
pub const CANONICAL_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Returned when text matches none of the recognized expression families.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid date format")]
pub struct TimeParseError {
    pub input: String,
}

fn relative_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(\d+)\s*([smhdy])\s+ago$").expect("relative offset pattern is valid")
    })
}

pub struct TimeExpressionParser {
    zone: Zone,
    natural: Box<dyn NaturalLanguageParser>,
}

impl Default for TimeExpressionParser {
    fn default() -> Self {
        Self::new(Zone::Local)
    }
}

impl TimeExpressionParser {
    /// Parser whose canonical form is read and written in `zone`.
    pub fn new(zone: impl Into<Zone>) -> Self {
        Self {
            zone: zone.into(),
            natural: Box::new(BuiltinNaturalParser),
        }
    }

    /// Swap the natural-language fallback for another implementation.
    // Injection point for other engines; the binary ships only the builtin one.
    #[allow(dead_code)]
    pub fn with_natural_parser(mut self, natural: Box<dyn NaturalLanguageParser>) -> Self {
        self.natural = natural;
        self
    }

    pub fn zone(&self) -> Zone {
        self.zone
    }

    /// Resolve `text` to an instant relative to `now`.
    ///
    /// Empty text is rejected; callers treat an empty field as "unset"
    /// before getting here.
    pub fn parse(&self, text: &str, now: OffsetDateTime) -> Result<OffsetDateTime, TimeParseError> {
        let trimmed = text.trim();
        let invalid = || TimeParseError {
            input: text.to_string(),
        };
        if trimmed.is_empty() {
            return Err(invalid());
        }

        if let Ok(wall) = PrimitiveDateTime::parse(trimmed, CANONICAL_FORMAT) {
            return self.zone.resolve(wall).ok_or_else(invalid);
        }

        let local_now = now.to_offset(self.zone.offset_at(now));
        if trimmed.eq_ignore_ascii_case("now") {
            return Ok(local_now);
        }
        if let Some(caps) = relative_pattern().captures(trimmed) {
            // A well-formed offset that overflows is still invalid, not a natural phrase.
            let amount: i64 = caps[1].parse().map_err(|_| invalid())?;
            let unit = caps[2].to_ascii_lowercase();
            return self
                .subtract_offset(local_now, amount, &unit)
                .ok_or_else(invalid);
        }

        match self.natural.parse(trimmed, local_now) {
            Some(NaturalTime::Instant(instant)) => Ok(instant),
            Some(NaturalTime::WallClock(wall)) => self.zone.resolve(wall).ok_or_else(invalid),
            None => Err(invalid()),
        }
    }

    /// Canonical second-precision rendering with the zone's offset at `instant`.
    pub fn format(&self, instant: OffsetDateTime) -> String {
        instant
            .to_offset(self.zone.offset_at(instant))
            .format(CANONICAL_FORMAT)
            .unwrap_or_default()
    }

    /// `y` shifts the calendar and keeps the time of day; the other units are
    /// fixed lengths.
    fn subtract_offset(
        &self,
        now: OffsetDateTime,
        amount: i64,
        unit: &str,
    ) -> Option<OffsetDateTime> {
        let seconds_per_unit = match unit {
            "s" => 1,
            "m" => 60,
            "h" => 3_600,
            "d" => 86_400,
            "y" => {
                let months = amount.checked_mul(12)?.checked_neg()?;
                let wall = shift_months(PrimitiveDateTime::new(now.date(), now.time()), months)?;
                return self.zone.resolve(wall);
            }
            _ => return None,
        };
        let seconds = amount.checked_mul(seconds_per_unit)?;
        now.checked_sub(Duration::seconds(seconds))
    }
}

/// Milliseconds since the Unix epoch, as sent in request bounds.
pub fn epoch_millis(instant: OffsetDateTime) -> i64 {
    (instant.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Move `dt` by whole calendar months, clamping the day to the target month's length.
pub(crate) fn shift_months(dt: PrimitiveDateTime, months: i64) -> Option<PrimitiveDateTime> {
    let current = i64::from(dt.year()) * 12 + i64::from(u8::from(dt.month())) - 1;
    let total = current.checked_add(months)?;
    let year = i32::try_from(total.div_euclid(12)).ok()?;
    let month = Month::try_from(u8::try_from(total.rem_euclid(12) + 1).ok()?).ok()?;
    let day = dt.day().min(month.length(year));
    let date = Date::from_calendar_date(year, month, day).ok()?;
    Some(dt.replace_date(date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Berlin;
    use proptest::prelude::*;
    use time::macros::{datetime, offset};
    use time::UtcOffset;

    fn parser() -> TimeExpressionParser {
        TimeExpressionParser::new(UtcOffset::UTC)
    }

    fn anchor() -> OffsetDateTime {
        datetime!(2024-03-15 12:30:45 UTC)
    }

    #[test]
    fn parses_canonical_form() {
        let got = parser().parse("2024-01-01 00:00:00", anchor()).unwrap();
        assert_eq!(got, datetime!(2024-01-01 00:00:00 UTC));
    }

    #[test]
    fn canonical_form_uses_parser_offset() {
        let p = TimeExpressionParser::new(offset!(+3));
        let got = p.parse("2024-01-01 03:00:00", anchor()).unwrap();
        assert_eq!(got, datetime!(2024-01-01 00:00:00 UTC));
        assert_eq!(p.format(got), "2024-01-01 03:00:00");
    }

    #[test]
    fn canonical_form_follows_daylight_saving() {
        let p = TimeExpressionParser::new(Berlin);
        let winter_now = datetime!(2024-01-15 12:00:00 UTC);
        assert_eq!(
            p.parse("2024-07-01 00:00:00", winter_now).unwrap(),
            datetime!(2024-06-30 22:00:00 UTC)
        );
        assert_eq!(
            p.parse("2024-01-01 00:00:00", winter_now).unwrap(),
            datetime!(2023-12-31 23:00:00 UTC)
        );
        assert_eq!(p.format(datetime!(2024-06-30 22:00:00 UTC)), "2024-07-01 00:00:00");
        assert_eq!(p.format(datetime!(2023-12-31 23:00:00 UTC)), "2024-01-01 00:00:00");
    }

    #[test]
    fn day_words_across_daylight_saving_change() {
        // Berlin moved to +02:00 at 01:00 UTC on 2024-03-31.
        let p = TimeExpressionParser::new(Berlin);
        let now = datetime!(2024-03-31 12:00:00 UTC);
        assert_eq!(
            p.parse("yesterday at 9am", now).unwrap(),
            datetime!(2024-03-30 08:00:00 UTC)
        );
        assert_eq!(
            p.parse("today at 9am", now).unwrap(),
            datetime!(2024-03-31 07:00:00 UTC)
        );
        assert_eq!(
            p.parse("1y ago", now).unwrap(),
            datetime!(2023-03-31 12:00:00 UTC)
        );
        assert_eq!(
            p.parse("6h ago", now).unwrap(),
            datetime!(2024-03-31 06:00:00 UTC)
        );
    }

    #[test]
    fn format_drops_subseconds() {
        let t = datetime!(2024-05-06 07:08:09.987 UTC);
        assert_eq!(parser().format(t), "2024-05-06 07:08:09");
    }

    #[test]
    fn now_resolves_to_anchor() {
        assert_eq!(parser().parse("now", anchor()).unwrap(), anchor());
        assert_eq!(parser().parse("  NOW ", anchor()).unwrap(), anchor());
    }

    #[test]
    fn relative_offsets_by_unit() {
        let p = parser();
        let now = anchor();
        assert_eq!(p.parse("30s ago", now).unwrap(), now - Duration::seconds(30));
        assert_eq!(p.parse("5m ago", now).unwrap(), now - Duration::minutes(5));
        assert_eq!(p.parse("6h ago", now).unwrap(), now - Duration::hours(6));
        assert_eq!(p.parse("180d ago", now).unwrap(), now - Duration::days(180));
        assert_eq!(
            p.parse("2y ago", now).unwrap(),
            datetime!(2022-03-15 12:30:45 UTC)
        );
    }

    #[test]
    fn year_offset_clamps_leap_day() {
        let now = datetime!(2024-02-29 10:00:00 UTC);
        assert_eq!(
            parser().parse("1y ago", now).unwrap(),
            datetime!(2023-02-28 10:00:00 UTC)
        );
    }

    #[test]
    fn relative_offsets_follow_the_clock() {
        let p = parser();
        let first = p.parse("5m ago", anchor()).unwrap();
        let second = p.parse("5m ago", anchor() + Duration::seconds(1)).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn natural_language_fallback() {
        let got = parser().parse("tomorrow at 5pm", anchor()).unwrap();
        assert_eq!(got, datetime!(2024-03-16 17:00:00 UTC));
    }

    struct Fixed(OffsetDateTime);

    impl NaturalLanguageParser for Fixed {
        fn parse(&self, text: &str, _now: OffsetDateTime) -> Option<NaturalTime> {
            (text == "launch day").then_some(NaturalTime::Instant(self.0))
        }
    }

    #[test]
    fn natural_fallback_is_pluggable() {
        let launch = datetime!(2023-06-01 09:00:00 UTC);
        let p = parser().with_natural_parser(Box::new(Fixed(launch)));
        assert_eq!(p.parse("launch day", anchor()).unwrap(), launch);
        assert_eq!(p.parse("5m ago", anchor()).unwrap(), anchor() - Duration::minutes(5));
        assert!(p.parse("tomorrow", anchor()).is_err());
    }

    #[test]
    fn rejects_garbage_and_empty() {
        let p = parser();
        for text in ["", "   ", "not a date", "5x ago", "2024-13-01 00:00:00"] {
            let err = p.parse(text, anchor()).unwrap_err();
            assert_eq!(err.to_string(), "invalid date format");
            assert_eq!(err.input, text);
        }
    }

    #[test]
    fn overflowing_offset_is_an_error() {
        assert!(parser()
            .parse("99999999999999999999d ago", anchor())
            .is_err());
        assert!(parser().parse("9999999y ago", anchor()).is_err());
    }

    #[test]
    fn epoch_millis_truncates() {
        let t = datetime!(1970-01-01 00:00:01.5 UTC);
        assert_eq!(epoch_millis(t), 1_500);
    }

    #[test]
    fn shift_months_crosses_year_boundary() {
        let t = datetime!(2024-01-31 00:00:00);
        assert_eq!(shift_months(t, -2), Some(datetime!(2023-11-30 00:00:00)));
        assert_eq!(shift_months(t, 1), Some(datetime!(2024-02-29 00:00:00)));
    }

    proptest! {
        #[test]
        fn canonical_round_trip(secs in 0i64..4_102_444_800, now_secs in 0i64..4_102_444_800) {
            let p = parser();
            let t = OffsetDateTime::from_unix_timestamp(secs).unwrap();
            let now = OffsetDateTime::from_unix_timestamp(now_secs).unwrap();
            let text = p.format(t);
            prop_assert_eq!(p.parse(&text, now).unwrap(), t);
            prop_assert_eq!(p.format(p.parse(&text, now).unwrap()), text);
        }
    }
}
