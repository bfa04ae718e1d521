//! Natural-language fallback for time expressions.
//!
//! Handles the phrasing people type when they are not thinking about
//! formats:
//! - Day words: `today`, `tomorrow`, `yesterday`, optionally `at 5pm`
//! - Times of day: `15:30`, `15:30:10`, `5pm`, `5:30 pm`, `noon`, `midnight`
//! - Long-form offsets: `3 hours ago`, `in 2 days`, `a week ago`
//! - Dates: `2024-01-31`, RFC 3339 date-times

use crate::timerange::parser::shift_months;
use regex::Regex;
use std::sync::OnceLock;
use time::format_description::well_known::Rfc3339;
use time::{Date, Duration, Month, OffsetDateTime, PrimitiveDateTime, Time};

/// What a phrase resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaturalTime {
    /// A point on the timeline, e.g. `3 hours ago` or an RFC 3339 timestamp.
    Instant(OffsetDateTime),
    /// A wall-clock reading such as `tomorrow at 9am`, placed in the user's
    /// zone by the caller with the offset in effect on that date.
    WallClock(PrimitiveDateTime),
}

/// A best-effort parser for free-form phrases.
///
/// `now` is expressed in the user's current offset, so day words resolve
/// against the user's calendar day.
pub trait NaturalLanguageParser: Send + Sync {
    fn parse(&self, text: &str, now: OffsetDateTime) -> Option<NaturalTime>;
}

fn wall_clock(at: OffsetDateTime) -> PrimitiveDateTime {
    PrimitiveDateTime::new(at.date(), at.time())
}

/// Regex-driven default used when no other engine is plugged in.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinNaturalParser;

fn patterns() -> &'static NaturalPatterns {
    static PATTERNS: OnceLock<NaturalPatterns> = OnceLock::new();
    PATTERNS.get_or_init(NaturalPatterns::new)
}

struct NaturalPatterns {
    day_word: Regex,
    time_24h: Regex,
    time_12h_bare: Regex,
    n_units_ago: Regex,
    in_n_units: Regex,
    a_unit_ago: Regex,
    iso_date: Regex,
}

impl NaturalPatterns {
    fn new() -> Self {
        const UNITS: &str = "second|minute|hour|day|week|month|year";
        Self {
            // "tomorrow", "yesterday at 9am"
            day_word: Regex::new(r"(?i)^(today|tomorrow|yesterday)(?:\s+at\s+(.+))?$")
                .expect("static pattern is valid"),
            // 15:30, 15:30:10, 3:30pm
            time_24h: Regex::new(r"(?i)^(\d{1,2}):(\d{2})(?::(\d{2}))?\s*(am|pm)?$")
                .expect("static pattern is valid"),
            // 9am, 12 pm
            time_12h_bare: Regex::new(r"(?i)^(\d{1,2})\s*(am|pm)$")
                .expect("static pattern is valid"),
            n_units_ago: Regex::new(&format!(r"(?i)^(\d+)\s+({UNITS})s?\s+ago$"))
                .expect("static pattern is valid"),
            in_n_units: Regex::new(&format!(r"(?i)^in\s+(\d+)\s+({UNITS})s?$"))
                .expect("static pattern is valid"),
            a_unit_ago: Regex::new(&format!(r"(?i)^(?:a|an|one)\s+({UNITS})\s+ago$"))
                .expect("static pattern is valid"),
            iso_date: Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$")
                .expect("static pattern is valid"),
        }
    }
}

impl NaturalLanguageParser for BuiltinNaturalParser {
    fn parse(&self, text: &str, now: OffsetDateTime) -> Option<NaturalTime> {
        let s = text.trim();
        let p = patterns();

        if let Some(caps) = p.day_word.captures(s) {
            let shift = match caps[1].to_ascii_lowercase().as_str() {
                "tomorrow" => Duration::days(1),
                "yesterday" => Duration::days(-1),
                _ => Duration::ZERO,
            };
            let date = now.date().checked_add(shift)?;
            let at = match caps.get(2) {
                Some(m) => parse_time_of_day(m.as_str())?,
                None => Time::MIDNIGHT,
            };
            return Some(NaturalTime::WallClock(PrimitiveDateTime::new(date, at)));
        }

        if let Some(at) = parse_time_of_day(s.strip_prefix("at ").unwrap_or(s)) {
            return Some(NaturalTime::WallClock(PrimitiveDateTime::new(now.date(), at)));
        }

        if let Some(caps) = p.n_units_ago.captures(s) {
            let n: i64 = caps[1].parse().ok()?;
            return offset_by_unit(now, n.checked_neg()?, &caps[2]);
        }
        if let Some(caps) = p.in_n_units.captures(s) {
            let n: i64 = caps[1].parse().ok()?;
            return offset_by_unit(now, n, &caps[2]);
        }
        if let Some(caps) = p.a_unit_ago.captures(s) {
            return offset_by_unit(now, -1, &caps[1]);
        }

        if let Some(caps) = p.iso_date.captures(s) {
            let year: i32 = caps[1].parse().ok()?;
            let month = Month::try_from(caps[2].parse::<u8>().ok()?).ok()?;
            let day: u8 = caps[3].parse().ok()?;
            let date = Date::from_calendar_date(year, month, day).ok()?;
            return Some(NaturalTime::WallClock(date.midnight()));
        }

        OffsetDateTime::parse(s, &Rfc3339)
            .ok()
            .map(NaturalTime::Instant)
    }
}

fn parse_time_of_day(s: &str) -> Option<Time> {
    let s = s.trim();
    match s.to_ascii_lowercase().as_str() {
        "noon" => return Time::from_hms(12, 0, 0).ok(),
        "midnight" => return Some(Time::MIDNIGHT),
        _ => {}
    }
    let p = patterns();
    if let Some(caps) = p.time_24h.captures(s) {
        let hour: u8 = caps[1].parse().ok()?;
        let minute: u8 = caps[2].parse().ok()?;
        let second: u8 = caps.get(3).map_or(Some(0), |m| m.as_str().parse().ok())?;
        let hour = match caps.get(4) {
            Some(meridiem) => to_24h(hour, meridiem.as_str())?,
            None => hour,
        };
        return Time::from_hms(hour, minute, second).ok();
    }
    if let Some(caps) = p.time_12h_bare.captures(s) {
        let hour = to_24h(caps[1].parse().ok()?, &caps[2])?;
        return Time::from_hms(hour, 0, 0).ok();
    }
    None
}

fn to_24h(hour: u8, meridiem: &str) -> Option<u8> {
    if !(1..=12).contains(&hour) {
        return None;
    }
    let pm = meridiem.eq_ignore_ascii_case("pm");
    Some(match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, false) => h,
        (h, true) => h + 12,
    })
}

/// Fixed-length units move the instant; months and years move the calendar
/// and keep the time of day.
fn offset_by_unit(now: OffsetDateTime, n: i64, unit: &str) -> Option<NaturalTime> {
    let seconds_per_unit = match unit.to_ascii_lowercase().as_str() {
        "second" => 1,
        "minute" => 60,
        "hour" => 3_600,
        "day" => 86_400,
        "week" => 604_800,
        "month" => return shift_months(wall_clock(now), n).map(NaturalTime::WallClock),
        "year" => {
            return shift_months(wall_clock(now), n.checked_mul(12)?).map(NaturalTime::WallClock)
        }
        _ => return None,
    };
    now.checked_add(Duration::seconds(n.checked_mul(seconds_per_unit)?))
        .map(NaturalTime::Instant)
}
