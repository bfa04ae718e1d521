//! Time zone rules for the canonical form and wall-clock phrases.
//!
//! Offsets are looked up per instant, so a summer date read in a winter
//! session gets the summer offset. Instants stay `time::OffsetDateTime`;
//! zone rules come from chrono (`Local` for the system zone, `chrono_tz::Tz`
//! for a named one).

use chrono::{NaiveDate, NaiveDateTime, Offset, TimeZone};
use chrono_tz::Tz;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    /// The system zone, daylight-saving transitions included.
    Local,
    /// An IANA zone such as `Europe/Berlin`.
    Named(Tz),
    Fixed(UtcOffset),
}

impl From<UtcOffset> for Zone {
    fn from(offset: UtcOffset) -> Self {
        Zone::Fixed(offset)
    }
}

impl From<Tz> for Zone {
    fn from(tz: Tz) -> Self {
        Zone::Named(tz)
    }
}

impl Zone {
    /// The offset in effect at `instant`.
    pub fn offset_at(&self, instant: OffsetDateTime) -> UtcOffset {
        if let Zone::Fixed(offset) = self {
            return *offset;
        }
        match chrono::DateTime::from_timestamp(instant.unix_timestamp(), 0) {
            Some(utc) => seconds_to_offset(self.utc_offset_seconds(&utc.naive_utc())),
            None => UtcOffset::UTC,
        }
    }

    /// Place a wall-clock reading on the timeline.
    ///
    /// A reading that occurs twice (clocks going back) takes the earlier
    /// instant. A reading skipped by clocks going forward is read with the
    /// offset from before the jump, so it lands just past the transition.
    pub fn resolve(&self, wall: PrimitiveDateTime) -> Option<OffsetDateTime> {
        if let Zone::Fixed(offset) = self {
            return Some(wall.assume_offset(*offset));
        }
        let naive = to_naive(wall)?;
        let seconds = match self.earliest_offset_seconds(&naive) {
            Some(seconds) => seconds,
            None => {
                let before = naive.checked_sub_signed(chrono::Duration::days(1))?;
                self.utc_offset_seconds(&before)
            }
        };
        Some(wall.assume_offset(UtcOffset::from_whole_seconds(seconds).ok()?))
    }

    fn utc_offset_seconds(&self, utc: &NaiveDateTime) -> i32 {
        match self {
            Zone::Local => chrono::Local
                .offset_from_utc_datetime(utc)
                .fix()
                .local_minus_utc(),
            Zone::Named(tz) => tz.offset_from_utc_datetime(utc).fix().local_minus_utc(),
            Zone::Fixed(offset) => offset.whole_seconds(),
        }
    }

    fn earliest_offset_seconds(&self, local: &NaiveDateTime) -> Option<i32> {
        match self {
            Zone::Local => chrono::Local
                .offset_from_local_datetime(local)
                .earliest()
                .map(|o| o.fix().local_minus_utc()),
            Zone::Named(tz) => tz
                .offset_from_local_datetime(local)
                .earliest()
                .map(|o| o.fix().local_minus_utc()),
            Zone::Fixed(offset) => Some(offset.whole_seconds()),
        }
    }
}

fn seconds_to_offset(seconds: i32) -> UtcOffset {
    UtcOffset::from_whole_seconds(seconds).unwrap_or(UtcOffset::UTC)
}

fn to_naive(wall: PrimitiveDateTime) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(
        wall.year(),
        u32::from(u8::from(wall.month())),
        u32::from(wall.day()),
    )?
    .and_hms_nano_opt(
        u32::from(wall.hour()),
        u32::from(wall.minute()),
        u32::from(wall.second()),
        wall.nanosecond(),
    )
}
