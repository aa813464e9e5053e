//! Eastern-session time helpers shared by the screener and universe.
//!
//! Grounded on `original_source/services/universe/service.py` (the
//! `EASTERN = ZoneInfo("America/New_York")` constant, `_reset_session`'s
//! date comparison, and `_schedule_next_refresh`'s adaptive cadence).
//! `chrono-tz` stands in for `zoneinfo.ZoneInfo` so DST transitions are
//! handled by the tz database rather than hand-rolled offset math.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::America::New_York;
use chrono_tz::Tz;

pub const EASTERN: Tz = New_York;

/// The Eastern calendar date `ts` falls on, for session-boundary comparison.
pub fn eastern_date(ts: DateTime<Utc>) -> NaiveDate {
    ts.with_timezone(&EASTERN).date_naive()
}

/// Adaptive screener refresh cadence: every 5 minutes before 10:30 ET,
/// every 15 minutes until 12:00 ET, then every 60 minutes. `now` is clamped
/// forward to the 9:30 ET market open before the cadence is applied, so a
/// pre-market tick still schedules the first refresh at a sane time.
pub fn next_refresh_after(now: DateTime<Utc>) -> DateTime<Utc> {
    let eastern_now = now.with_timezone(&EASTERN);
    let market_open = eastern_now
        .date_naive()
        .and_time(NaiveTime::from_hms_opt(9, 30, 0).unwrap());
    let market_open = EASTERN.from_local_datetime(&market_open).single().unwrap_or(eastern_now);
    let effective = if eastern_now < market_open { market_open } else { eastern_now };

    let mid_morning = NaiveTime::from_hms_opt(10, 30, 0).unwrap();
    let midday = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
    let interval_minutes = if effective.time() < mid_morning {
        5
    } else if effective.time() < midday {
        15
    } else {
        60
    };

    (effective + chrono::Duration::minutes(interval_minutes)).with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, mi, 0).unwrap()
    }

    #[test]
    fn pre_market_schedules_relative_to_open() {
        // 08:00 ET on a winter date (EST, UTC-5) -> 13:00 UTC.
        let pre_market = utc(2026, 1, 5, 13, 0);
        let next = next_refresh_after(pre_market);
        // Clamped to 9:30 ET open, then +5m -> 9:35 ET == 14:35 UTC.
        assert_eq!(next, utc(2026, 1, 5, 14, 35));
    }

    #[test]
    fn early_session_is_five_minutes() {
        // 9:35 ET == 14:35 UTC in January (EST).
        let now = utc(2026, 1, 5, 14, 35);
        let next = next_refresh_after(now);
        assert_eq!(next, utc(2026, 1, 5, 14, 40));
    }

    #[test]
    fn mid_session_is_fifteen_minutes() {
        // 11:00 ET == 16:00 UTC.
        let now = utc(2026, 1, 5, 16, 0);
        let next = next_refresh_after(now);
        assert_eq!(next, utc(2026, 1, 5, 16, 15));
    }

    #[test]
    fn late_session_is_sixty_minutes() {
        // 13:00 ET == 18:00 UTC.
        let now = utc(2026, 1, 5, 18, 0);
        let next = next_refresh_after(now);
        assert_eq!(next, utc(2026, 1, 5, 19, 0));
    }

    #[test]
    fn eastern_date_changes_at_the_session_boundary_not_wall_clock() {
        // 23:30 ET on Jan 5 == 04:30 UTC Jan 6.
        let late_night = utc(2026, 1, 6, 4, 30);
        assert_eq!(eastern_date(late_night), NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
    }
}
