//! Market session resolution.
//!
//! `resolve_session` is pure: it depends only on the supplied instant and
//! calendar, so any timestamp (weekends and holidays included) can be injected.
//!
//! Buckets, evaluated in exchange-local time:
//! - before the open → `PreMarket`, previous session's close
//! - `[open, close)` → `Intraday`, today's open
//! - at or after the close → `AfterHours`, today's close
//!
//! Non-trading days resolve like pre-market: the last completed session's close.

use crate::domain::{MarketStatus, PriceBasis};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Search limit when walking back to a trading day.
const MAX_LOOKBACK_DAYS: u32 = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionBucket {
    PreMarket,
    Intraday,
    AfterHours,
}

impl SessionBucket {
    /// Reference price that stands in for "entry" in this bucket.
    pub fn entry_basis(&self) -> PriceBasis {
        match self {
            SessionBucket::PreMarket => PriceBasis::PreviousClose,
            SessionBucket::Intraday => PriceBasis::TodayOpen,
            SessionBucket::AfterHours => PriceBasis::TodayClose,
        }
    }

    /// Reference price for exits. During the session the live price is used;
    /// outside it, the last completed close.
    pub fn exit_basis(&self) -> PriceBasis {
        match self {
            SessionBucket::PreMarket => PriceBasis::PreviousClose,
            SessionBucket::Intraday => PriceBasis::Live,
            SessionBucket::AfterHours => PriceBasis::TodayClose,
        }
    }
}

/// Calendar collaborator: local clock, trading days, session hours.
pub trait ExchangeCalendar: Send + Sync {
    /// Convert an instant to exchange-local wall time.
    fn local_time(&self, now: DateTime<Utc>) -> NaiveDateTime;

    fn is_trading_day(&self, date: NaiveDate) -> bool;

    fn session_open(&self) -> NaiveTime;

    fn session_close(&self) -> NaiveTime;

    /// Most recent trading day strictly before `date`.
    fn previous_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut day = date;
        for _ in 0..MAX_LOOKBACK_DAYS {
            day = match day.pred_opt() {
                Some(d) => d,
                None => return day,
            };
            if self.is_trading_day(day) {
                return day;
            }
        }
        day
    }
}

/// Result of resolving an instant against the calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSession {
    pub bucket: SessionBucket,
    /// Session whose prices apply: today, or the last completed one.
    pub trading_date: NaiveDate,
    pub local_time: NaiveDateTime,
    /// False on weekends and holidays.
    pub market_day: bool,
}

impl ResolvedSession {
    pub fn entry_basis(&self) -> PriceBasis {
        self.bucket.entry_basis()
    }

    pub fn exit_basis(&self) -> PriceBasis {
        self.bucket.exit_basis()
    }

    pub fn description(&self) -> String {
        if !self.market_day {
            return format!("Market closed - using {} close", self.trading_date);
        }
        match self.bucket {
            SessionBucket::PreMarket => "Pre-market - using previous close".to_string(),
            SessionBucket::Intraday => "Market open - using today open".to_string(),
            SessionBucket::AfterHours => "After hours - using today close".to_string(),
        }
    }

    pub fn market_status(&self) -> MarketStatus {
        MarketStatus {
            bucket: self.bucket,
            trading_date: self.trading_date,
            description: self.description(),
        }
    }
}

pub fn resolve_session(now: DateTime<Utc>, calendar: &dyn ExchangeCalendar) -> ResolvedSession {
    let local = calendar.local_time(now);
    let today = local.date();

    if !calendar.is_trading_day(today) {
        return ResolvedSession {
            bucket: SessionBucket::PreMarket,
            trading_date: calendar.previous_trading_day(today),
            local_time: local,
            market_day: false,
        };
    }

    let time = local.time();
    let (bucket, trading_date) = if time < calendar.session_open() {
        (SessionBucket::PreMarket, calendar.previous_trading_day(today))
    } else if time < calendar.session_close() {
        (SessionBucket::Intraday, today)
    } else {
        (SessionBucket::AfterHours, today)
    };

    ResolvedSession {
        bucket,
        trading_date,
        local_time: local,
        market_day: true,
    }
}

// ─── US equity calendar ──────────────────────────────────────────────

const EST_OFFSET_HOURS: i64 = -5;
const EDT_OFFSET_HOURS: i64 = -4;

/// US equities: New York time with daylight saving, Monday–Friday, plus an
/// explicit holiday list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsEquityCalendar {
    open: NaiveTime,
    close: NaiveTime,
    holidays: BTreeSet<NaiveDate>,
}

impl Default for UsEquityCalendar {
    fn default() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or(NaiveTime::MIN),
            close: NaiveTime::from_hms_opt(16, 0, 0).unwrap_or(NaiveTime::MIN),
            holidays: BTreeSet::new(),
        }
    }
}

impl UsEquityCalendar {
    pub fn new(open: NaiveTime, close: NaiveTime) -> Self {
        Self {
            open,
            close,
            holidays: BTreeSet::new(),
        }
    }

    pub fn with_holidays(mut self, holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(holidays);
        self
    }

    pub fn holidays(&self) -> &BTreeSet<NaiveDate> {
        &self.holidays
    }

    /// UTC offset in hours for New York at the given instant.
    ///
    /// DST runs from 02:00 local on the second Sunday of March to 02:00 local
    /// on the first Sunday of November.
    pub fn new_york_offset_hours(now: DateTime<Utc>) -> i64 {
        let year = now.year();
        let start = NaiveDate::from_weekday_of_month_opt(year, 3, Weekday::Sun, 2)
            .and_then(|d| d.and_hms_opt(7, 0, 0));
        let end = NaiveDate::from_weekday_of_month_opt(year, 11, Weekday::Sun, 1)
            .and_then(|d| d.and_hms_opt(6, 0, 0));

        match (start, end) {
            (Some(start), Some(end)) => {
                let utc = now.naive_utc();
                if utc >= start && utc < end {
                    EDT_OFFSET_HOURS
                } else {
                    EST_OFFSET_HOURS
                }
            }
            _ => EST_OFFSET_HOURS,
        }
    }
}

impl ExchangeCalendar for UsEquityCalendar {
    fn local_time(&self, now: DateTime<Utc>) -> NaiveDateTime {
        now.naive_utc() + chrono::Duration::hours(Self::new_york_offset_hours(now))
    }

    fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    fn session_open(&self) -> NaiveTime {
        self.open
    }

    fn session_close(&self) -> NaiveTime {
        self.close
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn pre_market_uses_previous_close() {
        // Tue 2025-06-10 08:00 EDT
        let s = resolve_session(utc(2025, 6, 10, 12, 0), &UsEquityCalendar::default());
        assert_eq!(s.bucket, SessionBucket::PreMarket);
        assert_eq!(s.entry_basis(), PriceBasis::PreviousClose);
        assert_eq!(s.trading_date, date(2025, 6, 9));
        assert!(s.market_day);
    }

    #[test]
    fn intraday_uses_today_open() {
        // 11:00 EDT
        let s = resolve_session(utc(2025, 6, 10, 15, 0), &UsEquityCalendar::default());
        assert_eq!(s.bucket, SessionBucket::Intraday);
        assert_eq!(s.entry_basis(), PriceBasis::TodayOpen);
        assert_eq!(s.trading_date, date(2025, 6, 10));
    }

    #[test]
    fn after_hours_uses_today_close() {
        // 17:00 EDT
        let s = resolve_session(utc(2025, 6, 10, 21, 0), &UsEquityCalendar::default());
        assert_eq!(s.bucket, SessionBucket::AfterHours);
        assert_eq!(s.entry_basis(), PriceBasis::TodayClose);
        assert_eq!(s.trading_date, date(2025, 6, 10));
    }

    #[test]
    fn session_boundaries_are_half_open() {
        let cal = UsEquityCalendar::default();
        // Winter: 09:30 EST = 14:30 UTC, 16:00 EST = 21:00 UTC
        assert_eq!(
            resolve_session(utc(2025, 1, 15, 14, 29), &cal).bucket,
            SessionBucket::PreMarket
        );
        assert_eq!(
            resolve_session(utc(2025, 1, 15, 14, 30), &cal).bucket,
            SessionBucket::Intraday
        );
        assert_eq!(
            resolve_session(utc(2025, 1, 15, 20, 59), &cal).bucket,
            SessionBucket::Intraday
        );
        assert_eq!(
            resolve_session(utc(2025, 1, 15, 21, 0), &cal).bucket,
            SessionBucket::AfterHours
        );
    }

    #[test]
    fn weekend_resolves_to_prior_friday() {
        // Sat 2025-06-14 11:00 EDT
        let s = resolve_session(utc(2025, 6, 14, 15, 0), &UsEquityCalendar::default());
        assert_eq!(s.trading_date, date(2025, 6, 13));
        assert_eq!(s.entry_basis(), PriceBasis::PreviousClose);
        assert!(!s.market_day);
        assert!(s.description().starts_with("Market closed"));
    }

    #[test]
    fn monday_pre_market_resolves_to_friday() {
        // Mon 2025-06-16 07:00 EDT
        let s = resolve_session(utc(2025, 6, 16, 11, 0), &UsEquityCalendar::default());
        assert_eq!(s.bucket, SessionBucket::PreMarket);
        assert_eq!(s.trading_date, date(2025, 6, 13));
    }

    #[test]
    fn holiday_skipped_when_walking_back() {
        let cal = UsEquityCalendar::default().with_holidays([date(2025, 7, 4)]);
        // Sat 2025-07-05: Friday is a holiday, so Thursday's close applies.
        let s = resolve_session(utc(2025, 7, 5, 15, 0), &cal);
        assert_eq!(s.trading_date, date(2025, 7, 3));

        // On the holiday itself, during normal hours.
        let s = resolve_session(utc(2025, 7, 4, 15, 0), &cal);
        assert!(!s.market_day);
        assert_eq!(s.trading_date, date(2025, 7, 3));
    }

    #[test]
    fn dst_transitions() {
        // 2025 DST: Mar 9 07:00 UTC to Nov 2 06:00 UTC
        assert_eq!(UsEquityCalendar::new_york_offset_hours(utc(2025, 3, 9, 6, 59)), -5);
        assert_eq!(UsEquityCalendar::new_york_offset_hours(utc(2025, 3, 9, 7, 0)), -4);
        assert_eq!(UsEquityCalendar::new_york_offset_hours(utc(2025, 11, 2, 5, 59)), -4);
        assert_eq!(UsEquityCalendar::new_york_offset_hours(utc(2025, 11, 2, 6, 0)), -5);
    }

    #[test]
    fn exit_basis_per_bucket() {
        assert_eq!(SessionBucket::Intraday.exit_basis(), PriceBasis::Live);
        assert_eq!(SessionBucket::AfterHours.exit_basis(), PriceBasis::TodayClose);
        assert_eq!(SessionBucket::PreMarket.exit_basis(), PriceBasis::PreviousClose);
    }
}
