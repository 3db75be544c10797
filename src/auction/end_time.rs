//! Free-text auction end-time parsing.
//!
//! Auction cards display close times in several shapes. Rules are tried
//! in order and the first match wins:
//!
//! 1. `MM/DD/YYYY h:mm AM` (numeric date with a meridiem time)
//! 2. `March 14 at 7:30 PM` (month name, day, optional year, time)
//! 3. `MM/DD/YYYY` (date only, taken as end of day)
//! 4. `3 days` (relative offset from now)

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use std::sync::LazyLock;

static DATE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})/(\d{1,2})/(\d{2,4})\b[\s,]*(?:at\s+)?(\d{1,2}):(\d{2})\s*([ap])\.?m\.?")
        .unwrap()
});

static MONTH_DAY_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s*(\d{4})?[\s,]*(?:at\s+)?(\d{1,2}):(\d{2})\s*([ap])\.?m\.?",
    )
    .unwrap()
});

static DATE_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{2,4})\b").unwrap());

static RELATIVE_DAYS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,3})\s*days?\b").unwrap());

/// Month-name dates without a year roll into next year once they are
/// further than this in the past.
const YEAR_ROLLOVER_DAYS: i64 = 180;

/// Parse an end time from free text, relative to `now`.
pub fn parse_end_time(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    parse_date_time(text)
        .or_else(|| parse_month_day_time(text, now))
        .or_else(|| parse_date_only(text))
        .or_else(|| parse_relative_days(text, now))
}

fn parse_date_time(text: &str) -> Option<NaiveDateTime> {
    let caps = DATE_TIME.captures(text)?;
    let date = numeric_date(&caps[1], &caps[2], &caps[3])?;
    let time = meridiem_time(&caps[4], &caps[5], &caps[6])?;
    Some(date.and_time(time))
}

fn parse_month_day_time(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let caps = MONTH_DAY_TIME.captures(text)?;
    let month = month_number(&caps[1])?;
    let day: u32 = caps[2].parse().ok()?;
    let time = meridiem_time(&caps[4], &caps[5], &caps[6])?;

    match caps.get(3) {
        Some(year) => {
            let year: i32 = year.as_str().parse().ok()?;
            Some(NaiveDate::from_ymd_opt(year, month, day)?.and_time(time))
        }
        None => {
            let this_year = NaiveDate::from_ymd_opt(now.year(), month, day)?.and_time(time);
            if now - this_year > Duration::days(YEAR_ROLLOVER_DAYS) {
                Some(NaiveDate::from_ymd_opt(now.year() + 1, month, day)?.and_time(time))
            } else {
                Some(this_year)
            }
        }
    }
}

fn parse_date_only(text: &str) -> Option<NaiveDateTime> {
    let caps = DATE_ONLY.captures(text)?;
    let date = numeric_date(&caps[1], &caps[2], &caps[3])?;
    date.and_hms_opt(23, 59, 59)
}

fn parse_relative_days(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let caps = RELATIVE_DAYS.captures(text)?;
    let days: i64 = caps[1].parse().ok()?;
    Some(now + Duration::days(days))
}

fn numeric_date(month: &str, day: &str, year: &str) -> Option<NaiveDate> {
    let month: u32 = month.parse().ok()?;
    let day: u32 = day.parse().ok()?;
    let mut year: i32 = year.parse().ok()?;
    if year < 100 {
        year += 2000;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

fn meridiem_time(hour: &str, minute: &str, meridiem: &str) -> Option<NaiveTime> {
    let hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.parse().ok()?;
    if !(1..=12).contains(&hour) {
        return None;
    }
    let pm = meridiem.eq_ignore_ascii_case("p");
    let hour24 = match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, false) => h,
        (h, true) => h + 12,
    };
    NaiveTime::from_hms_opt(hour24, minute, 0)
}

fn month_number(name: &str) -> Option<u32> {
    let month = match name.to_lowercase().get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}
