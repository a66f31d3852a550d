//! Upload-date resolution for the site's chapter lists.
//!
//! The site prints either "Today h:mm AM", "Yesterday h:mm PM" or an absolute "Mon D, YYYY".
//! Results are epoch milliseconds computed in the time zone of the injected `now`. Each date takes
//! the offset its zone has on that date, so a `DateTime<Local>` resolves across DST correctly.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Timelike};

const TODAY: &str = "Today";
const YESTERDAY: &str = "Yesterday";
const TIME_OF_DAY_FORMAT: &str = "%I:%M %p";
const ABSOLUTE_DATE_FORMAT: &str = "%b %d, %Y";

/// Resolve site date text to epoch milliseconds, or 0 when the text matches no known pattern.
pub fn resolve<Tz: TimeZone>(text: &str, now: &DateTime<Tz>) -> i64 {
    try_resolve(text, now).unwrap_or(0)
}

/// Like [resolve] but reports unrecognised text as `None` instead of the 0 sentinel.
pub fn try_resolve<Tz: TimeZone>(text: &str, now: &DateTime<Tz>) -> Option<i64> {
    // Keyword match is case-sensitive.
    if text.contains(TODAY) {
        return relative_day(text, TODAY, now, 0);
    }
    if text.contains(YESTERDAY) {
        return relative_day(text, YESTERDAY, now, 1);
    }
    let date = NaiveDate::parse_from_str(text.trim(), ABSOLUTE_DATE_FORMAT).ok()?;
    local_midnight(&now.timezone(), date)
}

/// Start of the day `days_back` before `now`, plus the time of day left after removing `keyword`.
/// An unparseable time of day still yields the start of that day.
fn relative_day<Tz: TimeZone>(
    text: &str,
    keyword: &str,
    now: &DateTime<Tz>,
    days_back: u64,
) -> Option<i64> {
    let day = now.date_naive().checked_sub_days(Days::new(days_back))?;
    let start = local_midnight(&now.timezone(), day)?;
    let remainder = text.replace(keyword, "");
    match NaiveTime::parse_from_str(remainder.trim(), TIME_OF_DAY_FORMAT) {
        Ok(time) => Some(start + i64::from(time.num_seconds_from_midnight()) * 1000),
        Err(_) => Some(start),
    }
}

fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Option<i64> {
    let midnight = date.and_hms_opt(0, 0, 0)?;
    tz.from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.timestamp_millis())
}
