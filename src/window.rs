use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use log::debug;

use crate::config::Config;

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// The most recent day whose listing is out at `now`: today once the
/// archive's local clock has passed `cutoff`, otherwise yesterday.
pub fn anchor_date(now: DateTime<Utc>, cutoff: NaiveTime, tz: Tz) -> NaiveDate {
    let local = now.with_timezone(&tz);
    let today = local.date_naive();
    if local.time() >= cutoff {
        today
    } else {
        today.pred_opt().unwrap_or(today)
    }
}

/// The `count` most recent weekdays up to the anchor date, newest first.
pub fn business_days(now: DateTime<Utc>, count: usize, cutoff: NaiveTime, tz: Tz) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(count);
    let mut current = Some(anchor_date(now, cutoff, tz));
    while days.len() < count {
        let Some(date) = current else { break };
        if !is_weekend(date) {
            days.push(date);
        }
        current = date.checked_sub_days(Days::new(1));
    }
    debug!(
        "Business-day window at {}: {:?} .. {:?}",
        now,
        days.last(),
        days.first()
    );
    days
}

/// Window from the configured day count, cutoff and archive time zone.
pub fn window_for(config: &Config, now: DateTime<Utc>) -> Vec<NaiveDate> {
    business_days(now, config.days_to_show, config.cutoff, config.timezone)
}
