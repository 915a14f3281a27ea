use chrono::{Duration, NaiveDateTime, NaiveTime};

pub mod data;
pub mod session;

pub trait FormatToApiFmt {
    fn to_api_format(&self) -> String;
}

impl FormatToApiFmt for NaiveDateTime {
    fn to_api_format(&self) -> String {
        // The portal wants day-first local dates, e.g. "08.03.2024 00:00"
        self.format("%d.%m.%Y %H:%M").to_string()
    }
}

/// Days covered by a data request, ending at today's midnight.
const WINDOW_DAYS: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
}

impl DateWindow {
    /// `[now - 2 days, now)`, both ends truncated to midnight.
    pub fn ending_at(now: NaiveDateTime) -> Self {
        let to = now.date().and_time(NaiveTime::MIN);
        DateWindow {
            from: to - Duration::days(WINDOW_DAYS),
            to,
        }
    }
}
