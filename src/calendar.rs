use chrono::{Datelike, NaiveDate};
use serde::Serialize;

pub const DAYS_PER_WEEK: usize = 7;
pub const MAX_WEEK_ROWS: usize = 6;

/// Position of a calendar day relative to "today". `Future` cells accept no
/// marking interaction at any layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DayClass {
    Past,
    Today,
    Future,
}

impl DayClass {
    pub fn of(date: NaiveDate, today: NaiveDate) -> Self {
        if date > today {
            DayClass::Future
        } else if date == today {
            DayClass::Today
        } else {
            DayClass::Past
        }
    }

    pub fn accepts_marking(self) -> bool {
        !matches!(self, DayClass::Future)
    }
}

/// Today in the daemon's local timezone. `CAMPUSD_TODAY` (YYYY-MM-DD)
/// overrides the clock for scripted/debug runs.
pub fn today() -> NaiveDate {
    if let Ok(raw) = std::env::var("CAMPUSD_TODAY") {
        if let Ok(d) = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
            return d;
        }
    }
    chrono::Local::now().date_naive()
}

pub fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let (ny, nm) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    Some(NaiveDate::from_ymd_opt(ny, nm, 1)?.pred_opt()?.day())
}

/// Week-major month grid, Sunday-first. The first row is left-padded with
/// `None` up to the weekday of day 1; rows stop as soon as the month's days
/// are exhausted, so there is never a trailing all-empty week. Pure in
/// (year, month) and cheap, so callers re-derive it instead of caching.
pub fn build_month_grid(year: i32, month: u32) -> Option<Vec<[Option<NaiveDate>; DAYS_PER_WEEK]>> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let lead = first.weekday().num_days_from_sunday() as usize;
    let days = days_in_month(year, month)?;

    let mut grid = Vec::new();
    let mut day = 1_u32;
    for row in 0..MAX_WEEK_ROWS {
        if day > days {
            break;
        }
        let mut week = [None; DAYS_PER_WEEK];
        for (col, cell) in week.iter_mut().enumerate() {
            if row == 0 && col < lead {
                continue;
            }
            if day > days {
                break;
            }
            *cell = NaiveDate::from_ymd_opt(year, month, day);
            day += 1;
        }
        grid.push(week);
    }
    Some(grid)
}
