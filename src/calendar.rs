//! Calendar range math for the month/week/day views: grid layout, the
//! Sunday-starting week window, and cursor navigation.

use chrono::{Datelike, Days, Months, NaiveDate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Month,
    Week,
    Day,
}

impl ViewMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "month" => Some(ViewMode::Month),
            "week" => Some(ViewMode::Week),
            "day" => Some(ViewMode::Day),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ViewMode::Month => "month",
            ViewMode::Week => "week",
            ViewMode::Day => "day",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Prev,
    Next,
}

impl Direction {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "prev" => Some(Direction::Prev),
            "next" => Some(Direction::Next),
            _ => None,
        }
    }
}

/// First day of the Sunday-starting week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date.checked_sub_days(Days::new(u64::from(date.weekday().num_days_from_sunday())))
        .unwrap_or(date)
}

/// First and last calendar day of the month containing `cursor`.
pub fn month_bounds(cursor: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = NaiveDate::from_ymd_opt(cursor.year(), cursor.month(), 1).unwrap_or(cursor);
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|d| d.checked_sub_days(Days::new(1)))
        .unwrap_or(first);
    (first, last)
}

/// 7-column rows covering the displayed month; `None` pads the cells before
/// the 1st and after the last day so every row is a full week.
pub fn month_grid(cursor: NaiveDate) -> Vec<Vec<Option<NaiveDate>>> {
    let (first, last) = month_bounds(cursor);
    let lead = first.weekday().num_days_from_sunday() as usize;

    let mut cells: Vec<Option<NaiveDate>> = vec![None; lead];
    let mut day = first;
    while day <= last {
        cells.push(Some(day));
        day = match day.succ_opt() {
            Some(d) => d,
            None => break,
        };
    }
    while cells.len() % 7 != 0 {
        cells.push(None);
    }

    cells.chunks(7).map(|week| week.to_vec()).collect()
}

/// Moves the navigation cursor one step in `direction`: a calendar month
/// (clamped to the end of shorter months), 7 days, or 1 day.
pub fn shift_cursor(mode: ViewMode, cursor: NaiveDate, direction: Direction) -> NaiveDate {
    let shifted = match (mode, direction) {
        (ViewMode::Month, Direction::Prev) => cursor.checked_sub_months(Months::new(1)),
        (ViewMode::Month, Direction::Next) => cursor.checked_add_months(Months::new(1)),
        (ViewMode::Week, Direction::Prev) => cursor.checked_sub_days(Days::new(7)),
        (ViewMode::Week, Direction::Next) => cursor.checked_add_days(Days::new(7)),
        (ViewMode::Day, Direction::Prev) => cursor.checked_sub_days(Days::new(1)),
        (ViewMode::Day, Direction::Next) => cursor.checked_add_days(Days::new(1)),
    };
    shifted.unwrap_or(cursor)
}
