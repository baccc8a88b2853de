//! Batch lesson generation: expand a date range and a weekday selection into
//! concrete lesson drafts, validating inputs before any date iteration.

use chrono::{Datelike, NaiveDate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchError {
    InvalidTime,
    InvalidDuration,
    InvalidRange,
    EmptyBatch,
}

impl BatchError {
    pub fn code(self) -> &'static str {
        match self {
            BatchError::InvalidTime => "invalid_time",
            BatchError::InvalidDuration => "invalid_duration",
            BatchError::InvalidRange => "invalid_range",
            BatchError::EmptyBatch => "empty_batch",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            BatchError::InvalidTime => "time must be HH:MM with hour 0-23 and minute 0-59",
            BatchError::InvalidDuration => "duration must be a positive number of minutes",
            BatchError::InvalidRange => "start date must not be after end date",
            BatchError::EmptyBatch => "no date in the range matches the selected weekdays",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LessonDraft {
    pub date: NaiveDate,
    pub time: String,
    pub duration_minutes: i64,
    pub value: f64,
}

/// Normalizes "H:M"-style input to zero-padded "HH:MM". `None` when either
/// component is non-numeric or out of bounds.
pub fn normalize_time(raw: &str) -> Option<String> {
    let (h, m) = raw.trim().split_once(':')?;
    let hour: u32 = h.trim().parse().ok()?;
    let minute: u32 = m.trim().parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some(format!("{:02}:{:02}", hour, minute))
}

/// Emits one draft per date in `start..=end` whose day-of-week is in
/// `weekdays` (0=Sunday..6=Saturday), in ascending calendar order. `value`
/// is the owning student's current lesson value.
pub fn expand_batch(
    start: NaiveDate,
    end: NaiveDate,
    time: &str,
    duration_minutes: i64,
    weekdays: &[u32],
    value: f64,
) -> Result<Vec<LessonDraft>, BatchError> {
    let time = normalize_time(time).ok_or(BatchError::InvalidTime)?;
    if duration_minutes <= 0 {
        return Err(BatchError::InvalidDuration);
    }
    if start > end {
        return Err(BatchError::InvalidRange);
    }

    let mut drafts = Vec::new();
    let mut day = start;
    while day <= end {
        if weekdays.contains(&day.weekday().num_days_from_sunday()) {
            drafts.push(LessonDraft {
                date: day,
                time: time.clone(),
                duration_minutes,
                value,
            });
        }
        day = match day.succ_opt() {
            Some(d) => d,
            None => break,
        };
    }

    if drafts.is_empty() {
        return Err(BatchError::EmptyBatch);
    }
    Ok(drafts)
}
