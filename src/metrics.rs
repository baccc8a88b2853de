//! Dashboard aggregation: fold every lesson of every student into the five
//! monthly/overdue totals. Pure function of (students, today); performs no
//! writes. Malformed lesson rows are skipped with a warning instead of
//! failing the whole computation.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::status::LessonStatus;

#[derive(Debug, Clone)]
pub struct LessonRecord {
    pub id: String,
    pub date: String,
    pub value: f64,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct StudentRecord {
    pub name: String,
    pub payment_day: Option<i64>,
    pub lessons: Vec<LessonRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    pub owed_from_completed: f64,
    pub received_this_month: f64,
    pub overdue_amount: f64,
    pub lesson_count_this_month: i64,
    pub absence_count_this_month: i64,
}

pub fn dashboard_metrics(students: &[StudentRecord], today: NaiveDate) -> DashboardMetrics {
    let mut totals = DashboardMetrics::default();

    for student in students {
        // A payment day outside 1-31 means "no overdue threshold within the
        // current month"; prior months are still overdue.
        let payment_day = student.payment_day.filter(|d| (1..=31).contains(d));

        for lesson in &student.lessons {
            let Ok(date) = NaiveDate::parse_from_str(&lesson.date, "%Y-%m-%d") else {
                log::warn!(
                    "skipping lesson {} for {}: unparsable date {:?}",
                    lesson.id,
                    student.name,
                    lesson.date
                );
                continue;
            };
            let Some(status) = LessonStatus::parse(&lesson.status) else {
                log::warn!(
                    "skipping lesson {} for {}: unknown status {:?}",
                    lesson.id,
                    student.name,
                    lesson.status
                );
                continue;
            };

            let in_current_month = date.year() == today.year() && date.month() == today.month();
            if in_current_month {
                totals.lesson_count_this_month += 1;
                match status {
                    LessonStatus::Completed => totals.owed_from_completed += lesson.value,
                    LessonStatus::Paid => totals.received_this_month += lesson.value,
                    LessonStatus::Absent => totals.absence_count_this_month += 1,
                    LessonStatus::Pending => {}
                }
            }

            if status != LessonStatus::Paid && status != LessonStatus::Absent {
                let before_current_month =
                    (date.year(), date.month()) < (today.year(), today.month());
                let past_payment_day = in_current_month
                    && payment_day.map_or(false, |d| i64::from(today.day()) > d);
                if before_current_month || past_payment_day {
                    totals.overdue_amount += lesson.value;
                }
            }
        }
    }

    totals
}
