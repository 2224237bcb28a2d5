//! Pure views over store snapshots: urgency tiers, due-date labels and grade aggregates.

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};

use crate::models::{Assignment, Course, Priority};

/// Number of upcoming assignments shown on the dashboard.
pub const UPCOMING_LIMIT: usize = 4;

/// Whole days from `now` until `due`, truncated toward zero.
pub fn days_until(due: NaiveDateTime, now: NaiveDateTime) -> i64 {
    (due - now).num_days()
}

pub fn priority_for(due: NaiveDateTime, now: NaiveDateTime) -> Priority {
    let days = days_until(due, now);
    if days < 3 {
        Priority::High
    } else if days < 7 {
        Priority::Medium
    } else {
        Priority::Low
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueBucket {
    Overdue,
    DueToday,
    DueTomorrow,
    DueIn(i64),
}

impl fmt::Display for DueBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DueBucket::Overdue => f.write_str("Overdue"),
            DueBucket::DueToday => f.write_str("Due today"),
            DueBucket::DueTomorrow => f.write_str("Due tomorrow"),
            DueBucket::DueIn(days) => write!(f, "Due in {} days", days),
        }
    }
}

pub fn due_bucket(due: NaiveDateTime, now: NaiveDateTime) -> DueBucket {
    let days = days_until(due, now);
    if days < 0 {
        DueBucket::Overdue
    } else if days < 1 {
        DueBucket::DueToday
    } else if days < 2 {
        DueBucket::DueTomorrow
    } else {
        DueBucket::DueIn(days)
    }
}

/// How loudly a priority is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emphasis {
    Prominent,
    Default,
    Subtle,
}

pub fn priority_weight(priority: Priority) -> Emphasis {
    match priority {
        Priority::High => Emphasis::Prominent,
        Priority::Medium => Emphasis::Default,
        Priority::Low => Emphasis::Subtle,
    }
}

/// Mean grade mapped from a 0-100 scale onto 0-4, two decimals.
pub fn gpa(courses: &[Course]) -> String {
    if courses.is_empty() {
        return "0.00".to_string();
    }
    let total: f64 = courses.iter().map(|course| course.grade).sum();
    format!("{:.2}", total / (courses.len() as f64 * 25.0))
}

/// Incomplete assignments, soonest first.
pub fn upcoming(assignments: &[Assignment], limit: usize) -> Vec<&Assignment> {
    let mut open: Vec<&Assignment> = assignments.iter().filter(|a| !a.completed).collect();
    open.sort_by_key(|a| a.due_date);
    open.truncate(limit);
    open
}

#[derive(Debug, Clone)]
pub struct DayDeadlines<'a> {
    pub day: NaiveDate,
    pub assignments: Vec<&'a Assignment>,
}

/// Open deadlines for each day of the Monday-based week containing `today`.
pub fn week_deadlines(assignments: &[Assignment], today: NaiveDate) -> Vec<DayDeadlines<'_>> {
    let week_start = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    (0..7)
        .map(|offset| {
            let day = week_start + Duration::days(offset);
            let due = assignments
                .iter()
                .filter(|a| !a.completed && a.due_date.date() == day)
                .collect();
            DayDeadlines {
                day,
                assignments: due,
            }
        })
        .collect()
}
