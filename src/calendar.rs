//! iCalendar export of a study plan.

use anyhow::{anyhow, bail, Result};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use icalendar::{Alarm, Calendar, Component, Event, EventLike};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{StudyBlock, StudyPlan};

pub const REMINDER_MINUTES: i64 = 15;

static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})(?::(\d{2}))?(?::\d{2})?\s*([aApP]\.?[mM]\.?)?$").unwrap());

/// Parses `18:30`, `6:30 PM`, `6pm` and the like.
pub fn parse_clock(raw: &str) -> Option<NaiveTime> {
    let caps = TIME_RE.captures(raw.trim())?;
    let mut hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
    if let Some(meridiem) = caps.get(3) {
        if hour == 0 || hour > 12 {
            return None;
        }
        let pm = meridiem.as_str().to_ascii_lowercase().starts_with('p');
        hour = match (pm, hour) {
            (false, 12) => 0,
            (true, 12) => 12,
            (true, h) => h + 12,
            (false, h) => h,
        };
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Resolves a block's day: an ISO date, or the first matching weekday on or after `reference`.
pub fn resolve_day(day: &str, reference: NaiveDate) -> Option<NaiveDate> {
    let day = day.trim();
    if let Ok(date) = NaiveDate::parse_from_str(day, "%Y-%m-%d") {
        return Some(date);
    }
    let weekday: Weekday = day.parse().ok()?;
    let ahead = (7 + weekday.num_days_from_monday() as i64
        - reference.weekday().num_days_from_monday() as i64)
        % 7;
    Some(reference + Duration::days(ahead))
}

pub fn block_span(block: &StudyBlock, reference: NaiveDate) -> Result<(NaiveDateTime, NaiveDateTime)> {
    let date = resolve_day(&block.day, reference)
        .ok_or_else(|| anyhow!("Unrecognised day `{}` for {}", block.day, block.assignment))?;
    let start = parse_clock(&block.start_time)
        .ok_or_else(|| anyhow!("Unrecognised start time `{}`", block.start_time))?;
    let end = parse_clock(&block.end_time)
        .ok_or_else(|| anyhow!("Unrecognised end time `{}`", block.end_time))?;
    if end <= start {
        bail!(
            "Block for {} ends ({}) before it starts ({})",
            block.assignment,
            block.end_time,
            block.start_time
        );
    }
    Ok((date.and_time(start), date.and_time(end)))
}

/// Renders the plan as an `.ics` file: one event per block, each with a display alarm
/// [`REMINDER_MINUTES`] before it starts.
pub fn export_plan(plan: &StudyPlan) -> Result<String> {
    let reference = plan.generated_at.date();
    let mut calendar = Calendar::new();
    calendar.name("Agenda+ Study Plan");

    for block in &plan.blocks {
        let (start, end) = block_span(block, reference)?;
        let event = Event::new()
            .summary(&format!("Study: {}", block.assignment))
            .description(&plan.reasoning)
            .starts(start)
            .ends(end)
            .alarm(Alarm::display(
                &format!("{} starts in {} minutes", block.assignment, REMINDER_MINUTES),
                -Duration::minutes(REMINDER_MINUTES),
            ))
            .done();
        calendar.push(event);
    }

    tracing::info!(events = plan.blocks.len(), "Exported study plan");
    Ok(calendar.done().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(day: &str, start: &str, end: &str) -> StudyBlock {
        StudyBlock {
            day: day.to_string(),
            start_time: start.to_string(),
            end_time: end.to_string(),
            assignment: "Lab Report".to_string(),
        }
    }

    fn friday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 19).unwrap()
    }

    #[test]
    fn clock_formats() {
        assert_eq!(parse_clock("18:30"), NaiveTime::from_hms_opt(18, 30, 0));
        assert_eq!(parse_clock("6:30 PM"), NaiveTime::from_hms_opt(18, 30, 0));
        assert_eq!(parse_clock("6pm"), NaiveTime::from_hms_opt(18, 0, 0));
        assert_eq!(parse_clock("12:15 am"), NaiveTime::from_hms_opt(0, 15, 0));
        assert_eq!(parse_clock("13pm"), None);
        assert_eq!(parse_clock("noonish"), None);
    }

    #[test]
    fn weekday_resolves_forward_from_reference() {
        assert_eq!(resolve_day("Friday", friday()), Some(friday()));
        assert_eq!(
            resolve_day("monday", friday()),
            NaiveDate::from_ymd_opt(2024, 7, 22)
        );
        assert_eq!(
            resolve_day("2024-08-01", friday()),
            NaiveDate::from_ymd_opt(2024, 8, 1)
        );
        assert_eq!(resolve_day("someday", friday()), None);
    }

    #[test]
    fn inverted_block_is_rejected() {
        assert!(block_span(&block("Monday", "19:00", "18:00"), friday()).is_err());
    }

    #[test]
    fn exports_one_event_with_alarm_per_block() {
        let plan = StudyPlan {
            blocks: vec![
                block("Saturday", "10:00", "10:50"),
                block("Sunday", "2:00 PM", "3:00 PM"),
            ],
            reasoning: "Front-load the lab report.".to_string(),
            generated_at: friday().and_hms_opt(20, 0, 0).unwrap(),
        };

        let ics = export_plan(&plan).unwrap();
        assert!(ics.starts_with("BEGIN:VCALENDAR"));
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 2);
        assert_eq!(ics.matches("BEGIN:VALARM").count(), 2);
        assert!(ics.contains("DTSTART:20240720T100000"));
        assert!(ics.contains("DTSTART:20240721T140000"));
        assert_eq!(ics.matches("TRIGGER").count(), 2);
    }
}
