//! Contracts for data exchanged with the prompt service.
//!
//! The `*_schema` functions describe the reply shape handed to the model. The `decode_*`
//! functions check a reply against that shape. Only a few known variants are normalised
//! (ISO timestamps, a year-less `MM-DD` date, grades written as text); anything else is a
//! schema mismatch.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::calendar;
use crate::error::FlowError;
use crate::models::{ParsedAssignment, ParsedCourse, StudyBlock};

static POINTS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*/\s*(\d+(?:\.\d+)?)\s*$").unwrap());
static PERCENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*%?\s*$").unwrap());
static MONTH_DAY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-{0,2}(\d{1,2})-(\d{1,2})$").unwrap());
static FENCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*(.*?)\s*```\s*$").unwrap());

/// Grade texts that mean "not graded yet".
const UNGRADED: &[&str] = &["", "-", "--", "—", "n/a", "na", "none", "pending", "not graded", "ungraded"];

fn assignment_properties() -> Value {
    json!({
        "task": { "type": "string", "description": "The title or name of the task." },
        "dueDate": { "type": "string", "description": "The due date of the assignment in ISO format (YYYY-MM-DD)." },
        "course": { "type": "string", "description": "The course the assignment is for." },
        "details": { "type": "string", "description": "Any additional details about the assignment." }
    })
}

pub fn assignment_schema() -> Value {
    json!({
        "type": "object",
        "properties": assignment_properties(),
        "required": ["task", "dueDate"]
    })
}

pub fn assignment_list_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "assignments": {
                "type": "array",
                "items": assignment_schema()
            }
        },
        "required": ["assignments"]
    })
}

pub fn course_list_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "courses": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string", "description": "The name of the course." },
                        "grade": { "type": "number", "description": "The numerical grade for the course as a percentage." }
                    },
                    "required": ["name", "grade"]
                }
            }
        },
        "required": ["courses"]
    })
}

pub fn study_schedule_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "suggestedSchedule": {
                "type": "string",
                "description": "A JSON array string of blocks, each with day, startTime, endTime and assignment."
            },
            "reasoning": {
                "type": "string",
                "description": "The reasoning for the suggested schedule."
            }
        },
        "required": ["suggestedSchedule", "reasoning"]
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAssignment {
    task: String,
    due_date: String,
    #[serde(default)]
    course: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

#[derive(Deserialize)]
struct RawAssignmentList {
    assignments: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawGrade {
    Number(f64),
    Text(String),
}

#[derive(Deserialize)]
struct RawCourse {
    name: String,
    #[serde(default)]
    grade: Option<RawGrade>,
}

#[derive(Deserialize)]
struct RawCourseList {
    courses: Vec<RawCourse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStudySchedule {
    suggested_schedule: String,
    reasoning: String,
}

fn is_empty_reply(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Normalises a due date to `YYYY-MM-DD`. A missing year becomes `today`'s year.
pub fn normalize_due_date(raw: &str, today: NaiveDate) -> Option<String> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.format("%Y-%m-%d").to_string());
    }
    // Full ISO timestamps: keep the calendar date.
    if raw.len() > 10 && raw.as_bytes()[10] == b'T' {
        if let Some(date) = raw
            .get(..10)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    let caps = MONTH_DAY_RE.captures(raw)?;
    let month = caps[1].parse().ok()?;
    let day = caps[2].parse().ok()?;
    NaiveDate::from_ymd_opt(today.year(), month, day).map(|d| d.format("%Y-%m-%d").to_string())
}

/// Parses a grade written as text: `"90"`, `"91.5%"` or points `"450 / 500"`.
///
/// Returns `Ok(None)` for "not graded yet" markers and for zero points possible.
pub fn parse_grade_value(raw: &str) -> Result<Option<f64>, String> {
    let trimmed = raw.trim();
    if UNGRADED.contains(&trimmed.to_lowercase().as_str()) {
        return Ok(None);
    }
    if let Some(caps) = POINTS_RE.captures(trimmed) {
        let earned: f64 = caps[1].parse().map_err(|_| format!("bad points `{}`", raw))?;
        let possible: f64 = caps[2].parse().map_err(|_| format!("bad points `{}`", raw))?;
        if possible == 0.0 {
            return Ok(None);
        }
        return Ok(Some(round2(earned / possible * 100.0)));
    }
    if let Some(caps) = PERCENT_RE.captures(trimmed) {
        let value: f64 = caps[1].parse().map_err(|_| format!("bad grade `{}`", raw))?;
        return Ok(Some(value));
    }
    Err(format!("unrecognised grade `{}`", raw))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn decode_assignment_value(
    flow: &'static str,
    value: Value,
    today: NaiveDate,
) -> Result<ParsedAssignment, FlowError> {
    let raw: RawAssignment =
        serde_json::from_value(value).map_err(|err| FlowError::schema(flow, err.to_string()))?;
    let task = raw.task.trim().to_string();
    if task.is_empty() {
        return Err(FlowError::schema(flow, "task is empty"));
    }
    let due_date = normalize_due_date(&raw.due_date, today).ok_or_else(|| {
        FlowError::schema(flow, format!("dueDate `{}` is not YYYY-MM-DD", raw.due_date))
    })?;
    Ok(ParsedAssignment {
        task,
        due_date,
        course: non_blank(raw.course),
        details: non_blank(raw.details),
    })
}

pub fn decode_assignment(
    flow: &'static str,
    value: Value,
    today: NaiveDate,
) -> Result<ParsedAssignment, FlowError> {
    if is_empty_reply(&value) {
        return Err(FlowError::NoResult { flow });
    }
    decode_assignment_value(flow, value, today)
}

pub fn decode_assignments(
    flow: &'static str,
    value: Value,
    today: NaiveDate,
) -> Result<Vec<ParsedAssignment>, FlowError> {
    if is_empty_reply(&value) {
        return Err(FlowError::NoResult { flow });
    }
    let list: RawAssignmentList =
        serde_json::from_value(value).map_err(|err| FlowError::schema(flow, err.to_string()))?;
    list.assignments
        .into_iter()
        .map(|item| decode_assignment_value(flow, item, today))
        .collect()
}

/// Decodes a course list, dropping courses that carry no grade.
pub fn decode_courses(flow: &'static str, value: Value) -> Result<Vec<ParsedCourse>, FlowError> {
    if is_empty_reply(&value) {
        return Err(FlowError::NoResult { flow });
    }
    let list: RawCourseList =
        serde_json::from_value(value).map_err(|err| FlowError::schema(flow, err.to_string()))?;

    let mut courses = Vec::new();
    for raw in list.courses {
        let name = raw.name.trim().to_string();
        if name.is_empty() {
            return Err(FlowError::schema(flow, "course name is empty"));
        }
        let grade = match raw.grade {
            None => None,
            Some(RawGrade::Number(value)) => Some(value),
            Some(RawGrade::Text(text)) => {
                parse_grade_value(&text).map_err(|reason| FlowError::schema(flow, reason))?
            }
        };
        match grade {
            Some(grade) if grade < 0.0 => {
                return Err(FlowError::schema(flow, format!("negative grade for `{}`", name)));
            }
            Some(grade) => courses.push(ParsedCourse { name, grade }),
            None => tracing::debug!(course = %name, "Skipping course without a grade"),
        }
    }
    Ok(courses)
}

/// Splits a study schedule reply into the raw schedule string and the reasoning.
pub fn decode_study_schedule(flow: &'static str, value: Value) -> Result<(String, String), FlowError> {
    if is_empty_reply(&value) {
        return Err(FlowError::NoResult { flow });
    }
    let raw: RawStudySchedule =
        serde_json::from_value(value).map_err(|err| FlowError::schema(flow, err.to_string()))?;
    Ok((raw.suggested_schedule, raw.reasoning))
}

/// Parses the schedule string into blocks.
///
/// Accepts a JSON array of blocks or an object wrapping it under `schedule`, optionally inside
/// a markdown code fence. Every block must land on a real day and time span relative to
/// `reference`, so an accepted plan can always be exported.
pub fn parse_schedule(raw: &str, reference: NaiveDate) -> Result<Vec<StudyBlock>, FlowError> {
    let body = match FENCE_RE.captures(raw) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()).to_string(),
        None => raw.trim().to_string(),
    };
    let value: Value =
        serde_json::from_str(&body).map_err(|err| FlowError::ScheduleParse(err.to_string()))?;
    let blocks = match value {
        Value::Array(items) => Value::Array(items),
        Value::Object(mut map) => map
            .remove("schedule")
            .ok_or_else(|| FlowError::ScheduleParse("object has no `schedule` array".to_string()))?,
        other => {
            return Err(FlowError::ScheduleParse(format!(
                "expected a list of blocks, got {}",
                other
            )))
        }
    };
    let blocks: Vec<StudyBlock> =
        serde_json::from_value(blocks).map_err(|err| FlowError::ScheduleParse(err.to_string()))?;
    for block in &blocks {
        calendar::block_span(block, reference).map_err(|err| FlowError::ScheduleParse(err.to_string()))?;
    }
    Ok(blocks)
}
