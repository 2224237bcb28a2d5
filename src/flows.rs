//! Prompt flows: each one validates its input, renders a prompt, asks the prompt service for
//! JSON matching an output schema, and decodes the reply. Flows never touch the stores.

use std::future::Future;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;

use crate::attachment::Attachment;
use crate::error::FlowError;
use crate::models::{Assignment, ParsedAssignment, ParsedCourse, ScheduleEvent, StudyPlan};
use crate::schema;

pub const PARSE_ASSIGNMENT: &str = "parseAssignment";
pub const PARSE_SYLLABUS: &str = "parseSyllabus";
pub const PARSE_SYLLABUS_TEXT: &str = "parseSyllabusText";
pub const PARSE_GRADES: &str = "parseGrades";
pub const SUGGEST_STUDY_SCHEDULE: &str = "suggestStudySchedule";

const SYSTEM_PROMPT: &str = "You are a careful assistant inside a student planner. You extract structured data from the student's text and answer ONLY with JSON that matches the requested schema. Never invent assignments or grades that are not in the input.";

/// One call to the prompt service.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub name: &'static str,
    pub system: String,
    pub prompt: String,
    pub attachment: Option<Attachment>,
    pub output_schema: Value,
}

/// The external LLM. Returns the reply's JSON body, `Value::Null` when the model produced
/// nothing.
pub trait PromptService {
    fn generate(
        &self,
        request: PromptRequest,
    ) -> impl Future<Output = Result<Value, FlowError>> + Send;
}

fn date_context(today: NaiveDate) -> String {
    format!(
        "Today's date is {} ({}). Resolve relative dates such as \"next Friday\" against it. If a date has no year, use {}.",
        today.format("%Y-%m-%d"),
        today.format("%A"),
        today.format("%Y"),
    )
}

const ASSIGNMENT_FIELDS: &str = "- task: The title or name of the task.\n- dueDate: The due date in ISO format (YYYY-MM-DD).\n- course: The course the assignment is for, if specified.\n- details: Any additional details, if specified.";

fn require_text<'a>(text: &'a str, what: &str) -> Result<&'a str, FlowError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(FlowError::Validation(format!("{} is empty", what)));
    }
    Ok(trimmed)
}

fn request(name: &'static str, prompt: String, output_schema: Value) -> PromptRequest {
    PromptRequest {
        name,
        system: SYSTEM_PROMPT.to_string(),
        prompt,
        attachment: None,
        output_schema,
    }
}

/// Turns a natural-language description into one assignment.
pub async fn parse_assignment(
    service: &impl PromptService,
    text: &str,
    today: NaiveDate,
) -> Result<ParsedAssignment, FlowError> {
    let text = require_text(text, "assignment description")?;
    let prompt = format!(
        "Extract the assignment described below as a JSON object with these keys:\n{}\n\n{}\n\nExample input: \"Write essay for history class due next Friday\" (today is 2024-07-19, a Friday)\nExample output: {{\"task\": \"Write essay\", \"dueDate\": \"2024-07-26\", \"course\": \"history class\"}}\n\nAssignment description:\n{}",
        ASSIGNMENT_FIELDS,
        date_context(today),
        text
    );
    let reply = service
        .generate(request(PARSE_ASSIGNMENT, prompt, schema::assignment_schema()))
        .await?;
    schema::decode_assignment(PARSE_ASSIGNMENT, reply, today)
}

fn syllabus_prompt(source: &str, today: NaiveDate) -> String {
    format!(
        "Extract every assignment, quiz, exam, discussion and project from the {} as a JSON object with an 'assignments' array. Each item has these keys:\n{}\n\n{}\n\nReturn an empty array if there is nothing to extract.",
        source,
        ASSIGNMENT_FIELDS,
        date_context(today)
    )
}

pub async fn parse_syllabus_text(
    service: &impl PromptService,
    text: &str,
    today: NaiveDate,
) -> Result<Vec<ParsedAssignment>, FlowError> {
    let text = require_text(text, "syllabus text")?;
    let prompt = format!(
        "{}\n\nSyllabus text:\n{}",
        syllabus_prompt("syllabus text below", today),
        text
    );
    let reply = service
        .generate(request(PARSE_SYLLABUS_TEXT, prompt, schema::assignment_list_schema()))
        .await?;
    schema::decode_assignments(PARSE_SYLLABUS_TEXT, reply, today)
}

/// Same as [`parse_syllabus_text`] for an attached document or image.
pub async fn parse_syllabus(
    service: &impl PromptService,
    document: Attachment,
    today: NaiveDate,
) -> Result<Vec<ParsedAssignment>, FlowError> {
    if document.data.is_empty() {
        return Err(FlowError::Validation("syllabus document is empty".to_string()));
    }
    let mut req = request(
        PARSE_SYLLABUS,
        syllabus_prompt("attached syllabus document", today),
        schema::assignment_list_schema(),
    );
    req.attachment = Some(document);
    let reply = service.generate(req).await?;
    schema::decode_assignments(PARSE_SYLLABUS, reply, today)
}

/// Extracts course grades from text copied out of a grade portal.
pub async fn parse_grades(
    service: &impl PromptService,
    text: &str,
) -> Result<Vec<ParsedCourse>, FlowError> {
    let text = require_text(text, "grades text")?;
    let prompt = format!(
        "Extract the courses and their current grades from the grade portal text below as a JSON object with a 'courses' array. Each item has:\n- name: The name of the course.\n- grade: The numerical grade as a percentage. If the grade is given as points (e.g. \"450 / 500\"), convert it: earned / possible * 100.\n\nLeave out courses that do not have a grade yet.\n\nGrades text:\n{}",
        text
    );
    let reply = service
        .generate(request(PARSE_GRADES, prompt, schema::course_list_schema()))
        .await?;
    schema::decode_courses(PARSE_GRADES, reply)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleInput<'a> {
    title: &'a str,
    course: &'a str,
    due_date: String,
    priority: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CommitmentInput<'a> {
    title: &'a str,
    start: String,
    end: String,
    #[serde(rename = "type")]
    kind: crate::models::EventType,
}

fn to_json<T: Serialize>(value: &T) -> Result<String, FlowError> {
    serde_json::to_string(value).map_err(|err| FlowError::Validation(err.to_string()))
}

/// Proposes study blocks for `assignments` around the fixed `commitments`.
///
/// An empty `commitments` slice means the student is free outside 9am-5pm on weekdays.
pub async fn suggest_study_schedule(
    service: &impl PromptService,
    assignments: &[Assignment],
    commitments: &[ScheduleEvent],
    now: NaiveDateTime,
) -> Result<StudyPlan, FlowError> {
    if assignments.is_empty() {
        return Err(FlowError::Validation("no assignments to schedule".to_string()));
    }

    let work: Vec<ScheduleInput<'_>> = assignments
        .iter()
        .map(|a| ScheduleInput {
            title: &a.title,
            course: &a.course,
            due_date: a.due_date.format("%Y-%m-%d").to_string(),
            priority: a.priority.as_str(),
            details: a.details.as_deref(),
        })
        .collect();
    let availability = if commitments.is_empty() {
        "Assume the student is generally busy 9am-5pm on weekdays and free otherwise, but can be flexible.".to_string()
    } else {
        let fixed: Vec<CommitmentInput<'_>> = commitments
            .iter()
            .map(|event| CommitmentInput {
                title: &event.title,
                start: event.start_time.format("%Y-%m-%dT%H:%M").to_string(),
                end: event.end_time.format("%Y-%m-%dT%H:%M").to_string(),
                kind: event.kind,
            })
            .collect();
        format!(
            "These commitments are fixed; never schedule study time that overlaps them:\n{}",
            to_json(&fixed)?
        )
    };

    let prompt = format!(
        "Suggest a study schedule for the assignments below.\n\nIt is now {}.\n{}\n\nEstimate how hard each assignment is from its title and details. The earlier the due date and the harder the assignment, the earlier it should be worked on. Include breaks of at least 10 minutes for every hour of continuous work.\n\nAssignments:\n{}\n\nReturn a JSON object with:\n- suggestedSchedule: a string containing a JSON array; each element has day (weekday name or YYYY-MM-DD), startTime (HH:MM, 24h), endTime (HH:MM, 24h) and assignment (the assignment title).\n- reasoning: a short, encouraging explanation of the plan focused on next steps.",
        now.format("%A %Y-%m-%d %H:%M"),
        availability,
        to_json(&work)?
    );

    let reply = service
        .generate(request(SUGGEST_STUDY_SCHEDULE, prompt, schema::study_schedule_schema()))
        .await?;
    let (raw_schedule, reasoning) = schema::decode_study_schedule(SUGGEST_STUDY_SCHEDULE, reply)?;
    let blocks = schema::parse_schedule(&raw_schedule, now.date())?;
    tracing::info!(blocks = blocks.len(), "Study schedule suggested");

    Ok(StudyPlan {
        blocks,
        reasoning,
        generated_at: now,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;
    use crate::models::{EventType, Priority};

    /// Replays canned replies and records what was asked.
    #[derive(Default)]
    pub(crate) struct ScriptedService {
        replies: Mutex<VecDeque<Result<Value, FlowError>>>,
        pub(crate) requests: Mutex<Vec<PromptRequest>>,
    }

    impl ScriptedService {
        pub(crate) fn replying(reply: Value) -> Self {
            let service = Self::default();
            service.push(Ok(reply));
            service
        }

        pub(crate) fn push(&self, reply: Result<Value, FlowError>) {
            self.replies.lock().unwrap().push_back(reply);
        }

        pub(crate) fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub(crate) fn last_prompt(&self) -> String {
            self.requests.lock().unwrap().last().unwrap().prompt.clone()
        }
    }

    impl PromptService for ScriptedService {
        async fn generate(&self, request: PromptRequest) -> Result<Value, FlowError> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FlowError::Service("no scripted reply".to_string())))
        }
    }

    fn friday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 19).unwrap()
    }

    #[tokio::test]
    async fn relative_due_date_uses_current_date() {
        let service = ScriptedService::replying(json!({
            "task": "Write essay",
            "dueDate": "2024-07-26",
            "course": "history class"
        }));

        let parsed = parse_assignment(
            &service,
            "Write essay for history class due next Friday",
            friday(),
        )
        .await
        .unwrap();

        assert_eq!(parsed.due_date, "2024-07-26");
        assert!(parsed.task.to_lowercase().contains("essay"));
        assert_eq!(parsed.course.as_deref(), Some("history class"));

        let prompt = service.last_prompt();
        assert!(prompt.contains("Today's date is 2024-07-19 (Friday)"));
        assert!(prompt.contains("Write essay for history class due next Friday"));
    }

    #[tokio::test]
    async fn empty_text_never_reaches_the_service() {
        let service = ScriptedService::default();
        let err = parse_assignment(&service, "   ", friday()).await.unwrap_err();
        assert!(matches!(err, FlowError::Validation(_)));
        let err = parse_grades(&service, "").await.unwrap_err();
        assert!(matches!(err, FlowError::Validation(_)));
        assert_eq!(service.calls(), 0);
    }

    #[tokio::test]
    async fn missing_output_is_no_result() {
        let service = ScriptedService::replying(Value::Null);
        let err = parse_assignment(&service, "Read chapter 4", friday())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::NoResult { flow: PARSE_ASSIGNMENT }));
    }

    #[tokio::test]
    async fn service_errors_pass_through() {
        let service = ScriptedService::default();
        service.push(Err(FlowError::Service("quota exceeded".to_string())));
        let err = parse_syllabus_text(&service, "Week 1: quiz", friday())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Service(_)));
    }

    #[tokio::test]
    async fn syllabus_file_is_sent_as_attachment() {
        let service = ScriptedService::replying(json!({"assignments": [
            {"task": "Midterm", "dueDate": "10-14", "course": "Biology 110"}
        ]}));
        let document = Attachment::from_bytes("application/pdf", b"%PDF-1.4");

        let parsed = parse_syllabus(&service, document.clone(), friday()).await.unwrap();
        assert_eq!(parsed[0].due_date, "2024-10-14");

        let requests = service.requests.lock().unwrap();
        assert_eq!(requests[0].name, PARSE_SYLLABUS);
        assert_eq!(requests[0].attachment.as_ref(), Some(&document));
        assert!(requests[0].prompt.contains("2024-07-19"));
    }

    #[tokio::test]
    async fn syllabus_without_assignments_is_empty_list() {
        let service = ScriptedService::replying(json!({"assignments": []}));
        let parsed = parse_syllabus_text(&service, "Office hours: Tuesdays", friday())
            .await
            .unwrap();
        assert!(parsed.is_empty());
    }

    #[tokio::test]
    async fn ungraded_courses_yield_empty_list() {
        let service = ScriptedService::replying(json!({"courses": [
            {"name": "Physics 301", "grade": null},
            {"name": "History 105", "grade": "--"}
        ]}));
        let courses = parse_grades(&service, "Physics 301  --\nHistory 105  --")
            .await
            .unwrap();
        assert!(courses.is_empty());
    }

    #[tokio::test]
    async fn points_grade_converts_to_percentage() {
        let service = ScriptedService::replying(json!({"courses": [
            {"name": "Calculus II", "grade": "450 / 500"}
        ]}));
        let courses = parse_grades(&service, "Calculus II 450 / 500").await.unwrap();
        assert_eq!(courses[0].grade, 90.0);
        assert!(service.last_prompt().contains("earned / possible * 100"));
    }

    fn open_assignment() -> Assignment {
        Assignment {
            id: "a1".to_string(),
            title: "Quantum Physics Problem Set".to_string(),
            course: "Physics 301".to_string(),
            due_date: NaiveDate::from_ymd_opt(2024, 7, 22)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            completed: false,
            priority: Priority::High,
            details: None,
        }
    }

    fn now() -> NaiveDateTime {
        friday().and_hms_opt(18, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn schedule_respects_commitments_in_prompt() {
        let schedule = r#"[{"day":"Saturday","startTime":"10:00","endTime":"11:00","assignment":"Quantum Physics Problem Set"}]"#;
        let service = ScriptedService::replying(json!({
            "suggestedSchedule": schedule,
            "reasoning": "Start with physics while it is fresh."
        }));
        let commitment = ScheduleEvent {
            id: "e1".to_string(),
            title: "Shift at cafe".to_string(),
            start_time: NaiveDate::from_ymd_opt(2024, 7, 20)
                .unwrap()
                .and_hms_opt(13, 0, 0)
                .unwrap(),
            end_time: NaiveDate::from_ymd_opt(2024, 7, 20)
                .unwrap()
                .and_hms_opt(17, 0, 0)
                .unwrap(),
            kind: EventType::Work,
        };

        let plan = suggest_study_schedule(&service, &[open_assignment()], &[commitment], now())
            .await
            .unwrap();

        assert_eq!(plan.blocks.len(), 1);
        assert_eq!(plan.blocks[0].day, "Saturday");
        assert_eq!(plan.generated_at, now());
        let prompt = service.last_prompt();
        assert!(prompt.contains("Shift at cafe"));
        assert!(prompt.contains("at least 10 minutes"));
        assert!(!prompt.contains("9am-5pm"));
    }

    #[tokio::test]
    async fn schedule_string_that_does_not_parse_is_schedule_error() {
        let service = ScriptedService::replying(json!({
            "suggestedSchedule": "Saturday morning: physics",
            "reasoning": "..."
        }));
        let err = suggest_study_schedule(&service, &[open_assignment()], &[], now())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::ScheduleParse(_)));
        assert!(service.last_prompt().contains("9am-5pm"));
    }

    #[tokio::test]
    async fn nothing_to_schedule_is_rejected_locally() {
        let service = ScriptedService::default();
        let err = suggest_study_schedule(&service, &[], &[], now()).await.unwrap_err();
        assert!(matches!(err, FlowError::Validation(_)));
        assert_eq!(service.calls(), 0);
    }
}
