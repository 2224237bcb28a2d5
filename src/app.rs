//! Wires the stores, the profile and the prompt flows together the way the dialogs use them.
//!
//! Flow requests run against `&self` and come back as a [`Pending`] result. Accepting it is a
//! separate `&mut self` step that applies the result to the stores, unless the request was
//! abandoned in between (see [`Agenda::cancel_pending`]).

use chrono::{Local, NaiveDateTime};

use crate::attachment::Attachment;
use crate::error::{FlowError, StoreError};
use crate::flows::{self, PromptService};
use crate::models::{Assignment, NewAssignment, ParsedAssignment, ParsedCourse, ScheduleEvent, StudyPlan};
use crate::profile::Profile;
use crate::session::{RequestGenerations, Ticket};
use crate::store::{AssignmentsStore, GradesStore, Storage};

/// Result of a list-producing flow once accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported(usize),
    NothingFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Info,
    Error,
}

/// A user-visible message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub description: String,
}

impl Notice {
    fn new(kind: NoticeKind, title: &str, description: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.to_string(),
            description: description.into(),
        }
    }

    /// Maps a flow failure. Everything but local validation gets the same retry message.
    pub fn from_error(err: &FlowError, action: &str) -> Self {
        match err {
            FlowError::Validation(reason) => Self::new(NoticeKind::Error, "Error", capitalize(reason)),
            FlowError::Service(_)
            | FlowError::NoResult { .. }
            | FlowError::SchemaMismatch { .. }
            | FlowError::ScheduleParse(_) => Self::new(
                NoticeKind::Error,
                "Error",
                format!("Could not {}. Please try again.", action),
            ),
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A flow result tagged with the request that produced it.
#[derive(Debug)]
pub struct Pending<T> {
    ticket: Ticket,
    result: Result<T, FlowError>,
}

type Clock = Box<dyn Fn() -> NaiveDateTime + Send + Sync>;

pub struct Agenda<S, P> {
    pub assignments: AssignmentsStore<S>,
    pub grades: GradesStore<S>,
    pub profile: Profile<S>,
    service: P,
    generations: RequestGenerations,
    clock: Clock,
}

impl<S, P> Agenda<S, P>
where
    S: Storage + Clone,
    P: PromptService,
{
    /// Builds the agenda and hydrates both stores from `storage`.
    pub fn new(storage: S, service: P) -> Self {
        let mut assignments = AssignmentsStore::new(storage.clone());
        let mut grades = GradesStore::new(storage.clone());
        assignments.hydrate();
        grades.hydrate();
        Self {
            assignments,
            grades,
            profile: Profile::new(storage),
            service,
            generations: RequestGenerations::new(),
            clock: Box::new(|| Local::now().naive_local()),
        }
    }

    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }

    /// The consumer went away; results of requests in flight will be dropped.
    pub fn cancel_pending(&self) {
        self.generations.invalidate();
    }

    fn take<T>(&self, pending: Pending<T>, flow: &'static str) -> Option<Result<T, FlowError>> {
        if self.generations.is_current(pending.ticket) {
            Some(pending.result)
        } else {
            tracing::debug!(flow, "Dropping result of abandoned request");
            None
        }
    }

    pub fn add_assignment(&mut self, new: NewAssignment) -> Result<Assignment, StoreError> {
        let now = self.now();
        self.assignments.add(new, now)
    }

    pub fn toggle_assignment(&mut self, id: &str) -> Result<bool, StoreError> {
        self.assignments.toggle(id)
    }

    pub async fn parse_assignment(&self, text: &str) -> Pending<ParsedAssignment> {
        let ticket = self.generations.begin();
        let result = flows::parse_assignment(&self.service, text, self.now().date()).await;
        Pending { ticket, result }
    }

    pub fn accept_assignment(&mut self, pending: Pending<ParsedAssignment>) -> Option<Notice> {
        let result = self.take(pending, flows::PARSE_ASSIGNMENT)?;
        let notice = match result {
            Ok(parsed) => {
                let now = self.now();
                match self.assignments.add_many(std::slice::from_ref(&parsed), now) {
                    Ok(added) if !added.is_empty() => Notice::new(
                        NoticeKind::Success,
                        "Assignment Added!",
                        format!("\"{}\" has been added to your list.", added[0].title),
                    ),
                    Ok(_) => Notice::new(
                        NoticeKind::Error,
                        "Error",
                        "Could not parse assignment. Please try again.",
                    ),
                    Err(err) => store_notice(&err),
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "Assignment parsing failed");
                Notice::from_error(&err, "parse assignment")
            }
        };
        Some(notice)
    }

    pub async fn parse_syllabus_text(&self, text: &str) -> Pending<Vec<ParsedAssignment>> {
        let ticket = self.generations.begin();
        let result = flows::parse_syllabus_text(&self.service, text, self.now().date()).await;
        Pending { ticket, result }
    }

    pub async fn parse_syllabus_file(&self, document: Attachment) -> Pending<Vec<ParsedAssignment>> {
        let ticket = self.generations.begin();
        let result = flows::parse_syllabus(&self.service, document, self.now().date()).await;
        Pending { ticket, result }
    }

    pub fn accept_syllabus(&mut self, pending: Pending<Vec<ParsedAssignment>>) -> Option<Notice> {
        let result = self.take(pending, flows::PARSE_SYLLABUS)?;
        let notice = match result {
            Ok(parsed) => {
                let now = self.now();
                match self.import_assignments(&parsed, now) {
                    Ok(ImportOutcome::Imported(count)) => Notice::new(
                        NoticeKind::Success,
                        "Syllabus Imported!",
                        format!("{} assignments have been added to your list.", count),
                    ),
                    Ok(ImportOutcome::NothingFound) => Notice::new(
                        NoticeKind::Info,
                        "No assignments found",
                        "The AI couldn't find any assignments in the syllabus.",
                    ),
                    Err(err) => store_notice(&err),
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "Syllabus parsing failed");
                Notice::from_error(&err, "parse syllabus")
            }
        };
        Some(notice)
    }

    fn import_assignments(
        &mut self,
        parsed: &[ParsedAssignment],
        now: NaiveDateTime,
    ) -> Result<ImportOutcome, StoreError> {
        if parsed.is_empty() {
            return Ok(ImportOutcome::NothingFound);
        }
        let added = self.assignments.add_many(parsed, now)?;
        Ok(match added.len() {
            0 => ImportOutcome::NothingFound,
            count => ImportOutcome::Imported(count),
        })
    }

    pub async fn parse_grades(&self, text: &str) -> Pending<Vec<ParsedCourse>> {
        let ticket = self.generations.begin();
        let result = flows::parse_grades(&self.service, text).await;
        Pending { ticket, result }
    }

    /// Replaces all course grades with the parsed list. An empty list leaves grades untouched.
    pub fn accept_grades(&mut self, pending: Pending<Vec<ParsedCourse>>) -> Option<Notice> {
        let result = self.take(pending, flows::PARSE_GRADES)?;
        let notice = match result {
            Ok(courses) if courses.is_empty() => Notice::new(
                NoticeKind::Info,
                "No grades found",
                "The AI couldn't find any grades. You can try pasting the text again.",
            ),
            Ok(courses) => {
                let count = courses.len();
                match self
                    .grades
                    .replace_all(courses.into_iter().map(Into::into).collect())
                {
                    Ok(()) => Notice::new(
                        NoticeKind::Success,
                        "Grades Imported!",
                        format!("{} courses have been updated with your latest grades.", count),
                    ),
                    Err(err) => store_notice(&err),
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "Grade parsing failed");
                Notice::from_error(&err, "parse grades")
            }
        };
        Some(notice)
    }

    /// Plans study time for every open assignment around `commitments`.
    pub async fn suggest_schedule(&self, commitments: &[ScheduleEvent]) -> Pending<StudyPlan> {
        let ticket = self.generations.begin();
        let open: Vec<Assignment> = self
            .assignments
            .snapshot()
            .ready()
            .unwrap_or_default()
            .iter()
            .filter(|a| !a.completed)
            .cloned()
            .collect();
        let result = flows::suggest_study_schedule(&self.service, &open, commitments, self.now()).await;
        Pending { ticket, result }
    }

    /// Saves an accepted plan so it is shown again next time.
    pub fn accept_schedule(&mut self, pending: Pending<StudyPlan>) -> Option<(Notice, Option<StudyPlan>)> {
        let result = self.take(pending, flows::SUGGEST_STUDY_SCHEDULE)?;
        Some(match result {
            Ok(plan) => {
                if let Err(err) = self.profile.save_study_plan(&plan) {
                    tracing::error!(error = %err, "Failed to save study plan");
                }
                (
                    Notice::new(
                        NoticeKind::Success,
                        "Study Plan Ready",
                        format!("{} study blocks suggested.", plan.blocks.len()),
                    ),
                    Some(plan),
                )
            }
            Err(err) => {
                tracing::error!(error = %err, "Study schedule suggestion failed");
                (Notice::from_error(&err, "generate schedule"), None)
            }
        })
    }
}

fn store_notice(err: &StoreError) -> Notice {
    tracing::error!(error = %err, "Store rejected update");
    let description = match err {
        StoreError::NotReady(_) => "Your data is still loading. Please try again.",
        _ => "Could not save your changes. Please try again.",
    };
    Notice::new(NoticeKind::Error, "Error", description)
}
