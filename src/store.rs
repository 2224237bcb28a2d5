//! In-memory collections mirrored to key-value storage.
//!
//! Both stores follow the same lifecycle: they start `Uninitialized`, pass through `Loading`
//! while [`hydrate`](AssignmentsStore::hydrate) reads storage, and end up `Ready`. A missing or
//! corrupt stored value yields an empty collection. Every mutation in `Ready` rewrites the
//! whole collection to storage right away.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Assignment, Course, NewAssignment, ParsedAssignment, UNCATEGORIZED};
use crate::views::priority_for;

pub const ASSIGNMENTS_KEY: &str = "agendaAssignments";
pub const GRADES_KEY: &str = "agendaGrades";

/// String key-value storage, the browser-local-storage equivalent.
pub trait Storage {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

impl<T: Storage + ?Sized> Storage for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}

/// Process-local storage. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Backend("memory storage lock poisoned".to_string()))
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Reads and decodes a JSON value stored under `key`.
pub(crate) fn read_json<T: DeserializeOwned>(
    storage: &impl Storage,
    key: &'static str,
) -> Result<Option<T>, StoreError> {
    match storage.get(key)? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Corrupt { key, source }),
        None => Ok(None),
    }
}

pub(crate) fn write_json<T: Serialize + ?Sized>(
    storage: &impl Storage,
    key: &'static str,
    value: &T,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value).map_err(|source| StoreError::Serialize { key, source })?;
    storage.set(key, &raw)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Uninitialized,
    Loading,
    Ready,
}

/// What consumers see: an explicit loading signal instead of an empty list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Snapshot<'a, T> {
    Loading,
    Ready(&'a [T]),
}

impl<'a, T> Snapshot<'a, T> {
    pub fn ready(self) -> Option<&'a [T]> {
        match self {
            Snapshot::Loading => None,
            Snapshot::Ready(items) => Some(items),
        }
    }
}

struct PersistedVec<T, S> {
    key: &'static str,
    storage: S,
    state: LoadState,
    items: Vec<T>,
}

impl<T, S> PersistedVec<T, S>
where
    T: Serialize + DeserializeOwned,
    S: Storage,
{
    fn new(key: &'static str, storage: S) -> Self {
        Self {
            key,
            storage,
            state: LoadState::Uninitialized,
            items: Vec::new(),
        }
    }

    fn hydrate(&mut self) {
        self.state = LoadState::Loading;
        self.items = match read_json::<Vec<T>>(&self.storage, self.key) {
            Ok(Some(items)) => {
                tracing::debug!(key = self.key, count = items.len(), "Hydrated collection");
                items
            }
            Ok(None) => Vec::new(),
            Err(err) => {
                tracing::error!(key = self.key, error = %err, "Failed to load collection, starting empty");
                Vec::new()
            }
        };
        self.state = LoadState::Ready;
    }

    fn snapshot(&self) -> Snapshot<'_, T> {
        match self.state {
            LoadState::Ready => Snapshot::Ready(&self.items),
            LoadState::Uninitialized | LoadState::Loading => Snapshot::Loading,
        }
    }

    fn mutate<R>(&mut self, f: impl FnOnce(&mut Vec<T>) -> R) -> Result<R, StoreError> {
        if self.state != LoadState::Ready {
            tracing::warn!(key = self.key, "Mutation before store finished loading");
            return Err(StoreError::NotReady(self.key));
        }
        let result = f(&mut self.items);
        self.flush();
        Ok(result)
    }

    fn flush(&self) {
        if let Err(err) = write_json(&self.storage, self.key, &self.items) {
            tracing::error!(key = self.key, error = %err, "Failed to persist collection");
        }
    }
}

pub struct AssignmentsStore<S> {
    inner: PersistedVec<Assignment, S>,
}

impl<S: Storage> AssignmentsStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            inner: PersistedVec::new(ASSIGNMENTS_KEY, storage),
        }
    }

    pub fn hydrate(&mut self) {
        self.inner.hydrate();
    }

    pub fn state(&self) -> LoadState {
        self.inner.state
    }

    pub fn snapshot(&self) -> Snapshot<'_, Assignment> {
        self.inner.snapshot()
    }

    pub fn get(&self, id: &str) -> Option<&Assignment> {
        self.snapshot().ready()?.iter().find(|a| a.id == id)
    }

    pub fn add(&mut self, new: NewAssignment, now: NaiveDateTime) -> Result<Assignment, StoreError> {
        let assignment = Assignment {
            id: Uuid::new_v4().to_string(),
            title: new.title,
            course: new.course,
            priority: priority_for(new.due_date, now),
            due_date: new.due_date,
            completed: false,
            details: new.details,
        };
        self.inner.mutate(|items| items.push(assignment.clone()))?;
        Ok(assignment)
    }

    /// Accepts flow results in one batch. Entries whose due date does not parse are skipped.
    pub fn add_many(
        &mut self,
        parsed: &[ParsedAssignment],
        now: NaiveDateTime,
    ) -> Result<Vec<Assignment>, StoreError> {
        let batch: Vec<Assignment> = parsed
            .iter()
            .filter_map(|p| {
                let Some(day) = p.due_day() else {
                    tracing::warn!(task = %p.task, due_date = %p.due_date, "Skipping assignment with invalid due date");
                    return None;
                };
                let due_date = day.and_time(chrono::NaiveTime::MIN);
                let course = p
                    .course
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .unwrap_or(UNCATEGORIZED)
                    .to_string();
                Some(Assignment {
                    id: Uuid::new_v4().to_string(),
                    title: p.task.clone(),
                    course,
                    due_date,
                    completed: false,
                    priority: priority_for(due_date, now),
                    details: p.details.clone(),
                })
            })
            .collect();

        self.inner.mutate(|items| items.extend(batch.iter().cloned()))?;
        tracing::info!(count = batch.len(), "Added assignments");
        Ok(batch)
    }

    /// Flips completion of the matching assignment. Returns whether one matched.
    pub fn toggle(&mut self, id: &str) -> Result<bool, StoreError> {
        if self.inner.state == LoadState::Ready && !self.inner.items.iter().any(|a| a.id == id) {
            tracing::debug!(id, "Toggle for unknown assignment ignored");
            return Ok(false);
        }
        self.inner.mutate(|items| {
            for assignment in items.iter_mut().filter(|a| a.id == id) {
                assignment.completed = !assignment.completed;
            }
            true
        })
    }
}

pub struct GradesStore<S> {
    inner: PersistedVec<Course, S>,
}

impl<S: Storage> GradesStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            inner: PersistedVec::new(GRADES_KEY, storage),
        }
    }

    pub fn hydrate(&mut self) {
        self.inner.hydrate();
    }

    pub fn state(&self) -> LoadState {
        self.inner.state
    }

    pub fn snapshot(&self) -> Snapshot<'_, Course> {
        self.inner.snapshot()
    }

    pub fn replace_all(&mut self, courses: Vec<Course>) -> Result<(), StoreError> {
        let count = courses.len();
        self.inner.mutate(|items| *items = courses)?;
        tracing::info!(count, "Replaced course grades");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::Priority;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 7, 19)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn parsed(task: &str, due: &str, course: Option<&str>) -> ParsedAssignment {
        ParsedAssignment {
            task: task.to_string(),
            due_date: due.to_string(),
            course: course.map(str::to_string),
            details: None,
        }
    }

    fn ready_store(storage: MemoryStorage) -> AssignmentsStore<MemoryStorage> {
        let mut store = AssignmentsStore::new(storage);
        store.hydrate();
        store
    }

    #[test]
    fn loading_signal_before_hydrate() {
        let mut store = AssignmentsStore::new(MemoryStorage::new());
        assert_eq!(store.state(), LoadState::Uninitialized);
        assert_eq!(store.snapshot(), Snapshot::Loading);
        assert!(matches!(
            store.toggle("x"),
            Err(StoreError::NotReady(ASSIGNMENTS_KEY))
        ));

        store.hydrate();
        assert_eq!(store.state(), LoadState::Ready);
        assert_eq!(store.snapshot(), Snapshot::Ready(&[][..]));
    }

    #[test]
    fn corrupt_storage_hydrates_empty() {
        let storage = MemoryStorage::new();
        storage.set(ASSIGNMENTS_KEY, "{not json").unwrap();
        let store = ready_store(storage);
        assert_eq!(store.snapshot().ready().unwrap().len(), 0);
    }

    #[test]
    fn add_computes_priority_and_persists() {
        let storage = MemoryStorage::new();
        let mut store = ready_store(storage.clone());

        let added = store
            .add(
                NewAssignment {
                    title: "Problem set".to_string(),
                    course: "Physics 301".to_string(),
                    due_date: now() + chrono::Duration::days(4),
                    details: None,
                },
                now(),
            )
            .unwrap();

        assert_eq!(added.priority, Priority::Medium);
        assert!(!added.completed);
        let raw = storage.get(ASSIGNMENTS_KEY).unwrap().unwrap();
        assert!(raw.contains(&added.id));
    }

    #[test]
    fn add_many_defaults_course_and_skips_bad_dates() {
        let mut store = ready_store(MemoryStorage::new());
        let added = store
            .add_many(
                &[
                    parsed("Quiz 1", "2024-07-20", None),
                    parsed("Essay", "2024-08-30", Some("  ")),
                    parsed("Exam", "sometime", Some("History")),
                ],
                now(),
            )
            .unwrap();

        assert_eq!(added.len(), 2);
        assert!(added.iter().all(|a| a.course == UNCATEGORIZED));
        assert_eq!(added[0].priority, Priority::High);
        assert_eq!(added[1].priority, Priority::Low);
        let ids: std::collections::HashSet<_> = added.iter().map(|a| &a.id).collect();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn toggle_semantics() {
        let mut store = ready_store(MemoryStorage::new());
        let added = store
            .add_many(&[parsed("Quiz", "2024-07-25", Some("Math"))], now())
            .unwrap();
        let id = added[0].id.clone();
        let before = store.snapshot().ready().unwrap().to_vec();

        assert!(!store.toggle("missing").unwrap());
        assert_eq!(store.snapshot().ready().unwrap(), &before[..]);

        assert!(store.toggle(&id).unwrap());
        assert!(store.get(&id).unwrap().completed);
        assert!(store.toggle(&id).unwrap());
        assert_eq!(store.snapshot().ready().unwrap(), &before[..]);
    }

    #[test]
    fn round_trip_through_storage() {
        let storage = MemoryStorage::new();
        let mut store = ready_store(storage.clone());
        store
            .add_many(
                &[
                    parsed("Quiz", "2024-07-20", Some("Math")),
                    parsed("Paper", "2024-09-01", Some("History")),
                ],
                now(),
            )
            .unwrap();
        let first_id = store.snapshot().ready().unwrap()[0].id.clone();
        store.toggle(&first_id).unwrap();
        let expected = store.snapshot().ready().unwrap().to_vec();

        let reloaded = ready_store(storage);
        let actual = reloaded.snapshot().ready().unwrap();
        let key = |a: &Assignment| {
            (
                a.id.clone(),
                a.title.clone(),
                a.course.clone(),
                a.due_date,
                a.completed,
                a.priority,
            )
        };
        assert_eq!(
            actual.iter().map(key).collect::<Vec<_>>(),
            expected.iter().map(key).collect::<Vec<_>>()
        );
    }

    #[test]
    fn grades_replace_all() {
        let storage = MemoryStorage::new();
        let mut grades = GradesStore::new(storage.clone());
        assert_eq!(grades.snapshot(), Snapshot::Loading);
        grades.hydrate();

        grades
            .replace_all(vec![Course {
                id: "1".to_string(),
                name: "Physics 301".to_string(),
                grade: 88.0,
            }])
            .unwrap();
        grades.replace_all(Vec::new()).unwrap();

        let mut reloaded = GradesStore::new(storage);
        reloaded.hydrate();
        assert!(reloaded.snapshot().ready().unwrap().is_empty());
    }
}
