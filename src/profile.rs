//! The user profile, saved study plan and small string preferences.

use crate::error::StoreError;
use crate::models::{StudyPlan, User};
use crate::store::{read_json, write_json, Storage};

pub const USER_KEY: &str = "agendaUser";
pub const STUDY_PLAN_KEY: &str = "agendaStudyPlan";
pub const PORTAL_URL_KEY: &str = "studentPortalUrl";
pub const MEETING_LINK_KEY: &str = "zoomLink";

/// Plain-string preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preference {
    PortalUrl,
    MeetingLink,
}

impl Preference {
    pub fn key(self) -> &'static str {
        match self {
            Preference::PortalUrl => PORTAL_URL_KEY,
            Preference::MeetingLink => MEETING_LINK_KEY,
        }
    }
}

pub struct Profile<S> {
    storage: S,
}

impl<S: Storage> Profile<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// The stored user, if the name prompt has been answered. A corrupt record counts as
    /// absent so the prompt is shown again.
    pub fn user(&self) -> Option<User> {
        match read_json(&self.storage, USER_KEY) {
            Ok(user) => user,
            Err(err) => {
                tracing::error!(error = %err, "Failed to load user profile");
                None
            }
        }
    }

    /// Answers the first-run name prompt. Blank names are ignored.
    pub fn create_user(&self, name: &str) -> Result<Option<User>, StoreError> {
        if name.trim().is_empty() {
            return Ok(None);
        }
        let user = User::new(name);
        write_json(&self.storage, USER_KEY, &user)?;
        tracing::info!(name = %user.name, "Created user profile");
        Ok(Some(user))
    }

    pub fn preference(&self, pref: Preference) -> Option<String> {
        match self.storage.get(pref.key()) {
            Ok(value) => value,
            Err(err) => {
                tracing::error!(key = pref.key(), error = %err, "Failed to read preference");
                None
            }
        }
    }

    pub fn set_preference(&self, pref: Preference, value: &str) -> Result<(), StoreError> {
        let value = value.trim();
        if value.is_empty() {
            self.storage.remove(pref.key())
        } else {
            self.storage.set(pref.key(), value)
        }
    }

    pub fn study_plan(&self) -> Option<StudyPlan> {
        match read_json(&self.storage, STUDY_PLAN_KEY) {
            Ok(plan) => plan,
            Err(err) => {
                tracing::error!(error = %err, "Failed to load saved study plan");
                None
            }
        }
    }

    pub fn save_study_plan(&self, plan: &StudyPlan) -> Result<(), StoreError> {
        write_json(&self.storage, STUDY_PLAN_KEY, plan)
    }
}
