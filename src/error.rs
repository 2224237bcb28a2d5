use thiserror::Error;

/// Failure of a prompt flow.
///
/// An empty extraction is not an error; list flows report it as
/// [`crate::app::ImportOutcome::NothingFound`].
#[derive(Debug, Error)]
pub enum FlowError {
    /// Input rejected locally; nothing was sent.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("prompt service failed: {0}")]
    Service(String),

    /// The service answered but produced nothing usable.
    #[error("{flow} returned no result")]
    NoResult { flow: &'static str },

    #[error("{flow} reply does not match its schema: {reason}")]
    SchemaMismatch { flow: &'static str, reason: String },

    #[error("suggested schedule could not be parsed: {0}")]
    ScheduleParse(String),
}

impl FlowError {
    pub fn schema(flow: &'static str, reason: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            flow,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend failed: {0}")]
    Backend(String),

    #[error("store `{0}` has not finished loading")]
    NotReady(&'static str),

    #[error("stored value under `{key}` is corrupt: {source}")]
    Corrupt {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize `{key}`: {source}")]
    Serialize {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Backend(err.to_string())
    }
}
