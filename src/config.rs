use std::env;

use anyhow::{anyhow, Result};

use crate::openai::OPENAI_API_URL;

pub const DEFAULT_DB_PATH: &str = "./agenda.db";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Settings read from the environment (after `.env` is loaded).
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_api_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|val| !val.trim().is_empty());
        Self {
            db_path: non_empty("AGENDA_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            openai_api_key: non_empty("OPENAI_API_KEY"),
            openai_model: non_empty("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            openai_api_url: non_empty("OPENAI_API_URL").unwrap_or_else(|| OPENAI_API_URL.to_string()),
        }
    }

    /// The AI commands cannot run without a key; everything else can.
    pub fn require_api_key(&self) -> Result<String> {
        self.openai_api_key
            .clone()
            .ok_or_else(|| anyhow!("OPENAI_API_KEY must be set in .env file"))
    }
}
