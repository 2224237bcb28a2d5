//! Agenda+: a student planner for assignments, grades and study plans, with LLM-assisted
//! import of free text, syllabi and grade-portal pages.

pub mod app;
pub mod attachment;
pub mod calendar;
pub mod config;
pub mod db;
pub mod error;
pub mod flows;
pub mod logger;
pub mod models;
pub mod openai;
pub mod profile;
pub mod schema;
pub mod session;
pub mod store;
pub mod views;
