//! Rubriq: rubric-based grading backed by an LLM evaluator.
//!
//! Assignments group questions under one shared rubric. Student answers come
//! in through CSV import or a hosted live test, are scored by the evaluation
//! gateway, validated and aggregated by [`scoring`], and persisted by
//! [`db::Database`].

pub mod analytics;
pub mod api;
pub mod config;
pub mod csv_import;
pub mod db;
pub mod error;
pub mod gateway;
pub mod grading;
pub mod hosting;
pub mod models;
pub mod scoring;
pub mod similarity;

pub use error::{Error, Result};
