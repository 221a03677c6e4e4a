//! Data models for remote test runs.

pub mod build;
pub mod matrix;
pub mod run_request;
pub mod step;
