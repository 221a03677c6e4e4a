//! Test run services: reconciliation, run start, asset brokering.

pub mod asset_service;
pub mod classifier;
pub mod retry;
pub mod run_service;
pub mod status_service;
