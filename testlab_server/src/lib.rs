//! Testlab — status reconciliation for remote device test runs.
//!
//! Tracks a build's test matrix from asset upload through completion,
//! polling the remote test API on behalf of clients and reporting each
//! run's completion to analytics once.

pub mod assets;
pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod migration;
pub mod models;
pub mod remote;
pub mod routes;
pub mod schema;
pub mod services;
pub mod store;
