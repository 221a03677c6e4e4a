//! Durable build records, one per (app_slug, build_slug).
//!
//! Writes are field-scoped conditional updates rather than whole-record
//! puts: the step link is set once, `matrix_id` is claimed once, and the
//! reporting gate is consumed once. Each is a single atomic operation in
//! every backend, which is what keeps concurrent pollers from reporting a
//! completion twice.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::build::{NewTestBuild, StepLink, TestBuild};

pub use memory::InMemoryBuildStore;
pub use postgres::PgBuildStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("build {app_slug}/{build_slug} already exists")]
    Duplicate {
        app_slug: String,
        build_slug: String,
    },

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("lock poisoned")]
    Poisoned,
}

/// Result of one reconciliation pass, to be written back.
#[derive(Debug, Clone, PartialEq)]
pub struct PollUpdate {
    pub app_slug: String,
    pub build_slug: String,
    /// Newly resolved step link; ignored if the record already has one.
    pub step_link: Option<StepLink>,
    pub polled_at: DateTime<Utc>,
}

/// Start of a remote run, to be bound to a build record.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixClaim {
    pub app_slug: String,
    pub build_slug: String,
    pub matrix_id: String,
    pub started_at: DateTime<Utc>,
    pub polled_at: DateTime<Utc>,
}

#[async_trait]
pub trait BuildStore: Send + Sync + 'static {
    async fn get(&self, app_slug: &str, build_slug: &str) -> Result<Option<TestBuild>, StoreError>;

    async fn exists(&self, app_slug: &str, build_slug: &str) -> Result<bool, StoreError>;

    /// Create a record. Fails with [`StoreError::Duplicate`] if one exists.
    async fn insert(&self, new_build: NewTestBuild) -> Result<TestBuild, StoreError>;

    /// Record a poll: bump `last_polled_at`, fill an empty step link.
    async fn record_poll(&self, update: &PollUpdate) -> Result<(), StoreError>;

    /// Like [`BuildStore::record_poll`], but only while `reporting_armed`
    /// is true, disarming it in the same atomic write.
    ///
    /// Returns `true` for exactly one caller per record lifetime.
    async fn consume_reporting(&self, update: &PollUpdate) -> Result<bool, StoreError>;

    /// Bind a matrix to a record whose `matrix_id` is still empty, arming
    /// reporting. Returns `false` if another run already claimed it.
    async fn claim_matrix(&self, claim: &MatrixClaim) -> Result<bool, StoreError>;
}
