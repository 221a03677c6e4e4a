//! In-memory build store.
//!
//! Suitable for tests and local development only: no durability, state is
//! lost when the process exits. Every operation holds the write lock for
//! its whole read-modify-write, so the conditional updates are atomic.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use super::{BuildStore, MatrixClaim, PollUpdate, StoreError};
use crate::models::build::{NewTestBuild, TestBuild};

type BuildKey = (String, String);

#[derive(Debug, Default)]
struct Inner {
    builds: HashMap<BuildKey, TestBuild>,
    next_id: i64,
}

#[derive(Debug, Default)]
pub struct InMemoryBuildStore {
    inner: RwLock<Inner>,
}

fn poison_err<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Poisoned
}

fn key(app_slug: &str, build_slug: &str) -> BuildKey {
    (app_slug.to_string(), build_slug.to_string())
}

fn apply_poll(build: &mut TestBuild, update: &PollUpdate) {
    if build.step_link().is_none() {
        if let Some(link) = &update.step_link {
            build.history_id = link.history_id.clone();
            build.execution_id = link.execution_id.clone();
        }
    }
    build.last_polled_at = Some(update.polled_at);
    build.write_date = Some(Utc::now());
}

impl InMemoryBuildStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly, bypassing [`BuildStore::insert`].
    pub fn seed(&self, build: TestBuild) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(poison_err)?;
        inner.next_id = inner.next_id.max(build.id);
        inner
            .builds
            .insert(key(&build.app_slug, &build.build_slug), build);
        Ok(())
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        let inner = self.inner.read().map_err(poison_err)?;
        Ok(inner.builds.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl BuildStore for InMemoryBuildStore {
    async fn get(&self, app_slug: &str, build_slug: &str) -> Result<Option<TestBuild>, StoreError> {
        let inner = self.inner.read().map_err(poison_err)?;
        Ok(inner.builds.get(&key(app_slug, build_slug)).cloned())
    }

    async fn exists(&self, app_slug: &str, build_slug: &str) -> Result<bool, StoreError> {
        let inner = self.inner.read().map_err(poison_err)?;
        Ok(inner.builds.contains_key(&key(app_slug, build_slug)))
    }

    async fn insert(&self, new_build: NewTestBuild) -> Result<TestBuild, StoreError> {
        let mut inner = self.inner.write().map_err(poison_err)?;
        let build_key = key(&new_build.app_slug, &new_build.build_slug);
        if inner.builds.contains_key(&build_key) {
            return Err(StoreError::Duplicate {
                app_slug: new_build.app_slug,
                build_slug: new_build.build_slug,
            });
        }

        inner.next_id += 1;
        let now = Utc::now();
        let build = TestBuild {
            id: inner.next_id,
            app_slug: new_build.app_slug,
            build_slug: new_build.build_slug,
            matrix_id: String::new(),
            history_id: String::new(),
            execution_id: String::new(),
            reporting_armed: new_build.reporting_armed,
            last_polled_at: new_build.last_polled_at,
            test_started_at: None,
            create_date: Some(now),
            write_date: Some(now),
        };
        inner.builds.insert(build_key, build.clone());
        Ok(build)
    }

    async fn record_poll(&self, update: &PollUpdate) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(poison_err)?;
        if let Some(build) = inner.builds.get_mut(&key(&update.app_slug, &update.build_slug)) {
            apply_poll(build, update);
        }
        Ok(())
    }

    async fn consume_reporting(&self, update: &PollUpdate) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().map_err(poison_err)?;
        let Some(build) = inner.builds.get_mut(&key(&update.app_slug, &update.build_slug)) else {
            return Ok(false);
        };

        apply_poll(build, update);
        if !build.reporting_armed {
            return Ok(false);
        }
        build.reporting_armed = false;
        Ok(true)
    }

    async fn claim_matrix(&self, claim: &MatrixClaim) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().map_err(poison_err)?;
        let Some(build) = inner.builds.get_mut(&key(&claim.app_slug, &claim.build_slug)) else {
            return Ok(false);
        };
        if build.has_matrix() {
            return Ok(false);
        }

        build.matrix_id = claim.matrix_id.clone();
        build.reporting_armed = true;
        build.test_started_at = Some(claim.started_at);
        build.last_polled_at = Some(claim.polled_at);
        build.write_date = Some(Utc::now());
        Ok(true)
    }
}
