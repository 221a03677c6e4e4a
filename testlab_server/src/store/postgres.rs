//! Postgres-backed build store (diesel-async over a deadpool pool).

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::{Bool, Nullable, Text, Timestamptz};
use diesel_async::pooled_connection::deadpool::{Object, Pool};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use super::{BuildStore, MatrixClaim, PollUpdate, StoreError};
use crate::models::build::{NewTestBuild, TestBuild};
use crate::schema::testlab_builds;

pub type DbPool = Pool<AsyncPgConnection>;

/// Fills the step link only while it is empty and, when `$6` is set,
/// applies only to an armed record, disarming it.
const POLL_SQL: &str = "\
UPDATE testlab_builds SET \
    history_id = CASE WHEN history_id = '' AND $3 IS NOT NULL AND $4 IS NOT NULL \
        THEN $3 ELSE history_id END, \
    execution_id = CASE WHEN history_id = '' AND $3 IS NOT NULL AND $4 IS NOT NULL \
        THEN $4 ELSE execution_id END, \
    last_polled_at = $5, \
    reporting_armed = CASE WHEN $6 THEN FALSE ELSE reporting_armed END, \
    write_date = NOW() \
WHERE app_slug = $1 AND build_slug = $2 AND (NOT $6 OR reporting_armed)";

#[derive(Clone)]
pub struct PgBuildStore {
    pool: DbPool,
}

impl PgBuildStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<Object<AsyncPgConnection>, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }

    async fn apply_poll(&self, update: &PollUpdate, consume: bool) -> Result<usize, StoreError> {
        let mut conn = self.conn().await?;
        let (history_id, execution_id) = match &update.step_link {
            Some(link) => (Some(link.history_id.clone()), Some(link.execution_id.clone())),
            None => (None, None),
        };

        let rows = diesel::sql_query(POLL_SQL)
            .bind::<Text, _>(update.app_slug.clone())
            .bind::<Text, _>(update.build_slug.clone())
            .bind::<Nullable<Text>, _>(history_id)
            .bind::<Nullable<Text>, _>(execution_id)
            .bind::<Timestamptz, _>(update.polled_at)
            .bind::<Bool, _>(consume)
            .execute(&mut conn)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl BuildStore for PgBuildStore {
    async fn get(&self, app_slug: &str, build_slug: &str) -> Result<Option<TestBuild>, StoreError> {
        let mut conn = self.conn().await?;
        let result = testlab_builds::table
            .filter(testlab_builds::app_slug.eq(app_slug))
            .filter(testlab_builds::build_slug.eq(build_slug))
            .select(TestBuild::as_select())
            .first::<TestBuild>(&mut conn)
            .await
            .optional()?;
        Ok(result)
    }

    async fn exists(&self, app_slug: &str, build_slug: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let count: i64 = testlab_builds::table
            .filter(testlab_builds::app_slug.eq(app_slug))
            .filter(testlab_builds::build_slug.eq(build_slug))
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count > 0)
    }

    async fn insert(&self, new_build: NewTestBuild) -> Result<TestBuild, StoreError> {
        let mut conn = self.conn().await?;
        let result = diesel::insert_into(testlab_builds::table)
            .values(&new_build)
            .returning(TestBuild::as_returning())
            .get_result::<TestBuild>(&mut conn)
            .await;

        match result {
            Ok(build) => Ok(build),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                Err(StoreError::Duplicate {
                    app_slug: new_build.app_slug,
                    build_slug: new_build.build_slug,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn record_poll(&self, update: &PollUpdate) -> Result<(), StoreError> {
        let rows = self.apply_poll(update, false).await?;
        if rows == 0 {
            tracing::warn!(
                app_slug = %update.app_slug,
                build_slug = %update.build_slug,
                "Poll recorded for a build that no longer exists"
            );
        }
        Ok(())
    }

    async fn consume_reporting(&self, update: &PollUpdate) -> Result<bool, StoreError> {
        let rows = self.apply_poll(update, true).await?;
        if rows == 0 {
            // Lost the race (or already consumed): still record the poll.
            self.apply_poll(update, false).await?;
        }
        Ok(rows == 1)
    }

    async fn claim_matrix(&self, claim: &MatrixClaim) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let rows = diesel::update(
            testlab_builds::table
                .filter(testlab_builds::app_slug.eq(&claim.app_slug))
                .filter(testlab_builds::build_slug.eq(&claim.build_slug))
                .filter(testlab_builds::matrix_id.eq("")),
        )
        .set((
            testlab_builds::matrix_id.eq(&claim.matrix_id),
            testlab_builds::reporting_armed.eq(true),
            testlab_builds::test_started_at.eq(Some(claim.started_at)),
            testlab_builds::last_polled_at.eq(Some(claim.polled_at)),
            testlab_builds::write_date.eq(Some(chrono::Utc::now())),
        ))
        .execute(&mut conn)
        .await?;
        Ok(rows == 1)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use diesel_async::pooled_connection::AsyncDieselConnectionManager;

    use super::*;
    use crate::models::build::StepLink;

    /// Store over `DATABASE_URL`; `None` when no database is configured.
    async fn store() -> Option<PgBuildStore> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(url);
        let pool = Pool::builder(manager).max_size(4).build().unwrap();
        let mut conn = pool.get().await.unwrap();
        crate::migration::run_migration(&mut conn).await.unwrap();
        Some(PgBuildStore::new(pool))
    }

    async fn registered(store: &PgBuildStore) -> String {
        let build_slug = uuid::Uuid::new_v4().to_string();
        store
            .insert(NewTestBuild::registered("pg-app", &build_slug, Utc::now()))
            .await
            .unwrap();
        build_slug
    }

    fn poll(build_slug: &str, link: Option<(&str, &str)>) -> PollUpdate {
        PollUpdate {
            app_slug: "pg-app".into(),
            build_slug: build_slug.into(),
            step_link: link.map(|(h, e)| StepLink {
                history_id: h.into(),
                execution_id: e.into(),
            }),
            polled_at: Utc::now(),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_consumers_win_once() {
        let Some(store) = store().await else {
            eprintln!("DATABASE_URL not set, skipping");
            return;
        };
        let build_slug = registered(&store).await;
        let update = poll(&build_slug, Some(("h1", "e1")));

        let mut consumers = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let store = store.clone();
            let update = update.clone();
            consumers.spawn(async move { store.consume_reporting(&update).await.unwrap() });
        }
        let mut wins = 0;
        while let Some(won) = consumers.join_next().await {
            if won.unwrap() {
                wins += 1;
            }
        }

        assert_eq!(wins, 1);
        let record = store.get("pg-app", &build_slug).await.unwrap().unwrap();
        assert!(!record.reporting_armed);
        assert!(record.last_polled_at.is_some());
    }

    #[tokio::test]
    async fn step_link_is_set_once() {
        let Some(store) = store().await else {
            eprintln!("DATABASE_URL not set, skipping");
            return;
        };
        let build_slug = registered(&store).await;

        store.record_poll(&poll(&build_slug, None)).await.unwrap();
        assert!(store
            .get("pg-app", &build_slug)
            .await
            .unwrap()
            .unwrap()
            .step_link()
            .is_none());

        store.record_poll(&poll(&build_slug, Some(("h1", "e1")))).await.unwrap();
        store.record_poll(&poll(&build_slug, Some(("h2", "e2")))).await.unwrap();

        let record = store.get("pg-app", &build_slug).await.unwrap().unwrap();
        assert_eq!(record.history_id, "h1");
        assert_eq!(record.execution_id, "e1");
        assert!(record.reporting_armed);
    }

    #[tokio::test]
    async fn matrix_is_claimed_once_and_duplicates_rejected() {
        let Some(store) = store().await else {
            eprintln!("DATABASE_URL not set, skipping");
            return;
        };
        let build_slug = registered(&store).await;
        let claim = |matrix_id: &str| MatrixClaim {
            app_slug: "pg-app".into(),
            build_slug: build_slug.clone(),
            matrix_id: matrix_id.into(),
            started_at: Utc::now(),
            polled_at: Utc::now(),
        };

        assert!(store.claim_matrix(&claim("m1")).await.unwrap());
        assert!(!store.claim_matrix(&claim("m2")).await.unwrap());
        assert_eq!(
            store.get("pg-app", &build_slug).await.unwrap().unwrap().matrix_id,
            "m1"
        );

        let err = store
            .insert(NewTestBuild::registered("pg-app", &build_slug, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }
}
