//! Startup migration for the `testlab_builds` table.

use diesel_async::AsyncPgConnection;
use diesel_async::SimpleAsyncConnection;

/// SQL migration for the build record table.
///
/// Idempotent: safe to run on every startup.
pub const MIGRATION_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS testlab_builds (
    id              BIGSERIAL PRIMARY KEY,
    app_slug        VARCHAR(255) NOT NULL,
    build_slug      VARCHAR(255) NOT NULL,
    matrix_id       VARCHAR(255) NOT NULL DEFAULT '',
    history_id      VARCHAR(255) NOT NULL DEFAULT '',
    execution_id    VARCHAR(255) NOT NULL DEFAULT '',
    reporting_armed BOOLEAN NOT NULL DEFAULT TRUE,
    last_polled_at  TIMESTAMPTZ,
    test_started_at TIMESTAMPTZ,
    create_date     TIMESTAMPTZ DEFAULT NOW(),
    write_date      TIMESTAMPTZ DEFAULT NOW(),
    CONSTRAINT testlab_builds_step_link CHECK ((history_id = '') = (execution_id = ''))
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_testlab_builds_slugs ON testlab_builds (app_slug, build_slug);
CREATE INDEX IF NOT EXISTS idx_testlab_builds_matrix ON testlab_builds (matrix_id);
"#;

/// Run the build record migration.
pub async fn run_migration(conn: &mut AsyncPgConnection) -> anyhow::Result<()> {
    conn.batch_execute(MIGRATION_SQL)
        .await
        .map_err(|e| anyhow::anyhow!("testlab migration failed: {e}"))?;
    Ok(())
}
