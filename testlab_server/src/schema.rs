//! Diesel table definitions for the test status service.
//!
//! One row per (app_slug, build_slug). Unresolved remote identifiers are
//! stored as empty strings.

diesel::table! {
    testlab_builds (id) {
        id -> Int8,
        app_slug -> Varchar,
        build_slug -> Varchar,
        matrix_id -> Varchar,
        history_id -> Varchar,
        execution_id -> Varchar,
        reporting_armed -> Bool,
        last_polled_at -> Nullable<Timestamptz>,
        test_started_at -> Nullable<Timestamptz>,
        create_date -> Nullable<Timestamptz>,
        write_date -> Nullable<Timestamptz>,
    }
}
