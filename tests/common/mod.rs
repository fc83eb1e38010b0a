//! Common test utilities for integration tests
//!
//! Provides an in-memory school database (student, subject, score), the
//! matching graph spec, and polling helpers.

#![allow(dead_code)]

use std::sync::Arc;

use entity_graph::adapters::sqlite::{create_test_pool, SqliteQueryExecutor};
use entity_graph::{EntityGraph, EntitySpec, GraphOptions, GraphSpec, QueryExecutor};
use sqlx::SqlitePool;

const SCHEMA: &str = r"
CREATE TABLE student (
    id INTEGER PRIMARY KEY,
    external_id INTEGER,
    name TEXT NOT NULL,
    last_updated TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE subject (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    last_updated TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE score (
    student_id INTEGER,
    subject_id INTEGER NOT NULL,
    score INTEGER NOT NULL,
    last_updated TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (student_id, subject_id)
);
";

/// In-memory database with the school schema and no rows.
pub async fn school_pool() -> SqlitePool {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .expect("Failed to create schema");
    }
    pool
}

/// `student` (external_id = id + 999), `subject`, and `score` linked to
/// `student` by primary key.
pub fn school_spec() -> GraphSpec {
    GraphSpec::new()
        .entity(
            "student",
            EntitySpec::new(["id"])
                .columns(["name"])
                .id_maps(["external_id"]),
        )
        .entity("subject", EntitySpec::new(["id"]).columns(["name"]))
        .entity(
            "score",
            EntitySpec::new(["student_id", "subject_id"])
                .columns(["score"])
                .foreign_key("student_id", "student.id")
                .expect("valid reference")
                .foreign_key("subject_id", "subject.id")
                .expect("valid reference"),
        )
}

pub fn executor(pool: &SqlitePool) -> Arc<dyn QueryExecutor> {
    Arc::new(SqliteQueryExecutor::new(pool.clone()))
}

pub fn graph_over(pool: &SqlitePool, spec: GraphSpec, options: GraphOptions) -> EntityGraph {
    EntityGraph::new(spec, options, executor(pool)).expect("Failed to construct graph")
}

pub async fn insert_student(pool: &SqlitePool, id: i64, name: &str) {
    sqlx::query("INSERT INTO student (id, external_id, name) VALUES (?, ?, ?)")
        .bind(id)
        .bind(id + 999)
        .bind(name)
        .execute(pool)
        .await
        .expect("Failed to insert student");
}

pub async fn insert_subject(pool: &SqlitePool, id: i64, name: &str) {
    sqlx::query("INSERT INTO subject (id, name) VALUES (?, ?)")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await
        .expect("Failed to insert subject");
}

pub async fn insert_score(pool: &SqlitePool, student_id: i64, subject_id: i64, score: i64) {
    sqlx::query("INSERT INTO score (student_id, subject_id, score) VALUES (?, ?, ?)")
        .bind(student_id)
        .bind(subject_id)
        .bind(score)
        .execute(pool)
        .await
        .expect("Failed to insert score");
}

/// Three students, two subjects, four scores.
pub async fn seed_school(pool: &SqlitePool) {
    for (id, name) in [(1, "Ada"), (2, "Brian"), (3, "Chloe")] {
        insert_student(pool, id, name).await;
    }
    insert_subject(pool, 1, "Maths").await;
    insert_subject(pool, 2, "Physics").await;
    insert_score(pool, 1, 1, 91).await;
    insert_score(pool, 1, 2, 78).await;
    insert_score(pool, 2, 1, 64).await;
    insert_score(pool, 3, 2, 88).await;
}

/// Move every row of `table` outside any recent update window.
pub async fn age_rows(pool: &SqlitePool, table: &str) {
    sqlx::query(&format!(
        "UPDATE {table} SET last_updated = datetime('now', '-1 day')"
    ))
    .execute(pool)
    .await
    .expect("Failed to age rows");
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Poll `predicate` every 20ms until it holds or `timeout_ms` elapses.
pub async fn wait_for<F>(mut predicate: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if predicate() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    predicate()
}
