//! Embedded schema migration runner.
//!
//! Migration files live under `migrations/` as `NNN_name.sql` and are
//! compiled into the binary. Applied versions are recorded in a
//! `_migrations(version, applied_at)` table; a fresh database reports
//! version 0. Each pending migration runs inside its own transaction, so a
//! failing migration rolls back completely and leaves the recorded version
//! untouched.

use airyra_core::error::Result;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::common::db_error;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All known migrations, ascending by version.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: include_str!("../migrations/001_initial_schema.sql"),
    },
    Migration {
        version: 2,
        name: "audit_log",
        sql: include_str!("../migrations/002_audit_log.sql"),
    },
];

/// Apply every migration newer than the recorded schema version.
/// Idempotent: a second run applies nothing.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS _migrations (version INTEGER PRIMARY KEY, applied_at TEXT NOT NULL)",
    )
    .execute(pool)
    .await
    .map_err(db_error)?;

    let current = current_version(pool).await?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let mut tx = pool.begin().await.map_err(db_error)?;

        sqlx::raw_sql(migration.sql)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        sqlx::query("INSERT INTO _migrations (version, applied_at) VALUES (?, ?)")
            .bind(migration.version)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;

        tracing::info!(
            version = migration.version,
            name = migration.name,
            "applied migration"
        );
    }

    Ok(())
}

/// The highest applied migration version; 0 for a fresh database.
pub async fn current_version(pool: &SqlitePool) -> Result<i64> {
    let table_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = '_migrations')",
    )
    .fetch_one(pool)
    .await
    .map_err(db_error)?;
    if !table_exists {
        return Ok(0);
    }

    sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM _migrations")
        .fetch_one(pool)
        .await
        .map_err(db_error)
}
