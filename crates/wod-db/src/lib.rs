//! Postgres persistence for the work-order desk.
//!
//! Layout mirrors the domain components:
//! - [`directory`] — user lookup (id / username / phone, role listing)
//! - [`registry`]  — CS ↔ employee assignment mappings
//! - [`desk`]      — the order operations: fetch → authorize → plan →
//!   apply, with every status flip guarded by a compare-and-set on the
//!   expected prior status
//!
//! Soft deletion is a visibility predicate: every read in this crate
//! filters `not deleted`; nothing is ever physically removed.

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};
use wod_schemas::DeskError;

pub mod desk;
pub mod directory;
pub mod registry;

pub const ENV_DB_URL: &str = "WOD_DATABASE_URL";

/// Connect to Postgres using WOD_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL)
        .with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='orders'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus { ok, has_orders_table: exists })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_orders_table: bool,
}

/// Map a low-level sqlx failure into the desk taxonomy.
pub(crate) fn storage(err: sqlx::Error) -> DeskError {
    DeskError::Storage(err.to_string())
}

/// Detect a Postgres unique constraint violation by name.
pub(crate) fn is_unique_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint() == Some(constraint),
        _ => false,
    }
}
