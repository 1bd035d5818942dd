//! CS ↔ employee assignment registry.
//!
//! The active-pair invariant is enforced by the partial unique index
//! `uq_mapping_active`, not by a read-then-insert check, so concurrent
//! creates cannot slip a duplicate through. Reassignment runs its
//! delete-then-create inside one transaction: the employee is never left
//! unmapped by a half-applied reassign.

use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use wod_schemas::{AssignmentMapping, DeskError};

use crate::{is_unique_constraint_violation, storage};

const MAPPING_COLUMNS: &str = "id, cs_user_id, employee_user_id, created_at, updated_at";

fn mapping_from_row(row: &PgRow) -> Result<AssignmentMapping, DeskError> {
    Ok(AssignmentMapping {
        id: row.try_get("id").map_err(storage)?,
        cs_user_id: row.try_get("cs_user_id").map_err(storage)?,
        employee_user_id: row.try_get("employee_user_id").map_err(storage)?,
        created_at: row.try_get("created_at").map_err(storage)?,
        updated_at: row.try_get("updated_at").map_err(storage)?,
    })
}

/// Create one mapping. `Conflict` when an active mapping for the exact pair
/// already exists.
pub async fn create_mapping(
    pool: &PgPool,
    cs_user_id: i64,
    employee_user_id: i64,
) -> Result<AssignmentMapping, DeskError> {
    let res = sqlx::query(&format!(
        r#"
        insert into cs_employee_mappings (cs_user_id, employee_user_id, created_at, updated_at)
        values ($1, $2, $3, $3)
        returning {MAPPING_COLUMNS}
        "#
    ))
    .bind(cs_user_id)
    .bind(employee_user_id)
    .bind(Utc::now())
    .fetch_one(pool)
    .await;

    match res {
        Ok(row) => {
            let mapping = mapping_from_row(&row)?;
            tracing::info!(cs_user_id, employee_user_id, "mapping created");
            Ok(mapping)
        }
        Err(e) if is_unique_constraint_violation(&e, "uq_mapping_active") => {
            Err(DeskError::Conflict(format!(
                "active mapping already exists: cs={cs_user_id} employee={employee_user_id}"
            )))
        }
        Err(e) => Err(storage(e)),
    }
}

/// Best-effort batch create. Pairs that already have an active mapping are
/// skipped and logged; they never fail the batch.
pub async fn batch_create_mappings(
    pool: &PgPool,
    cs_user_id: i64,
    employee_user_ids: &[i64],
) -> Result<Vec<AssignmentMapping>, DeskError> {
    let mut created = Vec::new();

    for &employee_user_id in employee_user_ids {
        match create_mapping(pool, cs_user_id, employee_user_id).await {
            Ok(m) => created.push(m),
            Err(DeskError::Conflict(_)) => {
                tracing::warn!(cs_user_id, employee_user_id, "skipping existing mapping");
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        cs_user_id,
        total = employee_user_ids.len(),
        created = created.len(),
        "batch mapping create finished"
    );
    Ok(created)
}

/// Move an employee to a new owning CS.
///
/// Soft-deletes every active mapping for the employee and creates the new
/// one atomically; afterwards exactly one active mapping exists for the
/// employee.
pub async fn reassign_employee(
    pool: &PgPool,
    employee_user_id: i64,
    new_cs_user_id: i64,
) -> Result<AssignmentMapping, DeskError> {
    let now = Utc::now();
    let mut tx = pool.begin().await.map_err(storage)?;

    sqlx::query(
        r#"
        update cs_employee_mappings
        set deleted = true, updated_at = $2
        where employee_user_id = $1 and not deleted
        "#,
    )
    .bind(employee_user_id)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(storage)?;

    let row = sqlx::query(&format!(
        r#"
        insert into cs_employee_mappings (cs_user_id, employee_user_id, created_at, updated_at)
        values ($1, $2, $3, $3)
        returning {MAPPING_COLUMNS}
        "#
    ))
    .bind(new_cs_user_id)
    .bind(employee_user_id)
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .map_err(storage)?;

    let mapping = mapping_from_row(&row)?;
    tx.commit().await.map_err(storage)?;

    tracing::info!(employee_user_id, new_cs_user_id, "employee reassigned");
    Ok(mapping)
}

/// Soft-delete one mapping by id.
pub async fn delete_mapping(pool: &PgPool, id: i64) -> Result<(), DeskError> {
    let res = sqlx::query(
        "update cs_employee_mappings set deleted = true, updated_at = $2 where id = $1 and not deleted",
    )
    .bind(id)
    .bind(Utc::now())
    .execute(pool)
    .await
    .map_err(storage)?;

    if res.rows_affected() == 0 {
        return Err(DeskError::NotFound("mapping"));
    }
    Ok(())
}

/// The roster query the authorization gate scopes CS actions with.
pub async fn is_cs_manage_employee(
    pool: &PgPool,
    cs_user_id: i64,
    employee_user_id: i64,
) -> Result<bool, DeskError> {
    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1 from cs_employee_mappings
            where cs_user_id = $1 and employee_user_id = $2 and not deleted
        )
        "#,
    )
    .bind(cs_user_id)
    .bind(employee_user_id)
    .fetch_one(pool)
    .await
    .map_err(storage)?;

    Ok(exists)
}

pub async fn mappings_for_cs(
    pool: &PgPool,
    cs_user_id: i64,
) -> Result<Vec<AssignmentMapping>, DeskError> {
    let rows = sqlx::query(&format!(
        "select {MAPPING_COLUMNS} from cs_employee_mappings where cs_user_id = $1 and not deleted order by id"
    ))
    .bind(cs_user_id)
    .fetch_all(pool)
    .await
    .map_err(storage)?;

    rows.iter().map(mapping_from_row).collect()
}

pub async fn mappings_for_employee(
    pool: &PgPool,
    employee_user_id: i64,
) -> Result<Vec<AssignmentMapping>, DeskError> {
    let rows = sqlx::query(&format!(
        "select {MAPPING_COLUMNS} from cs_employee_mappings where employee_user_id = $1 and not deleted order by id"
    ))
    .bind(employee_user_id)
    .fetch_all(pool)
    .await
    .map_err(storage)?;

    rows.iter().map(mapping_from_row).collect()
}
