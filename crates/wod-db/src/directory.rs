//! Identity & role directory.
//!
//! Lookup-only from the desk's point of view; user provisioning is an admin
//! concern exposed as [`create_user`] / [`set_user_active`].

use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use wod_schemas::{DeskError, Role, UserRecord};

use crate::{is_unique_constraint_violation, storage};

const USER_COLUMNS: &str =
    "id, username, real_name, phone, role, active, created_at, updated_at";

fn user_from_row(row: &PgRow) -> Result<UserRecord, DeskError> {
    Ok(UserRecord {
        id: row.try_get("id").map_err(storage)?,
        username: row.try_get("username").map_err(storage)?,
        real_name: row.try_get("real_name").map_err(storage)?,
        phone: row.try_get("phone").map_err(storage)?,
        role: Role::parse(&row.try_get::<String, _>("role").map_err(storage)?)?,
        active: row.try_get("active").map_err(storage)?,
        created_at: row.try_get("created_at").map_err(storage)?,
        updated_at: row.try_get("updated_at").map_err(storage)?,
    })
}

pub async fn find_user_by_id(pool: &PgPool, id: i64) -> Result<Option<UserRecord>, DeskError> {
    let row = sqlx::query(&format!(
        "select {USER_COLUMNS} from users where id = $1 and not deleted"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(storage)?;

    row.as_ref().map(user_from_row).transpose()
}

pub async fn find_user_by_username(
    pool: &PgPool,
    username: &str,
) -> Result<Option<UserRecord>, DeskError> {
    let row = sqlx::query(&format!(
        "select {USER_COLUMNS} from users where username = $1 and not deleted"
    ))
    .bind(username)
    .fetch_optional(pool)
    .await
    .map_err(storage)?;

    row.as_ref().map(user_from_row).transpose()
}

pub async fn find_user_by_phone(
    pool: &PgPool,
    phone: &str,
) -> Result<Option<UserRecord>, DeskError> {
    let row = sqlx::query(&format!(
        "select {USER_COLUMNS} from users where phone = $1 and not deleted"
    ))
    .bind(phone)
    .fetch_optional(pool)
    .await
    .map_err(storage)?;

    row.as_ref().map(user_from_row).transpose()
}

pub async fn list_users_by_role(pool: &PgPool, role: Role) -> Result<Vec<UserRecord>, DeskError> {
    let rows = sqlx::query(&format!(
        "select {USER_COLUMNS} from users where role = $1 and not deleted order by id"
    ))
    .bind(role.as_str())
    .fetch_all(pool)
    .await
    .map_err(storage)?;

    rows.iter().map(user_from_row).collect()
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub real_name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub active: bool,
}

/// Provision a user. `Conflict` when the username is already taken.
pub async fn create_user(pool: &PgPool, user: &NewUser) -> Result<UserRecord, DeskError> {
    let now = Utc::now();
    let res = sqlx::query(&format!(
        r#"
        insert into users (username, real_name, phone, role, active, created_at, updated_at)
        values ($1, $2, $3, $4, $5, $6, $6)
        returning {USER_COLUMNS}
        "#
    ))
    .bind(&user.username)
    .bind(&user.real_name)
    .bind(&user.phone)
    .bind(user.role.as_str())
    .bind(user.active)
    .bind(now)
    .fetch_one(pool)
    .await;

    match res {
        Ok(row) => {
            let created = user_from_row(&row)?;
            tracing::info!(user_id = created.id, username = %created.username, role = %created.role.as_str(), "user created");
            Ok(created)
        }
        Err(e) if is_unique_constraint_violation(&e, "uq_users_username") => Err(
            DeskError::Conflict(format!("username already taken: {}", user.username)),
        ),
        Err(e) => Err(storage(e)),
    }
}

/// Flip the active flag. Role checks react immediately: an inactive user
/// fails both login and order assignment from the next read onward.
pub async fn set_user_active(pool: &PgPool, id: i64, active: bool) -> Result<(), DeskError> {
    let res = sqlx::query(
        "update users set active = $2, updated_at = $3 where id = $1 and not deleted",
    )
    .bind(id)
    .bind(active)
    .bind(Utc::now())
    .execute(pool)
    .await
    .map_err(storage)?;

    if res.rows_affected() == 0 {
        return Err(DeskError::NotFound("user"));
    }
    Ok(())
}
