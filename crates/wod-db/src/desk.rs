//! Desk operations: the authorized, compare-and-set order lifecycle.
//!
//! Every operation follows the same shape:
//!
//! ```text
//! fetch current order  →  authorization gate  →  pure plan/draft
//!                      →  atomic apply (CAS-guarded update + appends)
//! ```
//!
//! The transition checks are evaluated against the persisted status at call
//! time, and the write is contingent on that same status
//! (`UPDATE … WHERE id = $1 AND status = $expected AND not deleted`). When
//! the update matches zero rows, the operation failed — either the order is
//! gone (`NotFound`) or a concurrent operation moved it first
//! (`IllegalTransition` against the fresh status). Proof and audit rows are
//! inserted in the same transaction, so either everything commits or
//! nothing does.

use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use wod_authz::{forbid, Actor, DeskAction, ResolvedRoster};
use wod_lifecycle::{
    draft_create, draft_renewal, draft_resubmission, plan_accept, plan_audit, plan_complete,
    format_order_number, AuditDraft, OrderDraft, ProofDraft, TransitionPlan,
};
use wod_schemas::{
    AuditAction, AuditLogEntry, DeskError, Order, OrderProof, OrderStatus, ProofKind, Role,
};

use crate::{directory, registry, storage};

const ORDER_COLUMNS: &str = "id, order_number, client_info, status, assigned_employee_id, \
     created_by_cs_id, order_info_screenshot_url, acceptance_screenshot_url, \
     completion_screenshot_url, accepted_at, completed_at, created_at, updated_at";

fn order_from_row(row: &PgRow) -> Result<Order, DeskError> {
    Ok(Order {
        id: row.try_get("id").map_err(storage)?,
        order_number: row.try_get("order_number").map_err(storage)?,
        client_info: row.try_get("client_info").map_err(storage)?,
        status: OrderStatus::parse(&row.try_get::<String, _>("status").map_err(storage)?)?,
        assigned_employee_id: row.try_get("assigned_employee_id").map_err(storage)?,
        created_by_cs_id: row.try_get("created_by_cs_id").map_err(storage)?,
        order_info_screenshot_url: row.try_get("order_info_screenshot_url").map_err(storage)?,
        acceptance_screenshot_url: row.try_get("acceptance_screenshot_url").map_err(storage)?,
        completion_screenshot_url: row.try_get("completion_screenshot_url").map_err(storage)?,
        accepted_at: row.try_get("accepted_at").map_err(storage)?,
        completed_at: row.try_get("completed_at").map_err(storage)?,
        created_at: row.try_get("created_at").map_err(storage)?,
        updated_at: row.try_get("updated_at").map_err(storage)?,
    })
}

/// Fetch a visible (non-deleted) order.
pub async fn fetch_order(pool: &PgPool, order_id: i64) -> Result<Order, DeskError> {
    let row = sqlx::query(&format!(
        "select {ORDER_COLUMNS} from orders where id = $1 and not deleted"
    ))
    .bind(order_id)
    .fetch_optional(pool)
    .await
    .map_err(storage)?;

    match row {
        Some(row) => order_from_row(&row),
        None => Err(DeskError::NotFound("order")),
    }
}

/// Roster answer for the gate: only CS callers need one resolved.
async fn roster_for(
    pool: &PgPool,
    actor: &Actor,
    employee_id: i64,
) -> Result<ResolvedRoster, DeskError> {
    let manages = match actor.role {
        Role::Cs => registry::is_cs_manage_employee(pool, actor.id, employee_id).await?,
        _ => false,
    };
    Ok(ResolvedRoster(manages))
}

// ---------------------------------------------------------------------------
// Create / renew / resubmit — insert a new order
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub client_info: String,
    pub assigned_employee_id: i64,
    pub order_info_screenshot_url: Option<String>,
}

/// Dispatch a new order to an employee. CS or Admin.
pub async fn create_order(
    pool: &PgPool,
    actor: &Actor,
    req: &CreateOrderRequest,
) -> Result<Order, DeskError> {
    forbid(
        Some(actor),
        &DeskAction::CreateOrder { assigned_employee_id: req.assigned_employee_id },
        &ResolvedRoster(false),
    )?;

    let assignee = directory::find_user_by_id(pool, req.assigned_employee_id)
        .await?
        .ok_or(DeskError::NotFound("assigned employee"))?;

    let draft = draft_create(
        &req.client_info,
        &assignee,
        req.order_info_screenshot_url.as_deref(),
        actor.id,
        Utc::now(),
    )?;

    let order = insert_order(pool, &draft).await?;
    tracing::info!(order_number = %order.order_number, assigned_employee_id = order.assigned_employee_id, "order created");
    Ok(order)
}

/// Follow-on order after a COMPLETED one. The original is untouched.
pub async fn renew_order(pool: &PgPool, actor: &Actor, order_id: i64) -> Result<Order, DeskError> {
    let original = fetch_order(pool, order_id).await?;
    forbid(
        Some(actor),
        &DeskAction::RenewOrder { assigned_employee_id: original.assigned_employee_id },
        &ResolvedRoster(false),
    )?;

    let draft = draft_renewal(&original, actor.id, Utc::now())?;
    let renewal = insert_order(pool, &draft).await?;
    tracing::info!(
        original = %original.order_number,
        renewal = %renewal.order_number,
        "renewal created"
    );
    Ok(renewal)
}

/// Re-attempt of a REJECTED order: a fresh order in REJECTED_TO_SUBMIT with
/// a resubmission proof recorded against the source order.
pub async fn resubmit_order(
    pool: &PgPool,
    actor: &Actor,
    order_id: i64,
    image_url: &str,
) -> Result<Order, DeskError> {
    let original = fetch_order(pool, order_id).await?;
    forbid(
        Some(actor),
        &DeskAction::ResubmitOrder { assigned_employee_id: original.assigned_employee_id },
        &ResolvedRoster(false),
    )?;

    let draft = draft_resubmission(&original, actor.id, image_url, Utc::now())?;
    let resubmitted = insert_order(pool, &draft).await?;
    tracing::info!(
        original = %original.order_number,
        resubmitted = %resubmitted.order_number,
        "resubmission created"
    );
    Ok(resubmitted)
}

/// Insert a drafted order, allocating its number from `order_number_seq`
/// and appending any attached proof in the same transaction.
async fn insert_order(pool: &PgPool, draft: &OrderDraft) -> Result<Order, DeskError> {
    let mut tx = pool.begin().await.map_err(storage)?;

    let (seq,): (i64,) = sqlx::query_as::<_, (i64,)>("select nextval('order_number_seq')")
        .fetch_one(&mut *tx)
        .await
        .map_err(storage)?;
    let order_number = format_order_number(draft.created_at.date_naive(), seq);

    let row = sqlx::query(&format!(
        r#"
        insert into orders (
          order_number, client_info, status, assigned_employee_id, created_by_cs_id,
          order_info_screenshot_url, acceptance_screenshot_url, completion_screenshot_url,
          completed_at, created_at, updated_at
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10
        )
        returning {ORDER_COLUMNS}
        "#
    ))
    .bind(&order_number)
    .bind(&draft.client_info)
    .bind(draft.status.as_str())
    .bind(draft.assigned_employee_id)
    .bind(draft.created_by_cs_id)
    .bind(&draft.order_info_screenshot_url)
    .bind(&draft.acceptance_screenshot_url)
    .bind(&draft.completion_screenshot_url)
    .bind(draft.completed_at)
    .bind(draft.created_at)
    .fetch_one(&mut *tx)
    .await
    .map_err(storage)?;

    let order = order_from_row(&row)?;

    if let Some(proof) = &draft.proof {
        insert_proof(&mut tx, proof).await?;
    }

    tx.commit().await.map_err(storage)?;
    Ok(order)
}

// ---------------------------------------------------------------------------
// Accept / complete / audit — CAS-guarded transitions
// ---------------------------------------------------------------------------

/// Assigned employee takes a PENDING_ACCEPTANCE order.
pub async fn accept_order(
    pool: &PgPool,
    actor: &Actor,
    order_id: i64,
    image_url: &str,
) -> Result<Order, DeskError> {
    let order = fetch_order(pool, order_id).await?;
    forbid(
        Some(actor),
        &DeskAction::AcceptOrder { assigned_employee_id: order.assigned_employee_id },
        &ResolvedRoster(false),
    )?;

    let plan = plan_accept(&order, actor.id, image_url, Utc::now())?;
    let updated = apply_transition(pool, &plan).await?;
    tracing::info!(order_number = %updated.order_number, "order accepted");
    Ok(updated)
}

/// Assigned employee submits the completed work for audit.
pub async fn complete_order(
    pool: &PgPool,
    actor: &Actor,
    order_id: i64,
    image_url: &str,
) -> Result<Order, DeskError> {
    let order = fetch_order(pool, order_id).await?;
    forbid(
        Some(actor),
        &DeskAction::CompleteOrder { assigned_employee_id: order.assigned_employee_id },
        &ResolvedRoster(false),
    )?;

    let plan = plan_complete(&order, actor.id, image_url, Utc::now())?;
    let updated = apply_transition(pool, &plan).await?;
    tracing::info!(order_number = %updated.order_number, "order completed, pending audit");
    Ok(updated)
}

/// CS (owning the assigned employee) or Admin audits submitted work.
/// Exactly one audit_log row is appended per successful call.
pub async fn audit_order(
    pool: &PgPool,
    actor: &Actor,
    order_id: i64,
    action: AuditAction,
    comments: Option<&str>,
) -> Result<Order, DeskError> {
    let order = fetch_order(pool, order_id).await?;
    let roster = roster_for(pool, actor, order.assigned_employee_id).await?;
    forbid(
        Some(actor),
        &DeskAction::AuditOrder { assigned_employee_id: order.assigned_employee_id },
        &roster,
    )?;

    let plan = plan_audit(&order, actor.id, action, comments, Utc::now())?;
    let updated = apply_transition(pool, &plan).await?;
    tracing::info!(
        order_number = %updated.order_number,
        action = action.as_str(),
        "order audited"
    );
    Ok(updated)
}

/// Apply a transition plan atomically.
///
/// The order update carries the CAS guard; zero rows affected means either
/// the order vanished or the expected status no longer holds. Appended
/// proof / audit rows ride the same transaction.
pub async fn apply_transition(pool: &PgPool, plan: &TransitionPlan) -> Result<Order, DeskError> {
    let mut tx = pool.begin().await.map_err(storage)?;

    let res = sqlx::query(
        r#"
        update orders
        set status = $2,
            updated_at = $3,
            accepted_at = coalesce($4, accepted_at),
            completed_at = coalesce($5, completed_at),
            acceptance_screenshot_url = coalesce($6, acceptance_screenshot_url),
            completion_screenshot_url = coalesce($7, completion_screenshot_url)
        where id = $1 and status = $8 and not deleted
        "#,
    )
    .bind(plan.order_id)
    .bind(plan.new_status.as_str())
    .bind(plan.updated_at)
    .bind(plan.accepted_at)
    .bind(plan.completed_at)
    .bind(&plan.acceptance_screenshot_url)
    .bind(&plan.completion_screenshot_url)
    .bind(plan.expect_status.as_str())
    .execute(&mut *tx)
    .await
    .map_err(storage)?;

    if res.rows_affected() == 0 {
        // Lost the race, or the order is gone. Re-read to report which.
        drop(tx);
        let current = fetch_order(pool, plan.order_id).await?;
        return Err(DeskError::IllegalTransition {
            from: current.status,
            action: plan.action,
        });
    }

    if let Some(proof) = &plan.proof {
        insert_proof(&mut tx, proof).await?;
    }
    if let Some(audit) = &plan.audit {
        insert_audit(&mut tx, audit).await?;
    }

    tx.commit().await.map_err(storage)?;
    fetch_order(pool, plan.order_id).await
}

async fn insert_proof(
    tx: &mut Transaction<'_, Postgres>,
    proof: &ProofDraft,
) -> Result<(), DeskError> {
    sqlx::query(
        r#"
        insert into order_proofs (
          order_id, proof_type, image_url, is_resubmission, is_renewal, uploaded_at, created_at
        ) values ($1, $2, $3, $4, $5, $6, $6)
        "#,
    )
    .bind(proof.order_id)
    .bind(proof.kind.as_str())
    .bind(&proof.image_url)
    .bind(proof.is_resubmission)
    .bind(proof.is_renewal)
    .bind(proof.uploaded_at)
    .execute(&mut **tx)
    .await
    .map_err(storage)?;
    Ok(())
}

/// Append one audit row, extending the order's hash chain.
async fn insert_audit(
    tx: &mut Transaction<'_, Postgres>,
    audit: &AuditDraft,
) -> Result<(), DeskError> {
    let prev: Option<(Option<String>,)> = sqlx::query_as::<_, (Option<String>,)>(
        "select hash_self from audit_log where order_id = $1 order by id desc limit 1",
    )
    .bind(audit.order_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(storage)?;

    let mut entry = AuditLogEntry {
        id: 0,
        order_id: audit.order_id,
        auditor_id: audit.auditor_id,
        action: audit.action,
        comments: audit.comments.clone(),
        created_at: audit.created_at,
        hash_prev: None,
        hash_self: None,
    };
    wod_audit::chain_next(&mut entry, prev.and_then(|(h,)| h))
        .map_err(|e| DeskError::Storage(e.to_string()))?;

    sqlx::query(
        r#"
        insert into audit_log (order_id, auditor_id, action, comments, created_at, hash_prev, hash_self)
        values ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(entry.order_id)
    .bind(entry.auditor_id)
    .bind(entry.action.as_str())
    .bind(&entry.comments)
    .bind(entry.created_at)
    .bind(&entry.hash_prev)
    .bind(&entry.hash_self)
    .execute(&mut **tx)
    .await
    .map_err(storage)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Deletion and listings
// ---------------------------------------------------------------------------

/// Logical deletion. The row, its proofs, and its audit trail all survive.
pub async fn soft_delete_order(pool: &PgPool, actor: &Actor, order_id: i64) -> Result<(), DeskError> {
    forbid(Some(actor), &DeskAction::DeleteOrder, &ResolvedRoster(false))?;

    let res = sqlx::query(
        "update orders set deleted = true, updated_at = $2 where id = $1 and not deleted",
    )
    .bind(order_id)
    .bind(Utc::now())
    .execute(pool)
    .await
    .map_err(storage)?;

    if res.rows_affected() == 0 {
        return Err(DeskError::NotFound("order"));
    }
    tracing::info!(order_id, "order soft-deleted");
    Ok(())
}

/// Orders assigned to one employee. Employees see their own; a CS must
/// manage the employee; Admin sees all.
pub async fn orders_for_employee(
    pool: &PgPool,
    actor: &Actor,
    employee_id: i64,
) -> Result<Vec<Order>, DeskError> {
    if actor.role == Role::Employee {
        if actor.id != employee_id {
            return Err(DeskError::Forbidden(
                wod_schemas::ForbiddenReason::OwnershipDenied,
            ));
        }
        forbid(Some(actor), &DeskAction::ListOwnOrders, &ResolvedRoster(false))?;
    } else {
        let roster = roster_for(pool, actor, employee_id).await?;
        forbid(Some(actor), &DeskAction::ViewEmployee { employee_id }, &roster)?;
    }

    let rows = sqlx::query(&format!(
        "select {ORDER_COLUMNS} from orders where assigned_employee_id = $1 and not deleted order by id"
    ))
    .bind(employee_id)
    .fetch_all(pool)
    .await
    .map_err(storage)?;

    rows.iter().map(order_from_row).collect()
}

/// Orders a CS has dispatched (their own view; Admin may read any CS's).
pub async fn orders_created_by(
    pool: &PgPool,
    actor: &Actor,
    cs_user_id: i64,
) -> Result<Vec<Order>, DeskError> {
    if actor.role == Role::Cs && actor.id != cs_user_id {
        return Err(DeskError::Forbidden(
            wod_schemas::ForbiddenReason::ScopeDenied,
        ));
    }
    if actor.role == Role::Employee {
        return Err(DeskError::Forbidden(
            wod_schemas::ForbiddenReason::ScopeDenied,
        ));
    }

    let rows = sqlx::query(&format!(
        "select {ORDER_COLUMNS} from orders where created_by_cs_id = $1 and not deleted order by id"
    ))
    .bind(cs_user_id)
    .fetch_all(pool)
    .await
    .map_err(storage)?;

    rows.iter().map(order_from_row).collect()
}

/// Evidence rows for an order, oldest first.
pub async fn proofs_for_order(pool: &PgPool, order_id: i64) -> Result<Vec<OrderProof>, DeskError> {
    let rows = sqlx::query(
        r#"
        select id, order_id, proof_type, image_url, is_resubmission, is_renewal, uploaded_at
        from order_proofs
        where order_id = $1 and not deleted
        order by id
        "#,
    )
    .bind(order_id)
    .fetch_all(pool)
    .await
    .map_err(storage)?;

    rows.iter()
        .map(|row| {
            Ok(OrderProof {
                id: row.try_get("id").map_err(storage)?,
                order_id: row.try_get("order_id").map_err(storage)?,
                kind: ProofKind::parse(&row.try_get::<String, _>("proof_type").map_err(storage)?)?,
                image_url: row.try_get("image_url").map_err(storage)?,
                is_resubmission: row.try_get("is_resubmission").map_err(storage)?,
                is_renewal: row.try_get("is_renewal").map_err(storage)?,
                uploaded_at: row.try_get("uploaded_at").map_err(storage)?,
            })
        })
        .collect()
}

/// Audit rows for an order, oldest first — the order their hash chain
/// verifies in.
pub async fn audit_log_for_order(
    pool: &PgPool,
    order_id: i64,
) -> Result<Vec<AuditLogEntry>, DeskError> {
    let rows = sqlx::query(
        r#"
        select id, order_id, auditor_id, action, comments, created_at, hash_prev, hash_self
        from audit_log
        where order_id = $1
        order by id
        "#,
    )
    .bind(order_id)
    .fetch_all(pool)
    .await
    .map_err(storage)?;

    rows.iter()
        .map(|row| {
            Ok(AuditLogEntry {
                id: row.try_get("id").map_err(storage)?,
                order_id: row.try_get("order_id").map_err(storage)?,
                auditor_id: row.try_get("auditor_id").map_err(storage)?,
                action: AuditAction::parse(&row.try_get::<String, _>("action").map_err(storage)?)?,
                comments: row.try_get("comments").map_err(storage)?,
                created_at: row.try_get("created_at").map_err(storage)?,
                hash_prev: row.try_get("hash_prev").map_err(storage)?,
                hash_self: row.try_get("hash_self").map_err(storage)?,
            })
        })
        .collect()
}
