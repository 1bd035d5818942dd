//! Transition plans and new-order drafts.
//!
//! A plan is a validated decision, not an applied mutation. The builders
//! take the current persisted snapshot plus the acting employee/auditor,
//! re-check ownership and status, and emit everything the storage layer
//! must write in one atomic step. `now` is passed in by the caller so the
//! builders stay deterministic under test.

use chrono::{DateTime, Utc};
use wod_schemas::{
    AuditAction, DeskError, ForbiddenReason, Order, OrderStatus, ProofKind, Role, UserRecord,
};

use crate::state_machine::{transition, OrderEvent};

// ---------------------------------------------------------------------------
// Drafts for appended rows
// ---------------------------------------------------------------------------

/// An evidence row to append alongside a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofDraft {
    /// Order the proof evidences. For a resubmission this is the *source*
    /// (rejected) order, matching how the evidence log reads historically.
    pub order_id: i64,
    pub kind: ProofKind,
    pub image_url: String,
    pub is_resubmission: bool,
    pub is_renewal: bool,
    pub uploaded_at: DateTime<Utc>,
}

/// An audit decision row to append. Exactly one per audit call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditDraft {
    pub order_id: i64,
    pub auditor_id: i64,
    pub action: AuditAction,
    pub comments: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// TransitionPlan
// ---------------------------------------------------------------------------

/// Everything one in-place transition writes, plus the compare-and-set guard.
///
/// The storage layer must apply the order update contingent on
/// `expect_status` still being the row's status; zero rows updated means
/// the race was lost (or the order vanished) and nothing else may be
/// written.
#[derive(Debug, Clone)]
pub struct TransitionPlan {
    pub order_id: i64,
    /// Operation name, for error reporting and logs.
    pub action: &'static str,
    /// CAS guard: the status the order must still hold at apply time.
    pub expect_status: OrderStatus,
    pub new_status: OrderStatus,
    pub updated_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub acceptance_screenshot_url: Option<String>,
    pub completion_screenshot_url: Option<String>,
    pub proof: Option<ProofDraft>,
    pub audit: Option<AuditDraft>,
}

fn require_owner(order: &Order, employee_id: i64) -> Result<(), DeskError> {
    if order.assigned_employee_id != employee_id {
        return Err(DeskError::Forbidden(ForbiddenReason::OwnershipDenied));
    }
    Ok(())
}

/// Accept: PENDING_ACCEPTANCE → IN_PROGRESS, by the assigned employee only.
pub fn plan_accept(
    order: &Order,
    employee_id: i64,
    image_url: &str,
    now: DateTime<Utc>,
) -> Result<TransitionPlan, DeskError> {
    require_owner(order, employee_id)?;
    let new_status = transition(order.status, OrderEvent::Accept)?;

    Ok(TransitionPlan {
        order_id: order.id,
        action: "accept",
        expect_status: order.status,
        new_status,
        updated_at: now,
        accepted_at: Some(now),
        completed_at: None,
        acceptance_screenshot_url: Some(image_url.to_string()),
        completion_screenshot_url: None,
        proof: Some(ProofDraft {
            order_id: order.id,
            kind: ProofKind::Acceptance,
            image_url: image_url.to_string(),
            is_resubmission: false,
            is_renewal: false,
            uploaded_at: now,
        }),
        audit: None,
    })
}

/// Complete: IN_PROGRESS → PENDING_AUDIT, by the assigned employee only.
pub fn plan_complete(
    order: &Order,
    employee_id: i64,
    image_url: &str,
    now: DateTime<Utc>,
) -> Result<TransitionPlan, DeskError> {
    require_owner(order, employee_id)?;
    let new_status = transition(order.status, OrderEvent::Complete)?;

    Ok(TransitionPlan {
        order_id: order.id,
        action: "complete",
        expect_status: order.status,
        new_status,
        updated_at: now,
        accepted_at: None,
        completed_at: Some(now),
        acceptance_screenshot_url: None,
        completion_screenshot_url: Some(image_url.to_string()),
        proof: Some(ProofDraft {
            order_id: order.id,
            kind: ProofKind::Completion,
            image_url: image_url.to_string(),
            is_resubmission: false,
            is_renewal: false,
            uploaded_at: now,
        }),
        audit: None,
    })
}

/// Audit: PENDING_AUDIT | REJECTED_TO_SUBMIT → COMPLETED | REJECTED.
///
/// Roster scoping of the auditor happens in the authorization gate; this
/// builder only validates the status machine and appends the log row.
pub fn plan_audit(
    order: &Order,
    auditor_id: i64,
    action: AuditAction,
    comments: Option<&str>,
    now: DateTime<Utc>,
) -> Result<TransitionPlan, DeskError> {
    let new_status = transition(order.status, OrderEvent::Audit(action))?;

    Ok(TransitionPlan {
        order_id: order.id,
        action: match action {
            AuditAction::Approve => "audit/approve",
            AuditAction::Reject => "audit/reject",
        },
        expect_status: order.status,
        new_status,
        updated_at: now,
        accepted_at: None,
        completed_at: None,
        acceptance_screenshot_url: None,
        completion_screenshot_url: None,
        proof: None,
        audit: Some(AuditDraft {
            order_id: order.id,
            auditor_id,
            action,
            comments: comments.map(str::to_string),
            created_at: now,
        }),
    })
}

// ---------------------------------------------------------------------------
// OrderDraft
// ---------------------------------------------------------------------------

/// A brand-new order, pre-numbering. The order number is allocated by the
/// storage layer at insert time from its persistent sequence.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub client_info: String,
    pub status: OrderStatus,
    pub assigned_employee_id: i64,
    pub created_by_cs_id: i64,
    pub order_info_screenshot_url: Option<String>,
    pub acceptance_screenshot_url: Option<String>,
    pub completion_screenshot_url: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Evidence appended in the same atomic step as the insert.
    pub proof: Option<ProofDraft>,
}

/// Dispatch a fresh order to an employee.
///
/// # Errors
/// [`DeskError::Validation`] when `client_info` is blank or `assignee` is
/// not an active EMPLOYEE user.
pub fn draft_create(
    client_info: &str,
    assignee: &UserRecord,
    screenshot_url: Option<&str>,
    cs_user_id: i64,
    now: DateTime<Utc>,
) -> Result<OrderDraft, DeskError> {
    if client_info.trim().is_empty() {
        return Err(DeskError::Validation("client_info must not be blank".into()));
    }
    if assignee.role != Role::Employee || !assignee.active {
        return Err(DeskError::Validation(format!(
            "user {} is not an active employee",
            assignee.id
        )));
    }

    Ok(OrderDraft {
        client_info: client_info.to_string(),
        status: OrderStatus::PendingAcceptance,
        assigned_employee_id: assignee.id,
        created_by_cs_id: cs_user_id,
        order_info_screenshot_url: screenshot_url.map(str::to_string),
        acceptance_screenshot_url: None,
        completion_screenshot_url: None,
        completed_at: None,
        created_at: now,
        proof: None,
    })
}

/// Renewal: a follow-on order after a COMPLETED one. Additive only — the
/// original is untouched and keeps its id, number and status.
pub fn draft_renewal(
    original: &Order,
    employee_id: i64,
    now: DateTime<Utc>,
) -> Result<OrderDraft, DeskError> {
    require_owner(original, employee_id)?;
    if original.status != OrderStatus::Completed {
        return Err(DeskError::IllegalTransition {
            from: original.status,
            action: "renew",
        });
    }

    Ok(OrderDraft {
        client_info: original.client_info.clone(),
        status: OrderStatus::PendingAcceptance,
        assigned_employee_id: employee_id,
        created_by_cs_id: original.created_by_cs_id,
        order_info_screenshot_url: original.order_info_screenshot_url.clone(),
        acceptance_screenshot_url: None,
        completion_screenshot_url: None,
        completed_at: None,
        created_at: now,
        proof: None,
    })
}

/// Resubmission: re-attempt of a REJECTED order's completion step.
///
/// Creates a new order already in REJECTED_TO_SUBMIT, carrying the client
/// info and prior screenshots forward, with the fresh completion screenshot
/// and a COMPLETION proof flagged `is_resubmission` recorded against the
/// source order.
pub fn draft_resubmission(
    original: &Order,
    employee_id: i64,
    image_url: &str,
    now: DateTime<Utc>,
) -> Result<OrderDraft, DeskError> {
    require_owner(original, employee_id)?;
    if original.status != OrderStatus::Rejected {
        return Err(DeskError::IllegalTransition {
            from: original.status,
            action: "resubmit",
        });
    }

    Ok(OrderDraft {
        client_info: original.client_info.clone(),
        status: OrderStatus::RejectedToSubmit,
        assigned_employee_id: employee_id,
        created_by_cs_id: original.created_by_cs_id,
        order_info_screenshot_url: original.order_info_screenshot_url.clone(),
        acceptance_screenshot_url: original.acceptance_screenshot_url.clone(),
        completion_screenshot_url: Some(image_url.to_string()),
        completed_at: Some(now),
        created_at: now,
        proof: Some(ProofDraft {
            order_id: original.id,
            kind: ProofKind::Completion,
            image_url: image_url.to_string(),
            is_resubmission: true,
            is_renewal: false,
            uploaded_at: now,
        }),
    })
}
