//! Shared domain types for the work-order desk.
//!
//! Everything here is a plain data shape. Behaviour (transition validation,
//! authorization, persistence) lives in the crates that own it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Closed set of principal roles. A user holds exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Cs,
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Cs => "CS",
            Role::Employee => "EMPLOYEE",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DeskError> {
        match s {
            "ADMIN" => Ok(Role::Admin),
            "CS" => Ok(Role::Cs),
            "EMPLOYEE" => Ok(Role::Employee),
            other => Err(DeskError::Validation(format!("invalid role: {other}"))),
        }
    }
}

/// A directory user. `active` is the login/assignment gate; inactive users
/// keep their rows (soft-delete convention) but cannot act or be assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub real_name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// CS ↔ employee assignment
// ---------------------------------------------------------------------------

/// An active roster mapping: `cs_user_id` owns `employee_user_id`.
///
/// At most one active row exists per (cs, employee) pair, and reassignment
/// keeps each employee under at most one active CS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentMapping {
    pub id: i64,
    pub cs_user_id: i64,
    pub employee_user_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// All statuses a work order can occupy.
///
/// `Completed` and `Rejected` are terminal for the order itself; renewal and
/// resubmission create *new* orders rather than transitioning the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Created by a CS, waiting for the assigned employee to accept.
    PendingAcceptance,
    /// Accepted; the employee is working the order.
    InProgress,
    /// Completion screenshot uploaded, waiting for a CS/Admin audit.
    PendingAudit,
    /// Audit approved. **Terminal** (renewal spawns a new order).
    Completed,
    /// Audit rejected. **Terminal** (resubmission spawns a new order).
    Rejected,
    /// A resubmitted order waiting for a fresh audit decision.
    RejectedToSubmit,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingAcceptance => "PENDING_ACCEPTANCE",
            OrderStatus::InProgress => "IN_PROGRESS",
            OrderStatus::PendingAudit => "PENDING_AUDIT",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::RejectedToSubmit => "REJECTED_TO_SUBMIT",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DeskError> {
        match s {
            "PENDING_ACCEPTANCE" => Ok(OrderStatus::PendingAcceptance),
            "IN_PROGRESS" => Ok(OrderStatus::InProgress),
            "PENDING_AUDIT" => Ok(OrderStatus::PendingAudit),
            "COMPLETED" => Ok(OrderStatus::Completed),
            "REJECTED" => Ok(OrderStatus::Rejected),
            "REJECTED_TO_SUBMIT" => Ok(OrderStatus::RejectedToSubmit),
            other => Err(DeskError::Validation(format!("invalid order status: {other}"))),
        }
    }

    /// Returns `true` if no in-place transition leads out of this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Rejected)
    }
}

/// A work order. Owned exclusively by the lifecycle engine; nothing outside
/// it edits fields directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    /// Unique, `ORD<yyyyMMdd><seq>` format, allocated at insert time.
    pub order_number: String,
    pub client_info: String,
    pub status: OrderStatus,
    pub assigned_employee_id: i64,
    pub created_by_cs_id: i64,
    pub order_info_screenshot_url: Option<String>,
    pub acceptance_screenshot_url: Option<String>,
    pub completion_screenshot_url: Option<String>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Proofs
// ---------------------------------------------------------------------------

/// What a proof screenshot evidences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofKind {
    Acceptance,
    Completion,
}

impl ProofKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProofKind::Acceptance => "ACCEPTANCE",
            ProofKind::Completion => "COMPLETION",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DeskError> {
        match s {
            "ACCEPTANCE" => Ok(ProofKind::Acceptance),
            "COMPLETION" => Ok(ProofKind::Completion),
            other => Err(DeskError::Validation(format!("invalid proof kind: {other}"))),
        }
    }
}

/// One appended evidence row. Never updated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderProof {
    pub id: i64,
    /// The order the evidence was uploaded for. A resubmission proof points
    /// at the *source* (rejected) order.
    pub order_id: i64,
    pub kind: ProofKind,
    pub image_url: String,
    pub is_resubmission: bool,
    pub is_renewal: bool,
    pub uploaded_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Audit trail
// ---------------------------------------------------------------------------

/// An auditor's verdict on a PENDING_AUDIT / REJECTED_TO_SUBMIT order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    Approve,
    Reject,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Approve => "APPROVE",
            AuditAction::Reject => "REJECT",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DeskError> {
        match s {
            "APPROVE" => Ok(AuditAction::Approve),
            "REJECT" => Ok(AuditAction::Reject),
            other => Err(DeskError::Validation(format!("invalid audit action: {other}"))),
        }
    }
}

/// One appended audit decision. Immutable once written; `hash_prev` /
/// `hash_self` form a per-order tamper-evident chain (see `wod-audit`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub order_id: i64,
    pub auditor_id: i64,
    pub action: AuditAction,
    pub comments: Option<String>,
    pub created_at: DateTime<Utc>,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Why an authorization check refused the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenReason {
    /// No resolvable principal. Never downgraded to a default role.
    Unauthenticated,
    /// The caller's role is not eligible for the action's namespace.
    ScopeDenied,
    /// CS caller does not manage the target employee.
    RosterDenied,
    /// Employee caller is not the order's assigned employee.
    OwnershipDenied,
}

impl fmt::Display for ForbiddenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForbiddenReason::Unauthenticated => write!(f, "unauthenticated caller"),
            ForbiddenReason::ScopeDenied => write!(f, "role not eligible for action scope"),
            ForbiddenReason::RosterDenied => write!(f, "CS does not manage target employee"),
            ForbiddenReason::OwnershipDenied => write!(f, "order not assigned to caller"),
        }
    }
}

/// Typed failure surface for every desk operation.
///
/// Business failures (`Forbidden`, `IllegalTransition`, ...) are never
/// retried; they surface to the caller as-is. `Storage` aborts the whole
/// multi-row step with nothing applied.
#[derive(Debug)]
pub enum DeskError {
    /// Referenced order / user / mapping is absent (or soft-deleted).
    NotFound(&'static str),
    /// Role or ownership check failed.
    Forbidden(ForbiddenReason),
    /// Status precondition not met (includes a lost compare-and-set race).
    IllegalTransition {
        from: OrderStatus,
        action: &'static str,
    },
    /// Duplicate active mapping or duplicate order number.
    Conflict(String),
    /// Malformed input.
    Validation(String),
    /// Collaborator I/O failure.
    Storage(String),
}

impl fmt::Display for DeskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeskError::NotFound(what) => write!(f, "NOT_FOUND: {what}"),
            DeskError::Forbidden(reason) => write!(f, "FORBIDDEN: {reason}"),
            DeskError::IllegalTransition { from, action } => {
                write!(f, "ILLEGAL_TRANSITION: {action} not allowed from {}", from.as_str())
            }
            DeskError::Conflict(msg) => write!(f, "CONFLICT: {msg}"),
            DeskError::Validation(msg) => write!(f, "VALIDATION: {msg}"),
            DeskError::Storage(msg) => write!(f, "STORAGE: {msg}"),
        }
    }
}

impl DeskError {
    /// Stable machine-readable code, logged alongside every refusal.
    pub fn code(&self) -> &'static str {
        match self {
            DeskError::NotFound(_) => "NOT_FOUND",
            DeskError::Forbidden(_) => "FORBIDDEN",
            DeskError::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            DeskError::Conflict(_) => "CONFLICT",
            DeskError::Validation(_) => "VALIDATION",
            DeskError::Storage(_) => "STORAGE",
        }
    }
}

impl std::error::Error for DeskError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_storage_strings() {
        for s in [
            OrderStatus::PendingAcceptance,
            OrderStatus::InProgress,
            OrderStatus::PendingAudit,
            OrderStatus::Completed,
            OrderStatus::Rejected,
            OrderStatus::RejectedToSubmit,
        ] {
            assert_eq!(OrderStatus::parse(s.as_str()).unwrap(), s);
        }
        assert!(OrderStatus::parse("DONE").is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(!OrderStatus::RejectedToSubmit.is_terminal());
        assert!(!OrderStatus::PendingAcceptance.is_terminal());
    }
}
