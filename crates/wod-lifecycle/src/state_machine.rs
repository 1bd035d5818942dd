//! In-place status transitions.
//!
//! Renewal and resubmission are not events here: they create new orders and
//! are validated by their draft builders in [`crate::plan`].

use wod_schemas::{AuditAction, DeskError, OrderStatus};

/// Events that transition an existing order in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderEvent {
    /// Assigned employee takes the order.
    Accept,
    /// Assigned employee uploads the completion screenshot.
    Complete,
    /// CS / Admin verdict on the submitted work.
    Audit(AuditAction),
}

impl OrderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OrderEvent::Accept => "accept",
            OrderEvent::Complete => "complete",
            OrderEvent::Audit(AuditAction::Approve) => "audit/approve",
            OrderEvent::Audit(AuditAction::Reject) => "audit/reject",
        }
    }
}

/// Compute the status an event leads to, or refuse it.
///
/// # Errors
/// [`DeskError::IllegalTransition`] when `event` is not legal from `from`.
/// The caller's state must not change on error.
pub fn transition(from: OrderStatus, event: OrderEvent) -> Result<OrderStatus, DeskError> {
    use OrderStatus::*;

    match (from, event) {
        (PendingAcceptance, OrderEvent::Accept) => Ok(InProgress),

        (InProgress, OrderEvent::Complete) => Ok(PendingAudit),

        // Both a fresh submission and a resubmission are audited the same way.
        (PendingAudit | RejectedToSubmit, OrderEvent::Audit(AuditAction::Approve)) => Ok(Completed),
        (PendingAudit | RejectedToSubmit, OrderEvent::Audit(AuditAction::Reject)) => Ok(Rejected),

        (from, event) => Err(DeskError::IllegalTransition {
            from,
            action: event.name(),
        }),
    }
}
