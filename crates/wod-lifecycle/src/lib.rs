//! Order Lifecycle Engine — pure transition logic for work orders.
//!
//! # Design
//!
//! The engine is side-effect free. Every operation is expressed as a
//! *decision* over the current persisted order snapshot:
//!
//! - in-place transitions (accept / complete / audit) produce a
//!   [`TransitionPlan`] carrying the expected prior status, the new status,
//!   the field writes, and the proof / audit rows to append;
//! - additive operations (create / renew / resubmit) produce an
//!   [`OrderDraft`] for a brand-new order.
//!
//! The persistence layer applies a plan atomically with a compare-and-set
//! on the expected status (`UPDATE … WHERE id=? AND status=?`), so two
//! concurrent operations against the same order can never both succeed from
//! the same starting state. The in-memory desk in `wod-testkit` applies the
//! identical plans under a lock.
//!
//! # State diagram
//!
//! ```text
//!  PENDING_ACCEPTANCE ──accept──► IN_PROGRESS ──complete──► PENDING_AUDIT
//!                                                              │
//!                                            approve ──────────┼───────── reject
//!                                               │                            │
//!                                               ▼                            ▼
//!                                           COMPLETED                    REJECTED
//!                                               │                            │
//!                                             renew                      resubmit
//!                                    (new order, PENDING_ACCEPTANCE)  (new order, REJECTED_TO_SUBMIT
//!                                                                      ──audit──► COMPLETED|REJECTED)
//! ```
//!
//! Renewal and resubmission never mutate the original order.

pub mod blob;
pub mod order_number;
pub mod plan;
pub mod state_machine;

pub use blob::{BlobPolicy, BlobStore};
pub use order_number::format_order_number;
pub use plan::{
    draft_create, draft_renewal, draft_resubmission, plan_accept, plan_audit, plan_complete,
    AuditDraft, OrderDraft, ProofDraft, TransitionPlan,
};
pub use state_machine::{transition, OrderEvent};
