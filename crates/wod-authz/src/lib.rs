//! Authorization Gate — the single evaluator for every desk action.
//!
//! # Design
//!
//! One stateless function, [`authorize`], replaces role checks scattered
//! across handlers. It evaluates `(actor, action)` against a closed set of
//! roles and a closed set of action scopes, in this precedence:
//!
//! 1. **Admin** — permitted for every action unconditionally.
//! 2. **CS** — permitted for Cs- and Employee-scoped actions; actions that
//!    target a specific employee (auditing an order, listing a roster)
//!    additionally require an active roster mapping, resolved through the
//!    [`RosterGate`] trait.
//! 3. **Employee** — Employee-scoped actions only, and only on orders whose
//!    `assigned_employee_id` equals the caller.
//!
//! An unauthenticated caller (`actor == None`) is always refused — never
//! treated as a default role.
//!
//! Ownership is enforced here *and* again by the lifecycle plan builders;
//! both run before any mutation, so the precedence between them cannot
//! change the outcome.

use wod_schemas::{DeskError, ForbiddenReason, Role};

// ---------------------------------------------------------------------------
// Roster gate trait
// ---------------------------------------------------------------------------

/// Answers "does this CS currently manage this employee?".
///
/// Production wires the assignment registry behind this trait. Tests use a
/// stub or the in-memory desk.
pub trait RosterGate {
    fn manages(&self, cs_user_id: i64, employee_user_id: i64) -> bool;
}

/// A roster answer resolved ahead of the gate call.
///
/// The async Postgres path queries the registry first and hands the result
/// in through this adapter; the trait stays the single seam.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedRoster(pub bool);

impl RosterGate for ResolvedRoster {
    fn manages(&self, _cs_user_id: i64, _employee_user_id: i64) -> bool {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Actors and actions
// ---------------------------------------------------------------------------

/// An authenticated principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
}

impl Actor {
    pub fn new(id: i64, role: Role) -> Self {
        Self { id, role }
    }
}

/// Namespace a desk action belongs to, mirroring the `/admin/**`, `/cs/**`
/// and `/employee/**` route families the roles are scoped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionScope {
    Admin,
    Cs,
    Employee,
}

/// Every gated desk action, carrying the target it operates on.
///
/// `assigned_employee_id` is read from the already-loaded order (or the
/// create request), so the gate itself stays free of storage access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeskAction {
    CreateOrder { assigned_employee_id: i64 },
    AcceptOrder { assigned_employee_id: i64 },
    CompleteOrder { assigned_employee_id: i64 },
    AuditOrder { assigned_employee_id: i64 },
    RenewOrder { assigned_employee_id: i64 },
    ResubmitOrder { assigned_employee_id: i64 },
    /// CS listing the orders / profile of one roster employee.
    ViewEmployee { employee_id: i64 },
    /// Employee listing their own orders.
    ListOwnOrders,
    /// Roster mapping create / reassign / batch / delete.
    ManageRoster,
    /// Logical deletion of an order.
    DeleteOrder,
}

impl DeskAction {
    pub fn scope(&self) -> ActionScope {
        match self {
            DeskAction::CreateOrder { .. }
            | DeskAction::AuditOrder { .. }
            | DeskAction::ViewEmployee { .. } => ActionScope::Cs,

            DeskAction::AcceptOrder { .. }
            | DeskAction::CompleteOrder { .. }
            | DeskAction::RenewOrder { .. }
            | DeskAction::ResubmitOrder { .. }
            | DeskAction::ListOwnOrders => ActionScope::Employee,

            DeskAction::ManageRoster | DeskAction::DeleteOrder => ActionScope::Admin,
        }
    }

    /// The employee a CS must hold a roster mapping for, if any.
    ///
    /// Order creation deliberately needs no mapping: any CS may dispatch to
    /// any active employee, but only the owning CS may audit.
    fn roster_target(&self) -> Option<i64> {
        match self {
            DeskAction::AuditOrder { assigned_employee_id } => Some(*assigned_employee_id),
            DeskAction::ViewEmployee { employee_id } => Some(*employee_id),
            _ => None,
        }
    }

    /// The assigned employee an Employee caller must be, if any.
    fn owner_target(&self) -> Option<i64> {
        match self {
            DeskAction::AcceptOrder { assigned_employee_id }
            | DeskAction::CompleteOrder { assigned_employee_id }
            | DeskAction::RenewOrder { assigned_employee_id }
            | DeskAction::ResubmitOrder { assigned_employee_id } => Some(*assigned_employee_id),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Evaluate whether `actor` may perform `action`.
///
/// Returns the refusal reason on deny; [`forbid`] wraps it into the desk
/// error taxonomy for operation surfaces.
pub fn authorize(
    actor: Option<&Actor>,
    action: &DeskAction,
    roster: &impl RosterGate,
) -> Result<(), ForbiddenReason> {
    let actor = match actor {
        Some(a) => a,
        None => return Err(ForbiddenReason::Unauthenticated),
    };

    match actor.role {
        Role::Admin => Ok(()),

        Role::Cs => {
            match action.scope() {
                ActionScope::Cs | ActionScope::Employee => {}
                ActionScope::Admin => return Err(ForbiddenReason::ScopeDenied),
            }
            if let Some(employee) = action.roster_target() {
                if !roster.manages(actor.id, employee) {
                    return Err(ForbiddenReason::RosterDenied);
                }
            }
            Ok(())
        }

        Role::Employee => {
            if action.scope() != ActionScope::Employee {
                return Err(ForbiddenReason::ScopeDenied);
            }
            if let Some(assigned) = action.owner_target() {
                if assigned != actor.id {
                    return Err(ForbiddenReason::OwnershipDenied);
                }
            }
            Ok(())
        }
    }
}

/// Convenience: run the gate and map a refusal into [`DeskError::Forbidden`].
pub fn forbid(
    actor: Option<&Actor>,
    action: &DeskAction,
    roster: &impl RosterGate,
) -> Result<(), DeskError> {
    authorize(actor, action, roster).map_err(DeskError::Forbidden)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stub roster: manages exactly the pairs given at construction.
    struct StubRoster(Vec<(i64, i64)>);

    impl RosterGate for StubRoster {
        fn manages(&self, cs: i64, employee: i64) -> bool {
            self.0.contains(&(cs, employee))
        }
    }

    fn empty_roster() -> StubRoster {
        StubRoster(vec![])
    }

    #[test]
    fn admin_passes_every_action() {
        let admin = Actor::new(1, Role::Admin);
        let roster = empty_roster();
        for action in [
            DeskAction::CreateOrder { assigned_employee_id: 7 },
            DeskAction::AuditOrder { assigned_employee_id: 7 },
            DeskAction::AcceptOrder { assigned_employee_id: 7 },
            DeskAction::ManageRoster,
            DeskAction::DeleteOrder,
        ] {
            assert!(authorize(Some(&admin), &action, &roster).is_ok());
        }
    }

    #[test]
    fn unauthenticated_is_always_refused() {
        let roster = empty_roster();
        let err = authorize(None, &DeskAction::ListOwnOrders, &roster).unwrap_err();
        assert_eq!(err, ForbiddenReason::Unauthenticated);
    }

    #[test]
    fn cs_audit_requires_roster_mapping() {
        let cs = Actor::new(2, Role::Cs);
        let action = DeskAction::AuditOrder { assigned_employee_id: 7 };

        let err = authorize(Some(&cs), &action, &empty_roster()).unwrap_err();
        assert_eq!(err, ForbiddenReason::RosterDenied);

        let owning = StubRoster(vec![(2, 7)]);
        assert!(authorize(Some(&cs), &action, &owning).is_ok());
    }

    #[test]
    fn cs_creates_without_roster_mapping() {
        let cs = Actor::new(2, Role::Cs);
        let action = DeskAction::CreateOrder { assigned_employee_id: 7 };
        assert!(authorize(Some(&cs), &action, &empty_roster()).is_ok());
    }

    #[test]
    fn cs_cannot_reach_admin_scope() {
        let cs = Actor::new(2, Role::Cs);
        let err = authorize(Some(&cs), &DeskAction::ManageRoster, &empty_roster()).unwrap_err();
        assert_eq!(err, ForbiddenReason::ScopeDenied);
    }

    #[test]
    fn employee_is_boxed_into_employee_scope() {
        let emp = Actor::new(7, Role::Employee);
        let roster = empty_roster();
        let err = authorize(
            Some(&emp),
            &DeskAction::CreateOrder { assigned_employee_id: 7 },
            &roster,
        )
        .unwrap_err();
        assert_eq!(err, ForbiddenReason::ScopeDenied);

        let err = authorize(
            Some(&emp),
            &DeskAction::AuditOrder { assigned_employee_id: 7 },
            &roster,
        )
        .unwrap_err();
        assert_eq!(err, ForbiddenReason::ScopeDenied);
    }

    #[test]
    fn employee_ownership_is_enforced() {
        let roster = empty_roster();
        let owner = Actor::new(7, Role::Employee);
        let other = Actor::new(8, Role::Employee);
        let action = DeskAction::AcceptOrder { assigned_employee_id: 7 };

        assert!(authorize(Some(&owner), &action, &roster).is_ok());
        let err = authorize(Some(&other), &action, &roster).unwrap_err();
        assert_eq!(err, ForbiddenReason::OwnershipDenied);
    }
}
