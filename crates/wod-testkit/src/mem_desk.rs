//! In-memory desk.
//!
//! One `Mutex<State>` replaces the database: every operation locks, loads
//! the current snapshot, runs the same authorization gate and plan builders
//! production uses, and applies the plan only if the compare-and-set guard
//! still holds. Holding the lock across the whole apply makes each
//! operation linearizable per order, which is exactly the contract the
//! Postgres `UPDATE … WHERE status = $expected` provides.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use wod_authz::{forbid, Actor, DeskAction, RosterGate};
use wod_lifecycle::{
    draft_create, draft_renewal, draft_resubmission, format_order_number, plan_accept,
    plan_audit, plan_complete, OrderDraft, TransitionPlan,
};
use wod_schemas::{
    AssignmentMapping, AuditAction, AuditLogEntry, DeskError, ForbiddenReason, Order, OrderProof,
    Role, UserRecord,
};

#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub client_info: String,
    pub assigned_employee_id: i64,
    pub order_info_screenshot_url: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    users: BTreeMap<i64, UserRecord>,
    next_user_id: i64,

    mappings: Vec<MappingRow>,
    next_mapping_id: i64,

    orders: BTreeMap<i64, OrderRow>,
    next_order_id: i64,

    proofs: Vec<OrderProof>,
    next_proof_id: i64,

    audit: Vec<AuditLogEntry>,
    next_audit_id: i64,
}

#[derive(Debug, Clone)]
struct MappingRow {
    mapping: AssignmentMapping,
    deleted: bool,
}

#[derive(Debug, Clone)]
struct OrderRow {
    order: Order,
    deleted: bool,
}

// The gate consults the locked state directly, so no re-entrant lock is
// ever taken inside an operation.
impl RosterGate for State {
    fn manages(&self, cs_user_id: i64, employee_user_id: i64) -> bool {
        self.mappings.iter().any(|row| {
            !row.deleted
                && row.mapping.cs_user_id == cs_user_id
                && row.mapping.employee_user_id == employee_user_id
        })
    }
}

impl State {
    fn visible_order(&self, order_id: i64) -> Result<Order, DeskError> {
        match self.orders.get(&order_id) {
            Some(row) if !row.deleted => Ok(row.order.clone()),
            _ => Err(DeskError::NotFound("order")),
        }
    }
}

/// The in-memory desk. Cheap to construct per test; safe to share across
/// threads for concurrency scenarios.
#[derive(Default)]
pub struct MemDesk {
    state: Mutex<State>,
    /// Process-wide monotonic order number counter.
    order_seq: AtomicI64,
}

impl MemDesk {
    pub fn new() -> Self {
        Self::default()
    }

    // -- seeding -----------------------------------------------------------

    pub fn add_user(&self, username: &str, role: Role, active: bool) -> UserRecord {
        let mut state = self.state.lock().unwrap();
        state.next_user_id += 1;
        let now = Utc::now();
        let user = UserRecord {
            id: state.next_user_id,
            username: username.to_string(),
            real_name: username.to_string(),
            phone: None,
            role,
            active,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        user
    }

    pub fn set_user_active(&self, user_id: i64, active: bool) -> Result<(), DeskError> {
        let mut state = self.state.lock().unwrap();
        match state.users.get_mut(&user_id) {
            Some(user) => {
                user.active = active;
                user.updated_at = Utc::now();
                Ok(())
            }
            None => Err(DeskError::NotFound("user")),
        }
    }

    // -- registry ----------------------------------------------------------

    pub fn create_mapping(
        &self,
        cs_user_id: i64,
        employee_user_id: i64,
    ) -> Result<AssignmentMapping, DeskError> {
        let mut state = self.state.lock().unwrap();
        Self::insert_mapping(&mut state, cs_user_id, employee_user_id)
    }

    fn insert_mapping(
        state: &mut State,
        cs_user_id: i64,
        employee_user_id: i64,
    ) -> Result<AssignmentMapping, DeskError> {
        if state.manages(cs_user_id, employee_user_id) {
            return Err(DeskError::Conflict(format!(
                "active mapping already exists: cs={cs_user_id} employee={employee_user_id}"
            )));
        }
        state.next_mapping_id += 1;
        let now = Utc::now();
        let mapping = AssignmentMapping {
            id: state.next_mapping_id,
            cs_user_id,
            employee_user_id,
            created_at: now,
            updated_at: now,
        };
        state.mappings.push(MappingRow { mapping: mapping.clone(), deleted: false });
        Ok(mapping)
    }

    /// Best-effort batch create; conflicting pairs are skipped.
    pub fn batch_create_mappings(
        &self,
        cs_user_id: i64,
        employee_user_ids: &[i64],
    ) -> Vec<AssignmentMapping> {
        let mut state = self.state.lock().unwrap();
        let mut created = Vec::new();
        for &employee_user_id in employee_user_ids {
            match Self::insert_mapping(&mut state, cs_user_id, employee_user_id) {
                Ok(m) => created.push(m),
                Err(_) => {
                    tracing::warn!(cs_user_id, employee_user_id, "skipping existing mapping");
                }
            }
        }
        created
    }

    /// Atomic reassignment: soft-delete all active mappings for the
    /// employee, then create the new one, under one lock.
    pub fn reassign_employee(
        &self,
        employee_user_id: i64,
        new_cs_user_id: i64,
    ) -> Result<AssignmentMapping, DeskError> {
        let mut state = self.state.lock().unwrap();
        for row in state
            .mappings
            .iter_mut()
            .filter(|row| !row.deleted && row.mapping.employee_user_id == employee_user_id)
        {
            row.deleted = true;
            row.mapping.updated_at = Utc::now();
        }
        Self::insert_mapping(&mut state, new_cs_user_id, employee_user_id)
    }

    pub fn is_cs_manage_employee(&self, cs_user_id: i64, employee_user_id: i64) -> bool {
        self.state.lock().unwrap().manages(cs_user_id, employee_user_id)
    }

    pub fn mappings_for_employee(&self, employee_user_id: i64) -> Vec<AssignmentMapping> {
        self.state
            .lock()
            .unwrap()
            .mappings
            .iter()
            .filter(|row| !row.deleted && row.mapping.employee_user_id == employee_user_id)
            .map(|row| row.mapping.clone())
            .collect()
    }

    // -- order operations --------------------------------------------------

    pub fn fetch_order(&self, order_id: i64) -> Result<Order, DeskError> {
        self.state.lock().unwrap().visible_order(order_id)
    }

    pub fn create_order(
        &self,
        actor: &Actor,
        req: &CreateOrderRequest,
    ) -> Result<Order, DeskError> {
        let mut state = self.state.lock().unwrap();
        forbid(
            Some(actor),
            &DeskAction::CreateOrder { assigned_employee_id: req.assigned_employee_id },
            &*state,
        )?;

        let assignee = state
            .users
            .get(&req.assigned_employee_id)
            .cloned()
            .ok_or(DeskError::NotFound("assigned employee"))?;

        let draft = draft_create(
            &req.client_info,
            &assignee,
            req.order_info_screenshot_url.as_deref(),
            actor.id,
            Utc::now(),
        )?;
        Ok(self.insert_order(&mut state, &draft))
    }

    pub fn accept_order(
        &self,
        actor: &Actor,
        order_id: i64,
        image_url: &str,
    ) -> Result<Order, DeskError> {
        let mut state = self.state.lock().unwrap();
        let order = state.visible_order(order_id)?;
        forbid(
            Some(actor),
            &DeskAction::AcceptOrder { assigned_employee_id: order.assigned_employee_id },
            &*state,
        )?;
        let plan = plan_accept(&order, actor.id, image_url, Utc::now())?;
        Self::apply_transition(&mut state, &plan)
    }

    pub fn complete_order(
        &self,
        actor: &Actor,
        order_id: i64,
        image_url: &str,
    ) -> Result<Order, DeskError> {
        let mut state = self.state.lock().unwrap();
        let order = state.visible_order(order_id)?;
        forbid(
            Some(actor),
            &DeskAction::CompleteOrder { assigned_employee_id: order.assigned_employee_id },
            &*state,
        )?;
        let plan = plan_complete(&order, actor.id, image_url, Utc::now())?;
        Self::apply_transition(&mut state, &plan)
    }

    pub fn audit_order(
        &self,
        actor: &Actor,
        order_id: i64,
        action: AuditAction,
        comments: Option<&str>,
    ) -> Result<Order, DeskError> {
        let mut state = self.state.lock().unwrap();
        let order = state.visible_order(order_id)?;
        forbid(
            Some(actor),
            &DeskAction::AuditOrder { assigned_employee_id: order.assigned_employee_id },
            &*state,
        )?;
        let plan = plan_audit(&order, actor.id, action, comments, Utc::now())?;
        Self::apply_transition(&mut state, &plan)
    }

    pub fn renew_order(&self, actor: &Actor, order_id: i64) -> Result<Order, DeskError> {
        let mut state = self.state.lock().unwrap();
        let original = state.visible_order(order_id)?;
        forbid(
            Some(actor),
            &DeskAction::RenewOrder { assigned_employee_id: original.assigned_employee_id },
            &*state,
        )?;
        let draft = draft_renewal(&original, actor.id, Utc::now())?;
        Ok(self.insert_order(&mut state, &draft))
    }

    pub fn resubmit_order(
        &self,
        actor: &Actor,
        order_id: i64,
        image_url: &str,
    ) -> Result<Order, DeskError> {
        let mut state = self.state.lock().unwrap();
        let original = state.visible_order(order_id)?;
        forbid(
            Some(actor),
            &DeskAction::ResubmitOrder { assigned_employee_id: original.assigned_employee_id },
            &*state,
        )?;
        let draft = draft_resubmission(&original, actor.id, image_url, Utc::now())?;
        Ok(self.insert_order(&mut state, &draft))
    }

    pub fn soft_delete_order(&self, actor: &Actor, order_id: i64) -> Result<(), DeskError> {
        let mut state = self.state.lock().unwrap();
        forbid(Some(actor), &DeskAction::DeleteOrder, &*state)?;
        match state.orders.get_mut(&order_id) {
            Some(row) if !row.deleted => {
                row.deleted = true;
                row.order.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(DeskError::NotFound("order")),
        }
    }

    pub fn orders_for_employee(
        &self,
        actor: &Actor,
        employee_id: i64,
    ) -> Result<Vec<Order>, DeskError> {
        let state = self.state.lock().unwrap();
        if actor.role == Role::Employee {
            if actor.id != employee_id {
                return Err(DeskError::Forbidden(ForbiddenReason::OwnershipDenied));
            }
            forbid(Some(actor), &DeskAction::ListOwnOrders, &*state)?;
        } else {
            forbid(Some(actor), &DeskAction::ViewEmployee { employee_id }, &*state)?;
        }
        Ok(state
            .orders
            .values()
            .filter(|row| !row.deleted && row.order.assigned_employee_id == employee_id)
            .map(|row| row.order.clone())
            .collect())
    }

    pub fn proofs_for_order(&self, order_id: i64) -> Vec<OrderProof> {
        self.state
            .lock()
            .unwrap()
            .proofs
            .iter()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect()
    }

    pub fn audit_log_for_order(&self, order_id: i64) -> Vec<AuditLogEntry> {
        self.state
            .lock()
            .unwrap()
            .audit
            .iter()
            .filter(|e| e.order_id == order_id)
            .cloned()
            .collect()
    }

    // -- apply -------------------------------------------------------------

    fn insert_order(&self, state: &mut State, draft: &OrderDraft) -> Order {
        let seq = self.order_seq.fetch_add(1, Ordering::SeqCst) + 1;
        state.next_order_id += 1;
        let order = Order {
            id: state.next_order_id,
            order_number: format_order_number(draft.created_at.date_naive(), seq),
            client_info: draft.client_info.clone(),
            status: draft.status,
            assigned_employee_id: draft.assigned_employee_id,
            created_by_cs_id: draft.created_by_cs_id,
            order_info_screenshot_url: draft.order_info_screenshot_url.clone(),
            acceptance_screenshot_url: draft.acceptance_screenshot_url.clone(),
            completion_screenshot_url: draft.completion_screenshot_url.clone(),
            accepted_at: None,
            completed_at: draft.completed_at,
            created_at: draft.created_at,
            updated_at: draft.created_at,
        };
        state
            .orders
            .insert(order.id, OrderRow { order: order.clone(), deleted: false });

        if let Some(proof) = &draft.proof {
            state.next_proof_id += 1;
            state.proofs.push(OrderProof {
                id: state.next_proof_id,
                order_id: proof.order_id,
                kind: proof.kind,
                image_url: proof.image_url.clone(),
                is_resubmission: proof.is_resubmission,
                is_renewal: proof.is_renewal,
                uploaded_at: proof.uploaded_at,
            });
        }
        order
    }

    /// Mirror of the Postgres CAS apply: refuse unless the order still
    /// holds the expected status, then write everything in one step.
    fn apply_transition(state: &mut State, plan: &TransitionPlan) -> Result<Order, DeskError> {
        let current = state.visible_order(plan.order_id)?;
        if current.status != plan.expect_status {
            return Err(DeskError::IllegalTransition {
                from: current.status,
                action: plan.action,
            });
        }

        {
            let row = state
                .orders
                .get_mut(&plan.order_id)
                .expect("visible_order just found it");
            row.order.status = plan.new_status;
            row.order.updated_at = plan.updated_at;
            if let Some(t) = plan.accepted_at {
                row.order.accepted_at = Some(t);
            }
            if let Some(t) = plan.completed_at {
                row.order.completed_at = Some(t);
            }
            if let Some(url) = &plan.acceptance_screenshot_url {
                row.order.acceptance_screenshot_url = Some(url.clone());
            }
            if let Some(url) = &plan.completion_screenshot_url {
                row.order.completion_screenshot_url = Some(url.clone());
            }
        }

        if let Some(proof) = &plan.proof {
            state.next_proof_id += 1;
            state.proofs.push(OrderProof {
                id: state.next_proof_id,
                order_id: proof.order_id,
                kind: proof.kind,
                image_url: proof.image_url.clone(),
                is_resubmission: proof.is_resubmission,
                is_renewal: proof.is_renewal,
                uploaded_at: proof.uploaded_at,
            });
        }

        if let Some(audit) = &plan.audit {
            let prev = state
                .audit
                .iter()
                .rev()
                .find(|e| e.order_id == audit.order_id)
                .and_then(|e| e.hash_self.clone());
            state.next_audit_id += 1;
            let mut entry = AuditLogEntry {
                id: state.next_audit_id,
                order_id: audit.order_id,
                auditor_id: audit.auditor_id,
                action: audit.action,
                comments: audit.comments.clone(),
                created_at: audit.created_at,
                hash_prev: None,
                hash_self: None,
            };
            wod_audit::chain_next(&mut entry, prev)
                .map_err(|e| DeskError::Storage(e.to_string()))?;
            state.audit.push(entry);
        }

        state.visible_order(plan.order_id)
    }
}
