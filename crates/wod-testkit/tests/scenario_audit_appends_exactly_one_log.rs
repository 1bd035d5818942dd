use wod_audit::VerifyResult;
use wod_authz::Actor;
use wod_schemas::{AuditAction, DeskError, ForbiddenReason, OrderStatus, Role};
use wod_testkit::{CreateOrderRequest, MemDesk};

fn run_to_pending_audit(desk: &MemDesk, cs: &Actor, employee: &Actor) -> i64 {
    let order = desk
        .create_order(
            cs,
            &CreateOrderRequest {
                client_info: "client A".into(),
                assigned_employee_id: employee.id,
                order_info_screenshot_url: None,
            },
        )
        .unwrap();
    desk.accept_order(employee, order.id, "blob://accept").unwrap();
    desk.complete_order(employee, order.id, "blob://done").unwrap();
    order.id
}

/// One audit verdict appends exactly one log row, and the per-order hash
/// chain over those rows verifies end to end.
#[test]
fn approve_appends_one_chained_log_row() {
    let desk = MemDesk::new();
    let cs = desk.add_user("cs1", Role::Cs, true);
    let emp = desk.add_user("emp7", Role::Employee, true);
    desk.create_mapping(cs.id, emp.id).unwrap();

    let cs_actor = Actor::new(cs.id, Role::Cs);
    let emp_actor = Actor::new(emp.id, Role::Employee);
    let order_id = run_to_pending_audit(&desk, &cs_actor, &emp_actor);
    assert!(desk.audit_log_for_order(order_id).is_empty());

    let audited = desk
        .audit_order(&cs_actor, order_id, AuditAction::Approve, Some("looks good"))
        .unwrap();
    assert_eq!(audited.status, OrderStatus::Completed);

    let log = desk.audit_log_for_order(order_id);
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].action, AuditAction::Approve);
    assert_eq!(log[0].auditor_id, cs.id);
    assert_eq!(log[0].comments.as_deref(), Some("looks good"));
    assert!(log[0].hash_prev.is_none());
    assert!(matches!(
        wod_audit::verify_chain(&log).unwrap(),
        VerifyResult::Valid { rows: 1 }
    ));

    // A second verdict on a terminal order is refused and appends nothing.
    let err = desk
        .audit_order(&cs_actor, order_id, AuditAction::Reject, None)
        .unwrap_err();
    assert!(matches!(err, DeskError::IllegalTransition { .. }));
    assert_eq!(desk.audit_log_for_order(order_id).len(), 1);
}

/// A CS without a roster mapping to the assignee cannot audit, even though
/// the order is in the right state.
#[test]
fn audit_requires_roster_mapping() {
    let desk = MemDesk::new();
    let cs = desk.add_user("cs1", Role::Cs, true);
    let stranger = desk.add_user("cs2", Role::Cs, true);
    let emp = desk.add_user("emp7", Role::Employee, true);
    desk.create_mapping(cs.id, emp.id).unwrap();

    let order_id = run_to_pending_audit(
        &desk,
        &Actor::new(cs.id, Role::Cs),
        &Actor::new(emp.id, Role::Employee),
    );

    let err = desk
        .audit_order(&Actor::new(stranger.id, Role::Cs), order_id, AuditAction::Approve, None)
        .unwrap_err();
    assert!(matches!(
        err,
        DeskError::Forbidden(ForbiddenReason::RosterDenied)
    ));
    assert!(desk.audit_log_for_order(order_id).is_empty());
    assert_eq!(
        desk.fetch_order(order_id).unwrap().status,
        OrderStatus::PendingAudit
    );
}

/// Admins audit without any roster mapping.
#[test]
fn admin_audits_without_mapping() {
    let desk = MemDesk::new();
    let cs = desk.add_user("cs1", Role::Cs, true);
    let emp = desk.add_user("emp7", Role::Employee, true);
    let admin = desk.add_user("root", Role::Admin, true);
    desk.create_mapping(cs.id, emp.id).unwrap();

    let order_id = run_to_pending_audit(
        &desk,
        &Actor::new(cs.id, Role::Cs),
        &Actor::new(emp.id, Role::Employee),
    );

    let audited = desk
        .audit_order(&Actor::new(admin.id, Role::Admin), order_id, AuditAction::Reject, Some("redo"))
        .unwrap();
    assert_eq!(audited.status, OrderStatus::Rejected);

    let log = desk.audit_log_for_order(order_id);
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].action, AuditAction::Reject);
}
