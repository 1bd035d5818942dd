use wod_authz::Actor;
use wod_schemas::{AuditAction, DeskError, OrderStatus, Role};
use wod_testkit::{CreateOrderRequest, MemDesk};

/// Renewing a completed order creates a fresh PENDING_ACCEPTANCE order with
/// the same client info and leaves the original untouched.
#[test]
fn renewal_creates_new_order_and_preserves_original() {
    let desk = MemDesk::new();
    let cs = desk.add_user("cs1", Role::Cs, true);
    let emp = desk.add_user("emp7", Role::Employee, true);
    desk.create_mapping(cs.id, emp.id).unwrap();

    let cs_actor = Actor::new(cs.id, Role::Cs);
    let emp_actor = Actor::new(emp.id, Role::Employee);

    let original = desk
        .create_order(
            &cs_actor,
            &CreateOrderRequest {
                client_info: "client A, weekly boost".into(),
                assigned_employee_id: emp.id,
                order_info_screenshot_url: Some("blob://info".into()),
            },
        )
        .unwrap();
    desk.accept_order(&emp_actor, original.id, "blob://accept").unwrap();
    desk.complete_order(&emp_actor, original.id, "blob://done").unwrap();
    desk.audit_order(&cs_actor, original.id, AuditAction::Approve, None).unwrap();

    let renewed = desk.renew_order(&emp_actor, original.id).unwrap();

    assert_ne!(renewed.id, original.id);
    assert_ne!(renewed.order_number, original.order_number);
    assert_eq!(renewed.status, OrderStatus::PendingAcceptance);
    assert_eq!(renewed.client_info, original.client_info);
    assert_eq!(renewed.assigned_employee_id, emp.id);
    assert_eq!(renewed.created_by_cs_id, cs.id);
    assert!(renewed.acceptance_screenshot_url.is_none());
    assert!(renewed.completed_at.is_none());

    // The original is still COMPLETED, no new proof rows appeared on it.
    let original_after = desk.fetch_order(original.id).unwrap();
    assert_eq!(original_after.status, OrderStatus::Completed);
    assert_eq!(desk.proofs_for_order(original.id).len(), 2);
    assert!(desk.proofs_for_order(renewed.id).is_empty());

    // The renewed order runs the normal lifecycle from scratch.
    desk.accept_order(&emp_actor, renewed.id, "blob://accept2").unwrap();
    assert_eq!(
        desk.fetch_order(renewed.id).unwrap().status,
        OrderStatus::InProgress
    );
}

/// Renewal is gated on the COMPLETED status and on ownership.
#[test]
fn renewal_refused_when_not_completed_or_not_owner() {
    let desk = MemDesk::new();
    let cs = desk.add_user("cs1", Role::Cs, true);
    let emp = desk.add_user("emp7", Role::Employee, true);
    let other = desk.add_user("emp8", Role::Employee, true);
    desk.create_mapping(cs.id, emp.id).unwrap();

    let cs_actor = Actor::new(cs.id, Role::Cs);
    let emp_actor = Actor::new(emp.id, Role::Employee);

    let order = desk
        .create_order(
            &cs_actor,
            &CreateOrderRequest {
                client_info: "client B".into(),
                assigned_employee_id: emp.id,
                order_info_screenshot_url: None,
            },
        )
        .unwrap();

    // Not completed yet.
    let err = desk.renew_order(&emp_actor, order.id).unwrap_err();
    match err {
        DeskError::IllegalTransition { from, .. } => {
            assert_eq!(from, OrderStatus::PendingAcceptance)
        }
        other => panic!("expected IllegalTransition, got {other}"),
    }

    desk.accept_order(&emp_actor, order.id, "blob://accept").unwrap();
    desk.complete_order(&emp_actor, order.id, "blob://done").unwrap();
    desk.audit_order(&cs_actor, order.id, AuditAction::Approve, None).unwrap();

    // Completed, but a different employee asks.
    let err = desk
        .renew_order(&Actor::new(other.id, Role::Employee), order.id)
        .unwrap_err();
    assert!(matches!(err, DeskError::Forbidden(_)));
}
