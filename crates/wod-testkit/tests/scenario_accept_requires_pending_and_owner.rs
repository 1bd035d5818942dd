use wod_authz::Actor;
use wod_schemas::{DeskError, ForbiddenReason, OrderStatus, Role};
use wod_testkit::{CreateOrderRequest, MemDesk};

/// CS 1 dispatches an order to employee 7. Employee 7 accepts and the order
/// moves to IN_PROGRESS; employee 8 is refused with Forbidden; a second
/// accept is refused with IllegalTransition.
#[test]
fn accept_succeeds_only_for_pending_order_and_assigned_employee() {
    let desk = MemDesk::new();
    let cs = desk.add_user("cs1", Role::Cs, true);
    let emp7 = desk.add_user("emp7", Role::Employee, true);
    let emp8 = desk.add_user("emp8", Role::Employee, true);

    let cs_actor = Actor::new(cs.id, Role::Cs);
    let order = desk
        .create_order(
            &cs_actor,
            &CreateOrderRequest {
                client_info: "client A".into(),
                assigned_employee_id: emp7.id,
                order_info_screenshot_url: Some("blob://info".into()),
            },
        )
        .unwrap();
    assert_eq!(order.status, OrderStatus::PendingAcceptance);

    // The non-assigned employee is refused, and nothing changed.
    let err = desk
        .accept_order(&Actor::new(emp8.id, Role::Employee), order.id, "blob://a")
        .unwrap_err();
    assert!(matches!(
        err,
        DeskError::Forbidden(ForbiddenReason::OwnershipDenied)
    ));
    assert_eq!(
        desk.fetch_order(order.id).unwrap().status,
        OrderStatus::PendingAcceptance
    );

    // The assigned employee accepts.
    let accepted = desk
        .accept_order(&Actor::new(emp7.id, Role::Employee), order.id, "blob://a")
        .unwrap();
    assert_eq!(accepted.status, OrderStatus::InProgress);
    assert!(accepted.accepted_at.is_some());
    assert_eq!(accepted.acceptance_screenshot_url.as_deref(), Some("blob://a"));

    let proofs = desk.proofs_for_order(order.id);
    assert_eq!(proofs.len(), 1);
    assert_eq!(proofs[0].kind, wod_schemas::ProofKind::Acceptance);

    // Accepting again fails the status precondition.
    let err = desk
        .accept_order(&Actor::new(emp7.id, Role::Employee), order.id, "blob://a")
        .unwrap_err();
    match err {
        DeskError::IllegalTransition { from, .. } => assert_eq!(from, OrderStatus::InProgress),
        other => panic!("expected IllegalTransition, got {other}"),
    }
}

/// An unauthenticated caller is refused outright, never defaulted to a role.
#[test]
fn unauthenticated_caller_is_refused() {
    let err = wod_authz::authorize(
        None,
        &wod_authz::DeskAction::AcceptOrder { assigned_employee_id: 7 },
        &wod_authz::ResolvedRoster(true),
    )
    .unwrap_err();
    assert_eq!(err, ForbiddenReason::Unauthenticated);
}
