use uuid::Uuid;
use wod_authz::Actor;
use wod_db::desk::{self, CreateOrderRequest};
use wod_db::directory::{self, NewUser};
use wod_db::registry;
use wod_schemas::{AuditAction, DeskError, OrderStatus, Role};

/// Full lifecycle against Postgres: dispatch, accept, complete, audit,
/// resubmit — with the compare-and-set guard refusing stale transitions.
///
/// DB-backed test. Skips if WOD_DATABASE_URL is not set.
#[tokio::test]
async fn order_lifecycle_and_cas_guard() -> anyhow::Result<()> {
    let url = match std::env::var(wod_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: WOD_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await?;
    wod_db::migrate(&pool).await?;

    // Unique usernames so reruns against a developer DB never collide.
    let tag = Uuid::new_v4().simple().to_string();
    let seed = |name: &str, role: Role| NewUser {
        username: format!("{name}_{tag}"),
        real_name: name.to_string(),
        phone: None,
        role,
        active: true,
    };

    let cs = directory::create_user(&pool, &seed("cs", Role::Cs)).await?;
    let other_cs = directory::create_user(&pool, &seed("cs2", Role::Cs)).await?;
    let employee = directory::create_user(&pool, &seed("emp", Role::Employee)).await?;
    let intruder = directory::create_user(&pool, &seed("emp2", Role::Employee)).await?;

    let cs_actor = Actor::new(cs.id, Role::Cs);
    let other_cs_actor = Actor::new(other_cs.id, Role::Cs);
    let emp_actor = Actor::new(employee.id, Role::Employee);
    let intruder_actor = Actor::new(intruder.id, Role::Employee);

    registry::create_mapping(&pool, cs.id, employee.id).await?;

    // Dispatch.
    let order = desk::create_order(
        &pool,
        &cs_actor,
        &CreateOrderRequest {
            client_info: "client A".into(),
            assigned_employee_id: employee.id,
            order_info_screenshot_url: Some("blob://info".into()),
        },
    )
    .await?;
    assert_eq!(order.status, OrderStatus::PendingAcceptance);
    assert!(order.order_number.starts_with("ORD"));

    // Wrong employee is refused before any mutation.
    let err = desk::accept_order(&pool, &intruder_actor, order.id, "blob://a")
        .await
        .unwrap_err();
    assert!(matches!(err, DeskError::Forbidden(_)), "got {err}");

    // Assigned employee accepts.
    let order = desk::accept_order(&pool, &emp_actor, order.id, "blob://a").await?;
    assert_eq!(order.status, OrderStatus::InProgress);
    assert!(order.accepted_at.is_some());

    // Second accept loses the status guard.
    let err = desk::accept_order(&pool, &emp_actor, order.id, "blob://a")
        .await
        .unwrap_err();
    assert!(matches!(err, DeskError::IllegalTransition { .. }), "got {err}");

    // A stale plan (built before the first accept committed) must also be
    // refused by the CAS apply, not silently double-applied.
    let stale = wod_lifecycle::plan_accept(
        &wod_schemas::Order {
            status: OrderStatus::PendingAcceptance,
            ..order.clone()
        },
        employee.id,
        "blob://stale",
        chrono::Utc::now(),
    )?;
    let err = desk::apply_transition(&pool, &stale).await.unwrap_err();
    assert!(matches!(err, DeskError::IllegalTransition { .. }), "got {err}");

    // Complete.
    let order = desk::complete_order(&pool, &emp_actor, order.id, "blob://done").await?;
    assert_eq!(order.status, OrderStatus::PendingAudit);

    // A CS that does not manage the employee cannot audit.
    let err = desk::audit_order(&pool, &other_cs_actor, order.id, AuditAction::Reject, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DeskError::Forbidden(_)), "got {err}");

    // The owning CS rejects.
    let order = desk::audit_order(
        &pool,
        &cs_actor,
        order.id,
        AuditAction::Reject,
        Some("screenshot unreadable"),
    )
    .await?;
    assert_eq!(order.status, OrderStatus::Rejected);

    let log = desk::audit_log_for_order(&pool, order.id).await?;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].action, AuditAction::Reject);
    assert!(matches!(
        wod_audit::verify_chain(&log)?,
        wod_audit::VerifyResult::Valid { rows: 1 }
    ));

    // Resubmission: new order in REJECTED_TO_SUBMIT, source untouched.
    let resubmitted = desk::resubmit_order(&pool, &emp_actor, order.id, "blob://retry").await?;
    assert_eq!(resubmitted.status, OrderStatus::RejectedToSubmit);
    assert_ne!(resubmitted.id, order.id);
    assert_ne!(resubmitted.order_number, order.order_number);
    assert_eq!(
        desk::fetch_order(&pool, order.id).await?.status,
        OrderStatus::Rejected
    );

    let source_proofs = desk::proofs_for_order(&pool, order.id).await?;
    assert!(source_proofs.iter().any(|p| p.is_resubmission));

    // Approve the resubmission, then renew from it.
    let resubmitted = desk::audit_order(
        &pool,
        &cs_actor,
        resubmitted.id,
        AuditAction::Approve,
        None,
    )
    .await?;
    assert_eq!(resubmitted.status, OrderStatus::Completed);

    let renewal = desk::renew_order(&pool, &emp_actor, resubmitted.id).await?;
    assert_eq!(renewal.status, OrderStatus::PendingAcceptance);
    assert_ne!(renewal.order_number, resubmitted.order_number);
    assert_eq!(
        desk::fetch_order(&pool, resubmitted.id).await?.status,
        OrderStatus::Completed,
        "renewal must not mutate the original"
    );

    Ok(())
}
