use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use wod_authz::Actor;
use wod_schemas::Role;
use wod_testkit::{CreateOrderRequest, MemDesk};

/// N threads dispatch orders against one desk; every order number they get
/// back is distinct and well-formed.
#[test]
fn concurrent_creates_yield_pairwise_distinct_order_numbers() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 25;

    let desk = Arc::new(MemDesk::new());
    let cs = desk.add_user("cs1", Role::Cs, true);
    let emp = desk.add_user("emp7", Role::Employee, true);

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let desk = Arc::clone(&desk);
            let cs_actor = Actor::new(cs.id, Role::Cs);
            let assigned = emp.id;
            thread::spawn(move || {
                let mut numbers = Vec::with_capacity(PER_THREAD);
                for i in 0..PER_THREAD {
                    let order = desk
                        .create_order(
                            &cs_actor,
                            &CreateOrderRequest {
                                client_info: format!("client {t}-{i}"),
                                assigned_employee_id: assigned,
                                order_info_screenshot_url: None,
                            },
                        )
                        .unwrap();
                    numbers.push(order.order_number);
                }
                numbers
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for number in handle.join().unwrap() {
            assert!(number.starts_with("ORD"), "malformed number {number}");
            assert!(number.len() >= "ORDyyyymmdd".len() + 4);
            assert!(seen.insert(number.clone()), "duplicate number {number}");
        }
    }
    assert_eq!(seen.len(), THREADS * PER_THREAD);
}
