mod common;

use booking_core::{Caller, LedgerStore, ReservationPolicy, RetryPolicy};
use common::{harness_with, TICKET};
use proptest::prelude::*;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Attempt {
    user_id: i64,
    quantity: i32,
    cancel: bool,
}

fn attempt() -> impl Strategy<Value = Attempt> {
    (1i64..=8, 1i32..=4, any::<bool>())
        .prop_map(|(user_id, quantity, cancel)| Attempt { user_id, quantity, cancel })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn active_quantity_never_exceeds_capacity(
        attempts in prop::collection::vec(attempt(), 1..24),
        limit in 4i64..16,
    ) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let h = harness_with(ReservationPolicy {
                capacity_limit: limit,
                remote_timeout: Duration::from_secs(2),
                release_retry: RetryPolicy::disabled(),
                ..ReservationPolicy::default()
            }, 10_000);

            let mut tasks = Vec::new();
            for a in attempts.clone() {
                let ledger = h.ledger.clone();
                tasks.push(tokio::spawn(async move {
                    let caller = Caller::customer(a.user_id);
                    let placed = ledger.reserve(&caller, a.user_id, TICKET, a.quantity).await;
                    if let (Ok(r), true) = (&placed, a.cancel) {
                        let _ = ledger.cancel(&caller, r.id).await;
                    }
                }));
            }
            for task in tasks {
                task.await.unwrap();
            }

            let active = h.store.sum_active_quantity(TICKET).await.unwrap();
            assert!(active <= limit, "active {} over limit {}", active, limit);
            assert_eq!(i64::from(h.keeper.get(TICKET).unwrap().reserved_quantity), active);
        });
    }
}
