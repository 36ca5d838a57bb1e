mod common;

use booking_core::{Caller, CoreError, ReservationStatus};
use chrono::Duration;
use common::{harness, TICKET};
use std::time::Duration as StdDuration;

#[tokio::test]
async fn test_two_sweeps_process_each_hold_once() {
    let h = harness();
    let a = h.ledger.reserve(&Caller::customer(1), 1, TICKET, 1).await.unwrap();
    let b = h.ledger.reserve(&Caller::customer(2), 2, TICKET, 2).await.unwrap();
    let kept = h.ledger.reserve(&Caller::customer(3), 3, TICKET, 3).await.unwrap();
    h.ledger.confirm(&Caller::customer(3), kept.id).await.unwrap();

    h.clock.advance(Duration::minutes(16));
    let first = h.reaper.sweep(h.clock_now()).await.unwrap();
    assert_eq!(first.scanned, 2);
    assert_eq!(first.expired, 2);
    assert!(first.failures.is_empty());

    let second = h.reaper.sweep(h.clock_now()).await.unwrap();
    assert_eq!(second.scanned, 0);
    assert_eq!(second.expired, 0);

    assert_eq!(h.keeper.release_calls(), 2);
    assert_eq!(h.keeper.get(TICKET).unwrap().reserved_quantity, 3);
    let admin = Caller::admin(100);
    for id in [a.id, b.id] {
        assert_eq!(h.ledger.get(&admin, id).await.unwrap().status, ReservationStatus::Expired);
    }
    assert_eq!(h.ledger.get(&admin, kept.id).await.unwrap().status, ReservationStatus::Confirmed);
}

#[tokio::test]
async fn test_hold_exactly_at_expiry_is_left_for_next_sweep() {
    let h = harness();
    h.ledger.reserve(&Caller::customer(1), 1, TICKET, 1).await.unwrap();

    h.clock.advance(Duration::minutes(15));
    assert_eq!(h.reaper.sweep(h.clock_now()).await.unwrap().scanned, 0);

    h.clock.advance(Duration::seconds(1));
    assert_eq!(h.reaper.sweep(h.clock_now()).await.unwrap().expired, 1);
}

#[tokio::test]
async fn test_concurrent_sweeps_are_single_flight() {
    let h = harness();
    h.ledger.reserve(&Caller::customer(1), 1, TICKET, 1).await.unwrap();
    h.ledger.reserve(&Caller::customer(2), 2, TICKET, 1).await.unwrap();
    h.clock.advance(Duration::minutes(20));
    h.keeper.set_latency(Some(StdDuration::from_millis(50)));

    let now = h.clock_now();
    let (left, right) = tokio::join!(h.reaper.sweep(now), h.reaper.sweep(now));
    let (left, right) = (left.unwrap(), right.unwrap());

    assert!(left.overlapped ^ right.overlapped);
    assert_eq!(left.expired + right.expired, 2);
    assert_eq!(h.keeper.release_calls(), 2);
}

#[tokio::test]
async fn test_release_failure_does_not_stop_expiry() {
    let h = harness();
    let placed = h.ledger.reserve(&Caller::customer(1), 1, TICKET, 2).await.unwrap();
    h.clock.advance(Duration::minutes(16));
    h.keeper.fail_releases(Some("ticket service down"));

    let expired = h.reaper.sweep_expired(&Caller::system()).await.unwrap();
    assert_eq!(expired, 1);
    assert_eq!(
        h.ledger.get(&Caller::customer(1), placed.id).await.unwrap().status,
        ReservationStatus::Expired
    );
    assert!(h.events.kinds().contains(&"release_drift"));
}

#[tokio::test]
async fn test_sweep_judges_lapse_at_its_scan_time() {
    let h = harness();
    let placed = h.ledger.reserve(&Caller::customer(1), 1, TICKET, 2).await.unwrap();

    let later = h.clock_now() + Duration::minutes(20);
    let report = h.reaper.sweep(later).await.unwrap();

    assert_eq!(report.scanned, 1);
    assert_eq!(report.expired, 1);
    assert_eq!(report.skipped, 0);
    assert_eq!(h.keeper.release_calls(), 1);
    let status = h.ledger.get(&Caller::admin(100), placed.id).await.unwrap().status;
    assert_eq!(status, ReservationStatus::Expired);
}

#[tokio::test]
async fn test_abandoned_sweep_still_frees_the_lease() {
    let h = harness();
    let first = h.ledger.reserve(&Caller::customer(1), 1, TICKET, 2).await.unwrap();
    h.clock.advance(Duration::minutes(16));
    h.keeper.set_latency(Some(StdDuration::from_millis(100)));

    let abandoned = tokio::time::timeout(
        StdDuration::from_millis(20),
        h.reaper.sweep_expired(&Caller::admin(9)),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(StdDuration::from_millis(300)).await;
    h.keeper.set_latency(None);

    // the abandoned pass ran to completion in the background
    let admin = Caller::admin(100);
    assert_eq!(h.ledger.get(&admin, first.id).await.unwrap().status, ReservationStatus::Expired);
    assert_eq!(h.keeper.release_calls(), 1);

    let second = h.ledger.reserve(&Caller::customer(2), 2, TICKET, 1).await.unwrap();
    h.clock.advance(Duration::minutes(16));
    let report = h.reaper.sweep(h.clock_now()).await.unwrap();

    assert!(!report.overlapped);
    assert_eq!(report.expired, 1);
    assert_eq!(h.ledger.get(&admin, second.id).await.unwrap().status, ReservationStatus::Expired);
    assert_eq!(h.keeper.get(TICKET).unwrap().reserved_quantity, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_confirm_racing_sweep_on_lapsed_hold_releases_once() {
    for round in 0..20 {
        let h = harness();
        let placed = h.ledger.reserve(&Caller::customer(1), 1, TICKET, 2).await.unwrap();
        h.clock.advance(Duration::minutes(16));
        let now = h.clock_now();

        let (ledger, id) = (h.ledger.clone(), placed.id);
        let confirm = tokio::spawn(async move { ledger.confirm(&Caller::customer(1), id).await });
        let reaper = h.reaper.clone();
        let sweep = tokio::spawn(async move { reaper.sweep(now).await });

        let confirmed = confirm.await.unwrap();
        let swept = sweep.await.unwrap().unwrap();

        assert!(matches!(confirmed, Err(CoreError::StateError(_))), "round {}", round);
        assert!(swept.failures.is_empty(), "round {}", round);
        assert_eq!(swept.expired + swept.skipped, swept.scanned, "round {}", round);
        assert_eq!(h.keeper.release_calls(), 1, "round {}", round);
        assert_eq!(h.keeper.get(TICKET).unwrap().reserved_quantity, 0);
        let expired_events = h.events.kinds().into_iter().filter(|k| *k == "expired").count();
        assert_eq!(expired_events, 1, "round {}", round);
        let status = h.ledger.get(&Caller::admin(100), placed.id).await.unwrap().status;
        assert_eq!(status, ReservationStatus::Expired);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_confirm_racing_early_sweep_has_one_winner() {
    for round in 0..20 {
        let h = harness();
        let placed = h.ledger.reserve(&Caller::customer(1), 1, TICKET, 2).await.unwrap();
        h.clock.advance(Duration::minutes(10));
        // the sweep sees the hold as lapsed, the confirming caller does not
        let sweep_at = h.clock_now() + Duration::minutes(10);

        let (ledger, id) = (h.ledger.clone(), placed.id);
        let confirm = tokio::spawn(async move { ledger.confirm(&Caller::customer(1), id).await });
        let reaper = h.reaper.clone();
        let sweep = tokio::spawn(async move { reaper.sweep(sweep_at).await });

        let confirmed = confirm.await.unwrap();
        let swept = sweep.await.unwrap().unwrap();
        let status = h.ledger.get(&Caller::admin(100), placed.id).await.unwrap().status;

        match confirmed {
            Ok(c) => {
                assert_eq!(c.status, ReservationStatus::Confirmed);
                assert_eq!(status, ReservationStatus::Confirmed, "round {}", round);
                assert_eq!(swept.expired, 0, "round {}", round);
                assert_eq!(h.keeper.release_calls(), 0, "round {}", round);
                assert_eq!(h.keeper.get(TICKET).unwrap().reserved_quantity, 2);
            }
            Err(CoreError::StateError(_)) => {
                assert_eq!(status, ReservationStatus::Expired, "round {}", round);
                assert_eq!(swept.expired, 1, "round {}", round);
                assert_eq!(h.keeper.release_calls(), 1, "round {}", round);
                assert_eq!(h.keeper.get(TICKET).unwrap().reserved_quantity, 0);
            }
            Err(e) => panic!("round {}: unexpected error {}", round, e),
        }
    }
}
