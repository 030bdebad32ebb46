//! Ledger storage tests.

use super::*;

fn capped_event(ledger: &ClaimLedger, code: &str, max_supply: Option<u32>) -> EventRecord {
    ledger
        .create_event(&NewEvent {
            event_code: code.into(),
            name: format!("{code} conference"),
            contract_address: Some("0x1111111111111111111111111111111111111111".into()),
            max_supply,
            ..NewEvent::default()
        })
        .expect("create event")
}

fn claim_for(event_id: i64, user: &str, tx: &str) -> NewClaim {
    NewClaim {
        event_id,
        user_address: user.into(),
        token_id: "7".into(),
        transaction_hash: tx.into(),
    }
}

#[test]
fn event_code_is_uppercased_and_lookup_is_case_insensitive() {
    let ledger = ClaimLedger::in_memory().unwrap();
    let created = capped_event(&ledger, "devconf2024", None);
    assert_eq!(created.event_code, "DEVCONF2024");

    let found = ledger.event_by_code("DevConf2024").unwrap().unwrap();
    assert_eq!(found.id, created.id);
    assert!(ledger.event_by_code("OTHER").unwrap().is_none());
}

#[test]
fn duplicate_event_code_is_rejected() {
    let ledger = ClaimLedger::in_memory().unwrap();
    capped_event(&ledger, "DEVCONF2024", None);

    let result = ledger.create_event(&NewEvent {
        event_code: "devconf2024".into(),
        name: "imposter".into(),
        ..NewEvent::default()
    });
    assert!(matches!(
        result,
        Err(LedgerError::DuplicateEventCode { code }) if code == "DEVCONF2024"
    ));
}

#[test]
fn record_claim_inserts_row_and_bumps_counter() {
    let ledger = ClaimLedger::in_memory().unwrap();
    let event = capped_event(&ledger, "E1", Some(10));

    let recorded = ledger
        .record_claim(&claim_for(event.id, "0xAbCd000000000000000000000000000000000001", "0xtx1"))
        .unwrap();
    assert_eq!(recorded.event_id, event.id);
    assert_eq!(
        recorded.user_address,
        "0xabcd000000000000000000000000000000000001"
    );

    let after = ledger.event_by_id(event.id).unwrap().unwrap();
    assert_eq!(after.total_claimed, 1);
}

#[test]
fn duplicate_claim_is_rejected_case_insensitively() {
    let ledger = ClaimLedger::in_memory().unwrap();
    let event = capped_event(&ledger, "E1", None);
    let user = "0xAbCd000000000000000000000000000000000001";

    ledger.record_claim(&claim_for(event.id, user, "0xtx1")).unwrap();
    let result = ledger.record_claim(&claim_for(event.id, &user.to_uppercase().replace("0X", "0x"), "0xtx2"));
    assert!(matches!(result, Err(LedgerError::DuplicateClaim { .. })));

    // The failed attempt must not have bumped the counter.
    let after = ledger.event_by_id(event.id).unwrap().unwrap();
    assert_eq!(after.total_claimed, 1);
}

#[test]
fn guarded_increment_refuses_to_oversell() {
    let ledger = ClaimLedger::in_memory().unwrap();
    let event = capped_event(&ledger, "E1", Some(1));

    ledger
        .record_claim(&claim_for(event.id, "0x0000000000000000000000000000000000000001", "0xtx1"))
        .unwrap();
    let result = ledger.record_claim(&claim_for(
        event.id,
        "0x0000000000000000000000000000000000000002",
        "0xtx2",
    ));
    assert!(matches!(result, Err(LedgerError::SupplyExhausted { .. })));

    // The rolled-back attempt must leave no claim row behind.
    let orphan = ledger
        .find_claim(event.id, "0x0000000000000000000000000000000000000002")
        .unwrap();
    assert!(orphan.is_none());
    let after = ledger.event_by_id(event.id).unwrap().unwrap();
    assert_eq!(after.total_claimed, 1);
}

#[test]
fn claims_for_user_joins_events_and_skips_deleted_ones() {
    let ledger = ClaimLedger::in_memory().unwrap();
    let kept = capped_event(&ledger, "KEPT", None);
    let doomed = capped_event(&ledger, "DOOMED", None);
    let user = "0x0000000000000000000000000000000000000009";

    ledger.record_claim(&claim_for(kept.id, user, "0xtx1")).unwrap();
    ledger.record_claim(&claim_for(doomed.id, user, "0xtx2")).unwrap();

    ledger.delete_event(doomed.id).unwrap();

    let stamps = ledger.claims_for_user(user).unwrap();
    assert_eq!(stamps.len(), 1);
    assert_eq!(stamps[0].1.event_code, "KEPT");
}

#[test]
fn claims_for_user_is_empty_for_unknown_address() {
    let ledger = ClaimLedger::in_memory().unwrap();
    let stamps = ledger
        .claims_for_user("0x0000000000000000000000000000000000000042")
        .unwrap();
    assert!(stamps.is_empty());
}

#[test]
fn concurrent_record_calls_admit_exactly_one() {
    let ledger = ClaimLedger::in_memory().unwrap();
    let event = capped_event(&ledger, "RACE", Some(10));
    let user = "0x0000000000000000000000000000000000000007";

    let handles: Vec<_> = (0..2)
        .map(|i| {
            let ledger = ledger.clone();
            let claim = claim_for(event.id, user, &format!("0xtx{i}"));
            std::thread::spawn(move || ledger.record_claim(&claim))
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(LedgerError::DuplicateClaim { .. })))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(duplicates, 1);

    let after = ledger.event_by_id(event.id).unwrap().unwrap();
    assert_eq!(after.total_claimed, 1);
}

#[test]
fn ledger_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");

    {
        let ledger = ClaimLedger::open(&path).unwrap();
        capped_event(&ledger, "PERSIST", Some(5));
    }

    let reopened = ClaimLedger::open(&path).unwrap();
    let event = reopened.event_by_code("PERSIST").unwrap().unwrap();
    assert_eq!(event.max_supply, Some(5));
}
