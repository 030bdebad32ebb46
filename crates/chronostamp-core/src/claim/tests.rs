//! Orchestrator gate and flow tests.

use chrono::Utc;
use secrecy::SecretString;

use super::*;
use crate::ledger::NewEvent;
use crate::signer::SignerConfig;

const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const CONTRACT: &str = "0x1111111111111111111111111111111111111111";
const USER: &str = "0x8ba1f109551bD432803012645Ac136ddd64DBA72";
const OTHER_USER: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

fn orchestrator() -> ClaimOrchestrator {
    let ledger = ClaimLedger::in_memory().expect("in-memory ledger");
    let signer = SignerService::new(SignerConfig {
        private_key_hex: SecretString::new(DEV_KEY.to_string()),
        expected_address: None,
    })
    .expect("dev signer");
    ClaimOrchestrator::new(ledger, signer, None)
}

fn seed_event(orchestrator: &ClaimOrchestrator, event: NewEvent) -> i64 {
    orchestrator.ledger().create_event(&event).expect("seed event").id
}

fn devconf(max_supply: Option<u32>) -> NewEvent {
    NewEvent {
        event_code: "DEVCONF2024".into(),
        name: "DevConf 2024".into(),
        description: "Annual developer conference".into(),
        image_url: "ipfs://stamp".into(),
        event_date: "2024-11-12".into(),
        organizer: "DevConf".into(),
        contract_address: Some(CONTRACT.into()),
        max_supply,
        ..NewEvent::default()
    }
}

fn authorize(orch: &ClaimOrchestrator, code: &str, user: &str) -> Result<ClaimAuthorization, ClaimError> {
    orch.authorize(&AuthorizeRequest {
        event_code: code.into(),
        user_address: user.into(),
    })
}

fn record(orch: &ClaimOrchestrator, event_id: i64, user: &str, tx: &str) -> Result<RecordedClaim, ClaimError> {
    orch.record(&RecordRequest {
        event_id,
        user_address: user.into(),
        transaction_hash: tx.into(),
        token_id: "7".into(),
        block_number: Some(100),
        gas_used: Some(21_000),
    })
}

#[test]
fn authorize_rejects_empty_code_and_bad_address() {
    let orch = orchestrator();
    assert!(matches!(
        authorize(&orch, "  ", USER),
        Err(ClaimError::InvalidInput { .. })
    ));
    assert!(matches!(
        authorize(&orch, "DEVCONF2024", "not-an-address"),
        Err(ClaimError::InvalidInput { .. })
    ));
}

#[test]
fn authorize_rejects_unknown_event() {
    let orch = orchestrator();
    assert!(matches!(
        authorize(&orch, "NOSUCH", USER),
        Err(ClaimError::EventNotFound)
    ));
}

#[test]
fn authorize_matches_event_code_case_insensitively() {
    let orch = orchestrator();
    seed_event(&orch, devconf(None));

    let auth = authorize(&orch, "devconf2024", USER).expect("authorize");
    assert_eq!(auth.event_code, "DEVCONF2024");
    assert_eq!(auth.contract_address, CONTRACT);
    assert!(auth.signature.starts_with("0x"));
    assert_eq!(auth.nonce.len(), 66);
}

#[test]
fn authorize_returns_checksummed_address() {
    let orch = orchestrator();
    seed_event(&orch, devconf(None));

    let auth = authorize(&orch, "DEVCONF2024", &USER.to_lowercase()).expect("authorize");
    assert_eq!(auth.user_address, USER);
}

#[test]
fn authorize_rejects_undeployed_contract() {
    let orch = orchestrator();
    seed_event(
        &orch,
        NewEvent {
            contract_address: None,
            ..devconf(None)
        },
    );

    assert!(matches!(
        authorize(&orch, "DEVCONF2024", USER),
        Err(ClaimError::ContractNotDeployed)
    ));
}

#[test]
fn authorize_is_read_only() {
    let orch = orchestrator();
    let event_id = seed_event(&orch, devconf(Some(5)));

    for _ in 0..3 {
        authorize(&orch, "DEVCONF2024", USER).expect("authorize");
    }

    let event = orch.ledger().event_by_id(event_id).unwrap().unwrap();
    assert_eq!(event.total_claimed, 0);
}

#[test]
fn supply_gate_boundary() {
    let orch = orchestrator();
    let event_id = seed_event(&orch, devconf(Some(2)));

    record(&orch, event_id, USER, "0xtx1").expect("first record");

    // total_claimed == max_supply - 1: authorization still succeeds.
    authorize(&orch, "DEVCONF2024", OTHER_USER).expect("one slot left");

    record(&orch, event_id, OTHER_USER, "0xtx2").expect("second record");

    // total_claimed == max_supply: sold out.
    assert!(matches!(
        authorize(
            &orch,
            "DEVCONF2024",
            "0x0000000000000000000000000000000000000003"
        ),
        Err(ClaimError::SoldOut)
    ));
}

#[test]
fn claim_window_gates() {
    let orch = orchestrator();
    let now = Utc::now().timestamp();

    seed_event(
        &orch,
        NewEvent {
            event_code: "FUTURE".into(),
            claim_start: Some(now + 3600),
            ..devconf(None)
        },
    );
    seed_event(
        &orch,
        NewEvent {
            event_code: "PAST".into(),
            claim_end: Some(now - 3600),
            ..devconf(None)
        },
    );
    seed_event(
        &orch,
        NewEvent {
            event_code: "OPEN".into(),
            claim_start: Some(now - 3600),
            claim_end: Some(now + 3600),
            ..devconf(None)
        },
    );

    assert!(matches!(
        authorize(&orch, "FUTURE", USER),
        Err(ClaimError::ClaimingNotYetOpen)
    ));
    assert!(matches!(
        authorize(&orch, "PAST", USER),
        Err(ClaimError::ClaimingClosed)
    ));
    authorize(&orch, "OPEN", USER).expect("window open");
}

#[test]
fn authorize_fails_the_signer_health_gate_on_key_mismatch() {
    let ledger = ClaimLedger::in_memory().unwrap();
    let signer = SignerService::new(SignerConfig {
        private_key_hex: SecretString::new(DEV_KEY.to_string()),
        expected_address: Some("0x0000000000000000000000000000000000000001".into()),
    })
    .unwrap();
    let orch = ClaimOrchestrator::new(ledger, signer, None);
    seed_event(&orch, devconf(None));

    assert!(matches!(
        authorize(&orch, "DEVCONF2024", USER),
        Err(ClaimError::ServerMisconfigured)
    ));
}

#[test]
fn record_requires_all_fields() {
    let orch = orchestrator();
    let event_id = seed_event(&orch, devconf(None));

    let missing_tx = orch.record(&RecordRequest {
        event_id,
        user_address: USER.into(),
        transaction_hash: String::new(),
        token_id: "7".into(),
        block_number: None,
        gas_used: None,
    });
    assert!(matches!(missing_tx, Err(ClaimError::InvalidInput { .. })));

    let missing_token = orch.record(&RecordRequest {
        event_id,
        user_address: USER.into(),
        transaction_hash: "0xtx".into(),
        token_id: "  ".into(),
        block_number: None,
        gas_used: None,
    });
    assert!(matches!(missing_token, Err(ClaimError::InvalidInput { .. })));
}

#[test]
fn record_rejects_unknown_event() {
    let orch = orchestrator();
    assert!(matches!(
        record(&orch, 999, USER, "0xtx"),
        Err(ClaimError::EventNotFound)
    ));
}

#[test]
fn record_then_authorize_again_is_already_claimed_and_idempotent() {
    let orch = orchestrator();
    let event_id = seed_event(&orch, devconf(Some(10)));

    record(&orch, event_id, USER, "0xtx1").expect("record");

    // AlreadyClaimed both times, with no state mutation between them.
    for _ in 0..2 {
        assert!(matches!(
            authorize(&orch, "DEVCONF2024", USER),
            Err(ClaimError::AlreadyClaimed)
        ));
    }
    let event = orch.ledger().event_by_id(event_id).unwrap().unwrap();
    assert_eq!(event.total_claimed, 1);
}

#[test]
fn record_twice_is_already_recorded() {
    let orch = orchestrator();
    let event_id = seed_event(&orch, devconf(None));

    record(&orch, event_id, USER, "0xtx1").expect("record");
    assert!(matches!(
        record(&orch, event_id, USER, "0xtx2"),
        Err(ClaimError::AlreadyRecorded)
    ));
    // Case variants of the same address are the same claimant.
    assert!(matches!(
        record(&orch, event_id, &USER.to_lowercase(), "0xtx3"),
        Err(ClaimError::AlreadyRecorded)
    ));
}

#[test]
fn record_returns_stamp_and_echoed_transaction() {
    let orch = orchestrator();
    let event_id = seed_event(&orch, devconf(None));

    let recorded = record(&orch, event_id, USER, "0xtx1").expect("record");
    assert_eq!(recorded.stamp.event_name, "DevConf 2024");
    assert_eq!(recorded.stamp.token_id, "7");
    assert_eq!(recorded.stamp.contract_address.as_deref(), Some(CONTRACT));
    assert_eq!(recorded.transaction.hash, "0xtx1");
    assert_eq!(recorded.transaction.block_number, Some(100));
    assert_eq!(recorded.transaction.gas_used, Some(21_000));
}

#[test]
fn end_to_end_single_supply_event() {
    let orch = orchestrator();
    let event_id = seed_event(&orch, devconf(Some(1)));

    let auth = authorize(&orch, "DEVCONF2024", USER).expect("authorize");
    assert_eq!(auth.event_id, event_id);
    assert!(auth.signature.starts_with("0x"));

    record(&orch, event_id, USER, "0xTX").expect("record");
    let event = orch.ledger().event_by_id(event_id).unwrap().unwrap();
    assert_eq!(event.total_claimed, 1);

    assert!(matches!(
        authorize(&orch, "DEVCONF2024", USER),
        Err(ClaimError::AlreadyClaimed)
    ));
    assert!(matches!(
        authorize(&orch, "DEVCONF2024", OTHER_USER),
        Err(ClaimError::SoldOut)
    ));
}

#[test]
fn stamps_for_user_projects_claims() {
    let orch = orchestrator();
    let event_id = seed_event(&orch, devconf(None));
    record(&orch, event_id, USER, "0xtx1").expect("record");

    let stamps = orch.stamps_for_user(USER).expect("stamps");
    assert_eq!(stamps.len(), 1);
    assert_eq!(stamps[0].event_name, "DevConf 2024");
    assert_eq!(stamps[0].organizer, "DevConf");

    // Same stamps regardless of query-address casing.
    let lower = orch.stamps_for_user(&USER.to_lowercase()).expect("stamps");
    assert_eq!(lower.len(), 1);
}

#[test]
fn stamps_for_user_rejects_bad_address() {
    let orch = orchestrator();
    assert!(matches!(
        orch.stamps_for_user("bogus"),
        Err(ClaimError::InvalidInput { .. })
    ));
}
