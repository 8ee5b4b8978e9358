#![forbid(unsafe_code)]

//! End-to-end engine behavior against the deterministic mock ledger.

use ethers::types::{Address, U256};
use reward_core::ledger::mock_client::MockLedgerClient;
use reward_core::{IssueError, IssueOutcome, LedgerError, RewardEngine, RewardRequest};
use std::sync::Arc;

const RECIPIENT: &str = "0x00000000000000000000000000000000000000aa";

fn auto_request(score: u32) -> RewardRequest {
    RewardRequest {
        subject_account: RECIPIENT.to_string(),
        observed_score: score,
        cumulative_score: None,
    }
}

fn claim_request(cumulative: u64) -> RewardRequest {
    RewardRequest {
        subject_account: RECIPIENT.to_string(),
        observed_score: 0,
        cumulative_score: Some(cumulative),
    }
}

#[tokio::test]
async fn invalid_address_never_touches_the_ledger() {
    let mock = Arc::new(MockLedgerClient::with_transaction_count(9));
    let engine = RewardEngine::new(mock.clone());

    let req = RewardRequest {
        subject_account: "not-an-address".to_string(),
        observed_score: 99,
        cumulative_score: None,
    };
    let err = engine.issue_reward(&req).await.unwrap_err();
    assert!(matches!(err, IssueError::Validation(_)));

    assert_eq!(mock.counter_reads(), 0);
    assert!(mock.submitted().is_empty());
}

#[tokio::test]
async fn low_score_is_ineligible_with_no_ledger_interaction() {
    let mock = Arc::new(MockLedgerClient::with_transaction_count(9));
    let engine = RewardEngine::new(mock.clone());

    let outcome = engine.issue_reward(&auto_request(10)).await.expect("outcome");
    assert!(matches!(outcome, IssueOutcome::Ineligible { .. }));

    assert_eq!(mock.counter_reads(), 0);
    assert!(mock.submitted().is_empty());
}

#[tokio::test]
async fn high_score_submits_exactly_one_reward() {
    let mock = Arc::new(MockLedgerClient::with_transaction_count(12));
    let engine = RewardEngine::new(mock.clone());

    let outcome = engine.issue_reward(&auto_request(80)).await.expect("outcome");
    let tx_id = match outcome {
        IssueOutcome::Rewarded { tx_id } => tx_id,
        other => panic!("expected reward, got {other:?}"),
    };
    assert!(tx_id.0.starts_with("0x"));

    let submitted = mock.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].recipient, RECIPIENT.parse::<Address>().unwrap());
    assert_eq!(submitted[0].amount, U256::from(5u64) * U256::exp10(18));
    assert_eq!(submitted[0].nonce, U256::from(12u64));
}

#[tokio::test]
async fn claim_path_uses_the_cumulative_threshold() {
    let mock = Arc::new(MockLedgerClient::with_transaction_count(0));
    let engine = RewardEngine::new(mock.clone());

    let outcome = engine.issue_reward(&claim_request(249)).await.expect("outcome");
    assert!(matches!(outcome, IssueOutcome::Ineligible { .. }));
    assert!(mock.submitted().is_empty());

    let outcome = engine.issue_reward(&claim_request(250)).await.expect("outcome");
    assert!(matches!(outcome, IssueOutcome::Rewarded { .. }));
    assert_eq!(mock.submitted().len(), 1);
}

#[tokio::test]
async fn consecutive_rewards_use_consecutive_nonces() {
    let mock = Arc::new(MockLedgerClient::with_transaction_count(3));
    let engine = RewardEngine::new(mock.clone());

    for _ in 0..3 {
        let outcome = engine.issue_reward(&auto_request(75)).await.expect("outcome");
        assert!(matches!(outcome, IssueOutcome::Rewarded { .. }));
    }

    let nonces: Vec<U256> = mock.submitted().iter().map(|s| s.nonce).collect();
    assert_eq!(nonces, vec![U256::from(3u64), U256::from(4u64), U256::from(5u64)]);
    // The counter was read once, to seed the sequencer.
    assert_eq!(mock.counter_reads(), 1);
}

#[tokio::test]
async fn submit_failure_surfaces_as_submission_error() {
    let mock = Arc::new(MockLedgerClient::with_transaction_count(0));
    mock.fail_next_submit(LedgerError::Network("connection reset".to_string()));
    let engine = RewardEngine::new(mock.clone());

    let err = engine.issue_reward(&auto_request(90)).await.unwrap_err();
    assert!(matches!(err, IssueError::Submission(_)));
    assert!(mock.submitted().is_empty());
}

#[tokio::test]
async fn signing_failure_burns_the_allocated_nonce() {
    let mock = Arc::new(MockLedgerClient::with_transaction_count(0));
    mock.fail_next_sign(LedgerError::Signing("bad key state".to_string()));
    let engine = RewardEngine::new(mock.clone());

    let err = engine.issue_reward(&auto_request(90)).await.unwrap_err();
    assert!(matches!(err, IssueError::Signing(_)));

    // The failed attempt consumed nonce 0; the next reward gets 1.
    let outcome = engine.issue_reward(&auto_request(90)).await.expect("outcome");
    assert!(matches!(outcome, IssueOutcome::Rewarded { .. }));
    assert_eq!(mock.submitted()[0].nonce, U256::from(1u64));
}

#[tokio::test]
async fn nonce_conflict_resynchronizes_from_the_ledger() {
    let mock = Arc::new(MockLedgerClient::with_transaction_count(5));
    let engine = RewardEngine::new(mock.clone());

    // Seed the sequencer, then make the chain-side counter jump ahead as if
    // another process signed with the same account.
    let outcome = engine.issue_reward(&auto_request(90)).await.expect("outcome");
    assert!(matches!(outcome, IssueOutcome::Rewarded { .. }));
    mock.set_transaction_count(U256::from(40u64));
    mock.fail_next_submit(LedgerError::NonceConflict("nonce too low".to_string()));

    let err = engine.issue_reward(&auto_request(90)).await.unwrap_err();
    assert!(matches!(err, IssueError::Submission(_)));

    // The conflict invalidated the cache; the next reward reseeds at 40.
    let outcome = engine.issue_reward(&auto_request(90)).await.expect("outcome");
    assert!(matches!(outcome, IssueOutcome::Rewarded { .. }));
    let submitted = mock.submitted();
    assert_eq!(submitted.last().unwrap().nonce, U256::from(40u64));
    assert_eq!(mock.counter_reads(), 2);
}
