#![forbid(unsafe_code)]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::float_cmp)]

//! Core reward-issuance logic for the emotion reward service.
//!
//! This crate owns everything with real invariants: the eligibility policy,
//! the transaction-counter sequencer for the single signing account, the
//! ledger client contract (with an Ethereum JSON-RPC adapter and a
//! deterministic mock), and the engine that orchestrates one reward issuance
//! from decision to submitted transaction. It is **transport-agnostic** above
//! the ledger: the HTTP surface and the emotion classifier live in the node.

pub mod engine;
pub mod ledger;
pub mod nonce;
pub mod policy;

pub use engine::{IssueError, IssueOutcome, RewardEngine, RewardRequest};
pub use ledger::eth_client::{EthLedgerClient, EthLedgerConfig};
pub use ledger::{LedgerClient, LedgerError, RewardCall, TxId};
pub use nonce::NonceSequencer;
pub use policy::{
    decide_auto, decide_claim, reward_amount, EligibilityDecision, AUTO_SCORE_THRESHOLD,
    CLAIM_SCORE_THRESHOLD,
};
