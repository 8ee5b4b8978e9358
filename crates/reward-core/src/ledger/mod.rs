#![forbid(unsafe_code)]

//! Ledger client contract.
//!
//! The minimal capabilities the reward engine needs from the external chain,
//! expressed as a transport-agnostic async trait. Runtime transports (the
//! Ethereum JSON-RPC adapter) and the deterministic mock implement it.
//!
//! ## Design constraints
//! - The counter read is for seeding/resync only, never per-request.
//! - `submit` performs exactly one network write per successful call and
//!   never retries internally; retry policy is the caller's concern.
//! - A stale/duplicate-counter rejection must surface as its own error kind
//!   so the sequencer can resynchronize.

pub mod eth_client;
pub mod mock_client;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, U256};

/// Identifier of a submitted ledger transaction (0x-prefixed hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxId(pub String);

/// One `rewardUser(address,uint256)` contract call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardCall {
    pub recipient: Address,
    /// Amount in the token's smallest unit.
    pub amount: U256,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("signing error: {0}")]
    Signing(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("rpc rejected transaction: {0}")]
    Rejected(String),
    #[error("stale or duplicate nonce: {0}")]
    NonceConflict(String),
    #[error("ledger request timed out")]
    Timeout,
}

impl LedgerError {
    /// Stable label for metrics/log fields.
    pub fn reason(&self) -> &'static str {
        match self {
            LedgerError::Config(_) => "config",
            LedgerError::Signing(_) => "signing",
            LedgerError::Network(_) => "network",
            LedgerError::Rejected(_) => "rejected",
            LedgerError::NonceConflict(_) => "nonce_conflict",
            LedgerError::Timeout => "timeout",
        }
    }
}

/// Required ledger capabilities, transport-agnostic.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Pending-state transaction counter of `address`.
    ///
    /// Used only to seed or resynchronize the nonce sequencer.
    async fn transaction_count(&self, address: Address) -> Result<U256, LedgerError>;

    /// Build the reward contract call and sign it with the service key,
    /// using an explicitly allocated counter value. Pure and local.
    fn build_and_sign(&self, call: &RewardCall, nonce: U256) -> Result<Bytes, LedgerError>;

    /// Submit signed transaction bytes, returning the transaction id.
    async fn submit(&self, raw: Bytes) -> Result<TxId, LedgerError>;

    /// Address of the single signing account this client holds the key for.
    fn signer_address(&self) -> Address;
}
