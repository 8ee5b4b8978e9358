#![forbid(unsafe_code)]

//! Reward issuance orchestration.
//!
//! One linear sequence per request: validate, decide eligibility, allocate a
//! nonce, build/sign, submit, report. Ineligibility is an ordinary outcome
//! value, not an error; ledger failures are caught here and converted to a
//! typed error so nothing propagates as an unhandled fault. No retries and
//! no request deduplication: each call triggers at most one new transaction
//! attempt.

use crate::ledger::{LedgerClient, LedgerError, RewardCall, TxId};
use crate::nonce::NonceSequencer;
use crate::policy;
use ethers::types::Address;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// One reward request. Constructed per call, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardRequest {
    /// Account address string supplied by the caller.
    pub subject_account: String,
    /// Classifier-derived score, 0-100.
    pub observed_score: u32,
    /// Pre-accumulated score; selects the manual-claim path when present.
    pub cumulative_score: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueOutcome {
    Rewarded { tx_id: TxId },
    Ineligible { reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    /// Bad caller input; the ledger was never touched.
    #[error("invalid request: {0}")]
    Validation(String),
    /// Local cryptographic/construction fault.
    #[error("signing failed: {0}")]
    Signing(String),
    /// Network failure, RPC rejection, or timeout. Indeterminate on timeout:
    /// the transaction may or may not have been accepted.
    #[error("submission failed: {0}")]
    Submission(String),
}

pub struct RewardEngine {
    ledger: Arc<dyn LedgerClient>,
    nonces: NonceSequencer,
}

impl RewardEngine {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        let nonces = NonceSequencer::new(ledger.clone());
        Self { ledger, nonces }
    }

    /// Issue at most one reward transaction for this request.
    pub async fn issue_reward(&self, req: &RewardRequest) -> Result<IssueOutcome, IssueError> {
        let recipient = parse_account(&req.subject_account)?;

        let decision = match req.cumulative_score {
            Some(cumulative) => policy::decide_claim(cumulative),
            None => policy::decide_auto(req.observed_score),
        };
        if !decision.eligible {
            let reason = match req.cumulative_score {
                Some(c) => format!(
                    "cumulative score {c} below claim threshold {}",
                    policy::CLAIM_SCORE_THRESHOLD
                ),
                None => format!(
                    "score {} below reward threshold {}",
                    req.observed_score,
                    policy::AUTO_SCORE_THRESHOLD
                ),
            };
            return Ok(IssueOutcome::Ineligible { reason });
        }

        let nonce = self
            .nonces
            .next_nonce()
            .await
            .map_err(|e| IssueError::Submission(e.to_string()))?;

        let call = RewardCall {
            recipient,
            amount: decision.amount,
        };
        let raw = match self.ledger.build_and_sign(&call, nonce) {
            Ok(raw) => raw,
            Err(e) => {
                // The allocated value stays burned; the cache is never
                // decremented once a value has been handed out.
                warn!(nonce = %nonce, error = %e, "reward transaction signing failed");
                return Err(IssueError::Signing(e.to_string()));
            }
        };

        match self.ledger.submit(raw).await {
            Ok(tx_id) => {
                info!(
                    recipient = %format!("{recipient:#x}"),
                    nonce = %nonce,
                    tx = %tx_id.0,
                    "reward submitted"
                );
                Ok(IssueOutcome::Rewarded { tx_id })
            }
            Err(e) => {
                if matches!(e, LedgerError::NonceConflict(_)) {
                    self.nonces.mark_conflict().await;
                }
                warn!(nonce = %nonce, error = %e, reason = e.reason(), "reward submission failed");
                Err(IssueError::Submission(e.to_string()))
            }
        }
    }
}

fn parse_account(raw: &str) -> Result<Address, IssueError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(IssueError::Validation("missing wallet address".to_string()));
    }
    Address::from_str(trimmed)
        .map_err(|e| IssueError::Validation(format!("invalid wallet address: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixed_and_bare_addresses() {
        assert!(parse_account("0x00000000000000000000000000000000000000aa").is_ok());
        assert!(parse_account("00000000000000000000000000000000000000aa").is_ok());
    }

    #[test]
    fn rejects_empty_and_malformed_addresses() {
        assert!(matches!(
            parse_account("  "),
            Err(IssueError::Validation(_))
        ));
        assert!(matches!(
            parse_account("not-an-address"),
            Err(IssueError::Validation(_))
        ));
        assert!(matches!(
            parse_account("0x1234"),
            Err(IssueError::Validation(_))
        ));
    }
}
