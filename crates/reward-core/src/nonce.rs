#![forbid(unsafe_code)]

//! Transaction-counter sequencing for the single signing account.

use crate::ledger::{LedgerClient, LedgerError};
use ethers::types::{Address, U256};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Hands out strictly increasing, non-repeating transaction counters for the
/// one account this service signs with.
///
/// The cached counter is the single piece of shared mutable state in the
/// system; every allocation goes through one async mutex. Concurrent callers
/// must never read the ledger's counter independently; that pattern races
/// and produces duplicate nonces.
pub struct NonceSequencer {
    ledger: Arc<dyn LedgerClient>,
    account: Address,
    /// Next value to hand out; `None` until seeded (or after a conflict).
    next: Mutex<Option<U256>>,
}

impl NonceSequencer {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        let account = ledger.signer_address();
        Self {
            ledger,
            account,
            next: Mutex::new(None),
        }
    }

    /// Allocate the next counter value.
    ///
    /// Seeds lazily from the ledger's pending-state counter on first use,
    /// then read-and-increments the cache under the lock. An allocated value
    /// is never returned to the cache: a submission that failed locally may
    /// still have reached the network, and handing the value to a second
    /// transaction risks a collision.
    pub async fn next_nonce(&self) -> Result<U256, LedgerError> {
        let mut slot = self.next.lock().await;
        let current = match *slot {
            Some(n) => n,
            None => {
                let seeded = self.ledger.transaction_count(self.account).await?;
                info!(account = %format!("{:#x}", self.account), nonce = %seeded, "seeded nonce cache from ledger");
                seeded
            }
        };
        *slot = Some(current + U256::one());
        Ok(current)
    }

    /// Drop the cached counter after a stale/duplicate-nonce rejection.
    ///
    /// The next allocation re-reads the authoritative ledger counter; the
    /// caller that hit the conflict still observes its failure.
    pub async fn mark_conflict(&self) {
        let mut slot = self.next.lock().await;
        if slot.take().is_some() {
            warn!(account = %format!("{:#x}", self.account), "nonce cache invalidated after ledger conflict");
        }
    }
}
