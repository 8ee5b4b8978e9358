#![forbid(unsafe_code)]

//! Deterministic in-memory ledger client for tests and offline smoke paths.

use super::{LedgerClient, LedgerError, RewardCall, TxId};
use async_trait::async_trait;
use ethers::types::{Address, Bytes, U256};
use std::collections::VecDeque;
use std::sync::Mutex;

/// A call the mock has signed, with the counter value it was bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignedReward {
    pub recipient: Address,
    pub amount: U256,
    pub nonce: U256,
}

#[derive(Debug)]
pub struct MockLedgerClient {
    signer: Address,
    counter: Mutex<U256>,
    counter_reads: Mutex<u64>,
    signed: Mutex<Vec<SignedReward>>,
    submitted: Mutex<Vec<SignedReward>>,
    fail_sign: Mutex<VecDeque<LedgerError>>,
    fail_submit: Mutex<VecDeque<LedgerError>>,
    fail_counter_read: Mutex<VecDeque<LedgerError>>,
}

impl MockLedgerClient {
    pub fn new() -> Self {
        Self {
            signer: Address::from_low_u64_be(0xfee1),
            counter: Mutex::new(U256::zero()),
            counter_reads: Mutex::new(0),
            signed: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
            fail_sign: Mutex::new(VecDeque::new()),
            fail_submit: Mutex::new(VecDeque::new()),
            fail_counter_read: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_transaction_count(count: u64) -> Self {
        let mock = Self::new();
        mock.set_transaction_count(U256::from(count));
        mock
    }

    /// Overwrite the ledger-side counter (simulates out-of-band activity on
    /// the signing account).
    pub fn set_transaction_count(&self, count: U256) {
        *self.counter.lock().expect("mutex poisoned") = count;
    }

    /// Script the next `build_and_sign` call to fail.
    pub fn fail_next_sign(&self, err: LedgerError) {
        self.fail_sign.lock().expect("mutex poisoned").push_back(err);
    }

    /// Script the next `submit` call to fail.
    pub fn fail_next_submit(&self, err: LedgerError) {
        self.fail_submit.lock().expect("mutex poisoned").push_back(err);
    }

    /// Script the next `transaction_count` call to fail.
    pub fn fail_next_counter_read(&self, err: LedgerError) {
        self.fail_counter_read
            .lock()
            .expect("mutex poisoned")
            .push_back(err);
    }

    pub fn counter_reads(&self) -> u64 {
        *self.counter_reads.lock().expect("mutex poisoned")
    }

    /// Calls that reached the network, in submission order.
    pub fn submitted(&self) -> Vec<SignedReward> {
        self.submitted.lock().expect("mutex poisoned").clone()
    }

    fn decode_index(raw: &Bytes) -> Result<usize, LedgerError> {
        let bytes: [u8; 8] = raw
            .as_ref()
            .try_into()
            .map_err(|_| LedgerError::Rejected("malformed mock transaction".to_string()))?;
        Ok(u64::from_be_bytes(bytes) as usize)
    }
}

impl Default for MockLedgerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for MockLedgerClient {
    async fn transaction_count(&self, _address: Address) -> Result<U256, LedgerError> {
        *self.counter_reads.lock().expect("mutex poisoned") += 1;
        if let Some(err) = self
            .fail_counter_read
            .lock()
            .expect("mutex poisoned")
            .pop_front()
        {
            return Err(err);
        }
        Ok(*self.counter.lock().expect("mutex poisoned"))
    }

    fn build_and_sign(&self, call: &RewardCall, nonce: U256) -> Result<Bytes, LedgerError> {
        if let Some(err) = self.fail_sign.lock().expect("mutex poisoned").pop_front() {
            return Err(err);
        }
        let mut signed = self.signed.lock().expect("mutex poisoned");
        let index = signed.len() as u64;
        signed.push(SignedReward {
            recipient: call.recipient,
            amount: call.amount,
            nonce,
        });
        Ok(Bytes::from(index.to_be_bytes().to_vec()))
    }

    async fn submit(&self, raw: Bytes) -> Result<TxId, LedgerError> {
        if let Some(err) = self.fail_submit.lock().expect("mutex poisoned").pop_front() {
            return Err(err);
        }
        let index = Self::decode_index(&raw)?;
        let reward = {
            let signed = self.signed.lock().expect("mutex poisoned");
            *signed
                .get(index)
                .ok_or_else(|| LedgerError::Rejected("unknown mock transaction".to_string()))?
        };
        self.submitted.lock().expect("mutex poisoned").push(reward);

        // The chain accepted a transaction from the signing account; its
        // authoritative counter advances.
        let mut counter = self.counter.lock().expect("mutex poisoned");
        *counter = counter.saturating_add(U256::one());

        Ok(TxId(format!("0x{index:064x}")))
    }

    fn signer_address(&self) -> Address {
        self.signer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_submissions_and_advances_counter() {
        let mock = MockLedgerClient::with_transaction_count(7);
        let call = RewardCall {
            recipient: Address::from_low_u64_be(0xaa),
            amount: U256::exp10(18),
        };

        let raw = mock.build_and_sign(&call, U256::from(7u64)).expect("sign");
        let tx = mock.submit(raw).await.expect("submit");
        assert_eq!(tx.0, format!("0x{:064x}", 0));

        let submitted = mock.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].nonce, U256::from(7u64));
        assert_eq!(
            mock.transaction_count(mock.signer_address()).await.unwrap(),
            U256::from(8u64)
        );
    }

    #[tokio::test]
    async fn scripted_submit_failure_is_one_shot() {
        let mock = MockLedgerClient::new();
        mock.fail_next_submit(LedgerError::NonceConflict("nonce too low".to_string()));

        let call = RewardCall {
            recipient: Address::from_low_u64_be(0xaa),
            amount: U256::one(),
        };
        let raw = mock.build_and_sign(&call, U256::zero()).expect("sign");
        let err = mock.submit(raw.clone()).await.unwrap_err();
        assert!(matches!(err, LedgerError::NonceConflict(_)));

        // Next attempt goes through.
        assert!(mock.submit(raw).await.is_ok());
    }
}
