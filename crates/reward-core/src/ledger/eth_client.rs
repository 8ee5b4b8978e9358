#![forbid(unsafe_code)]

//! Ethereum JSON-RPC adapter for the ledger client contract.
//!
//! One provider, one locally held signing key, legacy transactions with an
//! explicitly chosen nonce. The signing key never appears in logs or errors.

use super::{LedgerClient, LedgerError, RewardCall, TxId};
use async_trait::async_trait;
use ethers::abi::Token;
use ethers::providers::{Http, Middleware, Provider, ProviderError};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockId, BlockNumber, Bytes, TransactionRequest, U256};
use std::time::Duration;

/// Signature of the single escrow-contract function this service calls.
pub const REWARD_FUNCTION_SIGNATURE: &str = "rewardUser(address,uint256)";

/// RPC binding configuration for the Ethereum adapter.
#[derive(Debug, Clone)]
pub struct EthLedgerConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    /// Escrow contract holding the reward tokens.
    pub contract_address: String,
    pub gas_limit: u64,
    pub gas_price_gwei: u64,
    pub timeout_ms: u64,
}

impl Default for EthLedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            chain_id: 0,
            contract_address: String::new(),
            gas_limit: 300_000,
            gas_price_gwei: 10,
            timeout_ms: 10_000,
        }
    }
}

impl EthLedgerConfig {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.rpc_url.trim().is_empty() {
            return Err(LedgerError::Config("ledger.rpc_url is empty".to_string()));
        }
        if self.chain_id == 0 {
            return Err(LedgerError::Config("ledger.chain_id must be set".to_string()));
        }
        if self.contract_address.trim().is_empty() {
            return Err(LedgerError::Config(
                "ledger.contract_address is empty".to_string(),
            ));
        }
        if self.gas_limit == 0 {
            return Err(LedgerError::Config("ledger.gas_limit must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Async Ethereum client implementing the ledger contract.
#[derive(Debug, Clone)]
pub struct EthLedgerClient {
    provider: Provider<Http>,
    wallet: LocalWallet,
    contract: Address,
    gas_limit: U256,
    gas_price: U256,
}

impl EthLedgerClient {
    /// `private_key` is hex key material (with or without `0x`), typically
    /// resolved from the environment by the node config layer.
    pub fn new(cfg: &EthLedgerConfig, private_key: &str) -> Result<Self, LedgerError> {
        cfg.validate()?;

        let url = cfg
            .rpc_url
            .parse::<reqwest::Url>()
            .map_err(|e| LedgerError::Config(format!("invalid ledger.rpc_url: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| LedgerError::Config(format!("failed to build http client: {e}")))?;
        let provider = Provider::new(Http::new_with_client(url, http));

        // Do not echo the key material into the error message.
        let wallet = private_key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|_| LedgerError::Config("invalid signing key material".to_string()))?
            .with_chain_id(cfg.chain_id);

        let contract = cfg
            .contract_address
            .trim()
            .parse::<Address>()
            .map_err(|e| LedgerError::Config(format!("invalid ledger.contract_address: {e}")))?;

        Ok(Self {
            provider,
            wallet,
            contract,
            gas_limit: U256::from(cfg.gas_limit),
            gas_price: U256::from(cfg.gas_price_gwei) * U256::exp10(9),
        })
    }

    /// ABI calldata for `rewardUser(address,uint256)`: 4-byte selector plus
    /// two 32-byte words.
    fn reward_calldata(call: &RewardCall) -> Bytes {
        let selector = ethers::utils::id(REWARD_FUNCTION_SIGNATURE);
        let encoded = ethers::abi::encode(&[
            Token::Address(call.recipient),
            Token::Uint(call.amount),
        ]);
        let mut data = Vec::with_capacity(selector.len() + encoded.len());
        data.extend_from_slice(&selector);
        data.extend_from_slice(&encoded);
        Bytes::from(data)
    }

    fn classify_error(e: ProviderError) -> LedgerError {
        if let ProviderError::JsonRpcClientError(inner) = &e {
            if let Some(rpc) = inner.as_error_response() {
                let msg = rpc.message.clone();
                let lower = msg.to_ascii_lowercase();
                if lower.contains("nonce too low")
                    || lower.contains("invalid nonce")
                    || lower.contains("nonce is too low")
                    || lower.contains("already known")
                {
                    return LedgerError::NonceConflict(msg);
                }
                return LedgerError::Rejected(msg);
            }
        }
        let msg = e.to_string();
        if msg.to_ascii_lowercase().contains("timed out") {
            return LedgerError::Timeout;
        }
        LedgerError::Network(msg)
    }
}

#[async_trait]
impl LedgerClient for EthLedgerClient {
    async fn transaction_count(&self, address: Address) -> Result<U256, LedgerError> {
        self.provider
            .get_transaction_count(address, Some(BlockId::Number(BlockNumber::Pending)))
            .await
            .map_err(Self::classify_error)
    }

    fn build_and_sign(&self, call: &RewardCall, nonce: U256) -> Result<Bytes, LedgerError> {
        let tx: TypedTransaction = TransactionRequest::new()
            .from(self.wallet.address())
            .to(self.contract)
            .data(Self::reward_calldata(call))
            .gas(self.gas_limit)
            .gas_price(self.gas_price)
            .nonce(nonce)
            .chain_id(self.wallet.chain_id())
            .into();

        let sig = self
            .wallet
            .sign_transaction_sync(&tx)
            .map_err(|e| LedgerError::Signing(e.to_string()))?;
        Ok(tx.rlp_signed(&sig))
    }

    async fn submit(&self, raw: Bytes) -> Result<TxId, LedgerError> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(Self::classify_error)?;
        Ok(TxId(format!("{:#x}", pending.tx_hash())))
    }

    fn signer_address(&self) -> Address {
        self.wallet.address()
    }
}
