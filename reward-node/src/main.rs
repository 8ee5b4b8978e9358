#![forbid(unsafe_code)]

use async_trait::async_trait;
use clap::Parser;
use ethers::types::{Address, Bytes, U256};
use reward_core::ledger::mock_client::MockLedgerClient;
use reward_core::{
    EthLedgerClient, LedgerClient, LedgerError, RewardCall, RewardEngine, TxId,
};
use reward_node::{config, emotion, http_server, metrics};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Emotion Reward Node")]
struct Args {
    /// Path to a TOML config file. If omitted, uses `REWARD_NODE_CONFIG`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ledger mode:
    /// - mock: offline deterministic mock client (default)
    /// - eth: real Ethereum JSON-RPC adapter (requires config)
    #[arg(long, value_enum, default_value_t = LedgerMode::Mock)]
    ledger_mode: LedgerMode,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum, PartialEq, Eq)]
enum LedgerMode {
    Mock,
    Eth,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let cfg_path = resolve_config_path(args.config.as_deref());
    let cfg = cfg_path
        .as_deref()
        .map(config::load_config)
        .transpose()
        .unwrap_or_else(|e| exit_err(&e));

    init_logging(cfg.as_ref());

    let node_label = cfg
        .as_ref()
        .map(|c| c.node.label.as_str())
        .unwrap_or("reward-node");

    info!(node = node_label, ledger_mode = ?args.ledger_mode, "starting reward-node");

    let inner: Arc<dyn LedgerClient> = match args.ledger_mode {
        LedgerMode::Mock => Arc::new(MockLedgerClient::default()),
        LedgerMode::Eth => {
            let cfg = cfg.as_ref().unwrap_or_else(|| {
                exit_err(
                    "missing config: pass --config or set REWARD_NODE_CONFIG for --ledger-mode eth",
                )
            });
            cfg.validate_for_mode_eth().unwrap_or_else(|e| exit_err(&e));
            Arc::new(
                EthLedgerClient::new(&cfg.ledger.to_eth_config(), &cfg.ledger.private_key.0)
                    .unwrap_or_else(|e| exit_err(&e.to_string())),
            )
        }
    };
    let ledger = Arc::new(InstrumentedLedgerClient::new(inner));

    let classifier_cfg = cfg
        .as_ref()
        .map(|c| c.classifier.clone())
        .unwrap_or_default();
    let classifier = Arc::new(
        emotion::HttpEmotionClassifier::new(&classifier_cfg).unwrap_or_else(|e| exit_err(&e)),
    );

    let bind = cfg
        .as_ref()
        .map(|c| c.server.bind_address.clone())
        .unwrap_or_else(|| "0.0.0.0:3000".to_string());
    let metrics_enabled = cfg
        .as_ref()
        .map(|c| c.server.metrics_enabled)
        .unwrap_or(true);

    let state = http_server::AppState {
        engine: Arc::new(RewardEngine::new(ledger)),
        classifier,
        node_label: node_label.to_string(),
        metrics_enabled,
    };

    http_server::serve(&bind, state)
        .await
        .unwrap_or_else(|e| exit_err(&e));
}

fn resolve_config_path(cli: Option<&Path>) -> Option<String> {
    if let Some(p) = cli {
        return Some(p.to_string_lossy().to_string());
    }
    std::env::var("REWARD_NODE_CONFIG").ok()
}

fn init_logging(cfg: Option<&config::RewardNodeConfig>) {
    // Prefer explicit config logging.level unless user set RUST_LOG.
    let default_level = cfg
        .map(|c| c.logging.level.as_str())
        .unwrap_or("info")
        .to_string();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let json = cfg
        .map(|c| c.logging.format.as_str())
        .unwrap_or("json")
        .eq_ignore_ascii_case("json");

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn exit_err(msg: &str) -> ! {
    eprintln!("{msg}");
    std::process::exit(2);
}

struct InstrumentedLedgerClient {
    inner: Arc<dyn LedgerClient>,
}

impl InstrumentedLedgerClient {
    fn new(inner: Arc<dyn LedgerClient>) -> Self {
        // Ensure metrics are registered.
        let _ = &*metrics::LEDGER_REQUESTS_TOTAL;
        let _ = &*metrics::LEDGER_REQUEST_FAILURES_TOTAL;
        let _ = &*metrics::REWARD_SUBMISSIONS_TOTAL;
        let _ = &*metrics::PROCESS_UPTIME_SECONDS;
        Self { inner }
    }

    fn record_ok(&self, method: &'static str) {
        metrics::LEDGER_REQUESTS_TOTAL
            .with_label_values(&[method, "ok"])
            .inc();
    }

    fn record_err(&self, method: &'static str, err: &LedgerError) {
        metrics::LEDGER_REQUESTS_TOTAL
            .with_label_values(&[method, err.reason()])
            .inc();
        metrics::LEDGER_REQUEST_FAILURES_TOTAL
            .with_label_values(&[err.reason()])
            .inc();
        warn!(method, error = %err, "ledger request failed");
    }
}

#[async_trait]
impl LedgerClient for InstrumentedLedgerClient {
    async fn transaction_count(&self, address: Address) -> Result<U256, LedgerError> {
        let r = self.inner.transaction_count(address).await;
        match &r {
            Ok(_) => self.record_ok("transaction_count"),
            Err(e) => self.record_err("transaction_count", e),
        }
        r
    }

    fn build_and_sign(&self, call: &RewardCall, nonce: U256) -> Result<Bytes, LedgerError> {
        let r = self.inner.build_and_sign(call, nonce);
        match &r {
            Ok(_) => self.record_ok("build_and_sign"),
            Err(e) => self.record_err("build_and_sign", e),
        }
        r
    }

    async fn submit(&self, raw: Bytes) -> Result<TxId, LedgerError> {
        let r = self.inner.submit(raw).await;
        match &r {
            Ok(_) => self.record_ok("submit"),
            Err(e) => self.record_err("submit", e),
        }
        r
    }

    fn signer_address(&self) -> Address {
        self.inner.signer_address()
    }
}
