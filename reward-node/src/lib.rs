#![forbid(unsafe_code)]

//! Service layer of the emotion reward node.
//!
//! The HTTP surface, config loading, metrics, and the classifier adapter live
//! here; reward policy, nonce sequencing, and the ledger clients live in
//! `reward-core`.

pub mod config;
pub mod emotion;
pub mod http_server;
pub mod metrics;
