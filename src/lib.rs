// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Chain-synchronized settlement for a Filecoin node: message submission with dense per-identity
//! nonces, polling waits on the chain, storage deal tracking, payment channel voucher redemption
//! and miner power accounting.

pub mod blocks;
pub mod chain;
pub mod config;
pub mod db;
pub mod deals;
pub mod engine;
pub mod errors;
pub mod logger;
pub mod message;
pub mod message_pool;
pub mod method_registry;
pub mod metrics;
pub mod paych;
pub mod power;
pub mod shim;
#[cfg(test)]
mod test_utils;
pub mod utils;
pub mod wallet;

pub use config::Config;
pub use engine::{Collaborators, SettlementEngine};
pub use errors::{Error, Result};
