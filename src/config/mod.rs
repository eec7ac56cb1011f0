// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, DurationSeconds, serde_as};

use crate::chain::ScannerConfig;
use crate::message_pool::SubmitterConfig;
use crate::shim::address::Address;
use crate::utils::io::{read_toml, read_toml_file};

#[serde_as]
#[derive(Deserialize, Serialize, PartialEq, Eq, Default, Debug, Clone)]
#[serde(default)]
pub struct WalletConfig {
    /// Identity messages are sent from when the caller names none.
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub default_address: Option<Address>,
}

#[serde_as]
#[derive(Deserialize, Serialize, PartialEq, Eq, Debug, Clone, smart_default::SmartDefault)]
#[serde(default)]
pub struct ChainConfig {
    /// Delay between two polls of the chain by a waiting operation.
    #[default(Duration::from_secs(5))]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub poll_interval: Duration,
}

#[derive(Deserialize, Serialize, PartialEq, Eq, Debug, Clone, smart_default::SmartDefault)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing` filter directives, used when `RUST_LOG` is not set.
    #[default(vec!["info".to_owned()])]
    pub filters: Vec<String>,
    /// Emit JSON lines instead of human readable text.
    pub json: bool,
}

impl LogConfig {
    pub fn to_filter_string(&self) -> String {
        self.filters.join(",")
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Default, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub wallet: WalletConfig,
    pub chain: ChainConfig,
    pub log: LogConfig,
}

impl Config {
    pub fn from_toml_str(toml: &str) -> anyhow::Result<Self> {
        read_toml(toml)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        read_toml_file(path)
    }

    pub fn submitter_config(&self) -> SubmitterConfig {
        SubmitterConfig {
            default_from: self.wallet.default_address,
        }
    }

    pub fn scanner_config(&self) -> ScannerConfig {
        ScannerConfig {
            poll_interval: self.chain.poll_interval,
        }
    }
}
