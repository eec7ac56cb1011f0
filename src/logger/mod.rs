// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use tracing_subscriber::{EnvFilter, Registry, prelude::*};

use crate::config::LogConfig;

/// Installs the global `tracing` subscriber. Fails if one is already installed.
pub fn setup_logger(config: &LogConfig) -> anyhow::Result<()> {
    let filter = get_env_filter(default_env_filter(config)?);
    let layer: Box<dyn tracing_subscriber::layer::Layer<Registry> + Send + Sync> = if config.json
    {
        Box::new(
            tracing_subscriber::fmt::Layer::new()
                .json()
                .with_filter(filter),
        )
    } else {
        Box::new(tracing_subscriber::fmt::Layer::new().with_filter(filter))
    };
    tracing_subscriber::registry().with(layer).try_init()?;
    Ok(())
}

/// Returns an [`EnvFilter`] according to the `RUST_LOG` environment variable, or `def`.
fn get_env_filter(def: EnvFilter) -> EnvFilter {
    use std::env::{
        self,
        VarError::{NotPresent, NotUnicode},
    };
    match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(s) => EnvFilter::new(s),
        Err(NotPresent) => def,
        Err(NotUnicode(_)) => EnvFilter::default(),
    }
}

fn default_env_filter(config: &LogConfig) -> anyhow::Result<EnvFilter> {
    Ok(EnvFilter::try_new(config.to_filter_string())?)
}
