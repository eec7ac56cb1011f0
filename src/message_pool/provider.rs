// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::message::SignedMessage;
use crate::shim::address::Address;
use async_trait::async_trait;

/// Reads the sequence of an actor from the latest applied chain state.
#[async_trait]
pub trait NonceOracle: Send + Sync {
    /// Nonce of the last message from `address` that applied on chain, or `None` if the
    /// address has never sent one.
    async fn last_nonce(&self, address: &Address) -> anyhow::Result<Option<u64>>;
}

/// Hands signed messages to the message pool for broadcast.
#[async_trait]
pub trait Mempool: Send + Sync {
    /// Adds the message to the pool. An error carries the reason the pool rejected it,
    /// e.g. insufficient balance.
    async fn submit(&self, message: SignedMessage) -> anyhow::Result<()>;
}
