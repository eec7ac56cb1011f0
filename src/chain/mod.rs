// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
mod scanner;

use crate::blocks::Block;
use crate::message::{MessageReceipt, SignedMessage};
use crate::shim::clock::ChainEpoch;
use async_trait::async_trait;
use cid::Cid;

pub use self::scanner::*;

/// Read-only view of the chain maintained by the node's consensus layer. The head is re-read
/// on every call.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Height of the current chain head.
    async fn head_height(&self) -> anyhow::Result<ChainEpoch>;

    /// Blocks reachable from the current head at height `>= cursor` (every block when `cursor`
    /// is `None`), oldest first.
    async fn list_blocks_since(&self, cursor: Option<ChainEpoch>) -> anyhow::Result<Vec<Block>>;

    /// Decodes the messages referenced by `block`, in inclusion order.
    async fn block_messages(&self, block: &Block) -> anyhow::Result<Vec<SignedMessage>>;

    /// Receipt of `message` as applied in `block`, if it has been applied.
    async fn receipt(&self, block: &Block, message: &Cid)
    -> anyhow::Result<Option<MessageReceipt>>;
}
