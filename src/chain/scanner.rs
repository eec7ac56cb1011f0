// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ahash::HashMap;
use cid::Cid;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::ChainReader;
use crate::blocks::Block;
use crate::errors::{Error, Result};
use crate::message::{MessageReceipt, SignedMessage, abi};
use crate::method_registry::{FunctionSignature, MethodRegistry};
use crate::metrics;
use crate::shim::clock::ChainEpoch;

/// Polling settings of the [`ChainScanner`].
#[derive(Debug, Clone, Copy, smart_default::SmartDefault)]
pub struct ScannerConfig {
    #[default(Duration::from_secs(5))]
    pub poll_interval: Duration,
}

/// Content identifiers of a matched message and the block including it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageInfo {
    pub block_cid: Cid,
    pub msg_cid: Cid,
}

/// A message found on chain together with the block that includes it.
#[derive(Debug, Clone)]
pub struct ChainMatch {
    pub block: Block,
    pub message: SignedMessage,
}

impl ChainMatch {
    pub fn info(&self) -> MessageInfo {
        MessageInfo {
            block_cid: self.block.cid(),
            msg_cid: self.message.cid(),
        }
    }
}

/// A confirmed message with its receipt and, when the recipient's method is known, the
/// signature needed to decode its return value.
#[derive(Debug, Clone)]
pub struct MessageLookup {
    pub block: Block,
    pub message: SignedMessage,
    pub receipt: MessageReceipt,
    pub signature: Option<FunctionSignature>,
}

impl MessageLookup {
    /// Decodes the receipt's return value. Returns `None` when the method signature is unknown.
    pub fn decoded_return(&self) -> Option<anyhow::Result<Vec<abi::AbiValue>>> {
        self.signature
            .as_ref()
            .map(|sig| abi::decode_values(&self.receipt.return_data, &sig.returns))
    }
}

/// Watches the chain by polling it. Every wait is independent, holds no lock while it
/// suspends and observes its cancellation token at each poll boundary and before each
/// predicate evaluation.
pub struct ChainScanner {
    chain: Arc<dyn ChainReader>,
    registry: Arc<dyn MethodRegistry>,
    poll_interval: Duration,
}

impl ChainScanner {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        registry: Arc<dyn MethodRegistry>,
        config: ScannerConfig,
    ) -> Self {
        Self {
            chain,
            registry,
            poll_interval: config.poll_interval,
        }
    }

    pub fn chain(&self) -> &Arc<dyn ChainReader> {
        &self.chain
    }

    /// Waits until `predicate` matches a message on chain and returns the first match in
    /// listing order. A predicate error aborts the wait.
    pub async fn wait_for<P>(&self, token: &CancellationToken, predicate: P) -> Result<ChainMatch>
    where
        P: FnMut(&Block, &SignedMessage) -> anyhow::Result<bool>,
    {
        self.wait_for_since(None, token, predicate).await
    }

    /// Like [`ChainScanner::wait_for`], but only blocks at height `>= since` are examined.
    pub async fn wait_for_since<P>(
        &self,
        since: Option<ChainEpoch>,
        token: &CancellationToken,
        mut predicate: P,
    ) -> Result<ChainMatch>
    where
        P: FnMut(&Block, &SignedMessage) -> anyhow::Result<bool>,
    {
        let mut cursor = since;
        let mut examined = Examined::default();
        loop {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }
            metrics::CHAIN_POLLS.inc();
            let blocks = read_chain(token, self.chain.list_blocks_since(cursor)).await?;
            trace!(?cursor, blocks = blocks.len(), "polled chain");

            for block in blocks {
                if since.is_some_and(|since| block.height < since) || !examined.insert(&block) {
                    continue;
                }
                let messages = read_chain(token, self.chain.block_messages(&block)).await?;
                for message in messages {
                    if token.is_cancelled() {
                        return Err(Error::Cancelled);
                    }
                    if predicate(&block, &message).map_err(Error::PredicateError)? {
                        debug!(block_cid = %block.cid(), msg_cid = %message.cid(), height = block.height, "predicate matched");
                        return Ok(ChainMatch { block, message });
                    }
                }
                cursor = Some(cursor.map_or(block.height, |c| c.max(block.height)));
            }
            if let Some(cursor) = cursor {
                examined.prune_below(cursor);
            }

            self.sleep(token).await?;
        }
    }

    /// Height of the current chain head.
    pub async fn head_height(&self, token: &CancellationToken) -> Result<ChainEpoch> {
        read_chain(token, self.chain.head_height()).await
    }

    /// Waits until the chain head is at least `height` and returns the observed head height.
    /// The head is compared afresh on every poll, it is not assumed to be monotone.
    #[tracing::instrument(skip(self, token))]
    pub async fn wait_for_height(
        &self,
        height: ChainEpoch,
        token: &CancellationToken,
    ) -> Result<ChainEpoch> {
        loop {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }
            metrics::CHAIN_POLLS.inc();
            let head = self.head_height(token).await?;
            if head >= height {
                debug!(head, "reached height");
                return Ok(head);
            }
            trace!(head, "waiting for height");
            self.sleep(token).await?;
        }
    }

    /// Waits for the message `msg_cid` to be included and returns it with its receipt.
    #[tracing::instrument(skip(self, token))]
    pub async fn wait_for_message(
        &self,
        msg_cid: Cid,
        token: &CancellationToken,
    ) -> Result<MessageLookup> {
        let ChainMatch { block, message } = self
            .wait_for(token, |_, msg| Ok(msg.cid() == msg_cid))
            .await?;
        let receipt = self.receipt(&block, &msg_cid, token).await?;
        let signature = self
            .registry
            .signature_for(&message.to(), message.method())
            .map_err(|e| Error::LookupFailed(format!("signature of {}: {e}", message.method())))?;
        info!(block_cid = %block.cid(), exit_code = %receipt.exit_code, "message confirmed");
        Ok(MessageLookup {
            block,
            message,
            receipt,
            signature,
        })
    }

    /// Receipt of a message known to be included in `block`. A message may be included before
    /// it is applied, so the chain is polled until the receipt shows up.
    pub async fn receipt(
        &self,
        block: &Block,
        msg_cid: &Cid,
        token: &CancellationToken,
    ) -> Result<MessageReceipt> {
        loop {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }
            metrics::CHAIN_POLLS.inc();
            if let Some(receipt) = read_chain(token, self.chain.receipt(block, msg_cid)).await? {
                return Ok(receipt);
            }
            trace!(%msg_cid, block_cid = %block.cid(), "waiting for receipt");
            self.sleep(token).await?;
        }
    }

    async fn sleep(&self, token: &CancellationToken) -> Result<()> {
        tokio::select! {
            _ = token.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(self.poll_interval) => Ok(()),
        }
    }
}

/// Blocks already examined during one wait. Blocks below the cursor are never listed again,
/// so they are forgotten once the cursor passes them.
#[derive(Default)]
struct Examined {
    blocks: HashMap<Cid, ChainEpoch>,
}

impl Examined {
    /// Returns `false` when `block` was examined before.
    fn insert(&mut self, block: &Block) -> bool {
        self.blocks.insert(block.cid(), block.height).is_none()
    }

    fn prune_below(&mut self, cursor: ChainEpoch) {
        self.blocks.retain(|_, height| *height >= cursor);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.blocks.len()
    }
}

/// Awaits a chain read, giving up as soon as `token` is cancelled.
async fn read_chain<T>(
    token: &CancellationToken,
    read: impl Future<Output = anyhow::Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::Cancelled),
        res = read => res.map_err(|e| Error::ChainReadFailed(format!("{e:#}"))),
    }
}
