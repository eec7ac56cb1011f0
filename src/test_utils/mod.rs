// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! In-memory collaborators used by the unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use ahash::HashMap;
use async_trait::async_trait;
use cid::Cid;
use fvm_ipld_encoding::RawBytes;
use parking_lot::Mutex;

use crate::blocks::Block;
use crate::chain::ChainReader;
use crate::message::{
    Message, MessageReceipt, SignedMessage,
    proof::{ProofSubmission, SUBMIT_POST_METHOD},
};
use crate::message_pool::{Mempool, NonceOracle};
use crate::paych::BalanceReader;
use crate::shim::{
    address::Address, clock::ChainEpoch, crypto::Signature, econ::TokenAmount, error::ExitCode,
    sector::SectorNumber,
};
use crate::wallet::Signer;

/// Builds a secp signed message whose signature bytes are unique per sender and content.
pub fn signed_message(
    from: Address,
    to: Address,
    sequence: u64,
    method: &str,
    params: RawBytes,
) -> SignedMessage {
    let message = Message {
        to,
        from,
        sequence,
        value: TokenAmount::default(),
        method: method.to_owned(),
        params,
    };
    let signature = test_signature(&message, &from);
    SignedMessage::new_unchecked(message, signature)
}

/// A proof submission from `miner` to its own actor proving `sectors`.
pub fn proof_message(
    miner: Address,
    sequence: u64,
    sector_size: u64,
    sectors: Vec<SectorNumber>,
) -> SignedMessage {
    let params = ProofSubmission {
        sector_size,
        sectors,
    }
    .to_params()
    .unwrap();
    signed_message(miner, miner, sequence, SUBMIT_POST_METHOD, params)
}

pub fn receipt(exit_code: u32, gas_cost: u64) -> MessageReceipt {
    MessageReceipt {
        exit_code: ExitCode::from(exit_code),
        return_data: RawBytes::default(),
        gas_cost: TokenAmount::from_atto(gas_cost),
    }
}

fn test_signature(message: &Message, address: &Address) -> Signature {
    let mut bytes = address.to_bytes();
    bytes.extend(message.cid().to_bytes());
    Signature::new_secp256k1(bytes)
}

#[derive(Default)]
struct TestChainInner {
    blocks: Vec<Block>,
    messages: HashMap<Cid, SignedMessage>,
    receipts: HashMap<(Cid, Cid), MessageReceipt>,
    head_height: Option<ChainEpoch>,
}

/// Append-only chain. Each pushed block sits one height above the previous one.
#[derive(Default)]
pub struct TestChain {
    inner: Mutex<TestChainInner>,
    failing: AtomicBool,
    listings: AtomicUsize,
    withheld_receipts: AtomicUsize,
}

impl TestChain {
    /// Appends a block including `messages`, each applied with its receipt.
    pub fn push_block(&self, messages: Vec<(SignedMessage, MessageReceipt)>) -> Block {
        let mut inner = self.inner.lock();
        let (height, parents) = match inner.blocks.last() {
            Some(parent) => (parent.height + 1, vec![parent.cid()]),
            None => (0, vec![]),
        };
        let block = Block {
            miner: Address::new_id(1000),
            parents,
            height,
            messages: messages.iter().map(|(msg, _)| msg.cid()).collect(),
        };
        let block_cid = block.cid();
        for (msg, receipt) in messages {
            let msg_cid = msg.cid();
            inner.receipts.insert((block_cid, msg_cid), receipt);
            inner.messages.insert(msg_cid, msg);
        }
        inner.blocks.push(block.clone());
        inner.head_height = None;
        block
    }

    pub fn push_empty_blocks(&self, count: usize) {
        for _ in 0..count {
            self.push_block(vec![]);
        }
    }

    /// Reports `height` as the head height until the next block is pushed.
    pub fn set_head_height(&self, height: ChainEpoch) {
        self.inner.lock().head_height = Some(height);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Answers the next `count` receipt reads as if the messages had not been applied yet.
    pub fn withhold_receipts(&self, count: usize) {
        self.withheld_receipts.store(count, Ordering::SeqCst);
    }

    /// Number of block listings served so far.
    pub fn listings(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    fn check(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.failing.load(Ordering::SeqCst), "chain store unavailable");
        Ok(())
    }
}

#[async_trait]
impl ChainReader for TestChain {
    async fn head_height(&self) -> anyhow::Result<ChainEpoch> {
        self.check()?;
        let inner = self.inner.lock();
        Ok(inner
            .head_height
            .or_else(|| inner.blocks.last().map(|b| b.height))
            .unwrap_or_default())
    }

    async fn list_blocks_since(&self, cursor: Option<ChainEpoch>) -> anyhow::Result<Vec<Block>> {
        self.check()?;
        self.listings.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.lock();
        Ok(inner
            .blocks
            .iter()
            .filter(|b| cursor.is_none_or(|c| b.height >= c))
            .cloned()
            .collect())
    }

    async fn block_messages(&self, block: &Block) -> anyhow::Result<Vec<SignedMessage>> {
        self.check()?;
        let inner = self.inner.lock();
        block
            .messages
            .iter()
            .map(|cid| {
                inner
                    .messages
                    .get(cid)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("message {cid} not found"))
            })
            .collect()
    }

    async fn receipt(
        &self,
        block: &Block,
        message: &Cid,
    ) -> anyhow::Result<Option<MessageReceipt>> {
        self.check()?;
        let withheld = self
            .withheld_receipts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if withheld.is_ok() {
            return Ok(None);
        }
        Ok(self
            .inner
            .lock()
            .receipts
            .get(&(block.cid(), *message))
            .cloned())
    }
}

pub struct TestSigner {
    default: Option<Address>,
    failing: AtomicBool,
}

impl TestSigner {
    pub fn new(default: Option<Address>) -> Self {
        Self {
            default,
            failing: AtomicBool::new(false),
        }
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn signed_by(&self, address: &Address, msg: &SignedMessage) -> bool {
        msg.signature() == &test_signature(msg.message(), address)
    }
}

impl Signer for TestSigner {
    fn sign(&self, message: &Message, address: &Address) -> anyhow::Result<Signature> {
        anyhow::ensure!(!self.failing.load(Ordering::SeqCst), "key not found");
        Ok(test_signature(message, address))
    }

    fn default_address(&self) -> anyhow::Result<Option<Address>> {
        Ok(self.default)
    }
}

type IncludeFn = Arc<dyn Fn(&SignedMessage) -> MessageReceipt + Send + Sync>;

/// Records submitted messages. Optionally includes every accepted message into a
/// [`TestChain`] block right away, applying it with the receipt `include` returns.
#[derive(Default)]
pub struct TestMempool {
    messages: Mutex<Vec<SignedMessage>>,
    rejection: Mutex<Option<String>>,
    attempts: AtomicUsize,
    include: Mutex<Option<(Arc<TestChain>, IncludeFn)>>,
}

impl TestMempool {
    pub fn include_into(
        &self,
        chain: Arc<TestChain>,
        include: impl Fn(&SignedMessage) -> MessageReceipt + Send + Sync + 'static,
    ) {
        *self.include.lock() = Some((chain, Arc::new(include)));
    }

    pub fn reject_with(&self, reason: Option<&str>) {
        *self.rejection.lock() = reason.map(str::to_owned);
    }

    pub fn messages(&self) -> Vec<SignedMessage> {
        self.messages.lock().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Mempool for TestMempool {
    async fn submit(&self, message: SignedMessage) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.rejection.lock().clone() {
            anyhow::bail!(reason);
        }
        self.messages.lock().push(message.clone());
        let include = self.include.lock().clone();
        if let Some((chain, include)) = include {
            let receipt = include(&message);
            chain.push_block(vec![(message, receipt)]);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct TestNonceOracle {
    nonces: Mutex<HashMap<Address, u64>>,
    failing: AtomicBool,
}

impl TestNonceOracle {
    pub fn set(&self, address: Address, nonce: u64) {
        self.nonces.lock().insert(address, nonce);
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl NonceOracle for TestNonceOracle {
    async fn last_nonce(&self, address: &Address) -> anyhow::Result<Option<u64>> {
        anyhow::ensure!(!self.failing.load(Ordering::SeqCst), "actor state unavailable");
        // let concurrent callers interleave
        tokio::task::yield_now().await;
        Ok(self.nonces.lock().get(address).copied())
    }
}

#[derive(Default)]
pub struct TestBalances {
    balances: Mutex<HashMap<Address, TokenAmount>>,
}

impl TestBalances {
    pub fn set(&self, address: Address, amount: TokenAmount) {
        self.balances.lock().insert(address, amount);
    }

    /// Adds `delta` (possibly negative) to the balance of `address`.
    pub fn adjust(&self, address: Address, delta: TokenAmount) {
        let mut balances = self.balances.lock();
        let balance = balances.entry(address).or_default();
        *balance = balance.clone() + delta;
    }
}

#[async_trait]
impl BalanceReader for TestBalances {
    async fn balance(&self, address: &Address) -> anyhow::Result<TokenAmount> {
        Ok(self
            .balances
            .lock()
            .get(address)
            .cloned()
            .unwrap_or_default())
    }
}
