// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The settlement engine: one scanner and one submitter shared by the deal tracker, the
//! voucher ledger and the power accountant.

use std::sync::Arc;

use cid::Cid;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::chain::{ChainReader, ChainScanner, MessageLookup};
use crate::config::Config;
use crate::db::SettingsStore;
use crate::deals::{DealState, DealTracker};
use crate::errors::Result;
use crate::message::abi::AbiValue;
use crate::message_pool::{Mempool, MessageSubmitter, NonceOracle};
use crate::method_registry::MethodRegistry;
use crate::paych::{BalanceReader, Redemption, Voucher, VoucherLedger};
use crate::power::{MinerPower, PowerAccountant};
use crate::shim::{address::Address, econ::TokenAmount};
use crate::wallet::Signer;

/// External services the engine is built over.
#[derive(Clone)]
pub struct Collaborators {
    pub chain: Arc<dyn ChainReader>,
    pub signer: Arc<dyn Signer>,
    pub mempool: Arc<dyn Mempool>,
    pub nonces: Arc<dyn NonceOracle>,
    pub registry: Arc<dyn MethodRegistry>,
    pub balances: Arc<dyn BalanceReader>,
}

pub struct SettlementEngine<DB> {
    scanner: Arc<ChainScanner>,
    submitter: Arc<MessageSubmitter>,
    deals: DealTracker<DB>,
    vouchers: VoucherLedger<DB>,
    power: PowerAccountant,
}

impl<DB: SettingsStore + Clone> SettlementEngine<DB> {
    /// Builds the engine and loads the deal and voucher records persisted in `store`.
    pub fn new(config: &Config, store: DB, collaborators: Collaborators) -> Result<Self> {
        let Collaborators {
            chain,
            signer,
            mempool,
            nonces,
            registry,
            balances,
        } = collaborators;
        let scanner = Arc::new(ChainScanner::new(
            chain,
            registry.clone(),
            config.scanner_config(),
        ));
        let submitter = Arc::new(MessageSubmitter::new(
            config.submitter_config(),
            signer,
            mempool,
            nonces,
            registry,
        )?);
        let deals = DealTracker::load(store.clone(), scanner.clone())?;
        let vouchers = VoucherLedger::load(store, submitter.clone(), scanner.clone(), balances)?;
        info!(
            default_from = ?submitter.default_from(),
            deals = deals.deals().len(),
            "settlement engine ready"
        );
        Ok(Self {
            power: PowerAccountant::new(scanner.clone()),
            scanner,
            submitter,
            deals,
            vouchers,
        })
    }

    pub async fn send_message(
        &self,
        from: Option<Address>,
        to: Address,
        value: TokenAmount,
        method: &str,
        params: &[AbiValue],
    ) -> Result<Cid> {
        self.submitter.send(from, to, value, method, params).await
    }

    pub async fn wait_for_message(
        &self,
        msg_cid: Cid,
        token: &CancellationToken,
    ) -> Result<MessageLookup> {
        self.scanner.wait_for_message(msg_cid, token).await
    }

    pub fn deal_state(&self, proposal: &Cid) -> Result<DealState> {
        self.deals.deal_state(proposal)
    }

    pub async fn redeem_voucher(
        &self,
        voucher: Voucher,
        token: &CancellationToken,
    ) -> Result<Redemption> {
        self.vouchers.redeem(voucher, token).await
    }

    pub fn query_power(&self, miner: &Address) -> MinerPower {
        self.power.power(miner)
    }

    pub async fn observe_power(
        &self,
        miner: &Address,
        token: &CancellationToken,
    ) -> Result<MinerPower> {
        self.power.observe_power(miner, token).await
    }

    pub fn scanner(&self) -> &ChainScanner {
        &self.scanner
    }

    pub fn submitter(&self) -> &MessageSubmitter {
        &self.submitter
    }

    pub fn deals(&self) -> &DealTracker<DB> {
        &self.deals
    }

    pub fn vouchers(&self) -> &VoucherLedger<DB> {
        &self.vouchers
    }
}
