// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use ahash::{HashMap, HashMapExt as _, HashSet, HashSetExt as _};
use num_traits::Zero as _;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{Mutex as TokioMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{BalanceReader, REDEEM_METHOD, Redemption, Voucher, VoucherRecord};
use crate::chain::ChainScanner;
use crate::db::{SettingsStore, SettingsStoreExt as _, setting_keys::PAYCH_PREFIX};
use crate::errors::{Error, Result};
use crate::message::abi::AbiValue;
use crate::message_pool::MessageSubmitter;
use crate::metrics::{self, HistogramTimerExt as _};
use crate::shim::{address::Address, clock::ChainEpoch, econ::TokenAmount};

fn channel_key(channel: &Address) -> String {
    format!("{PAYCH_PREFIX}{channel}")
}

fn store_error(e: anyhow::Error) -> Error {
    Error::Store(format!("{e:#}"))
}

/// Thread safe voucher bookkeeping. Vouchers are redeemed by the submitter's default identity,
/// whose balance is used to check what each redemption actually paid out.
pub struct VoucherLedger<DB> {
    store: DB,
    submitter: Arc<MessageSubmitter>,
    scanner: Arc<ChainScanner>,
    balances: Arc<dyn BalanceReader>,
    channels: RwLock<HashMap<Address, Vec<VoucherRecord>>>,
    /// Vouchers being redeemed, keyed by channel and validity height.
    in_flight: Mutex<HashSet<(Address, ChainEpoch)>>,
    /// Per-identity locks held while a redemption's balance change is measured.
    settling: Mutex<HashMap<Address, Arc<TokioMutex<()>>>>,
}

/// Releases the in-flight claim on a voucher when the redemption ends, however it ends.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<(Address, ChainEpoch)>>,
    key: (Address, ChainEpoch),
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.key);
    }
}

impl<DB: SettingsStore> VoucherLedger<DB> {
    /// Loads the vouchers persisted in `store`.
    pub fn load(
        store: DB,
        submitter: Arc<MessageSubmitter>,
        scanner: Arc<ChainScanner>,
        balances: Arc<dyn BalanceReader>,
    ) -> Result<Self> {
        let stored: Vec<Vec<VoucherRecord>> =
            store.read_prefixed(PAYCH_PREFIX).map_err(store_error)?;
        let channels = stored
            .into_iter()
            .filter_map(|records| Some((records.first()?.voucher.channel, records)))
            .collect();
        Ok(Self {
            store,
            submitter,
            scanner,
            balances,
            channels: RwLock::new(channels),
            in_flight: Mutex::new(HashSet::new()),
            settling: Mutex::new(HashMap::new()),
        })
    }

    /// Adds a voucher to its channel. A voucher must exceed the channel's latest voucher in
    /// both validity height and amount; adding a held voucher again is a no-op.
    pub fn add_voucher(&self, voucher: Voucher) -> Result<()> {
        let mut channels = self.channels.write();
        let records = channels.entry(voucher.channel).or_default();

        if records.iter().any(|r| r.voucher == voucher) {
            warn!(channel = %voucher.channel, valid_at = voucher.valid_at, "voucher re-added");
            return Ok(());
        }
        if let Some(last) = records.last()
            && (voucher.valid_at <= last.voucher.valid_at || voucher.amount <= last.voucher.amount)
        {
            return Err(Error::VoucherOutOfOrder);
        }

        let mut updated = records.clone();
        updated.push(VoucherRecord {
            voucher,
            redeemed_by: None,
        });
        self.store
            .write_obj(&channel_key(&updated[0].voucher.channel), &updated)
            .map_err(store_error)?;
        *records = updated;
        Ok(())
    }

    /// Vouchers held for `channel`, oldest first.
    pub fn vouchers(&self, channel: &Address) -> Vec<VoucherRecord> {
        self.channels
            .read()
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }

    /// Redeems the latest voucher held for `channel`.
    pub async fn redeem_latest(
        &self,
        channel: &Address,
        token: &CancellationToken,
    ) -> Result<Redemption> {
        let latest = self
            .channels
            .read()
            .get(channel)
            .and_then(|records| records.last())
            .map(|record| record.voucher.clone())
            .ok_or(Error::UnknownChannel(*channel))?;
        self.redeem(latest, token).await
    }

    /// Waits for the voucher to become valid, then submits a single redemption message and
    /// waits for it to be applied.
    ///
    /// A failed redemption leaves the voucher redeemable. A successful one consumes it, even
    /// when the balance moved by a different amount than the voucher promised, in which case
    /// [`Error::LedgerInconsistency`] is returned. Redemptions by the same identity settle one
    /// at a time so that each sees only its own balance change.
    #[tracing::instrument(skip_all, fields(channel = %voucher.channel, valid_at = voucher.valid_at))]
    pub async fn redeem(&self, voucher: Voucher, token: &CancellationToken) -> Result<Redemption> {
        self.add_voucher(voucher.clone())?;
        let _in_flight = self.claim(&voucher)?;

        let head = self.scanner.wait_for_height(voucher.valid_at, token).await?;

        let identity = self
            .submitter
            .default_from()
            .ok_or(Error::NoDefaultIdentity)?;
        let _settling = self.settle_lock(&identity, token).await?;
        let balance_before = self.balance(&identity).await?;

        let params = [AbiValue::Bytes(fvm_ipld_encoding::to_vec(&voucher)?)];
        let msg_cid = self
            .submitter
            .send(
                Some(identity),
                voucher.channel,
                TokenAmount::zero(),
                REDEEM_METHOD,
                &params,
            )
            .await?;
        info!(%msg_cid, head, amount = %voucher.amount, "submitted voucher redemption");

        let lookup = {
            let _timer = metrics::REDEMPTION_TIME.start_timer();
            self.scanner.wait_for_message(msg_cid, token).await?
        };
        let receipt = lookup.receipt;
        if !receipt.is_success() {
            warn!(%msg_cid, exit_code = %receipt.exit_code, "voucher redemption failed");
            return Err(Error::RedemptionRejected(format!(
                "{msg_cid} exited with {}",
                receipt.exit_code
            )));
        }

        let balance_after = self.balance(&identity).await?;
        let net_settlement = balance_after + receipt.gas_cost.clone() - balance_before;
        self.mark_redeemed(&voucher, msg_cid)?;
        metrics::VOUCHERS_REDEEMED.inc();

        if net_settlement != voucher.amount {
            error!(
                %msg_cid,
                expected = %voucher.amount,
                actual = %net_settlement,
                "voucher settled a different amount than promised"
            );
            return Err(Error::LedgerInconsistency {
                expected: voucher.amount,
                actual: net_settlement,
            });
        }
        info!(%msg_cid, amount = %net_settlement, "voucher redeemed");
        Ok(Redemption {
            message: msg_cid,
            receipt,
            net_settlement,
        })
    }

    fn claim(&self, voucher: &Voucher) -> Result<InFlight<'_>> {
        let key = (voucher.channel, voucher.valid_at);
        let mut in_flight = self.in_flight.lock();
        let consumed = self
            .channels
            .read()
            .get(&voucher.channel)
            .and_then(|records| records.iter().find(|r| r.voucher == *voucher))
            .is_some_and(VoucherRecord::is_consumed);
        if consumed {
            return Err(Error::VoucherConsumed);
        }
        if !in_flight.insert(key) {
            return Err(Error::RedemptionInProgress);
        }
        Ok(InFlight {
            set: &self.in_flight,
            key,
        })
    }

    async fn settle_lock(
        &self,
        identity: &Address,
        token: &CancellationToken,
    ) -> Result<OwnedMutexGuard<()>> {
        let lock = self
            .settling
            .lock()
            .entry(*identity)
            .or_insert_with(|| Arc::new(TokioMutex::new(())))
            .clone();
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(Error::Cancelled),
            guard = lock.lock_owned() => Ok(guard),
        }
    }

    fn mark_redeemed(&self, voucher: &Voucher, msg_cid: cid::Cid) -> Result<()> {
        let mut channels = self.channels.write();
        let records = channels.entry(voucher.channel).or_default();
        let mut updated = records.clone();
        if let Some(record) = updated.iter_mut().find(|r| r.voucher == *voucher) {
            record.redeemed_by = Some(msg_cid);
        }
        self.store
            .write_obj(&channel_key(&voucher.channel), &updated)
            .map_err(store_error)?;
        *records = updated;
        Ok(())
    }

    async fn balance(&self, address: &Address) -> Result<TokenAmount> {
        self.balances
            .balance(address)
            .await
            .map_err(|e| Error::LookupFailed(format!("balance of {address}: {e}")))
    }
}
