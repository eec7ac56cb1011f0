// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use ahash::{HashMap, HashMapExt as _};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{Mutex as TokioMutex, OwnedMutexGuard};
use tracing::debug;

use crate::errors::{Error, Result};
use crate::message_pool::NonceOracle;
use crate::metrics;
use crate::shim::address::Address;

/// Assigns dense, strictly increasing nonces per sending address.
///
/// Assignment for one address is serialized through a per-address lock that is held from the
/// nonce oracle lookup until the caller either commits or drops the [`NonceReservation`].
/// Addresses do not contend with each other.
pub struct NonceTracker {
    oracle: Arc<dyn NonceOracle>,
    locks: SyncMutex<HashMap<Address, Arc<TokioMutex<()>>>>,
    /// Highest nonce handed out per address that the oracle has not reported yet.
    pending: SyncMutex<HashMap<Address, u64>>,
}

impl NonceTracker {
    pub fn new(oracle: Arc<dyn NonceOracle>) -> Self {
        Self {
            oracle,
            locks: SyncMutex::new(HashMap::new()),
            pending: SyncMutex::new(HashMap::new()),
        }
    }

    fn address_lock(&self, address: &Address) -> Arc<TokioMutex<()>> {
        self.locks
            .lock()
            .entry(*address)
            .or_insert_with(|| Arc::new(TokioMutex::new(())))
            .clone()
    }

    /// Reserves the next nonce of `address`. Other reservations for the same address wait until
    /// this one is committed or dropped. Dropping it without committing hands the same nonce to
    /// the next caller.
    pub async fn reserve(&self, address: &Address) -> Result<NonceReservation<'_>> {
        let guard = self.address_lock(address).lock_owned().await;

        let last_applied = self
            .oracle
            .last_nonce(address)
            .await
            .map_err(|e| Error::LookupFailed(format!("nonce of {address}: {e}")))?;

        let mut pending = self.pending.lock();
        let last_assigned = pending.get(address).copied();
        // `None` orders below any `Some`.
        let highest = last_applied.max(last_assigned);
        if last_assigned.is_some() && last_applied >= last_assigned {
            // everything handed out has landed on chain
            pending.remove(address);
        }
        let nonce = highest.map_or(0, |n| n + 1);
        debug!(%address, nonce, ?last_applied, ?last_assigned, "reserved nonce");

        Ok(NonceReservation {
            tracker: self,
            address: *address,
            nonce,
            _guard: guard,
        })
    }

    /// Assigns the next nonce of `address` immediately.
    pub async fn next_nonce(&self, address: &Address) -> Result<u64> {
        Ok(self.reserve(address).await?.commit())
    }

    fn record_assigned(&self, address: Address, nonce: u64) {
        let mut pending = self.pending.lock();
        let entry = pending.entry(address).or_insert(nonce);
        *entry = (*entry).max(nonce);
        metrics::NONCES_ASSIGNED.inc();
    }
}

/// A nonce held for exclusive use by one submission.
#[must_use = "a reservation that is not committed releases its nonce"]
pub struct NonceReservation<'a> {
    tracker: &'a NonceTracker,
    address: Address,
    nonce: u64,
    _guard: OwnedMutexGuard<()>,
}

impl NonceReservation<'_> {
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Marks the nonce as used and releases the address to the next caller.
    pub fn commit(self) -> u64 {
        self.tracker.record_assigned(self.address, self.nonce);
        self.nonce
    }
}
