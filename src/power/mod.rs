// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Storage power derived from confirmed proof submissions.

use std::sync::Arc;

use ahash::{HashMap, HashSet};
use cid::Cid;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chain::{ChainMatch, ChainScanner};
use crate::errors::Result;
use crate::message::proof::{ProofSubmission, is_proof_submission_to};
use crate::shim::address::Address;

/// Power accumulated by a miner, in bytes of proven sectors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MinerPower {
    pub miner: Address,
    pub power: u64,
}

#[derive(Default)]
struct PowerTable {
    power: HashMap<Address, u64>,
    /// Proof messages already accounted, whatever their exit code.
    accounted: HashSet<Cid>,
}

/// Accumulates miner power from the proof submissions it observes. Power only ever grows and
/// every proof message is accounted at most once.
pub struct PowerAccountant {
    scanner: Arc<ChainScanner>,
    table: Mutex<PowerTable>,
}

impl PowerAccountant {
    pub fn new(scanner: Arc<ChainScanner>) -> Self {
        Self {
            scanner,
            table: Mutex::default(),
        }
    }

    /// Power accounted to `miner` so far.
    pub fn power(&self, miner: &Address) -> MinerPower {
        MinerPower {
            miner: *miner,
            power: self
                .table
                .lock()
                .power
                .get(miner)
                .copied()
                .unwrap_or_default(),
        }
    }

    /// Waits for the next proof submission to `miner` that has not been accounted yet, adds its
    /// sector size when it applied successfully and returns the miner's resulting power.
    #[tracing::instrument(skip(self, token))]
    pub async fn observe_power(
        &self,
        miner: &Address,
        token: &CancellationToken,
    ) -> Result<MinerPower> {
        let mut proof = None;
        let ChainMatch { block, message } = self
            .scanner
            .wait_for(token, |_, msg| {
                if !is_proof_submission_to(msg, miner)
                    || self.table.lock().accounted.contains(&msg.cid())
                {
                    return Ok(false);
                }
                match ProofSubmission::from_params(msg.message().params()) {
                    Ok(decoded) => {
                        proof = Some(decoded);
                        Ok(true)
                    }
                    Err(e) => {
                        debug!(msg_cid = %msg.cid(), "skipping unreadable proof submission: {e}");
                        Ok(false)
                    }
                }
            })
            .await?;
        let msg_cid = message.cid();
        let receipt = self.scanner.receipt(&block, &msg_cid, token).await?;

        let mut table = self.table.lock();
        if table.accounted.insert(msg_cid) {
            if receipt.is_success() {
                let gained = proof.as_ref().map_or(0, ProofSubmission::power);
                let power = table.power.entry(*miner).or_default();
                *power = power.saturating_add(gained);
                info!(%msg_cid, gained, power = *power, "accounted proof submission");
            } else {
                warn!(%msg_cid, exit_code = %receipt.exit_code, "proof submission failed, no power gained");
            }
        }
        Ok(MinerPower {
            miner: *miner,
            power: table.power.get(miner).copied().unwrap_or_default(),
        })
    }
}
