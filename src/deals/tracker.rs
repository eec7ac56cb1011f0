// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use ahash::{HashMap, HashMapExt as _};
use cid::Cid;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{DealEvent, DealProposal, DealState, StorageDeal};
use crate::chain::{ChainMatch, ChainScanner};
use crate::db::{SettingsStore, SettingsStoreExt as _, setting_keys::DEALS_PREFIX};
use crate::errors::{Error, Result};
use crate::message::proof::{ProofSubmission, is_proof_submission_to};
use crate::metrics::{self, DealStateLabel};
use crate::shim::sector::SectorNumber;

/// Owns the storage deal records. Every mutation goes through the transition table and is
/// persisted before it becomes visible.
pub struct DealTracker<DB> {
    store: DB,
    scanner: Arc<ChainScanner>,
    deals: RwLock<HashMap<Cid, StorageDeal>>,
}

fn deal_key(proposal: &Cid) -> String {
    format!("{DEALS_PREFIX}{proposal}")
}

impl<DB: SettingsStore> DealTracker<DB> {
    /// Loads the deals persisted in `store`.
    pub fn load(store: DB, scanner: Arc<ChainScanner>) -> Result<Self> {
        let records: Vec<StorageDeal> = store
            .read_prefixed(DEALS_PREFIX)
            .map_err(|e| Error::Store(format!("{e:#}")))?;
        let mut deals = HashMap::with_capacity(records.len());
        for deal in records {
            deals.insert(deal.proposal_cid, deal);
        }
        Ok(Self {
            store,
            scanner,
            deals: RwLock::new(deals),
        })
    }

    /// Starts tracking a deal in the `Proposed` state. Proposing a tracked deal again returns
    /// the existing record unchanged.
    pub fn propose(&self, proposal: DealProposal) -> Result<StorageDeal> {
        let mut deals = self.deals.write();
        if let Some(deal) = deals.get(&proposal.proposal_cid) {
            return Ok(deal.clone());
        }
        let deal = StorageDeal::new(proposal);
        self.persist(&deal)?;
        info!(proposal = %deal.proposal_cid, miner = %deal.miner, "tracking new deal");
        metrics::DEAL_TRANSITIONS
            .get_or_create(&DealStateLabel::new(deal.state))
            .inc();
        deals.insert(deal.proposal_cid, deal.clone());
        Ok(deal)
    }

    pub fn accept(&self, proposal: &Cid) -> Result<DealState> {
        self.handle_event(proposal, DealEvent::Accept)
    }

    /// Stages the deal at the current chain head. Proofs included at or below that height do
    /// not settle it.
    pub async fn transfer_complete(
        &self,
        proposal: &Cid,
        sector: Option<SectorNumber>,
        token: &CancellationToken,
    ) -> Result<DealState> {
        let height = self.scanner.head_height(token).await?;
        self.handle_event(proposal, DealEvent::TransferComplete { sector, height })
    }

    pub fn fail(&self, proposal: &Cid, reason: impl Into<String>) -> Result<DealState> {
        self.handle_event(
            proposal,
            DealEvent::Fail {
                reason: reason.into(),
            },
        )
    }

    /// Applies `event` and returns the resulting state. Events on terminal deals are ignored.
    pub fn handle_event(&self, proposal: &Cid, event: DealEvent) -> Result<DealState> {
        let mut deals = self.deals.write();
        let deal = deals.get(proposal).ok_or(Error::UnknownDeal(*proposal))?;
        let next = match deal.apply(&event) {
            Ok(Some(next)) => next,
            Ok(None) => {
                warn!(%proposal, state = %deal.state, %event, "ignoring event on terminal deal");
                return Ok(deal.state);
            }
            Err(from) => {
                return Err(Error::IllegalTransition {
                    deal: *proposal,
                    from,
                    event,
                });
            }
        };
        self.persist(&next)?;
        info!(%proposal, from = %deal.state, to = %next.state, "deal transitioned");
        metrics::DEAL_TRANSITIONS
            .get_or_create(&DealStateLabel::new(next.state))
            .inc();
        let state = next.state;
        deals.insert(*proposal, next);
        Ok(state)
    }

    pub fn deal(&self, proposal: &Cid) -> Result<StorageDeal> {
        self.deals
            .read()
            .get(proposal)
            .cloned()
            .ok_or(Error::UnknownDeal(*proposal))
    }

    pub fn deal_state(&self, proposal: &Cid) -> Result<DealState> {
        Ok(self.deal(proposal)?.state)
    }

    /// Every tracked deal, in no particular order.
    pub fn deals(&self) -> Vec<StorageDeal> {
        self.deals.read().values().cloned().collect()
    }

    /// Waits for a proof submission to the deal's miner that covers the deal's sector and
    /// settles the deal on its exit code. The deal must be `Staged`; a terminal deal is
    /// returned as is. When the sector is unknown any proof to the miner matches. Only blocks
    /// above the staging height are considered.
    #[tracing::instrument(skip(self, token))]
    pub async fn await_proof(&self, proposal: &Cid, token: &CancellationToken) -> Result<DealState> {
        let deal = self.deal(proposal)?;
        match deal.state {
            DealState::Staged => {}
            state if state.is_terminal() => return Ok(state),
            from => {
                return Err(Error::IllegalTransition {
                    deal: *proposal,
                    from,
                    event: DealEvent::ProofConfirmed,
                });
            }
        }

        let since = deal.staged_at.map(|height| height + 1);
        let ChainMatch { block, message } = self
            .scanner
            .wait_for_since(since, token, |_, msg| {
                if !is_proof_submission_to(msg, &deal.miner) {
                    return Ok(false);
                }
                Ok(match deal.sector {
                    // proofs with unreadable params cannot cover the sector
                    Some(sector) => ProofSubmission::from_params(msg.message().params())
                        .is_ok_and(|proof| proof.covers(sector)),
                    None => true,
                })
            })
            .await?;
        let msg_cid = message.cid();
        let receipt = self.scanner.receipt(&block, &msg_cid, token).await?;

        if receipt.is_success() {
            self.handle_event(proposal, DealEvent::ProofConfirmed)
        } else {
            warn!(%proposal, %msg_cid, exit_code = %receipt.exit_code, "proof submission failed");
            self.fail(
                proposal,
                format!(
                    "proof submission {msg_cid} exited with {}",
                    receipt.exit_code
                ),
            )
        }
    }

    fn persist(&self, deal: &StorageDeal) -> Result<()> {
        self.store
            .write_obj(&deal_key(&deal.proposal_cid), deal)
            .map_err(|e| Error::Store(format!("{e:#}")))
    }
}
