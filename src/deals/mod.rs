// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Storage deal records and the transitions between their states.

mod tracker;

pub use tracker::DealTracker;

use crate::shim::{address::Address, clock::ChainEpoch, sector::SectorNumber};
use cid::Cid;
use fvm_ipld_encoding::tuple::*;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`StorageDeal`]. `Complete` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum DealState {
    Proposed,
    Accepted,
    Staged,
    Complete,
    Failed,
}

impl DealState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DealState::Complete | DealState::Failed)
    }
}

/// Something that happened to a deal.
#[derive(Clone, Debug, PartialEq, Eq, strum::Display)]
pub enum DealEvent {
    /// The miner accepted the proposal.
    Accept,
    /// The piece was transferred to the miner and staged, in `sector` when known, while the
    /// chain head was at `height`.
    TransferComplete {
        sector: Option<SectorNumber>,
        height: ChainEpoch,
    },
    /// A proof covering the deal applied successfully on chain.
    ProofConfirmed,
    /// External failure signal: a timeout, a rejected proposal or a failed proof.
    Fail { reason: String },
}

/// Outcome of looking an event up in the transition table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    To(DealState),
    /// The deal is terminal, the event changes nothing.
    Ignored,
    Illegal,
}

/// The transition table. Any non-terminal deal may fail.
pub fn transition(from: DealState, event: &DealEvent) -> Transition {
    use DealEvent::*;
    use DealState::*;

    if from.is_terminal() {
        return Transition::Ignored;
    }
    match (from, event) {
        (Proposed, Accept) => Transition::To(Accepted),
        (Accepted, TransferComplete { .. }) => Transition::To(Staged),
        (Staged, ProofConfirmed) => Transition::To(Complete),
        (_, Fail { .. }) => Transition::To(Failed),
        _ => Transition::Illegal,
    }
}

/// Parameters of a new deal as received from the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DealProposal {
    pub proposal_cid: Cid,
    pub client: Address,
    pub miner: Address,
    /// Identifier of the piece being stored.
    pub piece: Cid,
    pub duration: ChainEpoch,
}

/// A storage deal tracked by this node. Records are never deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct StorageDeal {
    pub proposal_cid: Cid,
    pub client: Address,
    pub miner: Address,
    pub piece: Cid,
    pub duration: ChainEpoch,
    pub state: DealState,
    /// Sector the piece was staged into. A proof must cover it for the deal to complete.
    pub sector: Option<SectorNumber>,
    /// Chain head height when the deal was staged. Only proofs in later blocks settle it.
    pub staged_at: Option<ChainEpoch>,
    /// Why the deal failed, once it has.
    pub failure: Option<String>,
}

impl StorageDeal {
    pub fn new(proposal: DealProposal) -> Self {
        Self {
            proposal_cid: proposal.proposal_cid,
            client: proposal.client,
            miner: proposal.miner,
            piece: proposal.piece,
            duration: proposal.duration,
            state: DealState::Proposed,
            sector: None,
            staged_at: None,
            failure: None,
        }
    }

    /// Applies `event` to a copy of this deal. Returns `None` when the deal is terminal.
    fn apply(&self, event: &DealEvent) -> Result<Option<StorageDeal>, DealState> {
        match transition(self.state, event) {
            Transition::Ignored => Ok(None),
            Transition::Illegal => Err(self.state),
            Transition::To(state) => {
                let mut deal = self.clone();
                deal.state = state;
                match event {
                    DealEvent::TransferComplete { sector, height } => {
                        deal.sector = *sector;
                        deal.staged_at = Some(*height);
                    }
                    DealEvent::Fail { reason } => deal.failure = Some(reason.clone()),
                    _ => {}
                }
                Ok(Some(deal))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn fail() -> DealEvent {
        DealEvent::Fail {
            reason: "timed out".into(),
        }
    }

    fn transfer() -> DealEvent {
        DealEvent::TransferComplete {
            sector: Some(7),
            height: 12,
        }
    }

    #[rstest]
    #[case(DealState::Proposed, DealEvent::Accept, Transition::To(DealState::Accepted))]
    #[case(DealState::Accepted, transfer(), Transition::To(DealState::Staged))]
    #[case(DealState::Staged, DealEvent::ProofConfirmed, Transition::To(DealState::Complete))]
    #[case(DealState::Proposed, fail(), Transition::To(DealState::Failed))]
    #[case(DealState::Accepted, fail(), Transition::To(DealState::Failed))]
    #[case(DealState::Staged, fail(), Transition::To(DealState::Failed))]
    #[case(DealState::Proposed, transfer(), Transition::Illegal)]
    #[case(DealState::Proposed, DealEvent::ProofConfirmed, Transition::Illegal)]
    #[case(DealState::Accepted, DealEvent::Accept, Transition::Illegal)]
    #[case(DealState::Staged, transfer(), Transition::Illegal)]
    #[case(DealState::Complete, fail(), Transition::Ignored)]
    #[case(DealState::Complete, DealEvent::ProofConfirmed, Transition::Ignored)]
    #[case(DealState::Failed, DealEvent::ProofConfirmed, Transition::Ignored)]
    #[case(DealState::Failed, DealEvent::Accept, Transition::Ignored)]
    fn transition_table(
        #[case] from: DealState,
        #[case] event: DealEvent,
        #[case] expected: Transition,
    ) {
        assert_eq!(transition(from, &event), expected);
    }

    #[test]
    fn terminal_states_never_cross() {
        let events = [DealEvent::Accept, transfer(), DealEvent::ProofConfirmed, fail()];
        for from in [DealState::Complete, DealState::Failed] {
            for event in &events {
                assert_eq!(transition(from, event), Transition::Ignored);
            }
        }
    }

    #[test]
    fn apply_records_sector_and_failure() {
        let deal = StorageDeal {
            state: DealState::Accepted,
            ..StorageDeal::new(DealProposal {
                proposal_cid: Cid::default(),
                client: Address::new_id(100),
                miner: Address::new_id(1001),
                piece: Cid::default(),
                duration: 100,
            })
        };
        let staged = deal.apply(&transfer()).unwrap().unwrap();
        assert_eq!(staged.state, DealState::Staged);
        assert_eq!(staged.sector, Some(7));
        assert_eq!(staged.staged_at, Some(12));

        let failed = staged.apply(&fail()).unwrap().unwrap();
        assert_eq!(failed.failure.as_deref(), Some("timed out"));
        assert_eq!(failed.apply(&DealEvent::Accept), Ok(None));
        assert_eq!(deal.apply(&DealEvent::Accept), Err(DealState::Accepted));
    }
}
