// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::SignedMessage;
use super::abi::{AbiType, AbiValue, decode_values, to_encoded_values};
use crate::shim::{
    address::Address,
    sector::{SectorNumber, SectorSize},
};
use fvm_ipld_encoding::RawBytes;

/// Method name of the proof-of-spacetime submission a miner sends to its own actor.
pub const SUBMIT_POST_METHOD: &str = "submitPoSt";

const PARAM_TYPES: [AbiType; 2] = [AbiType::Uint, AbiType::UintArray];

/// Decoded parameters of a [`SUBMIT_POST_METHOD`] message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofSubmission {
    /// Size of each proven sector in bytes.
    pub sector_size: SectorSize,
    pub sectors: Vec<SectorNumber>,
}

impl ProofSubmission {
    pub fn to_params(&self) -> Result<RawBytes, fvm_ipld_encoding::Error> {
        to_encoded_values(&[
            AbiValue::Uint(self.sector_size),
            AbiValue::UintArray(self.sectors.clone()),
        ])
    }

    pub fn from_params(params: &RawBytes) -> anyhow::Result<Self> {
        match decode_values(params, &PARAM_TYPES)?.as_slice() {
            [AbiValue::Uint(sector_size), AbiValue::UintArray(sectors)] => Ok(Self {
                sector_size: *sector_size,
                sectors: sectors.clone(),
            }),
            _ => anyhow::bail!("malformed {SUBMIT_POST_METHOD} parameters"),
        }
    }

    /// Power this proof contributes when it applies successfully.
    pub fn power(&self) -> u64 {
        self.sector_size.saturating_mul(self.sectors.len() as u64)
    }

    pub fn covers(&self, sector: SectorNumber) -> bool {
        self.sectors.contains(&sector)
    }
}

/// Returns `true` if `msg` is a proof submission addressed to `miner`.
pub fn is_proof_submission_to(msg: &SignedMessage, miner: &Address) -> bool {
    msg.method() == SUBMIT_POST_METHOD && msg.to() == *miner
}
