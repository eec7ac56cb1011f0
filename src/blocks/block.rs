// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::shim::{address::Address, clock::ChainEpoch};
use crate::utils::cid::CidCborExt as _;
use cid::Cid;
use fvm_ipld_encoding::tuple::*;

/// A block as the settlement engine sees it: its position in the chain and the ordered
/// references of the messages it includes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct Block {
    pub miner: Address,
    pub parents: Vec<Cid>,
    pub height: ChainEpoch,
    pub messages: Vec<Cid>,
}

impl std::hash::Hash for Block {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::hash::Hash::hash(&self.cid(), state)
    }
}

impl Block {
    pub fn height(&self) -> ChainEpoch {
        self.height
    }

    pub fn parents(&self) -> &[Cid] {
        &self.parents
    }

    /// Message references in inclusion order.
    pub fn messages(&self) -> &[Cid] {
        &self.messages
    }

    /// Returns the block's content identifier.
    pub fn cid(&self) -> Cid {
        Cid::from_cbor_blake2b256(self).expect("block serialization is infallible")
    }
}
