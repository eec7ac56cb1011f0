// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub mod abi;
pub mod proof;
pub mod signed_message;

use crate::shim::{address::Address, econ::TokenAmount, error::ExitCode};
use crate::utils::cid::CidCborExt as _;
use cid::Cid;
use fvm_ipld_encoding::RawBytes;
use fvm_ipld_encoding::tuple::*;
pub use signed_message::SignedMessage;

/// An unsigned message addressed to an actor method by name.
#[cfg_attr(test, derive(Default))]
#[derive(PartialEq, Eq, Clone, Debug, Serialize_tuple, Deserialize_tuple)]
pub struct Message {
    pub to: Address,
    pub from: Address,
    pub sequence: u64,
    pub value: TokenAmount,
    pub method: String,
    pub params: RawBytes,
}

impl Message {
    /// Returns the from address of the message.
    pub fn from(&self) -> Address {
        self.from
    }

    /// Returns the destination address of the message.
    pub fn to(&self) -> Address {
        self.to
    }

    /// Returns the message sequence or nonce.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the method name to be called.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the encoded parameters for the method call.
    pub fn params(&self) -> &RawBytes {
        &self.params
    }

    /// Content identifier of the unsigned message, the bytes a signer commits to.
    pub fn cid(&self) -> Cid {
        Cid::from_cbor_blake2b256(self).expect("message serialization is infallible")
    }
}

/// Result of applying a message on chain.
#[derive(PartialEq, Eq, Clone, Debug, Default, Serialize_tuple, Deserialize_tuple)]
pub struct MessageReceipt {
    pub exit_code: ExitCode,
    pub return_data: RawBytes,
    /// Total gas charged to the sender, in attoFIL.
    pub gas_cost: TokenAmount,
}

impl MessageReceipt {
    pub fn is_success(&self) -> bool {
        self.exit_code.is_success()
    }
}
