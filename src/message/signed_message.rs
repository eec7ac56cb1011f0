// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::message::Message;
use crate::shim::{
    address::Address,
    crypto::{Signature, SignatureType},
};
use crate::utils::cid::CidCborExt as _;
use fvm_ipld_encoding::tuple::*;

/// Represents a wrapped message with signature bytes.
#[derive(PartialEq, Clone, Debug, Serialize_tuple, Deserialize_tuple, Eq)]
pub struct SignedMessage {
    pub message: Message,
    pub signature: Signature,
}

impl SignedMessage {
    /// Generate a new signed message from fields.
    /// The signature is produced by the wallet and is not verified here.
    pub fn new_unchecked(message: Message, signature: Signature) -> SignedMessage {
        SignedMessage { message, signature }
    }

    /// Returns reference to the unsigned message.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Returns signature of the signed message.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Consumes self and returns it's unsigned message.
    pub fn into_message(self) -> Message {
        self.message
    }

    pub fn from(&self) -> Address {
        self.message.from
    }

    pub fn to(&self) -> Address {
        self.message.to
    }

    pub fn sequence(&self) -> u64 {
        self.message.sequence
    }

    pub fn method(&self) -> &str {
        &self.message.method
    }

    /// Checks if the signed message is a BLS message.
    pub fn is_bls(&self) -> bool {
        self.signature.signature_type() == SignatureType::BLS
    }

    // BLS messages are aggregated into the block, so they are identified by
    // the unsigned message alone. The behavior comes from Lotus.
    pub fn cid(&self) -> cid::Cid {
        if self.is_bls() {
            self.message.cid()
        } else {
            cid::Cid::from_cbor_blake2b256(self).expect("message serialization is infallible")
        }
    }

    /// Creates a mock signed message for testing purposes.
    #[cfg(test)]
    pub fn mock_secp_signed_message(message: Message) -> SignedMessage {
        let signature = Signature::new_secp256k1(vec![0; 65]);
        SignedMessage::new_unchecked(message, signature)
    }
}
