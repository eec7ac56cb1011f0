// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::message::Message;
use crate::shim::{address::Address, crypto::Signature};

/// Wallet collaborator holding the keys of the node's identities.
pub trait Signer: Send + Sync {
    /// Signs the cid of `message` with the key of `address`.
    fn sign(&self, message: &Message, address: &Address) -> anyhow::Result<Signature>;

    /// The identity the wallet is configured to send from, if any.
    fn default_address(&self) -> anyhow::Result<Option<Address>>;
}
