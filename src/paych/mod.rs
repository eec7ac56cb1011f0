// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Payment channel vouchers and their redemption on chain.

mod ledger;

pub use ledger::VoucherLedger;

use crate::message::MessageReceipt;
use crate::shim::{address::Address, clock::ChainEpoch, econ::TokenAmount};
use async_trait::async_trait;
use cid::Cid;
use fvm_ipld_encoding::tuple::*;

/// Method name a payment channel actor redeems vouchers with.
pub const REDEEM_METHOD: &str = "redeem";

/// A payment promise on `channel`, redeemable once the chain reaches `valid_at`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct Voucher {
    pub channel: Address,
    pub amount: TokenAmount,
    pub valid_at: ChainEpoch,
}

/// A voucher as held by the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct VoucherRecord {
    pub voucher: Voucher,
    /// Cid of the redemption message once the voucher is consumed.
    pub redeemed_by: Option<Cid>,
}

impl VoucherRecord {
    pub fn is_consumed(&self) -> bool {
        self.redeemed_by.is_some()
    }
}

/// Outcome of a successful redemption.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Redemption {
    pub message: Cid,
    pub receipt: MessageReceipt,
    /// `balance_after + gas_cost - balance_before` of the redeeming identity.
    pub net_settlement: TokenAmount,
}

/// Reads account balances from the current chain head.
#[async_trait]
pub trait BalanceReader: Send + Sync {
    async fn balance(&self, address: &Address) -> anyhow::Result<TokenAmount>;
}
