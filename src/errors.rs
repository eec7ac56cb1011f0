// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::deals::{DealEvent, DealState};
use crate::shim::{address::Address, econ::TokenAmount};
use cid::Cid;
use thiserror::Error;

/// Settlement engine error. Every public operation either succeeds or fails with exactly one
/// of these kinds.
#[derive(Debug, Error)]
pub enum Error {
    /// An external lookup (nonce oracle, balance, method registry) failed.
    #[error("lookup failed: {0}")]
    LookupFailed(String),
    #[error("no from address was supplied and no default address is configured")]
    NoDefaultIdentity,
    #[error("failed to encode message parameters: {0}")]
    EncodingError(String),
    #[error("failed to sign message: {0}")]
    SigningError(String),
    #[error("message rejected by the message pool: {0}")]
    SubmissionRejected(String),
    /// The caller supplied predicate failed. Always a logic fault of the caller.
    #[error("chain predicate failed: {0:#}")]
    PredicateError(anyhow::Error),
    #[error("failed to read the chain: {0}")]
    ChainReadFailed(String),
    /// The wait was cancelled before it could complete. Not a failure.
    #[error("operation cancelled")]
    Cancelled,
    #[error("voucher redemption failed on chain: {0}")]
    RedemptionRejected(String),
    #[error("ledger inconsistency: voucher worth {expected} settled {actual}")]
    LedgerInconsistency {
        expected: TokenAmount,
        actual: TokenAmount,
    },
    #[error("deal {0} is not tracked")]
    UnknownDeal(Cid),
    #[error("deal {deal} cannot handle {event} while {from}")]
    IllegalTransition {
        deal: Cid,
        from: DealState,
        event: DealEvent,
    },
    #[error("no vouchers are held for channel {0}")]
    UnknownChannel(Address),
    #[error("voucher does not increase on the latest voucher of its channel")]
    VoucherOutOfOrder,
    #[error("voucher has already been redeemed")]
    VoucherConsumed,
    #[error("voucher redemption is already in progress")]
    RedemptionInProgress,
    #[error("settlement store failure: {0}")]
    Store(String),
}

impl Error {
    /// Cancellation is a normal outcome of a wait rather than a fault.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<fvm_ipld_encoding::Error> for Error {
    fn from(e: fvm_ipld_encoding::Error) -> Self {
        Error::EncodingError(e.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
