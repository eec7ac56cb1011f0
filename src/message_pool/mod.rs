// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
mod nonce_tracker;
mod provider;
mod submitter;

pub use self::{
    nonce_tracker::{NonceReservation, NonceTracker},
    provider::{Mempool, NonceOracle},
    submitter::{MessageSubmitter, SubmitterConfig},
};
