// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Thin aliases over the `fvm_shared` primitives the settlement engine speaks in.

pub mod error;

pub mod address {
    pub use fvm_shared4::address::{Address, Protocol};
}

pub mod clock {
    pub use fvm_shared4::clock::ChainEpoch;
}

pub mod crypto {
    pub use fvm_shared4::crypto::signature::{Signature, SignatureType};
}

pub mod econ {
    pub use fvm_shared4::econ::TokenAmount;
}

pub mod sector {
    /// Identifier of a sealed sector within a miner.
    pub use fvm_shared4::sector::SectorNumber;
    /// Size of a sector in bytes, the unit power is accounted in.
    pub type SectorSize = u64;
}
