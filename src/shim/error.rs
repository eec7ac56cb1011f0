// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT
use fvm_shared4::error::ExitCode as ExitCodeV4;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `Newtype` wrapper for the FVM `ExitCode` carried by message receipts.
///
/// # Examples
/// ```
/// # use forest_settlement::shim::error::ExitCode;
/// assert!(ExitCode::OK.is_success());
/// assert_eq!(ExitCode::from(16).to_string(), "ErrIllegalArgument(16)");
/// ```
#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExitCode(ExitCodeV4);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0 {
            ExitCodeV4::OK => Some("Ok"),
            ExitCodeV4::SYS_SENDER_INVALID => Some("SysErrSenderInvalid"),
            ExitCodeV4::SYS_SENDER_STATE_INVALID => Some("SysErrSenderStateInvalid"),
            ExitCodeV4::SYS_INVALID_RECEIVER => Some("SysErrInvalidReceiver"),
            ExitCodeV4::SYS_INSUFFICIENT_FUNDS => Some("SysErrInsufficientFunds"),
            ExitCodeV4::SYS_OUT_OF_GAS => Some("SysErrOutOfGas"),
            ExitCodeV4::USR_ILLEGAL_ARGUMENT => Some("ErrIllegalArgument"),
            ExitCodeV4::USR_NOT_FOUND => Some("ErrNotFound"),
            ExitCodeV4::USR_FORBIDDEN => Some("ErrForbidden"),
            ExitCodeV4::USR_INSUFFICIENT_FUNDS => Some("ErrInsufficientFunds"),
            ExitCodeV4::USR_ILLEGAL_STATE => Some("ErrIllegalState"),
            ExitCodeV4::USR_SERIALIZATION => Some("ErrSerialization"),
            ExitCodeV4::USR_UNHANDLED_MESSAGE => Some("ErrUnhandledMessage"),
            _ => None,
        };
        match name {
            Some(name) => write!(f, "{}({})", name, self.value()),
            None => write!(f, "{}", self.value()),
        }
    }
}

impl ExitCode {
    pub const OK: Self = Self(ExitCodeV4::OK);

    /// The message sender didn't have the requisite funds.
    pub const SYS_INSUFFICIENT_FUNDS: Self = Self(ExitCodeV4::SYS_INSUFFICIENT_FUNDS);

    /// A payment channel rejected the voucher presented to it.
    pub const USR_ILLEGAL_ARGUMENT: Self = Self(ExitCodeV4::USR_ILLEGAL_ARGUMENT);

    pub fn value(&self) -> u32 {
        self.0.value()
    }

    pub fn is_success(&self) -> bool {
        self.0.is_success()
    }
}

impl From<u32> for ExitCode {
    fn from(value: u32) -> Self {
        Self(ExitCodeV4::new(value))
    }
}

impl Default for ExitCode {
    fn default() -> Self {
        Self::OK
    }
}
