// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Transport-neutral encoding of method parameters and return values.
//!
//! Parameters are carried as a `dag-cbor` list of tagged [`AbiValue`]s so that any node can
//! decode them without knowing the callee, and so that a [`FunctionSignature`] registered for
//! the callee can be checked against them.
//!
//! [`FunctionSignature`]: crate::method_registry::FunctionSignature

use crate::shim::{address::Address, econ::TokenAmount};
use cid::Cid;
use fvm_ipld_encoding::RawBytes;
use serde::{Deserialize, Serialize};

/// A single typed method argument or return value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbiValue {
    Address(Address),
    TokenAmount(TokenAmount),
    Uint(u64),
    Int(i64),
    Bytes(#[serde(with = "fvm_ipld_encoding::strict_bytes")] Vec<u8>),
    String(String),
    Cid(Cid),
    Boolean(bool),
    UintArray(Vec<u64>),
}

/// The shape of an [`AbiValue`], used by method signatures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum AbiType {
    Address,
    TokenAmount,
    Uint,
    Int,
    Bytes,
    String,
    Cid,
    Boolean,
    UintArray,
}

impl AbiValue {
    pub fn abi_type(&self) -> AbiType {
        match self {
            AbiValue::Address(_) => AbiType::Address,
            AbiValue::TokenAmount(_) => AbiType::TokenAmount,
            AbiValue::Uint(_) => AbiType::Uint,
            AbiValue::Int(_) => AbiType::Int,
            AbiValue::Bytes(_) => AbiType::Bytes,
            AbiValue::String(_) => AbiType::String,
            AbiValue::Cid(_) => AbiType::Cid,
            AbiValue::Boolean(_) => AbiType::Boolean,
            AbiValue::UintArray(_) => AbiType::UintArray,
        }
    }
}

/// Encodes `values` as message parameters. An empty list encodes to empty parameters.
pub fn to_encoded_values(values: &[AbiValue]) -> Result<RawBytes, fvm_ipld_encoding::Error> {
    if values.is_empty() {
        return Ok(RawBytes::default());
    }
    Ok(RawBytes::new(fvm_ipld_encoding::to_vec(values)?))
}

/// Decodes message parameters or a return value without checking their shape.
pub fn from_encoded_values(bytes: &RawBytes) -> anyhow::Result<Vec<AbiValue>> {
    if bytes.is_empty() {
        return Ok(vec![]);
    }
    Ok(fvm_ipld_encoding::from_slice(bytes.bytes())?)
}

/// Decodes `bytes` and checks that the values have exactly the `expected` shape.
pub fn decode_values(bytes: &RawBytes, expected: &[AbiType]) -> anyhow::Result<Vec<AbiValue>> {
    let values = from_encoded_values(bytes)?;
    check_types(&values, expected)?;
    Ok(values)
}

/// Checks that `values` match `expected` in count and type.
pub fn check_types(values: &[AbiValue], expected: &[AbiType]) -> anyhow::Result<()> {
    anyhow::ensure!(
        values.len() == expected.len(),
        "expected {} values, got {}",
        expected.len(),
        values.len()
    );
    for (i, (value, ty)) in values.iter().zip(expected).enumerate() {
        anyhow::ensure!(
            value.abi_type() == *ty,
            "value {i} is {}, expected {ty}",
            value.abi_type()
        );
    }
    Ok(())
}
