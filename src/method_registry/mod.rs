// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::message::abi::{AbiType, AbiValue, check_types};
use crate::message::proof::SUBMIT_POST_METHOD;
use crate::paych::REDEEM_METHOD;
use crate::shim::address::Address;
use ahash::HashMap;
use parking_lot::RwLock;

/// Parameter and return shapes of an actor method.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FunctionSignature {
    pub params: Vec<AbiType>,
    pub returns: Vec<AbiType>,
}

impl FunctionSignature {
    pub fn new(params: impl Into<Vec<AbiType>>, returns: impl Into<Vec<AbiType>>) -> Self {
        Self {
            params: params.into(),
            returns: returns.into(),
        }
    }

    /// Checks that `params` can be passed to this method.
    pub fn check_params(&self, params: &[AbiValue]) -> anyhow::Result<()> {
        check_types(params, &self.params)
    }
}

/// Resolves the signature of a method on a recipient actor.
pub trait MethodRegistry: Send + Sync {
    /// Returns `Ok(None)` when the recipient exposes no such method.
    fn signature_for(
        &self,
        recipient: &Address,
        method: &str,
    ) -> anyhow::Result<Option<FunctionSignature>>;
}

macro_rules! register_methods {
    ($registry:expr, [$(($method:expr, [$($param:ident),*], [$($ret:ident),*])),* $(,)?]) => {{
        $(
            $registry.register_method(
                $method,
                FunctionSignature::new(
                    vec![$(AbiType::$param),*],
                    vec![$(AbiType::$ret),*],
                ),
            );
        )*
    }};
}

/// In-memory registry. Signatures registered for a specific recipient take precedence over
/// signatures registered for a method name on any recipient.
#[derive(Debug, Default)]
pub struct StaticMethodRegistry {
    by_recipient: RwLock<HashMap<(Address, String), FunctionSignature>>,
    by_method: RwLock<HashMap<String, FunctionSignature>>,
}

impl StaticMethodRegistry {
    /// Registry preloaded with the methods the settlement engine sends and watches for.
    pub fn with_builtin_methods() -> Self {
        let registry = Self::default();
        register_methods!(
            registry,
            [
                (SUBMIT_POST_METHOD, [Uint, UintArray], []),
                (REDEEM_METHOD, [Bytes], []),
            ]
        );
        registry
    }

    pub fn register_method(&self, method: &str, signature: FunctionSignature) {
        self.by_method.write().insert(method.to_owned(), signature);
    }

    pub fn register(&self, recipient: Address, method: &str, signature: FunctionSignature) {
        self.by_recipient
            .write()
            .insert((recipient, method.to_owned()), signature);
    }
}

impl MethodRegistry for StaticMethodRegistry {
    fn signature_for(
        &self,
        recipient: &Address,
        method: &str,
    ) -> anyhow::Result<Option<FunctionSignature>> {
        if let Some(signature) = self
            .by_recipient
            .read()
            .get(&(*recipient, method.to_owned()))
        {
            return Ok(Some(signature.clone()));
        }
        Ok(self.by_method.read().get(method).cloned())
    }
}
