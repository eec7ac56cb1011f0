// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use cid::Cid;
use tracing::{info, warn};

use crate::errors::{Error, Result};
use crate::message::{
    Message, SignedMessage,
    abi::{AbiValue, to_encoded_values},
};
use crate::message_pool::{Mempool, NonceOracle, NonceTracker};
use crate::method_registry::MethodRegistry;
use crate::metrics;
use crate::shim::{address::Address, econ::TokenAmount};
use crate::wallet::Signer;

/// Construction time settings of the [`MessageSubmitter`].
#[derive(Debug, Clone, Default)]
pub struct SubmitterConfig {
    /// Identity used when a caller does not name one. When unset the wallet's default address
    /// is used, if it has one.
    pub default_from: Option<Address>,
}

/// Builds, signs and hands messages to the message pool.
pub struct MessageSubmitter {
    default_from: Option<Address>,
    nonces: NonceTracker,
    signer: Arc<dyn Signer>,
    mempool: Arc<dyn Mempool>,
    registry: Arc<dyn MethodRegistry>,
}

impl MessageSubmitter {
    pub fn new(
        config: SubmitterConfig,
        signer: Arc<dyn Signer>,
        mempool: Arc<dyn Mempool>,
        oracle: Arc<dyn NonceOracle>,
        registry: Arc<dyn MethodRegistry>,
    ) -> Result<Self> {
        let default_from = match config.default_from {
            Some(addr) => Some(addr),
            None => signer
                .default_address()
                .map_err(|e| Error::LookupFailed(format!("wallet default address: {e}")))?,
        };
        Ok(Self {
            default_from,
            nonces: NonceTracker::new(oracle),
            signer,
            mempool,
            registry,
        })
    }

    /// The identity messages are sent from when the caller does not name one.
    pub fn default_from(&self) -> Option<Address> {
        self.default_from
    }

    pub fn nonce_tracker(&self) -> &NonceTracker {
        &self.nonces
    }

    /// Sends `method` on `to` with `params`, returning the cid of the signed message.
    ///
    /// A rejected submission is surfaced and never retried; the nonce it held is released so
    /// that the caller's next attempt reuses it.
    pub async fn send(
        &self,
        from: Option<Address>,
        to: Address,
        value: TokenAmount,
        method: &str,
        params: &[AbiValue],
    ) -> Result<Cid> {
        let from = from.or(self.default_from).ok_or(Error::NoDefaultIdentity)?;

        let signature = self
            .registry
            .signature_for(&to, method)
            .map_err(|e| Error::LookupFailed(format!("signature of {to}.{method}: {e}")))?;
        if let Some(signature) = signature {
            signature
                .check_params(params)
                .map_err(|e| Error::EncodingError(format!("{method}: {e}")))?;
        }
        let params = to_encoded_values(params)?;

        let reservation = self.nonces.reserve(&from).await?;
        let message = Message {
            to,
            from,
            sequence: reservation.nonce(),
            value,
            method: method.to_owned(),
            params,
        };
        let signature = self
            .signer
            .sign(&message, &from)
            .map_err(|e| Error::SigningError(e.to_string()))?;
        let signed = SignedMessage::new_unchecked(message, signature);
        let cid = signed.cid();

        if let Err(e) = self.mempool.submit(signed).await {
            warn!(%from, %to, method, nonce = reservation.nonce(), "message rejected: {e:#}");
            metrics::SUBMISSIONS_REJECTED.inc();
            return Err(Error::SubmissionRejected(format!("{e:#}")));
        }
        let nonce = reservation.commit();
        metrics::MESSAGES_SUBMITTED.inc();
        info!(%cid, %from, %to, method, nonce, "submitted message");
        Ok(cid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::abi::from_encoded_values;
    use crate::message::proof::SUBMIT_POST_METHOD;
    use crate::method_registry::StaticMethodRegistry;
    use crate::test_utils::{TestMempool, TestNonceOracle, TestSigner};

    struct Harness {
        signer: Arc<TestSigner>,
        mempool: Arc<TestMempool>,
        oracle: Arc<TestNonceOracle>,
    }

    impl Harness {
        fn new(wallet_default: Option<Address>) -> Self {
            Self {
                signer: Arc::new(TestSigner::new(wallet_default)),
                mempool: Arc::new(TestMempool::default()),
                oracle: Arc::new(TestNonceOracle::default()),
            }
        }

        fn submitter(&self, default_from: Option<Address>) -> Result<MessageSubmitter> {
            MessageSubmitter::new(
                SubmitterConfig { default_from },
                self.signer.clone(),
                self.mempool.clone(),
                self.oracle.clone(),
                Arc::new(StaticMethodRegistry::with_builtin_methods()),
            )
        }
    }

    #[tokio::test]
    async fn send_signs_and_submits() {
        let from = Address::new_id(100);
        let to = Address::new_id(200);
        let h = Harness::new(None);
        h.oracle.set(from, 4);
        let submitter = h.submitter(Some(from)).unwrap();

        let cid = submitter
            .send(
                None,
                to,
                TokenAmount::from_atto(10),
                "send",
                &[AbiValue::String("hello".into())],
            )
            .await
            .unwrap();

        let submitted = h.mempool.messages();
        assert_eq!(submitted.len(), 1);
        let msg = &submitted[0];
        assert_eq!(msg.cid(), cid);
        assert_eq!(msg.from(), from);
        assert_eq!(msg.to(), to);
        assert_eq!(msg.sequence(), 5);
        assert_eq!(msg.message().value, TokenAmount::from_atto(10));
        assert_eq!(
            from_encoded_values(msg.message().params()).unwrap(),
            vec![AbiValue::String("hello".into())]
        );
        assert!(h.signer.signed_by(&from, msg));
    }

    #[tokio::test]
    async fn default_identity_resolution() {
        let wallet_addr = Address::new_id(300);
        let config_addr = Address::new_id(301);

        let h = Harness::new(Some(wallet_addr));
        assert_eq!(
            h.submitter(Some(config_addr)).unwrap().default_from(),
            Some(config_addr)
        );
        assert_eq!(h.submitter(None).unwrap().default_from(), Some(wallet_addr));

        let h = Harness::new(None);
        let submitter = h.submitter(None).unwrap();
        let res = submitter
            .send(None, Address::new_id(1), TokenAmount::default(), "send", &[])
            .await;
        assert!(matches!(res, Err(Error::NoDefaultIdentity)));
        assert!(h.mempool.messages().is_empty());
    }

    #[tokio::test]
    async fn params_must_match_registered_signature() {
        let h = Harness::new(None);
        let submitter = h.submitter(Some(Address::new_id(100))).unwrap();
        let res = submitter
            .send(
                None,
                Address::new_id(1001),
                TokenAmount::default(),
                SUBMIT_POST_METHOD,
                &[AbiValue::String("not a sector size".into())],
            )
            .await;
        assert!(matches!(res, Err(Error::EncodingError(_))));
        assert!(h.mempool.messages().is_empty());
    }

    #[tokio::test]
    async fn signing_failure_releases_nonce() {
        let from = Address::new_id(100);
        let h = Harness::new(None);
        let submitter = h.submitter(Some(from)).unwrap();

        h.signer.fail(true);
        let res = submitter
            .send(None, Address::new_id(1), TokenAmount::default(), "send", &[])
            .await;
        assert!(matches!(res, Err(Error::SigningError(_))));

        h.signer.fail(false);
        submitter
            .send(None, Address::new_id(1), TokenAmount::default(), "send", &[])
            .await
            .unwrap();
        assert_eq!(h.mempool.messages()[0].sequence(), 0);
    }

    #[tokio::test]
    async fn rejection_is_surfaced_without_retry() {
        let from = Address::new_id(100);
        let h = Harness::new(None);
        let submitter = h.submitter(Some(from)).unwrap();

        h.mempool.reject_with(Some("not enough funds"));
        let res = submitter
            .send(None, Address::new_id(1), TokenAmount::default(), "send", &[])
            .await;
        match res {
            Err(Error::SubmissionRejected(reason)) => assert!(reason.contains("not enough funds")),
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(h.mempool.attempts(), 1);

        h.mempool.reject_with(None);
        submitter
            .send(None, Address::new_id(1), TokenAmount::default(), "send", &[])
            .await
            .unwrap();
        assert_eq!(h.mempool.messages()[0].sequence(), 0);
    }

    #[tokio::test]
    async fn nonce_lookup_failure_is_surfaced() {
        let h = Harness::new(None);
        let submitter = h.submitter(Some(Address::new_id(100))).unwrap();
        h.oracle.fail(true);
        let res = submitter
            .send(None, Address::new_id(1), TokenAmount::default(), "send", &[])
            .await;
        assert!(matches!(res, Err(Error::LookupFailed(_))));
        assert_eq!(h.mempool.attempts(), 0);
    }
}
