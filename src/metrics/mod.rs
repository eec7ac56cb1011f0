// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use parking_lot::{RwLock, RwLockWriteGuard};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{
        counter::Counter,
        family::Family,
        histogram::{Histogram, exponential_buckets},
    },
};
use std::sync::LazyLock;
use std::time::Instant;

static DEFAULT_REGISTRY: LazyLock<RwLock<prometheus_client::registry::Registry>> =
    LazyLock::new(Default::default);

pub fn default_registry<'a>() -> RwLockWriteGuard<'a, prometheus_client::registry::Registry> {
    DEFAULT_REGISTRY.write()
}

pub static NONCES_ASSIGNED: LazyLock<Counter> = LazyLock::new(|| {
    let metric = Counter::default();
    default_registry().register(
        "settlement_nonces_assigned",
        "Number of nonces handed out to submitted messages",
        metric.clone(),
    );
    metric
});

pub static MESSAGES_SUBMITTED: LazyLock<Counter> = LazyLock::new(|| {
    let metric = Counter::default();
    default_registry().register(
        "settlement_messages_submitted",
        "Number of messages accepted by the message pool",
        metric.clone(),
    );
    metric
});

pub static SUBMISSIONS_REJECTED: LazyLock<Counter> = LazyLock::new(|| {
    let metric = Counter::default();
    default_registry().register(
        "settlement_submissions_rejected",
        "Number of messages rejected by the message pool",
        metric.clone(),
    );
    metric
});

pub static CHAIN_POLLS: LazyLock<Counter> = LazyLock::new(|| {
    let metric = Counter::default();
    default_registry().register(
        "settlement_chain_polls",
        "Number of times the chain was polled by waiting operations",
        metric.clone(),
    );
    metric
});

pub static DEAL_TRANSITIONS: LazyLock<Family<DealStateLabel, Counter>> = LazyLock::new(|| {
    let metric = Family::default();
    default_registry().register(
        "settlement_deal_transitions",
        "Number of storage deal state transitions, by target state",
        metric.clone(),
    );
    metric
});

pub static VOUCHERS_REDEEMED: LazyLock<Counter> = LazyLock::new(|| {
    let metric = Counter::default();
    default_registry().register(
        "settlement_vouchers_redeemed",
        "Number of vouchers redeemed on chain",
        metric.clone(),
    );
    metric
});

pub static REDEMPTION_TIME: LazyLock<Histogram> = LazyLock::new(|| {
    // 1s to ~4.5h, each bucket 3 times as big as the last.
    let metric = Histogram::new(exponential_buckets(1., 3., 10));
    default_registry().register(
        "settlement_redemption_time",
        "Duration of a voucher redemption from submission to confirmation in seconds",
        metric.clone(),
    );
    metric
});

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DealStateLabel {
    pub state: String,
}

impl DealStateLabel {
    pub fn new(state: impl ToString) -> Self {
        Self {
            state: state.to_string(),
        }
    }
}

/// Encodes every registered metric in the text exposition format.
pub fn encode_registry() -> anyhow::Result<String> {
    let mut metrics = String::new();
    prometheus_client::encoding::text::encode_registry(&mut metrics, &DEFAULT_REGISTRY.read())?;
    prometheus_client::encoding::text::encode_eof(&mut metrics)?;
    Ok(metrics)
}

pub struct HistogramTimer<'a> {
    histogram: &'a Histogram,
    start: Instant,
}

impl Drop for HistogramTimer<'_> {
    fn drop(&mut self) {
        let duration = Instant::now() - self.start;
        self.histogram.observe(duration.as_secs_f64());
    }
}

pub trait HistogramTimerExt {
    fn start_timer(&self) -> HistogramTimer<'_>;
}

impl HistogramTimerExt for Histogram {
    fn start_timer(&self) -> HistogramTimer<'_> {
        HistogramTimer {
            histogram: self,
            start: Instant::now(),
        }
    }
}
