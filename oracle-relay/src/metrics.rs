use std::sync::LazyLock;

use oracle_relay_metrics::{
    HistogramVec, IntCounterVec, REGISTRY, histogram_opts, opts,
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
};

pub(crate) static RELAY_PROVIDER_CALLS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        opts!(
            "relay_provider_calls_total",
            "Relay calls produced by providers",
        ),
        &["kind"],
        REGISTRY
    )
    .expect("metric registration should not fail")
});

/// Duration of a single provider evaluation, labeled by outcome
pub(crate) static RELAY_PROVIDER_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec_with_registry!(
        histogram_opts!(
            "relay_provider_duration_seconds",
            "Duration of provider evaluations",
        ),
        &["outcome"],
        REGISTRY
    )
    .expect("metric registration should not fail")
});

pub(crate) static RELAY_TRANSACTIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        opts!(
            "relay_transactions_total",
            "Relay transactions by submission result",
        ),
        &["result"],
        REGISTRY
    )
    .expect("metric registration should not fail")
});

/// Calls left out of a tick's batch, labeled by reason
pub(crate) static RELAY_CALLS_DROPPED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        opts!(
            "relay_calls_dropped_total",
            "Relay calls dropped from a batch",
        ),
        &["reason"],
        REGISTRY
    )
    .expect("metric registration should not fail")
});
