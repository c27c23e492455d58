use std::sync::LazyLock;

use oracle_relay_metrics::{
    HistogramVec, IntCounterVec, REGISTRY, histogram_opts, opts,
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
};

/// Histogram of transaction submission durations in seconds, labeled by
/// endpoint and name
pub static RPC_SEND_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec_with_registry!(
        histogram_opts!(
            "rpc_send_transaction_duration_seconds",
            "Duration of transaction submissions",
        ),
        &["endpoint", "name"],
        REGISTRY
    )
    .expect("metric registration should not fail")
});

/// Counter of transaction submissions, labeled by endpoint, name, and result
pub static RPC_SEND_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        opts!(
            "rpc_send_transaction_total",
            "Total number of transaction submissions",
        ),
        &["endpoint", "name", "result"],
        REGISTRY
    )
    .expect("metric registration should not fail")
});
