// Metrics and observability module
// This file handles collection and reporting of performance metrics
// for route execution and the JSON-RPC transport

use once_cell::sync::Lazy;
use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, HistogramVec};

pub static RPC_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "routeexec_rpc_latency_seconds",
        "latency for json-rpc calls",
        &["chain", "method"]
    )
    .unwrap()
});

pub static RPC_ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "routeexec_rpc_errors_total",
        "json-rpc errors by chain and method",
        &["chain", "method"]
    )
    .unwrap()
});

pub static TX_BUILT: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "routeexec_tx_built_total",
        "route transactions built, by processor",
        &["processor"]
    )
    .unwrap()
});

pub static TX_SENT: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "routeexec_tx_sent_total",
        "route transactions broadcast, by processor",
        &["processor"]
    )
    .unwrap()
});

pub static SEND_ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "routeexec_send_errors_total",
        "broadcast failures, by processor",
        &["processor"]
    )
    .unwrap()
});
