//! HTTP surface for genbroker: router, shared state and Prometheus metrics.

pub mod api;
pub mod metrics;
pub mod state;
