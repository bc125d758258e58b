//! Observability Module
//!
//! Structured logging setup and Prometheus metrics.

pub mod metrics;
pub mod telemetry;

pub use metrics::{CheckMetrics, InFlightGuard};
pub use telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};
