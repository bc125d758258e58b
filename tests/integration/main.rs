//! Integration Tests
//!
//! End-to-end flows through the decision core, the gRPC surface and the
//! Workload API client.

#[path = "../common/mod.rs"]
mod common;

mod svid_validation;
mod workload_source;
