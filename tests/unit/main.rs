//! Unit Tests
//!
//! Public-API checks that need files or the process environment.

#[path = "../common/mod.rs"]
mod common;

mod config_loading;
