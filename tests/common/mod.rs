// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]
#![allow(dead_code)]

//! Common test utilities and fixtures shared across all test targets
//!
//! This module provides BridgeCluster builders plus in-memory stand-ins
//! for the resource store and the provider API.
//!
//! # Usage
//!
//! Include this module in your test file:
//! ```rust,ignore
//! #[path = "../common/mod.rs"]
//! mod common;
//! use common::*;
//! ```

mod fakes;

pub use fakes::*;
pub use fixtures::*;
