//! # mctx Testkit
//!
//! Test utilities for the mctx transaction engine.
//!
//! This crate provides:
//! - Fixtures wiring a manager to an inspectable in-memory engine
//! - Property-based test generators using proptest
//! - A model-checked transaction harness
//! - The reference transaction scenarios
//! - Concurrent stress workloads
//!
//! ## Usage
//!
//! ```rust
//! use mctx_testkit::prelude::*;
//!
//! with_test_engine(|fixture| {
//!     fixture.seed(DEFAULT_COLLECTION, &[("k", "v")]);
//!     assert_eq!(fixture.read(DEFAULT_COLLECTION, "k").as_deref(), Some("v"));
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod scenarios;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::scenarios::{run_all, Scenario, ScenarioReport, SCENARIOS};
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use scenarios::{run_all, run_scenario, Scenario, ScenarioReport, ScenarioResult, SCENARIOS};
pub use stress::*;
