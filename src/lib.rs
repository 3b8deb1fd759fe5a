//! Scale-dependent fluctuation analysis of event samples.
//!
//! Each event is a set of sample values in a phase-space interval. The
//! interval is partitioned at a schedule of resolutions and the occupancy of
//! every sub-bin is accumulated event by event. After a single finalization
//! step the estimators report, per resolution:
//!
//! - bunching parameters `BP(q)` from the rates of sub-bins holding exactly
//!   `n` samples, with delta-method errors;
//! - raw and normalized factorial moments `F(q)`, `NF(q)`.
//!
//! [`tasks::ScalingAnalysis`] drives estimators from an
//! [`streams::EventStream`]; [`config`] builds the whole pipeline from JSON.

pub mod config;
pub mod core;
pub mod estimators;
pub mod evaluation;
pub mod streams;
pub mod tasks;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;
