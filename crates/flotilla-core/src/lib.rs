//! Flotilla Core - release model and pure reconciliation logic
//!
//! This crate provides the synchronous building blocks used by the deployment engine:
//! - `ReleaseSpec`: one chart bound to one environment, with its dependency edges
//! - `chart_set`: charts files, multi-file merge and `chart=version` overrides
//! - `graph`: referential integrity and cycle detection
//! - `delta`: desired vs installed reconciliation
//! - `diff`: version differences between two environments

pub mod chart_set;
pub mod delta;
pub mod diff;
pub mod error;
pub mod graph;
pub mod release;

pub use chart_set::{
    ChartEntry, ChartsFile, apply_overrides, parse_override, releases_from_overrides, resolve,
};
pub use delta::delta;
pub use diff::{Diff, diff};
pub use error::{CoreError, Result};
pub use graph::{has_cycle, validate};
pub use release::{ReleaseSpec, default_release_name};
