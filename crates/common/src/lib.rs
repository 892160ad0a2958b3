//! abrbench Common Library
//!
//! Shared data model for the ABR evaluation harness: the test catalog, the
//! network capability table, the QoE scoring engine and the persisted report
//! schema. Nothing in here touches processes, browsers or the filesystem.

pub mod capability;
pub mod catalog;
pub mod error;
pub mod qoe;
pub mod report;
pub mod types;

// Re-export commonly used types
pub use capability::{CapabilityLookup, NetworkCapabilityProfile};
pub use catalog::{Catalog, TestConfiguration};
pub use error::{Error, Result};
pub use qoe::{score, ScoredSession};
pub use report::{ReportEntry, ReportMetrics, ResultReport};
pub use types::*;

/// abrbench version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default observation window per test, in seconds
pub const DEFAULT_DURATION_SECS: u64 = 60;
