//! abrbench Harness
//!
//! Everything that touches the outside world during an evaluation run:
//! - Starts and stops network profile scripts as subprocesses
//! - Drives a fresh browser session per test over the DevTools protocol
//! - Sequences the catalog and persists the scored report
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TestSequencer                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  run_one(test)                                              │
//! │    ├── ProfileRunner::start(script) -> ProfileGuard         │
//! │    ├── settle delay                                         │
//! │    ├── SessionDriver::run(url, window) -> RawSessionMetrics │
//! │    │     ├── SessionWorkspace (temp profile dir)            │
//! │    │     ├── BrowserLauncher -> BrowserSession              │
//! │    │     └── telemetry snapshot (contract v1)               │
//! │    └── ProfileGuard::stop()                                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  run_all(catalog) -> ResultSet                              │
//! │  ResultReport::build + ResultPersister::save                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod chromium;
pub mod config;
pub mod error;
pub mod persist;
pub mod profile;
pub mod sequencer;
pub mod session;
pub mod telemetry;

pub use chromium::ChromiumLauncher;
pub use config::{HarnessConfig, Timings};
pub use error::{HarnessError, HarnessResult};
pub use persist::ResultPersister;
pub use profile::{ActiveProfile, ProfileGuard, ProfileRunner};
pub use sequencer::{SequencerConfig, TestSequencer};
pub use session::{
    BrowserLauncher, BrowserSession, LaunchOptions, SessionDriver, SessionTimeouts,
    SessionWorkspace,
};
