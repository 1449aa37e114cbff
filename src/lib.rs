//! Heat pump communication service (heatsrv)
//!
//! An async poller for Luxtronik-style heat pump controllers speaking the
//! binary socket protocol on TCP port 8889. The service periodically reads
//! the controller's register groups, decodes them into named engineering
//! values, derives efficiency metrics, and forwards updates to the output
//! boundary when a value changes or its heartbeat interval elapses. A small
//! write path lets operators change the handful of parameters the controller
//! accepts, with value validation and echo verification.
//!
//! # Architecture
//!
//! - **`protocol`**: command set, frame codec and the TCP client with its
//!   retry and echo-verification policy
//! - **`registers`**: the register table mapping (group, index) to named,
//!   unit-scaled fields, plus the writable-parameter value sets
//! - **`snapshot`**: one consistent decoded view per poll cycle, with
//!   derived fields (COP, temperature deltas)
//! - **`tracker`**: per-field update decisions (change detection, heartbeat)
//! - **`service`**: the poll loop, the write path and the update channel
//! - **`config`**: figment-based configuration (TOML + environment)

pub mod config;
pub mod error;
pub mod protocol;
pub mod registers;
pub mod service;
pub mod snapshot;
pub mod tracker;

pub use config::HeatSrvConfig;
pub use error::{HeatSrvError, Result};
pub use protocol::{ClientOptions, Command, LuxtronikClient, ReadKind};
pub use registers::{FieldValue, Unit};
pub use service::{FieldUpdate, PollService, ServiceHandle};
pub use snapshot::Snapshot;
pub use tracker::UpdateTracker;
