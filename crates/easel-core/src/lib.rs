//! # easel-core
//!
//! Core types for the Easel browser action engine: the flat-file exchange
//! store shared with the control surface, the running configuration,
//! collision-avoided artifact naming and the unified error type.
//!
//! Nothing in this crate touches a browser; everything here is testable
//! with plain files.

mod config;
mod error;
mod exchange;
pub mod markers;
mod naming;

pub use config::{sync_engine_version, EngineConfig, DEFAULT_URL};
pub use error::{EaselError, Result};
pub use exchange::{
    CountersRecord, ExchangePaths, Mailbox, ScrapeResult, TaskAction, TaskRecord,
};
pub use naming::ArtifactNamer;
