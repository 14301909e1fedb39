//! `crashguard` - Panic capture and crash report persistence
//!
//! This library recovers panics at chosen frame boundaries (including on
//! background threads and tokio tasks), reports them to a callback, and keeps
//! a JSON log of crash records that can be read back or cleared.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod error;
pub mod fault;
pub mod handler;
pub mod logging;
pub mod record;
pub mod store;
mod task;

pub use config::Config;
pub use error::{Error, Result};
pub use fault::{BoxError, PanicMessage};
pub use handler::{default_error_handler, ErrorHandler, HandlerOptions, PanicHandler};
pub use logging::init_logging;
pub use record::{CrashRecord, SystemInfo};
pub use store::{CorruptFilePolicy, CrashStore};
