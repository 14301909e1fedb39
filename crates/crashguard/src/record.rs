//! Core crash record types for crashguard.
//!
//! This module defines the data structures written to, and read back from,
//! the crash report file.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Toolchain version recorded by the build script.
const RUSTC_VERSION: &str = env!("CRASHGUARD_RUSTC_VERSION");

/// Description of the environment a crash happened in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Operating system family (e.g. `linux`, `macos`).
    pub os: String,
    /// CPU architecture (e.g. `x86_64`, `aarch64`).
    pub architecture: String,
    /// Version of the toolchain the program was built with.
    #[serde(alias = "go_version")]
    pub rust_version: String,
}

impl SystemInfo {
    /// Collect information about the current process.
    #[must_use]
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            rust_version: RUSTC_VERSION.to_string(),
        }
    }
}

/// A single captured panic.
///
/// Records are created once, at the moment a panic is recovered, and are
/// never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashRecord {
    /// When the panic was captured.
    pub timestamp: DateTime<Utc>,

    /// Human-readable description of the panic.
    #[serde(rename = "error")]
    pub message: String,

    /// Call stack at the time of the panic.
    #[serde(rename = "stack", default)]
    pub stack_trace: String,

    /// Environment details, present only when collection was enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_info: Option<SystemInfo>,

    /// Caller-supplied key/value pairs.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl CrashRecord {
    /// Create a record timestamped now, without system info or metadata.
    #[must_use]
    pub fn new(message: impl Into<String>, stack_trace: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            stack_trace: stack_trace.into(),
            system_info: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach information about the current environment.
    #[must_use]
    pub fn with_system_info(mut self) -> Self {
        self.system_info = Some(SystemInfo::current());
        self
    }

    /// Attach caller metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}
