//! Error types for crashguard.
//!
//! This module defines the error taxonomy shared by the crash report store,
//! the configuration layer and the panic handler.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for crashguard operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Store Errors ===
    /// The store was built without a file path.
    #[error("no file path set for crash reports")]
    NoPathConfigured,

    /// The crash report file does not exist.
    #[error("crash report file not found: {path}")]
    NotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The crash report file does not contain a JSON array of records.
    #[error("failed to parse crash reports in {path}: {source}")]
    Parse {
        /// Path to the malformed file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Reading the crash report file failed.
    #[error("failed to read crash reports from {path}: {source}")]
    Read {
        /// Path to the crash report file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Writing the crash report file failed.
    #[error("failed to write crash reports to {path}: {source}")]
    Write {
        /// Path to the crash report file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An existing file was left untouched because it could not be parsed.
    #[error("refusing to overwrite malformed crash report file {path}")]
    CorruptFile {
        /// Path to the malformed file.
        path: PathBuf,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for crashguard operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Check if this error means the crash report file is missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error means no file path was configured.
    #[must_use]
    pub fn is_no_path(&self) -> bool {
        matches!(self, Self::NoPathConfigured)
    }

    /// Check if this error means the crash report file is malformed.
    #[must_use]
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }
}
