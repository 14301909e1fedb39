//! Panic handler for crashguard.
//!
//! A [`PanicHandler`] recovers panics at a frame boundary, reports them to an
//! error callback, optionally records them in a [`CrashStore`], and optionally
//! terminates the process.
//!
//! # Example
//!
//! ```no_run
//! use crashguard::{HandlerOptions, PanicHandler};
//!
//! let handler = PanicHandler::new(
//!     HandlerOptions::new()
//!         .dump_to_file(true)
//!         .file_path("crashes.json")
//!         .include_system_info(true)
//!         .metadata([("service", "api")]),
//! );
//!
//! handler.guard(|| {
//!     panic!("boom");
//! });
//!
//! for report in handler.last_crash_reports(5).unwrap() {
//!     println!("{}: {}", report.timestamp, report.message);
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, error};

use crate::error::Result;
use crate::fault::{self, Fault};
use crate::record::CrashRecord;
use crate::store::{CorruptFilePolicy, CrashStore, DEFAULT_FILE_NAME};

/// Callback invoked with every recovered panic and its stack trace.
pub type ErrorHandler = Arc<dyn Fn(&(dyn std::error::Error + 'static), &str) + Send + Sync>;

/// Function used to terminate the process.
pub type ExitFn = Arc<dyn Fn(i32) + Send + Sync>;

/// Exit code used when terminating after a panic.
pub const PANIC_EXIT_CODE: i32 = 1;

/// Write the error and stack trace to standard error.
pub fn default_error_handler(err: &(dyn std::error::Error + 'static), stack: &str) {
    let mut stderr = io::stderr().lock();
    let _ = writeln!(
        stderr,
        "Recovered from panic:\nError: {err}\nStack Trace:\n{stack}"
    );
}

fn default_exit(code: i32) {
    std::process::exit(code);
}

/// Configuration for a [`PanicHandler`].
///
/// Toggles are last-wins; metadata supplied over several calls is merged.
#[derive(Clone)]
pub struct HandlerOptions {
    /// Custom error callback; the default prints to stderr.
    error_handler: Option<ErrorHandler>,
    /// Record each panic in the crash report file.
    pub dump_to_file: bool,
    /// Path to the crash report file.
    pub file_path: PathBuf,
    /// Terminate the process after handling a panic.
    pub exit_on_panic: bool,
    /// Include OS, architecture and toolchain version in crash reports.
    pub include_system_info: bool,
    /// Key/value pairs attached to every crash report.
    pub metadata: BTreeMap<String, String>,
    /// Clear the crash report file when the handler is created.
    pub wipe_file: bool,
    /// What to do when the crash report file is malformed.
    pub corrupt_file_policy: CorruptFilePolicy,
    /// Process termination function; `std::process::exit` by default.
    exit_fn: Option<ExitFn>,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            error_handler: None,
            dump_to_file: false,
            file_path: PathBuf::from(DEFAULT_FILE_NAME),
            exit_on_panic: false,
            include_system_info: false,
            metadata: BTreeMap::new(),
            wipe_file: false,
            corrupt_file_policy: CorruptFilePolicy::default(),
            exit_fn: None,
        }
    }
}

impl fmt::Debug for HandlerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerOptions")
            .field("custom_error_handler", &self.error_handler.is_some())
            .field("dump_to_file", &self.dump_to_file)
            .field("file_path", &self.file_path)
            .field("exit_on_panic", &self.exit_on_panic)
            .field("include_system_info", &self.include_system_info)
            .field("metadata", &self.metadata)
            .field("wipe_file", &self.wipe_file)
            .field("corrupt_file_policy", &self.corrupt_file_policy)
            .finish_non_exhaustive()
    }
}

impl HandlerOptions {
    /// Create options with every feature disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom error callback.
    #[must_use]
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&(dyn std::error::Error + 'static), &str) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Enable or disable recording panics in the crash report file.
    #[must_use]
    pub fn dump_to_file(mut self, enabled: bool) -> Self {
        self.dump_to_file = enabled;
        self
    }

    /// Set the crash report file path.
    #[must_use]
    pub fn file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = path.into();
        self
    }

    /// Enable or disable terminating the process after a panic.
    #[must_use]
    pub fn exit_on_panic(mut self, enabled: bool) -> Self {
        self.exit_on_panic = enabled;
        self
    }

    /// Enable or disable system information in crash reports.
    #[must_use]
    pub fn include_system_info(mut self, enabled: bool) -> Self {
        self.include_system_info = enabled;
        self
    }

    /// Merge key/value pairs into the crash report metadata.
    #[must_use]
    pub fn metadata<I, K, V>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.metadata
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Enable or disable clearing the crash report file at construction.
    #[must_use]
    pub fn wipe_file(mut self, enabled: bool) -> Self {
        self.wipe_file = enabled;
        self
    }

    /// Set the policy for malformed crash report files.
    #[must_use]
    pub fn corrupt_file_policy(mut self, policy: CorruptFilePolicy) -> Self {
        self.corrupt_file_policy = policy;
        self
    }

    /// Replace the function used to terminate the process.
    #[must_use]
    pub fn exit_fn<F>(mut self, exit: F) -> Self
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        self.exit_fn = Some(Arc::new(exit));
        self
    }

    /// Check whether a custom error callback is set.
    #[must_use]
    pub fn has_error_handler(&self) -> bool {
        self.error_handler.is_some()
    }
}

/// Recovers panics and dispatches them according to [`HandlerOptions`].
///
/// The handler keeps no per-call state and can guard any number of frames
/// on any number of threads at once.
pub struct PanicHandler {
    /// Configuration fixed at construction.
    options: HandlerOptions,
    /// Error callback, replaceable at runtime.
    error_handler: RwLock<ErrorHandler>,
    /// Process termination function.
    exit_fn: ExitFn,
    /// Metadata shared by every record this handler produces.
    metadata: Arc<BTreeMap<String, String>>,
    /// Crash report store at the configured path.
    store: CrashStore,
}

impl fmt::Debug for PanicHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PanicHandler")
            .field("options", &self.options)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl Default for PanicHandler {
    fn default() -> Self {
        Self::new(HandlerOptions::default())
    }
}

impl PanicHandler {
    /// Create a handler.
    ///
    /// When both `wipe_file` and `dump_to_file` are set the crash report file
    /// is cleared here. A failure to clear it is logged and otherwise ignored.
    #[must_use]
    pub fn new(mut options: HandlerOptions) -> Self {
        let error_handler = options
            .error_handler
            .take()
            .unwrap_or_else(|| Arc::new(default_error_handler));
        let exit_fn = options
            .exit_fn
            .take()
            .unwrap_or_else(|| Arc::new(default_exit));
        let metadata = Arc::new(options.metadata.clone());
        let store = CrashStore::new(options.file_path.clone())
            .with_corrupt_file_policy(options.corrupt_file_policy);

        if options.wipe_file && options.dump_to_file {
            if let Err(e) = store.wipe() {
                error!("Error wiping crash file: {e}");
            }
        }

        debug!(?options, "Panic handler created");
        Self {
            options,
            error_handler: RwLock::new(error_handler),
            exit_fn,
            metadata,
            store,
        }
    }

    /// Get the handler's configuration.
    #[must_use]
    pub fn options(&self) -> &HandlerOptions {
        &self.options
    }

    /// Get the crash report store.
    #[must_use]
    pub fn store(&self) -> &CrashStore {
        &self.store
    }

    /// Replace the error callback.
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&(dyn std::error::Error + 'static), &str) + Send + Sync + 'static,
    {
        *self
            .error_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(handler);
    }

    /// Run `f`, recovering any panic it raises.
    ///
    /// Returns `Some` with the closure's result, or `None` if it panicked.
    /// A panic never propagates past this call; if `exit_on_panic` is set
    /// the exit function runs before `guard` returns.
    pub fn guard<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce() -> R,
    {
        match fault::catch(f) {
            Ok(value) => Some(value),
            Err(captured) => {
                self.recover(captured);
                None
            }
        }
    }

    /// Dispatch a recovered panic: callback, crash report, then exit.
    pub(crate) fn recover(&self, captured: Fault) {
        let Fault { error: err, stack } = captured;

        let callback: ErrorHandler = self
            .error_handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Err(nested) = fault::catch(|| callback(&*err, &stack)) {
            error!("Error handler panicked: {}", nested.error);
        }

        if self.options.dump_to_file {
            let mut record = CrashRecord::new(err.to_string(), stack)
                .with_metadata(self.metadata.as_ref().clone());
            if self.options.include_system_info {
                record = record.with_system_info();
            }
            self.store.append(&record);
        }

        if self.options.exit_on_panic {
            error!("Exiting after panic: {err}");
            (self.exit_fn)(PANIC_EXIT_CODE);
        }
    }

    /// Get the last `n` crash reports, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if no path is configured, the file does not exist,
    /// or its contents cannot be parsed.
    pub fn last_crash_reports(&self, n: usize) -> Result<Vec<CrashRecord>> {
        self.store.tail(n)
    }

    /// Clear all crash reports.
    ///
    /// # Errors
    ///
    /// Returns an error if no path is configured or the file cannot be written.
    pub fn wipe_crash_file(&self) -> Result<()> {
        self.store.wipe()
    }
}
