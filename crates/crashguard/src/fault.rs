//! Panic interception primitives.
//!
//! A guarded call runs inside [`std::panic::catch_unwind`]. Because the stack
//! has already unwound by the time `catch_unwind` returns, a process-wide panic
//! hook records the backtrace on the panicking thread while a guard is active
//! and hands it to the guard afterwards.
//!
//! While a guard is active the previously installed hook is not called, so the
//! usual "thread panicked at" message is not printed for guarded panics. That
//! also covers panics which code inside the guard catches on its own; those
//! are reported as `debug` events on the `crashguard::fault` target instead.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use thiserror::Error;
use tracing::debug;

/// A type-erased error value, as produced from a panic payload.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Text used when a panic payload carries no printable message.
const OPAQUE_PAYLOAD: &str = "Box<dyn Any>";

/// Error built from a panic payload that was not already an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct PanicMessage(pub String);

/// A recovered panic: the normalized error and the stack at the panic site.
#[derive(Debug)]
pub struct Fault {
    /// The panic payload as an error value.
    pub error: BoxError,
    /// Textual backtrace captured when the panic happened.
    pub stack: String,
}

thread_local! {
    /// Number of guards active on this thread.
    static GUARD_DEPTH: Cell<usize> = const { Cell::new(0) };
    /// Backtrace recorded by the hook for the most recent guarded panic.
    static LAST_STACK: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Marks the current thread as guarded for as long as it lives.
struct GuardScope;

impl GuardScope {
    fn enter() -> Self {
        GUARD_DEPTH.with(|depth| depth.set(depth.get() + 1));
        clear_stack();
        Self
    }
}

impl Drop for GuardScope {
    fn drop(&mut self) {
        GUARD_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Install the stack-recording panic hook once per process.
///
/// Panics raised outside any guard are forwarded to whichever hook was
/// installed before, so unguarded panics still print as usual.
pub(crate) fn install_hook() {
    static HOOK: Once = Once::new();

    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let guarded = GUARD_DEPTH.try_with(Cell::get).unwrap_or(0) > 0;
            if !guarded {
                previous(info);
                return;
            }

            let location = info
                .location()
                .map(|loc| format!("panicked at {}:{}:{}\n", loc.file(), loc.line(), loc.column()))
                .unwrap_or_default();
            debug!(
                payload = payload_text(info.payload()).unwrap_or(OPAQUE_PAYLOAD),
                location = location.trim_end(),
                "panic inside guard"
            );
            let stack = format!("{location}{}", Backtrace::force_capture());
            let _ = LAST_STACK.try_with(|slot| *slot.borrow_mut() = Some(stack));
        }));
    });
}

/// Run `f`, converting a panic into a [`Fault`].
pub(crate) fn catch<F, R>(f: F) -> Result<R, Fault>
where
    F: FnOnce() -> R,
{
    install_hook();

    let scope = GuardScope::enter();
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    drop(scope);

    match result {
        Ok(value) => {
            clear_stack();
            Ok(value)
        }
        Err(payload) => Err(Fault {
            error: normalize(payload),
            stack: take_stack(),
        }),
    }
}

/// Forget any stack left by a panic that was caught without a guard.
fn clear_stack() {
    let _ = LAST_STACK.try_with(RefCell::take);
}

/// Take the stack recorded by the hook, or capture one here if the hook
/// did not run (for example because another hook replaced it).
fn take_stack() -> String {
    LAST_STACK
        .with(RefCell::take)
        .unwrap_or_else(|| Backtrace::force_capture().to_string())
}

/// Turn a panic payload into an error value.
///
/// Payloads that already are errors are reused as-is; string payloads are
/// wrapped in a [`PanicMessage`].
#[must_use]
pub fn normalize(payload: Box<dyn Any + Send>) -> BoxError {
    let payload = match payload.downcast::<BoxError>() {
        Ok(err) => return *err,
        Err(payload) => payload,
    };
    let payload = match payload.downcast::<anyhow::Error>() {
        Ok(err) => return (*err).into(),
        Err(payload) => payload,
    };
    let payload = match payload.downcast::<std::io::Error>() {
        Ok(err) => return err,
        Err(payload) => payload,
    };
    let payload = match payload.downcast::<crate::Error>() {
        Ok(err) => return err,
        Err(payload) => payload,
    };

    let message = payload_text(payload.as_ref()).unwrap_or(OPAQUE_PAYLOAD);
    Box::new(PanicMessage(message.to_string()))
}

/// The message carried by a `&str` or `String` payload.
fn payload_text(payload: &(dyn Any + Send)) -> Option<&str> {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
}
