//! Guarded background tasks.
//!
//! Work launched here runs on its own thread (or tokio task) with the
//! handler's guard at the outermost frame, so a panic inside it is recovered
//! and dispatched instead of tearing the task down silently.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};

use tracing::error;

use crate::error::Result;
use crate::fault::{self, Fault};
use crate::handler::PanicHandler;

/// Name given to threads started by [`PanicHandler::spawn_guarded`].
const THREAD_NAME: &str = "crashguard-task";

impl PanicHandler {
    /// Run `f` on a new thread, recovering any panic it raises.
    ///
    /// The thread is fire-and-forget. The returned handle is only there for
    /// callers that want to wait; joining it never reports a panic.
    ///
    /// # Errors
    ///
    /// Returns an error if the operating system refuses to create the thread.
    pub fn spawn_guarded<F>(self: &Arc<Self>, f: F) -> Result<JoinHandle<()>>
    where
        F: FnOnce() + Send + 'static,
    {
        let handler = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                handler.guard(f);
            })?;
        Ok(handle)
    }

    /// Run `future` on the current tokio runtime, recovering any panic
    /// raised while it is polled.
    ///
    /// The error callback and the crash file write run on tokio's blocking
    /// pool, not on the worker that polled the future.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime, like [`tokio::spawn`].
    pub fn spawn_guarded_async<F>(self: &Arc<Self>, future: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handler = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(captured) = Guarded::new(future).await {
                let recovered =
                    tokio::task::spawn_blocking(move || handler.recover(captured)).await;
                if let Err(err) = recovered {
                    error!("Panic recovery task failed: {err}");
                }
            }
        })
    }
}

/// Future adapter that catches panics raised by `poll`.
struct Guarded<F> {
    inner: Pin<Box<F>>,
}

impl<F: Future> Guarded<F> {
    fn new(future: F) -> Self {
        Self {
            inner: Box::pin(future),
        }
    }
}

impl<F: Future> Future for Guarded<F> {
    type Output = std::result::Result<F::Output, Fault>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = self.get_mut().inner.as_mut();
        match fault::catch(|| inner.poll(cx)) {
            Ok(Poll::Ready(value)) => Poll::Ready(Ok(value)),
            Ok(Poll::Pending) => Poll::Pending,
            Err(captured) => Poll::Ready(Err(captured)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{mpsc, Mutex};
    use std::time::Duration;

    use crate::handler::HandlerOptions;

    fn counting_handler(count: &Arc<AtomicUsize>) -> Arc<PanicHandler> {
        let count = Arc::clone(count);
        Arc::new(PanicHandler::new(HandlerOptions::new().error_handler(
            move |_, _| {
                count.fetch_add(1, Ordering::SeqCst);
            },
        )))
    }

    #[test]
    fn test_spawn_guarded_recovers_panic() {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(&count);
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let handle = handler
            .spawn_guarded(move || {
                let fail = true;
                if fail {
                    panic!("test panic");
                }
                done_tx.send(()).unwrap();
            })
            .unwrap();

        assert!(handle.join().is_ok());
        assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_spawn_guarded_runs_to_completion() {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(&count);
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        handler
            .spawn_guarded(move || flag.store(true, Ordering::SeqCst))
            .unwrap()
            .join()
            .unwrap();

        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_spawn_guarded_names_thread() {
        let handler = Arc::new(PanicHandler::default());
        let name = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&name);

        handler
            .spawn_guarded(move || {
                *slot.lock().unwrap() = thread::current().name().map(str::to_string);
            })
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(name.lock().unwrap().as_deref(), Some(THREAD_NAME));
    }

    #[test]
    fn test_many_guarded_threads_share_handler() {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(&count);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                handler
                    .spawn_guarded(move || panic!("worker {i} failed"))
                    .unwrap()
            })
            .collect();
        for handle in handles {
            assert!(handle.join().is_ok());
        }

        assert_eq!(count.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn test_spawn_guarded_async_recovers_panic() {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(&count);

        let handle = handler.spawn_guarded_async(async {
            tokio::task::yield_now().await;
            panic!("async panic");
        });

        assert!(handle.await.is_ok());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_spawn_guarded_async_recovers_off_polling_thread() {
        let polled_on = thread::current().id();
        let recovered_on = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&recovered_on);
        let handler = Arc::new(PanicHandler::new(HandlerOptions::new().error_handler(
            move |_, _| {
                *slot.lock().unwrap() = Some(thread::current().id());
            },
        )));

        handler
            .spawn_guarded_async(async {
                panic!("async panic");
            })
            .await
            .unwrap();

        let recovered_on = recovered_on.lock().unwrap().take().unwrap();
        assert_ne!(recovered_on, polled_on);
    }

    #[tokio::test]
    async fn test_spawn_guarded_async_completes() {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(&count);
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        handler
            .spawn_guarded_async(async move {
                tokio::task::yield_now().await;
                flag.store(true, Ordering::SeqCst);
            })
            .await
            .unwrap();

        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
