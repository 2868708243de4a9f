//! Deadline-bounded calls into external collaborators.
//!
//! A call runs on its own worker thread and the caller waits at most the
//! configured timeout. A call that misses its deadline is abandoned, not
//! cancelled: the worker keeps running until the collaborator returns and its
//! result is dropped. Abandoned workers still count as in flight, so a
//! collaborator that keeps hanging is cut off once [`Deadline::max_in_flight`]
//! workers are outstanding instead of piling up threads.

use crate::error::{ProtocolError, Result};
use log::warn;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

/// Default bound on concurrently running workers per wrapper.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// Timeout plus a bound on outstanding worker threads.
///
/// Clones share the in-flight counter.
#[derive(Debug, Clone)]
pub struct Deadline {
    timeout: Duration,
    max_in_flight: usize,
    in_flight: Arc<AtomicUsize>,
}

/// Decrements the in-flight counter when the worker finishes, even on panic.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Deadline {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// At least one worker is always allowed.
    #[must_use]
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Workers currently running, including abandoned ones.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Runs `call` against `inner` on a worker thread.
    ///
    /// # Errors
    /// [`ProtocolError::ExternalServiceUnavailable`] when the deadline passes,
    /// the worker cannot be started or dies, or too many workers are still
    /// running. Otherwise whatever `call` returned.
    pub fn run<C, T, F>(&self, inner: &Arc<C>, op: &'static str, call: F) -> Result<T>
    where
        C: Send + Sync + ?Sized + 'static,
        T: Send + 'static,
        F: FnOnce(&C) -> Result<T> + Send + 'static,
    {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard(Arc::clone(&self.in_flight));
        if running >= self.max_in_flight {
            warn!("Refusing {op}: {running} calls still running");
            return Err(ProtocolError::ExternalServiceUnavailable(format!(
                "{op} refused: {running} earlier calls still running"
            )));
        }

        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(inner);
        std::thread::Builder::new()
            .name(format!("deadline-{op}"))
            .spawn(move || {
                let _guard = guard;
                // Receiver may be gone after a timeout.
                let _ = tx.send(call(&inner));
            })
            .map_err(|e| {
                ProtocolError::ExternalServiceUnavailable(format!("failed to spawn {op}: {e}"))
            })?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!("{op} exceeded {:?}", self.timeout);
                Err(ProtocolError::ExternalServiceUnavailable(format!(
                    "{op} timed out after {} ms",
                    self.timeout.as_millis()
                )))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(
                ProtocolError::ExternalServiceUnavailable(format!("{op} worker terminated")),
            ),
        }
    }
}
