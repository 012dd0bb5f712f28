//! Completion primitives for the journal
//!
//! Every asynchronous journal operation reports back through a one-shot
//! [`Completion`] carrying a [`Status`]. Completions are never invoked on the
//! stack of the caller that registered them: they are handed to a
//! [`Finisher`], which runs them in FIFO order on its own thread.
//!
//! # Primitives
//!
//! - `Status` - errno-style result code (0 = success)
//! - `Completion` - boxed one-shot callback
//! - `CompletionSignal` - a completion that a thread can block on
//! - `Finisher` - ordered off-stack executor
//! - `GatherBuilder` - fan-out/fan-in join over several sub-completions

mod finisher;
mod gather;

pub use finisher::Finisher;
pub use gather::GatherBuilder;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Result code delivered to a completion.
///
/// Zero is success. Failures use negative errno-style codes so that status
/// values can cross the storage backend boundary unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(i32);

impl Status {
    /// Success.
    pub const OK: Status = Status(0);
    /// I/O error reported by the storage backend.
    pub const EIO: Status = Status(-5);
    /// Invalid argument or state.
    pub const EINVAL: Status = Status(-22);
    /// Journal is read-only after a write failure.
    pub const EROFS: Status = Status(-30);
    /// A bounded wait gave up.
    pub const ETIMEDOUT: Status = Status(-110);
    /// Operation cancelled by shutdown.
    pub const ECANCELED: Status = Status(-125);

    /// Wrap a raw status code.
    pub const fn from_code(code: i32) -> Self {
        Status(code)
    }

    /// Raw status code.
    pub const fn code(self) -> i32 {
        self.0
    }

    /// Whether this status is success.
    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }

    /// Whether this status is a failure.
    pub const fn is_err(self) -> bool {
        self.0 != 0
    }

    fn name(self) -> Option<&'static str> {
        match self.0 {
            0 => Some("OK"),
            -5 => Some("EIO"),
            -22 => Some("EINVAL"),
            -30 => Some("EROFS"),
            -110 => Some("ETIMEDOUT"),
            -125 => Some("ECANCELED"),
            _ => None,
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::OK
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

/// A one-shot callback receiving a [`Status`].
///
/// Consuming `complete` guarantees a completion runs at most once. Dropping
/// a completion without completing it is allowed; the callback simply never
/// runs.
pub struct Completion {
    callback: Box<dyn FnOnce(Status) + Send + 'static>,
}

impl Completion {
    /// Create a completion from a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Status) + Send + 'static,
    {
        Self {
            callback: Box::new(f),
        }
    }

    /// A completion that ignores its status.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Fire the completion on the current thread.
    ///
    /// Journal code never calls this directly for caller-registered
    /// completions; it queues them on the [`Finisher`] instead.
    pub fn complete(self, status: Status) {
        (self.callback)(status)
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Completion")
    }
}

/// A completion a thread can wait on.
///
/// `CompletionSignal::new` returns the waitable half and the [`Completion`]
/// to hand to the journal.
#[derive(Clone)]
pub struct CompletionSignal {
    inner: Arc<SignalInner>,
}

struct SignalInner {
    status: Mutex<Option<Status>>,
    fired: Condvar,
}

impl CompletionSignal {
    /// Create a signal and its completion.
    pub fn new() -> (Self, Completion) {
        let inner = Arc::new(SignalInner {
            status: Mutex::new(None),
            fired: Condvar::new(),
        });
        let target = Arc::clone(&inner);
        let completion = Completion::new(move |status| {
            let mut slot = target.status.lock();
            *slot = Some(status);
            target.fired.notify_all();
        });
        (Self { inner }, completion)
    }

    /// Status if the completion has fired.
    pub fn try_status(&self) -> Option<Status> {
        *self.inner.status.lock()
    }

    /// Whether the completion has fired.
    pub fn is_fired(&self) -> bool {
        self.try_status().is_some()
    }

    /// Block until the completion fires.
    pub fn wait(&self) -> Status {
        let mut slot = self.inner.status.lock();
        loop {
            if let Some(status) = *slot {
                return status;
            }
            self.inner.fired.wait(&mut slot);
        }
    }

    /// Block until the completion fires or the timeout elapses.
    ///
    /// Returns `None` on timeout.
    pub fn wait_for(&self, timeout: Duration) -> Option<Status> {
        let mut slot = self.inner.status.lock();
        if slot.is_none() {
            self.inner
                .fired
                .wait_while_for(&mut slot, |s| s.is_none(), timeout);
        }
        *slot
    }
}

impl fmt::Debug for CompletionSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSignal")
            .field("status", &self.try_status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_status_ok() {
        assert!(Status::OK.is_ok());
        assert!(!Status::OK.is_err());
        assert_eq!(Status::default(), Status::OK);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(Status::EIO.to_string(), "EIO (-5)");
        assert_eq!(Status::from_code(-99).to_string(), "-99");
    }

    #[test]
    fn test_signal_fires_once_with_status() {
        let (signal, completion) = CompletionSignal::new();
        assert!(!signal.is_fired());

        completion.complete(Status::EIO);

        assert_eq!(signal.try_status(), Some(Status::EIO));
        assert_eq!(signal.wait(), Status::EIO);
    }

    #[test]
    fn test_signal_wait_across_threads() {
        let (signal, completion) = CompletionSignal::new();
        let handle = thread::spawn(move || completion.complete(Status::OK));

        assert_eq!(signal.wait_for(Duration::from_secs(10)), Some(Status::OK));
        handle.join().unwrap();
    }

    #[test]
    fn test_signal_wait_times_out() {
        let (signal, _completion) = CompletionSignal::new();
        assert_eq!(signal.wait_for(Duration::from_millis(10)), None);
    }
}
