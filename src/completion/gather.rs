//! Fan-out/fan-in completion join
//!
//! A gather hands out one sub-completion per unit of work and fires a single
//! terminal completion once every sub-completion has fired and the gather
//! has been activated. The terminal status is the first failure reported by
//! any sub-completion, or `Status::OK`.
//!
//! Sub-completions may fire concurrently from any thread. The terminal
//! completion fires exactly once, on the thread that delivers the last
//! outstanding signal (or on the activating thread if nothing is pending).

use std::sync::Arc;

use parking_lot::Mutex;

use super::{Completion, Status};

#[derive(Default)]
struct GatherState {
    pending: usize,
    activated: bool,
    status: Status,
    on_finish: Option<Completion>,
}

impl GatherState {
    /// Take the terminal completion if the join is satisfied.
    fn take_ready(&mut self) -> Option<(Completion, Status)> {
        if self.activated && self.pending == 0 {
            self.on_finish.take().map(|c| (c, self.status))
        } else {
            None
        }
    }
}

/// Builder for a fan-out/fan-in join.
///
/// ```ignore
/// let mut gather = GatherBuilder::new();
/// let a = gather.new_sub();
/// let b = gather.new_sub();
/// gather.activate(Completion::new(|status| println!("all done: {}", status)));
/// a.complete(Status::OK);
/// b.complete(Status::OK); // terminal completion fires here
/// ```
pub struct GatherBuilder {
    state: Arc<Mutex<GatherState>>,
    subs: usize,
}

impl GatherBuilder {
    /// Create an empty gather.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(GatherState::default())),
            subs: 0,
        }
    }

    /// Register one more unit of work and return its sub-completion.
    pub fn new_sub(&mut self) -> Completion {
        self.state.lock().pending += 1;
        self.subs += 1;

        let state = Arc::clone(&self.state);
        Completion::new(move |status| {
            let ready = {
                let mut state = state.lock();
                debug_assert!(state.pending > 0, "gather sub fired twice");
                state.pending -= 1;
                if status.is_err() && state.status.is_ok() {
                    state.status = status;
                }
                state.take_ready()
            };
            if let Some((on_finish, status)) = ready {
                on_finish.complete(status);
            }
        })
    }

    /// Whether any sub-completion has been handed out.
    pub fn has_subs(&self) -> bool {
        self.subs > 0
    }

    /// Number of sub-completions handed out.
    pub fn num_subs(&self) -> usize {
        self.subs
    }

    /// Install the terminal completion and start waiting.
    ///
    /// If every sub-completion has already fired (or none were created) the
    /// terminal completion fires before this returns.
    pub fn activate(self, on_finish: Completion) {
        let ready = {
            let mut state = self.state.lock();
            assert!(!state.activated, "gather activated twice");
            state.activated = true;
            state.on_finish = Some(on_finish);
            state.take_ready()
        };
        if let Some((on_finish, status)) = ready {
            on_finish.complete(status);
        }
    }
}

impl Default for GatherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GatherBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatherBuilder")
            .field("subs", &self.subs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionSignal;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_empty_gather_fires_on_activate() {
        let gather = GatherBuilder::new();
        assert!(!gather.has_subs());

        let (signal, completion) = CompletionSignal::new();
        gather.activate(completion);

        assert_eq!(signal.try_status(), Some(Status::OK));
    }

    #[test]
    fn test_fires_after_last_sub() {
        let mut gather = GatherBuilder::new();
        let a = gather.new_sub();
        let b = gather.new_sub();
        assert_eq!(gather.num_subs(), 2);

        let (signal, completion) = CompletionSignal::new();
        gather.activate(completion);

        a.complete(Status::OK);
        assert!(!signal.is_fired());
        b.complete(Status::OK);
        assert_eq!(signal.try_status(), Some(Status::OK));
    }

    #[test]
    fn test_subs_completed_before_activate() {
        let mut gather = GatherBuilder::new();
        let a = gather.new_sub();
        a.complete(Status::OK);

        let (signal, completion) = CompletionSignal::new();
        gather.activate(completion);
        assert_eq!(signal.try_status(), Some(Status::OK));
    }

    #[test]
    fn test_first_failure_wins() {
        let mut gather = GatherBuilder::new();
        let subs: Vec<_> = (0..3).map(|_| gather.new_sub()).collect();

        let (signal, completion) = CompletionSignal::new();
        gather.activate(completion);

        let mut subs = subs.into_iter();
        subs.next().unwrap().complete(Status::OK);
        subs.next().unwrap().complete(Status::EIO);
        subs.next().unwrap().complete(Status::EINVAL);

        assert_eq!(signal.try_status(), Some(Status::EIO));
    }

    #[test]
    fn test_concurrent_subs_fire_terminal_once() {
        let mut gather = GatherBuilder::new();
        let subs: Vec<_> = (0..16).map(|_| gather.new_sub()).collect();

        let fired = Arc::new(Mutex::new(0usize));
        let (signal, completion) = CompletionSignal::new();
        let counter = Arc::clone(&fired);
        gather.activate(Completion::new(move |status| {
            *counter.lock() += 1;
            completion.complete(status);
        }));

        let handles: Vec<_> = subs
            .into_iter()
            .map(|sub| thread::spawn(move || sub.complete(Status::OK)))
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(signal.wait_for(Duration::from_secs(10)), Some(Status::OK));
        assert_eq!(*fired.lock(), 1);
    }
}
