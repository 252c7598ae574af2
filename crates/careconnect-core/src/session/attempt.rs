//! Generation tracking for login and verification attempts.
//!
//! Each attempt gets a monotonically increasing generation. Only the most
//! recently issued attempt may apply its result; older completions are stale.

use tokio_util::sync::CancellationToken;

/// Generation number of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

/// Handle held by the task running an attempt.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub generation: Generation,
    /// Fires when the caller cancels or the session abandons the attempt.
    pub cancel: CancellationToken,
}

/// Latest-issued attempt tracker.
#[derive(Debug, Default)]
pub struct Attempts {
    issued: u64,
    in_flight: Option<Attempt>,
}

impl Attempts {
    /// Issues a new attempt linked to `parent`; it becomes the only one whose
    /// result may be applied.
    pub fn begin(&mut self, parent: &CancellationToken) -> Attempt {
        self.issued += 1;
        let attempt = Attempt {
            generation: Generation(self.issued),
            cancel: parent.child_token(),
        };
        self.in_flight = Some(attempt.clone());
        attempt
    }

    /// True while `generation` is the latest issued and not yet finished.
    pub fn is_current(&self, generation: Generation) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|a| a.generation == generation)
    }

    pub fn has_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Marks `generation` finished. Returns false for stale generations.
    pub fn finish(&mut self, generation: Generation) -> bool {
        if self.is_current(generation) {
            self.in_flight = None;
            true
        } else {
            false
        }
    }

    /// Cancels the in-flight attempt, if any; its result will be discarded.
    pub fn abort(&mut self) {
        if let Some(attempt) = self.in_flight.take() {
            attempt.cancel.cancel();
        }
    }
}
