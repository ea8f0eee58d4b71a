//! Time-triggered playback callbacks.
//!
//! Observers are registered against a media time and fire once per playback
//! pass when the current time reaches their target. The registered
//! collection is kept sorted by descending target so due observers can be
//! popped off the tail without resorting on every tick.

use std::sync::Arc;
use std::time::Duration;

use smallvec::SmallVec;

/// Callback invoked when an observer's target time is reached.
pub type ObserverCallback = Arc<dyn Fn() + Send + Sync>;

/// Identity of a registered observer.
///
/// Zero is reserved for the synthetic end-boundary observer; controller
/// handles start at one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Identity of the synthetic end-boundary observer.
    pub const END_BOUNDARY: ObserverId = ObserverId(0);

    /// Creates an observer identity from a raw value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw identity value.
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

/// A time-triggered callback registration. Immutable after creation.
#[derive(Clone)]
pub struct TimeObserver {
    id: ObserverId,
    target: Duration,
    callback: ObserverCallback,
}

impl TimeObserver {
    /// Creates an observer firing at `target`.
    pub fn new(id: ObserverId, target: Duration, callback: ObserverCallback) -> Self {
        Self {
            id,
            target,
            callback,
        }
    }

    /// The observer's identity.
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// The media time at which this observer fires.
    pub fn target(&self) -> Duration {
        self.target
    }

    /// Invokes the callback.
    pub fn fire(&self) {
        (self.callback)();
    }
}

impl std::fmt::Debug for TimeObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeObserver")
            .field("id", &self.id)
            .field("target", &self.target)
            .finish()
    }
}

/// Ordered registration and per-pass consumption of time observers.
///
/// The registered collection holds every observer, sorted by descending
/// target. The active subset is rebuilt at the start of each playback pass
/// and is consumed as time advances; an observer fires at most once per
/// activation.
#[derive(Default)]
pub struct TimeObserverQueue {
    /// All registered observers, descending by target time
    registered: Vec<TimeObserver>,
    /// The consumable subset for the current playback pass
    active: Vec<TimeObserver>,
}

impl TimeObserverQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer, keeping the collection sorted by descending target.
    pub fn register(&mut self, observer: TimeObserver) {
        let at = self
            .registered
            .partition_point(|o| o.target() >= observer.target());
        self.registered.insert(at, observer);
    }

    /// Removes an observer from the registered collection and, if present,
    /// from the active subset. Returns true if anything was removed.
    ///
    /// Once unregistered the observer can never fire, even if its target has
    /// not yet passed.
    pub fn unregister(&mut self, id: ObserverId) -> bool {
        let before = self.registered.len() + self.active.len();
        self.registered.retain(|o| o.id() != id);
        self.active.retain(|o| o.id() != id);
        before != self.registered.len() + self.active.len()
    }

    /// Rebuilds the active subset for a new playback pass.
    ///
    /// The subset is the optional end-boundary observer followed by every
    /// registered observer with a target at or past `start_boundary`,
    /// preserving descending order.
    pub fn reset_active(&mut self, start_boundary: Duration, end_observer: Option<TimeObserver>) {
        self.active.clear();
        if let Some(end) = end_observer {
            self.active.push(end);
        }
        self.active
            .extend(self.registered.iter().filter(|o| o.target() >= start_boundary).cloned());
        tracing::trace!(
            "reset_active: {} of {} observers active (start_boundary={:?})",
            self.active.len(),
            self.registered.len(),
            start_boundary
        );
    }

    /// Pops every active observer whose target is at or before `now`.
    ///
    /// Observers come off the tail (smallest remaining target first), so the
    /// returned batch is in non-decreasing target order and each observer is
    /// returned at most once per activation. The caller dispatches the batch
    /// on the delivery context.
    pub fn take_due(&mut self, now: Duration) -> SmallVec<[TimeObserver; 4]> {
        let mut due = SmallVec::new();
        while let Some(tail) = self.active.last() {
            if tail.target() > now {
                break;
            }
            if let Some(observer) = self.active.pop() {
                due.push(observer);
            }
        }
        due
    }

    /// Clears the active subset without touching registrations.
    pub fn clear_active(&mut self) {
        self.active.clear();
    }

    /// Number of registered observers.
    pub fn registered_len(&self) -> usize {
        self.registered.len()
    }

    /// Number of observers still consumable this pass.
    pub fn active_len(&self) -> usize {
        self.active.len()
    }
}
