//! Seek-request coalescing.
//!
//! Rapid, overlapping seek calls must neither queue without bound nor thrash
//! the external source. The coordinator keeps at most one seek outstanding
//! and one pending; a later pending request overwrites an earlier one
//! (latest wins), so the final requested position is always the one
//! eventually reached.

use std::time::Duration;

/// A seek against the external media source.
///
/// Two requests are equal iff all four fields match; a pending request that
/// structurally equals the one just completed is dropped without re-issuing.
#[derive(Debug, Clone, PartialEq)]
pub struct SeekRequest {
    /// Target media time
    pub target: Duration,
    /// How far before the target the source may land
    pub tolerance_before: Duration,
    /// How far after the target the source may land
    pub tolerance_after: Duration,
    /// Whether playback resumes once this seek completes
    pub resume_after_seek: bool,
}

impl SeekRequest {
    /// An exact seek (zero tolerance).
    pub fn exact(target: Duration, resume_after_seek: bool) -> Self {
        Self {
            target,
            tolerance_before: Duration::ZERO,
            tolerance_after: Duration::ZERO,
            resume_after_seek,
        }
    }

    /// A seek with a symmetric tolerance window around the target.
    pub fn with_tolerance(target: Duration, tolerance: Duration, resume_after_seek: bool) -> Self {
        Self {
            target,
            tolerance_before: tolerance,
            tolerance_after: tolerance,
            resume_after_seek,
        }
    }
}

/// Coordinator state: a seek call to the external source is outstanding
/// exactly while `Seeking`.
#[derive(Debug, Clone, PartialEq)]
enum SeekState {
    Idle,
    Seeking(SeekRequest),
}

/// Outcome of completing the active seek.
#[derive(Debug, Clone, PartialEq)]
pub struct SeekCompletion {
    /// True when playback should resume now: the finished request asked for
    /// it and no differing request superseded it in the meantime.
    pub resume: bool,
    /// A coalesced follow-up request the caller must issue immediately.
    pub follow_up: Option<SeekRequest>,
}

impl SeekCompletion {
    fn none() -> Self {
        Self {
            resume: false,
            follow_up: None,
        }
    }
}

/// State machine coalescing concurrent seek requests.
///
/// The coordinator does no I/O itself: `request` and `complete` tell the
/// caller which request to actually issue against the external source.
#[derive(Debug, Default)]
pub struct SeekCoordinator {
    state: SeekState,
    pending: Option<SeekRequest>,
}

impl Default for SeekState {
    fn default() -> Self {
        SeekState::Idle
    }
}

impl SeekCoordinator {
    /// Creates an idle coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts a seek request.
    ///
    /// Returns `Some(request)` when the caller must issue it against the
    /// external source immediately (the coordinator was idle). While a seek
    /// is outstanding the request is stored as pending instead, overwriting
    /// any earlier pending request.
    pub fn request(&mut self, request: SeekRequest) -> Option<SeekRequest> {
        match self.state {
            SeekState::Idle => {
                self.state = SeekState::Seeking(request.clone());
                Some(request)
            }
            SeekState::Seeking(_) => {
                if self.pending.is_some() {
                    tracing::trace!("seek pending overwritten by {:?}", request.target);
                }
                self.pending = Some(request);
                None
            }
        }
    }

    /// Processes the external source's completion callback for `finished`.
    ///
    /// Seek failure is treated identically to success here; retry policy
    /// belongs to the source. A completion that does not match the active
    /// request is stale (superseded or arriving after a stop) and is ignored.
    ///
    /// When a differing pending request exists it becomes the new active
    /// request and is returned as `follow_up` (still seeking); resume
    /// semantics then apply to the follow-up's own completion, never to this
    /// one. A pending request equal to `finished` is dropped without
    /// re-issuing.
    pub fn complete(&mut self, finished: &SeekRequest) -> SeekCompletion {
        let SeekState::Seeking(ref active) = self.state else {
            tracing::debug!("stale seek completion while idle: {:?}", finished.target);
            return SeekCompletion::none();
        };
        if active != finished {
            tracing::debug!(
                "stale seek completion: finished {:?}, active {:?}",
                finished.target,
                active.target
            );
            return SeekCompletion::none();
        }

        match self.pending.take() {
            Some(pending) if pending != *finished => {
                self.state = SeekState::Seeking(pending.clone());
                SeekCompletion {
                    resume: false,
                    follow_up: Some(pending),
                }
            }
            _ => {
                self.state = SeekState::Idle;
                SeekCompletion {
                    resume: finished.resume_after_seek,
                    follow_up: None,
                }
            }
        }
    }

    /// True while a seek call to the external source is outstanding.
    pub fn is_seeking(&self) -> bool {
        matches!(self.state, SeekState::Seeking(_))
    }

    /// The request currently awaiting its pending turn, if any.
    pub fn pending(&self) -> Option<&SeekRequest> {
        self.pending.as_ref()
    }
}
