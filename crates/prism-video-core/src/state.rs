//! Playback state owned by the controller.

use std::time::Duration;

/// Externally visible playback phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    /// Scheduler inactive, no frames being pulled
    Stopped,
    /// Actively pulling and converting frames
    Playing,
    /// Scheduler active but playback rate is zero
    Paused,
}

/// Mutable playback configuration and status.
///
/// Mutated only by the controller's public operations, which all execute on
/// the serialized engine context.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    /// True while playback is intended to be running
    pub is_playing: bool,
    /// Configured playback rate (> 0)
    pub rate: f32,
    /// Whether source audio is muted
    pub is_muted: bool,
    /// Whether playback restarts from the start boundary at the end
    pub looping: bool,
    /// Optional trim-in point; playback and observers start here
    pub start_boundary: Option<Duration>,
    /// Optional trim-out point; reaching it ends (or loops) the pass
    pub end_boundary: Option<Duration>,
}

impl PlaybackState {
    /// Returns the effective start of playback (the start boundary, or zero).
    pub fn effective_start(&self) -> Duration {
        self.start_boundary.unwrap_or(Duration::ZERO)
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            is_playing: false,
            rate: 1.0,
            is_muted: false,
            looping: false,
            start_boundary: None,
            end_boundary: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_start() {
        let mut state = PlaybackState::default();
        assert_eq!(state.effective_start(), Duration::ZERO);

        state.start_boundary = Some(Duration::from_secs(3));
        assert_eq!(state.effective_start(), Duration::from_secs(3));
    }
}
