//! Amplitude-driven jaw fallback
//!
//! When no syllable timing is used, the jaw can follow the playback level
//! instead: loud samples open it, quiet ones close it.

use std::collections::VecDeque;

/// Samples kept for graphing
pub const HISTORY_LEN: usize = 200;

#[derive(Debug)]
pub struct AmplitudeTracker {
    threshold: f32,
    history: VecDeque<f32>,
    active: bool,
}

impl AmplitudeTracker {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            history: VecDeque::with_capacity(HISTORY_LEN),
            active: false,
        }
    }

    pub fn start(&mut self) {
        self.active = true;
    }

    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Record a level; returns whether the jaw should be open, or None when
    /// analysis is stopped
    pub fn push(&mut self, level: f32) -> Option<bool> {
        if !self.active {
            return None;
        }
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(level);
        Some(level > self.threshold)
    }

    pub fn history(&self) -> impl Iterator<Item = f32> + '_ {
        self.history.iter().copied()
    }
}
