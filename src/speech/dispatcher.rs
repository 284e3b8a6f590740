//! Jaw animation dispatcher
//!
//! Holds the single open/closed flag for the avatar's jaw, records every
//! movement in a bounded log, and coalesces display refreshes so a burst of
//! movements costs one redraw per frame.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Jaw movement direction; DOWN opens the mouth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JawDirection {
    Down,
    Up,
}

impl fmt::Display for JawDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JawDirection::Down => write!(f, "DOWN"),
            JawDirection::Up => write!(f, "UP"),
        }
    }
}

/// One logged jaw movement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovementEntry {
    pub at_ms: f64,
    pub direction: JawDirection,
    pub word: String,
}

/// Oscilloscope-style trace of jaw state changes
///
/// New points enter at the right edge and the cursor walks left by a fixed
/// step for each accepted change.
#[derive(Debug, Clone)]
pub struct Oscilloscope {
    state: JawDirection,
    word: String,
    cursor_x: i32,
    points: Vec<ScopePoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScopePoint {
    pub state: JawDirection,
    pub word: String,
    pub x: i32,
}

impl Oscilloscope {
    pub const STEP_PX: i32 = 20;
    /// Points at or left of this are dropped
    pub const CUTOFF_PX: i32 = -100;

    pub fn new(width: i32) -> Self {
        Self {
            state: JawDirection::Up,
            word: String::new(),
            cursor_x: width,
            points: Vec::new(),
        }
    }

    /// Record a state; repeats of the current state and word are filtered
    pub fn add(&mut self, state: JawDirection, word: &str) -> bool {
        if state == self.state && word == self.word {
            return false;
        }
        self.cursor_x -= Self::STEP_PX;
        self.points.push(ScopePoint {
            state,
            word: word.to_string(),
            x: self.cursor_x,
        });
        self.points.retain(|p| p.x > Self::CUTOFF_PX);
        self.state = state;
        self.word = word.to_string();
        true
    }

    pub fn points(&self) -> &[ScopePoint] {
        &self.points
    }

    pub fn state(&self) -> JawDirection {
        self.state
    }
}

/// Jaw state, movement log and display throttling
#[derive(Debug)]
pub struct AnimationDispatcher {
    is_open: bool,
    current_word: String,
    log: VecDeque<MovementEntry>,
    capacity: usize,
    refresh_pending: bool,
    scope: Option<Oscilloscope>,
}

impl AnimationDispatcher {
    pub fn new(capacity: usize, scope: Option<Oscilloscope>) -> Self {
        Self {
            is_open: false,
            current_word: String::new(),
            log: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            refresh_pending: false,
            scope,
        }
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn current_word(&self) -> &str {
        &self.current_word
    }

    /// Open the jaw on `word`; returns false if it was already open
    pub fn open(&mut self, word: &str, at_ms: f64) -> bool {
        if self.is_open {
            return false;
        }
        self.is_open = true;
        self.current_word = word.to_string();
        self.record(JawDirection::Down, word.to_string(), at_ms);
        true
    }

    /// Close the jaw; returns false if it was not open
    pub fn close(&mut self, at_ms: f64) -> bool {
        if !self.is_open {
            return false;
        }
        self.is_open = false;
        let word = std::mem::take(&mut self.current_word);
        self.record(JawDirection::Up, word, at_ms);
        true
    }

    fn record(&mut self, direction: JawDirection, word: String, at_ms: f64) {
        if let Some(scope) = self.scope.as_mut() {
            scope.add(direction, &word);
        }
        if self.log.len() == self.capacity {
            self.log.pop_front();
        }
        self.log.push_back(MovementEntry { at_ms, direction, word });
        self.refresh_pending = true;
    }

    /// Movement log, oldest first
    pub fn log(&self) -> impl DoubleEndedIterator<Item = &MovementEntry> + ExactSizeIterator {
        self.log.iter()
    }

    /// Called once per animation frame
    ///
    /// Returns the log newest-first if anything changed since the last
    /// frame, however many movements happened in between.
    pub fn take_frame(&mut self) -> Option<Vec<MovementEntry>> {
        if !self.refresh_pending {
            return None;
        }
        self.refresh_pending = false;
        Some(self.log.iter().rev().cloned().collect())
    }

    pub fn oscilloscope(&self) -> Option<&Oscilloscope> {
        self.scope.as_ref()
    }
}
