//! Cancellable timer queue
//!
//! Every delayed action the orchestrator takes (countdown ticks, jaw
//! open/close, word display, subtitle clearing) is a `TimerTask` sitting in
//! this queue. The owner polls `pop_due` from its event loop and uses
//! `time_until_next` as the poll timeout.

use log::debug;
use std::time::Duration;

/// Handle returned by `schedule`, used to cancel a single timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Timers are cancelled together by group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerGroup {
    /// Auto-submit countdown ticks
    Countdown,
    /// Jaw open/close and word display for the active utterance
    Animation,
    /// Subtitle clear timer
    Subtitle,
    /// Queue drain notification for streamed playback
    Playback,
}

/// What to do when a timer expires
#[derive(Debug, Clone, PartialEq)]
pub enum TimerTask {
    CountdownTick,
    JawOpen(String),
    JawClose(String),
    DisplayWord(String),
    ClearSubtitles,
    QueueDrained,
}

#[derive(Debug)]
struct Entry {
    id: TimerId,
    due_ms: f64,
    group: TimerGroup,
    task: TimerTask,
}

/// A timer that has come due
#[derive(Debug, Clone, PartialEq)]
pub struct Expired {
    pub id: TimerId,
    pub due_ms: f64,
    pub group: TimerGroup,
    pub task: TimerTask,
}

/// Single-threaded timer queue
#[derive(Debug, Default)]
pub struct TimerQueue {
    entries: Vec<Entry>,
    next_id: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` to run `delay_ms` after `now_ms`
    ///
    /// Negative delays are clamped so the task runs on the next poll.
    pub fn schedule(&mut self, now_ms: f64, delay_ms: f64, group: TimerGroup, task: TimerTask) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let due_ms = now_ms + delay_ms.max(0.0);
        debug!("Timer {:?} scheduled at {:.1}ms: {:?}", id, due_ms, task);
        self.entries.push(Entry {
            id,
            due_ms,
            group,
            task,
        });
        id
    }

    /// Cancel one timer; returns false if it already fired or was cancelled
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        before != self.entries.len()
    }

    /// Cancel every timer in `group`, returning how many were pending
    pub fn cancel_group(&mut self, group: TimerGroup) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.group != group);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!("Cancelled {} {:?} timers", removed, group);
        }
        removed
    }

    /// Drop every pending timer
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Remove and return the earliest timer due at or before `now_ms`
    ///
    /// Ties are broken by scheduling order.
    pub fn pop_due(&mut self, now_ms: f64) -> Option<Expired> {
        let idx = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.due_ms <= now_ms)
            .min_by(|(_, a), (_, b)| a.due_ms.total_cmp(&b.due_ms).then(a.id.0.cmp(&b.id.0)))
            .map(|(i, _)| i)?;

        let entry = self.entries.remove(idx);
        Some(Expired {
            id: entry.id,
            due_ms: entry.due_ms,
            group: entry.group,
            task: entry.task,
        })
    }

    /// Time until the next timer is due, or None when nothing is pending
    pub fn time_until_next(&self, now_ms: f64) -> Option<Duration> {
        let next = self
            .entries
            .iter()
            .map(|e| e.due_ms)
            .min_by(|a, b| a.total_cmp(b))?;
        let wait = (next - now_ms).max(0.0);
        Some(Duration::from_micros((wait * 1000.0).ceil() as u64))
    }

    /// Number of pending timers in `group`
    pub fn pending_in(&self, group: TimerGroup) -> usize {
        self.entries.iter().filter(|e| e.group == group).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
