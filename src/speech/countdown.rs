//! Debounced auto-submit countdown
//!
//! Runs as a chain of `CountdownTick` timers. Each tick reports the
//! remaining time; the last one reports zero and asks for submission.

use crate::events::{Dispatch, OutboundEvent};
use crate::timers::{TimerGroup, TimerId, TimerTask};
use log::debug;

/// Interval between countdown updates
pub const TICK_MS: i64 = 100;

/// One live countdown run
#[derive(Debug, Clone, Copy)]
struct Run {
    total_ms: i64,
    remaining_ms: i64,
    handle: TimerId,
}

/// Countdown driving auto-submit; at most one run is live at a time
#[derive(Debug, Default)]
pub struct CountdownScheduler {
    run: Option<Run>,
}

impl CountdownScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh countdown of `total_ms`, superseding any live run
    pub fn schedule(&mut self, total_ms: u64, cx: &mut Dispatch<'_>) {
        if let Some(run) = self.run.take() {
            cx.timers.cancel(run.handle);
            debug!("Countdown superseded with {}ms remaining", run.remaining_ms);
        }

        let total_ms = total_ms as i64;
        cx.emit(OutboundEvent::AutoSubmitCountdown {
            seconds: to_seconds(total_ms),
        });

        let handle = cx.after(TICK_MS.min(total_ms) as f64, TimerGroup::Countdown, TimerTask::CountdownTick);
        self.run = Some(Run {
            total_ms,
            remaining_ms: total_ms,
            handle,
        });
        debug!("Countdown scheduled for {}ms", total_ms);
    }

    /// Stop any live run and reset the progress indicator to zero
    pub fn cancel(&mut self, cx: &mut Dispatch<'_>) {
        if let Some(run) = self.run.take() {
            cx.timers.cancel(run.handle);
            debug!("Countdown cancelled with {}ms remaining", run.remaining_ms);
        }
        cx.emit(OutboundEvent::AutoSubmitCountdown { seconds: 0.0 });
    }

    /// Handle an expired tick; returns true exactly once per run, when the
    /// countdown reaches zero and the caller must submit
    pub fn on_tick(&mut self, cx: &mut Dispatch<'_>) -> bool {
        let Some(mut run) = self.run.take() else {
            debug!("Stray countdown tick ignored");
            return false;
        };

        let step = TICK_MS.min(run.remaining_ms);
        run.remaining_ms -= step;

        if run.remaining_ms <= 0 {
            cx.emit(OutboundEvent::AutoSubmitCountdown { seconds: 0.0 });
            debug!("Countdown of {}ms complete", run.total_ms);
            return true;
        }

        cx.emit(OutboundEvent::AutoSubmitCountdown {
            seconds: to_seconds(run.remaining_ms),
        });
        run.handle = cx.after(TICK_MS.min(run.remaining_ms) as f64, TimerGroup::Countdown, TimerTask::CountdownTick);
        self.run = Some(run);
        false
    }

    pub fn is_pending(&self) -> bool {
        self.run.is_some()
    }

    /// Milliseconds left on the live run
    pub fn remaining_ms(&self) -> Option<u64> {
        self.run.map(|r| r.remaining_ms.max(0) as u64)
    }
}

/// Seconds rounded to one decimal place
fn to_seconds(ms: i64) -> f64 {
    (ms.max(0) as f64 / 100.0).round() / 10.0
}
