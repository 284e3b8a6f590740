//! Playback queue clock for streamed synthesis
//!
//! The audio player plays decoded chunks back to back, with a fixed gap
//! between them. This clock tracks when everything queued so far will have
//! finished, so word events can be timed against playback rather than
//! against decode completion.

use log::debug;

/// Default silence inserted between synthesized chunks
pub const DEFAULT_GAP_MS: f64 = 300.0;

#[derive(Debug, Clone)]
pub struct ChunkQueueClock {
    queue_end_ms: f64,
    gap_ms: f64,
}

impl ChunkQueueClock {
    pub fn new(gap_ms: f64) -> Self {
        Self {
            queue_end_ms: 0.0,
            gap_ms,
        }
    }

    /// When the queued audio drains, in clock milliseconds
    pub fn queue_end_ms(&self) -> f64 {
        self.queue_end_ms
    }

    pub fn gap_ms(&self) -> f64 {
        self.gap_ms
    }

    pub fn is_drained(&self, now_ms: f64) -> bool {
        self.queue_end_ms <= now_ms
    }

    /// Start time of the next chunk to be queued
    ///
    /// An already drained queue is pulled up to `now_ms` first, so a late
    /// chunk never starts in the past.
    pub fn next_start(&mut self, now_ms: f64) -> f64 {
        if self.queue_end_ms < now_ms {
            self.queue_end_ms = now_ms;
        }
        self.queue_end_ms
    }

    /// Account for a chunk of `duration_ms` appended to the queue
    pub fn advance(&mut self, now_ms: f64, duration_ms: f64) -> f64 {
        let start = self.next_start(now_ms);
        self.queue_end_ms = start + duration_ms.max(0.0) + self.gap_ms;
        debug!(
            "Queue clock: chunk at {:.1}ms for {:.1}ms, drains at {:.1}ms",
            start, duration_ms, self.queue_end_ms
        );
        self.queue_end_ms
    }

    /// Forget queued audio, e.g. when playback is cancelled
    pub fn reset(&mut self, now_ms: f64) {
        self.queue_end_ms = now_ms;
    }
}

impl Default for ChunkQueueClock {
    fn default() -> Self {
        Self::new(DEFAULT_GAP_MS)
    }
}
