//! Word timing allocation
//!
//! Turns word timing into jaw schedules. Timing arrives either explicitly
//! (start and duration per word, from the server) or as bare word-boundary
//! events, where a word's duration is only known once the next word starts.

use super::syllables;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Explicit timing for one word, relative to its chunk's start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedWord {
    pub word: String,
    pub start_ms: f64,
    #[serde(default)]
    pub duration_ms: Option<f64>,
}

/// Buffered boundary-derived timing for one word
#[derive(Debug, Clone, PartialEq)]
pub struct WordTiming {
    pub word: String,
    pub start_ms: f64,
    pub duration_ms: Option<f64>,
    pub processed: bool,
}

/// One open/close pair, offsets relative to the word's start
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyllableSlot {
    pub open_at_ms: f64,
    pub close_at_ms: f64,
}

/// Animation schedule for one word
#[derive(Debug, Clone, PartialEq)]
pub struct WordSchedule {
    pub word: String,
    pub start_ms: f64,
    pub slots: Vec<SyllableSlot>,
}

/// Settings shared by both allocation modes
#[derive(Debug, Clone, Copy)]
pub struct AllocatorSettings {
    /// Split words into syllables; otherwise each word is one slot
    pub syllable_timing: bool,
    /// Estimated length of one syllable of the final word
    pub last_word_syllable_ms: f64,
}

impl Default for AllocatorSettings {
    fn default() -> Self {
        Self {
            syllable_timing: true,
            last_word_syllable_ms: 150.0,
        }
    }
}

/// Allocator for one utterance's word timing
#[derive(Debug)]
pub struct WordTimingAllocator {
    buffer: VecDeque<WordTiming>,
    settings: AllocatorSettings,
}

impl WordTimingAllocator {
    pub fn new(settings: AllocatorSettings) -> Self {
        Self {
            buffer: VecDeque::new(),
            settings,
        }
    }

    /// Forget every buffered word
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Words still buffered (the latest word stays until its successor or the end)
    pub fn buffered(&self) -> impl Iterator<Item = &WordTiming> {
        self.buffer.iter()
    }

    /// Record that synthesis started speaking `word` at `start_ms`
    ///
    /// Returns the schedule of the previous word, whose duration is now known.
    pub fn push_boundary(&mut self, word: &str, start_ms: f64) -> Option<WordSchedule> {
        self.buffer.push_back(WordTiming {
            word: word.to_string(),
            start_ms,
            duration_ms: None,
            processed: false,
        });

        let len = self.buffer.len();
        if len < 2 {
            return None;
        }

        let next_start = self.buffer[len - 1].start_ms;
        let prev = &mut self.buffer[len - 2];
        let schedule = if prev.processed {
            None
        } else {
            let duration = (next_start - prev.start_ms).max(0.0);
            prev.duration_ms = Some(duration);
            prev.processed = true;
            Some(self.split(&self.buffer[len - 2].word, self.buffer[len - 2].start_ms, duration, true))
        };

        // Keep only the newest word; everything before it has been processed
        while self.buffer.len() > 1 && self.buffer.front().map_or(false, |w| w.processed) {
            self.buffer.pop_front();
        }
        schedule
    }

    /// The utterance ended; schedule the final word from an estimated duration
    pub fn finish(&mut self) -> Option<WordSchedule> {
        let schedule = match self.buffer.back_mut() {
            Some(last) if !last.processed => {
                let syllables = if self.settings.syllable_timing {
                    syllables::count(&last.word).max(1)
                } else {
                    1
                };
                let duration = syllables as f64 * self.settings.last_word_syllable_ms;
                last.duration_ms = Some(duration);
                last.processed = true;
                let (word, start) = (last.word.clone(), last.start_ms);
                Some(self.split(&word, start, duration, false))
            }
            _ => None,
        };
        self.buffer.clear();
        schedule
    }

    /// Schedules for words with server-supplied timing
    ///
    /// Each word is a single slot. A missing duration runs until the next
    /// word starts, or until `total_ms` for the last word.
    pub fn explicit(&self, words: &[TimedWord], total_ms: f64) -> Vec<WordSchedule> {
        words
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let duration = w.duration_ms.unwrap_or_else(|| {
                    let end = words.get(i + 1).map_or(total_ms, |next| next.start_ms);
                    end - w.start_ms
                });
                let duration = duration.max(0.0);
                WordSchedule {
                    word: w.word.clone(),
                    start_ms: w.start_ms,
                    slots: vec![SyllableSlot {
                        open_at_ms: 0.0,
                        close_at_ms: duration / 2.0,
                    }],
                }
            })
            .collect()
    }

    /// Divide `duration` into syllable slots
    ///
    /// With `trailing_pause`, one extra slot is reserved for the gap before
    /// the next word and left unused.
    fn split(&self, word: &str, start_ms: f64, duration: f64, trailing_pause: bool) -> WordSchedule {
        let syllables = if self.settings.syllable_timing {
            syllables::count(word).max(1)
        } else {
            1
        };
        let slot_count = if trailing_pause { syllables + 1 } else { syllables };
        let width = duration / slot_count as f64;

        let slots = (0..syllables)
            .map(|i| {
                let open = i as f64 * width;
                SyllableSlot {
                    open_at_ms: open,
                    close_at_ms: open + width / 2.0,
                }
            })
            .collect();

        debug!(
            "Word {:?}: {:.1}ms over {} syllables ({:.1}ms slots)",
            word, duration, syllables, width
        );
        WordSchedule {
            word: word.to_string(),
            start_ms,
            slots,
        }
    }
}

static LEADING_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\S+").expect("valid word regex"));

/// `text` from the `char_index`th character on
fn rest_of(text: &str, char_index: usize) -> Option<&str> {
    let (byte, _) = text.char_indices().nth(char_index)?;
    Some(&text[byte..])
}

/// The word starting at character offset `char_index` of `text`
pub fn word_at(text: &str, char_index: usize) -> Option<&str> {
    let rest = rest_of(text, char_index)?;
    LEADING_WORD.find(rest).map(|m| m.as_str())
}

/// Word to animate for a boundary at `char_index`
///
/// Falls back to the next ten characters when no word starts exactly at
/// the offset.
pub fn boundary_word(text: &str, char_index: usize) -> Option<String> {
    if let Some(word) = word_at(text, char_index) {
        return Some(word.to_string());
    }
    let snippet: String = rest_of(text, char_index)?.chars().take(10).collect();
    let snippet = snippet.trim();
    if snippet.is_empty() {
        None
    } else {
        Some(snippet.to_string())
    }
}

/// Spread the words of `text` evenly across `duration_ms`
///
/// Used when a chunk arrives without word timing.
pub fn even_starts(text: &str, duration_ms: f64) -> Vec<(String, f64)> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }
    let per_word = duration_ms / words.len() as f64;
    words
        .into_iter()
        .enumerate()
        .map(|(i, w)| (w.to_string(), i as f64 * per_word))
        .collect()
}
