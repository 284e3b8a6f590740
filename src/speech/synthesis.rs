//! Speech playback scheduling
//!
//! Owns the one active utterance (or chunk stream) and turns synthesis
//! progress into timed jaw movements, word display and subtitles. Starting
//! anything new cancels every timer of the previous utterance first, so two
//! schedules never drive the jaw at once.

use super::amplitude::AmplitudeTracker;
use super::dispatcher::{AnimationDispatcher, JawDirection};
use super::queue_clock::ChunkQueueClock;
use super::timing::{self, AllocatorSettings, TimedWord, WordSchedule, WordTimingAllocator};
use super::voices::Voice;
use crate::devices::Synth;
use crate::events::{ChunkDecode, Dispatch, OutboundEvent};
use crate::timers::{TimerGroup, TimerTask};
use crate::TalkbackError;
use log::{debug, info, warn};
use std::collections::BTreeMap;

/// Error codes a synthesizer reports when we cancelled it ourselves
const SELF_INFLICTED: &[&str] = &["interrupted", "canceled", "cancelled"];

/// Playback settings
#[derive(Debug, Clone, Copy)]
pub struct SynthesisSettings {
    /// Speaking rate when a request does not name one
    pub rate: f32,
    pub use_syllable_timing: bool,
    pub use_amplitude_fallback: bool,
    pub last_word_syllable_ms: f64,
    /// Subtitles clear after this much time without a new word
    pub subtitle_clear_ms: f64,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            rate: 0.9,
            use_syllable_timing: true,
            use_amplitude_fallback: false,
            last_word_syllable_ms: 150.0,
            subtitle_clear_ms: 2000.0,
        }
    }
}

impl SynthesisSettings {
    fn allocator(&self) -> AllocatorSettings {
        AllocatorSettings {
            syllable_timing: self.use_syllable_timing,
            last_word_syllable_ms: self.last_word_syllable_ms,
        }
    }

    /// Amplitude drives the jaw only when syllable timing is off
    fn amplitude_drives_jaw(&self) -> bool {
        self.use_amplitude_fallback && !self.use_syllable_timing
    }
}

/// One independently decoded piece of streamed audio
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub sequence_index: u64,
    pub text: String,
    pub words: Vec<TimedWord>,
    /// Duration the server reported, usable when decoding fails
    pub reported_duration_ms: Option<f64>,
    pub decode: ChunkDecode,
}

#[derive(Debug)]
struct Utterance {
    text: String,
    playing: bool,
    last_word: String,
}

#[derive(Debug, Default)]
struct Stream {
    next_index: u64,
    pending: BTreeMap<u64, AudioChunk>,
    playing: bool,
}

/// Scheduler for the active utterance or chunk stream
pub struct SynthesisScheduler {
    settings: SynthesisSettings,
    allocator: WordTimingAllocator,
    dispatcher: AnimationDispatcher,
    queue: ChunkQueueClock,
    amplitude: AmplitudeTracker,
    utterance: Option<Utterance>,
    /// Present once a stream's index 0 has arrived
    stream: Option<Stream>,
    /// Chunks of the next stream that arrived before its index 0
    upcoming: BTreeMap<u64, AudioChunk>,
    /// Next index of the last cancelled stream; its late chunks are dropped
    stopped_at: Option<u64>,
    subtitle: String,
}

impl SynthesisScheduler {
    pub fn new(
        settings: SynthesisSettings,
        dispatcher: AnimationDispatcher,
        queue: ChunkQueueClock,
        amplitude: AmplitudeTracker,
    ) -> Self {
        Self {
            allocator: WordTimingAllocator::new(settings.allocator()),
            settings,
            dispatcher,
            queue,
            amplitude,
            utterance: None,
            stream: None,
            upcoming: BTreeMap::new(),
            stopped_at: None,
            subtitle: String::new(),
        }
    }

    pub fn dispatcher(&self) -> &AnimationDispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut AnimationDispatcher {
        &mut self.dispatcher
    }

    pub fn queue_clock(&self) -> &ChunkQueueClock {
        &self.queue
    }

    pub fn amplitude(&self) -> &AmplitudeTracker {
        &self.amplitude
    }

    pub fn subtitle(&self) -> &str {
        &self.subtitle
    }

    /// An utterance is waiting to play or playing, or a stream is queued
    pub fn is_active(&self) -> bool {
        self.utterance.is_some() || self.stream.as_ref().map_or(false, |s| s.playing)
    }

    // ========== Single utterances ==========

    /// Speak `text`, replacing whatever is active
    pub fn speak(
        &mut self,
        text: &str,
        rate: Option<f32>,
        voice: Option<&Voice>,
        synth: &mut dyn Synth,
        cx: &mut Dispatch<'_>,
    ) {
        if text.trim().is_empty() {
            debug!("Ignoring empty speak request");
            return;
        }
        self.stop(synth, cx);

        if !synth.is_available() {
            cx.emit(OutboundEvent::TtsError {
                message: "Text-to-speech not supported".into(),
            });
            return;
        }

        let rate = rate.unwrap_or(self.settings.rate);
        info!("Speaking {} chars at rate {}", text.len(), rate);
        self.utterance = Some(Utterance {
            text: text.to_string(),
            playing: false,
            last_word: String::new(),
        });
        if let Err(e) = synth.speak(text, voice, rate) {
            warn!("Synthesizer refused to speak: {}", e);
            self.utterance = None;
            cx.emit(OutboundEvent::TtsError {
                message: e.user_message(),
            });
        }
    }

    /// Silence the synthesizer and cancel everything scheduled
    pub fn stop(&mut self, synth: &mut dyn Synth, cx: &mut Dispatch<'_>) {
        if self.is_active() {
            if let Err(e) = synth.cancel() {
                warn!("Synthesizer failed to cancel: {}", e);
            }
        }
        self.cancel(cx);
    }

    /// Cancel every timer of the active utterance or stream and reset state
    pub fn cancel(&mut self, cx: &mut Dispatch<'_>) {
        let cancelled = cx.timers.cancel_group(TimerGroup::Animation) + cx.timers.cancel_group(TimerGroup::Playback);
        if cancelled > 0 {
            debug!("Cancelled {} playback timers", cancelled);
        }
        self.close_jaw(cx.now_ms, cx);
        self.allocator.reset();
        self.amplitude.stop();
        self.utterance = None;
        if let Some(stream) = self.stream.take() {
            self.stopped_at = Some(stream.next_index);
        }
        self.upcoming.clear();
        self.queue.reset(cx.now_ms);
        self.clear_subtitles(cx);
    }

    /// Synthesizer started playing the utterance
    pub fn on_start(&mut self, cx: &mut Dispatch<'_>) {
        match self.utterance.as_mut() {
            Some(u) => u.playing = true,
            None => debug!("Synthesis started with no tracked utterance"),
        }
        if self.settings.amplitude_drives_jaw() {
            self.amplitude.start();
        }
        cx.emit(OutboundEvent::TtsStarted);
    }

    /// Synthesizer reached a word boundary
    pub fn on_boundary(&mut self, word: &str, elapsed_ms: f64, cx: &mut Dispatch<'_>) {
        let Some(utterance) = self.utterance.as_mut() else {
            debug!("Boundary {:?} ignored, no active utterance", word);
            return;
        };
        utterance.last_word = word.to_string();

        cx.emit(OutboundEvent::MouthAnimation {
            word: word.to_string(),
            elapsed_ms,
        });

        if self.settings.amplitude_drives_jaw() {
            return;
        }
        // The previous word is complete; animate it from now
        if let Some(schedule) = self.allocator.push_boundary(word, elapsed_ms) {
            self.schedule_jaw(&schedule, 0.0, cx);
        }
    }

    /// Boundary reported as a character offset into the utterance text
    pub fn on_char_boundary(&mut self, char_index: usize, elapsed_ms: f64, cx: &mut Dispatch<'_>) {
        let word = self
            .utterance
            .as_ref()
            .and_then(|u| timing::boundary_word(&u.text, char_index));
        match word {
            Some(word) => self.on_boundary(&word, elapsed_ms, cx),
            None => debug!("Nothing left to speak at offset {}", char_index),
        }
    }

    /// Synthesizer finished the utterance
    pub fn on_end(&mut self, cx: &mut Dispatch<'_>) {
        match self.utterance.as_ref() {
            Some(u) if u.playing => {}
            Some(_) => {
                // End of an utterance we already replaced
                debug!("Synthesis end ignored, current utterance not started");
                return;
            }
            None => debug!("Synthesis end with no tracked utterance"),
        }

        if let Some(schedule) = self.allocator.finish() {
            self.schedule_jaw(&schedule, 0.0, cx);
        }
        if self.amplitude.is_active() {
            self.amplitude.stop();
            self.close_jaw(cx.now_ms, cx);
        }
        self.utterance = None;
        cx.emit(OutboundEvent::TtsEnded);
    }

    /// Synthesizer failed
    pub fn on_error(&mut self, code: &str, cx: &mut Dispatch<'_>) {
        if SELF_INFLICTED.contains(&code) {
            debug!("Synthesis {} after cancel", code);
            return;
        }
        warn!("Speech synthesis error: {}", code);
        self.cancel(cx);
        cx.emit(OutboundEvent::TtsError {
            message: code.to_string(),
        });
    }

    /// Playback level sample for the amplitude fallback
    pub fn on_amplitude(&mut self, level: f32, cx: &mut Dispatch<'_>) {
        match self.amplitude.push(level) {
            Some(true) => {
                let word = self.utterance.as_ref().map(|u| u.last_word.clone()).unwrap_or_default();
                if self.dispatcher.open(&word, cx.now_ms) {
                    cx.emit(OutboundEvent::Jaw {
                        direction: JawDirection::Down,
                        word,
                    });
                }
            }
            Some(false) => self.close_jaw(cx.now_ms, cx),
            None => {}
        }
    }

    // ========== Streamed chunks ==========

    /// A streamed chunk finished decoding (or failed to)
    ///
    /// Chunks are played strictly in sequence order; early arrivals wait
    /// for their predecessors. Index 0 starts a new stream, taking over any
    /// of its chunks that decoded first.
    pub fn on_chunk(&mut self, chunk: AudioChunk, cx: &mut Dispatch<'_>) {
        let index = chunk.sequence_index;

        if index == 0 {
            let early = std::mem::take(&mut self.upcoming);
            self.cancel(cx);
            self.stopped_at = None;
            debug!("New chunk stream, {} later chunks already decoded", early.len());
            self.stream = Some(Stream {
                pending: early,
                ..Default::default()
            });
        }

        match self.stream.as_ref().map(|s| s.next_index) {
            Some(next) if index >= next => {
                if let Some(stream) = self.stream.as_mut() {
                    if stream.pending.contains_key(&index) {
                        warn!("Duplicate chunk {} dropped", index);
                        return;
                    }
                    stream.pending.insert(index, chunk);
                }
            }
            // The current stream already played this index, so the chunk
            // belongs to the next one
            Some(_) => {
                self.park_upcoming(chunk);
                return;
            }
            None => {
                match self.stopped_at {
                    Some(stopped) if index >= stopped => debug!("Chunk {} dropped, stream was stopped", index),
                    _ => self.park_upcoming(chunk),
                }
                return;
            }
        }

        while let Some(next) = self.next_ready_chunk() {
            self.play_chunk(next, cx);
        }
    }

    fn park_upcoming(&mut self, chunk: AudioChunk) {
        let index = chunk.sequence_index;
        if self.upcoming.contains_key(&index) {
            warn!("Duplicate chunk {} dropped", index);
            return;
        }
        debug!("Chunk {} waits for its stream to start", index);
        self.upcoming.insert(index, chunk);
    }

    fn next_ready_chunk(&mut self) -> Option<AudioChunk> {
        let stream = self.stream.as_mut()?;
        let chunk = stream.pending.remove(&stream.next_index)?;
        stream.next_index += 1;
        Some(chunk)
    }

    fn play_chunk(&mut self, chunk: AudioChunk, cx: &mut Dispatch<'_>) {
        let now = cx.now_ms;
        let duration = match chunk.decode {
            ChunkDecode::Decoded { duration_ms } => duration_ms,
            ChunkDecode::Failed { ref reason } => {
                let err = TalkbackError::Decode(format!(
                    "Failed to decode audio chunk {}: {}",
                    chunk.sequence_index, reason
                ));
                warn!("{}", err);
                cx.emit(OutboundEvent::TtsError {
                    message: err.user_message(),
                });
                // The player still leaves a hole of the reported length
                match chunk.reported_duration_ms {
                    Some(reported) => {
                        self.queue.advance(now, reported);
                        self.arm_drain(cx);
                    }
                    None => debug!("Chunk {} skipped, clock not advanced", chunk.sequence_index),
                }
                return;
            }
        };

        if let Some(stream) = self.stream.as_mut() {
            if !stream.playing {
                stream.playing = true;
                cx.emit(OutboundEvent::TtsStarted);
            }
        }

        let offset = self.queue.next_start(now) - now;
        let schedules = if chunk.words.is_empty() {
            self.fallback_schedules(&chunk.text, duration)
        } else {
            self.allocator.explicit(&chunk.words, duration)
        };
        debug!(
            "Chunk {}: {} words, playing in {:.1}ms",
            chunk.sequence_index,
            schedules.len(),
            offset
        );

        for schedule in &schedules {
            cx.after(
                offset + schedule.start_ms,
                TimerGroup::Animation,
                TimerTask::DisplayWord(schedule.word.clone()),
            );
            if !self.settings.amplitude_drives_jaw() {
                self.schedule_jaw(schedule, offset + schedule.start_ms, cx);
            }
        }

        self.queue.advance(now, duration);
        self.arm_drain(cx);
    }

    /// Timing for a chunk without word timings: spread its words evenly and
    /// treat the even starts as boundaries
    fn fallback_schedules(&self, text: &str, duration_ms: f64) -> Vec<WordSchedule> {
        let mut allocator = WordTimingAllocator::new(self.settings.allocator());
        let mut schedules: Vec<WordSchedule> = timing::even_starts(text, duration_ms)
            .into_iter()
            .filter_map(|(word, start)| allocator.push_boundary(&word, start))
            .collect();
        schedules.extend(allocator.finish());
        schedules
    }

    /// Re-arm the notification for when queued audio finishes
    fn arm_drain(&mut self, cx: &mut Dispatch<'_>) {
        cx.timers.cancel_group(TimerGroup::Playback);
        let audio_end = self.queue.queue_end_ms() - self.queue.gap_ms();
        cx.after(audio_end - cx.now_ms, TimerGroup::Playback, TimerTask::QueueDrained);
    }

    // ========== Timers ==========

    /// Schedule open/close pairs for `schedule`, `offset_ms` from now
    fn schedule_jaw(&mut self, schedule: &WordSchedule, offset_ms: f64, cx: &mut Dispatch<'_>) {
        for slot in &schedule.slots {
            cx.after(
                offset_ms + slot.open_at_ms,
                TimerGroup::Animation,
                TimerTask::JawOpen(schedule.word.clone()),
            );
            cx.after(
                offset_ms + slot.close_at_ms,
                TimerGroup::Animation,
                TimerTask::JawClose(schedule.word.clone()),
            );
        }
    }

    /// Handle an expired playback timer; `at_ms` is when it was due
    pub fn on_timer(&mut self, task: TimerTask, at_ms: f64, cx: &mut Dispatch<'_>) {
        match task {
            TimerTask::JawOpen(word) => {
                if self.dispatcher.open(&word, at_ms) {
                    cx.emit(OutboundEvent::Jaw {
                        direction: JawDirection::Down,
                        word,
                    });
                }
            }
            TimerTask::JawClose(_) => self.close_jaw(at_ms, cx),
            TimerTask::DisplayWord(word) => {
                self.subtitle.push_str(&word);
                self.subtitle.push(' ');
                cx.emit(OutboundEvent::DisplayWord { word });
                cx.emit(OutboundEvent::Subtitle {
                    text: self.subtitle.clone(),
                });
                cx.timers.cancel_group(TimerGroup::Subtitle);
                cx.after(self.settings.subtitle_clear_ms, TimerGroup::Subtitle, TimerTask::ClearSubtitles);
            }
            TimerTask::ClearSubtitles => self.clear_subtitles(cx),
            TimerTask::QueueDrained => {
                if let Some(stream) = self.stream.as_mut() {
                    if stream.playing {
                        stream.playing = false;
                        info!("Chunk queue drained");
                        cx.emit(OutboundEvent::TtsEnded);
                    }
                }
            }
            TimerTask::CountdownTick => warn!("Countdown tick routed to synthesis"),
        }
    }

    fn close_jaw(&mut self, at_ms: f64, cx: &mut Dispatch<'_>) {
        let word = self.dispatcher.current_word().to_string();
        if self.dispatcher.close(at_ms) {
            cx.emit(OutboundEvent::Jaw {
                direction: JawDirection::Up,
                word,
            });
        }
    }

    fn clear_subtitles(&mut self, cx: &mut Dispatch<'_>) {
        cx.timers.cancel_group(TimerGroup::Subtitle);
        if !self.subtitle.is_empty() {
            self.subtitle.clear();
            cx.emit(OutboundEvent::SubtitlesCleared);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{CommandQueue, DeviceCommand, QueuedSynth};
    use crate::speech::dispatcher::Oscilloscope;
    use crate::timers::TimerQueue;

    struct Harness {
        sched: SynthesisScheduler,
        synth: QueuedSynth,
        commands: CommandQueue,
        timers: TimerQueue,
        out: Vec<OutboundEvent>,
    }

    impl Harness {
        fn new(settings: SynthesisSettings) -> Self {
            let commands = CommandQueue::new();
            Self {
                sched: SynthesisScheduler::new(
                    settings,
                    AnimationDispatcher::new(100, Some(Oscilloscope::new(400))),
                    ChunkQueueClock::default(),
                    AmplitudeTracker::new(5.0),
                ),
                synth: QueuedSynth::new(commands.clone(), true),
                commands,
                timers: TimerQueue::new(),
                out: Vec::new(),
            }
        }

        fn at<F>(&mut self, now_ms: f64, f: F)
        where
            F: FnOnce(&mut SynthesisScheduler, &mut QueuedSynth, &mut Dispatch<'_>),
        {
            let mut cx = Dispatch::new(now_ms, &mut self.timers, &mut self.out);
            f(&mut self.sched, &mut self.synth, &mut cx);
        }

        /// Fire timers due up to `until`, returning (due time, event) pairs
        fn run_until(&mut self, until: f64) -> Vec<(f64, OutboundEvent)> {
            let mut fired = Vec::new();
            while let Some(expired) = self.timers.pop_due(until) {
                let start = self.out.len();
                let mut cx = Dispatch::new(expired.due_ms, &mut self.timers, &mut self.out);
                self.sched.on_timer(expired.task, expired.due_ms, &mut cx);
                for e in self.out.drain(start..) {
                    fired.push((expired.due_ms, e));
                }
            }
            fired
        }

        fn take(&mut self) -> Vec<OutboundEvent> {
            std::mem::take(&mut self.out)
        }
    }

    fn chunk(index: u64, words: &[(&str, f64)], duration: f64) -> AudioChunk {
        AudioChunk {
            sequence_index: index,
            text: words.iter().map(|(w, _)| *w).collect::<Vec<_>>().join(" "),
            words: words
                .iter()
                .map(|(w, start)| TimedWord {
                    word: w.to_string(),
                    start_ms: *start,
                    duration_ms: Some(100.0),
                })
                .collect(),
            reported_duration_ms: Some(duration),
            decode: ChunkDecode::Decoded { duration_ms: duration },
        }
    }

    fn display_times(fired: &[(f64, OutboundEvent)]) -> Vec<(String, f64)> {
        fired
            .iter()
            .filter_map(|(t, e)| match e {
                OutboundEvent::DisplayWord { word } => Some((word.clone(), *t)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_speak_ignores_blank_text() {
        let mut h = Harness::new(SynthesisSettings::default());
        h.at(0.0, |s, synth, cx| s.speak("   ", None, None, synth, cx));
        assert!(h.commands.drain().is_empty());
        assert!(!h.sched.is_active());
    }

    #[test]
    fn test_speak_uses_default_rate() {
        let mut h = Harness::new(SynthesisSettings::default());
        h.at(0.0, |s, synth, cx| s.speak("hello world", None, None, synth, cx));
        assert_eq!(
            h.commands.drain(),
            vec![DeviceCommand::Speak {
                text: "hello world".into(),
                voice_uri: None,
                rate: 0.9
            }]
        );
    }

    #[test]
    fn test_boundaries_animate_previous_word() {
        let mut h = Harness::new(SynthesisSettings::default());
        h.at(0.0, |s, synth, cx| s.speak("hello world", None, None, synth, cx));
        h.at(10.0, |s, _, cx| s.on_start(cx));
        h.at(10.0, |s, _, cx| s.on_boundary("hello", 0.0, cx));
        assert!(h.timers.is_empty());

        h.at(410.0, |s, _, cx| s.on_boundary("world", 400.0, cx));
        assert_eq!(h.timers.len(), 4);

        h.at(900.0, |s, _, cx| s.on_end(cx));
        let events = h.take();
        assert!(events.contains(&OutboundEvent::TtsStarted));
        assert!(events.contains(&OutboundEvent::TtsEnded));
        assert!(events.contains(&OutboundEvent::MouthAnimation {
            word: "world".into(),
            elapsed_ms: 400.0
        }));

        let fired = h.run_until(10_000.0);
        let jaws: Vec<_> = fired
            .iter()
            .filter(|(_, e)| matches!(e, OutboundEvent::Jaw { .. }))
            .collect();
        // hello: 2 syllables, world: 1 syllable
        assert_eq!(jaws.len(), 6);
        assert!(!h.sched.dispatcher().is_open());
        assert!((jaws[1].0 - (410.0 + 400.0 / 6.0)).abs() < 0.01);
    }

    #[test]
    fn test_char_boundary_resolves_word() {
        let mut h = Harness::new(SynthesisSettings::default());
        h.at(0.0, |s, synth, cx| s.speak("Good morning, Dave", None, None, synth, cx));
        h.at(0.0, |s, _, cx| s.on_start(cx));
        h.at(5.0, |s, _, cx| s.on_char_boundary(5, 5.0, cx));
        assert!(h.take().contains(&OutboundEvent::MouthAnimation {
            word: "morning,".into(),
            elapsed_ms: 5.0
        }));
    }

    #[test]
    fn test_char_boundary_counts_characters() {
        let mut h = Harness::new(SynthesisSettings::default());
        h.at(0.0, |s, synth, cx| s.speak("café au lait", None, None, synth, cx));
        h.at(0.0, |s, _, cx| s.on_start(cx));
        h.at(5.0, |s, _, cx| s.on_char_boundary(5, 5.0, cx));
        assert!(h.take().contains(&OutboundEvent::MouthAnimation {
            word: "au".into(),
            elapsed_ms: 5.0
        }));

        // Between words the next few characters stand in for the word
        h.at(9.0, |s, _, cx| s.on_char_boundary(7, 9.0, cx));
        assert!(h.take().contains(&OutboundEvent::MouthAnimation {
            word: "lait".into(),
            elapsed_ms: 9.0
        }));
        assert_eq!(h.sched.allocator.buffered().count(), 1);
    }

    #[test]
    fn test_new_utterance_cancels_previous() {
        let mut h = Harness::new(SynthesisSettings::default());
        h.at(0.0, |s, synth, cx| s.speak("first one", None, None, synth, cx));
        h.at(0.0, |s, _, cx| s.on_start(cx));
        h.at(0.0, |s, _, cx| s.on_boundary("first", 0.0, cx));
        h.at(300.0, |s, _, cx| s.on_boundary("one", 300.0, cx));
        h.run_until(310.0);
        assert!(h.sched.dispatcher().is_open() || h.timers.len() > 0);

        h.at(320.0, |s, synth, cx| s.speak("second", None, None, synth, cx));
        assert_eq!(h.timers.len(), 0);
        assert!(!h.sched.dispatcher().is_open());
        assert!(h.commands.drain().contains(&DeviceCommand::CancelSpeech));

        // The cancelled utterance's late end does not end the new one
        h.at(330.0, |s, _, cx| s.on_end(cx));
        assert!(!h.take().contains(&OutboundEvent::TtsEnded));
        assert!(h.sched.is_active());
    }

    #[test]
    fn test_chunks_offset_by_queue() {
        let mut h = Harness::new(SynthesisSettings::default());
        h.at(0.0, |s, _, cx| s.on_chunk(chunk(0, &[("alpha", 0.0), ("beta", 500.0)], 1000.0), cx));
        h.at(0.0, |s, _, cx| s.on_chunk(chunk(1, &[("gamma", 0.0), ("delta", 200.0)], 500.0), cx));
        assert_eq!(h.sched.queue_clock().queue_end_ms(), 2100.0);

        let fired = h.run_until(10_000.0);
        assert_eq!(
            display_times(&fired),
            vec![
                ("alpha".to_string(), 0.0),
                ("beta".to_string(), 500.0),
                ("gamma".to_string(), 1300.0),
                ("delta".to_string(), 1500.0),
            ]
        );
    }

    #[test]
    fn test_chunks_played_in_sequence_order() {
        let mut h = Harness::new(SynthesisSettings::default());
        h.at(0.0, |s, _, cx| s.on_chunk(chunk(1, &[("second", 0.0)], 500.0), cx));
        assert!(h.timers.is_empty());

        h.at(50.0, |s, _, cx| s.on_chunk(chunk(0, &[("first", 0.0)], 1000.0), cx));
        let fired = h.run_until(10_000.0);
        assert_eq!(
            display_times(&fired),
            vec![("first".to_string(), 50.0), ("second".to_string(), 1350.0)]
        );
    }

    #[test]
    fn test_decode_failure_policy() {
        let mut h = Harness::new(SynthesisSettings::default());
        h.at(0.0, |s, _, cx| s.on_chunk(chunk(0, &[("one", 0.0)], 1000.0), cx));

        let mut broken = chunk(1, &[("lost", 0.0)], 400.0);
        broken.decode = ChunkDecode::Failed {
            reason: "bad header".into(),
        };
        h.at(0.0, |s, _, cx| s.on_chunk(broken, cx));
        assert_eq!(h.sched.queue_clock().queue_end_ms(), 2000.0);
        assert!(h
            .take()
            .iter()
            .any(|e| matches!(e, OutboundEvent::TtsError { .. })));

        let mut unknown = chunk(2, &[("gone", 0.0)], 400.0);
        unknown.decode = ChunkDecode::Failed {
            reason: "truncated".into(),
        };
        unknown.reported_duration_ms = None;
        h.at(0.0, |s, _, cx| s.on_chunk(unknown, cx));
        assert_eq!(h.sched.queue_clock().queue_end_ms(), 2000.0);

        h.at(0.0, |s, _, cx| s.on_chunk(chunk(3, &[("three", 0.0)], 100.0), cx));
        let fired = h.run_until(10_000.0);
        assert_eq!(
            display_times(&fired),
            vec![("one".to_string(), 0.0), ("three".to_string(), 2000.0)]
        );
    }

    #[test]
    fn test_stream_emits_start_and_drain() {
        let mut h = Harness::new(SynthesisSettings::default());
        h.at(0.0, |s, _, cx| s.on_chunk(chunk(0, &[("hi", 0.0)], 800.0), cx));
        assert!(h.take().contains(&OutboundEvent::TtsStarted));

        let fired = h.run_until(10_000.0);
        let ended: Vec<_> = fired.iter().filter(|(_, e)| *e == OutboundEvent::TtsEnded).collect();
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].0, 800.0);

        // Subtitles shown then cleared
        assert!(fired.iter().any(|(_, e)| *e == OutboundEvent::Subtitle { text: "hi ".into() }));
        assert!(fired.iter().any(|(t, e)| *e == OutboundEvent::SubtitlesCleared && *t == 2000.0));
    }

    #[test]
    fn test_chunk_without_timings_uses_fallback() {
        let mut h = Harness::new(SynthesisSettings::default());
        let mut c = chunk(0, &[], 900.0);
        c.text = "one two three".into();
        h.at(0.0, |s, _, cx| s.on_chunk(c, cx));

        let fired = h.run_until(10_000.0);
        assert_eq!(
            display_times(&fired),
            vec![
                ("one".to_string(), 0.0),
                ("two".to_string(), 300.0),
                ("three".to_string(), 600.0),
            ]
        );
    }

    #[test]
    fn test_stopped_stream_drops_late_chunks() {
        let mut h = Harness::new(SynthesisSettings::default());
        h.at(0.0, |s, _, cx| s.on_chunk(chunk(0, &[("a", 0.0)], 500.0), cx));
        h.at(10.0, |s, synth, cx| s.stop(synth, cx));
        assert!(h.timers.is_empty());

        h.at(20.0, |s, _, cx| s.on_chunk(chunk(1, &[("b", 0.0)], 500.0), cx));
        assert!(h.timers.is_empty());

        h.at(30.0, |s, _, cx| s.on_chunk(chunk(0, &[("c", 0.0)], 500.0), cx));
        let fired = h.run_until(10_000.0);
        assert_eq!(display_times(&fired), vec![("c".to_string(), 30.0)]);
    }

    #[test]
    fn test_second_stream_chunk_decoded_before_its_head() {
        let mut h = Harness::new(SynthesisSettings::default());
        for i in 0..3 {
            let word = format!("a{}", i);
            h.at(0.0, |s, _, cx| s.on_chunk(chunk(i, &[(word.as_str(), 0.0)], 200.0), cx));
        }
        let words: Vec<String> = display_times(&h.run_until(5000.0)).into_iter().map(|(w, _)| w).collect();
        assert_eq!(words, vec!["a0", "a1", "a2"]);

        h.at(5000.0, |s, _, cx| s.on_chunk(chunk(1, &[("b1", 0.0)], 200.0), cx));
        assert!(h.timers.is_empty());
        h.at(5010.0, |s, _, cx| s.on_chunk(chunk(0, &[("b0", 0.0)], 200.0), cx));
        h.at(5020.0, |s, _, cx| s.on_chunk(chunk(2, &[("b2", 0.0)], 200.0), cx));

        assert_eq!(
            display_times(&h.run_until(20_000.0)),
            vec![
                ("b0".to_string(), 5010.0),
                ("b1".to_string(), 5510.0),
                ("b2".to_string(), 6010.0),
            ]
        );
    }

    #[test]
    fn test_stream_after_stop_keeps_early_chunks() {
        let mut h = Harness::new(SynthesisSettings::default());
        h.at(0.0, |s, _, cx| s.on_chunk(chunk(0, &[("a0", 0.0)], 200.0), cx));
        h.at(0.0, |s, _, cx| s.on_chunk(chunk(1, &[("a1", 0.0)], 200.0), cx));
        h.at(0.0, |s, _, cx| s.on_chunk(chunk(2, &[("a2", 0.0)], 200.0), cx));
        h.at(100.0, |s, synth, cx| s.stop(synth, cx));

        // Index 1 was already played by the stopped stream, so it opens the next one
        h.at(200.0, |s, _, cx| s.on_chunk(chunk(1, &[("b1", 0.0)], 200.0), cx));
        h.at(210.0, |s, _, cx| s.on_chunk(chunk(0, &[("b0", 0.0)], 200.0), cx));

        let words: Vec<String> = display_times(&h.run_until(20_000.0)).into_iter().map(|(w, _)| w).collect();
        assert_eq!(words, vec!["b0", "b1"]);
    }

    #[test]
    fn test_amplitude_fallback_drives_jaw() {
        let mut h = Harness::new(SynthesisSettings {
            use_syllable_timing: false,
            use_amplitude_fallback: true,
            ..Default::default()
        });
        h.at(0.0, |s, synth, cx| s.speak("hey", None, None, synth, cx));
        h.at(0.0, |s, _, cx| s.on_start(cx));
        h.at(5.0, |s, _, cx| s.on_boundary("hey", 0.0, cx));
        h.at(10.0, |s, _, cx| s.on_amplitude(40.0, cx));
        assert!(h.sched.dispatcher().is_open());
        h.at(20.0, |s, _, cx| s.on_amplitude(1.0, cx));
        assert!(!h.sched.dispatcher().is_open());

        h.at(30.0, |s, _, cx| s.on_end(cx));
        assert!(h.timers.is_empty());
        assert!(!h.sched.amplitude().is_active());
    }

    #[test]
    fn test_error_cancels_animation() {
        let mut h = Harness::new(SynthesisSettings::default());
        h.at(0.0, |s, synth, cx| s.speak("a b", None, None, synth, cx));
        h.at(0.0, |s, _, cx| s.on_start(cx));
        h.at(0.0, |s, _, cx| s.on_boundary("a", 0.0, cx));
        h.at(100.0, |s, _, cx| s.on_boundary("b", 100.0, cx));
        h.at(110.0, |s, _, cx| s.on_error("interrupted", cx));
        assert!(!h.timers.is_empty());

        h.at(120.0, |s, _, cx| s.on_error("synthesis-failed", cx));
        assert!(h.timers.is_empty());
        assert!(h.take().contains(&OutboundEvent::TtsError {
            message: "synthesis-failed".into()
        }));
    }
}
