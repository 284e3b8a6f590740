//! Inbound and outbound event protocol
//!
//! Collaborators (capture device, synthesis device, UI, transport) only ever
//! talk to the orchestrator through these enums. Both serialize as JSON
//! objects tagged by `"event"`.

use crate::speech::dispatcher::JawDirection;
use crate::speech::timing::TimedWord;
use crate::speech::voices::Voice;
use crate::timers::{TimerGroup, TimerId, TimerQueue, TimerTask};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of decoding one streamed audio chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChunkDecode {
    Decoded { duration_ms: f64 },
    Failed { reason: String },
}

/// Events consumed by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InboundEvent {
    // UI commands
    StartListening,
    StopListening,
    MuteListening,
    UnmuteListening,
    SubmitSpeechMessage,
    Speak {
        text: String,
        #[serde(default)]
        rate: Option<f32>,
    },
    StopSpeaking,
    ChangeVoice {
        voice_uri: String,
    },

    // Capture device
    RecognitionStart,
    RecognitionEnd,
    RecognitionError {
        code: String,
    },
    RecognitionResult {
        #[serde(default)]
        interim: String,
        #[serde(default, rename = "final")]
        final_text: String,
    },

    // Synthesis device
    SynthesisStart,
    SynthesisEnd,
    SynthesisError {
        code: String,
    },
    WordBoundary {
        word: String,
        elapsed_ms: f64,
    },
    CharBoundary {
        char_index: usize,
        elapsed_ms: f64,
    },
    AmplitudeSample {
        level: f32,
    },
    VoicesChanged {
        voices: Vec<Voice>,
    },

    // Transport (streamed synthesis)
    ChunkReady {
        sequence_index: u64,
        #[serde(default)]
        text: String,
        #[serde(default)]
        words: Vec<TimedWord>,
        /// Duration reported by the server, independent of decoding
        #[serde(default)]
        duration_ms: Option<f64>,
        decode: ChunkDecode,
    },
}

/// Events emitted to UI and transport collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutboundEvent {
    SpeechStarted,
    SpeechEnded,
    SpeechError { message: String },
    SpeechMuted,
    SpeechUnmuted,
    SpeechInterim { text: String },
    SpeechFinal { text: String },
    SpeechNotSupported,
    AutoSubmitCountdown { seconds: f64 },
    AutoSubmitSpeech,
    TtsStarted,
    TtsEnded,
    TtsError { message: String },
    MouthAnimation { word: String, elapsed_ms: f64 },
    DisplayWord { word: String },
    Jaw { direction: JawDirection, word: String },
    Subtitle { text: String },
    SubtitlesCleared,
    VoicesLoaded { voices: BTreeMap<String, Vec<Voice>> },
    VoiceSelected { name: String, lang: String, voice_uri: String },
    VoiceChanged { name: String, lang: String, voice_uri: String },
}

/// Borrowed view of the orchestrator handed to components while they react
/// to one event or one expired timer
pub struct Dispatch<'a> {
    pub now_ms: f64,
    pub timers: &'a mut TimerQueue,
    pub out: &'a mut Vec<OutboundEvent>,
}

impl<'a> Dispatch<'a> {
    pub fn new(now_ms: f64, timers: &'a mut TimerQueue, out: &'a mut Vec<OutboundEvent>) -> Self {
        Self { now_ms, timers, out }
    }

    pub fn emit(&mut self, event: OutboundEvent) {
        self.out.push(event);
    }

    /// Schedule `task` relative to the dispatch time
    pub fn after(&mut self, delay_ms: f64, group: TimerGroup, task: TimerTask) -> TimerId {
        self.timers.schedule(self.now_ms, delay_ms, group, task)
    }
}
