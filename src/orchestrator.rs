//! Speech interaction orchestrator
//!
//! The orchestrator is the only owner of session state. Collaborators feed it
//! `InboundEvent`s; it reacts synchronously, schedules timers, and leaves
//! `OutboundEvent`s in an outbox for the caller to drain. The caller's event
//! loop calls `run_scheduled` whenever `time_until_next_scheduled` elapses.

use crate::clock::Clock;
use crate::config::OrchestratorConfig;
use crate::devices::{CaptureDevice, Synth};
use crate::events::{Dispatch, InboundEvent, OutboundEvent};
use crate::speech::voices::{self, Voice};
use crate::speech::{
    AmplitudeTracker, AnimationDispatcher, AudioChunk, CaptureState, ChunkQueueClock, MovementEntry, Oscilloscope,
    RecognitionErrorKind, RecognitionSession, SynthesisScheduler,
};
use crate::timers::{TimerQueue, TimerTask};
use log::{debug, info, warn};
use std::time::Duration;

/// Voice catalogue and the voice synthesis currently uses
#[derive(Debug, Default)]
struct VoiceState {
    available: Vec<Voice>,
    selected: Option<Voice>,
    /// Configured voice URI, preferred over the default pick
    preferred: Option<String>,
}

impl VoiceState {
    fn on_voices_changed(&mut self, voices: Vec<Voice>, cx: &mut Dispatch<'_>) {
        if voices.is_empty() {
            debug!("Voice list empty, waiting for the device to load voices");
            return;
        }
        info!("{} voices available", voices.len());
        cx.emit(OutboundEvent::VoicesLoaded {
            voices: voices::categorize(&voices),
        });

        let keep = self
            .selected
            .as_ref()
            .and_then(|cur| voices.iter().find(|v| v.voice_uri == cur.voice_uri));
        let preferred = self
            .preferred
            .as_deref()
            .and_then(|uri| voices.iter().find(|v| v.voice_uri == uri));
        let pick = keep.or(preferred).or_else(|| voices::select_default(&voices)).cloned();

        if pick != self.selected {
            if let Some(voice) = &pick {
                info!("Selected voice {} ({})", voice.name, voice.lang);
                cx.emit(OutboundEvent::VoiceSelected {
                    name: voice.name.clone(),
                    lang: voice.lang.clone(),
                    voice_uri: voice.voice_uri.clone(),
                });
            }
            self.selected = pick;
        }
        self.available = voices;
    }

    fn change(&mut self, voice_uri: &str, cx: &mut Dispatch<'_>) {
        match self.available.iter().find(|v| v.voice_uri == voice_uri) {
            Some(voice) => {
                info!("Voice changed to {}", voice.name);
                cx.emit(OutboundEvent::VoiceChanged {
                    name: voice.name.clone(),
                    lang: voice.lang.clone(),
                    voice_uri: voice.voice_uri.clone(),
                });
                self.selected = Some(voice.clone());
            }
            None => warn!("Unknown voice {:?}", voice_uri),
        }
    }
}

/// Speech interaction orchestrator
pub struct Orchestrator<C: Clock> {
    clock: C,
    config: OrchestratorConfig,
    timers: TimerQueue,
    outbox: Vec<OutboundEvent>,
    recognition: RecognitionSession,
    synthesis: SynthesisScheduler,
    capture: Box<dyn CaptureDevice>,
    synth: Box<dyn Synth>,
    voices: VoiceState,
    destroyed: bool,
}

impl<C: Clock> Orchestrator<C> {
    pub fn new(
        clock: C,
        config: OrchestratorConfig,
        capture: Box<dyn CaptureDevice>,
        synth: Box<dyn Synth>,
    ) -> Self {
        let scope = config
            .animation
            .oscilloscope
            .then(|| Oscilloscope::new(config.animation.oscilloscope_width));
        let synthesis = SynthesisScheduler::new(
            config.synthesis,
            AnimationDispatcher::new(config.animation.log_capacity, scope),
            ChunkQueueClock::new(config.inter_chunk_gap_ms),
            AmplitudeTracker::new(config.amplitude_threshold),
        );
        info!(
            "Orchestrator ready: countdown {}ms, syllable timing {}, amplitude fallback {}",
            config.recognition.countdown_delay_ms,
            config.synthesis.use_syllable_timing,
            config.synthesis.use_amplitude_fallback
        );

        Self {
            recognition: RecognitionSession::new(config.recognition),
            voices: VoiceState {
                preferred: config.voice.clone(),
                ..Default::default()
            },
            clock,
            config,
            timers: TimerQueue::new(),
            outbox: Vec::new(),
            synthesis,
            capture,
            synth,
            destroyed: false,
        }
    }

    /// React to one inbound event
    pub fn handle(&mut self, event: InboundEvent) {
        if self.destroyed {
            debug!("Event after destroy ignored: {:?}", event);
            return;
        }
        let now = self.clock.now_ms();
        debug!("Event at {:.1}ms: {:?}", now, event);

        let Self {
            timers,
            outbox,
            recognition,
            synthesis,
            capture,
            synth,
            voices,
            ..
        } = self;
        let cx = &mut Dispatch::new(now, timers, outbox);

        match event {
            InboundEvent::StartListening => recognition.start(capture.as_mut(), cx),
            InboundEvent::StopListening => recognition.stop(capture.as_mut(), cx),
            InboundEvent::MuteListening => recognition.mute(cx),
            InboundEvent::UnmuteListening => recognition.unmute(cx),
            InboundEvent::SubmitSpeechMessage => recognition.submit_now(cx),

            InboundEvent::RecognitionStart => recognition.on_device_start(cx),
            InboundEvent::RecognitionEnd => recognition.on_device_end(cx),
            InboundEvent::RecognitionError { code } => {
                recognition.on_device_error(RecognitionErrorKind::from_code(&code), cx)
            }
            InboundEvent::RecognitionResult { interim, final_text } => {
                recognition.on_result(&interim, &final_text, cx)
            }

            InboundEvent::Speak { text, rate } => {
                synthesis.speak(&text, rate, voices.selected.as_ref(), synth.as_mut(), cx)
            }
            InboundEvent::StopSpeaking => synthesis.stop(synth.as_mut(), cx),
            InboundEvent::ChangeVoice { voice_uri } => voices.change(&voice_uri, cx),
            InboundEvent::VoicesChanged { voices: list } => voices.on_voices_changed(list, cx),

            InboundEvent::SynthesisStart => synthesis.on_start(cx),
            InboundEvent::SynthesisEnd => synthesis.on_end(cx),
            InboundEvent::SynthesisError { code } => synthesis.on_error(&code, cx),
            InboundEvent::WordBoundary { word, elapsed_ms } => synthesis.on_boundary(&word, elapsed_ms, cx),
            InboundEvent::CharBoundary { char_index, elapsed_ms } => {
                synthesis.on_char_boundary(char_index, elapsed_ms, cx)
            }
            InboundEvent::AmplitudeSample { level } => synthesis.on_amplitude(level, cx),

            InboundEvent::ChunkReady {
                sequence_index,
                text,
                words,
                duration_ms,
                decode,
            } => synthesis.on_chunk(
                AudioChunk {
                    sequence_index,
                    text,
                    words,
                    reported_duration_ms: duration_ms,
                    decode,
                },
                cx,
            ),
        }
    }

    /// Fire every timer due by now, earliest first
    ///
    /// Each timer runs at its own due time, so a chain of ticks keeps its
    /// cadence even when the caller polls late. Returns true if any fired.
    pub fn run_scheduled(&mut self) -> bool {
        if self.destroyed {
            return false;
        }
        let now = self.clock.now_ms();
        let mut fired = false;

        while let Some(expired) = self.timers.pop_due(now) {
            fired = true;
            let cx = &mut Dispatch::new(expired.due_ms, &mut self.timers, &mut self.outbox);
            match expired.task {
                TimerTask::CountdownTick => {
                    self.recognition.on_countdown_tick(cx);
                }
                task => self.synthesis.on_timer(task, expired.due_ms, cx),
            }
        }
        fired
    }

    /// Take every event emitted so far
    pub fn drain_events(&mut self) -> Vec<OutboundEvent> {
        std::mem::take(&mut self.outbox)
    }

    /// Delay until the next timer is due, for use as a poll timeout
    pub fn time_until_next_scheduled(&self) -> Option<Duration> {
        self.timers.time_until_next(self.clock.now_ms())
    }

    /// Called once per display frame; returns the movement log newest-first
    /// when it changed since the previous frame
    pub fn render_frame(&mut self) -> Option<Vec<MovementEntry>> {
        self.synthesis.dispatcher_mut().take_frame()
    }

    /// Tear down the session: stop devices, cancel every timer, and ignore
    /// all later events
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        let now = self.clock.now_ms();
        let cx = &mut Dispatch::new(now, &mut self.timers, &mut self.outbox);
        self.recognition.shutdown(self.capture.as_mut(), cx);
        self.synthesis.stop(self.synth.as_mut(), cx);
        self.timers.clear();
        self.destroyed = true;
        info!("Orchestrator destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn capture_state(&self) -> CaptureState {
        self.recognition.state()
    }

    pub fn recognition(&self) -> &RecognitionSession {
        &self.recognition
    }

    pub fn synthesis(&self) -> &SynthesisScheduler {
        &self.synthesis
    }

    pub fn timers(&self) -> &TimerQueue {
        &self.timers
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices.available
    }

    pub fn selected_voice(&self) -> Option<&Voice> {
        self.voices.selected.as_ref()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

impl<C: Clock> Drop for Orchestrator<C> {
    fn drop(&mut self) {
        self.destroy();
    }
}
