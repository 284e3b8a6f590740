//! Speech capture session
//!
//! Tracks the capture lifecycle (Idle, Listening, Muted), forwards results
//! while not muted, and decides when a finished utterance should be
//! submitted automatically through the countdown.

use super::countdown::CountdownScheduler;
use crate::devices::CaptureDevice;
use crate::events::{Dispatch, OutboundEvent};
use crate::TalkbackError;
use log::{debug, info, warn};

/// Capture lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Listening,
    Muted,
}

/// Error codes reported by a capture device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    NotAllowed,
    NoSpeech,
    AudioCapture,
    Network,
    NotFound,
    Other(String),
}

impl RecognitionErrorKind {
    /// Parse a device error code
    pub fn from_code(code: &str) -> Self {
        match code {
            "not-allowed" | "service-not-allowed" | "NotAllowedError" => Self::NotAllowed,
            "no-speech" => Self::NoSpeech,
            "audio-capture" => Self::AudioCapture,
            "network" => Self::Network,
            "not-found" | "NotFoundError" => Self::NotFound,
            other => Self::Other(other.to_string()),
        }
    }

    /// User-facing message for this error
    pub fn message(&self) -> String {
        match self {
            Self::NotAllowed => "Microphone access denied. Please allow microphone access and try again.".into(),
            Self::NoSpeech => "No speech detected. Please try speaking again.".into(),
            Self::AudioCapture => "Microphone not found or not working.".into(),
            Self::Network => "Network error occurred during speech recognition.".into(),
            Self::NotFound => "No microphone found. Please connect a microphone and try again.".into(),
            Self::Other(code) => format!("Speech recognition error: {}", code),
        }
    }
}

impl From<RecognitionErrorKind> for TalkbackError {
    fn from(kind: RecognitionErrorKind) -> Self {
        let message = kind.message();
        match kind {
            RecognitionErrorKind::NotAllowed => TalkbackError::PermissionDenied(message),
            RecognitionErrorKind::NoSpeech
            | RecognitionErrorKind::AudioCapture
            | RecognitionErrorKind::NotFound => TalkbackError::Device(message),
            RecognitionErrorKind::Network => TalkbackError::Network(message),
            RecognitionErrorKind::Other(_) => TalkbackError::Other(message),
        }
    }
}

/// Timing knobs for the capture session
#[derive(Debug, Clone, Copy)]
pub struct RecognitionSettings {
    /// Countdown length before auto-submit
    pub countdown_delay_ms: u64,
    /// A session must run longer than this before its end triggers a countdown
    pub min_listen_ms: u64,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            countdown_delay_ms: 1000,
            min_listen_ms: 1000,
        }
    }
}

/// Capture session state machine
pub struct RecognitionSession {
    state: CaptureState,
    started_at: Option<f64>,
    muted_at: Option<f64>,
    /// A start or stop request is waiting for the device to confirm
    awaiting_device: bool,
    settings: RecognitionSettings,
    countdown: CountdownScheduler,
}

impl RecognitionSession {
    pub fn new(settings: RecognitionSettings) -> Self {
        Self {
            state: CaptureState::Idle,
            started_at: None,
            muted_at: None,
            awaiting_device: false,
            settings,
            countdown: CountdownScheduler::new(),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn started_at(&self) -> Option<f64> {
        self.started_at
    }

    pub fn muted_at(&self) -> Option<f64> {
        self.muted_at
    }

    pub fn is_muted(&self) -> bool {
        self.state == CaptureState::Muted
    }

    pub fn countdown(&self) -> &CountdownScheduler {
        &self.countdown
    }

    /// UI asked to start listening
    ///
    /// Asks the device to start; the session only becomes Listening once the
    /// device confirms with `on_device_start`.
    pub fn start(&mut self, device: &mut dyn CaptureDevice, cx: &mut Dispatch<'_>) {
        if !device.is_available() {
            info!("Speech capture not supported");
            cx.emit(OutboundEvent::SpeechNotSupported);
            return;
        }
        if self.state != CaptureState::Idle {
            debug!("Start ignored, already {:?}", self.state);
            return;
        }

        self.countdown.cancel(cx);
        match device.start() {
            Ok(()) => {
                self.awaiting_device = true;
                debug!("Capture start requested");
            }
            Err(e) => {
                warn!("Capture device failed to start: {}", e);
                self.awaiting_device = false;
                cx.emit(OutboundEvent::SpeechError {
                    message: e.user_message(),
                });
            }
        }
    }

    /// Device confirmed capture is running
    ///
    /// Only a session that is not already running starts; a repeated start
    /// keeps the mute and the original start time.
    pub fn on_device_start(&mut self, cx: &mut Dispatch<'_>) {
        if self.state != CaptureState::Idle {
            debug!("Capture start ignored while {:?}", self.state);
            return;
        }
        self.state = CaptureState::Listening;
        self.started_at = Some(cx.now_ms);
        self.muted_at = None;
        self.awaiting_device = false;
        self.countdown.cancel(cx);
        info!("Listening");
        cx.emit(OutboundEvent::SpeechStarted);
    }

    /// Device reported that capture ended
    pub fn on_device_end(&mut self, cx: &mut Dispatch<'_>) {
        match self.state {
            CaptureState::Idle => {
                // Only the end that follows our own stop is reported
                if self.awaiting_device {
                    self.awaiting_device = false;
                    cx.emit(OutboundEvent::SpeechEnded);
                } else {
                    debug!("Capture end ignored while idle");
                }
            }
            CaptureState::Listening | CaptureState::Muted => {
                let was_muted = self.is_muted();
                self.state = CaptureState::Idle;
                self.muted_at = None;
                cx.emit(OutboundEvent::SpeechEnded);

                let ran_for = self.started_at.map(|t| cx.now_ms - t).unwrap_or(0.0);
                if !was_muted && ran_for > self.settings.min_listen_ms as f64 {
                    debug!("Capture ran {:.0}ms, scheduling auto-submit", ran_for);
                    self.countdown.schedule(self.settings.countdown_delay_ms, cx);
                } else {
                    debug!("No auto-submit: ran {:.0}ms, muted={}", ran_for, was_muted);
                }
            }
        }
    }

    /// UI asked to stop listening
    pub fn stop(&mut self, device: &mut dyn CaptureDevice, cx: &mut Dispatch<'_>) {
        if self.state == CaptureState::Idle {
            debug!("Stop ignored while idle");
            return;
        }
        self.countdown.cancel(cx);
        self.state = CaptureState::Idle;
        self.muted_at = None;
        self.awaiting_device = true;
        if let Err(e) = device.stop() {
            warn!("Capture device failed to stop: {}", e);
        }
        info!("Listening stopped");
    }

    /// Gate result forwarding and countdowns without stopping the device
    pub fn mute(&mut self, cx: &mut Dispatch<'_>) {
        if self.state != CaptureState::Listening {
            debug!("Mute ignored while {:?}", self.state);
            return;
        }
        self.state = CaptureState::Muted;
        self.muted_at = Some(cx.now_ms);
        self.countdown.cancel(cx);
        cx.emit(OutboundEvent::SpeechMuted);
    }

    pub fn unmute(&mut self, cx: &mut Dispatch<'_>) {
        if self.state != CaptureState::Muted {
            debug!("Unmute ignored while {:?}", self.state);
            return;
        }
        self.state = CaptureState::Listening;
        self.muted_at = None;
        cx.emit(OutboundEvent::SpeechUnmuted);
    }

    /// Device reported an error; the session returns to Idle
    pub fn on_device_error(&mut self, kind: RecognitionErrorKind, cx: &mut Dispatch<'_>) {
        let err: TalkbackError = kind.into();
        warn!("Speech recognition error: {}", err);
        self.state = CaptureState::Idle;
        self.muted_at = None;
        self.awaiting_device = false;
        self.countdown.cancel(cx);
        cx.emit(OutboundEvent::SpeechError {
            message: err.user_message(),
        });
    }

    /// Device produced transcription results
    pub fn on_result(&mut self, interim: &str, final_text: &str, cx: &mut Dispatch<'_>) {
        if self.is_muted() {
            return;
        }
        cx.emit(OutboundEvent::SpeechInterim {
            text: interim.to_string(),
        });
        if !final_text.is_empty() {
            cx.emit(OutboundEvent::SpeechFinal {
                text: final_text.to_string(),
            });
            self.countdown.schedule(self.settings.countdown_delay_ms, cx);
        }
    }

    /// Countdown tick expired; returns true when the utterance must be submitted
    pub fn on_countdown_tick(&mut self, cx: &mut Dispatch<'_>) -> bool {
        let submit = self.countdown.on_tick(cx);
        if submit {
            info!("Auto-submitting speech");
            cx.emit(OutboundEvent::AutoSubmitSpeech);
        }
        submit
    }

    /// Submit right away, dropping any live countdown
    pub fn submit_now(&mut self, cx: &mut Dispatch<'_>) {
        self.countdown.cancel(cx);
        cx.emit(OutboundEvent::AutoSubmitSpeech);
    }

    /// Tear down: cancel the countdown and release the device
    pub fn shutdown(&mut self, device: &mut dyn CaptureDevice, cx: &mut Dispatch<'_>) {
        self.countdown.cancel(cx);
        if self.state != CaptureState::Idle {
            if let Err(e) = device.stop() {
                warn!("Capture device failed to stop: {}", e);
            }
        }
        self.state = CaptureState::Idle;
        self.muted_at = None;
        self.awaiting_device = false;
    }
}
