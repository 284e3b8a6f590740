//! Capture and synthesis capability providers
//!
//! Recognition and synthesis themselves are external. The orchestrator only
//! asks devices to start, stop, speak or cancel; results come back as
//! inbound events.

use crate::speech::voices::Voice;
use crate::{Result, TalkbackError};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Speech capture (recognition) device
pub trait CaptureDevice: Send {
    /// Whether speech capture exists at all on this platform
    fn is_available(&self) -> bool;

    /// Begin capture; confirmation arrives later as `recognition_start`
    fn start(&mut self) -> Result<()>;

    /// Stop capture; the device follows up with `recognition_end`
    fn stop(&mut self) -> Result<()>;
}

/// Speech synthesizer
///
/// Progress (start, boundaries, end, errors) is reported back as inbound
/// events.
pub trait Synth: Send {
    /// Whether speech synthesis exists at all on this platform
    fn is_available(&self) -> bool;

    /// Speak text with an optional voice at the given rate (1.0 is normal)
    fn speak(&mut self, text: &str, voice: Option<&Voice>, rate: f32) -> Result<()>;

    /// Silence current speech
    fn cancel(&mut self) -> Result<()>;
}

/// Commands sent to external devices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum DeviceCommand {
    StartCapture,
    StopCapture,
    Speak {
        text: String,
        voice_uri: Option<String>,
        rate: f32,
    },
    CancelSpeech,
}

/// Shared queue of device commands awaiting delivery
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    inner: Arc<Mutex<Vec<DeviceCommand>>>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, cmd: DeviceCommand) -> Result<()> {
        debug!("Device command: {:?}", cmd);
        self.inner
            .lock()
            .map_err(|_| TalkbackError::Other("device command queue poisoned".into()))?
            .push(cmd);
        Ok(())
    }

    /// Take every queued command
    pub fn drain(&self) -> Vec<DeviceCommand> {
        match self.inner.lock() {
            Ok(mut queue) => std::mem::take(&mut *queue),
            Err(_) => Vec::new(),
        }
    }
}

/// Capture device that forwards its commands through a `CommandQueue`
pub struct QueuedCapture {
    queue: CommandQueue,
    available: bool,
}

impl QueuedCapture {
    pub fn new(queue: CommandQueue, available: bool) -> Self {
        Self { queue, available }
    }
}

impl CaptureDevice for QueuedCapture {
    fn is_available(&self) -> bool {
        self.available
    }

    fn start(&mut self) -> Result<()> {
        if !self.available {
            return Err(TalkbackError::NotSupported("Speech recognition not supported".into()));
        }
        self.queue.push(DeviceCommand::StartCapture)
    }

    fn stop(&mut self) -> Result<()> {
        self.queue.push(DeviceCommand::StopCapture)
    }
}

/// Synthesizer that forwards its commands through a `CommandQueue`
pub struct QueuedSynth {
    queue: CommandQueue,
    available: bool,
}

impl QueuedSynth {
    pub fn new(queue: CommandQueue, available: bool) -> Self {
        Self { queue, available }
    }
}

impl Synth for QueuedSynth {
    fn is_available(&self) -> bool {
        self.available
    }

    fn speak(&mut self, text: &str, voice: Option<&Voice>, rate: f32) -> Result<()> {
        if !self.available {
            return Err(TalkbackError::NotSupported(
                "Text-to-speech not supported".into(),
            ));
        }
        self.queue.push(DeviceCommand::Speak {
            text: text.to_string(),
            voice_uri: voice.map(|v| v.voice_uri.clone()),
            rate,
        })
    }

    fn cancel(&mut self) -> Result<()> {
        self.queue.push(DeviceCommand::CancelSpeech)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queued_synth_records_commands() {
        let queue = CommandQueue::new();
        let mut synth = QueuedSynth::new(queue.clone(), true);
        synth.speak("hello", None, 0.9).unwrap();
        synth.cancel().unwrap();

        assert_eq!(
            queue.drain(),
            vec![
                DeviceCommand::Speak {
                    text: "hello".into(),
                    voice_uri: None,
                    rate: 0.9
                },
                DeviceCommand::CancelSpeech
            ]
        );
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_unavailable_devices_refuse() {
        let queue = CommandQueue::new();
        let mut capture = QueuedCapture::new(queue.clone(), false);
        assert!(!capture.is_available());
        assert!(matches!(capture.start(), Err(TalkbackError::NotSupported(_))));
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_command_json() {
        let json = serde_json::to_string(&DeviceCommand::StartCapture).unwrap();
        assert_eq!(json, r#"{"command":"start_capture"}"#);
    }
}
