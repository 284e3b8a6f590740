//! Configuration management

use crate::speech::queue_clock::DEFAULT_GAP_MS;
use crate::speech::{RecognitionSettings, SynthesisSettings};
use crate::{Result, TalkbackError};
use ini::Ini;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// Persistent settings stored in `~/.talkback.cfg`
pub struct Config {
    /// INI configuration storage
    ini: Ini,

    /// Config file path
    path: PathBuf,
}

/// Settings for the animation dispatcher
#[derive(Debug, Clone, Copy)]
pub struct AnimationSettings {
    /// Movement log entries kept
    pub log_capacity: usize,
    pub oscilloscope: bool,
    pub oscilloscope_width: i32,
}

impl Default for AnimationSettings {
    fn default() -> Self {
        Self {
            log_capacity: 100,
            oscilloscope: true,
            oscilloscope_width: 400,
        }
    }
}

/// Everything the orchestrator needs, resolved from config
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub recognition: RecognitionSettings,
    pub synthesis: SynthesisSettings,
    pub animation: AnimationSettings,
    pub inter_chunk_gap_ms: f64,
    pub amplitude_threshold: f32,
    /// Preferred voice URI, used when the device reports it
    pub voice: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            recognition: RecognitionSettings::default(),
            synthesis: SynthesisSettings::default(),
            animation: AnimationSettings::default(),
            inter_chunk_gap_ms: DEFAULT_GAP_MS,
            amplitude_threshold: 5.0,
            voice: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_path())
    }

    /// Load configuration from `path`, creating it with defaults if missing
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        debug!("Loading config from {:?}", path);

        let ini = if path.exists() {
            Ini::load_from_file(&path)
                .map_err(|e| TalkbackError::IniParse(format!("Failed to load config: {}", e)))?
        } else {
            info!("Config file not found, creating default");
            let default = Self::default_config();
            default
                .write_to_file(&path)
                .map_err(|e| TalkbackError::IniParse(format!("Failed to write config: {}", e)))?;
            default
        };

        Ok(Self { ini, path })
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        debug!("Saving config to {:?}", self.path);
        self.ini
            .write_to_file(&self.path)
            .map_err(|e| TalkbackError::Config(format!("Failed to save config: {}", e)))
    }

    fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".talkback.cfg")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn default_config() -> Ini {
        let mut ini = Ini::new();

        ini.with_section(Some("recognition"))
            .set("countdown_delay_ms", "1000")
            .set("min_listen_ms", "1000");

        ini.with_section(Some("synthesis"))
            .set("use_syllable_timing", "true")
            .set("use_amplitude_fallback", "false")
            .set("rate", "0.9")
            .set("last_word_syllable_ms", "150")
            .set("inter_chunk_gap_ms", "300")
            .set("subtitle_clear_ms", "2000")
            .set("amplitude_threshold", "5");

        ini.with_section(Some("animation"))
            .set("log_capacity", "100")
            .set("oscilloscope", "true")
            .set("oscilloscope_width", "400");

        ini
    }

    /// Get a boolean value from config
    pub fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get a string value from config
    pub fn get_string(&self, section: &str, key: &str, default: &str) -> String {
        self.ini
            .get_from(Some(section), key)
            .unwrap_or(default)
            .to_string()
    }

    /// Get an integer value from config
    pub fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get a float value from config
    pub fn get_float(&self, section: &str, key: &str, default: f64) -> f64 {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Set a value in config
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.ini.with_section(Some(section)).set(key, value);
    }

    /// Non-negative millisecond value; negative entries fall back to the default
    fn get_ms(&self, section: &str, key: &str, default: u64) -> u64 {
        let value = self.get_int(section, key, default as i64);
        u64::try_from(value).unwrap_or_else(|_| {
            warn!("Ignoring negative {}.{} = {}", section, key, value);
            default
        })
    }

    /// Countdown length before auto-submit
    pub fn countdown_delay_ms(&self) -> u64 {
        self.get_ms("recognition", "countdown_delay_ms", 1000)
    }

    pub fn min_listen_ms(&self) -> u64 {
        self.get_ms("recognition", "min_listen_ms", 1000)
    }

    pub fn use_syllable_timing(&self) -> bool {
        self.get_bool("synthesis", "use_syllable_timing", true)
    }

    pub fn use_amplitude_fallback(&self) -> bool {
        self.get_bool("synthesis", "use_amplitude_fallback", false)
    }

    /// Speech rate, 1.0 is normal speed
    pub fn rate(&self) -> f32 {
        let rate = self.get_float("synthesis", "rate", 0.9);
        if rate > 0.0 && rate <= 10.0 {
            rate as f32
        } else {
            warn!("Speech rate {} out of range, using 0.9", rate);
            0.9
        }
    }

    pub fn last_word_syllable_ms(&self) -> f64 {
        self.get_ms("synthesis", "last_word_syllable_ms", 150) as f64
    }

    pub fn inter_chunk_gap_ms(&self) -> f64 {
        self.get_ms("synthesis", "inter_chunk_gap_ms", DEFAULT_GAP_MS as u64) as f64
    }

    pub fn subtitle_clear_ms(&self) -> f64 {
        self.get_ms("synthesis", "subtitle_clear_ms", 2000) as f64
    }

    pub fn amplitude_threshold(&self) -> f32 {
        self.get_float("synthesis", "amplitude_threshold", 5.0) as f32
    }

    /// Preferred voice URI
    pub fn voice(&self) -> Option<String> {
        self.ini
            .get_from(Some("synthesis"), "voice")
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn animation(&self) -> AnimationSettings {
        let defaults = AnimationSettings::default();
        AnimationSettings {
            log_capacity: self.get_ms("animation", "log_capacity", defaults.log_capacity as u64).max(1) as usize,
            oscilloscope: self.get_bool("animation", "oscilloscope", defaults.oscilloscope),
            oscilloscope_width: self.oscilloscope_width(defaults.oscilloscope_width),
        }
    }

    /// Trace width in pixels; values that do not fit an i32 fall back to the default
    fn oscilloscope_width(&self, default: i32) -> i32 {
        let value = self.get_int("animation", "oscilloscope_width", i64::from(default));
        i32::try_from(value).unwrap_or_else(|_| {
            warn!("Ignoring out of range animation.oscilloscope_width = {}", value);
            default
        })
    }

    /// Resolve every setting the orchestrator uses
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            recognition: RecognitionSettings {
                countdown_delay_ms: self.countdown_delay_ms(),
                min_listen_ms: self.min_listen_ms(),
            },
            synthesis: SynthesisSettings {
                rate: self.rate(),
                use_syllable_timing: self.use_syllable_timing(),
                use_amplitude_fallback: self.use_amplitude_fallback(),
                last_word_syllable_ms: self.last_word_syllable_ms(),
                subtitle_clear_ms: self.subtitle_clear_ms(),
            },
            animation: self.animation(),
            inter_chunk_gap_ms: self.inter_chunk_gap_ms(),
            amplitude_threshold: self.amplitude_threshold(),
            voice: self.voice(),
        }
    }
}
