//! Configuration loading tests
//!
//! Tests that configuration is created with defaults when missing, and that
//! edited values reach the orchestrator settings.

use std::fs;
use talkback::config::{Config, OrchestratorConfig};

#[test]
fn test_missing_config_is_created_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("talkback.cfg");

    let config = Config::load_from(path.clone()).expect("Failed to load config");
    assert!(path.exists());
    assert_eq!(config.path(), path.as_path());

    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("[recognition]"));
    assert!(written.contains("countdown_delay_ms=1000"));

    let resolved = config.orchestrator_config();
    let defaults = OrchestratorConfig::default();
    assert_eq!(resolved.recognition.countdown_delay_ms, defaults.recognition.countdown_delay_ms);
    assert_eq!(resolved.recognition.min_listen_ms, 1000);
    assert!(resolved.synthesis.use_syllable_timing);
    assert!(!resolved.synthesis.use_amplitude_fallback);
    assert_eq!(resolved.synthesis.rate, 0.9);
    assert_eq!(resolved.synthesis.last_word_syllable_ms, 150.0);
    assert_eq!(resolved.synthesis.subtitle_clear_ms, 2000.0);
    assert_eq!(resolved.inter_chunk_gap_ms, 300.0);
    assert_eq!(resolved.amplitude_threshold, 5.0);
    assert_eq!(resolved.animation.log_capacity, 100);
    assert!(resolved.voice.is_none());
}

#[test]
fn test_edited_values_are_used() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("talkback.cfg");
    fs::write(
        &path,
        "[recognition]\ncountdown_delay_ms=2000\n\n\
         [synthesis]\nuse_syllable_timing=false\nuse_amplitude_fallback=true\nvoice=com.apple.voice.Alex\n\n\
         [animation]\noscilloscope=false\n",
    )
    .unwrap();

    let resolved = Config::load_from(path).unwrap().orchestrator_config();
    assert_eq!(resolved.recognition.countdown_delay_ms, 2000);
    assert!(!resolved.synthesis.use_syllable_timing);
    assert!(resolved.synthesis.use_amplitude_fallback);
    assert!(!resolved.animation.oscilloscope);
    assert_eq!(resolved.voice.as_deref(), Some("com.apple.voice.Alex"));
    // Keys left out keep their defaults
    assert_eq!(resolved.recognition.min_listen_ms, 1000);
}

#[test]
fn test_bad_values_fall_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("talkback.cfg");
    fs::write(
        &path,
        "[recognition]\ncountdown_delay_ms=-5\nmin_listen_ms=soon\n\n[synthesis]\nrate=0\n",
    )
    .unwrap();

    let config = Config::load_from(path).unwrap();
    assert_eq!(config.countdown_delay_ms(), 1000);
    assert_eq!(config.min_listen_ms(), 1000);
    assert_eq!(config.rate(), 0.9);
}

#[test]
fn test_oversized_oscilloscope_width_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("talkback.cfg");
    fs::write(&path, "[animation]\noscilloscope_width=99999999999\n").unwrap();

    let config = Config::load_from(path).unwrap();
    assert_eq!(config.animation().oscilloscope_width, 400);

    fs::write(config.path(), "[animation]\noscilloscope_width=640\n").unwrap();
    let config = Config::load_from(config.path().to_path_buf()).unwrap();
    assert_eq!(config.animation().oscilloscope_width, 640);
}

#[test]
fn test_set_and_save() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("talkback.cfg");

    let mut config = Config::load_from(path.clone()).unwrap();
    config.set("synthesis", "rate", "1.25");
    config.save().unwrap();

    let reloaded = Config::load_from(path).unwrap();
    assert_eq!(reloaded.rate(), 1.25);
    assert_eq!(reloaded.get_string("synthesis", "rate", ""), "1.25");
}
