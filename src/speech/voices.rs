//! Voice catalogue and default voice selection

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A synthesis voice as reported by the synthesis device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    pub lang: String,
    pub voice_uri: String,
    #[serde(default)]
    pub local_service: bool,
    #[serde(default)]
    pub default: bool,
}

/// Display names for common language tags
static REGIONS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("en-US", "English (US)");
    m.insert("en-GB", "English (UK)");
    m.insert("en-CA", "English (Canada)");
    m.insert("en-AU", "English (Australia)");
    m.insert("en-IN", "English (India)");
    m.insert("en-IE", "English (Ireland)");
    m.insert("en-ZA", "English (South Africa)");
    m.insert("es-ES", "Spanish (Spain)");
    m.insert("es-MX", "Spanish (Mexico)");
    m.insert("es-US", "Spanish (US)");
    m.insert("fr-FR", "French (France)");
    m.insert("fr-CA", "French (Canada)");
    m.insert("de-DE", "German");
    m.insert("it-IT", "Italian");
    m.insert("pt-BR", "Portuguese (Brazil)");
    m.insert("pt-PT", "Portuguese (Portugal)");
    m.insert("ja-JP", "Japanese");
    m.insert("ko-KR", "Korean");
    m.insert("zh-CN", "Chinese (Simplified)");
    m.insert("zh-TW", "Chinese (Traditional)");
    m.insert("ru-RU", "Russian");
    m.insert("ar-SA", "Arabic");
    m.insert("hi-IN", "Hindi");
    m.insert("th-TH", "Thai");
    m.insert("vi-VN", "Vietnamese");
    m
});

/// Region heading for a language tag
pub fn region_name(lang: &str) -> &str {
    if lang.is_empty() {
        return "Other";
    }
    REGIONS.get(lang).copied().unwrap_or(lang)
}

/// Group voices under their region heading
pub fn categorize(voices: &[Voice]) -> BTreeMap<String, Vec<Voice>> {
    let mut categories: BTreeMap<String, Vec<Voice>> = BTreeMap::new();
    for voice in voices {
        categories
            .entry(region_name(&voice.lang).to_string())
            .or_default()
            .push(voice.clone());
    }
    categories
}

/// Preferred US English voice names, best first
const PREFERRED_US: &[&str] = &["samantha", "alex", "allison", "ava", "susan", "karen", "female"];

/// Pick a default voice: preferred US English voices, then other English
/// variants, then anything
pub fn select_default(voices: &[Voice]) -> Option<&Voice> {
    let us = |v: &&Voice| v.lang == "en-US";

    for name in PREFERRED_US {
        if let Some(v) = voices
            .iter()
            .filter(us)
            .find(|v| v.name.to_lowercase().contains(name))
        {
            return Some(v);
        }
    }

    ["en-US", "en-CA", "en-AU", "en-GB"]
        .iter()
        .find_map(|lang| voices.iter().find(|v| v.lang == *lang))
        .or_else(|| voices.iter().find(|v| v.lang.starts_with("en")))
        .or_else(|| voices.first())
}
