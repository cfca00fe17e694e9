use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::model::ProsodyError;

/// Default topline/baseline frequencies (Hz) of a voice.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VoiceDefaults {
    pub name: String,
    #[serde(default)]
    pub locale: Option<String>,
    pub top_start: i32,
    pub top_end: i32,
    pub base_start: i32,
    pub base_end: i32,
}

#[derive(Deserialize)]
struct VoiceFile {
    #[serde(default)]
    default: Option<String>,
    voices: Vec<VoiceDefaults>,
}

/// Registry of the voices a document may select.
#[derive(Debug, Clone)]
pub struct VoiceRegistry {
    voices: HashMap<String, VoiceDefaults>,
    /// Name of the voice used when nothing else selects one.
    fallback: String,
}

impl VoiceRegistry {
    pub fn load(path: &Path) -> Result<Self, ProsodyError> {
        let content = std::fs::read_to_string(path)?;
        let registry = Self::from_json_str(&content)?;
        log::info!(
            "Loaded {} voices from {} (default '{}')",
            registry.voices.len(),
            path.display(),
            registry.fallback
        );
        Ok(registry)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ProsodyError> {
        let file: VoiceFile = serde_json::from_str(json)
            .map_err(|e| ProsodyError::VoiceRegistry(format!("Failed to parse JSON: {e}")))?;
        Self::from_voices(file.voices, file.default)
    }

    /// Build a registry. Without an explicit `default` the first voice is used.
    pub fn from_voices(list: Vec<VoiceDefaults>, default: Option<String>) -> Result<Self, ProsodyError> {
        let first = list
            .first()
            .map(|v| v.name.clone())
            .ok_or_else(|| ProsodyError::VoiceRegistry("No voices defined".to_string()))?;

        let mut voices = HashMap::with_capacity(list.len());
        for voice in list {
            if voice.top_start < voice.base_start || voice.top_end < voice.base_end {
                return Err(ProsodyError::VoiceRegistry(format!(
                    "{}: topline must not lie below baseline",
                    voice.name
                )));
            }
            if voices.contains_key(&voice.name) {
                return Err(ProsodyError::VoiceRegistry(format!(
                    "Duplicate voice {:?}",
                    voice.name
                )));
            }
            voices.insert(voice.name.clone(), voice);
        }

        let fallback = match default {
            Some(name) if voices.contains_key(&name) => name,
            Some(name) => {
                return Err(ProsodyError::VoiceRegistry(format!(
                    "Default voice {name:?} is not defined"
                )))
            }
            None => first,
        };
        Ok(Self { voices, fallback })
    }

    pub fn get(&self, name: &str) -> Result<&VoiceDefaults, ProsodyError> {
        self.voices
            .get(name)
            .ok_or_else(|| ProsodyError::VoiceNotFound(name.to_string()))
    }

    /// Pick a voice: the explicitly named one, then the per-call default,
    /// then the first voice for `locale`, then the registry default.
    ///
    /// Unknown explicit names are logged and skipped.
    pub fn resolve(
        &self,
        explicit: Option<&str>,
        per_call: Option<&str>,
        locale: Option<&str>,
    ) -> &VoiceDefaults {
        for name in [explicit, per_call].into_iter().flatten() {
            match self.voices.get(name) {
                Some(voice) => return voice,
                None => log::warn!("Voice '{name}' not found, falling back"),
            }
        }
        if let Some(locale) = locale {
            let by_locale = self
                .list_voices()
                .into_iter()
                .filter_map(|name| self.voices.get(name))
                .find(|v| v.locale.as_deref() == Some(locale));
            if let Some(voice) = by_locale {
                return voice;
            }
        }
        &self.voices[&self.fallback]
    }

    pub fn default_voice(&self) -> &VoiceDefaults {
        &self.voices[&self.fallback]
    }

    /// List all available voice names in sorted order.
    pub fn list_voices(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.voices.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTRY: &str = r#"{
        "default": "kim",
        "voices": [
            {"name": "anna", "locale": "de", "top_start": 300, "top_end": 260, "base_start": 180, "base_end": 150},
            {"name": "kim", "locale": "en", "top_start": 220, "top_end": 200, "base_start": 110, "base_end": 100}
        ]
    }"#;

    #[test]
    fn resolution_order() {
        let registry = VoiceRegistry::from_json_str(REGISTRY).unwrap();
        assert_eq!(registry.resolve(Some("anna"), Some("kim"), None).name, "anna");
        assert_eq!(registry.resolve(Some("nobody"), Some("anna"), None).name, "anna");
        assert_eq!(registry.resolve(None, None, Some("de")).name, "anna");
        assert_eq!(registry.resolve(None, None, Some("fr")).name, "kim");
        assert_eq!(registry.resolve(None, None, None).name, "kim");
    }

    #[test]
    fn first_voice_is_default_without_explicit_default() {
        let voices = vec![VoiceDefaults {
            name: "solo".into(),
            locale: None,
            top_start: 200,
            top_end: 180,
            base_start: 100,
            base_end: 90,
        }];
        let registry = VoiceRegistry::from_voices(voices, None).unwrap();
        assert_eq!(registry.default_voice().name, "solo");
        assert_eq!(registry.list_voices(), vec!["solo"]);
    }

    #[test]
    fn unknown_voice_lookup_fails() {
        let registry = VoiceRegistry::from_json_str(REGISTRY).unwrap();
        assert!(matches!(registry.get("x"), Err(ProsodyError::VoiceNotFound(_))));
    }

    #[test]
    fn rejects_bad_registries() {
        assert!(VoiceRegistry::from_json_str(r#"{"voices": []}"#).is_err());
        let undefined_default = r#"{"default": "x", "voices": [
            {"name": "a", "top_start": 2, "top_end": 2, "base_start": 1, "base_end": 1}]}"#;
        assert!(VoiceRegistry::from_json_str(undefined_default).is_err());
        let inverted = r#"{"voices": [
            {"name": "a", "top_start": 1, "top_end": 2, "base_start": 5, "base_end": 1}]}"#;
        assert!(VoiceRegistry::from_json_str(inverted).is_err());
    }
}
