use std::collections::HashMap;
use std::path::Path;

use super::model::ProsodyError;

/// Value used for a rule parameter that is absent from the table.
pub const NEUTRAL_PERCENT: i32 = 100;

/// Flat table of Klatt duration-rule percentages, e.g. `rule2.nucleus`.
#[derive(Debug, Clone, Default)]
pub struct KlattParams {
    values: HashMap<String, i32>,
}

impl KlattParams {
    /// Load the parameter table from a JSON object mapping keys to integers.
    pub fn load(path: &Path) -> Result<Self, ProsodyError> {
        let content = std::fs::read_to_string(path)?;
        let params = Self::from_json_str(&content)?;
        log::info!(
            "Loaded {} Klatt rule parameters from {}",
            params.values.len(),
            path.display()
        );
        Ok(params)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ProsodyError> {
        let json: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| ProsodyError::KlattRules(format!("Failed to parse JSON: {e}")))?;
        let obj = json
            .as_object()
            .ok_or_else(|| ProsodyError::KlattRules("Top level must be an object".to_string()))?;

        let mut values = HashMap::with_capacity(obj.len());
        for (key, value) in obj {
            let percent = value
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .ok_or_else(|| {
                    ProsodyError::KlattRules(format!("Non-integer value for key {key:?}: {value}"))
                })?;
            values.insert(key.clone(), percent);
        }
        Ok(Self { values })
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, i32)>) -> Self {
        Self {
            values: pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }

    /// The percentage stored under `key`, or [`NEUTRAL_PERCENT`] with a warning.
    pub fn get(&self, key: &str) -> i32 {
        match self.values.get(key) {
            Some(v) => *v,
            None => {
                log::warn!("Klatt rule parameter `{key}' missing, using {NEUTRAL_PERCENT}");
                NEUTRAL_PERCENT
            }
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
