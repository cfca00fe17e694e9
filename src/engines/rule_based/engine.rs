use std::path::{Path, PathBuf};

use derive_builder::Builder;

use crate::tree::AnnotationTree;
use crate::{ProsodyEngine, ProsodyResult};

use super::model::{ProsodyError, RuleModel};

/// File names of the rule resources inside a rules directory.
#[derive(Debug, Clone, Builder)]
#[builder(default, setter(into))]
pub struct RuleModelParams {
    /// Tone label to target specifications.
    pub tone_rules: String,
    /// Flat Klatt rule percentages.
    pub klatt_rules: String,
    pub phonemes: String,
    pub voices: String,
}

impl Default for RuleModelParams {
    fn default() -> Self {
        Self {
            tone_rules: "tonerules.json".to_string(),
            klatt_rules: "klattrules.json".to_string(),
            phonemes: "phonemes.json".to_string(),
            voices: "voices.json".to_string(),
        }
    }
}

/// Parameters for one processing call.
#[derive(Debug, Clone, Default)]
pub struct ProcessParams {
    /// Voice used by phrases whose voice element names no (known) voice.
    /// `None` falls back to locale matching, then the registry default.
    pub voice: Option<String>,
}

/// Rule-based prosody engine.
///
/// ```rust,no_run
/// use tts_prosody::{ProsodyEngine, engines::rule_based::RuleBasedEngine};
/// use std::path::PathBuf;
///
/// let mut engine = RuleBasedEngine::new();
/// engine.load_rules(&PathBuf::from("rules/en"))?;
/// engine.process_file(&PathBuf::from("in.json"), &PathBuf::from("out.json"), None)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct RuleBasedEngine {
    model: Option<RuleModel>,
    rules_path: Option<PathBuf>,
}

impl Default for RuleBasedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleBasedEngine {
    pub fn new() -> Self {
        Self {
            model: None,
            rules_path: None,
        }
    }

    /// Wrap an already assembled rule model.
    pub fn with_model(model: RuleModel) -> Self {
        Self {
            model: Some(model),
            rules_path: None,
        }
    }

    /// Directory the current rules were loaded from, if any.
    pub fn rules_path(&self) -> Option<&Path> {
        self.rules_path.as_deref()
    }

    /// List all available voice names (requires rules to be loaded).
    pub fn list_voices(&self) -> Vec<&str> {
        self.model
            .as_ref()
            .map(|m| m.list_voices())
            .unwrap_or_default()
    }
}

impl Drop for RuleBasedEngine {
    fn drop(&mut self) {
        self.unload_rules();
    }
}

impl ProsodyEngine for RuleBasedEngine {
    type ProcessParams = ProcessParams;
    type ModelParams = RuleModelParams;

    fn load_rules_with_params(
        &mut self,
        rules_path: &Path,
        params: Self::ModelParams,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let model = RuleModel::load(rules_path, &params)?;
        self.model = Some(model);
        self.rules_path = Some(rules_path.to_path_buf());
        Ok(())
    }

    fn unload_rules(&mut self) {
        self.model = None;
        self.rules_path = None;
    }

    fn process(
        &mut self,
        tree: &mut AnnotationTree,
        params: Option<Self::ProcessParams>,
    ) -> Result<ProsodyResult, Box<dyn std::error::Error>> {
        let model = self.model.as_ref().ok_or(ProsodyError::RulesNotLoaded)?;

        let p = params.unwrap_or_default();
        let summary = model.process(tree, p.voice.as_deref())?;
        Ok(ProsodyResult::from_tree(tree, summary.targets_written))
    }
}
