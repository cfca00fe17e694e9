//! # tts-prosody
//!
//! The prosody stage of a rule-based text-to-speech pipeline: takes an
//! annotated utterance tree and assigns segment durations, pause lengths
//! and fundamental-frequency targets.
//!
//! ## Features
//!
//! - **Klatt Durations**: multiplicative duration rules from a flat parameter table
//! - **Pitch Ranges**: per-phrase and per-scope topline/baseline with pitch and range transforms
//! - **Tone Rules**: ToBI-style tone labels mapped to F0 targets with conflict resolution
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! tts-prosody = "2026.2"
//! ```
//!
//! ```ignore
//! use std::path::PathBuf;
//! use tts_prosody::{engines::rule_based::RuleBasedEngine, ProsodyEngine};
//!
//! let mut engine = RuleBasedEngine::new();
//! engine.load_rules(&PathBuf::from("rules/en"))?;
//!
//! engine.process_file(&PathBuf::from("in.json"), &PathBuf::from("out.json"), None)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod engines;
pub mod tree;

use std::path::Path;

use serde::Serialize;

use tree::{AnnotationTree, NodeKind};

/// Summary of one prosody pass over an utterance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProsodyResult {
    /// Segments that received a duration
    pub segments: usize,
    /// Boundaries left in the tree after adjustment
    pub boundaries: usize,
    /// F0 targets written in this pass
    pub f0_targets: usize,
    /// Sum of all segment durations and pauses
    pub total_duration_ms: i64,
}

impl ProsodyResult {
    pub fn from_tree(tree: &AnnotationTree, f0_targets: usize) -> Self {
        let mut result = Self {
            f0_targets,
            ..Default::default()
        };
        for node in tree.descendants(tree.root()) {
            match tree.kind(node) {
                NodeKind::Segment if tree.has_attr(node, "d") => {
                    result.segments += 1;
                    result.total_duration_ms += i64::from(tree.int_attr_or(node, "d", 0));
                }
                NodeKind::Boundary => {
                    result.boundaries += 1;
                    result.total_duration_ms += i64::from(tree.int_attr_or(node, "duration", 0));
                }
                _ => {}
            }
        }
        result
    }

    /// Write the summary as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Common interface for prosody engines.
///
/// Each engine may have different parameter types for rule loading and processing.
pub trait ProsodyEngine {
    /// Parameters for a single processing call (default voice, etc.)
    type ProcessParams;
    /// Parameters for configuring rule loading (resource file names, etc.)
    type ModelParams: Default;

    /// Load rules from the specified directory using default parameters.
    fn load_rules(&mut self, rules_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        self.load_rules_with_params(rules_path, Self::ModelParams::default())
    }

    /// Load rules from the specified directory with custom parameters.
    fn load_rules_with_params(
        &mut self,
        rules_path: &Path,
        params: Self::ModelParams,
    ) -> Result<(), Box<dyn std::error::Error>>;

    /// Unload the currently loaded rules.
    fn unload_rules(&mut self);

    /// Assign durations and F0 targets to `tree` in place.
    fn process(
        &mut self,
        tree: &mut AnnotationTree,
        params: Option<Self::ProcessParams>,
    ) -> Result<ProsodyResult, Box<dyn std::error::Error>>;

    /// Read a JSON tree, process it and write the result to `output`.
    ///
    /// Default implementation calls `process()` between `AnnotationTree::read_json()`
    /// and `AnnotationTree::write_json()`.
    fn process_file(
        &mut self,
        input: &Path,
        output: &Path,
        params: Option<Self::ProcessParams>,
    ) -> Result<ProsodyResult, Box<dyn std::error::Error>> {
        let mut tree = AnnotationTree::read_json(input)?;
        let result = self.process(&mut tree, params)?;
        tree.write_json(output)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_timed_nodes() {
        let mut tree = AnnotationTree::new();
        let root = tree.root();
        let phrase = tree.append(root, NodeKind::Phrase);
        tree.append_with(phrase, NodeKind::Segment, &[("d", "80")]);
        tree.append_with(phrase, NodeKind::Segment, &[("p", "a")]);
        tree.append_with(phrase, NodeKind::Boundary, &[("duration", "200")]);

        let result = ProsodyResult::from_tree(&tree, 3);
        assert_eq!(
            result,
            ProsodyResult {
                segments: 1,
                boundaries: 1,
                f0_targets: 3,
                total_duration_ms: 280,
            }
        );
    }
}
