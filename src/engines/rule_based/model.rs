use std::path::Path;

use crate::tree::{AnnotationTree, NodeId, NodeKind};

use super::boundaries::adjust_boundaries;
use super::duration::DurationEngine;
use super::engine::RuleModelParams;
use super::klatt_params::KlattParams;
use super::phonemes::PhonemeSet;
use super::phrase::{PhraseLayout, SentenceLayout};
use super::pitch_range::PitchRangeTable;
use super::settings::SettingsTable;
use super::targets::{write_back, TargetResolver};
use super::tones::{ToneMatcher, ToneRules};
use super::voices::VoiceRegistry;

#[derive(thiserror::Error, Debug)]
pub enum ProsodyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid tone rules: {0}")]
    ToneRules(String),
    #[error("Invalid Klatt rule parameters: {0}")]
    KlattRules(String),
    #[error("Invalid phoneme set: {0}")]
    PhonemeSet(String),
    #[error("Invalid voice registry: {0}")]
    VoiceRegistry(String),
    #[error("Voice '{0}' not found. Call list_voices() to see available voices.")]
    VoiceNotFound(String),
    #[error("Rules not loaded. Call load_rules() first.")]
    RulesNotLoaded,
    #[error("Time {time} ms lies outside the pitch range window [{start}, {end}]")]
    OutsideValidWindow { time: i32, start: i32, end: i32 },
    #[error("No pitch range resolved for node {0:?}")]
    MissingPitchRange(NodeId),
}

/// Read-only rule data shared by every utterance.
pub struct RuleModel {
    tone_rules: ToneRules,
    klatt: KlattParams,
    phonemes: PhonemeSet,
    voices: VoiceRegistry,
}

/// Counts gathered while processing one utterance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub boundaries_deleted: usize,
    pub boundaries_inserted: usize,
    pub targets_written: usize,
}

impl RuleModel {
    /// Load the four rule resources from `rules_dir`.
    pub fn load(rules_dir: &Path, params: &RuleModelParams) -> Result<Self, ProsodyError> {
        log::info!("Loading prosody rules from {}", rules_dir.display());
        let tone_rules = ToneRules::load(&rules_dir.join(&params.tone_rules))?;
        let klatt = KlattParams::load(&rules_dir.join(&params.klatt_rules))?;
        let phonemes = PhonemeSet::load(&rules_dir.join(&params.phonemes))?;
        let voices = VoiceRegistry::load(&rules_dir.join(&params.voices))?;
        Ok(Self::from_parts(tone_rules, klatt, phonemes, voices))
    }

    pub fn from_parts(
        tone_rules: ToneRules,
        klatt: KlattParams,
        phonemes: PhonemeSet,
        voices: VoiceRegistry,
    ) -> Self {
        Self {
            tone_rules,
            klatt,
            phonemes,
            voices,
        }
    }

    pub fn list_voices(&self) -> Vec<&str> {
        self.voices.list_voices()
    }

    /// Run the whole prosody pass over `tree`.
    ///
    /// `voice` is the per-call default voice; it must name a registered voice.
    pub fn process(&self, tree: &mut AnnotationTree, voice: Option<&str>) -> Result<PassSummary, ProsodyError> {
        if let Some(name) = voice {
            self.voices.get(name)?;
        }
        for symbol in self.phonemes.unknown_symbols(tree) {
            log::warn!("Unknown phoneme `{symbol}', treating it as a zero-length consonant");
        }

        let settings = SettingsTable::resolve(tree);
        let changes = adjust_boundaries(tree, &settings);

        let sentences = tree.descendants_of(tree.root(), &[NodeKind::Sentence]);
        let durations = DurationEngine::new(&self.klatt, &self.phonemes, &settings);
        for &sentence in &sentences {
            durations.process_sentence(tree, sentence);
        }

        let mut summary = PassSummary {
            boundaries_deleted: changes.deleted,
            boundaries_inserted: changes.inserted,
            targets_written: 0,
        };
        for &sentence in &sentences {
            let layout = SentenceLayout::new(tree, sentence);
            if !layout.has_syllables {
                continue;
            }
            for &phrase in &layout.phrases {
                summary.targets_written += self.process_phrase(tree, phrase, &settings, voice)?;
            }
        }
        Ok(summary)
    }

    fn process_phrase(
        &self,
        tree: &mut AnnotationTree,
        phrase: NodeId,
        settings: &SettingsTable,
        voice: Option<&str>,
    ) -> Result<usize, ProsodyError> {
        let layout = PhraseLayout::new(tree, phrase);
        let ranges = PitchRangeTable::resolve(tree, &layout, &self.voices, voice)?;
        let mut targets = ToneMatcher::new(tree, &layout, &self.tone_rules, &self.phonemes).match_phrase();

        let resolver = TargetResolver::new(tree, &layout, &ranges, settings);
        resolver.assign_frequencies(&mut targets)?;
        resolver.resolve_conflicts(&mut targets)?;
        log::debug!("Phrase {phrase:?}: {} targets", targets.len());

        Ok(write_back(tree, &targets))
    }
}
