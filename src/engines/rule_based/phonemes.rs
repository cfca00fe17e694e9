use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::Deserialize;

use crate::tree::{AnnotationTree, NodeKind};

use super::model::ProsodyError;

/// Classification and duration limits of one phoneme symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Phoneme {
    pub name: String,
    pub vowel: bool,
    pub syllabic: bool,
    pub plosive: bool,
    pub fricative: bool,
    pub nasal: bool,
    pub liquid: bool,
    pub glide: bool,
    /// Duration in ms under neutral conditions.
    pub inherent_duration: i32,
    /// Floor in ms that no shortening rule may undercut.
    pub minimal_duration: i32,
}

impl Phoneme {
    pub fn is_consonant(&self) -> bool {
        !self.vowel
    }
}

#[derive(Deserialize)]
struct PhonemeFile {
    phonemes: Vec<Phoneme>,
}

/// Phoneme inventory, keyed by symbol.
#[derive(Debug, Clone, Default)]
pub struct PhonemeSet {
    phonemes: HashMap<String, Phoneme>,
    unknown: Phoneme,
}

impl PhonemeSet {
    pub fn load(path: &Path) -> Result<Self, ProsodyError> {
        let content = std::fs::read_to_string(path)?;
        let set = Self::from_json_str(&content)?;
        log::info!("Loaded {} phonemes from {}", set.len(), path.display());
        Ok(set)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ProsodyError> {
        let file: PhonemeFile = serde_json::from_str(json)
            .map_err(|e| ProsodyError::PhonemeSet(format!("Failed to parse JSON: {e}")))?;
        Self::from_phonemes(file.phonemes)
    }

    /// Build a set, rejecting unnamed, duplicate and inconsistent entries.
    pub fn from_phonemes(list: impl IntoIterator<Item = Phoneme>) -> Result<Self, ProsodyError> {
        let mut phonemes = HashMap::new();
        for phoneme in list {
            if phoneme.name.is_empty() {
                return Err(ProsodyError::PhonemeSet("Phoneme without a name".to_string()));
            }
            if phoneme.minimal_duration < 0 || phoneme.inherent_duration < phoneme.minimal_duration {
                return Err(ProsodyError::PhonemeSet(format!(
                    "{}: durations must satisfy 0 <= minimal ({}) <= inherent ({})",
                    phoneme.name, phoneme.minimal_duration, phoneme.inherent_duration
                )));
            }
            if phonemes.contains_key(&phoneme.name) {
                return Err(ProsodyError::PhonemeSet(format!(
                    "Duplicate phoneme {:?}",
                    phoneme.name
                )));
            }
            phonemes.insert(phoneme.name.clone(), phoneme);
        }
        Ok(Self {
            phonemes,
            unknown: Phoneme::default(),
        })
    }

    pub fn get(&self, symbol: &str) -> Option<&Phoneme> {
        self.phonemes.get(symbol)
    }

    /// Look up `symbol`, falling back to a zero-length consonant.
    ///
    /// Unknown symbols are reported once per utterance by
    /// [`PhonemeSet::unknown_symbols`], so a miss here only logs at debug.
    pub fn lookup(&self, symbol: &str) -> &Phoneme {
        self.phonemes.get(symbol).unwrap_or_else(|| {
            log::debug!("Unknown phoneme `{symbol}'");
            &self.unknown
        })
    }

    /// Distinct segment symbols in `tree` missing from the inventory, sorted.
    pub fn unknown_symbols<'t>(&self, tree: &'t AnnotationTree) -> BTreeSet<&'t str> {
        tree.descendants_of(tree.root(), &[NodeKind::Segment])
            .into_iter()
            .filter_map(|segment| tree.attr(segment, "p"))
            .filter(|symbol| !self.phonemes.contains_key(*symbol))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.phonemes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phonemes.is_empty()
    }
}
