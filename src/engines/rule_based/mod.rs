//! Rule-based prosody engine.
//!
//! Turns a phonologically annotated utterance tree into timing and pitch:
//! every segment receives a duration (`d`), a cumulative end time (`end`)
//! and zero or more F0 targets (`f0`), and every boundary a pause
//! `duration`. The pass runs in a fixed order:
//!
//! 1. [`settings`]: cascade relative prosodic settings through nested
//!    `prosody` scopes.
//! 2. [`boundaries`]: drop weak boundaries and insert break-index-1
//!    boundaries where many pauses are requested.
//! 3. [`duration`]: Klatt-style multiplicative duration rules, pause
//!    durations and end times.
//! 4. Per phrase: [`pitch_range`] (topline/baseline), [`tones`] (tone label
//!    to target candidates) and [`targets`] (frequencies, conflict
//!    resolution, write-back).
//!
//! # Rules Directory Layout
//!
//! ```text
//! rules/en/
//! ├── tonerules.json    # tone label -> target specifications
//! ├── klattrules.json   # flat "rule2.nucleus" -> percent table
//! ├── phonemes.json     # phoneme classes and inherent/minimal durations
//! └── voices.json       # default topline/baseline per voice
//! ```
//!
//! File names can be changed with [`RuleModelParamsBuilder`].
//!
//! # Example
//!
//! ```rust,no_run
//! use tts_prosody::{ProsodyEngine, engines::rule_based::{ProcessParams, RuleBasedEngine}};
//! use tts_prosody::tree::AnnotationTree;
//! use std::path::PathBuf;
//!
//! let mut engine = RuleBasedEngine::new();
//! engine.load_rules(&PathBuf::from("rules/en"))?;
//!
//! let mut tree = AnnotationTree::read_json(&PathBuf::from("utterance.json"))?;
//! let params = ProcessParams {
//!     voice: Some("kim".to_string()),
//! };
//! let result = engine.process(&mut tree, Some(params))?;
//! println!("{} segments, {} ms", result.segments, result.total_duration_ms);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod boundaries;
pub mod duration;
pub mod engine;
pub mod klatt_params;
pub mod model;
pub mod phonemes;
pub mod phrase;
pub mod pitch_range;
pub mod settings;
pub mod targets;
pub mod tones;
pub mod values;
pub mod voices;

pub use engine::{ProcessParams, RuleBasedEngine, RuleModelParams, RuleModelParamsBuilder};
pub use model::{ProsodyError, RuleModel};
