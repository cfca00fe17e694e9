use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::tree::{AnnotationTree, NodeId, NodeKind};

use super::model::ProsodyError;
use super::phonemes::PhonemeSet;
use super::phrase::PhraseLayout;
use super::targets::Target;

/// Whether a rule realises a pitch accent or a boundary tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToneKind {
    Tone,
    Boundary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetRole {
    Star,
    Plus,
}

/// How a target's frequency is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum F0Spec {
    /// Position between baseline (0) and topline (1000).
    Promille(i32),
    /// The last topline frequency realised in the phrase.
    LastHigh,
}

/// Gate deciding whether a target specification applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    FirstInPhrase,
    PreviousHigh,
    PreviousLow,
    /// Not understood; never restricts.
    Other(String),
}

impl Condition {
    fn parse(raw: &str) -> Self {
        match raw {
            "first_in_IP" => Self::FirstInPhrase,
            "prevtone_H" => Self::PreviousHigh,
            "prevtone_L" => Self::PreviousLow,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub role: TargetRole,
    pub t_code: String,
    pub f0: F0Spec,
    pub condition: Option<Condition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToneRule {
    /// Upper-cased tone label.
    pub name: String,
    pub kind: ToneKind,
    pub targets: Vec<TargetSpec>,
}

impl ToneRule {
    /// `'H'` when the label's last tonal letter is H, else `'L'`.
    pub fn final_tone(&self) -> char {
        if self.name.rfind('H') > self.name.rfind('L') {
            'H'
        } else {
            'L'
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawF0 {
    Number(i64),
    Text(String),
}

#[derive(Deserialize)]
struct RawTarget {
    #[serde(rename = "type")]
    role: TargetRole,
    t_code: String,
    f0: RawF0,
    #[serde(default)]
    condition: Option<String>,
}

#[derive(Deserialize)]
struct RawTone {
    name: String,
    kind: ToneKind,
    #[serde(default)]
    targets: Vec<RawTarget>,
}

#[derive(Deserialize)]
struct RawToneFile {
    tones: Vec<RawTone>,
}

/// Tone rules keyed by upper-cased label.
#[derive(Debug, Clone, Default)]
pub struct ToneRules {
    by_name: HashMap<String, ToneRule>,
}

impl ToneRules {
    pub fn load(path: &Path) -> Result<Self, ProsodyError> {
        let content = std::fs::read_to_string(path)?;
        let rules = Self::from_json_str(&content)?;
        log::info!("Loaded {} tone rules from {}", rules.len(), path.display());
        Ok(rules)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ProsodyError> {
        let file: RawToneFile = serde_json::from_str(json)
            .map_err(|e| ProsodyError::ToneRules(format!("Failed to parse JSON: {e}")))?;
        let mut by_name = HashMap::with_capacity(file.tones.len());
        for raw in file.tones {
            let name = raw.name.trim().to_uppercase();
            if name.is_empty() {
                return Err(ProsodyError::ToneRules("Tone without a name".to_string()));
            }
            let targets = raw
                .targets
                .into_iter()
                .map(|t| parse_target(&name, t))
                .collect::<Result<Vec<_>, _>>()?;
            let rule = ToneRule {
                name: name.clone(),
                kind: raw.kind,
                targets,
            };
            if by_name.insert(name.clone(), rule).is_some() {
                return Err(ProsodyError::ToneRules(format!("Duplicate tone {name:?}")));
            }
        }
        Ok(Self { by_name })
    }

    pub fn from_rules(rules: impl IntoIterator<Item = ToneRule>) -> Self {
        Self {
            by_name: rules.into_iter().map(|r| (r.name.clone(), r)).collect(),
        }
    }

    /// Case-insensitive lookup.
    pub fn get(&self, label: &str) -> Option<&ToneRule> {
        self.by_name.get(&label.trim().to_uppercase())
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

fn parse_target(tone: &str, raw: RawTarget) -> Result<TargetSpec, ProsodyError> {
    let f0 = match raw.f0 {
        RawF0::Number(n) => i32::try_from(n).ok().map(F0Spec::Promille),
        RawF0::Text(s) if s == "last_H_freq" => Some(F0Spec::LastHigh),
        RawF0::Text(s) => s.trim().parse().ok().map(F0Spec::Promille),
    }
    .ok_or_else(|| ProsodyError::ToneRules(format!("{tone}: unknown f0 specification")))?;
    let condition = raw.condition.as_deref().map(Condition::parse);
    if let Some(Condition::Other(c)) = &condition {
        log::debug!("{tone}: condition `{c}' is not understood and never restricts");
    }
    Ok(TargetSpec {
        role: raw.role,
        t_code: raw.t_code.trim().to_string(),
        f0,
        condition,
    })
}

/// Left-to-right state of tone matching within a phrase.
#[derive(Debug, Clone, Default)]
struct MatchState {
    is_first: bool,
    prev_tone: Option<char>,
    prev_tone_syllable: Option<NodeId>,
}

impl MatchState {
    fn allows(&self, condition: Option<&Condition>) -> bool {
        match condition {
            Some(Condition::FirstInPhrase) => self.is_first,
            Some(Condition::PreviousHigh) => self.prev_tone == Some('H'),
            Some(Condition::PreviousLow) => self.prev_tone == Some('L'),
            Some(Condition::Other(_)) | None => true,
        }
    }
}

/// Produces the candidate targets of a phrase from its tone labels.
pub struct ToneMatcher<'a> {
    tree: &'a AnnotationTree,
    layout: &'a PhraseLayout,
    rules: &'a ToneRules,
    phonemes: &'a PhonemeSet,
}

impl<'a> ToneMatcher<'a> {
    pub fn new(
        tree: &'a AnnotationTree,
        layout: &'a PhraseLayout,
        rules: &'a ToneRules,
        phonemes: &'a PhonemeSet,
    ) -> Self {
        Self {
            tree,
            layout,
            rules,
            phonemes,
        }
    }

    /// Candidate targets in rule order, each plus target pointing at the
    /// star of its rule (or at itself when the rule located no star).
    pub fn match_phrase(&self) -> Vec<Target> {
        let mut targets: Vec<Target> = Vec::new();
        let mut state = MatchState {
            is_first: true,
            ..Default::default()
        };
        for (pos, &node) in self.layout.syllables_and_boundaries.iter().enumerate() {
            let Some(label) = self.tree.attr(node, "tone") else {
                continue;
            };
            let Some(rule) = self.rules.get(label) else {
                log::debug!("No tone rule for `{label}'");
                continue;
            };
            let reference = match self.tree.kind(node) {
                NodeKind::Syllable => Some(node),
                _ => self.layout.syllables_and_boundaries[..pos]
                    .iter()
                    .rev()
                    .copied()
                    .find(|&n| self.tree.kind(n) == NodeKind::Syllable),
            };
            let Some(syllable) = reference else {
                log::debug!("Boundary tone `{label}' has no preceding syllable");
                continue;
            };

            let first = targets.len();
            let mut star = None;
            for spec in &rule.targets {
                if !state.allows(spec.condition.as_ref()) {
                    continue;
                }
                let Some((segment, timing)) = self.locate(&spec.t_code, syllable, &state) else {
                    log::debug!("  Target ({:?}) could not be attached, skipping", spec.f0);
                    continue;
                };
                if spec.role == TargetRole::Star {
                    if star.is_some() {
                        log::info!("Found more than one star target for tone rule `{}'", rule.name);
                    }
                    star = Some(targets.len());
                }
                targets.push(Target::new(segment, timing, spec.role, rule.kind, spec.f0));
            }
            for (index, target) in targets.iter_mut().enumerate().skip(first) {
                target.my_star = Some(star.unwrap_or(index));
            }

            state.is_first = false;
            state.prev_tone_syllable = Some(syllable);
            state.prev_tone = Some(rule.final_tone());
        }
        targets
    }

    /// Resolve a positional code to an anchor segment and timing percentage.
    fn locate(&self, t_code: &str, syllable: NodeId, state: &MatchState) -> Option<(NodeId, i32)> {
        let tree = self.tree;
        let nucleus_or = |syl: NodeId, fallback: fn(&AnnotationTree, NodeId) -> Option<NodeId>| {
            self.nucleus(syl).or_else(|| fallback(tree, syl))
        };

        let (segment, timing) = match t_code {
            "0" => (self.layout.segments.first().copied(), 0),
            "12" => (
                self.layout
                    .prev_syllable(syllable)
                    .and_then(|s| nucleus_or(s, first_segment)),
                0,
            ),
            "21" => (first_segment(tree, syllable), 0),
            "22" => (nucleus_or(syllable, first_segment), 0),
            "23" => (nucleus_or(syllable, first_segment), 50),
            "24" => (nucleus_or(syllable, last_segment), 100),
            "25" => (last_segment(tree, syllable), 100),
            "34" => (
                self.layout
                    .next_syllable(syllable)
                    .and_then(|s| nucleus_or(s, last_segment)),
                100,
            ),
            "99" => (
                self.after_previous_tone(state)
                    .and_then(|s| nucleus_or(s, first_segment)),
                50,
            ),
            "98" => (
                self.stressed_after_previous_tone(state)
                    .and_then(|s| nucleus_or(s, first_segment)),
                50,
            ),
            other => {
                log::debug!("Unknown t_code `{other}'");
                return None;
            }
        };
        segment.map(|s| (s, timing))
    }

    /// First syllabic segment of `syllable`.
    fn nucleus(&self, syllable: NodeId) -> Option<NodeId> {
        self.tree
            .descendants_of(syllable, &[NodeKind::Segment])
            .into_iter()
            .find(|&seg| {
                self.tree
                    .attr(seg, "p")
                    .and_then(|p| self.phonemes.get(p))
                    .is_some_and(|ph| ph.syllabic)
            })
    }

    fn after_previous_tone(&self, state: &MatchState) -> Option<NodeId> {
        self.layout.next_syllable(state.prev_tone_syllable?)
    }

    /// First stressed syllable from the second syllable after the previous
    /// tone on, else that second syllable.
    fn stressed_after_previous_tone(&self, state: &MatchState) -> Option<NodeId> {
        let skipped = self.layout.next_syllable(self.after_previous_tone(state)?)?;
        let mut current = Some(skipped);
        while let Some(syl) = current {
            if matches!(self.tree.attr(syl, "stress"), Some("1" | "2")) {
                return Some(syl);
            }
            current = self.layout.next_syllable(syl);
        }
        Some(skipped)
    }
}

fn first_segment(tree: &AnnotationTree, syllable: NodeId) -> Option<NodeId> {
    tree.first_of(syllable, NodeKind::Segment)
}

fn last_segment(tree: &AnnotationTree, syllable: NodeId) -> Option<NodeId> {
    tree.last_of(syllable, NodeKind::Segment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::rule_based::phonemes::Phoneme;

    const RULES: &str = r#"{"tones": [
        {"name": "h*", "kind": "tone", "targets": [
            {"type": "star", "t_code": "23", "f0": "1000"}
        ]},
        {"name": "L+H*", "kind": "tone", "targets": [
            {"type": "plus", "t_code": "12", "f0": 0},
            {"type": "star", "t_code": "24", "f0": "last_H_freq"}
        ]},
        {"name": "H-", "kind": "boundary", "targets": [
            {"type": "plus", "t_code": "25", "f0": 800, "condition": "prevtone_L"},
            {"type": "plus", "t_code": "99", "f0": 600},
            {"type": "plus", "t_code": "77", "f0": 600}
        ]}
    ]}"#;

    fn phonemes() -> PhonemeSet {
        PhonemeSet::from_phonemes([
            Phoneme {
                name: "a".into(),
                vowel: true,
                syllabic: true,
                ..Default::default()
            },
            Phoneme {
                name: "t".into(),
                plosive: true,
                ..Default::default()
            },
        ])
        .unwrap()
    }

    /// phrase of syllables "ta", each with the given tone (if any)
    fn phrase(tones: &[Option<&str>]) -> (AnnotationTree, NodeId, Vec<(NodeId, NodeId)>) {
        let mut tree = AnnotationTree::new();
        let root = tree.root();
        let phrase = tree.append(root, NodeKind::Phrase);
        let mut segments = Vec::new();
        for tone in tones {
            let token = tree.append(phrase, NodeKind::Token);
            let syl = tree.append_with(token, NodeKind::Syllable, &[("stress", "1")]);
            if let Some(tone) = tone {
                tree.set_attr(syl, "tone", *tone);
            }
            let t = tree.append_with(syl, NodeKind::Segment, &[("p", "t")]);
            let a = tree.append_with(syl, NodeKind::Segment, &[("p", "a")]);
            segments.push((t, a));
        }
        (tree, phrase, segments)
    }

    #[test]
    fn loads_rules_case_insensitively() {
        let rules = ToneRules::from_json_str(RULES).unwrap();
        assert_eq!(rules.len(), 3);
        let h = rules.get("H*").unwrap();
        assert_eq!(h.name, "H*");
        assert_eq!(h.targets[0].f0, F0Spec::Promille(1000));
        assert_eq!(rules.get("l+h*").unwrap().targets[1].f0, F0Spec::LastHigh);
        assert_eq!(rules.get("H-").unwrap().kind, ToneKind::Boundary);
        assert_eq!(h.final_tone(), 'H');
        assert_eq!(rules.get("H-").unwrap().final_tone(), 'H');
    }

    #[test]
    fn rejects_bad_f0_specs() {
        let bad = r#"{"tones": [{"name": "H*", "kind": "tone", "targets": [
            {"type": "star", "t_code": "23", "f0": "high"}]}]}"#;
        assert!(matches!(ToneRules::from_json_str(bad), Err(ProsodyError::ToneRules(_))));
        let bad_kind = r#"{"tones": [{"name": "H*", "kind": "accent"}]}"#;
        assert!(ToneRules::from_json_str(bad_kind).is_err());
    }

    #[test]
    fn star_target_in_nucleus_middle() {
        let rules = ToneRules::from_json_str(RULES).unwrap();
        let set = phonemes();
        let (tree, phrase, segs) = phrase(&[Some("h*")]);
        let layout = PhraseLayout::new(&tree, phrase);
        let targets = ToneMatcher::new(&tree, &layout, &rules, &set).match_phrase();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].segment, segs[0].1);
        assert_eq!(targets[0].timing, 50);
        assert_eq!(targets[0].role, TargetRole::Star);
        assert_eq!(targets[0].my_star, Some(0));
    }

    #[test]
    fn plus_targets_reference_their_star() {
        let rules = ToneRules::from_json_str(RULES).unwrap();
        let set = phonemes();
        let (tree, phrase, segs) = phrase(&[None, Some("L+H*")]);
        let layout = PhraseLayout::new(&tree, phrase);
        let targets = ToneMatcher::new(&tree, &layout, &rules, &set).match_phrase();
        assert_eq!(targets.len(), 2);
        // preceding syllable's nucleus start
        assert_eq!((targets[0].segment, targets[0].timing), (segs[0].1, 0));
        assert_eq!((targets[1].segment, targets[1].timing), (segs[1].1, 100));
        assert_eq!(targets[0].my_star, Some(1));
        assert_eq!(targets[1].my_star, Some(1));
    }

    #[test]
    fn missing_anchor_discards_only_that_target() {
        let rules = ToneRules::from_json_str(RULES).unwrap();
        let set = phonemes();
        // no preceding syllable for t_code 12
        let (tree, phrase, segs) = phrase(&[Some("L+H*")]);
        let layout = PhraseLayout::new(&tree, phrase);
        let targets = ToneMatcher::new(&tree, &layout, &rules, &set).match_phrase();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].segment, segs[0].1);
    }

    #[test]
    fn boundary_tone_uses_preceding_syllable_and_conditions() {
        let rules = ToneRules::from_json_str(RULES).unwrap();
        let set = phonemes();
        let (mut tree, phrase, segs) = phrase(&[Some("H*"), None, None]);
        let boundary = tree.append_with(phrase, NodeKind::Boundary, &[("tone", "H-")]);
        let layout = PhraseLayout::new(&tree, phrase);
        let targets = ToneMatcher::new(&tree, &layout, &rules, &set).match_phrase();
        // H*, then H-: prevtone_L fails, 99 lands after the H* syllable, 77 is unknown
        assert_eq!(targets.len(), 2);
        assert_eq!((targets[1].segment, targets[1].timing), (segs[1].1, 50));
        assert_eq!(targets[1].my_star, Some(1));
        assert_eq!(targets[1].tone_kind, ToneKind::Boundary);
        assert!(tree.is_attached(boundary));
    }

    const POSITIONS: &str = r#"{"tones": [
        {"name": "P0", "kind": "tone", "targets": [{"type": "star", "t_code": "0", "f0": 500}]},
        {"name": "P21", "kind": "tone", "targets": [{"type": "star", "t_code": "21", "f0": 500}]},
        {"name": "P22", "kind": "tone", "targets": [{"type": "star", "t_code": "22", "f0": 500}]},
        {"name": "P34", "kind": "tone", "targets": [{"type": "star", "t_code": "34", "f0": 500}]},
        {"name": "P98", "kind": "tone", "targets": [{"type": "plus", "t_code": "98", "f0": 500}]},
        {"name": "H*", "kind": "tone", "targets": [{"type": "star", "t_code": "23", "f0": 1000}]},
        {"name": "L*", "kind": "tone", "targets": [{"type": "star", "t_code": "23", "f0": 0}]},
        {"name": "FIRST", "kind": "tone", "targets": [
            {"type": "star", "t_code": "23", "f0": 1000, "condition": "first_in_IP"}
        ]},
        {"name": "UPSTEP", "kind": "tone", "targets": [
            {"type": "star", "t_code": "23", "f0": 1000, "condition": "prevtone_H"}
        ]}
    ]}"#;

    type Syllable<'a> = (&'a str, Option<&'a str>, &'a [&'a str]);

    /// phrase of one-syllable tokens given as (stress, tone, phones)
    fn custom_phrase(syllables: &[Syllable]) -> (AnnotationTree, NodeId, Vec<Vec<NodeId>>) {
        let mut tree = AnnotationTree::new();
        let root = tree.root();
        let phrase = tree.append(root, NodeKind::Phrase);
        let mut segments = Vec::new();
        for (stress, tone, phones) in syllables {
            let token = tree.append(phrase, NodeKind::Token);
            let syl = tree.append_with(token, NodeKind::Syllable, &[("stress", *stress)]);
            if let Some(tone) = tone {
                tree.set_attr(syl, "tone", *tone);
            }
            segments.push(
                phones
                    .iter()
                    .map(|p| tree.append_with(syl, NodeKind::Segment, &[("p", *p)]))
                    .collect(),
            );
        }
        (tree, phrase, segments)
    }

    fn anchors(tree: &AnnotationTree, phrase: NodeId) -> Vec<(NodeId, i32)> {
        let rules = ToneRules::from_json_str(POSITIONS).unwrap();
        let set = phonemes();
        let layout = PhraseLayout::new(tree, phrase);
        ToneMatcher::new(tree, &layout, &rules, &set)
            .match_phrase()
            .into_iter()
            .map(|t| (t.segment, t.timing))
            .collect()
    }

    #[test]
    fn code_0_anchors_at_phrase_start() {
        let (tree, ip, segs) = custom_phrase(&[
            ("1", None, &["t", "a"]),
            ("1", None, &["a"]),
            ("1", Some("P0"), &["t", "a"]),
        ]);
        assert_eq!(anchors(&tree, ip), vec![(segs[0][0], 0)]);
    }

    #[test]
    fn codes_21_and_22_anchor_at_syllable_or_nucleus_start() {
        let (tree, ip, segs) = phrase(&[Some("P21"), Some("P22")]);
        assert_eq!(anchors(&tree, ip), vec![(segs[0].0, 0), (segs[1].1, 0)]);

        // no nucleus: 22 falls back to the first segment
        let (tree, ip, segs) = custom_phrase(&[("1", Some("P22"), &["t", "t"])]);
        assert_eq!(anchors(&tree, ip), vec![(segs[0][0], 0)]);
    }

    #[test]
    fn code_34_anchors_at_next_nucleus_end() {
        let (tree, ip, segs) = phrase(&[Some("P34"), None]);
        assert_eq!(anchors(&tree, ip), vec![(segs[1].1, 100)]);

        let (tree, ip, segs) = custom_phrase(&[("1", Some("P34"), &["a"]), ("0", None, &["t", "t"])]);
        assert_eq!(anchors(&tree, ip), vec![(segs[1][1], 100)]);

        let (tree, ip, _) = phrase(&[None, Some("P34")]);
        assert!(anchors(&tree, ip).is_empty());
    }

    #[test]
    fn code_98_skips_a_syllable_then_seeks_stress() {
        let (tree, ip, segs) = custom_phrase(&[
            ("1", Some("H*"), &["t", "a"]),
            ("1", None, &["t", "a"]),
            ("0", None, &["t", "a"]),
            ("2", None, &["t", "a"]),
            ("1", Some("P98"), &["a"]),
        ]);
        assert_eq!(anchors(&tree, ip), vec![(segs[0][1], 50), (segs[3][1], 50)]);

        // nothing stressed: the skipped-to syllable itself, by its first segment
        let (tree, ip, segs) = custom_phrase(&[
            ("1", Some("H*"), &["t", "a"]),
            ("0", None, &["t", "a"]),
            ("0", None, &["t", "t"]),
            ("0", Some("P98"), &["t", "a"]),
        ]);
        assert_eq!(anchors(&tree, ip), vec![(segs[0][1], 50), (segs[2][0], 50)]);

        let (tree, ip, _) = phrase(&[Some("P98")]);
        assert!(anchors(&tree, ip).is_empty());
    }

    #[test]
    fn first_in_phrase_condition() {
        let (tree, ip, segs) = phrase(&[Some("FIRST"), Some("FIRST")]);
        assert_eq!(anchors(&tree, ip), vec![(segs[0].1, 50)]);
    }

    #[test]
    fn previous_high_condition() {
        let (tree, ip, segs) = phrase(&[Some("H*"), Some("UPSTEP")]);
        assert_eq!(anchors(&tree, ip), vec![(segs[0].1, 50), (segs[1].1, 50)]);

        let (tree, ip, segs) = phrase(&[Some("L*"), Some("UPSTEP")]);
        assert_eq!(anchors(&tree, ip), vec![(segs[0].1, 50)]);

        let (tree, ip, _) = phrase(&[Some("UPSTEP")]);
        assert!(anchors(&tree, ip).is_empty());
    }

    #[test]
    fn unmatched_labels_are_skipped() {
        let rules = ToneRules::from_json_str(RULES).unwrap();
        let set = phonemes();
        let (tree, phrase, _) = phrase(&[Some("X*"), Some("H*")]);
        let layout = PhraseLayout::new(&tree, phrase);
        let targets = ToneMatcher::new(&tree, &layout, &rules, &set).match_phrase();
        assert_eq!(targets.len(), 1);
    }
}
