//! Klatt-style segment durations, pause durations and cumulative end times.
//!
//! Each segment's stretchable duration is scaled by a running percentage that
//! the rules in [`DURATION_RULES`] multiply into, followed by the accent
//! prominence factor. Rule parameters come from [`KlattParams`]; a rule whose
//! structural precondition does not hold contributes nothing.

use crate::tree::{AnnotationTree, NodeId, NodeKind};

use super::boundaries::break_index;
use super::klatt_params::{KlattParams, NEUTRAL_PERCENT};
use super::phonemes::{Phoneme, PhonemeSet};
use super::phrase::SentenceLayout;
use super::settings::{ProsodicSettings, SettingsTable};
use super::values::{bounded, percent_of};

/// Part-of-speech tags of pronouns, which keep their stress when unaccented.
pub const PRONOUN_TAGS: [&str; 14] = [
    "PDS", "PDAT", "PIS", "PIAT", "PIDAT", "PPER", "PPOSS", "PPOSAT", "PRELS", "PRELAT", "PRF",
    "PWS", "PWAT", "PWAV",
];

/// Shortest pause a break index may be realised with, in ms.
pub const MIN_PAUSE_MS: i32 = 10;

/// Position of a segment within its syllable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhonePosition {
    Onset,
    Nucleus,
    Coda,
    /// A non-syllabic segment in a syllable without a nucleus.
    Unattached,
}

/// What follows a syllable in its sentence, skipping segments and tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Following {
    Syllable,
    Boundary(i32),
    End,
}

#[derive(Debug, Clone)]
pub struct SyllableFacts {
    pub word_initial: bool,
    pub word_final: bool,
    pub polysyllabic: bool,
    pub token_accented: bool,
    pub syllable_accented: bool,
    /// Stress after reduction of unaccented words.
    pub stress: i32,
    pub following: Following,
}

impl SyllableFacts {
    /// Whether the syllable is the last one before a break of at least `min_bi`.
    pub fn last_before_break(&self, min_bi: i32) -> bool {
        match self.following {
            Following::End => true,
            Following::Boundary(bi) => bi >= min_bi,
            Following::Syllable => false,
        }
    }

    pub fn word_medial(&self) -> bool {
        !(self.word_initial || self.word_final)
    }
}

/// Structural facts about one segment that the duration rules test.
#[derive(Debug, Clone)]
pub struct SegmentFacts<'a> {
    pub phoneme: &'a Phoneme,
    pub position: PhonePosition,
    pub syllable: Option<SyllableFacts>,
    pub preceded_by_consonant: bool,
    pub followed_by_consonant: bool,
}

impl SegmentFacts<'_> {
    fn is(&self, position: PhonePosition) -> bool {
        self.position == position
    }
}

type RuleKey = fn(&SegmentFacts) -> Option<&'static str>;

/// Klatt rules in evaluation order, each selecting the parameter key that
/// applies to a segment, if any.
pub const DURATION_RULES: [(&str, RuleKey); 10] = [
    ("rule0", overall_tempo),
    ("rule2", clause_final),
    ("rule2a", accented_final),
    ("rule3", non_phrase_final),
    ("rule4", non_word_final),
    ("rule5", polysyllabic),
    ("rule6", non_initial_consonant),
    ("rule7", unstressed),
    ("rule8", emphasis),
    ("rule10", consonant_cluster),
];

fn overall_tempo(_: &SegmentFacts) -> Option<&'static str> {
    Some("rule0.all")
}

fn clause_final(f: &SegmentFacts) -> Option<&'static str> {
    let syl = f.syllable.as_ref()?;
    if !syl.last_before_break(3) {
        return None;
    }
    let p = f.phoneme;
    if f.is(PhonePosition::Nucleus) {
        Some("rule2.nucleus")
    } else if f.is(PhonePosition::Coda) && (p.liquid || p.nasal || p.fricative) {
        Some("rule2.coda")
    } else {
        None
    }
}

fn accented_final(f: &SegmentFacts) -> Option<&'static str> {
    let syl = f.syllable.as_ref()?;
    if !(syl.last_before_break(2) && syl.token_accented) {
        return None;
    }
    if f.is(PhonePosition::Nucleus) {
        Some("rule2a.nucleus")
    } else if f.is(PhonePosition::Coda) && f.phoneme.nasal {
        Some("rule2a.coda")
    } else {
        None
    }
}

fn non_phrase_final(f: &SegmentFacts) -> Option<&'static str> {
    let syl = f.syllable.as_ref()?;
    if !syl.last_before_break(4) {
        f.is(PhonePosition::Nucleus).then_some("rule3.nucleus")
    } else if f.is(PhonePosition::Coda) && (f.phoneme.liquid || f.phoneme.nasal) {
        Some("rule3.coda")
    } else {
        None
    }
}

fn non_word_final(f: &SegmentFacts) -> Option<&'static str> {
    let syl = f.syllable.as_ref()?;
    (!syl.word_final && f.is(PhonePosition::Nucleus)).then_some("rule4.nucleus")
}

fn polysyllabic(f: &SegmentFacts) -> Option<&'static str> {
    let syl = f.syllable.as_ref()?;
    (syl.polysyllabic && f.is(PhonePosition::Nucleus)).then_some("rule5.nucleus")
}

fn non_initial_consonant(f: &SegmentFacts) -> Option<&'static str> {
    let syl = f.syllable.as_ref()?;
    if f.is(PhonePosition::Onset) && !syl.word_initial {
        Some("rule6.onset")
    } else if f.is(PhonePosition::Coda) {
        Some("rule6.coda")
    } else {
        None
    }
}

fn unstressed(f: &SegmentFacts) -> Option<&'static str> {
    let syl = f.syllable.as_ref()?;
    if syl.stress == 1 {
        return None;
    }
    Some(match f.position {
        PhonePosition::Onset if f.phoneme.liquid || f.phoneme.glide => "rule7.onset.liquids",
        PhonePosition::Nucleus if syl.word_medial() => "rule7.nucleus.medial",
        PhonePosition::Nucleus => "rule7.nucleus.others",
        _ => "rule7.others",
    })
}

fn emphasis(f: &SegmentFacts) -> Option<&'static str> {
    let syl = f.syllable.as_ref()?;
    (syl.syllable_accented && f.is(PhonePosition::Nucleus)).then_some("rule8.accent")
}

fn consonant_cluster(f: &SegmentFacts) -> Option<&'static str> {
    if !f.phoneme.is_consonant() {
        return None;
    }
    match (f.preceded_by_consonant, f.followed_by_consonant) {
        (true, true) => Some("rule10.surrounded"),
        (true, false) => Some("rule10.preceded"),
        (false, true) => Some("rule10.followed"),
        (false, false) => None,
    }
}

/// Multiply percentages into a running factor, truncating after each step.
pub fn compose(factors: impl IntoIterator<Item = i32>) -> i32 {
    factors.into_iter().fold(NEUTRAL_PERCENT, percent_of)
}

/// Tempo percentage for a segment: inverse rate scaled by its class modifier.
pub fn tempo(settings: Option<&ProsodicSettings>, phoneme: &Phoneme) -> i32 {
    let Some(s) = settings else {
        return NEUTRAL_PERCENT;
    };
    let factor = 10000 / s.rate.max(1);
    let class = if phoneme.vowel {
        Some(s.vowel_duration)
    } else if phoneme.plosive {
        Some(s.plosive_duration)
    } else if phoneme.fricative {
        Some(s.fricative_duration)
    } else if phoneme.nasal {
        Some(s.nasal_duration)
    } else if phoneme.liquid {
        Some(s.liquid_duration)
    } else if phoneme.glide {
        Some(s.glide_duration)
    } else {
        None
    };
    match class {
        Some(modifier) => percent_of(factor, modifier),
        None => factor,
    }
}

/// Position of the duration measure between pause categories.
pub fn duration_measure(settings: Option<&ProsodicSettings>) -> i32 {
    match settings {
        Some(s) => bounded(100 - (i64::from(s.rate) - 100) + (i64::from(s.pause_duration) - 100)),
        None => 100,
    }
}

/// Pause length for break index `bi`, interpolated between the two pause
/// categories bracketing `measure` (60 very short ... 140 very long).
pub fn pause_duration(bi: i32, measure: i32, params: &KlattParams) -> i32 {
    if !(1..=6).contains(&bi) {
        return 0;
    }
    let category = |name: &str| params.get(&format!("rule1.bi{bi}.{name}"));
    if measure == 100 {
        return category("medium").max(MIN_PAUSE_MS);
    }
    let (shorter, longer, dist) = if measure > 120 {
        ("long", "verylong", measure - 120)
    } else if measure > 100 {
        ("medium", "long", measure - 100)
    } else if measure < 80 {
        ("veryshort", "short", measure - 60)
    } else {
        ("short", "medium", measure - 80)
    };
    let (shorter, longer) = (category(shorter), category(longer));
    let step = i64::from(dist) * (i64::from(longer) - i64::from(shorter)) / 20;
    bounded(i64::from(shorter) + step).max(MIN_PAUSE_MS)
}

/// Stress of `syllable` after reducing the stress of unaccented words.
pub fn reduced_stress(tree: &AnnotationTree, syllable: NodeId) -> i32 {
    let stress = match tree.attr(syllable, "stress") {
        Some("1") => 1,
        Some("2") => 2,
        _ => 0,
    };
    if stress == 0 {
        return 0;
    }
    let token = tree.ancestor(syllable, NodeKind::Token);
    if token.is_some_and(|t| has_accent(tree, t)) {
        return stress;
    }
    let polysyllabic = token.is_some_and(|t| is_polysyllabic(tree, t));
    if polysyllabic {
        if stress == 1 {
            2
        } else {
            0
        }
    } else if token.is_some_and(|t| is_pronoun(tree, t)) {
        stress
    } else {
        0
    }
}

fn has_accent(tree: &AnnotationTree, node: NodeId) -> bool {
    tree.attr(node, "accent").is_some_and(|a| !a.is_empty())
}

fn is_polysyllabic(tree: &AnnotationTree, token: NodeId) -> bool {
    tree.descendants_of(token, &[NodeKind::Syllable]).len() > 1
}

fn is_pronoun(tree: &AnnotationTree, token: NodeId) -> bool {
    tree.attr(token, "pos")
        .is_some_and(|pos| PRONOUN_TAGS.contains(&pos))
}

/// Per-rule breakdown of one segment's duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurationBreakdown {
    /// Rule factors in evaluation order, accent prominence last.
    pub factors: Vec<i32>,
    pub factor: i32,
    pub inherent: i32,
    pub minimal: i32,
    pub normal: i32,
    pub tempo: i32,
    pub duration: i32,
}

/// Duration stage of one utterance, over already adjusted boundaries.
pub struct DurationEngine<'a> {
    params: &'a KlattParams,
    phonemes: &'a PhonemeSet,
    settings: &'a SettingsTable,
}

impl<'a> DurationEngine<'a> {
    pub fn new(params: &'a KlattParams, phonemes: &'a PhonemeSet, settings: &'a SettingsTable) -> Self {
        Self {
            params,
            phonemes,
            settings,
        }
    }

    /// Assign segment durations, pause durations and end times in `sentence`.
    pub fn process_sentence(&self, tree: &mut AnnotationTree, sentence: NodeId) {
        let layout = SentenceLayout::new(tree, sentence);
        if !layout.has_tokens {
            return;
        }
        self.apply_volume_quality(tree, &layout);
        for &segment in &layout.segments {
            let breakdown = self.segment_duration(tree, &layout, segment);
            tree.set_attr(segment, "d", breakdown.duration.to_string());
            log::debug!(
                "{} {}ms (tempo {}%, normal {}, min {}, inh {}) {}% {:?}",
                tree.attr(segment, "p").unwrap_or(""),
                breakdown.duration,
                breakdown.tempo,
                breakdown.normal,
                breakdown.minimal,
                breakdown.inherent,
                breakdown.factor,
                breakdown.factors
            );
        }
        for &boundary in &layout.boundaries {
            if tree.has_attr(boundary, "duration") {
                continue;
            }
            let duration = self.boundary_duration(tree, boundary);
            tree.set_attr(boundary, "duration", duration.to_string());
        }
        for &phrase in &layout.phrases {
            accumulate_end_times(tree, phrase);
        }
    }

    /// Compute (and apply accent-driven voice quality for) one segment.
    pub fn segment_duration(
        &self,
        tree: &mut AnnotationTree,
        layout: &SentenceLayout,
        segment: NodeId,
    ) -> DurationBreakdown {
        let facts = self.segment_facts(tree, layout, segment);
        let mut factors: Vec<i32> = DURATION_RULES
            .iter()
            .map(|(_, rule)| rule(&facts).map_or(NEUTRAL_PERCENT, |key| self.params.get(key)))
            .collect();
        factors.push(self.accent_prominence(tree, segment, &facts));
        let factor = compose(factors.iter().copied());

        let inherent = facts.phoneme.inherent_duration;
        let mut minimal = facts.phoneme.minimal_duration;
        if facts.syllable.as_ref().is_some_and(|s| s.stress == 0) {
            minimal = percent_of(minimal, self.params.get("rule7.mindur"));
        }
        let normal = bounded(i64::from(minimal) + i64::from(percent_of(inherent - minimal, factor)));
        let settings = self.settings.enclosing(tree, segment).map(|(_, s)| s);
        let tempo = tempo(settings.as_ref(), facts.phoneme);
        DurationBreakdown {
            factors,
            factor,
            inherent,
            minimal,
            normal,
            tempo,
            duration: percent_of(normal, tempo),
        }
    }

    /// Pause length of a boundary from its break index and enclosing scope.
    pub fn boundary_duration(&self, tree: &AnnotationTree, boundary: NodeId) -> i32 {
        let bi = break_index(tree, boundary).unwrap_or(0);
        let settings = self.settings.enclosing(tree, boundary).map(|(_, s)| s);
        pause_duration(bi, duration_measure(settings.as_ref()), self.params)
    }

    pub fn segment_facts(&self, tree: &AnnotationTree, layout: &SentenceLayout, segment: NodeId) -> SegmentFacts<'a> {
        let phonemes = self.phonemes;
        let phoneme = phonemes.lookup(tree.attr(segment, "p").unwrap_or(""));
        let syllabic = |id: NodeId| {
            tree.kind(id) == NodeKind::Segment
                && tree
                    .attr(id, "p")
                    .and_then(|p| phonemes.get(p))
                    .is_some_and(|ph| ph.syllabic)
        };
        let position = if phoneme.syllabic {
            PhonePosition::Nucleus
        } else if tree.following_siblings(segment).into_iter().any(syllabic) {
            PhonePosition::Onset
        } else if tree.preceding_siblings(segment).into_iter().any(syllabic) {
            PhonePosition::Coda
        } else {
            PhonePosition::Unattached
        };

        let consonant = |id: Option<NodeId>| {
            id.and_then(|n| tree.attr(n, "p"))
                .is_some_and(|p| phonemes.lookup(p).is_consonant())
        };

        SegmentFacts {
            phoneme,
            position,
            syllable: tree
                .ancestor(segment, NodeKind::Syllable)
                .map(|syl| syllable_facts(tree, layout, syl)),
            preceded_by_consonant: consonant(layout.segment_in_phrase(tree, segment, -1)),
            followed_by_consonant: consonant(layout.segment_in_phrase(tree, segment, 1)),
        }
    }

    fn accent_prominence(&self, tree: &mut AnnotationTree, segment: NodeId, facts: &SegmentFacts) -> i32 {
        if !facts.syllable.as_ref().is_some_and(|s| s.syllable_accented) {
            return NEUTRAL_PERCENT;
        }
        let Some((_, settings)) = self.settings.enclosing(tree, segment) else {
            return NEUTRAL_PERCENT;
        };
        let prominence = settings.accent_prominence;
        if prominence == NEUTRAL_PERCENT {
            return NEUTRAL_PERCENT;
        }
        let current = tree.attr(segment, "vq").unwrap_or("");
        let raised = if prominence >= 150 {
            matches!(current, "" | "soft" | "modal").then_some("loud")
        } else if prominence >= 125 {
            match current {
                "soft" => Some("modal"),
                "" | "modal" => Some("loud"),
                _ => None,
            }
        } else {
            None
        };
        if let Some(vq) = raised {
            tree.set_attr(segment, "vq", vq);
        }
        if facts.is(PhonePosition::Nucleus) {
            prominence
        } else {
            NEUTRAL_PERCENT
        }
    }

    /// Mark segments of loud or soft scopes with a voice quality.
    fn apply_volume_quality(&self, tree: &mut AnnotationTree, layout: &SentenceLayout) {
        for &segment in &layout.segments {
            let Some((_, settings)) = self.settings.enclosing(tree, segment) else {
                continue;
            };
            let vq = if settings.volume >= 60 {
                "loud"
            } else if settings.volume <= 40 {
                "soft"
            } else {
                continue;
            };
            if tree.has_attr(segment, "vq") || matches!(tree.attr(segment, "p"), Some("_" | "?")) {
                continue;
            }
            tree.set_attr(segment, "vq", vq);
        }
    }
}

fn syllable_facts(tree: &AnnotationTree, layout: &SentenceLayout, syllable: NodeId) -> SyllableFacts {
    let is_syllable = |&id: &NodeId| tree.kind(id) == NodeKind::Syllable;
    let token = tree.ancestor(syllable, NodeKind::Token);
    let following = match layout.after_syllable(syllable) {
        None => Following::End,
        Some(next) if tree.kind(next) == NodeKind::Boundary => {
            Following::Boundary(break_index(tree, next).unwrap_or(0))
        }
        Some(_) => Following::Syllable,
    };
    SyllableFacts {
        word_initial: !tree.preceding_siblings(syllable).iter().any(is_syllable),
        word_final: !tree.following_siblings(syllable).iter().any(is_syllable),
        polysyllabic: token.is_some_and(|t| is_polysyllabic(tree, t)),
        token_accented: token.is_some_and(|t| has_accent(tree, t)),
        syllable_accented: has_accent(tree, syllable),
        stress: reduced_stress(tree, syllable),
        following,
    }
}

/// Write each segment's cumulative end time within `phrase`; returns the
/// phrase's total duration including pauses.
pub fn accumulate_end_times(tree: &mut AnnotationTree, phrase: NodeId) -> i32 {
    let mut total: i32 = 0;
    for node in tree.descendants_of(phrase, &[NodeKind::Segment, NodeKind::Boundary]) {
        if tree.kind(node) == NodeKind::Segment {
            total = total.saturating_add(tree.int_attr_or(node, "d", 0));
            tree.set_attr(node, "end", total.to_string());
        } else {
            total = total.saturating_add(tree.int_attr_or(node, "duration", 0));
        }
    }
    total
}
