use std::collections::HashMap;

use crate::tree::{AnnotationTree, NodeId, NodeKind};

/// Kind-filtered, document-ordered node lists of one phrase.
///
/// Built once per pass after boundaries and durations are settled, and
/// reused by the pitch-range, tone and target stages instead of repeated
/// restricted tree walks.
#[derive(Debug, Clone)]
pub struct PhraseLayout {
    pub phrase: NodeId,
    pub segments: Vec<NodeId>,
    pub syllables: Vec<NodeId>,
    pub syllables_and_boundaries: Vec<NodeId>,
    pub segments_and_boundaries: Vec<NodeId>,
    /// Modifier scopes nested inside the phrase.
    pub scopes: Vec<NodeId>,
    segment_index: HashMap<NodeId, usize>,
    syllable_index: HashMap<NodeId, usize>,
}

impl PhraseLayout {
    pub fn new(tree: &AnnotationTree, phrase: NodeId) -> Self {
        let mut layout = Self {
            phrase,
            segments: Vec::new(),
            syllables: Vec::new(),
            syllables_and_boundaries: Vec::new(),
            segments_and_boundaries: Vec::new(),
            scopes: Vec::new(),
            segment_index: HashMap::new(),
            syllable_index: HashMap::new(),
        };
        for node in tree.descendants(phrase) {
            match tree.kind(node) {
                NodeKind::Segment => {
                    layout.segments.push(node);
                    layout.segments_and_boundaries.push(node);
                }
                NodeKind::Syllable => {
                    layout.syllables.push(node);
                    layout.syllables_and_boundaries.push(node);
                }
                NodeKind::Boundary => {
                    layout.syllables_and_boundaries.push(node);
                    layout.segments_and_boundaries.push(node);
                }
                NodeKind::Prosody => layout.scopes.push(node),
                _ => {}
            }
        }
        layout.segment_index = index(&layout.segments);
        layout.syllable_index = index(&layout.syllables);
        layout
    }

    pub fn next_segment(&self, segment: NodeId) -> Option<NodeId> {
        neighbour(&self.segments, &self.segment_index, segment, 1)
    }

    pub fn prev_segment(&self, segment: NodeId) -> Option<NodeId> {
        neighbour(&self.segments, &self.segment_index, segment, -1)
    }

    pub fn next_syllable(&self, syllable: NodeId) -> Option<NodeId> {
        neighbour(&self.syllables, &self.syllable_index, syllable, 1)
    }

    pub fn prev_syllable(&self, syllable: NodeId) -> Option<NodeId> {
        neighbour(&self.syllables, &self.syllable_index, syllable, -1)
    }
}

/// Per-sentence lists used by the duration stage.
#[derive(Debug, Clone)]
pub struct SentenceLayout {
    pub sentence: NodeId,
    pub segments: Vec<NodeId>,
    pub boundaries: Vec<NodeId>,
    pub syllables_and_boundaries: Vec<NodeId>,
    pub phrases: Vec<NodeId>,
    pub has_tokens: bool,
    pub has_syllables: bool,
    segment_index: HashMap<NodeId, usize>,
    syllable_or_boundary_index: HashMap<NodeId, usize>,
}

impl SentenceLayout {
    pub fn new(tree: &AnnotationTree, sentence: NodeId) -> Self {
        let mut layout = Self {
            sentence,
            segments: Vec::new(),
            boundaries: Vec::new(),
            syllables_and_boundaries: Vec::new(),
            phrases: Vec::new(),
            has_tokens: false,
            has_syllables: false,
            segment_index: HashMap::new(),
            syllable_or_boundary_index: HashMap::new(),
        };
        for node in tree.descendants(sentence) {
            match tree.kind(node) {
                NodeKind::Segment => layout.segments.push(node),
                NodeKind::Boundary => {
                    layout.boundaries.push(node);
                    layout.syllables_and_boundaries.push(node);
                }
                NodeKind::Syllable => {
                    layout.has_syllables = true;
                    layout.syllables_and_boundaries.push(node);
                }
                NodeKind::Phrase => layout.phrases.push(node),
                NodeKind::Token => layout.has_tokens = true,
                _ => {}
            }
        }
        layout.segment_index = index(&layout.segments);
        layout.syllable_or_boundary_index = index(&layout.syllables_and_boundaries);
        layout
    }

    /// The syllable or boundary following `syllable` in this sentence.
    pub fn after_syllable(&self, syllable: NodeId) -> Option<NodeId> {
        neighbour(
            &self.syllables_and_boundaries,
            &self.syllable_or_boundary_index,
            syllable,
            1,
        )
    }

    /// Neighbouring segment of `segment` that lies in the same phrase.
    pub fn segment_in_phrase(&self, tree: &AnnotationTree, segment: NodeId, step: isize) -> Option<NodeId> {
        let other = neighbour(&self.segments, &self.segment_index, segment, step)?;
        let phrase = tree.ancestor(segment, NodeKind::Phrase)?;
        (tree.ancestor(other, NodeKind::Phrase) == Some(phrase)).then_some(other)
    }
}

fn index(list: &[NodeId]) -> HashMap<NodeId, usize> {
    list.iter().enumerate().map(|(pos, &id)| (id, pos)).collect()
}

fn neighbour(list: &[NodeId], index: &HashMap<NodeId, usize>, id: NodeId, step: isize) -> Option<NodeId> {
    let pos = *index.get(&id)?;
    let target = pos.checked_add_signed(step)?;
    list.get(target).copied()
}

/// Start, duration and end (ms) of a segment, read from `d` and `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSpan {
    pub duration: i32,
    pub end: i32,
}

impl SegmentSpan {
    pub fn of(tree: &AnnotationTree, segment: NodeId) -> Self {
        Self {
            duration: tree.int_attr_or(segment, "d", 0),
            end: tree.int_attr_or(segment, "end", 0),
        }
    }

    pub fn start(&self) -> i32 {
        self.end - self.duration
    }
}
