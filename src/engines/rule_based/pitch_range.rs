use std::collections::HashMap;

use crate::tree::{AnnotationTree, NodeId, NodeKind};

use super::model::ProsodyError;
use super::phrase::{PhraseLayout, SegmentSpan};
use super::values::{bounded, bounded_f64, parse_value, percent_of, semitone_factor, Value};
use super::voices::VoiceRegistry;

/// Topline and baseline of a pitch range over a time window (Hz, ms).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PitchRangeConfig {
    pub top_start: i32,
    pub top_end: i32,
    pub base_start: i32,
    pub base_end: i32,
    pub valid_start: i32,
    pub valid_end: i32,
}

impl PitchRangeConfig {
    pub fn new(top_start: i32, top_end: i32, base_start: i32, base_end: i32) -> Self {
        Self {
            top_start,
            top_end,
            base_start,
            base_end,
            valid_start: 0,
            valid_end: 0,
        }
    }

    pub fn with_window(self, valid_start: i32, valid_end: i32) -> Self {
        Self {
            valid_start,
            valid_end,
            ..self
        }
    }

    /// Hz per ms of the topline; 0 for an empty window.
    pub fn top_slope(&self) -> f64 {
        self.slope(self.top_start, self.top_end)
    }

    pub fn base_slope(&self) -> f64 {
        self.slope(self.base_start, self.base_end)
    }

    /// Topline frequency at `time`, which must lie inside the valid window.
    pub fn topline(&self, time: i32) -> Result<i32, ProsodyError> {
        self.interpolate(self.top_start, self.top_end, time)
    }

    /// Baseline frequency at `time`, which must lie inside the valid window.
    pub fn baseline(&self, time: i32) -> Result<i32, ProsodyError> {
        self.interpolate(self.base_start, self.base_end, time)
    }

    fn slope(&self, start: i32, end: i32) -> f64 {
        if self.valid_start == self.valid_end {
            return 0.0;
        }
        (f64::from(end) - f64::from(start)) / (f64::from(self.valid_end) - f64::from(self.valid_start))
    }

    fn interpolate(&self, start: i32, end: i32, time: i32) -> Result<i32, ProsodyError> {
        if time < self.valid_start || time > self.valid_end {
            return Err(ProsodyError::OutsideValidWindow {
                time,
                start: self.valid_start,
                end: self.valid_end,
            });
        }
        if self.valid_start == self.valid_end {
            return Ok(start);
        }
        let offset = (i64::from(end) - i64::from(start)) * (i64::from(time) - i64::from(self.valid_start))
            / (i64::from(self.valid_end) - i64::from(self.valid_start));
        Ok((i64::from(start) + offset) as i32)
    }

    /// Apply the `pitch`, `range`, `pitch-dynamics` and `range-dynamics`
    /// attributes of a modifier scope, in that order.
    pub fn transformed(self, attr: impl Fn(&str) -> Option<String>) -> Self {
        let mut c = self;
        c.bound_lines();
        if let Some(raw) = attr("pitch") {
            c.apply_pitch(&raw);
        }
        if let Some(raw) = attr("range") {
            c.apply_range(&raw);
        }
        if let Some(raw) = attr("pitch-dynamics") {
            c.apply_pitch_dynamics(&raw);
        }
        if let Some(raw) = attr("range-dynamics") {
            c.apply_range_dynamics(&raw);
        }
        c.bound_lines();
        // Never let the topline drop below the baseline.
        c.top_start = c.top_start.max(c.base_start);
        c.top_end = c.top_end.max(c.base_end);
        c
    }

    fn apply_pitch(&mut self, raw: &str) {
        match parse_value(raw) {
            Some(Value::PercentDelta(p)) => {
                for v in self.lines_mut() {
                    *v = percent_of(*v, 100 + p);
                }
            }
            Some(Value::SemitonesDelta(st)) => {
                let factor = semitone_factor(st);
                for v in self.lines_mut() {
                    *v = bounded_f64(f64::from(*v) * factor);
                }
            }
            Some(Value::NumberDelta(delta)) => {
                for v in self.lines_mut() {
                    *v = bounded(i64::from(*v) + i64::from(delta));
                }
            }
            Some(Value::Number(new_base_mean)) => {
                let base_mean = (self.base_start + self.base_end) / 2;
                if base_mean == 0 {
                    log::warn!("Cannot recentre pitch `{raw}' on a zero baseline");
                    return;
                }
                let top_mean = (self.top_start + self.top_end) / 2;
                let ratio = f64::from(top_mean) / f64::from(base_mean);
                let top_spread = (self.top_end - self.top_start) / 2;
                let base_spread = (self.base_end - self.base_start) / 2;
                self.base_start = bounded(i64::from(new_base_mean) - i64::from(base_spread));
                self.base_end = bounded(i64::from(new_base_mean) + i64::from(base_spread));
                self.top_start = bounded_f64(f64::from(new_base_mean) * ratio - f64::from(top_spread));
                self.top_end = bounded_f64(f64::from(new_base_mean) * ratio + f64::from(top_spread));
            }
            _ => log::debug!("Ignoring pitch `{raw}'"),
        }
    }

    fn apply_range(&mut self, raw: &str) {
        match parse_value(raw) {
            Some(Value::PercentDelta(p)) => {
                self.top_start = self.base_start + percent_of(self.top_start - self.base_start, 100 + p);
                self.top_end = self.base_end + percent_of(self.top_end - self.base_end, 100 + p);
            }
            Some(Value::SemitonesDelta(st)) => {
                let factor = semitone_factor(st);
                self.top_start =
                    self.base_start + bounded_f64(f64::from(self.top_start - self.base_start) * factor);
                self.top_end = self.base_end + bounded_f64(f64::from(self.top_end - self.base_end) * factor);
            }
            Some(Value::NumberDelta(delta)) => {
                self.top_start = bounded(i64::from(self.top_start) + i64::from(delta));
                self.top_end = bounded(i64::from(self.top_end) + i64::from(delta));
            }
            Some(Value::Semitones(st)) => {
                let factor = semitone_factor(st);
                self.top_start = bounded_f64(f64::from(self.base_start) * factor);
                self.top_end = bounded_f64(f64::from(self.base_end) * factor);
            }
            Some(Value::Number(range)) => {
                let base_mean = (self.base_start + self.base_end) / 2;
                let top_spread = (self.top_end - self.top_start) / 2;
                self.top_start = base_mean + range - top_spread;
                self.top_end = base_mean + range + top_spread;
            }
            None => log::debug!("Ignoring range `{raw}'"),
        }
    }

    fn apply_pitch_dynamics(&mut self, raw: &str) {
        let base_mean = (self.base_start + self.base_end) / 2;
        if let Some((start, end)) = dynamics(base_mean, raw) {
            self.base_start = start;
            self.base_end = end;
        }
    }

    fn apply_range_dynamics(&mut self, raw: &str) {
        let range_mean =
            (self.top_start + self.top_end) / 2 - (self.base_start + self.base_end) / 2;
        if let Some((start, end)) = dynamics(range_mean, raw) {
            self.top_start = self.base_start + start;
            self.top_end = self.base_end + end;
        }
    }

    fn bound_lines(&mut self) {
        for v in self.lines_mut() {
            *v = bounded(i64::from(*v));
        }
    }

    fn lines_mut(&mut self) -> [&mut i32; 4] {
        [
            &mut self.top_start,
            &mut self.top_end,
            &mut self.base_start,
            &mut self.base_end,
        ]
    }
}

/// Split `mean` into a start and end value whose ratio (or difference)
/// follows the delta in `raw`, keeping their mean.
fn dynamics(mean: i32, raw: &str) -> Option<(i32, i32)> {
    match parse_value(raw) {
        Some(Value::PercentDelta(p)) => {
            if 200 + p == 0 {
                log::warn!("Ignoring degenerate dynamics `{raw}'");
                return None;
            }
            let start = bounded(200 * i64::from(mean) / i64::from(200 + p));
            Some((start, percent_of(start, 100 + p)))
        }
        Some(Value::NumberDelta(delta)) => Some((mean + delta / 2, mean - delta / 2)),
        Some(Value::SemitonesDelta(st)) => {
            let factor = semitone_factor(st);
            let start = bounded_f64(2.0 * f64::from(mean) / (1.0 + factor));
            Some((start, bounded_f64(factor * f64::from(start))))
        }
        _ => {
            log::debug!("Ignoring dynamics `{raw}': only deltas apply");
            None
        }
    }
}

/// Pitch ranges of one phrase and of the modifier scopes nested in it.
#[derive(Debug, Default)]
pub struct PitchRangeTable {
    phrase: Option<NodeId>,
    by_node: HashMap<NodeId, PitchRangeConfig>,
}

impl PitchRangeTable {
    /// Resolve the phrase range from its voice and enclosing scopes, then
    /// the range of every nested scope that contains segments.
    pub fn resolve(
        tree: &AnnotationTree,
        layout: &PhraseLayout,
        voices: &VoiceRegistry,
        per_call_voice: Option<&str>,
    ) -> Result<Self, ProsodyError> {
        let phrase = layout.phrase;
        let mut table = Self {
            phrase: Some(phrase),
            by_node: HashMap::new(),
        };
        let phrase_config = phrase_range(tree, layout, voices, per_call_voice);
        table.by_node.insert(phrase, phrase_config);

        for &scope in &layout.scopes {
            let (Some(first), Some(last)) = (
                tree.first_of(scope, NodeKind::Segment),
                tree.last_of(scope, NodeKind::Segment),
            ) else {
                continue;
            };
            let start = SegmentSpan::of(tree, first).start();
            let end = SegmentSpan::of(tree, last).end;
            let reference = table.reference_config(tree, scope)?;
            let config = PitchRangeConfig::new(
                reference.topline(start)?,
                reference.topline(end)?,
                reference.baseline(start)?,
                reference.baseline(end)?,
            )
            .with_window(start, end)
            .transformed(|name| tree.attr(scope, name).map(str::to_string));
            log::debug!("Scope {scope:?} pitch range {config:?}");
            table.by_node.insert(scope, config);
        }
        Ok(table)
    }

    pub fn get(&self, node: NodeId) -> Option<&PitchRangeConfig> {
        self.by_node.get(&node)
    }

    /// The range governing `node`: that of its nearest modifier scope inside
    /// the phrase, else the phrase's own.
    pub fn reference_config(&self, tree: &AnnotationTree, node: NodeId) -> Result<PitchRangeConfig, ProsodyError> {
        let phrase = self.phrase.ok_or(ProsodyError::MissingPitchRange(node))?;
        if let Some(scope) = tree
            .ancestor(node, NodeKind::Prosody)
            .filter(|&s| tree.is_ancestor(phrase, s))
        {
            match self.by_node.get(&scope) {
                Some(config) => return Ok(*config),
                None => {
                    debug_assert!(false, "no pitch range resolved for scope {scope:?}");
                    log::warn!("No pitch range resolved for scope {scope:?}, using the phrase range");
                }
            }
        }
        self.by_node
            .get(&phrase)
            .copied()
            .ok_or(ProsodyError::MissingPitchRange(phrase))
    }
}

fn phrase_range(
    tree: &AnnotationTree,
    layout: &PhraseLayout,
    voices: &VoiceRegistry,
    per_call_voice: Option<&str>,
) -> PitchRangeConfig {
    let phrase = layout.phrase;
    let voice_element = tree.ancestor(phrase, NodeKind::Voice);
    let locale = voice_element
        .and_then(|v| tree.attr(v, "locale"))
        .or_else(|| tree.attr(tree.root(), "locale"));
    let voice = voices.resolve(
        voice_element.and_then(|v| tree.attr(v, "name")),
        per_call_voice,
        locale,
    );
    let mut config =
        PitchRangeConfig::new(voice.top_start, voice.top_end, voice.base_start, voice.base_end);

    let mut scopes = Vec::new();
    let mut current = phrase;
    while let Some(scope) = tree.ancestor(current, NodeKind::Prosody) {
        if voice_element.is_some_and(|v| !tree.is_ancestor(v, scope)) {
            break;
        }
        scopes.push(scope);
        current = scope;
    }
    for &scope in scopes.iter().rev() {
        config = config.transformed(|name| tree.attr(scope, name).map(str::to_string));
    }

    let end = layout
        .segments
        .last()
        .map_or(0, |&last| SegmentSpan::of(tree, last).end);
    let config = config.with_window(0, end);
    log::debug!("Phrase {phrase:?} uses voice '{}', pitch range {config:?}", voice.name);
    config
}
