use crate::tree::{AnnotationTree, NodeId, NodeKind};

use super::model::ProsodyError;
use super::phrase::{PhraseLayout, SegmentSpan};
use super::pitch_range::PitchRangeTable;
use super::settings::SettingsTable;
use super::tones::{F0Spec, TargetRole, ToneKind};
use super::values::{bounded, bounded_f64, percent_of};

/// Promille used for "last high" before any topline target was realised.
const LAST_HIGH_FALLBACK_PROMILLE: i32 = 1100;

/// Timing of a target relocated into the segment after its star.
const RELOCATED_AFTER: i32 = 10;
/// Timing of a target relocated into the segment before its star.
const RELOCATED_BEFORE: i32 = 90;

/// A candidate F0 point anchored to a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub segment: NodeId,
    /// Percentage of the anchor segment's duration.
    pub timing: i32,
    /// Hz; 0 until computed.
    pub f0: i32,
    pub role: TargetRole,
    pub tone_kind: ToneKind,
    pub spec: F0Spec,
    /// Index of the governing star in the phrase's target list.
    pub my_star: Option<usize>,
    removed: bool,
}

impl Target {
    pub fn new(segment: NodeId, timing: i32, role: TargetRole, tone_kind: ToneKind, spec: F0Spec) -> Self {
        Self {
            segment,
            timing,
            f0: 0,
            role,
            tone_kind,
            spec,
            my_star: None,
            removed: false,
        }
    }

    pub fn is_star(&self) -> bool {
        self.role == TargetRole::Star
    }
}

/// Computes frequencies for a phrase's targets and resolves their conflicts.
pub struct TargetResolver<'a> {
    tree: &'a AnnotationTree,
    layout: &'a PhraseLayout,
    ranges: &'a PitchRangeTable,
    settings: &'a SettingsTable,
}

impl<'a> TargetResolver<'a> {
    pub fn new(
        tree: &'a AnnotationTree,
        layout: &'a PhraseLayout,
        ranges: &'a PitchRangeTable,
        settings: &'a SettingsTable,
    ) -> Self {
        Self {
            tree,
            layout,
            ranges,
            settings,
        }
    }

    /// Assign frequencies in list order, threading the last realised
    /// topline frequency from target to target.
    pub fn assign_frequencies(&self, targets: &mut [Target]) -> Result<(), ProsodyError> {
        let mut last_high = 0;
        for target in targets.iter_mut() {
            self.update_frequency(target, &mut last_high)?;
        }
        Ok(())
    }

    /// The frequency (Hz) of `target`, or 0 when none can be derived.
    pub fn frequency(&self, target: &Target, last_high: &mut i32) -> Result<i32, ProsodyError> {
        let mut promille = match target.spec {
            F0Spec::LastHigh if *last_high != 0 => return Ok(*last_high),
            F0Spec::LastHigh => LAST_HIGH_FALLBACK_PROMILLE,
            F0Spec::Promille(p) => p,
        };
        if target.tone_kind == ToneKind::Tone && target.is_star() {
            if let Some((_, settings)) = self.settings.enclosing(self.tree, target.segment) {
                let stretch = percent_of(promille.saturating_sub(500), settings.accent_prominence);
                promille = bounded(500 + i64::from(stretch));
            }
        }

        let span = SegmentSpan::of(self.tree, target.segment);
        let time = span.start() + percent_of(span.duration, target.timing);
        let range = self.ranges.reference_config(self.tree, target.segment)?;
        let hz = match promille {
            1000 => {
                let top = range.topline(time)?;
                *last_high = top;
                top
            }
            0 => range.baseline(time)?,
            p => {
                let base = range.baseline(time)?;
                let top = range.topline(time)?;
                bounded(i64::from(base) + i64::from(p) * (i64::from(top) - i64::from(base)) / 1000)
            }
        };
        log::debug!(
            "Target at {:?} ({}%, t={time}): promille {promille} -> {hz} Hz",
            target.segment,
            target.timing
        );
        Ok(hz)
    }

    /// Absolute time (ms) of a target within its phrase.
    pub fn target_time(&self, target: &Target) -> i32 {
        let span = SegmentSpan::of(self.tree, target.segment);
        span.end - (100 - target.timing) * span.duration / 100
    }

    /// Move `target` to absolute `time`, re-anchoring it in whichever
    /// segment of the phrase contains that time. A time falling in a pause
    /// between segments snaps to the nearer edge of the current segment.
    pub fn set_target_time(&self, target: &mut Target, time: i32) {
        if time < 0 {
            return;
        }
        let mut time = time;
        let mut segment = Some(target.segment);

        while let Some(seg) = segment {
            let span = SegmentSpan::of(self.tree, seg);
            if span.start() <= time {
                break;
            }
            let prev = self.layout.prev_segment(seg);
            match prev {
                Some(p) if SegmentSpan::of(self.tree, p).end < time => {
                    time = span.start();
                    break;
                }
                _ => segment = prev,
            }
        }
        while let Some(seg) = segment {
            let span = SegmentSpan::of(self.tree, seg);
            if span.end >= time {
                break;
            }
            let next = self.layout.next_segment(seg);
            match next {
                Some(n) if SegmentSpan::of(self.tree, n).start() > time => {
                    time = span.end;
                    break;
                }
                _ => segment = next,
            }
        }

        if let Some(seg) = segment {
            let span = SegmentSpan::of(self.tree, seg);
            target.segment = seg;
            target.timing = if span.duration == 0 {
                100
            } else {
                bounded(100 - 100 * (i64::from(span.end) - i64::from(time)) / i64::from(span.duration))
            };
        }
    }

    /// Single left-to-right pass over `targets` removing time inversions
    /// and recentring targets that drifted away from their star.
    ///
    /// Merged targets are dropped from the list and star indices renumbered.
    pub fn resolve_conflicts(&self, targets: &mut Vec<Target>) -> Result<(), ProsodyError> {
        let mut prev: Option<usize> = None;
        let mut cur = next_live(targets, 0);
        while let Some(c) = cur {
            let Some(n) = next_live(targets, c + 1) else {
                break;
            };
            let ct = self.target_time(&targets[c]);
            let nt = self.target_time(&targets[n]);

            if ct > nt {
                match (targets[c].is_star(), targets[n].is_star()) {
                    (true, false) => {
                        let anchor = targets[c].segment;
                        let (segment, timing) = match self.layout.next_segment(anchor) {
                            Some(seg) => (seg, RELOCATED_AFTER),
                            None => (anchor, 100),
                        };
                        log::debug!("Moving target {n} after its star to {segment:?} at {timing}%");
                        self.relocate(&mut targets[n], segment, timing)?;
                    }
                    (false, true) => {
                        let anchor = targets[n].segment;
                        let (segment, timing) = match self.layout.prev_segment(anchor) {
                            Some(seg) => (seg, RELOCATED_BEFORE),
                            None => (anchor, 0),
                        };
                        log::debug!("Moving target {c} before its star to {segment:?} at {timing}%");
                        self.relocate(&mut targets[c], segment, timing)?;
                    }
                    _ => {
                        self.merge(targets, c, n);
                        continue;
                    }
                }
            } else if let Some(p) = prev {
                let pt = self.target_time(&targets[p]);
                let star = targets[c].my_star;
                let (before, after) = (i64::from(ct) - i64::from(pt), i64::from(nt) - i64::from(ct));
                if (star == Some(n) && after > before) || (star == Some(p) && before > after) {
                    log::debug!("Recentring target {c} between {pt} and {nt}");
                    self.set_target_time(&mut targets[c], midpoint(pt, nt));
                    self.update_frequency(&mut targets[c], &mut 0)?;
                }
            }
            prev = Some(c);
            cur = Some(n);
        }
        compact(targets);
        Ok(())
    }

    fn update_frequency(&self, target: &mut Target, last_high: &mut i32) -> Result<(), ProsodyError> {
        let hz = self.frequency(target, last_high)?;
        if hz != 0 {
            target.f0 = hz;
        }
        Ok(())
    }

    fn relocate(&self, target: &mut Target, segment: NodeId, timing: i32) -> Result<(), ProsodyError> {
        target.segment = segment;
        target.timing = timing;
        self.update_frequency(target, &mut 0)
    }

    /// Replace `targets[c]` and `targets[n]` by one point at the crossing
    /// of the lines through each target and its star, or at their midpoint.
    fn merge(&self, targets: &mut [Target], c: usize, n: usize) {
        let (tc, fc) = (self.target_time(&targets[c]), targets[c].f0);
        let (tn, fnext) = (self.target_time(&targets[n]), targets[n].f0);

        let star_of = |i: usize| {
            targets[i]
                .my_star
                .filter(|&s| s != i && !targets[s].removed)
                .map(|s| (self.target_time(&targets[s]), targets[s].f0))
        };
        let crossing = match (star_of(c), star_of(n)) {
            (Some((tcs, fcs)), Some((tns, fns))) if tns != tn && tc != tcs => {
                let slope_n = (f64::from(fns) - f64::from(fnext)) / (f64::from(tns) - f64::from(tn));
                let slope_c = (f64::from(fc) - f64::from(fcs)) / (f64::from(tc) - f64::from(tcs));
                if (slope_n < 0.0) != (slope_c < 0.0) {
                    let t = ((f64::from(fnext) - slope_n * f64::from(tn))
                        - (f64::from(fc) - slope_c * f64::from(tc)))
                        / (slope_c - slope_n);
                    let t = t as i32;
                    Some((t, bounded_f64(f64::from(fnext) + slope_n * (f64::from(t) - f64::from(tn)))))
                } else {
                    None
                }
            }
            _ => None,
        };
        let (t, f0) = crossing.unwrap_or((midpoint(tc, tn), midpoint(fc, fnext)));
        log::debug!("Merging targets {c} and {n} at t={t}, {f0} Hz");

        self.set_target_time(&mut targets[c], t);
        targets[c].f0 = f0;
        targets[n].removed = true;
        for target in targets.iter_mut() {
            if target.my_star == Some(n) {
                target.my_star = Some(c);
            }
        }
    }
}

fn midpoint(a: i32, b: i32) -> i32 {
    ((i64::from(a) + i64::from(b)) / 2) as i32
}

fn next_live(targets: &[Target], from: usize) -> Option<usize> {
    (from..targets.len()).find(|&i| !targets[i].removed)
}

/// Drop tombstoned targets and renumber star references.
fn compact(targets: &mut Vec<Target>) {
    let mut new_index = Vec::with_capacity(targets.len());
    let mut next = 0;
    for target in targets.iter() {
        new_index.push((!target.removed).then_some(next));
        if !target.removed {
            next += 1;
        }
    }
    targets.retain(|t| !t.removed);
    for target in targets.iter_mut() {
        target.my_star = target.my_star.and_then(|s| new_index.get(s).copied().flatten());
    }
}

/// Append each target with a frequency to its segment's `f0` list.
/// Returns the number of targets written.
pub fn write_back(tree: &mut AnnotationTree, targets: &[Target]) -> usize {
    let mut written = 0;
    for target in targets.iter().filter(|t| t.f0 != 0) {
        debug_assert_eq!(tree.kind(target.segment), NodeKind::Segment);
        let pair = format!("({},{})", target.timing, target.f0);
        let value = match tree.attr(target.segment, "f0") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {pair}", existing.trim()),
            _ => pair,
        };
        tree.set_attr(target.segment, "f0", value);
        written += 1;
    }
    written
}
