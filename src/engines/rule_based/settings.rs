use std::collections::HashMap;

use crate::tree::{AnnotationTree, NodeId, NodeKind};

use super::values::{bounded, parse_value, percentage_delta, Value};

/// Relative prosodic settings of one modifier scope.
///
/// All values are percentages where 100 means "no change", except `volume`
/// which is an absolute level in `[0, 100]` with 50 as neutral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProsodicSettings {
    pub rate: i32,
    pub accent_prominence: i32,
    pub accent_slope: i32,
    pub number_of_pauses: i32,
    pub pause_duration: i32,
    pub vowel_duration: i32,
    pub plosive_duration: i32,
    pub fricative_duration: i32,
    pub nasal_duration: i32,
    pub liquid_duration: i32,
    pub glide_duration: i32,
    pub volume: i32,
}

impl Default for ProsodicSettings {
    fn default() -> Self {
        Self {
            rate: 100,
            accent_prominence: 100,
            accent_slope: 100,
            number_of_pauses: 100,
            pause_duration: 100,
            vowel_duration: 100,
            plosive_duration: 100,
            fricative_duration: 100,
            nasal_duration: 100,
            liquid_duration: 100,
            glide_duration: 100,
            volume: 50,
        }
    }
}

impl ProsodicSettings {
    /// Derive a scope's settings from its parent's and the scope attributes.
    pub fn resolve(parent: &Self, attr: impl Fn(&str) -> Option<String>) -> Self {
        let shift = |value: i32, name: &str| {
            let delta = attr(name).map(|v| percentage_delta(&v)).unwrap_or(0);
            bounded(i64::from(value) + i64::from(delta))
        };
        Self {
            rate: shift(parent.rate, "rate"),
            accent_prominence: shift(parent.accent_prominence, "accent-prominence"),
            accent_slope: shift(parent.accent_slope, "accent-slope"),
            number_of_pauses: shift(parent.number_of_pauses, "number-of-pauses"),
            pause_duration: shift(parent.pause_duration, "pause-duration"),
            vowel_duration: shift(parent.vowel_duration, "vowel-duration"),
            plosive_duration: shift(parent.plosive_duration, "plosive-duration"),
            fricative_duration: shift(parent.fricative_duration, "fricative-duration"),
            nasal_duration: shift(parent.nasal_duration, "nasal-duration"),
            liquid_duration: shift(parent.liquid_duration, "liquid-duration"),
            glide_duration: shift(parent.glide_duration, "glide-duration"),
            volume: resolve_volume(parent.volume, attr("volume").as_deref()),
        }
    }

    /// Smallest break index still realised as a pause under these settings.
    pub fn min_break_index(&self) -> i32 {
        let mut min_bi = if self.number_of_pauses <= 50 {
            5
        } else if self.number_of_pauses <= 75 {
            4
        } else if self.number_of_pauses > 150 {
            1
        } else if self.number_of_pauses > 125 {
            2
        } else {
            3
        };
        // Rate shifts the threshold by at most one step.
        if self.rate < 90 && min_bi > 1 {
            min_bi -= 1;
        }
        min_bi
    }
}

fn resolve_volume(parent: i32, raw: Option<&str>) -> i32 {
    let Some(raw) = raw else {
        return parent;
    };
    match raw.trim() {
        "silent" => 0,
        "soft" => 25,
        "medium" => 50,
        "loud" => 75,
        other => match parse_value(other) {
            Some(Value::PercentDelta(p)) => bounded(i64::from(parent) + i64::from(p)).clamp(0, 100),
            Some(Value::Number(n)) => n,
            _ => {
                log::debug!("Ignoring unrecognised volume `{other}'");
                parent
            }
        },
    }
}

/// Per-utterance side table from modifier-scope node to its settings.
#[derive(Debug, Default)]
pub struct SettingsTable {
    by_scope: HashMap<NodeId, ProsodicSettings>,
}

impl SettingsTable {
    /// Resolve the settings of every modifier scope in `tree`.
    ///
    /// Scopes are visited in document order, so every ancestor is resolved
    /// before its descendants.
    pub fn resolve(tree: &AnnotationTree) -> Self {
        let mut table = Self::default();
        for scope in tree.descendants_of(tree.root(), &[NodeKind::Prosody]) {
            let parent = match tree.ancestor(scope, NodeKind::Prosody) {
                Some(ancestor) => table.expect_scope(ancestor),
                None => ProsodicSettings::default(),
            };
            let settings =
                ProsodicSettings::resolve(&parent, |name| tree.attr(scope, name).map(str::to_string));
            table.by_scope.insert(scope, settings);
        }
        log::debug!("Resolved prosodic settings for {} scopes", table.by_scope.len());
        table
    }

    pub fn get(&self, scope: NodeId) -> Option<&ProsodicSettings> {
        self.by_scope.get(&scope)
    }

    /// Settings of the closest modifier scope enclosing `node`, if any.
    pub fn enclosing(&self, tree: &AnnotationTree, node: NodeId) -> Option<(NodeId, ProsodicSettings)> {
        let scope = tree.ancestor(node, NodeKind::Prosody)?;
        Some((scope, self.expect_scope(scope)))
    }

    /// Scopes, in document order, whose minimum break index equals `bi`.
    pub fn scopes_with_min_break_index(&self, tree: &AnnotationTree, bi: i32) -> Vec<NodeId> {
        tree.descendants_of(tree.root(), &[NodeKind::Prosody])
            .into_iter()
            .filter(|scope| self.get(*scope).is_some_and(|s| s.min_break_index() == bi))
            .collect()
    }

    fn expect_scope(&self, scope: NodeId) -> ProsodicSettings {
        match self.by_scope.get(&scope) {
            Some(settings) => *settings,
            None => {
                debug_assert!(false, "no settings resolved for scope {scope:?}");
                log::warn!("No settings resolved for scope {scope:?}, using neutral settings");
                ProsodicSettings::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::rule_based::values::VALUE_LIMIT;

    fn nested(outer: &[(&str, &str)], inner: &[(&str, &str)]) -> (AnnotationTree, NodeId, NodeId) {
        let mut tree = AnnotationTree::new();
        let root = tree.root();
        let o = tree.append_with(root, NodeKind::Prosody, outer);
        let i = tree.append_with(o, NodeKind::Prosody, inner);
        (tree, o, i)
    }

    #[test]
    fn scope_without_attributes_inherits_parent() {
        let (tree, outer, inner) = nested(&[("rate", "+20%"), ("volume", "loud")], &[]);
        let table = SettingsTable::resolve(&tree);
        assert_eq!(table.get(inner), table.get(outer));
    }

    #[test]
    fn deltas_cascade_additively() {
        let (tree, outer, inner) = nested(&[("rate", "+20%")], &[("rate", "+10%")]);
        let table = SettingsTable::resolve(&tree);
        assert_eq!(table.get(outer).unwrap().rate, 120);
        assert_eq!(table.get(inner).unwrap().rate, 130);
    }

    #[test]
    fn volume_delta_is_clamped() {
        let (tree, outer, inner) = nested(&[("volume", "90")], &[("volume", "+50%")]);
        let table = SettingsTable::resolve(&tree);
        assert_eq!(table.get(outer).unwrap().volume, 90);
        assert_eq!(table.get(inner).unwrap().volume, 100);
    }

    #[test]
    fn volume_keywords_and_negative_clamp() {
        let (tree, outer, inner) = nested(&[("volume", "soft")], &[("volume", "-40%")]);
        let table = SettingsTable::resolve(&tree);
        assert_eq!(table.get(outer).unwrap().volume, 25);
        assert_eq!(table.get(inner).unwrap().volume, 0);
    }

    #[test]
    fn huge_deltas_saturate_instead_of_overflowing() {
        let (tree, outer, inner) = nested(
            &[("rate", "+2147483600%"), ("volume", "+2147483600%")],
            &[("rate", "+2147483600%"), ("accent-prominence", "-2147483600%")],
        );
        let table = SettingsTable::resolve(&tree);
        let outer = table.get(outer).unwrap();
        assert_eq!(outer.rate, VALUE_LIMIT);
        assert_eq!(outer.volume, 100);
        let inner = table.get(inner).unwrap();
        assert_eq!(inner.rate, VALUE_LIMIT);
        assert_eq!(inner.accent_prominence, 100 - VALUE_LIMIT);
        assert_eq!(inner.volume, 100);
    }

    #[test]
    fn malformed_delta_counts_as_zero() {
        let (tree, _, inner) = nested(&[("rate", "fast")], &[("pause-duration", "120")]);
        let table = SettingsTable::resolve(&tree);
        let settings = table.get(inner).unwrap();
        assert_eq!(settings.rate, 100);
        assert_eq!(settings.pause_duration, 100);
    }

    #[test]
    fn min_break_index_thresholds() {
        let with = |number_of_pauses, rate| ProsodicSettings {
            number_of_pauses,
            rate,
            ..Default::default()
        };
        assert_eq!(with(40, 100).min_break_index(), 5);
        assert_eq!(with(70, 100).min_break_index(), 4);
        assert_eq!(with(100, 100).min_break_index(), 3);
        assert_eq!(with(130, 100).min_break_index(), 2);
        assert_eq!(with(160, 100).min_break_index(), 1);
        assert_eq!(with(100, 80).min_break_index(), 2);
        assert_eq!(with(160, 80).min_break_index(), 1);
    }

    #[test]
    fn enclosing_finds_nearest_scope() {
        let (mut tree, _, inner) = nested(&[("rate", "+20%")], &[("rate", "-50%")]);
        let token = tree.append(inner, NodeKind::Token);
        let table = SettingsTable::resolve(&tree);
        let (scope, settings) = table.enclosing(&tree, token).unwrap();
        assert_eq!(scope, inner);
        assert_eq!(settings.rate, 70);
        assert!(table.enclosing(&tree, tree.root()).is_none());
    }
}
