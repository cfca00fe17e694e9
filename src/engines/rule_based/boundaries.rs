use crate::tree::{AnnotationTree, NodeId, NodeKind};

use super::settings::SettingsTable;

/// Break index assumed for a boundary whose `breakindex` cannot be read.
pub const DEFAULT_BREAK_INDEX: i32 = 3;

/// The break index of `boundary`, or `None` when it carries no marker.
///
/// A marker that does not parse is logged and read as [`DEFAULT_BREAK_INDEX`].
pub fn break_index(tree: &AnnotationTree, boundary: NodeId) -> Option<i32> {
    let raw = tree.attr(boundary, "breakindex")?;
    Some(raw.trim().parse().unwrap_or_else(|_| {
        log::info!("Unexpected breakindex value `{raw}', assuming {DEFAULT_BREAK_INDEX}");
        DEFAULT_BREAK_INDEX
    }))
}

/// What [`adjust_boundaries`] changed, for logging and reporting.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryChanges {
    pub deleted: usize,
    pub stripped: usize,
    pub inserted: usize,
}

/// Delete boundaries that are too weak for the local pause density and add
/// break index 1 boundaries where a scope asks for pauses between all words.
pub fn adjust_boundaries(tree: &mut AnnotationTree, settings: &SettingsTable) -> BoundaryChanges {
    let mut changes = BoundaryChanges::default();

    for boundary in tree.descendants_of(tree.root(), &[NodeKind::Boundary]) {
        let min_bi = settings
            .enclosing(tree, boundary)
            .map(|(_, s)| s.min_break_index())
            .unwrap_or(DEFAULT_BREAK_INDEX);
        let bi = match tree.attr(boundary, "breakindex") {
            Some(_) => break_index(tree, boundary).unwrap_or(DEFAULT_BREAK_INDEX),
            None => {
                log::info!("Boundary without breakindex, assuming {DEFAULT_BREAK_INDEX}");
                DEFAULT_BREAK_INDEX
            }
        };
        if bi >= min_bi {
            continue;
        }
        if tree.has_attr(boundary, "duration") {
            // An explicit pause survives; only its break strength goes.
            tree.remove_attr(boundary, "breakindex");
            changes.stripped += 1;
        } else {
            tree.detach(boundary);
            changes.deleted += 1;
        }
    }

    for scope in settings.scopes_with_min_break_index(tree, 1) {
        let items = tree.descendants_of(scope, &[NodeKind::Token, NodeKind::Boundary]);
        for pair in items.windows(2) {
            let (prev, current) = (pair[0], pair[1]);
            if tree.kind(prev) == NodeKind::Token && tree.kind(current) == NodeKind::Token {
                if let Some(inserted) = tree.insert_before(current, NodeKind::Boundary) {
                    tree.set_attr(inserted, "breakindex", "1");
                    changes.inserted += 1;
                }
            }
        }
    }

    log::debug!(
        "Boundaries: {} deleted, {} stripped, {} inserted",
        changes.deleted,
        changes.stripped,
        changes.inserted
    );
    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope_with_boundary(scope_attrs: &[(&str, &str)], boundary_attrs: &[(&str, &str)]) -> (AnnotationTree, NodeId) {
        let mut tree = AnnotationTree::new();
        let root = tree.root();
        let scope = tree.append_with(root, NodeKind::Prosody, scope_attrs);
        tree.append(scope, NodeKind::Token);
        let boundary = tree.append_with(scope, NodeKind::Boundary, boundary_attrs);
        tree.append(scope, NodeKind::Token);
        (tree, boundary)
    }

    #[test]
    fn weak_boundary_is_deleted_under_few_pauses() {
        let (mut tree, boundary) =
            scope_with_boundary(&[("number-of-pauses", "-60%")], &[("breakindex", "2")]);
        let settings = SettingsTable::resolve(&tree);
        let changes = adjust_boundaries(&mut tree, &settings);
        assert_eq!(changes.deleted, 1);
        assert!(!tree.is_attached(boundary));
    }

    #[test]
    fn weak_boundary_with_duration_keeps_pause() {
        let (mut tree, boundary) = scope_with_boundary(
            &[("number-of-pauses", "-60%")],
            &[("breakindex", "2"), ("duration", "250")],
        );
        let settings = SettingsTable::resolve(&tree);
        let changes = adjust_boundaries(&mut tree, &settings);
        assert_eq!(changes.stripped, 1);
        assert!(tree.is_attached(boundary));
        assert_eq!(tree.attr(boundary, "breakindex"), None);
        assert_eq!(tree.attr(boundary, "duration"), Some("250"));
    }

    #[test]
    fn boundaries_outside_scopes_use_default_threshold() {
        let mut tree = AnnotationTree::new();
        let root = tree.root();
        let weak = tree.append_with(root, NodeKind::Boundary, &[("breakindex", "2")]);
        let strong = tree.append_with(root, NodeKind::Boundary, &[("breakindex", "3")]);
        let settings = SettingsTable::resolve(&tree);
        adjust_boundaries(&mut tree, &settings);
        assert!(!tree.is_attached(weak));
        assert!(tree.is_attached(strong));
    }

    #[test]
    fn unparsable_break_index_reads_as_three() {
        let mut tree = AnnotationTree::new();
        let root = tree.root();
        let b = tree.append_with(root, NodeKind::Boundary, &[("breakindex", "high")]);
        assert_eq!(break_index(&tree, b), Some(3));
        let settings = SettingsTable::resolve(&tree);
        adjust_boundaries(&mut tree, &settings);
        assert!(tree.is_attached(b));
    }

    #[test]
    fn many_pauses_insert_boundaries_between_tokens() {
        let mut tree = AnnotationTree::new();
        let root = tree.root();
        let scope = tree.append_with(root, NodeKind::Prosody, &[("number-of-pauses", "+60%")]);
        let t1 = tree.append(scope, NodeKind::Token);
        let t2 = tree.append(scope, NodeKind::Token);
        let existing = tree.append_with(scope, NodeKind::Boundary, &[("breakindex", "4")]);
        let t3 = tree.append(scope, NodeKind::Token);

        let settings = SettingsTable::resolve(&tree);
        let changes = adjust_boundaries(&mut tree, &settings);
        assert_eq!(changes.inserted, 1);

        let children = tree.children(scope).to_vec();
        assert_eq!(children.len(), 5);
        assert_eq!(children[0], t1);
        assert_eq!(tree.kind(children[1]), NodeKind::Boundary);
        assert_eq!(tree.attr(children[1], "breakindex"), Some("1"));
        assert_eq!(children[2], t2);
        assert_eq!(children[3], existing);
        assert_eq!(children[4], t3);
    }
}
