//! Flattens a source hierarchy into the snapshot that should currently be
//! visible, given the expanded ids and the view mode.

use crate::hierarchy::{Entry, EntryPayload, Hierarchy};
use crate::ir::{Link, LinkKind, NodeKind, Snapshot};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub const AGGREGATE_SUFFIX: &str = "::aggregate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewMode {
    /// Structural links only.
    #[default]
    Hierarchy,
    /// Structure plus file imports.
    Dependencies,
    /// Structure plus symbol calls.
    Calls,
    /// Reference graph only, no structural links.
    References,
}

impl ViewMode {
    pub fn includes(self, kind: LinkKind) -> bool {
        match (self, kind) {
            (Self::References, LinkKind::Structural) => false,
            (_, LinkKind::Structural) => true,
            (Self::Dependencies, LinkKind::Import) => true,
            (Self::Calls, LinkKind::Call) => true,
            (Self::References, LinkKind::Import | LinkKind::Call) => true,
            (Self::Hierarchy, _) | (Self::Dependencies, _) | (Self::Calls, _) => false,
        }
    }

    fn includes_references(self) -> bool {
        self.includes(LinkKind::Import) || self.includes(LinkKind::Call)
    }
}

pub struct ProjectionOptions<'a> {
    pub expanded: &'a HashSet<String>,
    pub view_mode: ViewMode,
    /// Entries rejected by the filter are skipped with their whole subtree.
    /// The root is always kept.
    pub filter: Option<&'a dyn Fn(&Entry) -> bool>,
}

impl<'a> ProjectionOptions<'a> {
    pub fn new(expanded: &'a HashSet<String>, view_mode: ViewMode) -> Self {
        Self {
            expanded,
            view_mode,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: &'a dyn Fn(&Entry) -> bool) -> Self {
        self.filter = Some(filter);
        self
    }
}

pub fn aggregate_id(parent: &str) -> String {
    format!("{parent}{AGGREGATE_SUFFIX}")
}

/// Expansion state of a freshly opened hierarchy: only the root.
pub fn default_expansion(hierarchy: &Hierarchy) -> HashSet<String> {
    let mut expanded = HashSet::new();
    expanded.insert(hierarchy.root.id.clone());
    expanded
}

/// Every directory and file id in the hierarchy.
pub fn full_expansion(hierarchy: &Hierarchy) -> HashSet<String> {
    let mut expanded = HashSet::new();
    let mut stack = vec![&hierarchy.root];
    while let Some(entry) = stack.pop() {
        expanded.insert(entry.id.clone());
        stack.extend(entry.children());
    }
    expanded
}

pub fn project(hierarchy: &Hierarchy, expanded: &HashSet<String>, view_mode: ViewMode) -> Snapshot {
    project_with(hierarchy, &ProjectionOptions::new(expanded, view_mode))
}

pub fn project_with(hierarchy: &Hierarchy, options: &ProjectionOptions<'_>) -> Snapshot {
    let mut projection = Projection {
        options,
        snapshot: Snapshot::new(),
        visible: HashSet::new(),
        representative: HashMap::new(),
        references: Vec::new(),
        descendant_memo: HashMap::new(),
    };
    projection.visit(&hierarchy.root, 0, None);
    projection.finish()
}

struct Projection<'a, 'o> {
    options: &'o ProjectionOptions<'o>,
    snapshot: Snapshot,
    visible: HashSet<&'a str>,
    /// Hidden entity id -> id of the visible node standing in for it.
    representative: HashMap<&'a str, &'a str>,
    references: Vec<(&'a str, &'a str, LinkKind)>,
    descendant_memo: HashMap<&'a str, usize>,
}

impl<'a> Projection<'a, '_> {
    fn accepts(&self, entry: &Entry) -> bool {
        self.options.filter.is_none_or(|filter| filter(entry))
    }

    fn emit(&mut self, id: &'a str, kind: NodeKind, depth: usize, parent: Option<&str>) {
        self.snapshot.push_node(id, kind, depth);
        self.visible.insert(id);
        if let Some(parent) = parent {
            if self.options.view_mode.includes(LinkKind::Structural) {
                self.snapshot.push_link(Link::structural(parent, id));
            }
        }
    }

    fn visit(&mut self, entry: &'a Entry, depth: usize, parent: Option<&str>) {
        if parent.is_some() && !self.accepts(entry) {
            return;
        }
        let expanded = self.options.expanded.contains(&entry.id);
        match &entry.payload {
            EntryPayload::Directory {
                children,
                child_count,
                ..
            } => {
                self.emit(entry.id.as_str(), NodeKind::Container, depth, parent);
                if expanded && !children.is_empty() {
                    for child in children {
                        self.visit(child, depth + 1, Some(entry.id.as_str()));
                    }
                    return;
                }
                let has_hidden = !children.is_empty() || child_count.unwrap_or(0) > 0;
                if !has_hidden {
                    return;
                }
                let hidden = self.descendant_count(entry);
                let kind = NodeKind::Aggregate {
                    target: entry.id.clone(),
                    hidden,
                };
                let id = aggregate_id(&entry.id);
                self.snapshot.push_node(id.clone(), kind, depth + 1);
                if self.options.view_mode.includes(LinkKind::Structural) {
                    self.snapshot.push_link(Link::structural(&entry.id, id));
                }
                if self.options.view_mode.includes_references() {
                    for child in children {
                        self.hide(child, entry.id.as_str());
                    }
                }
            }
            EntryPayload::File { symbols, imports } => {
                self.emit(entry.id.as_str(), NodeKind::Leaf, depth, parent);
                for target in imports {
                    self.references
                        .push((entry.id.as_str(), target.as_str(), LinkKind::Import));
                }
                let show_symbols = expanded && !symbols.is_empty();
                for symbol in symbols {
                    if show_symbols {
                        self.emit(
                            symbol.id.as_str(),
                            NodeKind::Leaf,
                            depth + 1,
                            Some(entry.id.as_str()),
                        );
                    } else {
                        self.representative.insert(symbol.id.as_str(), entry.id.as_str());
                    }
                    for target in &symbol.calls {
                        self.references
                            .push((symbol.id.as_str(), target.as_str(), LinkKind::Call));
                    }
                }
            }
        }
    }

    /// Records everything under a collapsed container so reference links can
    /// be lifted onto it.
    fn hide(&mut self, entry: &'a Entry, visible: &'a str) {
        if !self.accepts(entry) {
            return;
        }
        self.representative.insert(entry.id.as_str(), visible);
        match &entry.payload {
            EntryPayload::Directory { children, .. } => {
                for child in children {
                    self.hide(child, visible);
                }
            }
            EntryPayload::File { symbols, imports } => {
                for target in imports {
                    self.references
                        .push((entry.id.as_str(), target.as_str(), LinkKind::Import));
                }
                for symbol in symbols {
                    self.representative.insert(symbol.id.as_str(), visible);
                    for target in &symbol.calls {
                        self.references
                            .push((symbol.id.as_str(), target.as_str(), LinkKind::Call));
                    }
                }
            }
        }
    }

    fn descendant_count(&mut self, entry: &'a Entry) -> usize {
        if let Some(count) = self.descendant_memo.get(entry.id.as_str()) {
            return *count;
        }
        let count = match &entry.payload {
            EntryPayload::Directory {
                children,
                child_count,
                descendant_count,
            } => match descendant_count {
                Some(count) => *count,
                None if children.is_empty() => child_count.unwrap_or(0),
                None => {
                    let mut total = 0;
                    for child in children {
                        total += 1 + self.descendant_count(child);
                    }
                    total
                }
            },
            EntryPayload::File { .. } => 0,
        };
        self.descendant_memo.insert(entry.id.as_str(), count);
        count
    }

    fn resolve(&self, id: &str) -> Option<&'a str> {
        if let Some(visible) = self.visible.get(id) {
            return Some(*visible);
        }
        self.representative.get(id).copied()
    }

    fn finish(mut self) -> Snapshot {
        let mode = self.options.view_mode;
        let mut seen: HashSet<(&str, &str, LinkKind)> = HashSet::new();
        let references = std::mem::take(&mut self.references);
        for (source, target, kind) in references {
            if !mode.includes(kind) {
                continue;
            }
            let (Some(source), Some(target)) = (self.resolve(source), self.resolve(target)) else {
                continue;
            };
            if source == target || !seen.insert((source, target, kind)) {
                continue;
            }
            self.snapshot.push_link(Link::new(source, target, kind));
        }
        self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::Symbol;

    fn two_leaf_root() -> Hierarchy {
        Hierarchy::new(Entry::directory(
            "root",
            vec![Entry::file("a"), Entry::file("b")],
        ))
    }

    fn ids(snapshot: &Snapshot) -> Vec<&str> {
        let mut ids: Vec<&str> = snapshot.nodes.iter().map(|n| n.id.as_str()).collect();
        ids.sort();
        ids
    }

    fn links(snapshot: &Snapshot) -> Vec<(String, String, LinkKind)> {
        let mut links: Vec<_> = snapshot
            .links
            .iter()
            .map(|l| (l.source.clone(), l.target.clone(), l.kind))
            .collect();
        links.sort();
        links
    }

    #[test]
    fn expanded_root_emits_children() {
        let hierarchy = two_leaf_root();
        let snapshot = project(&hierarchy, &default_expansion(&hierarchy), ViewMode::Hierarchy);
        assert_eq!(ids(&snapshot), vec!["a", "b", "root"]);
        assert_eq!(
            links(&snapshot),
            vec![
                ("root".to_string(), "a".to_string(), LinkKind::Structural),
                ("root".to_string(), "b".to_string(), LinkKind::Structural),
            ]
        );
        assert_eq!(snapshot.node("a").unwrap().depth, 1);
    }

    #[test]
    fn collapsed_root_emits_single_aggregate() {
        let hierarchy = two_leaf_root();
        let snapshot = project(&hierarchy, &HashSet::new(), ViewMode::Hierarchy);
        assert_eq!(ids(&snapshot), vec!["root", "root::aggregate"]);
        let aggregate = snapshot.node("root::aggregate").unwrap();
        assert_eq!(aggregate.kind.hidden_count(), 2);
        assert_eq!(aggregate.kind.aggregate_target(), Some("root"));
        assert_eq!(snapshot.links.len(), 1);
        assert_eq!(snapshot.links[0], Link::structural("root", "root::aggregate"));
    }

    #[test]
    fn empty_directory_has_no_aggregate() {
        let hierarchy = Hierarchy::new(Entry::directory(
            "root",
            vec![Entry::directory("root/empty", Vec::new())],
        ));
        let snapshot = project(&hierarchy, &default_expansion(&hierarchy), ViewMode::Hierarchy);
        assert_eq!(ids(&snapshot), vec!["root", "root/empty"]);
        assert_eq!(snapshot.links.len(), 1);
    }

    #[test]
    fn unfetched_children_use_known_count() {
        let hierarchy = Hierarchy::new(Entry::directory(
            "root",
            vec![Entry::unfetched_directory("root/lib", 12)],
        ));
        let mut expanded = default_expansion(&hierarchy);
        expanded.insert("root/lib".to_string());
        let snapshot = project(&hierarchy, &expanded, ViewMode::Hierarchy);
        let aggregate = snapshot.node("root/lib::aggregate").unwrap();
        assert_eq!(aggregate.kind.hidden_count(), 12);
        assert_eq!(aggregate.depth, 2);
    }

    #[test]
    fn precomputed_descendant_count_wins() {
        let hierarchy = Hierarchy::new(Entry {
            id: "root".to_string(),
            payload: EntryPayload::Directory {
                children: vec![Entry::file("a")],
                child_count: None,
                descendant_count: Some(40),
            },
        });
        let snapshot = project(&hierarchy, &HashSet::new(), ViewMode::Hierarchy);
        assert_eq!(
            snapshot.node("root::aggregate").unwrap().kind.hidden_count(),
            40
        );
    }

    #[test]
    fn nested_descendants_are_counted() {
        let hierarchy = Hierarchy::new(Entry::directory(
            "root",
            vec![
                Entry::directory("root/src", vec![Entry::file("x"), Entry::file("y")]),
                Entry::file("z"),
            ],
        ));
        let snapshot = project(&hierarchy, &HashSet::new(), ViewMode::Hierarchy);
        assert_eq!(
            snapshot.node("root::aggregate").unwrap().kind.hidden_count(),
            4
        );
    }

    #[test]
    fn symbols_only_appear_when_file_is_expanded() {
        let file = Entry::file("main.rs")
            .with_symbols(vec![Symbol::new("main.rs#main"), Symbol::new("main.rs#run")]);
        let hierarchy = Hierarchy::new(Entry::directory("root", vec![file]));
        let mut expanded = default_expansion(&hierarchy);
        let collapsed = project(&hierarchy, &expanded, ViewMode::Hierarchy);
        assert_eq!(ids(&collapsed), vec!["main.rs", "root"]);

        expanded.insert("main.rs".to_string());
        let open = project(&hierarchy, &expanded, ViewMode::Hierarchy);
        assert_eq!(
            ids(&open),
            vec!["main.rs", "main.rs#main", "main.rs#run", "root"]
        );
        assert!(open.links.contains(&Link::structural("main.rs", "main.rs#run")));
        assert_eq!(open.node("main.rs#main").unwrap().depth, 2);
    }

    #[test]
    fn references_are_lifted_to_visible_ancestors() {
        let hierarchy = Hierarchy::new(Entry::directory(
            "root",
            vec![
                Entry::file("app.rs").with_imports(&["lib/util.rs", "lib/io.rs", "missing.rs"]),
                Entry::directory(
                    "lib",
                    vec![Entry::file("lib/util.rs"), Entry::file("lib/io.rs")],
                ),
            ],
        ));
        let snapshot = project(&hierarchy, &default_expansion(&hierarchy), ViewMode::Dependencies);
        let imports: Vec<_> = links(&snapshot)
            .into_iter()
            .filter(|(_, _, kind)| *kind == LinkKind::Import)
            .collect();
        assert_eq!(
            imports,
            vec![("app.rs".to_string(), "lib".to_string(), LinkKind::Import)]
        );
    }

    #[test]
    fn hierarchy_mode_has_no_reference_links() {
        let hierarchy = Hierarchy::new(Entry::directory(
            "root",
            vec![Entry::file("a").with_imports(&["b"]), Entry::file("b")],
        ));
        let snapshot = project(&hierarchy, &default_expansion(&hierarchy), ViewMode::Hierarchy);
        assert!(snapshot.links.iter().all(|l| l.kind == LinkKind::Structural));
    }

    #[test]
    fn reference_mode_drops_structure() {
        let a = Entry::file("a")
            .with_imports(&["b"])
            .with_symbols(vec![Symbol::new("a#f").with_calls(&["b#g"])]);
        let b = Entry::file("b").with_symbols(vec![Symbol::new("b#g")]);
        let hierarchy = Hierarchy::new(Entry::directory("root", vec![a, b]));
        let snapshot = project(&hierarchy, &default_expansion(&hierarchy), ViewMode::References);
        assert_eq!(
            links(&snapshot),
            vec![
                ("a".to_string(), "b".to_string(), LinkKind::Import),
                ("a".to_string(), "b".to_string(), LinkKind::Call),
            ]
        );
    }

    #[test]
    fn filter_skips_subtrees_but_keeps_root() {
        let hierarchy = Hierarchy::new(Entry::directory(
            "root",
            vec![
                Entry::directory("root/target", vec![Entry::file("root/target/out")]),
                Entry::file("root/lib.rs"),
            ],
        ));
        let expanded = full_expansion(&hierarchy);
        let reject_target = |entry: &Entry| !entry.id.contains("target");
        let options =
            ProjectionOptions::new(&expanded, ViewMode::Hierarchy).with_filter(&reject_target);
        let snapshot = project_with(&hierarchy, &options);
        assert_eq!(ids(&snapshot), vec!["root", "root/lib.rs"]);
    }

    #[test]
    fn projection_is_pure() {
        let hierarchy = two_leaf_root();
        let expanded = default_expansion(&hierarchy);
        let first = project(&hierarchy, &expanded, ViewMode::Dependencies);
        let second = project(&hierarchy, &expanded, ViewMode::Dependencies);
        assert_eq!(first, second);
    }
}
