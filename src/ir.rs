use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NodeKind {
    Container,
    Leaf,
    /// Stands in for a collapsed subtree rooted at `target`.
    Aggregate { target: String, hidden: usize },
}

impl NodeKind {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Leaf => "leaf",
            Self::Aggregate { .. } => "aggregate",
        }
    }

    pub fn hidden_count(&self) -> usize {
        match self {
            Self::Aggregate { hidden, .. } => *hidden,
            Self::Container | Self::Leaf => 0,
        }
    }

    pub fn aggregate_target(&self) -> Option<&str> {
        match self {
            Self::Aggregate { target, .. } => Some(target.as_str()),
            Self::Container | Self::Leaf => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKind,
    pub depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LinkKind {
    Structural,
    Import,
    Call,
}

impl LinkKind {
    pub fn tag(self) -> &'static str {
        match self {
            Self::Structural => "structural",
            Self::Import => "import",
            Self::Call => "call",
        }
    }

    pub fn is_structural(self) -> bool {
        self == Self::Structural
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub source: String,
    pub target: String,
    pub kind: LinkKind,
}

impl Link {
    pub fn new(source: impl Into<String>, target: impl Into<String>, kind: LinkKind) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
        }
    }

    pub fn structural(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(source, target, LinkKind::Structural)
    }
}

/// The flattened node/link set that should currently be visible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_node(&mut self, id: impl Into<String>, kind: NodeKind, depth: usize) {
        self.nodes.push(Node {
            id: id.into(),
            kind,
            depth,
        });
    }

    pub fn push_link(&mut self, link: Link) {
        self.links.push(link);
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.iter().any(|node| node.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Node id to coordinate. Partial: a node may not have a position yet.
pub type PositionMap = BTreeMap<String, Position>;
