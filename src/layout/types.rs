use std::collections::HashMap;
use std::sync::Arc;

use crate::fingerprint::Fingerprint;
use crate::ir::{Position, PositionMap, Snapshot};

#[derive(Debug, Clone)]
pub struct LayoutRequest {
    pub request_id: u64,
    pub fingerprint: Fingerprint,
    pub snapshot: Arc<Snapshot>,
    pub seeds: PositionMap,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayoutOutcome {
    Positions(PositionMap),
    /// The computation panicked; the message is the panic payload when it
    /// was a string.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutResponse {
    pub request_id: u64,
    pub fingerprint: Fingerprint,
    pub outcome: LayoutOutcome,
}

/// Scratch state for one layout call. Owned by the caller (one per worker
/// thread) and reset at the start of every call, so nothing computed for one
/// snapshot leaks into the next.
#[derive(Debug, Default)]
pub struct LayoutContext {
    pub(super) index: HashMap<String, usize>,
    pub(super) parent: Vec<Option<usize>>,
    pub(super) children: Vec<Vec<usize>>,
    pub(super) roots: Vec<usize>,
    pub(super) reached: Vec<bool>,
    pub(super) depth: Vec<usize>,
    pub(super) slot: Vec<f32>,
    pub(super) frames: Vec<(usize, usize)>,
}

impl LayoutContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub(super) fn reset(&mut self, node_count: usize) {
        self.index.clear();
        self.parent.clear();
        self.parent.resize(node_count, None);
        for list in &mut self.children {
            list.clear();
        }
        self.children.resize_with(node_count, Vec::new);
        self.roots.clear();
        self.reached.clear();
        self.reached.resize(node_count, false);
        self.depth.clear();
        self.depth.resize(node_count, 0);
        self.slot.clear();
        self.slot.resize(node_count, 0.0);
        self.frames.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Bounds {
    pub fn from_positions<'a>(positions: impl IntoIterator<Item = &'a Position>) -> Option<Self> {
        let mut bounds: Option<Self> = None;
        for position in positions {
            if !position.is_finite() {
                continue;
            }
            let current = bounds.get_or_insert(Self {
                min_x: position.x,
                min_y: position.y,
                max_x: position.x,
                max_y: position.y,
            });
            current.min_x = current.min_x.min(position.x);
            current.min_y = current.min_y.min(position.y);
            current.max_x = current.max_x.max(position.x);
            current.max_y = current.max_y.max(position.y);
        }
        bounds
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }
}
