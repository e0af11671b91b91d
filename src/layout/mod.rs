//! Hybrid tree / grid layout.
//!
//! Nodes reachable from a structural root are laid out as a tidy left-to-right
//! tree: depth picks the column, an in-order walk over the leaves picks the
//! row. Everything else (isolated nodes, nodes only connected through
//! reference links, structural cycles) goes to a grid packer placed beside the
//! tree, reusing seed positions where they exist.

mod packer;
mod tree;
pub(crate) mod types;
pub use types::*;
use packer::*;
use tree::*;

use crate::config::LayoutConfig;
use crate::ir::{Position, PositionMap, Snapshot};

/// Positions every node of `snapshot`. Never fails: links naming unknown ids
/// are ignored and nodes the tree pass cannot reach fall back to the grid.
pub fn compute_layout(
    ctx: &mut LayoutContext,
    snapshot: &Snapshot,
    seeds: &PositionMap,
    config: &LayoutConfig,
) -> PositionMap {
    let mut positions = PositionMap::new();
    build_forest(ctx, snapshot);
    let tree_bounds = place_forest(ctx, snapshot, config, &mut positions);
    place_remaining(snapshot, seeds, tree_bounds, config, &mut positions);
    debug_assert!(
        snapshot
            .nodes
            .iter()
            .all(|node| positions.contains_key(&node.id))
    );
    positions
}

/// One-shot layout with a throwaway context.
pub fn layout_snapshot(
    snapshot: &Snapshot,
    seeds: &PositionMap,
    config: &LayoutConfig,
) -> PositionMap {
    compute_layout(&mut LayoutContext::new(), snapshot, seeds, config)
}

/// Degraded placement used when no worker is available: seeds where finite,
/// grid cells for the rest. Cheap enough for the interactive thread.
pub fn pack_fallback(
    snapshot: &Snapshot,
    seeds: &PositionMap,
    config: &LayoutConfig,
) -> PositionMap {
    let mut positions = PositionMap::new();
    place_remaining(snapshot, seeds, None, config, &mut positions);
    positions
}

/// Gives every node missing from `positions` a grid cell beside the ones
/// already placed.
pub fn fill_missing(snapshot: &Snapshot, positions: &mut PositionMap, config: &LayoutConfig) {
    let occupied = Bounds::from_positions(positions.values());
    place_remaining(snapshot, &PositionMap::new(), occupied, config, positions);
}
