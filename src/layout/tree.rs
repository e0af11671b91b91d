use super::*;

/// Indexes the snapshot and links every node to its first structural parent.
/// Links naming unknown ids and self loops are ignored.
pub(super) fn build_forest(ctx: &mut LayoutContext, snapshot: &Snapshot) {
    ctx.reset(snapshot.nodes.len());
    for (idx, node) in snapshot.nodes.iter().enumerate() {
        ctx.index.entry(node.id.clone()).or_insert(idx);
    }

    for link in &snapshot.links {
        if !link.kind.is_structural() {
            continue;
        }
        let (Some(&source), Some(&target)) =
            (ctx.index.get(&link.source), ctx.index.get(&link.target))
        else {
            continue;
        };
        if source == target || ctx.parent[target].is_some() {
            continue;
        }
        ctx.parent[target] = Some(source);
        ctx.children[source].push(target);
    }

    for list in &mut ctx.children {
        list.sort_by(|a, b| snapshot.nodes[*a].id.cmp(&snapshot.nodes[*b].id));
    }

    // A node with neither parent nor children is isolated, not a root.
    ctx.roots = (0..snapshot.nodes.len())
        .filter(|idx| ctx.parent[*idx].is_none() && !ctx.children[*idx].is_empty())
        .collect();
    ctx.roots
        .sort_by(|a, b| snapshot.nodes[*a].id.cmp(&snapshot.nodes[*b].id));
}

/// Tree pass over the forest built by [`build_forest`]. Several roots are
/// laid out as children of an implicit virtual root that is never emitted.
/// Returns the bounds of the placed nodes, or `None` when the forest is empty.
pub(super) fn place_forest(
    ctx: &mut LayoutContext,
    snapshot: &Snapshot,
    config: &LayoutConfig,
    out: &mut PositionMap,
) -> Option<Bounds> {
    if ctx.roots.is_empty() {
        return None;
    }

    let LayoutContext {
        children,
        roots,
        reached,
        depth,
        slot,
        frames,
        ..
    } = ctx;

    let gap = config.container_gap.max(0.0);
    let mut cursor = 0.0f32;
    let mut gap_due = false;
    let mut max_depth = 0usize;

    for &root in roots.iter() {
        reached[root] = true;
        depth[root] = 0;
        if cursor > 0.0 {
            gap_due = true;
        }
        frames.push((root, 0));
        while let Some(frame) = frames.last_mut() {
            let (node, next) = *frame;
            if next < children[node].len() {
                frame.1 += 1;
                let child = children[node][next];
                reached[child] = true;
                depth[child] = depth[node] + 1;
                max_depth = max_depth.max(depth[child]);
                if children[child].is_empty() {
                    if gap_due {
                        cursor += gap;
                        gap_due = false;
                    }
                    slot[child] = cursor;
                    cursor += 1.0;
                } else {
                    if cursor > 0.0 {
                        gap_due = true;
                    }
                    frames.push((child, 0));
                }
                continue;
            }
            frames.pop();
            let first = children[node][0];
            let last = children[node][children[node].len() - 1];
            slot[node] = (slot[first] + slot[last]) / 2.0;
            gap_due = true;
        }
    }

    let span = (cursor - 1.0).max(0.0);
    let available_height = (config.canvas_height - config.margin * 2.0).max(0.0);
    let row_step = if span > 0.0 {
        (available_height / span).max(config.min_row_spacing)
    } else {
        0.0
    };
    let top = if span > 0.0 {
        config.margin
    } else {
        config.margin + available_height / 2.0
    };
    let step_x = level_step(max_depth, config);

    let mut placed = Vec::new();
    for (idx, node) in snapshot.nodes.iter().enumerate() {
        if !reached[idx] || out.contains_key(&node.id) {
            continue;
        }
        let position = Position::new(
            config.margin + depth[idx] as f32 * step_x,
            top + slot[idx] * row_step,
        );
        out.insert(node.id.clone(), position);
        placed.push(position);
    }
    Bounds::from_positions(placed.iter())
}

/// Horizontal distance between depths: the configured spacing, shrunk to fit
/// the canvas width but never below the configured minimum.
pub(super) fn level_step(max_depth: usize, config: &LayoutConfig) -> f32 {
    if max_depth == 0 {
        return config.level_spacing;
    }
    let available = (config.canvas_width - config.margin * 2.0).max(0.0);
    (available / max_depth as f32)
        .min(config.level_spacing)
        .max(config.min_level_spacing)
}
