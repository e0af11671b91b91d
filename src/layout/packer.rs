use super::*;

/// Row-major grid of fixed-size cells starting at `origin`.
struct GridPacker {
    origin: Position,
    cell: f32,
    columns: usize,
    next: usize,
}

impl GridPacker {
    fn new(origin: Position, cell: f32, columns: usize) -> Self {
        Self {
            origin,
            cell: cell.max(1.0),
            columns: columns.max(1),
            next: 0,
        }
    }

    fn next_cell(&mut self) -> Position {
        let row = self.next / self.columns;
        let col = self.next % self.columns;
        self.next += 1;
        Position::new(
            self.origin.x + col as f32 * self.cell,
            self.origin.y + row as f32 * self.cell,
        )
    }
}

/// Places every node of `snapshot` that `out` does not cover yet. Finite seed
/// positions are reused; everything else gets a grid cell in a region to the
/// right of `occupied` and of the reused seeds, in id order.
pub(super) fn place_remaining(
    snapshot: &Snapshot,
    seeds: &PositionMap,
    occupied: Option<Bounds>,
    config: &LayoutConfig,
    out: &mut PositionMap,
) {
    let mut remaining: Vec<&str> = snapshot
        .nodes
        .iter()
        .map(|node| node.id.as_str())
        .filter(|id| !out.contains_key(*id))
        .collect();
    remaining.sort_unstable();
    remaining.dedup();
    if remaining.is_empty() {
        return;
    }

    let mut unseeded = Vec::new();
    let mut reused = Vec::new();
    for id in remaining {
        match seeds.get(id) {
            Some(seed) if seed.is_finite() => {
                out.insert(id.to_string(), *seed);
                reused.push(*seed);
            }
            _ => unseeded.push(id),
        }
    }
    if unseeded.is_empty() {
        return;
    }

    // Reused seeds count as occupied so no grid cell lands on one.
    let occupied = match (occupied, Bounds::from_positions(&reused)) {
        (Some(bounds), Some(seeded)) => Some(bounds.union(seeded)),
        (bounds, seeded) => bounds.or(seeded),
    };
    let origin = match occupied {
        Some(bounds) => Position::new(bounds.max_x + config.grid_cell * 2.0, bounds.min_y),
        None => Position::new(config.margin, config.margin),
    };
    let columns = config
        .grid_columns
        .unwrap_or_else(|| (unseeded.len() as f32).sqrt().ceil() as usize);
    let mut grid = GridPacker::new(origin, config.grid_cell, columns);
    for id in unseeded {
        out.insert(id.to_string(), grid.next_cell());
    }
}
