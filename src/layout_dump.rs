use crate::fingerprint::Fingerprint;
use crate::ir::{PositionMap, Snapshot};
use crate::layout::Bounds;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutDump {
    pub fingerprint: Fingerprint,
    pub width: f32,
    pub height: f32,
    pub nodes: Vec<NodeDump>,
    pub links: Vec<LinkDump>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDump {
    pub id: String,
    pub kind: String,
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden: Option<usize>,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Serialize)]
pub struct LinkDump {
    pub source: String,
    pub target: String,
    pub kind: String,
}

impl LayoutDump {
    /// Nodes without a position are left out of the dump.
    pub fn from_snapshot(
        snapshot: &Snapshot,
        positions: &PositionMap,
        fingerprint: Fingerprint,
    ) -> Self {
        let nodes = snapshot
            .nodes
            .iter()
            .filter_map(|node| {
                let position = positions.get(&node.id)?;
                Some(NodeDump {
                    id: node.id.clone(),
                    kind: node.kind.tag().to_string(),
                    depth: node.depth,
                    hidden: node.kind.aggregate_target().map(|_| node.kind.hidden_count()),
                    x: position.x,
                    y: position.y,
                })
            })
            .collect();

        let links = snapshot
            .links
            .iter()
            .map(|link| LinkDump {
                source: link.source.clone(),
                target: link.target.clone(),
                kind: link.kind.tag().to_string(),
            })
            .collect();

        let (width, height) = Bounds::from_positions(positions.values())
            .map(|bounds| (bounds.width(), bounds.height()))
            .unwrap_or((0.0, 0.0));

        LayoutDump {
            fingerprint,
            width,
            height,
            nodes,
            links,
        }
    }
}

/// Writes the dump as pretty JSON to `path`, or stdout when `path` is `None`.
pub fn write_layout_dump(path: Option<&Path>, dump: &LayoutDump) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            let writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(writer, dump)?;
        }
        None => {
            let mut stdout = io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, dump)?;
            writeln!(stdout)?;
        }
    }
    Ok(())
}
