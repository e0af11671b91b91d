//! Order-independent content key for a snapshot.
//!
//! Node descriptors (`id:kind`) and link descriptors (`kind:source->target`)
//! are sorted independently, joined, and run through a 32-bit rolling hash.
//! Two snapshots that differ only in traversal order share a fingerprint.
//!
//! Collisions are possible and accepted: a colliding cache hit yields a
//! stale-but-plausible layout, and ids that do not belong to the current
//! snapshot are dropped by the cache filter before use.

use crate::ir::{Node, Snapshot};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Fingerprint(u32);

impl Fingerprint {
    pub fn from_raw(value: u32) -> Self {
        Self(value)
    }

    /// Fixed-width lowercase hex form used as the durable cache key.
    pub fn to_key(self) -> String {
        format!("{:08x}", self.0)
    }

    pub fn parse(key: &str) -> Option<Self> {
        if key.len() != 8 {
            return None;
        }
        u32::from_str_radix(key, 16).ok().map(Self)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.to_key()
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid fingerprint: {value}"))
    }
}

pub fn fingerprint(snapshot: &Snapshot) -> Fingerprint {
    Fingerprint(rolling_hash(&canonical_form(snapshot)))
}

/// The string the hash runs over. Exposed for diagnostics.
pub fn canonical_form(snapshot: &Snapshot) -> String {
    let mut sorted: Vec<&Node> = snapshot.nodes.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.kind.tag().cmp(b.kind.tag())));
    let nodes: Vec<String> = sorted
        .iter()
        .map(|node| format!("{}:{}", node.id, node.kind.tag()))
        .collect();

    let mut links: Vec<String> = snapshot
        .links
        .iter()
        .map(|link| format!("{}:{}->{}", link.kind.tag(), link.source, link.target))
        .collect();
    links.sort();

    let mut out = nodes.join("|");
    out.push('#');
    out.push_str(&links.join("|"));
    out
}

fn rolling_hash(input: &str) -> u32 {
    let mut hash: u32 = 0;
    for ch in input.chars() {
        hash = hash.wrapping_mul(31).wrapping_add(ch as u32);
    }
    hash
}
