//! Source hierarchy the projector flattens: directories, files and the symbols
//! parsed out of files, plus the reference edges (imports, calls) between them.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hierarchy {
    pub root: Entry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    #[serde(flatten)]
    pub payload: EntryPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EntryPayload {
    #[serde(rename_all = "camelCase")]
    Directory {
        #[serde(default)]
        children: Vec<Entry>,
        /// Known child count when `children` has not been fetched yet.
        #[serde(default)]
        child_count: Option<usize>,
        /// Precomputed number of directory/file entries below this one.
        #[serde(default)]
        descendant_count: Option<usize>,
    },
    File {
        #[serde(default)]
        symbols: Vec<Symbol>,
        #[serde(default)]
        imports: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub calls: Vec<String>,
}

impl Entry {
    pub fn directory(id: impl Into<String>, children: Vec<Entry>) -> Self {
        Self {
            id: id.into(),
            payload: EntryPayload::Directory {
                children,
                child_count: None,
                descendant_count: None,
            },
        }
    }

    /// A directory whose children are known to exist but are not loaded yet.
    pub fn unfetched_directory(id: impl Into<String>, child_count: usize) -> Self {
        Self {
            id: id.into(),
            payload: EntryPayload::Directory {
                children: Vec::new(),
                child_count: Some(child_count),
                descendant_count: None,
            },
        }
    }

    pub fn file(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: EntryPayload::File {
                symbols: Vec::new(),
                imports: Vec::new(),
            },
        }
    }

    pub fn with_imports(mut self, targets: &[&str]) -> Self {
        if let EntryPayload::File { imports, .. } = &mut self.payload {
            imports.extend(targets.iter().map(|t| t.to_string()));
        }
        self
    }

    pub fn with_symbols(mut self, new_symbols: Vec<Symbol>) -> Self {
        if let EntryPayload::File { symbols, .. } = &mut self.payload {
            symbols.extend(new_symbols);
        }
        self
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.payload, EntryPayload::Directory { .. })
    }

    pub fn children(&self) -> &[Entry] {
        match &self.payload {
            EntryPayload::Directory { children, .. } => children,
            EntryPayload::File { .. } => &[],
        }
    }
}

impl Symbol {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            calls: Vec::new(),
        }
    }

    pub fn with_calls(mut self, targets: &[&str]) -> Self {
        self.calls.extend(targets.iter().map(|t| t.to_string()));
        self
    }
}

impl Hierarchy {
    pub fn new(root: Entry) -> Self {
        Self { root }
    }

    pub fn from_json(input: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(input)?)
    }
}

pub fn load_hierarchy(path: &Path) -> anyhow::Result<Hierarchy> {
    let contents = std::fs::read_to_string(path)?;
    Hierarchy::from_json(&contents)
}
