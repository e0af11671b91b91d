pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fingerprint;
pub mod hierarchy;
pub mod ir;
pub mod layout;
pub mod layout_dump;
pub mod projector;
pub mod worker;

pub use cache::LayoutCache;
#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{Config, load_config};
pub use coordinator::{Diagnostic, LayoutCoordinator, SnapshotOutcome};
pub use fingerprint::{Fingerprint, fingerprint};
pub use hierarchy::Hierarchy;
pub use ir::{Position, PositionMap, Snapshot};
pub use projector::{ViewMode, project};
