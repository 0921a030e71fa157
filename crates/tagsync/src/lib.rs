//! TagSync - persistent identity tags for filesystem objects
//!
//! Every tagged file or directory carries one extended attribute,
//! `ts/<uuid>[/<name>;<name>...]`. A JSON manifest indexes the tagged objects
//! and follows them across moves and renames by matching the UUID.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Attribute  │     │    Tree     │     │ Reconciler  │     │  Manifest   │
//! │    Store    │────▶│   Scanner   │────▶│ (merge/upd/ │────▶│    Store    │
//! │  (xattrs)   │     │             │     │  rebuild)   │     │   (JSON)    │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! # Core Concepts
//!
//! - **Tag**: decoded `(uuid, names)` form of the attribute
//! - **Manifest**: absolute path → last-known metadata of a tagged object
//! - **Missing entry**: an entry whose path was absent at the last update
//! - **Destination guard**: scans refuse to enter a directory marked as a backup target

pub mod attr;
pub mod config;
pub mod error;
pub mod manifest;
pub mod reconcile;
pub mod scanner;
pub mod sentinel;
pub mod tag;

// Re-exports for convenience
pub use attr::{AttributeStore, MemoryStore, XattrStore};
pub use config::{Config, Verbosity};
pub use error::{Result, TagSyncError};
pub use manifest::{FileStat, LoadStatus, Manifest, ManifestEntry};
pub use reconcile::{MergeReport, RebuildOutcome, RebuildReport, RebuildStatus, Reconciler, UpdateReport};
pub use scanner::{ScanStats, ScannedObject, Scanner};
pub use tag::{Tag, TagError};
