//! Core types for Tidemark
//!
//! This crate defines the foundational types shared by the journal and the
//! snapshot manager:
//! - Urn: stable, globally unique resource name
//! - ResourceState: the full recorded state of one resource
//! - Snapshot: an ordered resource graph plus in-flight operations
//! - Operation / OperationKind: descriptors for begun-but-not-ended mutations
//! - StepOp / Step: the contract the deployment planner programs against
//!
//! Resource states are shared as `Arc<ResourceState>` and are immutable once
//! handed to a manager; allocation identity (`Arc::ptr_eq`) is how the rest
//! of the system refers back to a particular state.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod snapshot;
pub mod state;
pub mod step;
pub mod testing;
pub mod urn;

pub use snapshot::{Operation, OperationKind, Snapshot, SnapshotIntegrityError, SnapshotManifest};
pub use state::{CustomTimeouts, PropertyMap, ResourceState};
pub use step::{Step, StepOp};
pub use urn::{Urn, UrnParseError};

/// Snapshot format version written into manifests and snapshot files.
pub const SNAPSHOT_VERSION: u32 = 1;
