//! Snapshots and in-flight operations
//!
//! A snapshot is an ordered sequence of resource states plus the set of
//! operations that had begun but not ended when the snapshot was taken.
//! Order is significant: dependents follow their dependencies, so a snapshot
//! can be applied front-to-back on the next plan.

use crate::state::ResourceState;
use crate::urn::Urn;
use crate::SNAPSHOT_VERSION;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// The kind of mutation an in-flight operation represents.
///
/// Carried on Begin entries so renderers and the next plan can describe what
/// was interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    /// A create was in flight.
    Creating,
    /// An update was in flight.
    Updating,
    /// A delete was in flight.
    Deleting,
    /// A provider read was in flight.
    Reading,
    /// A refresh was in flight.
    Refreshing,
    /// An import was in flight.
    Importing,
}

/// A begun-but-not-ended mutation, surfaced as "pending" after a crash or a
/// recorded failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// The state the operation was working toward.
    pub resource: Arc<ResourceState>,
    /// What kind of mutation was in flight.
    pub kind: OperationKind,
}

impl Operation {
    /// Create a new operation descriptor.
    pub fn new(resource: Arc<ResourceState>, kind: OperationKind) -> Self {
        Operation { resource, kind }
    }
}

/// Metadata stamped on every snapshot. Never participates in correctness
/// decisions or content comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    /// Unique identifier for this capture.
    pub snapshot_id: Uuid,
    /// When the snapshot was captured.
    pub time: DateTime<Utc>,
    /// Snapshot format version.
    pub version: u32,
}

impl SnapshotManifest {
    /// Create a manifest stamped with the current time.
    pub fn new() -> Self {
        SnapshotManifest {
            snapshot_id: Uuid::new_v4(),
            time: Utc::now(),
            version: SNAPSHOT_VERSION,
        }
    }
}

impl Default for SnapshotManifest {
    fn default() -> Self {
        Self::new()
    }
}

/// Structural problems found by [`Snapshot::verify_integrity`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnapshotIntegrityError {
    /// A resource depends on a URN that does not appear before it.
    #[error("resource {urn} depends on {dependency}, which does not appear before it")]
    DanglingDependency {
        /// The dependent resource.
        urn: Urn,
        /// The missing or out-of-order dependency.
        dependency: Urn,
    },

    /// A resource names a parent that does not appear before it.
    #[error("resource {urn} has parent {parent}, which does not appear before it")]
    DanglingParent {
        /// The child resource.
        urn: Urn,
        /// The missing or out-of-order parent.
        parent: Urn,
    },

    /// Two live resources share a URN.
    #[error("duplicate resource URN {urn}")]
    DuplicateUrn {
        /// The duplicated URN.
        urn: Urn,
    },
}

/// An ordered resource graph plus in-flight operations.
///
/// Resources are held behind `Arc` so snapshots, journal entries, and the
/// manager's identity table can share one allocation per recorded state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Capture metadata.
    #[serde(default)]
    pub manifest: Option<SnapshotManifest>,

    /// Resource states, dependencies before dependents.
    pub resources: Vec<Arc<ResourceState>>,

    /// Operations that had begun but not ended.
    #[serde(default)]
    pub pending_operations: Vec<Operation>,
}

impl Snapshot {
    /// An empty snapshot with a fresh manifest.
    pub fn empty() -> Self {
        Snapshot {
            manifest: Some(SnapshotManifest::new()),
            resources: Vec::new(),
            pending_operations: Vec::new(),
        }
    }

    /// Build a snapshot from resources, with a fresh manifest and no pending
    /// operations.
    pub fn from_resources(resources: Vec<Arc<ResourceState>>) -> Self {
        Snapshot {
            manifest: Some(SnapshotManifest::new()),
            resources,
            pending_operations: Vec::new(),
        }
    }

    /// Number of resources in the snapshot.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// True when the snapshot holds no resources.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Compare resource and pending-operation content, ignoring manifests.
    pub fn content_eq(&self, other: &Snapshot) -> bool {
        self.resources == other.resources && self.pending_operations == other.pending_operations
    }

    /// Find the index of a resource by allocation identity.
    pub fn index_of(&self, state: &Arc<ResourceState>) -> Option<usize> {
        self.resources.iter().position(|r| Arc::ptr_eq(r, state))
    }

    /// Check structural invariants: every dependency, parent, and
    /// deleted-with reference must appear earlier in the list, and no URN
    /// may be duplicated among live resources (those neither marked for
    /// deletion nor pending replacement).
    pub fn verify_integrity(&self) -> Result<(), SnapshotIntegrityError> {
        let mut seen: HashSet<&Urn> = HashSet::new();
        let mut live: HashSet<&Urn> = HashSet::new();

        for resource in &self.resources {
            for dependency in &resource.dependencies {
                if !seen.contains(dependency) {
                    return Err(SnapshotIntegrityError::DanglingDependency {
                        urn: resource.urn.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
            if let Some(parent) = &resource.parent {
                if !seen.contains(parent) {
                    return Err(SnapshotIntegrityError::DanglingParent {
                        urn: resource.urn.clone(),
                        parent: parent.clone(),
                    });
                }
            }
            if let Some(deleted_with) = &resource.deleted_with {
                if !seen.contains(deleted_with) {
                    return Err(SnapshotIntegrityError::DanglingDependency {
                        urn: resource.urn.clone(),
                        dependency: deleted_with.clone(),
                    });
                }
            }

            if !resource.delete && !resource.pending_replacement {
                if live.contains(&resource.urn) {
                    return Err(SnapshotIntegrityError::DuplicateUrn {
                        urn: resource.urn.clone(),
                    });
                }
                live.insert(&resource.urn);
            }
            seen.insert(&resource.urn);
        }

        Ok(())
    }
}
