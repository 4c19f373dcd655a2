//! The planner-facing step contract
//!
//! The deployment planner computes a plan of steps over the declared
//! resources and executes them concurrently. This module defines the narrow
//! view of a step that the journal and snapshot manager need; planning and
//! diffing themselves live elsewhere.

use crate::state::ResourceState;
use crate::urn::Urn;
use std::sync::Arc;

/// The operation a step performs on its resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepOp {
    /// Nothing changed; the step exists so the resource is carried forward.
    Same,
    /// Create a new resource.
    Create,
    /// Create the replacement for a resource being replaced.
    CreateReplacement,
    /// Update a resource in place.
    Update,
    /// Delete a resource.
    Delete,
    /// Delete the old copy of a replaced resource.
    DeleteReplaced,
    /// Drop a read resource from the snapshot without touching the provider.
    ReadDiscard,
    /// Drop the old copy of a replaced read resource.
    DiscardReplaced,
    /// The logical envelope of a replacement; carries no side effect itself.
    Replace,
    /// Read an external resource from the provider.
    Read,
    /// Re-read an external resource that is being replaced.
    ReadReplacement,
    /// Refresh a resource's state from the provider.
    Refresh,
    /// Clear a deferred replacement marker.
    RemovePendingReplace,
    /// Adopt an existing physical resource into the snapshot.
    Import,
    /// Adopt an existing physical resource as a replacement.
    ImportReplacement,
}

impl StepOp {
    /// True for the delete family (including read discards).
    pub fn is_deletion(self) -> bool {
        matches!(
            self,
            StepOp::Delete | StepOp::DeleteReplaced | StepOp::ReadDiscard | StepOp::DiscardReplaced
        )
    }

    /// True for deletions that happen as part of a replacement, which are
    /// allowed to remove protected resources.
    pub fn is_replacement_deletion(self) -> bool {
        matches!(self, StepOp::DeleteReplaced | StepOp::DiscardReplaced)
    }

    /// True for the create family.
    pub fn is_creation(self) -> bool {
        matches!(self, StepOp::Create | StepOp::CreateReplacement)
    }

    /// True for the read family.
    pub fn is_read(self) -> bool {
        matches!(self, StepOp::Read | StepOp::ReadReplacement)
    }

    /// True for the import family.
    pub fn is_import(self) -> bool {
        matches!(self, StepOp::Import | StepOp::ImportReplacement)
    }
}

/// One planner-issued instruction to mutate one resource.
///
/// Steps are handed to the snapshot manager by reference; the `old` and
/// `new` states they expose must be the same allocations the engine uses
/// everywhere else, because deletion targeting compares by `Arc` identity.
/// The engine must not mutate a state after handing it over.
pub trait Step: Send + Sync {
    /// The operation this step performs.
    fn op(&self) -> StepOp;

    /// The URN of the resource being mutated.
    fn urn(&self) -> &Urn;

    /// The type token of the resource being mutated.
    fn type_token(&self) -> &str {
        self.urn().type_token()
    }

    /// The pre-existing state, if the resource already existed.
    fn old_state(&self) -> Option<&Arc<ResourceState>> {
        None
    }

    /// The post-state the step is working toward, if any.
    fn new_state(&self) -> Option<&Arc<ResourceState>> {
        None
    }

    /// The state the step is "about": the new state when present, else the
    /// old one.
    fn res(&self) -> Option<&Arc<ResourceState>> {
        self.new_state().or_else(|| self.old_state())
    }

    /// False for steps that exist only for bookkeeping and have no logical
    /// effect on the program's view of the stack.
    fn logical(&self) -> bool {
        true
    }

    /// The provider reference for this step's resource.
    fn provider(&self) -> Option<&str> {
        self.res().and_then(|r| r.provider.as_deref())
    }

    /// On same-steps: true when this stands in for a create that was
    /// skipped (e.g. under a targeted run). Skipped creates always write.
    fn is_skipped_create(&self) -> bool {
        false
    }

    /// On refresh steps: true when the refreshed resource is persisted in
    /// the snapshot rather than held only in memory.
    fn persisted(&self) -> bool {
        false
    }

    /// On import-replacement steps: the original state being replaced.
    fn original(&self) -> Option<&Arc<ResourceState>> {
        None
    }
}
