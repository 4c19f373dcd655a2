//! The snapshot manager contract
//!
//! The engine drives every manager through these two object-safe traits:
//! it begins a mutation before performing any external side effect, and it
//! ends the returned handle with the outcome once the side effect settles.

use crate::error::Result;
use tidemark_core::{Snapshot, Step};

/// Records the engine's intent and outcomes and maintains the evolving
/// resource graph.
///
/// Implementations are invoked from concurrent plan workers; every method
/// takes `&self` and synchronizes internally.
pub trait SnapshotManager: Send + Sync {
    /// Record the intent to mutate a resource. Must be called before the
    /// external side effect starts; an error here means the side effect
    /// must not be performed.
    fn begin_mutation(&self, step: &dyn Step) -> Result<Box<dyn Mutation>>;

    /// Record a self-contained outputs update for an already-recorded
    /// resource. There is no paired Begin.
    fn register_resource_outputs(&self, step: &dyn Step) -> Result<()>;

    /// Rebase onto a new base snapshot. Only legal before any mutation has
    /// been recorded.
    fn write(&self, base: &Snapshot) -> Result<()>;

    /// The manager's current view of the world: the base snapshot with all
    /// recorded entries replayed onto it.
    fn rebuilt_base_state(&self) -> Result<Snapshot>;

    /// Flush pending writes, produce the final snapshot, and release the
    /// persister.
    fn close(&self) -> Result<Snapshot>;
}

/// Handle returned by [`SnapshotManager::begin_mutation`]; records the
/// outcome of the mutation it opened.
pub trait Mutation: Send + Sync {
    /// Record the outcome. `successful` is false for failures and partial
    /// failures; the journal still records what happened.
    fn end(&self, step: &dyn Step, successful: bool) -> Result<()>;
}

/// A mutation handle that records nothing.
///
/// Returned for steps that are pure envelopes (replace), whose paired
/// concrete steps carry the journaled semantics.
pub struct NoopMutation;

impl Mutation for NoopMutation {
    fn end(&self, _step: &dyn Step, _successful: bool) -> Result<()> {
        Ok(())
    }
}
