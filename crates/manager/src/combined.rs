//! Combined snapshot manager
//!
//! Composes several child managers under one façade and forwards every
//! operation to every child, e.g. a local journal plus a remote persister.
//! Each child is flagged either hard-failing (its errors propagate from the
//! failing call) or collect-only (its errors accumulate on the combined
//! manager and the call proceeds), so a flaky secondary backend cannot fail
//! the plan.
//!
//! A child whose Begin fails is excluded from the returned composite
//! mutation; its End is never called.

use crate::error::{ManagerError, Result};
use crate::traits::{Mutation, SnapshotManager};
use parking_lot::Mutex;
use std::sync::Arc;
use tidemark_core::{Snapshot, Step};

struct Child {
    manager: Box<dyn SnapshotManager>,
    collect_errors_only: bool,
}

/// A snapshot manager fanning out to a sequence of children.
pub struct CombinedSnapshotManager {
    children: Vec<Child>,
    collected: Arc<Mutex<Vec<ManagerError>>>,
}

impl CombinedSnapshotManager {
    /// Create a combined manager with no children.
    pub fn new() -> Self {
        CombinedSnapshotManager {
            children: Vec::new(),
            collected: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add a child. With `collect_errors_only`, the child's failures are
    /// recorded on this manager instead of failing the calling operation.
    pub fn push(&mut self, manager: Box<dyn SnapshotManager>, collect_errors_only: bool) {
        self.children.push(Child {
            manager,
            collect_errors_only,
        });
    }

    /// Number of errors collected from collect-only children so far.
    pub fn error_count(&self) -> usize {
        self.collected.lock().len()
    }

    /// Drain the errors collected from collect-only children. Intended to
    /// be read after `close`.
    pub fn take_errors(&self) -> Vec<ManagerError> {
        std::mem::take(&mut *self.collected.lock())
    }

    /// Run `f` against every child, classifying failures: collect-only
    /// children record their error and yield `None`, other failures
    /// aggregate into the returned error.
    fn dispatch<T>(
        &self,
        mut f: impl FnMut(&dyn SnapshotManager) -> Result<T>,
    ) -> Result<Vec<Option<T>>> {
        let mut results = Vec::with_capacity(self.children.len());
        let mut hard = Vec::new();

        for child in &self.children {
            match f(child.manager.as_ref()) {
                Ok(value) => results.push(Some(value)),
                Err(error) if child.collect_errors_only => {
                    tracing::error!(%error, "collect-only child manager failed");
                    self.collected.lock().push(error);
                    results.push(None);
                }
                Err(error) => {
                    hard.push(error);
                    results.push(None);
                }
            }
        }

        if hard.is_empty() {
            Ok(results)
        } else {
            Err(ManagerError::aggregate(hard))
        }
    }
}

impl Default for CombinedSnapshotManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotManager for CombinedSnapshotManager {
    fn begin_mutation(&self, step: &dyn Step) -> Result<Box<dyn Mutation>> {
        let begun = self.dispatch(|manager| manager.begin_mutation(step))?;

        let active: Vec<(Box<dyn Mutation>, bool)> = begun
            .into_iter()
            .zip(&self.children)
            .filter_map(|(mutation, child)| {
                mutation.map(|m| (m, child.collect_errors_only))
            })
            .collect();

        Ok(Box::new(CombinedMutation {
            active,
            collected: self.collected.clone(),
        }))
    }

    fn register_resource_outputs(&self, step: &dyn Step) -> Result<()> {
        self.dispatch(|manager| manager.register_resource_outputs(step))?;
        Ok(())
    }

    fn write(&self, base: &Snapshot) -> Result<()> {
        self.dispatch(|manager| manager.write(base))?;
        Ok(())
    }

    fn rebuilt_base_state(&self) -> Result<Snapshot> {
        // The first child is the primary backend; the others mirror it.
        match self.children.first() {
            Some(child) => child.manager.rebuilt_base_state(),
            None => Ok(Snapshot::empty()),
        }
    }

    fn close(&self) -> Result<Snapshot> {
        let snapshots = self.dispatch(|manager| manager.close())?;
        Ok(snapshots
            .into_iter()
            .flatten()
            .next()
            .unwrap_or_else(Snapshot::empty))
    }
}

/// Composite handle fanning End out to every child that successfully began.
struct CombinedMutation {
    active: Vec<(Box<dyn Mutation>, bool)>,
    collected: Arc<Mutex<Vec<ManagerError>>>,
}

impl Mutation for CombinedMutation {
    fn end(&self, step: &dyn Step, successful: bool) -> Result<()> {
        let mut hard = Vec::new();
        for (mutation, collect_errors_only) in &self.active {
            match mutation.end(step, successful) {
                Ok(()) => {}
                Err(error) if *collect_errors_only => {
                    tracing::error!(%error, "collect-only child mutation failed");
                    self.collected.lock().push(error);
                }
                Err(error) => hard.push(error),
            }
        }
        if hard.is_empty() {
            Ok(())
        } else {
            Err(ManagerError::aggregate(hard))
        }
    }
}
