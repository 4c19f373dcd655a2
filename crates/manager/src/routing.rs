//! Routing snapshot manager
//!
//! A unified deployment can span several stacks. The routing manager holds
//! one child manager per backend stack and a mapping from project name to
//! backend stack; every step is dispatched to the child that owns the
//! step's project, so each resource persists to its owning stack's journal
//! while the engine sees one logical snapshot manager.

use crate::error::{ManagerError, Result};
use crate::traits::{Mutation, SnapshotManager};
use std::collections::{BTreeMap, HashMap};
use tidemark_core::{Snapshot, SnapshotManifest, Step};

/// A snapshot manager dispatching per resource to its owning backend.
pub struct RoutingSnapshotManager {
    /// Child managers keyed by backend-stack identifier. Ordered, so the
    /// merged logical snapshot is deterministic.
    backends: BTreeMap<String, Box<dyn SnapshotManager>>,

    /// Project name to backend-stack identifier.
    routes: HashMap<String, String>,
}

impl RoutingSnapshotManager {
    /// Create a routing manager from backends and a project mapping.
    pub fn new(
        backends: BTreeMap<String, Box<dyn SnapshotManager>>,
        routes: HashMap<String, String>,
    ) -> Self {
        RoutingSnapshotManager { backends, routes }
    }

    fn backend_for(&self, project: &str) -> Result<&dyn SnapshotManager> {
        let stack = self
            .routes
            .get(project)
            .ok_or_else(|| ManagerError::UnroutableProject {
                project: project.to_string(),
            })?;
        self.backends
            .get(stack)
            .map(|manager| manager.as_ref())
            .ok_or_else(|| ManagerError::UnknownBackend {
                stack: stack.clone(),
            })
    }

    /// Fan an operation out to every backend, aggregating failures.
    fn for_each_backend<T>(
        &self,
        mut f: impl FnMut(&dyn SnapshotManager) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut results = Vec::with_capacity(self.backends.len());
        let mut errors = Vec::new();
        for manager in self.backends.values() {
            match f(manager.as_ref()) {
                Ok(value) => results.push(value),
                Err(error) => errors.push(error),
            }
        }
        if errors.is_empty() {
            Ok(results)
        } else {
            Err(ManagerError::aggregate(errors))
        }
    }

    fn merge(snapshots: Vec<Snapshot>) -> Snapshot {
        let mut merged = Snapshot {
            manifest: Some(SnapshotManifest::new()),
            resources: Vec::new(),
            pending_operations: Vec::new(),
        };
        for snapshot in snapshots {
            merged.resources.extend(snapshot.resources);
            merged.pending_operations.extend(snapshot.pending_operations);
        }
        merged
    }
}

impl SnapshotManager for RoutingSnapshotManager {
    fn begin_mutation(&self, step: &dyn Step) -> Result<Box<dyn Mutation>> {
        self.backend_for(step.urn().project())?.begin_mutation(step)
    }

    fn register_resource_outputs(&self, step: &dyn Step) -> Result<()> {
        self.backend_for(step.urn().project())?
            .register_resource_outputs(step)
    }

    fn write(&self, base: &Snapshot) -> Result<()> {
        self.for_each_backend(|manager| manager.write(base))?;
        Ok(())
    }

    fn rebuilt_base_state(&self) -> Result<Snapshot> {
        let snapshots = self.for_each_backend(|manager| manager.rebuilt_base_state())?;
        Ok(Self::merge(snapshots))
    }

    fn close(&self) -> Result<Snapshot> {
        let snapshots = self.for_each_backend(|manager| manager.close())?;
        Ok(Self::merge(snapshots))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::JournalSnapshotManager;
    use std::sync::Arc;
    use tidemark_core::testing::TestStep;
    use tidemark_core::{ResourceState, StepOp, Urn};
    use tidemark_journal::MemoryPersister;

    fn res(project: &str, name: &str) -> Arc<ResourceState> {
        Arc::new(ResourceState::new(Urn::new(
            "unified", project, "t:m:T", name,
        )))
    }

    fn routing_pair() -> RoutingSnapshotManager {
        let mut backends: BTreeMap<String, Box<dyn SnapshotManager>> = BTreeMap::new();
        backends.insert(
            "org/api/prod".to_string(),
            Box::new(JournalSnapshotManager::new(
                Snapshot::from_resources(vec![]),
                Box::new(MemoryPersister::new()),
            )),
        );
        backends.insert(
            "org/web/prod".to_string(),
            Box::new(JournalSnapshotManager::new(
                Snapshot::from_resources(vec![]),
                Box::new(MemoryPersister::new()),
            )),
        );

        let mut routes = HashMap::new();
        routes.insert("api".to_string(), "org/api/prod".to_string());
        routes.insert("web".to_string(), "org/web/prod".to_string());

        RoutingSnapshotManager::new(backends, routes)
    }

    fn run(manager: &RoutingSnapshotManager, step: &TestStep) {
        let mutation = manager.begin_mutation(step).unwrap();
        mutation.end(step, true).unwrap();
    }

    #[test]
    fn test_routes_by_project() {
        let routing = routing_pair();
        run(
            &routing,
            &TestStep::for_new(StepOp::Create, res("api", "db")),
        );
        run(
            &routing,
            &TestStep::for_new(StepOp::Create, res("web", "cdn")),
        );
        run(
            &routing,
            &TestStep::for_new(StepOp::Create, res("api", "queue")),
        );

        let merged = routing.close().unwrap();
        let names: Vec<&str> = merged.resources.iter().map(|r| r.urn.name()).collect();
        // Backends merge in sorted backend-stack order: api stack, then web
        assert_eq!(names, ["db", "queue", "cdn"]);
    }

    #[test]
    fn test_unmapped_project_is_an_error() {
        let routing = routing_pair();
        let step = TestStep::for_new(StepOp::Create, res("billing", "db"));
        assert!(matches!(
            routing.begin_mutation(&step),
            Err(ManagerError::UnroutableProject { project }) if project == "billing"
        ));
    }

    #[test]
    fn test_route_to_missing_backend_is_an_error() {
        let mut routing = routing_pair();
        routing
            .routes
            .insert("orphan".to_string(), "org/missing/prod".to_string());
        let step = TestStep::for_new(StepOp::Create, res("orphan", "db"));
        assert!(matches!(
            routing.begin_mutation(&step),
            Err(ManagerError::UnknownBackend { stack }) if stack == "org/missing/prod"
        ));
    }

    #[test]
    fn test_outputs_route_like_mutations() {
        let routing = routing_pair();
        let created = res("api", "db");
        run(&routing, &TestStep::for_new(StepOp::Create, created.clone()));

        let mut changed = (*created).clone();
        changed
            .outputs
            .insert("endpoint".to_string(), serde_json::json!("https://db"));
        let step = TestStep::for_new(StepOp::Same, Arc::new(changed)).with_old(created);
        routing.register_resource_outputs(&step).unwrap();

        let merged = routing.close().unwrap();
        assert_eq!(merged.resources.len(), 1);
        assert_eq!(
            merged.resources[0].outputs["endpoint"],
            serde_json::json!("https://db")
        );
    }
}
