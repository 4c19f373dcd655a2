//! End-to-end plan scenarios driven through the public API: a manager over
//! a base snapshot, scripted steps, and assertions on both the journal and
//! the reconstructed snapshot.

use std::sync::Arc;
use tidemark::{
    CombinedSnapshotManager, EntryKind, JournalSnapshotManager, MemoryPersister, OperationKind,
    ResourceState, Snapshot, SnapshotManager, StepOp, Urn,
};
use tidemark_core::testing::TestStep;

fn urn(name: &str) -> Urn {
    Urn::new("prod", "website", "aws:s3:Bucket", name)
}

fn resource(name: &str) -> Arc<ResourceState> {
    Arc::new(ResourceState::new(urn(name)))
}

fn resource_with_output(name: &str, key: &str, value: i64) -> Arc<ResourceState> {
    let mut state = ResourceState::new(urn(name));
    state
        .outputs
        .insert(key.to_string(), serde_json::json!(value));
    Arc::new(state)
}

fn manager_over(base: Vec<Arc<ResourceState>>) -> JournalSnapshotManager {
    JournalSnapshotManager::new(
        Snapshot::from_resources(base),
        Box::new(MemoryPersister::new()),
    )
}

fn run(manager: &dyn SnapshotManager, step: &TestStep, successful: bool) {
    let mutation = manager.begin_mutation(step).unwrap();
    mutation.end(step, successful).unwrap();
}

#[test]
fn same_with_equal_outputs_elides() {
    let old = resource_with_output("u1", "k", 1);
    let manager = manager_over(vec![old.clone()]);

    let new = Arc::new((*old).clone());
    let step = TestStep::for_new(StepOp::Same, new).with_old(old);
    run(&manager, &step, true);

    let entries = manager.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].kind, EntryKind::Begin);
    assert_eq!(entries[0].operation_id, 1);
    assert!(entries[0].elide_write);
    assert_eq!(entries[1].kind, EntryKind::Success);
    assert_eq!(entries[1].operation_id, 1);
    assert!(entries[1].elide_write);
    assert!(entries[1].state.is_some());
    assert_eq!(entries[1].delete_old, Some(0));

    let base = Snapshot::from_resources(vec![resource_with_output("u1", "k", 1)]);
    let rebuilt = manager.close().unwrap();
    assert_eq!(rebuilt.resources, base.resources);
}

#[test]
fn update_replaces_in_place() {
    let old = resource_with_output("u1", "v", 1);
    let manager = manager_over(vec![old.clone()]);

    let new = resource_with_output("u1", "v", 2);
    let step = TestStep::for_new(StepOp::Update, new.clone()).with_old(old);
    run(&manager, &step, true);

    let entries = manager.entries();
    assert_eq!(entries[0].kind, EntryKind::Begin);
    assert_eq!(
        entries[0].operation.as_ref().unwrap().kind,
        OperationKind::Updating
    );
    assert_eq!(entries[1].kind, EntryKind::Success);
    assert_eq!(entries[1].delete_old, Some(0));

    let rebuilt = manager.close().unwrap();
    assert_eq!(rebuilt.resources.len(), 1);
    assert!(Arc::ptr_eq(&rebuilt.resources[0], &new));
}

#[test]
fn create_then_delete_in_same_plan() {
    let manager = manager_over(vec![]);

    let created = resource("u2");
    run(
        &manager,
        &TestStep::for_new(StepOp::Create, created.clone()),
        true,
    );
    run(&manager, &TestStep::for_old(StepOp::Delete, created), true);

    let entries = manager.entries();
    assert_eq!(entries.len(), 4);
    assert_eq!(entries[1].operation_id, 1);
    assert!(entries[1].state.is_some());
    assert_eq!(entries[3].operation_id, 2);
    assert_eq!(entries[3].delete_new, Some(1));
    assert_eq!(entries[3].delete_old, None);

    let rebuilt = manager.close().unwrap();
    assert!(rebuilt.resources.is_empty());
    assert!(rebuilt.pending_operations.is_empty());
}

#[test]
fn persisted_refresh_appends_at_end() {
    let u1 = resource("u1");
    let u2 = resource("u2");
    let manager = manager_over(vec![u1.clone(), u2]);

    let refreshed = resource_with_output("u1", "drifted", 1);
    let step = TestStep::for_new(StepOp::Refresh, refreshed.clone())
        .with_old(u1)
        .with_persisted(true);
    run(&manager, &step, true);

    let entries = manager.entries();
    assert_eq!(entries[1].kind, EntryKind::Success);
    assert!(entries[1].is_refresh);
    assert_eq!(entries[1].delete_old, Some(0));

    let rebuilt = manager.close().unwrap();
    let names: Vec<&str> = rebuilt.resources.iter().map(|r| r.urn.name()).collect();
    // Deleted and appended, not updated in place
    assert_eq!(names, ["u2", "u1"]);
    assert!(Arc::ptr_eq(rebuilt.resources.last().unwrap(), &refreshed));
}

#[test]
fn failed_create_surfaces_pending_operation() {
    let manager = manager_over(vec![]);

    let doomed = resource("u3");
    run(
        &manager,
        &TestStep::for_new(StepOp::Create, doomed.clone()),
        false,
    );

    let entries = manager.entries();
    assert_eq!(entries[0].kind, EntryKind::Begin);
    assert_eq!(
        entries[0].operation.as_ref().unwrap().kind,
        OperationKind::Creating
    );
    assert_eq!(entries[1].kind, EntryKind::Failure);
    assert!(Arc::ptr_eq(entries[1].state.as_ref().unwrap(), &doomed));

    let rebuilt = manager.close().unwrap();
    assert!(rebuilt.resources.is_empty());
    assert_eq!(rebuilt.pending_operations.len(), 1);
    assert!(Arc::ptr_eq(&rebuilt.pending_operations[0].resource, &doomed));
}

#[test]
fn combined_manager_collects_secondary_errors() {
    struct RejectingManager;

    impl SnapshotManager for RejectingManager {
        fn begin_mutation(
            &self,
            _step: &dyn tidemark::Step,
        ) -> tidemark::Result<Box<dyn tidemark::Mutation>> {
            Err(tidemark::ManagerError::UnknownBackend {
                stack: "remote".to_string(),
            })
        }

        fn register_resource_outputs(&self, _step: &dyn tidemark::Step) -> tidemark::Result<()> {
            Ok(())
        }

        fn write(&self, _base: &Snapshot) -> tidemark::Result<()> {
            Ok(())
        }

        fn rebuilt_base_state(&self) -> tidemark::Result<Snapshot> {
            Ok(Snapshot::empty())
        }

        fn close(&self) -> tidemark::Result<Snapshot> {
            Ok(Snapshot::empty())
        }
    }

    let mut combined = CombinedSnapshotManager::new();
    combined.push(
        Box::new(manager_over(vec![])),
        false,
    );
    combined.push(Box::new(RejectingManager), true);

    let step = TestStep::for_new(StepOp::Create, resource("u4"));
    let mutation = combined.begin_mutation(&step).unwrap();
    mutation.end(&step, true).unwrap();

    let snapshot = combined.close().unwrap();
    assert_eq!(snapshot.resources.len(), 1);

    let errors = combined.take_errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().contains("remote"));
}

#[test]
fn elision_only_plan_never_checkpoints_until_close() {
    let persister = Arc::new(MemoryPersister::new());

    struct Shared(Arc<MemoryPersister>);
    impl tidemark::SnapshotPersister for Shared {
        fn save(&self, snapshot: &Snapshot) -> Result<(), tidemark::PersistError> {
            self.0.save(snapshot)
        }
    }

    let resources: Vec<Arc<ResourceState>> =
        (0..3).map(|i| resource(&format!("u{i}"))).collect();
    let manager = JournalSnapshotManager::new(
        Snapshot::from_resources(resources.clone()),
        Box::new(Shared(persister.clone())),
    );

    for old in &resources {
        let new = Arc::new((**old).clone());
        let step = TestStep::for_new(StepOp::Same, new).with_old(old.clone());
        run(&manager, &step, true);
    }
    assert_eq!(persister.save_count(), 0);

    let rebuilt = manager.close().unwrap();
    assert_eq!(persister.save_count(), 1);
    assert_eq!(rebuilt.resources, resources);
}

#[test]
fn replacement_sequence_swaps_resource() {
    let old = resource("u1");
    let manager = manager_over(vec![old.clone()]);

    // Replace = envelope + create-replacement + delete-replaced
    let replacement = resource_with_output("u1", "generation", 2);
    let envelope = TestStep::new(StepOp::Replace, urn("u1"));
    run(&manager, &envelope, true);

    let create = TestStep::for_new(StepOp::CreateReplacement, replacement.clone())
        .with_old(old.clone());
    run(&manager, &create, true);

    let delete = TestStep::for_old(StepOp::DeleteReplaced, old);
    run(&manager, &delete, true);

    let rebuilt = manager.close().unwrap();
    assert_eq!(rebuilt.resources.len(), 1);
    assert!(Arc::ptr_eq(&rebuilt.resources[0], &replacement));
}

#[test]
fn deferred_replacement_marks_pending() {
    let old = Arc::new(ResourceState::new(urn("u1")).with_pending_replacement(true));
    let manager = manager_over(vec![old.clone()]);

    run(&manager, &TestStep::for_old(StepOp::Delete, old), true);

    let rebuilt = manager.close().unwrap();
    assert_eq!(rebuilt.resources.len(), 1);
    assert!(rebuilt.resources[0].pending_replacement);
}
