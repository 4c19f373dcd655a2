//! Write elision
//!
//! A same-step that changes nothing user-visible does not need to trigger a
//! checkpoint. `must_write` is the predicate deciding that: it compares
//! every field that affects the persisted view, treats dependency lists as
//! order-insensitive, and ignores pure metadata (source position, init
//! errors).

use tidemark_core::ResourceState;

/// True when replacing `old` with `new` changes the persisted view and a
/// checkpoint must therefore be written.
///
/// # Panics
///
/// A same-step may not change the delete marker, the external marker, or
/// the physical ID; a mismatch is a programmer error and panics.
pub fn must_write(old: &ResourceState, new: &ResourceState) -> bool {
    assert_eq!(
        old.delete, new.delete,
        "same-step changed the delete marker for {}",
        old.urn
    );
    assert_eq!(
        old.external, new.external,
        "same-step changed the external marker for {}",
        old.urn
    );
    assert_eq!(
        old.id, new.id,
        "same-step changed the physical ID for {}",
        old.urn
    );

    old.urn != new.urn
        || old.type_token != new.type_token
        || old.custom != new.custom
        || old.custom_timeouts != new.custom_timeouts
        || old.retain_on_delete != new.retain_on_delete
        || old.provider != new.provider
        || old.parent != new.parent
        || old.deleted_with != new.deleted_with
        || old.protect != new.protect
        || old.replace_with != new.replace_with
        || old.property_dependencies != new.property_dependencies
        || old.hooks != new.hooks
        || old.inputs != new.inputs
        || old.outputs != new.outputs
        || old.sorted_dependencies() != new.sorted_dependencies()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tidemark_core::Urn;

    fn urn(name: &str) -> Urn {
        Urn::new("s", "p", "t:m:T", name)
    }

    fn base_state() -> ResourceState {
        let mut state = ResourceState::new(urn("a"));
        state.id = Some("id-1".to_string());
        state.inputs.insert("k".to_string(), json!(1));
        state.outputs.insert("k".to_string(), json!(1));
        state
    }

    #[test]
    fn test_identical_states_elide() {
        let old = base_state();
        let new = old.clone();
        assert!(!must_write(&old, &new));
    }

    #[test]
    fn test_changed_inputs_force_write() {
        let old = base_state();
        let mut new = old.clone();
        new.inputs.insert("k".to_string(), json!(2));
        assert!(must_write(&old, &new));
    }

    #[test]
    fn test_changed_outputs_force_write() {
        let old = base_state();
        let mut new = old.clone();
        new.outputs.insert("extra".to_string(), json!(true));
        assert!(must_write(&old, &new));
    }

    #[test]
    fn test_changed_protect_forces_write() {
        let old = base_state();
        let mut new = old.clone();
        new.protect = true;
        assert!(must_write(&old, &new));
    }

    #[test]
    fn test_changed_provider_forces_write() {
        let old = base_state();
        let mut new = old.clone();
        new.provider = Some("prov::v2".to_string());
        assert!(must_write(&old, &new));
    }

    #[test]
    fn test_dependency_order_does_not_force_write() {
        let mut old = base_state();
        old.dependencies = vec![urn("x"), urn("y")];
        let mut new = old.clone();
        new.dependencies = vec![urn("y"), urn("x")];
        assert!(!must_write(&old, &new));
    }

    #[test]
    fn test_dependency_set_change_forces_write() {
        let mut old = base_state();
        old.dependencies = vec![urn("x")];
        let mut new = old.clone();
        new.dependencies = vec![urn("x"), urn("y")];
        assert!(must_write(&old, &new));
    }

    #[test]
    fn test_metadata_does_not_force_write() {
        let old = base_state();
        let mut new = old.clone();
        new.source_position = Some("main.ts:12".to_string());
        new.init_errors = vec!["transient".to_string()];
        assert!(!must_write(&old, &new));
    }

    #[test]
    #[should_panic(expected = "changed the physical ID")]
    fn test_changed_id_panics() {
        let old = base_state();
        let mut new = old.clone();
        new.id = Some("id-2".to_string());
        must_write(&old, &new);
    }

    #[test]
    #[should_panic(expected = "changed the delete marker")]
    fn test_changed_delete_marker_panics() {
        let old = base_state();
        let mut new = old.clone();
        new.delete = true;
        must_write(&old, &new);
    }

    #[test]
    #[should_panic(expected = "changed the external marker")]
    fn test_changed_external_marker_panics() {
        let old = base_state();
        let mut new = old.clone();
        new.external = true;
        must_write(&old, &new);
    }
}
