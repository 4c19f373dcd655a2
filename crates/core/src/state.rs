//! Recorded resource state
//!
//! `ResourceState` is the unit the whole subsystem moves around: the journal
//! records it, the snapshot orders it, and the manager tracks it by
//! allocation identity. A state is immutable once handed to a manager; the
//! engine builds a fresh allocation for every new version of a resource.

use crate::urn::Urn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Property bag for resource inputs and outputs.
///
/// Keys are property names; values are arbitrary JSON. A `BTreeMap` keeps
/// serialization deterministic.
pub type PropertyMap = BTreeMap<String, serde_json::Value>;

/// Per-operation timeout overrides, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomTimeouts {
    /// Timeout for create operations, if overridden.
    pub create: Option<f64>,
    /// Timeout for update operations, if overridden.
    pub update: Option<f64>,
    /// Timeout for delete operations, if overridden.
    pub delete: Option<f64>,
}

impl CustomTimeouts {
    /// True when no override is set.
    pub fn is_empty(&self) -> bool {
        self.create.is_none() && self.update.is_none() && self.delete.is_none()
    }
}

/// The full recorded state of one resource.
///
/// Identity is two-layered: the URN names the resource across plans, while
/// the allocation (`Arc<ResourceState>`) identifies one particular recorded
/// version within a plan. Metadata fields (`source_position`, `init_errors`)
/// never affect correctness decisions such as write elision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Stable resource name.
    pub urn: Urn,

    /// Type token, e.g. `aws:s3:Bucket`.
    pub type_token: String,

    /// True for custom (provider-managed) resources, false for components.
    pub custom: bool,

    /// Provider-assigned physical ID, once known.
    #[serde(default)]
    pub id: Option<String>,

    /// Input properties as declared by the program.
    #[serde(default)]
    pub inputs: PropertyMap,

    /// Output properties as reported by the provider.
    #[serde(default)]
    pub outputs: PropertyMap,

    /// Parent resource, if any.
    #[serde(default)]
    pub parent: Option<Urn>,

    /// Reference to the provider that manages this resource.
    #[serde(default)]
    pub provider: Option<String>,

    /// Resources this resource depends on. Order is not significant.
    #[serde(default)]
    pub dependencies: Vec<Urn>,

    /// Per-property dependency sets.
    #[serde(default)]
    pub property_dependencies: BTreeMap<String, Vec<Urn>>,

    /// When true the resource may not be deleted outside a replacement.
    #[serde(default)]
    pub protect: bool,

    /// When true the physical resource is left behind on delete.
    #[serde(default)]
    pub retain_on_delete: bool,

    /// Resource whose deletion implies this one is gone too.
    #[serde(default)]
    pub deleted_with: Option<Urn>,

    /// Per-operation timeout overrides.
    #[serde(default)]
    pub custom_timeouts: Option<CustomTimeouts>,

    /// Resources that must be replaced together with this one.
    #[serde(default)]
    pub replace_with: Vec<Urn>,

    /// Marked for a replacement that has been deferred.
    #[serde(default)]
    pub pending_replacement: bool,

    /// True when the resource is tracked but not managed (read resources).
    #[serde(default)]
    pub external: bool,

    /// True when this state records the old copy of a replaced resource
    /// that still awaits deletion.
    #[serde(default)]
    pub delete: bool,

    /// Lifecycle hooks, keyed by hook point.
    #[serde(default)]
    pub hooks: BTreeMap<String, Vec<String>>,

    /// Source location that produced this resource. Metadata only.
    #[serde(default)]
    pub source_position: Option<String>,

    /// Errors reported during initialization. Metadata only.
    #[serde(default)]
    pub init_errors: Vec<String>,
}

impl ResourceState {
    /// Create a minimal custom resource state.
    pub fn new(urn: Urn) -> Self {
        let type_token = urn.type_token().to_string();
        ResourceState {
            urn,
            type_token,
            custom: true,
            id: None,
            inputs: PropertyMap::new(),
            outputs: PropertyMap::new(),
            parent: None,
            provider: None,
            dependencies: Vec::new(),
            property_dependencies: BTreeMap::new(),
            protect: false,
            retain_on_delete: false,
            deleted_with: None,
            custom_timeouts: None,
            replace_with: Vec::new(),
            pending_replacement: false,
            external: false,
            delete: false,
            hooks: BTreeMap::new(),
            source_position: None,
            init_errors: Vec::new(),
        }
    }

    /// Set the physical ID.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the input properties.
    pub fn with_inputs(mut self, inputs: PropertyMap) -> Self {
        self.inputs = inputs;
        self
    }

    /// Set the output properties.
    pub fn with_outputs(mut self, outputs: PropertyMap) -> Self {
        self.outputs = outputs;
        self
    }

    /// Set the dependency list.
    pub fn with_dependencies(mut self, dependencies: Vec<Urn>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Mark the resource protected.
    pub fn with_protect(mut self, protect: bool) -> Self {
        self.protect = protect;
        self
    }

    /// Mark the resource pending replacement.
    pub fn with_pending_replacement(mut self, pending: bool) -> Self {
        self.pending_replacement = pending;
        self
    }

    /// Dependencies in sorted order, for order-insensitive comparison.
    pub fn sorted_dependencies(&self) -> Vec<Urn> {
        let mut deps = self.dependencies.clone();
        deps.sort();
        deps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn urn(name: &str) -> Urn {
        Urn::new("stack", "proj", "test:mod:Type", name)
    }

    #[test]
    fn test_new_defaults() {
        let state = ResourceState::new(urn("a"));
        assert_eq!(state.type_token, "test:mod:Type");
        assert!(state.custom);
        assert!(state.id.is_none());
        assert!(!state.protect);
        assert!(!state.pending_replacement);
        assert!(state.dependencies.is_empty());
    }

    #[test]
    fn test_sorted_dependencies_does_not_mutate() {
        let state = ResourceState::new(urn("a"))
            .with_dependencies(vec![urn("c"), urn("b"), urn("a")]);
        let sorted = state.sorted_dependencies();
        assert_eq!(sorted, vec![urn("a"), urn("b"), urn("c")]);
        // Original order preserved
        assert_eq!(state.dependencies, vec![urn("c"), urn("b"), urn("a")]);
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut inputs = PropertyMap::new();
        inputs.insert("size".to_string(), json!(42));
        let state = ResourceState::new(urn("a"))
            .with_id("i-123")
            .with_inputs(inputs)
            .with_protect(true);

        let bytes = serde_json::to_vec(&state).unwrap();
        let back: ResourceState = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(state, back);
    }

    #[test]
    fn test_custom_timeouts_is_empty() {
        assert!(CustomTimeouts::default().is_empty());
        let t = CustomTimeouts {
            create: Some(60.0),
            ..Default::default()
        };
        assert!(!t.is_empty());
    }

    #[test]
    fn test_missing_optional_fields_deserialize() {
        // Old snapshots may omit fields that were added later
        let json = r#"{
            "urn": "urn:tidemark:s::p::t::n",
            "type_token": "t",
            "custom": true
        }"#;
        let state: ResourceState = serde_json::from_str(json).unwrap();
        assert!(state.inputs.is_empty());
        assert!(state.custom_timeouts.is_none());
        assert!(!state.delete);
    }
}
