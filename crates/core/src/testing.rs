//! Test doubles shared by the workspace's test suites
//!
//! `TestStep` is a fully scripted [`Step`] implementation: tests construct
//! it with exactly the accessors a scenario needs and hand it to a manager.

use crate::state::ResourceState;
use crate::step::{Step, StepOp};
use crate::urn::Urn;
use std::sync::Arc;

/// A scripted step for tests.
#[derive(Debug, Clone)]
pub struct TestStep {
    op: StepOp,
    urn: Urn,
    old: Option<Arc<ResourceState>>,
    new: Option<Arc<ResourceState>>,
    logical: bool,
    skipped_create: bool,
    persisted: bool,
    original: Option<Arc<ResourceState>>,
}

impl TestStep {
    /// Create a step with the given op and URN and no states.
    pub fn new(op: StepOp, urn: Urn) -> Self {
        TestStep {
            op,
            urn,
            old: None,
            new: None,
            logical: true,
            skipped_create: false,
            persisted: false,
            original: None,
        }
    }

    /// Create a step whose URN is taken from its new state.
    pub fn for_new(op: StepOp, new: Arc<ResourceState>) -> Self {
        let urn = new.urn.clone();
        Self::new(op, urn).with_new(new)
    }

    /// Create a step whose URN is taken from its old state.
    pub fn for_old(op: StepOp, old: Arc<ResourceState>) -> Self {
        let urn = old.urn.clone();
        Self::new(op, urn).with_old(old)
    }

    /// Set the old state.
    pub fn with_old(mut self, old: Arc<ResourceState>) -> Self {
        self.old = Some(old);
        self
    }

    /// Set the new state.
    pub fn with_new(mut self, new: Arc<ResourceState>) -> Self {
        self.new = Some(new);
        self
    }

    /// Set the logical flag.
    pub fn with_logical(mut self, logical: bool) -> Self {
        self.logical = logical;
        self
    }

    /// Mark this same-step as a skipped create.
    pub fn with_skipped_create(mut self, skipped: bool) -> Self {
        self.skipped_create = skipped;
        self
    }

    /// Set the persisted flag used by refresh steps.
    pub fn with_persisted(mut self, persisted: bool) -> Self {
        self.persisted = persisted;
        self
    }

    /// Set the original state used by import-replacement steps.
    pub fn with_original(mut self, original: Arc<ResourceState>) -> Self {
        self.original = Some(original);
        self
    }
}

impl Step for TestStep {
    fn op(&self) -> StepOp {
        self.op
    }

    fn urn(&self) -> &Urn {
        &self.urn
    }

    fn old_state(&self) -> Option<&Arc<ResourceState>> {
        self.old.as_ref()
    }

    fn new_state(&self) -> Option<&Arc<ResourceState>> {
        self.new.as_ref()
    }

    fn logical(&self) -> bool {
        self.logical
    }

    fn is_skipped_create(&self) -> bool {
        self.skipped_create
    }

    fn persisted(&self) -> bool {
        self.persisted
    }

    fn original(&self) -> Option<&Arc<ResourceState>> {
        self.original.as_ref()
    }
}
