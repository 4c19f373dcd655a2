//! Snapshot managers for Tidemark
//!
//! The manager layer sits between the deployment engine and the journal:
//!
//! - [`JournalSnapshotManager`]: maps each engine step onto a Begin/End
//!   entry pair, tracks new-resource ownership by allocation identity, and
//!   decides write elision
//! - [`CombinedSnapshotManager`]: fans every operation out to several child
//!   managers with per-child error isolation
//! - [`RoutingSnapshotManager`]: dispatches each step to the backend stack
//!   that owns the step's project
//!
//! Managers emit journal entries only; rendering events for a UI is a
//! separate concern layered on by the embedder.

#![warn(clippy::all)]

pub mod combined;
pub mod elide;
pub mod error;
pub mod manager;
pub mod routing;
pub mod traits;

pub use combined::CombinedSnapshotManager;
pub use elide::must_write;
pub use error::{ManagerError, Result};
pub use manager::JournalSnapshotManager;
pub use routing::RoutingSnapshotManager;
pub use traits::{Mutation, NoopMutation, SnapshotManager};
