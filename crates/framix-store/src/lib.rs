//! Video status store abstraction.
//!
//! The pipeline treats persistence as an external collaborator behind the
//! [`StatusStore`] trait. The in-memory implementation backs tests and
//! single-process deployments; durable backends implement the same trait.

pub mod error;
pub mod memory;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStatusStore;
pub use store::StatusStore;
