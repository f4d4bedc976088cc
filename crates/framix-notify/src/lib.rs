//! Outcome notifications.
//!
//! Email delivery is an external collaborator: the pipeline fires a message
//! and moves on, logging failures without ever propagating them. The
//! [`Notifier`] trait keeps the transport swappable — an HTTP mail relay in
//! production, a recording double in tests.

pub mod error;
pub mod notifier;

pub use error::{NotifyError, NotifyResult};
pub use notifier::{HttpNotifier, LogNotifier, Notifier, RecordingNotifier, SentMessage};
