//! Caller-supplied lifecycle handlers for found, modified and missing objects
//!
//! Handlers are invoked only on the task that drives a source partition;
//! download workers hand their outcomes over a channel instead of calling them
//! directly. Return values are not consumed, and a panicking handler aborts
//! the partition it was called from.

use crate::types::{DownloadOutcome, FoundObject, MissingObject, ModifiedObject};
use std::sync::Arc;

/// Called when an object downloaded with the expected hash
pub type FoundHandler = Arc<dyn Fn(&FoundObject) + Send + Sync>;
/// Called when an object downloaded with a different hash than recorded
pub type ModifiedHandler = Arc<dyn Fn(&ModifiedObject) + Send + Sync>;
/// Called when an object could not be located at its source
pub type MissingHandler = Arc<dyn Fn(&MissingObject) + Send + Sync>;

/// Set of optional lifecycle handlers
///
/// Absent handlers only suppress the notification; classification is unaffected.
///
/// # Example
///
/// ```
/// use objaverse_dl::ObjectHandlers;
///
/// let handlers = ObjectHandlers::new()
///     .on_found(|obj| println!("found {} at {}", obj.file_identifier, obj.local_path.display()))
///     .on_missing(|obj| eprintln!("missing {}", obj.file_identifier));
/// assert!(handlers.has_found());
/// assert!(!handlers.has_modified());
/// ```
#[derive(Clone, Default)]
pub struct ObjectHandlers {
    found: Option<FoundHandler>,
    modified: Option<ModifiedHandler>,
    missing: Option<MissingHandler>,
}

impl ObjectHandlers {
    /// No handlers
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the found handler
    pub fn on_found(mut self, handler: impl Fn(&FoundObject) + Send + Sync + 'static) -> Self {
        self.found = Some(Arc::new(handler));
        self
    }

    /// Set the modified handler
    pub fn on_modified(
        mut self,
        handler: impl Fn(&ModifiedObject) + Send + Sync + 'static,
    ) -> Self {
        self.modified = Some(Arc::new(handler));
        self
    }

    /// Set the missing handler
    pub fn on_missing(mut self, handler: impl Fn(&MissingObject) + Send + Sync + 'static) -> Self {
        self.missing = Some(Arc::new(handler));
        self
    }

    /// Whether a found handler is set
    pub fn has_found(&self) -> bool {
        self.found.is_some()
    }

    /// Whether a modified handler is set
    pub fn has_modified(&self) -> bool {
        self.modified.is_some()
    }

    /// Whether a missing handler is set
    pub fn has_missing(&self) -> bool {
        self.missing.is_some()
    }

    /// Invoke the handler matching the outcome, if any
    pub fn notify(&self, outcome: &DownloadOutcome) {
        match outcome {
            DownloadOutcome::Found(obj) => {
                if let Some(handler) = &self.found {
                    handler(obj);
                }
            }
            DownloadOutcome::Modified(obj) => {
                if let Some(handler) = &self.modified {
                    handler(obj);
                }
            }
            DownloadOutcome::Missing(obj) => {
                if let Some(handler) = &self.missing {
                    handler(obj);
                }
            }
        }
    }
}

impl std::fmt::Debug for ObjectHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectHandlers")
            .field("found", &self.has_found())
            .field("modified", &self.has_modified())
            .field("missing", &self.has_missing())
            .finish()
    }
}
