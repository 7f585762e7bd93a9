//! Handler capture and assertion helpers

use objaverse_dl::{FoundObject, MissingObject, ModifiedObject, ObjectHandlers};
use std::sync::{Arc, Mutex};

/// Records every handler invocation
#[derive(Clone, Default)]
pub struct HandlerLog {
    pub found: Arc<Mutex<Vec<FoundObject>>>,
    pub modified: Arc<Mutex<Vec<ModifiedObject>>>,
    pub missing: Arc<Mutex<Vec<MissingObject>>>,
}

impl HandlerLog {
    pub fn handlers(&self) -> ObjectHandlers {
        let (found, modified, missing) = (
            self.found.clone(),
            self.modified.clone(),
            self.missing.clone(),
        );
        ObjectHandlers::new()
            .on_found(move |o| found.lock().unwrap().push(o.clone()))
            .on_modified(move |o| modified.lock().unwrap().push(o.clone()))
            .on_missing(move |o| missing.lock().unwrap().push(o.clone()))
    }

    pub fn found(&self) -> Vec<FoundObject> {
        self.found.lock().unwrap().clone()
    }

    pub fn modified(&self) -> Vec<ModifiedObject> {
        self.modified.lock().unwrap().clone()
    }

    pub fn missing(&self) -> Vec<MissingObject> {
        self.missing.lock().unwrap().clone()
    }

    /// Total handler invocations
    pub fn total(&self) -> usize {
        self.found().len() + self.modified().len() + self.missing().len()
    }
}

/// Assert that exactly the given file identifiers were reported missing
pub fn assert_missing(log: &HandlerLog, expected: &[&str]) {
    let mut ids: Vec<String> = log
        .missing()
        .into_iter()
        .map(|o| o.file_identifier)
        .collect();
    ids.sort();
    let mut expected: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
    expected.sort();
    assert_eq!(ids, expected, "missing handler invocations");
}
