use super::test_helpers::*;
use super::*;
use crate::error::Error;
use crate::types::{AnnotationTable, Event, Source};
use std::path::{Path, PathBuf};
use tempfile::tempdir;
