//! Core types for objaverse-dl

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Source-specific key/value bag attached to every record
///
/// The dispatcher never looks inside; it is forwarded to the lifecycle handlers.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Mapping of file identifier to the local path of a retained object
///
/// Only Found and Modified objects whose files were kept appear here.
pub type DownloadResultMap = HashMap<String, PathBuf>;

/// One of the fixed remote repositories objects are sourced from
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Code-hosting platform (files pinned to a commit)
    Github,
    /// File-sharing site for printable models
    Thingiverse,
    /// Museum archive (Smithsonian Open Access)
    Smithsonian,
    /// 3D-model marketplace, mirrored as Objaverse 1.0
    Sketchfab,
}

impl Source {
    /// Every supported source, in aggregation order
    pub const ALL: [Source; 4] = [
        Source::Github,
        Source::Thingiverse,
        Source::Smithsonian,
        Source::Sketchfab,
    ];

    /// Sources that publish curated alignment annotations
    pub const ALIGNMENT: [Source; 2] = [Source::Github, Source::Sketchfab];

    /// Lowercase name used in tables, paths and URLs
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Github => "github",
            Source::Thingiverse => "thingiverse",
            Source::Smithsonian => "smithsonian",
            Source::Sketchfab => "sketchfab",
        }
    }

    /// Whether this source is on the alignment allowlist
    pub fn has_alignment_annotations(&self) -> bool {
        Self::ALIGNMENT.contains(self)
    }

    /// Parse a source name, returning `None` for anything outside the fixed set
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }

    /// Names of all supported sources
    pub fn names() -> Vec<String> {
        Self::ALL.iter().map(|s| s.as_str().to_string()).collect()
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Source {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Source::parse(s).ok_or_else(|| Error::InvalidSource {
            invalid: vec![s.to_string()],
            allowed: Source::names(),
        })
    }
}

const CSV_HEADER: [&str; 6] = [
    "fileIdentifier",
    "source",
    "sha256",
    "fileType",
    "license",
    "metadata",
];

/// A row identifying one downloadable object
///
/// `source` is kept as the raw column value so that requests naming an
/// unsupported source can be reported rather than rejected at parse time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRecord {
    /// Unique key of the object within its source
    pub file_identifier: String,

    /// Source name (one of [`Source::ALL`] for valid requests)
    pub source: String,

    /// Expected SHA-256 of the object contents (lowercase hex)
    pub sha256: String,

    /// File type, e.g. "glb" or "stl"
    #[serde(default)]
    pub file_type: String,

    /// License of the object
    #[serde(default)]
    pub license: String,

    /// Source-specific metadata
    #[serde(default, deserialize_with = "deserialize_metadata")]
    pub metadata: Metadata,
}

impl ObjectRecord {
    /// Create a record with empty file type, license and metadata
    pub fn new(
        file_identifier: impl Into<String>,
        source: Source,
        sha256: impl Into<String>,
    ) -> Self {
        Self {
            file_identifier: file_identifier.into(),
            source: source.as_str().to_string(),
            sha256: sha256.into(),
            file_type: String::new(),
            license: String::new(),
            metadata: Metadata::new(),
        }
    }

    /// Parsed source, `None` if the value is not supported
    pub fn parsed_source(&self) -> Option<Source> {
        Source::parse(&self.source)
    }
}

// Annotation mirrors store metadata either as an object or as a JSON-encoded string.
fn deserialize_metadata<'de, D>(deserializer: D) -> std::result::Result<Metadata, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(Metadata::new()),
        serde_json::Value::Object(map) => Ok(map),
        serde_json::Value::String(s) if s.trim().is_empty() => Ok(Metadata::new()),
        serde_json::Value::String(s) => serde_json::from_str(&s).map_err(D::Error::custom),
        other => Err(D::Error::custom(format!(
            "metadata must be an object, got {other}"
        ))),
    }
}

/// Ordered sequence of object records
///
/// Concatenation keeps the order of the inputs and never deduplicates.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationTable {
    rows: Vec<ObjectRecord>,
}

impl AnnotationTable {
    /// Create a table from rows
    pub fn new(rows: Vec<ObjectRecord>) -> Self {
        Self { rows }
    }

    /// Concatenate tables in the given order
    pub fn concat(tables: impl IntoIterator<Item = AnnotationTable>) -> Self {
        let rows = tables.into_iter().flat_map(|t| t.rows).collect();
        Self { rows }
    }

    /// Rows in table order
    pub fn rows(&self) -> &[ObjectRecord] {
        &self.rows
    }

    /// Iterate over rows
    pub fn iter(&self) -> std::slice::Iter<'_, ObjectRecord> {
        self.rows.iter()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row
    pub fn push(&mut self, record: ObjectRecord) {
        self.rows.push(record);
    }

    /// Rows matching the predicate, order preserved
    pub fn filter(&self, mut predicate: impl FnMut(&ObjectRecord) -> bool) -> Self {
        self.rows.iter().filter(|r| predicate(r)).cloned().collect()
    }

    /// First `n` rows
    pub fn head(&self, n: usize) -> Self {
        self.rows.iter().take(n).cloned().collect()
    }

    /// Distinct raw source values present in the table
    pub fn source_values(&self) -> BTreeSet<&str> {
        self.rows.iter().map(|r| r.source.as_str()).collect()
    }

    /// Group rows by source, preserving input order inside each group
    ///
    /// Fails with [`Error::InvalidSource`] naming every unsupported value.
    pub fn partition_by_source(&self) -> Result<BTreeMap<Source, AnnotationTable>> {
        let invalid: Vec<String> = self
            .source_values()
            .into_iter()
            .filter(|s| Source::parse(s).is_none())
            .map(str::to_string)
            .collect();
        if !invalid.is_empty() {
            return Err(Error::InvalidSource {
                invalid,
                allowed: Source::names(),
            });
        }

        let mut partitions: BTreeMap<Source, AnnotationTable> = BTreeMap::new();
        for record in &self.rows {
            if let Some(source) = record.parsed_source() {
                partitions.entry(source).or_default().push(record.clone());
            }
        }
        Ok(partitions)
    }

    /// Parse a JSON Lines table (one record per non-blank line)
    pub fn from_json_lines(content: &str) -> Result<Self> {
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str::<ObjectRecord>(line)
                    .map_err(|e| Error::InvalidTable(format!("line {}: {}", index + 1, e)))
            })
            .collect::<Result<Vec<_>>>()
            .map(Self::new)
    }

    /// Serialize as JSON Lines
    pub fn to_json_lines(&self) -> Result<String> {
        let mut out = String::new();
        for record in &self.rows {
            out.push_str(&serde_json::to_string(record)?);
            out.push('\n');
        }
        Ok(out)
    }

    /// Parse a CSV table with a header row
    ///
    /// Columns are matched by name, so extra columns such as a leading index
    /// are ignored. The `metadata` column holds JSON-encoded objects.
    pub fn from_csv(content: &str) -> Result<Self> {
        csv::Reader::from_reader(content.as_bytes())
            .deserialize::<ObjectRecord>()
            .enumerate()
            .map(|(index, row)| {
                row.map_err(|e| Error::InvalidTable(format!("row {}: {}", index + 1, e)))
            })
            .collect::<Result<Vec<_>>>()
            .map(Self::new)
    }

    /// Serialize as CSV, encoding `metadata` as a JSON string
    pub fn to_csv(&self) -> Result<String> {
        let csv_error = |e: csv::Error| Error::Other(format!("csv: {e}"));

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(CSV_HEADER).map_err(csv_error)?;
        for record in &self.rows {
            let metadata = serde_json::to_string(&record.metadata)?;
            writer
                .write_record([
                    record.file_identifier.as_str(),
                    record.source.as_str(),
                    record.sha256.as_str(),
                    record.file_type.as_str(),
                    record.license.as_str(),
                    metadata.as_str(),
                ])
                .map_err(csv_error)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| Error::Other(format!("csv: {}", e.error())))?;
        String::from_utf8(bytes).map_err(|e| Error::Other(format!("csv: {e}")))
    }

    /// Read a table from disk
    ///
    /// `.json` files hold a JSON array of records and `.csv` files a CSV table;
    /// anything else is read as JSON Lines.
    pub async fn read_from(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
        match extension.as_deref() {
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| Error::InvalidTable(format!("{}: {}", path.display(), e))),
            Some("csv") => Self::from_csv(&content),
            _ => Self::from_json_lines(&content),
        }
    }
}

impl FromIterator<ObjectRecord> for AnnotationTable {
    fn from_iter<I: IntoIterator<Item = ObjectRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for AnnotationTable {
    type Item = ObjectRecord;
    type IntoIter = std::vec::IntoIter<ObjectRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a AnnotationTable {
    type Item = &'a ObjectRecord;
    type IntoIter = std::slice::Iter<'a, ObjectRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Object downloaded with the expected hash
#[derive(Clone, Debug, PartialEq)]
pub struct FoundObject {
    /// Where the downloaded file can be read
    pub local_path: PathBuf,
    /// File identifier of the object
    pub file_identifier: String,
    /// SHA-256 of the contents (equal to the expected hash)
    pub sha256: String,
    /// Source-specific metadata
    pub metadata: Metadata,
}

/// Object downloaded but with contents that drifted from the recorded hash
#[derive(Clone, Debug, PartialEq)]
pub struct ModifiedObject {
    /// Where the downloaded file can be read
    pub local_path: PathBuf,
    /// File identifier of the object
    pub file_identifier: String,
    /// SHA-256 of the downloaded contents
    pub new_sha256: String,
    /// SHA-256 recorded in the annotations
    pub old_sha256: String,
    /// Source-specific metadata
    pub metadata: Metadata,
}

/// Object that could not be located at its source
#[derive(Clone, Debug, PartialEq)]
pub struct MissingObject {
    /// File identifier of the object
    pub file_identifier: String,
    /// SHA-256 recorded in the annotations
    pub sha256: String,
    /// Source-specific metadata
    pub metadata: Metadata,
}

impl MissingObject {
    /// Missing outcome for a record
    pub fn from_record(record: &ObjectRecord) -> Self {
        Self {
            file_identifier: record.file_identifier.clone(),
            sha256: record.sha256.clone(),
            metadata: record.metadata.clone(),
        }
    }
}

/// Result of one download attempt
#[derive(Clone, Debug, PartialEq)]
pub enum DownloadOutcome {
    /// Downloaded, hash matches
    Found(FoundObject),
    /// Downloaded, hash differs
    Modified(ModifiedObject),
    /// Not found at the source
    Missing(MissingObject),
}

impl DownloadOutcome {
    /// Classify a downloaded file by comparing its hash with the record's
    ///
    /// The comparison is exact; computed hashes are lowercase hex, so a record
    /// carrying an uppercase hash classifies as Modified.
    pub fn classify(record: &ObjectRecord, local_path: PathBuf, actual_sha256: String) -> Self {
        if actual_sha256 == record.sha256 {
            DownloadOutcome::Found(FoundObject {
                local_path,
                file_identifier: record.file_identifier.clone(),
                sha256: actual_sha256,
                metadata: record.metadata.clone(),
            })
        } else {
            DownloadOutcome::Modified(ModifiedObject {
                local_path,
                file_identifier: record.file_identifier.clone(),
                new_sha256: actual_sha256,
                old_sha256: record.sha256.clone(),
                metadata: record.metadata.clone(),
            })
        }
    }

    /// File identifier of the object
    pub fn file_identifier(&self) -> &str {
        match self {
            DownloadOutcome::Found(o) => &o.file_identifier,
            DownloadOutcome::Modified(o) => &o.file_identifier,
            DownloadOutcome::Missing(o) => &o.file_identifier,
        }
    }

    /// Local path for Found and Modified outcomes
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            DownloadOutcome::Found(o) => Some(&o.local_path),
            DownloadOutcome::Modified(o) => Some(&o.local_path),
            DownloadOutcome::Missing(_) => None,
        }
    }
}

/// Opaque per-source options forwarded verbatim by the dispatcher
///
/// Each downloader reads the keys it understands, e.g. `save_repo_format` for github.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceOptions(serde_json::Map<String, serde_json::Value>);

impl SourceOptions {
    /// Empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set an option
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Read and decode an option, `None` if absent or null
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.0.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| Error::config(key, e.to_string())),
        }
    }

    /// Whether no options are set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Event emitted by the dispatcher
///
/// Consumers subscribe via `ObjaverseDownloader::subscribe()`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A source partition was handed to its downloader
    PartitionStarted {
        /// Source of the partition
        source: Source,
        /// Number of records in the partition
        objects: usize,
    },

    /// A source partition finished
    PartitionComplete {
        /// Source of the partition
        source: Source,
        /// Number of retained objects the downloader reported
        retained: usize,
    },

    /// A source partition failed; the dispatch call fails with it
    PartitionFailed {
        /// Source of the partition
        source: Source,
        /// Error message
        error: String,
    },
}
