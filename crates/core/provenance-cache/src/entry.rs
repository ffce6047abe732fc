//! Cache keys, stored results, and provenance entries.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use study_common::{Fingerprint, FormatName, ItemName, ParamValue, ScopeKey};

/// The full address of one provenance state of a data item.
///
/// The fingerprint is part of the key: entries with different fingerprints
/// are different entries, which is what makes the store append-only.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct CacheKey {
    pub item: ItemName,
    pub scope: ScopeKey,
    pub fingerprint: Fingerprint,
}

impl CacheKey {
    pub fn new(item: ItemName, scope: ScopeKey, fingerprint: Fingerprint) -> Self {
        Self {
            item,
            scope,
            fingerprint,
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{}#{}",
            self.item,
            self.scope,
            &self.fingerprint.as_str()[..12]
        )
    }
}

/// A materialized result reference: either a file set on disk or a scalar
/// field value.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum StoredResult {
    /// A file set at a concrete path, in a declared format.
    Fileset { path: PathBuf, format: FormatName },
    /// A scalar field value.
    Field { value: ParamValue },
}

impl StoredResult {
    pub fn fileset(path: impl Into<PathBuf>, format: FormatName) -> Self {
        StoredResult::Fileset {
            path: path.into(),
            format,
        }
    }

    pub fn field(value: impl Into<ParamValue>) -> Self {
        StoredResult::Field {
            value: value.into(),
        }
    }

    /// The on-disk path for fileset results.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            StoredResult::Fileset { path, .. } => Some(path),
            StoredResult::Field { .. } => None,
        }
    }

    pub fn as_fileset(&self) -> Option<(&std::path::Path, &FormatName)> {
        match self {
            StoredResult::Fileset { path, format } => Some((path, format)),
            StoredResult::Field { .. } => None,
        }
    }

    pub fn as_field(&self) -> Option<&ParamValue> {
        match self {
            StoredResult::Field { value } => Some(value),
            StoredResult::Fileset { .. } => None,
        }
    }
}

/// One committed provenance entry.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct CacheEntry {
    #[serde(flatten)]
    pub key: CacheKey,
    pub result: StoredResult,
    /// When the result was committed. Informational; not part of the key.
    pub committed_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: CacheKey, result: StoredResult) -> Self {
        Self {
            key,
            result,
            committed_at: Utc::now(),
        }
    }
}
