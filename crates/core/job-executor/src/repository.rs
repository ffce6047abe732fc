//! The data repository adapter.
//!
//! Acquired items come out of a repository; final derived results are
//! written back into it. The engine only ever goes through this trait, so
//! repository structure stays an external concern.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use provenance_cache::StoredResult;
use regex::Regex;
use study_common::{FormatName, ItemName, ParamValue, ScopeKey};

/// Errors raised by repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("no repository entry for '{item}' at scope {scope}")]
    NotFound { item: ItemName, scope: ScopeKey },

    #[error("no repository entry matching /{pattern}/ at scope {scope}")]
    PatternNotFound { pattern: String, scope: ScopeKey },

    #[error(
        "pattern /{pattern}/ matches {count} entries at scope {scope}; exactly one is required"
    )]
    AmbiguousMatch {
        pattern: String,
        scope: ScopeKey,
        count: usize,
    },

    #[error("repository I/O error at {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed repository entry at {context}")]
    Corrupt {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Read/write access to the study's data repository.
#[async_trait]
pub trait RepositoryAdapter: Send + Sync {
    /// Fetches an item's stored value by name.
    async fn fetch(&self, item: &ItemName, scope: &ScopeKey)
    -> Result<StoredResult, RepositoryError>;

    /// Writes an item's value into the repository.
    async fn store(
        &self,
        item: &ItemName,
        scope: &ScopeKey,
        result: &StoredResult,
    ) -> Result<(), RepositoryError>;

    /// Finds the single entry whose file name matches `pattern`.
    ///
    /// Acquired items can be bound by pattern instead of by name; exactly
    /// one match is required.
    async fn list_matching(
        &self,
        scope: &ScopeKey,
        pattern: &Regex,
        format: &FormatName,
    ) -> Result<StoredResult, RepositoryError>;
}

/// A plain-filesystem repository.
///
/// Layout: per-session entries under `<root>/<subject>/<visit>/`,
/// per-subject under `<root>/<subject>/__subject__/`, per-visit under
/// `<root>/__visit__/<visit>/`, per-study under `<root>/__study__/`.
/// Filesets are entries named `<item>.<format>`; scalar fields live in a
/// `__fields__.json` document per scope directory.
#[derive(Debug, Clone)]
pub struct DirectoryRepository {
    root: PathBuf,
}

const FIELDS_FILE: &str = "__fields__.json";

impl DirectoryRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The directory holding entries for one scope.
    pub fn scope_dir(&self, scope: &ScopeKey) -> PathBuf {
        match scope {
            ScopeKey::Session { subject, visit } => {
                self.root.join(subject.as_str()).join(visit.as_str())
            }
            ScopeKey::Subject { subject } => self.root.join(subject.as_str()).join("__subject__"),
            ScopeKey::Visit { visit } => self.root.join("__visit__").join(visit.as_str()),
            ScopeKey::Study => self.root.join("__study__"),
        }
    }

    async fn read_fields(
        &self,
        dir: &Path,
    ) -> Result<BTreeMap<String, ParamValue>, RepositoryError> {
        let path = dir.join(FIELDS_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| RepositoryError::Corrupt {
                context: path.display().to_string(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(source) => Err(RepositoryError::Io {
                context: path.display().to_string(),
                source,
            }),
        }
    }

    async fn write_fields(
        &self,
        dir: &Path,
        fields: &BTreeMap<String, ParamValue>,
    ) -> Result<(), RepositoryError> {
        let path = dir.join(FIELDS_FILE);
        let json = serde_json::to_vec_pretty(fields).map_err(|source| RepositoryError::Corrupt {
            context: path.display().to_string(),
            source,
        })?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|source| RepositoryError::Io {
                context: path.display().to_string(),
                source,
            })
    }

    async fn dir_entries(&self, dir: &Path) -> Result<Vec<String>, RepositoryError> {
        let mut names = Vec::new();
        let mut listing = match tokio::fs::read_dir(dir).await {
            Ok(listing) => listing,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(source) => {
                return Err(RepositoryError::Io {
                    context: dir.display().to_string(),
                    source,
                });
            }
        };
        while let Some(entry) = listing
            .next_entry()
            .await
            .map_err(|source| RepositoryError::Io {
                context: dir.display().to_string(),
                source,
            })?
        {
            if let Some(name) = entry.file_name().to_str() {
                if name != FIELDS_FILE {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl RepositoryAdapter for DirectoryRepository {
    #[tracing::instrument(skip(self), err)]
    async fn fetch(
        &self,
        item: &ItemName,
        scope: &ScopeKey,
    ) -> Result<StoredResult, RepositoryError> {
        let dir = self.scope_dir(scope);

        // Fileset entries are named <item>.<format>
        for name in self.dir_entries(&dir).await? {
            let Some((stem, ext)) = name.rsplit_once('.') else {
                continue;
            };
            if stem == item.as_str() {
                if let Ok(format) = ext.parse::<FormatName>() {
                    return Ok(StoredResult::fileset(dir.join(&name), format));
                }
            }
        }

        let fields = self.read_fields(&dir).await?;
        if let Some(value) = fields.get(item.as_str()) {
            return Ok(StoredResult::field(value.clone()));
        }

        Err(RepositoryError::NotFound {
            item: item.clone(),
            scope: scope.clone(),
        })
    }

    #[tracing::instrument(skip(self, result), err)]
    async fn store(
        &self,
        item: &ItemName,
        scope: &ScopeKey,
        result: &StoredResult,
    ) -> Result<(), RepositoryError> {
        let dir = self.scope_dir(scope);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| RepositoryError::Io {
                context: dir.display().to_string(),
                source,
            })?;

        match result {
            StoredResult::Fileset { path, format } => {
                let dest = dir.join(format!("{item}.{format}"));
                tokio::fs::copy(path, &dest)
                    .await
                    .map_err(|source| RepositoryError::Io {
                        context: dest.display().to_string(),
                        source,
                    })?;
            }
            StoredResult::Field { value } => {
                let mut fields = self.read_fields(&dir).await?;
                fields.insert(item.to_string(), value.clone());
                self.write_fields(&dir, &fields).await?;
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, pattern), fields(pattern = pattern.as_str()), err)]
    async fn list_matching(
        &self,
        scope: &ScopeKey,
        pattern: &Regex,
        format: &FormatName,
    ) -> Result<StoredResult, RepositoryError> {
        let dir = self.scope_dir(scope);
        let matches: Vec<String> = self
            .dir_entries(&dir)
            .await?
            .into_iter()
            .filter(|name| pattern.is_match(name))
            .collect();

        match matches.as_slice() {
            [] => Err(RepositoryError::PatternNotFound {
                pattern: pattern.as_str().to_string(),
                scope: scope.clone(),
            }),
            [name] => Ok(StoredResult::fileset(dir.join(name), format.clone())),
            many => Err(RepositoryError::AmbiguousMatch {
                pattern: pattern.as_str().to_string(),
                scope: scope.clone(),
                count: many.len(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use provenance_cache::StoredResult;
    use regex::Regex;
    use study_common::{ItemName, ScopeKey};

    use super::{DirectoryRepository, RepositoryAdapter, RepositoryError};

    fn item(name: &str) -> ItemName {
        name.parse().expect("valid name")
    }

    fn session() -> ScopeKey {
        ScopeKey::Session {
            subject: "PILOT1".parse().expect("valid subject"),
            visit: "FIRST".parse().expect("valid visit"),
        }
    }

    async fn seed(repo: &DirectoryRepository, scope: &ScopeKey, name: &str, content: &str) {
        let dir = repo.scope_dir(scope);
        tokio::fs::create_dir_all(&dir).await.expect("create dirs");
        tokio::fs::write(dir.join(name), content)
            .await
            .expect("write entry");
    }

    #[tokio::test]
    async fn fetch_finds_filesets_by_name_and_format() {
        //* Given
        let root = tempfile::tempdir().expect("tempdir");
        let repo = DirectoryRepository::new(root.path());
        seed(&repo, &session(), "acquired_file1.text", "zero\n").await;

        //* When
        let result = repo
            .fetch(&item("acquired_file1"), &session())
            .await
            .expect("fetch succeeds");

        //* Then
        let (path, format) = result.as_fileset().expect("fileset result");
        assert!(path.ends_with("acquired_file1.text"));
        assert_eq!(format.as_str(), "text");
    }

    #[tokio::test]
    async fn field_store_and_fetch_roundtrip() {
        //* Given
        let root = tempfile::tempdir().expect("tempdir");
        let repo = DirectoryRepository::new(root.path());

        //* When
        repo.store(
            &item("derived_field1"),
            &ScopeKey::Study,
            &StoredResult::field(42i64),
        )
        .await
        .expect("store succeeds");

        //* Then
        let result = repo
            .fetch(&item("derived_field1"), &ScopeKey::Study)
            .await
            .expect("fetch succeeds");
        assert_eq!(result, StoredResult::field(42i64));
    }

    #[tokio::test]
    async fn missing_item_is_not_found() {
        //* Given
        let root = tempfile::tempdir().expect("tempdir");
        let repo = DirectoryRepository::new(root.path());

        //* When
        let err = repo
            .fetch(&item("acquired_file1"), &session())
            .await
            .expect_err("fetch must fail");

        //* Then
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn pattern_binding_requires_exactly_one_match() {
        //* Given
        let root = tempfile::tempdir().expect("tempdir");
        let repo = DirectoryRepository::new(root.path());
        seed(&repo, &session(), "scan_042_magnitude.text", "a\n").await;
        seed(&repo, &session(), "scan_042_phase.text", "b\n").await;
        let format = "text".parse().expect("valid format");

        //* When / Then
        let one = repo
            .list_matching(
                &session(),
                &Regex::new(r"magnitude").expect("valid regex"),
                &format,
            )
            .await
            .expect("single match");
        let (path, _) = one.as_fileset().expect("fileset result");
        assert!(path.ends_with("scan_042_magnitude.text"));

        let none = repo
            .list_matching(
                &session(),
                &Regex::new(r"missing").expect("valid regex"),
                &format,
            )
            .await;
        assert!(matches!(none, Err(RepositoryError::PatternNotFound { .. })));

        let many = repo
            .list_matching(
                &session(),
                &Regex::new(r"scan_042").expect("valid regex"),
                &format,
            )
            .await;
        assert!(matches!(
            many,
            Err(RepositoryError::AmbiguousMatch { count: 2, .. })
        ));
    }

    #[tokio::test]
    async fn scope_directories_follow_the_declared_layout() {
        //* Given
        let repo = DirectoryRepository::new("/data/study");

        //* Then
        assert_eq!(
            repo.scope_dir(&session()),
            std::path::Path::new("/data/study/PILOT1/FIRST")
        );
        assert_eq!(
            repo.scope_dir(&ScopeKey::Subject {
                subject: "PILOT1".parse().expect("valid subject"),
            }),
            std::path::Path::new("/data/study/PILOT1/__subject__")
        );
        assert_eq!(
            repo.scope_dir(&ScopeKey::Visit {
                visit: "FIRST".parse().expect("valid visit"),
            }),
            std::path::Path::new("/data/study/__visit__/FIRST")
        );
        assert_eq!(
            repo.scope_dir(&ScopeKey::Study),
            std::path::Path::new("/data/study/__study__")
        );
    }
}
