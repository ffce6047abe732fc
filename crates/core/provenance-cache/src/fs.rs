//! Filesystem-backed cache store.
//!
//! One JSON document per entry at `<root>/<item>/<scope>/<fingerprint>.json`.
//! Session scopes nest as `<subject>/<visit>`, so an item directory fans out
//! by scope and then by fingerprint, which keeps history a directory walk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use study_common::{Fingerprint, ItemName, ScopeKey};

use crate::{
    entry::{CacheEntry, CacheKey, StoredResult},
    error::CacheError,
    store::CacheStore,
};

#[derive(Debug, Clone)]
pub struct FsCacheStore {
    root: PathBuf,
}

impl FsCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, item: &ItemName, scope: &ScopeKey, fingerprint: &Fingerprint) -> PathBuf {
        self.root
            .join(item.as_str())
            .join(scope.to_string())
            .join(format!("{fingerprint}.json"))
    }

    /// Claim marker next to the entry document. The `.claim` extension keeps
    /// it invisible to the `history` walk, which only reads `.json` files.
    fn claim_path(&self, item: &ItemName, scope: &ScopeKey, fingerprint: &Fingerprint) -> PathBuf {
        self.root
            .join(item.as_str())
            .join(scope.to_string())
            .join(format!("{fingerprint}.claim"))
    }

    async fn read_entry(path: &Path) -> Result<CacheEntry, CacheError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| CacheError::Io {
            context: path.display().to_string(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| CacheError::Corrupt {
            context: path.display().to_string(),
            source,
        })
    }

    async fn write_entry(path: &Path, entry: &CacheEntry) -> Result<(), CacheError> {
        let io_err = |source| CacheError::Io {
            context: path.display().to_string(),
            source,
        };
        let parent = path.parent().unwrap_or(Path::new("."));
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;

        let json = serde_json::to_vec_pretty(entry).map_err(|source| CacheError::Corrupt {
            context: path.display().to_string(),
            source,
        })?;

        // Write-then-rename so a crashed commit never leaves a torn document
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for FsCacheStore {
    #[tracing::instrument(skip(self), err)]
    async fn lookup(
        &self,
        item: &ItemName,
        scope: &ScopeKey,
        fingerprint: &Fingerprint,
    ) -> Result<Option<StoredResult>, CacheError> {
        let path = self.entry_path(item, scope, fingerprint);
        match tokio::fs::try_exists(&path).await {
            Ok(true) => {}
            Ok(false) => return Ok(None),
            Err(source) => {
                return Err(CacheError::Io {
                    context: path.display().to_string(),
                    source,
                });
            }
        }
        let entry = Self::read_entry(&path).await?;
        Ok(Some(entry.result))
    }

    #[tracing::instrument(skip(self, result), err)]
    async fn commit(
        &self,
        item: &ItemName,
        scope: &ScopeKey,
        fingerprint: &Fingerprint,
        result: StoredResult,
    ) -> Result<(), CacheError> {
        let path = self.entry_path(item, scope, fingerprint);
        let key = CacheKey::new(item.clone(), scope.clone(), fingerprint.clone());

        if let Ok(true) = tokio::fs::try_exists(&path).await {
            let existing = Self::read_entry(&path).await?;
            if existing.result == result {
                return Ok(());
            }
            return Err(CacheError::Inconsistent {
                key,
                existing: Box::new(existing.result),
                incoming: Box::new(result),
            });
        }

        tracing::debug!(key = %key, "cache commit");
        Self::write_entry(&path, &CacheEntry::new(key, result)).await?;

        // The entry now shields the key; drop the claim marker.
        let claim = self.claim_path(item, scope, fingerprint);
        match tokio::fs::remove_file(&claim).await {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::Io {
                context: claim.display().to_string(),
                source,
            }),
        }
    }

    #[tracing::instrument(skip(self), err)]
    async fn claim(
        &self,
        item: &ItemName,
        scope: &ScopeKey,
        fingerprint: &Fingerprint,
    ) -> Result<bool, CacheError> {
        let entry = self.entry_path(item, scope, fingerprint);
        match tokio::fs::try_exists(&entry).await {
            Ok(true) => return Ok(false),
            Ok(false) => {}
            Err(source) => {
                return Err(CacheError::Io {
                    context: entry.display().to_string(),
                    source,
                });
            }
        }

        let claim = self.claim_path(item, scope, fingerprint);
        let io_err = |source| CacheError::Io {
            context: claim.display().to_string(),
            source,
        };
        let parent = claim.parent().unwrap_or(Path::new("."));
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;

        // create_new makes acquisition atomic across processes
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&claim)
            .await
        {
            Ok(_) => Ok(true),
            Err(source) if source.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(source) => Err(io_err(source)),
        }
    }

    async fn release(
        &self,
        item: &ItemName,
        scope: &ScopeKey,
        fingerprint: &Fingerprint,
    ) -> Result<(), CacheError> {
        let claim = self.claim_path(item, scope, fingerprint);
        match tokio::fs::remove_file(&claim).await {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::Io {
                context: claim.display().to_string(),
                source,
            }),
        }
    }

    async fn history(&self, item: &ItemName) -> Result<Vec<CacheEntry>, CacheError> {
        let item_dir = self.root.join(item.as_str());
        match tokio::fs::try_exists(&item_dir).await {
            Ok(true) => {}
            Ok(false) => return Ok(Vec::new()),
            Err(source) => {
                return Err(CacheError::Io {
                    context: item_dir.display().to_string(),
                    source,
                });
            }
        }

        let mut entries = Vec::new();
        let mut pending = vec![item_dir];
        while let Some(dir) = pending.pop() {
            let mut listing =
                tokio::fs::read_dir(&dir)
                    .await
                    .map_err(|source| CacheError::Io {
                        context: dir.display().to_string(),
                        source,
                    })?;
            while let Some(dirent) =
                listing.next_entry().await.map_err(|source| CacheError::Io {
                    context: dir.display().to_string(),
                    source,
                })?
            {
                let path = dirent.path();
                let file_type = dirent.file_type().await.map_err(|source| CacheError::Io {
                    context: path.display().to_string(),
                    source,
                })?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if path.extension().is_some_and(|e| e == "json") {
                    entries.push(Self::read_entry(&path).await?);
                }
            }
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use study_common::{Fingerprint, ScopeKey};

    use super::FsCacheStore;
    use crate::{CacheError, CacheStore, StoredResult};

    fn fingerprint(name: &str) -> Fingerprint {
        Fingerprint::for_acquired(
            &name.parse().expect("valid name"),
            &"text".parse().expect("valid format"),
        )
    }

    fn session_scope() -> ScopeKey {
        ScopeKey::Session {
            subject: "PILOT1".parse().expect("valid subject"),
            visit: "SECOND".parse().expect("valid visit"),
        }
    }

    #[tokio::test]
    async fn commit_then_lookup_roundtrip() {
        //* Given
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsCacheStore::new(dir.path());
        let item = "derived_file1".parse().expect("valid name");
        let scope = session_scope();
        let fp = fingerprint("acquired_file1");
        let result = StoredResult::fileset(
            dir.path().join("out.txt"),
            "text".parse().expect("valid format"),
        );

        //* When
        store
            .commit(&item, &scope, &fp, result.clone())
            .await
            .expect("commit succeeds");

        //* Then
        let found = store
            .lookup(&item, &scope, &fp)
            .await
            .expect("lookup succeeds");
        assert_eq!(found, Some(result));
    }

    #[tokio::test]
    async fn lookup_of_absent_entry_is_none() {
        //* Given
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsCacheStore::new(dir.path());
        let item = "derived_file1".parse().expect("valid name");

        //* When
        let found = store
            .lookup(&item, &ScopeKey::Study, &fingerprint("acquired_file1"))
            .await
            .expect("lookup succeeds");

        //* Then
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn duplicate_commit_is_idempotent() {
        //* Given
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsCacheStore::new(dir.path());
        let item = "derived_field1".parse().expect("valid name");
        let fp = fingerprint("acquired_file1");
        let result = StoredResult::field(42i64);

        //* When
        store
            .commit(&item, &ScopeKey::Study, &fp, result.clone())
            .await
            .expect("first commit succeeds");
        store
            .commit(&item, &ScopeKey::Study, &fp, result)
            .await
            .expect("duplicate commit is a no-op");

        //* Then
        let history = store.history(&item).await.expect("history");
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn conflicting_commit_fails_loudly() {
        //* Given
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsCacheStore::new(dir.path());
        let item = "derived_field1".parse().expect("valid name");
        let fp = fingerprint("acquired_file1");

        store
            .commit(&item, &ScopeKey::Study, &fp, StoredResult::field(42i64))
            .await
            .expect("first commit succeeds");

        //* When
        let clash = store
            .commit(&item, &ScopeKey::Study, &fp, StoredResult::field(43i64))
            .await;

        //* Then
        assert!(matches!(clash, Err(CacheError::Inconsistent { .. })));
    }

    #[tokio::test]
    async fn claim_is_exclusive_until_released() {
        //* Given
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsCacheStore::new(dir.path());
        let item: study_common::ItemName = "derived_field1".parse().expect("valid name");
        let fp = fingerprint("acquired_file1");

        //* When
        let first = store.claim(&item, &ScopeKey::Study, &fp).await.expect("claim");
        let second = store.claim(&item, &ScopeKey::Study, &fp).await.expect("claim");

        //* Then
        assert!(first);
        assert!(!second);

        //* When released, the key is claimable again
        store
            .release(&item, &ScopeKey::Study, &fp)
            .await
            .expect("release");
        assert!(store.claim(&item, &ScopeKey::Study, &fp).await.expect("claim"));
    }

    #[tokio::test]
    async fn commit_clears_the_claim_and_hides_it_from_history() {
        //* Given
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsCacheStore::new(dir.path());
        let item: study_common::ItemName = "derived_field1".parse().expect("valid name");
        let fp = fingerprint("acquired_file1");
        assert!(store.claim(&item, &ScopeKey::Study, &fp).await.expect("claim"));

        //* When
        store
            .commit(&item, &ScopeKey::Study, &fp, StoredResult::field(42i64))
            .await
            .expect("commit succeeds");

        //* Then committed keys cannot be claimed again
        assert!(!store.claim(&item, &ScopeKey::Study, &fp).await.expect("claim"));
        let history = store.history(&item).await.expect("history");
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn history_spans_scopes_and_fingerprints() {
        //* Given
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsCacheStore::new(dir.path());
        let item: study_common::ItemName = "derived_field1".parse().expect("valid name");

        //* When
        store
            .commit(
                &item,
                &session_scope(),
                &fingerprint("acquired_file1"),
                StoredResult::field(1i64),
            )
            .await
            .expect("commit session entry");
        store
            .commit(
                &item,
                &ScopeKey::Study,
                &fingerprint("acquired_file2"),
                StoredResult::field(2i64),
            )
            .await
            .expect("commit study entry");

        //* Then
        let history = store.history(&item).await.expect("history");
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|e| e.key.item == item));
    }
}
