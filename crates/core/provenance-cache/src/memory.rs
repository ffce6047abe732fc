//! In-memory cache store.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use study_common::{Fingerprint, ItemName, ScopeKey};
use tokio::sync::RwLock;

use crate::{
    entry::{CacheEntry, CacheKey, StoredResult},
    error::CacheError,
    store::CacheStore,
};

/// A process-local cache store backed by a `BTreeMap`.
///
/// Used by resolver tests and as the intra-process layer when no
/// persistent store is configured.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    state: RwLock<State>,
}

/// Entries and claims share one lock so a claim check and a commit
/// cannot interleave.
#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<CacheKey, CacheEntry>,
    claims: BTreeSet<CacheKey>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed entries.
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn lookup(
        &self,
        item: &ItemName,
        scope: &ScopeKey,
        fingerprint: &Fingerprint,
    ) -> Result<Option<StoredResult>, CacheError> {
        let key = CacheKey::new(item.clone(), scope.clone(), fingerprint.clone());
        Ok(self
            .state
            .read()
            .await
            .entries
            .get(&key)
            .map(|e| e.result.clone()))
    }

    async fn commit(
        &self,
        item: &ItemName,
        scope: &ScopeKey,
        fingerprint: &Fingerprint,
        result: StoredResult,
    ) -> Result<(), CacheError> {
        let key = CacheKey::new(item.clone(), scope.clone(), fingerprint.clone());
        let mut state = self.state.write().await;

        if let Some(existing) = state.entries.get(&key) {
            if existing.result == result {
                // Idempotent duplicate completion
                return Ok(());
            }
            return Err(CacheError::Inconsistent {
                key,
                existing: Box::new(existing.result.clone()),
                incoming: Box::new(result),
            });
        }

        tracing::debug!(key = %key, "cache commit");
        state.claims.remove(&key);
        state.entries.insert(key.clone(), CacheEntry::new(key, result));
        Ok(())
    }

    async fn claim(
        &self,
        item: &ItemName,
        scope: &ScopeKey,
        fingerprint: &Fingerprint,
    ) -> Result<bool, CacheError> {
        let key = CacheKey::new(item.clone(), scope.clone(), fingerprint.clone());
        let mut state = self.state.write().await;
        if state.entries.contains_key(&key) {
            return Ok(false);
        }
        Ok(state.claims.insert(key))
    }

    async fn release(
        &self,
        item: &ItemName,
        scope: &ScopeKey,
        fingerprint: &Fingerprint,
    ) -> Result<(), CacheError> {
        let key = CacheKey::new(item.clone(), scope.clone(), fingerprint.clone());
        self.state.write().await.claims.remove(&key);
        Ok(())
    }

    async fn history(&self, item: &ItemName) -> Result<Vec<CacheEntry>, CacheError> {
        Ok(self
            .state
            .read()
            .await
            .entries
            .values()
            .filter(|e| &e.key.item == item)
            .cloned()
            .collect())
    }
}
