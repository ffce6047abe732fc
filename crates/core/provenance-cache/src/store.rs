//! The cache store trait.

use async_trait::async_trait;
use study_common::{Fingerprint, ItemName, ScopeKey};

use crate::{
    entry::{CacheEntry, StoredResult},
    error::CacheError,
};

/// A parameter-addressed cache of materialized results.
///
/// Both operations are idempotent. `commit` with an entry already present
/// and an equal result is a no-op, tolerating concurrent duplicate
/// completions; an unequal result under the same key is
/// [`CacheError::Inconsistent`].
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Looks up the materialized result for one provenance state.
    async fn lookup(
        &self,
        item: &ItemName,
        scope: &ScopeKey,
        fingerprint: &Fingerprint,
    ) -> Result<Option<StoredResult>, CacheError>;

    /// Commits a materialized result.
    async fn commit(
        &self,
        item: &ItemName,
        scope: &ScopeKey,
        fingerprint: &Fingerprint,
        result: StoredResult,
    ) -> Result<(), CacheError>;

    /// Registers an in-flight claim on one provenance state, so concurrent
    /// executors race on the claim instead of duplicating work.
    ///
    /// Returns `true` when the claim was acquired. Returns `false` when
    /// another holder already claimed the key or a result is already
    /// committed under it.
    async fn claim(
        &self,
        item: &ItemName,
        scope: &ScopeKey,
        fingerprint: &Fingerprint,
    ) -> Result<bool, CacheError>;

    /// Releases a claim without committing.
    ///
    /// Releasing an unclaimed key is a no-op; committed entries are
    /// unaffected. `commit` clears the claim itself.
    async fn release(
        &self,
        item: &ItemName,
        scope: &ScopeKey,
        fingerprint: &Fingerprint,
    ) -> Result<(), CacheError>;

    /// All committed entries for an item, across scopes and fingerprints.
    ///
    /// Provenance inspection; order is backend-defined but deterministic.
    async fn history(&self, item: &ItemName) -> Result<Vec<CacheEntry>, CacheError>;
}
