//! The aggregation frequency model.
//!
//! Every data item in a study is computed and cached at one of four
//! aggregation scopes. The frequency decides how many physical cache slots
//! an item occupies across a study (one per session, per visit, per
//! subject, or one for the whole study) and governs how inputs of differing
//! scope combine inside a pipeline.

use crate::{ScopeKey, SubjectId, VisitId};

/// The aggregation scope at which a data item's value is computed and
/// cached.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Frequency {
    /// One value per (subject, visit) acquisition session.
    PerSession,
    /// One value per visit, aggregated across subjects.
    PerVisit,
    /// One value per subject, aggregated across visits.
    PerSubject,
    /// A single value for the whole study.
    PerStudy,
}

impl Frequency {
    /// Returns whether `self` is coarser than or equal to `other`.
    ///
    /// The coarseness order is partial: per-study is coarser than
    /// everything, per-session is finer than everything, and per-visit /
    /// per-subject are incomparable siblings (each aggregates over a
    /// different axis).
    pub fn is_coarser_or_equal(self, other: Frequency) -> bool {
        use Frequency::*;
        match (self, other) {
            (a, b) if a == b => true,
            (PerStudy, _) => true,
            (_, PerSession) => true,
            _ => false,
        }
    }

    /// Returns whether `self` is strictly coarser than `other`.
    pub fn is_coarser(self, other: Frequency) -> bool {
        self != other && self.is_coarser_or_equal(other)
    }

    /// Projects this frequency onto a concrete [`ScopeKey`] for the given
    /// subject and visit.
    ///
    /// This is the single source of truth for cache partitioning: the
    /// resolver and the cache must agree on it for deduplication to hold.
    pub fn scope_key(self, subject: &SubjectId, visit: &VisitId) -> ScopeKey {
        match self {
            Frequency::PerSession => ScopeKey::Session {
                subject: subject.clone(),
                visit: visit.clone(),
            },
            Frequency::PerVisit => ScopeKey::Visit {
                visit: visit.clone(),
            },
            Frequency::PerSubject => ScopeKey::Subject {
                subject: subject.clone(),
            },
            Frequency::PerStudy => ScopeKey::Study,
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Frequency::PerSession => "per-session",
            Frequency::PerVisit => "per-visit",
            Frequency::PerSubject => "per-subject",
            Frequency::PerStudy => "per-study",
        };
        f.write_str(s)
    }
}
