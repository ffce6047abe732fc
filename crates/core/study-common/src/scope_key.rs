//! Concrete cache-partitioning keys derived from a [`Frequency`].
//!
//! [`Frequency`]: crate::Frequency

use crate::{SubjectId, VisitId};

/// The concrete (subject, visit) projection of an item's frequency.
///
/// Two jobs with an identical scope key and fingerprint are the same unit
/// of work and are deduplicated by the resolver.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(tag = "scope", rename_all = "kebab-case")]
pub enum ScopeKey {
    /// One slot per (subject, visit) session.
    Session { subject: SubjectId, visit: VisitId },
    /// One slot per visit.
    Visit { visit: VisitId },
    /// One slot per subject.
    Subject { subject: SubjectId },
    /// A single study-wide slot.
    Study,
}

impl ScopeKey {
    /// Returns the subject component, if this scope has one.
    pub fn subject(&self) -> Option<&SubjectId> {
        match self {
            ScopeKey::Session { subject, .. } | ScopeKey::Subject { subject } => Some(subject),
            _ => None,
        }
    }

    /// Returns the visit component, if this scope has one.
    pub fn visit(&self) -> Option<&VisitId> {
        match self {
            ScopeKey::Session { visit, .. } | ScopeKey::Visit { visit } => Some(visit),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeKey::Session { subject, visit } => write!(f, "{subject}/{visit}"),
            ScopeKey::Visit { visit } => write!(f, "{visit}"),
            ScopeKey::Subject { subject } => write!(f, "{subject}"),
            ScopeKey::Study => f.write_str("__study__"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ScopeKey;

    #[test]
    fn study_scope_is_a_single_slot() {
        //* Given
        // Two requests for a per-study item from different subjects both
        // project onto the same key.
        let a = ScopeKey::Study;
        let b = ScopeKey::Study;

        //* Then
        assert_eq!(a, b);
    }

    #[test]
    fn serde_roundtrip() {
        //* Given
        let key = ScopeKey::Session {
            subject: "PILOT1".parse().expect("valid subject"),
            visit: "SECOND".parse().expect("valid visit"),
        };

        //* When
        let json = serde_json::to_string(&key).expect("serialize");
        let back: ScopeKey = serde_json::from_str(&json).expect("deserialize");

        //* Then
        assert_eq!(back, key);
    }
}
