//! The top-level study surface.
//!
//! Binds a data registry and a pipeline set to one concrete deployment —
//! a directory repository for acquired data, a filesystem provenance
//! cache, a software environment, and a scheduler — as described by a
//! serde-deserializable [`StudyConfig`]. [`Study::data`] demands an item
//! for a session and drives resolution, execution, and caching to a
//! materialized [`StoredResult`].

pub mod config;
pub mod logging;
pub mod study;

pub use self::{
    config::{ConfigError, SchedulerSettings, StudyConfig},
    study::{Study, StudyError},
};

// The demand/result vocabulary, re-exported so callers rarely need the
// lower-level crates directly.
pub use dep_resolver::{Demand, Overrides};
pub use provenance_cache::StoredResult;
