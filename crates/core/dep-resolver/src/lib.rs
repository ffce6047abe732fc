//! Demand-driven dependency resolution.
//!
//! Given a demanded item and a session, the resolver walks the registry's
//! producing-pipeline declarations backwards, computes transitive
//! provenance fingerprints, prunes against the cache, and deduplicates
//! units of work into a topologically ordered [`JobGraph`] ready for
//! dispatch.

pub mod error;
pub mod job;
pub mod resolver;

pub use self::{
    error::{CycleError, FrequencyMismatchError, OverrideError, ResolveError},
    job::{
        Job, JobGraph, JobId, JobOutput, JobStatus, RequestedOutput, ResolvedInput, SkipReason,
    },
    resolver::{Demand, Overrides, Resolver},
};
