//! Common types shared across the study derivation engine.
//!
//! This crate provides the vocabulary the rest of the engine is written in:
//! validated name newtypes, the aggregation [`Frequency`] model and its
//! [`ScopeKey`] projection, provenance [`Fingerprint`]s, and scalar
//! parameter/switch values.

pub mod fingerprint;
pub mod format;
pub mod frequency;
pub mod ids;
pub mod name;
pub mod scope_key;
pub mod value;

pub use self::{
    fingerprint::{Fingerprint, FingerprintBuilder},
    format::FormatName,
    frequency::Frequency,
    ids::{SubjectId, VisitId},
    name::{ItemName, ParamName, PipelineName, SwitchName},
    scope_key::ScopeKey,
    value::{ParamValue, SwitchValue},
};

/// Boxed error type for adapter boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
