//! The declarative data specification of a study.
//!
//! A study declares, once, the complete schema of its data: which items are
//! acquired from the repository, which are derived by pipelines, at what
//! aggregation frequency each item lives, plus the parameters and switches
//! that configure processing. The [`Registry`] is the immutable,
//! declaration-ordered record of those specs; everything downstream (the
//! pipeline builder, the resolver, the cache) consults it but never mutates
//! it.

pub mod data_spec;
pub mod error;
pub mod param_spec;
pub mod registry;
pub mod switch_spec;

pub use self::{
    data_spec::{DataKind, DataSpec, ValueKind},
    error::{RegistryBuildError, SwitchDomainError, UnknownItemError},
    param_spec::ParamSpec,
    registry::Registry,
    switch_spec::{SwitchDomain, SwitchSpec},
};
