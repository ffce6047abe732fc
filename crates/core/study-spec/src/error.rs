//! Error types for specification construction and lookup.

use study_common::{ItemName, SwitchName, SwitchValue};

use crate::switch_spec::SwitchDomain;

/// Errors raised while building a [`Registry`](crate::Registry).
#[derive(Debug, thiserror::Error)]
pub enum RegistryBuildError {
    /// Two data specs share the same name.
    #[error("duplicate data spec '{0}'")]
    DuplicateDataSpec(ItemName),

    /// Two parameter specs share the same name.
    #[error("duplicate parameter spec '{0}'")]
    DuplicateParamSpec(String),

    /// Two switch specs share the same name.
    #[error("duplicate switch spec '{0}'")]
    DuplicateSwitchSpec(SwitchName),
}

/// A lookup referenced an item the registry does not declare.
#[derive(Debug, thiserror::Error)]
#[error("unknown data item '{0}'")]
pub struct UnknownItemError(pub ItemName);

/// A switch was read or bound outside its declared domain.
#[derive(Debug, thiserror::Error)]
pub enum SwitchDomainError {
    /// The value is of the wrong kind for the domain (boolean vs
    /// enumerated).
    #[error("switch '{switch}' has domain {domain}, got incompatible value '{value}'")]
    KindMismatch {
        switch: SwitchName,
        value: SwitchValue,
        domain: SwitchDomain,
    },

    /// The value is outside the enumerated set.
    #[error("switch '{switch}' has domain {domain}, got '{value}'")]
    OutOfDomain {
        switch: SwitchName,
        value: SwitchValue,
        domain: SwitchDomain,
    },
}
