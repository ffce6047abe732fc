//! Switch specifications.
//!
//! A switch selects among alternative processing branches at pipeline build
//! time. Its domain is declared up front — either boolean or an explicit
//! enumerated set — so that unhandled-branch detection is structural: a
//! branch probe against a value outside the domain is a specification
//! error, not a runtime fallthrough.

use study_common::{SwitchName, SwitchValue};

use crate::error::SwitchDomainError;

/// The declared domain of a switch.
#[derive(Debug, Clone, Eq, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(tag = "domain", rename_all = "kebab-case")]
pub enum SwitchDomain {
    /// `{true, false}`
    Bool,
    /// An explicit enumerated set of allowed string values.
    Choices { choices: Vec<String> },
}

impl SwitchDomain {
    /// Checks that `value` lies within this domain.
    pub fn check(&self, switch: &SwitchName, value: &SwitchValue) -> Result<(), SwitchDomainError> {
        match (self, value) {
            (SwitchDomain::Bool, SwitchValue::Bool(_)) => Ok(()),
            (SwitchDomain::Choices { choices }, SwitchValue::Choice(choice)) => {
                if choices.iter().any(|c| c == choice) {
                    Ok(())
                } else {
                    Err(SwitchDomainError::OutOfDomain {
                        switch: switch.clone(),
                        value: value.clone(),
                        domain: self.clone(),
                    })
                }
            }
            _ => Err(SwitchDomainError::KindMismatch {
                switch: switch.clone(),
                value: value.clone(),
                domain: self.clone(),
            }),
        }
    }
}

impl std::fmt::Display for SwitchDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwitchDomain::Bool => f.write_str("{true, false}"),
            SwitchDomain::Choices { choices } => {
                write!(f, "{{{}}}", choices.join(", "))
            }
        }
    }
}

/// The specification of one study switch: name, domain, and an in-domain
/// default value.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct SwitchSpec {
    name: SwitchName,
    #[serde(flatten)]
    domain: SwitchDomain,
    default: SwitchValue,
}

impl SwitchSpec {
    /// Declares a boolean switch.
    pub fn boolean(name: SwitchName, default: bool) -> Self {
        Self {
            name,
            domain: SwitchDomain::Bool,
            default: SwitchValue::Bool(default),
        }
    }

    /// Declares an enumerated switch.
    ///
    /// Fails if the default is not one of the declared choices.
    pub fn choices<I, S>(
        name: SwitchName,
        choices: I,
        default: &str,
    ) -> Result<Self, SwitchDomainError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let domain = SwitchDomain::Choices {
            choices: choices.into_iter().map(Into::into).collect(),
        };
        let default = SwitchValue::Choice(default.to_string());
        domain.check(&name, &default)?;
        Ok(Self {
            name,
            domain,
            default,
        })
    }

    pub fn name(&self) -> &SwitchName {
        &self.name
    }

    pub fn domain(&self) -> &SwitchDomain {
        &self.domain
    }

    pub fn default(&self) -> &SwitchValue {
        &self.default
    }

    /// Checks that `value` lies within this switch's domain.
    pub fn check(&self, value: &SwitchValue) -> Result<(), SwitchDomainError> {
        self.domain.check(&self.name, value)
    }
}
