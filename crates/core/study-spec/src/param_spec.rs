//! Scalar parameter specifications.

use study_common::{ParamName, ParamValue};

/// The specification of one study parameter: a name, a default value, and
/// an optional human-readable description.
///
/// Parameter values are bound at study instantiation (defaults possibly
/// overridden) and immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct ParamSpec {
    name: ParamName,
    default: ParamValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl ParamSpec {
    pub fn new(name: ParamName, default: impl Into<ParamValue>) -> Self {
        Self {
            name,
            default: default.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &ParamName {
        &self.name
    }

    pub fn default(&self) -> &ParamValue {
        &self.default
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}
