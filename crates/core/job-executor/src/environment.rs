//! Software environment resolution.
//!
//! Pipelines declare abstract requirement tags; the execution host decides
//! what concrete module satisfies each tag.

use std::collections::BTreeMap;

use pipeline_graph::RequirementName;

/// Errors raised while resolving a software requirement.
#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    #[error("no environment module satisfies requirement '{0}'")]
    Unsatisfied(RequirementName),
}

/// Maps abstract software requirement tags to concrete module references.
pub trait EnvironmentResolver: Send + Sync {
    fn resolve(&self, requirement: &RequirementName) -> Result<String, EnvironmentError>;
}

/// An environment where every requirement resolves to its own tag, with
/// optional per-tag overrides.
#[derive(Debug, Clone, Default)]
pub struct StaticEnvironment {
    overrides: BTreeMap<RequirementName, String>,
}

impl StaticEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(
        mut self,
        requirement: RequirementName,
        module: impl Into<String>,
    ) -> Self {
        self.overrides.insert(requirement, module.into());
        self
    }
}

impl EnvironmentResolver for StaticEnvironment {
    fn resolve(&self, requirement: &RequirementName) -> Result<String, EnvironmentError> {
        Ok(self
            .overrides
            .get(requirement)
            .cloned()
            .unwrap_or_else(|| requirement.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::{EnvironmentResolver, StaticEnvironment};

    #[test]
    fn resolves_identically_unless_overridden() {
        //* Given
        let env = StaticEnvironment::new().with_override(
            "software_req1".parse().expect("valid name"),
            "modules/tool-1.2.3",
        );

        //* Then
        assert_eq!(
            env.resolve(&"software_req1".parse().expect("valid name"))
                .expect("resolves"),
            "modules/tool-1.2.3"
        );
        assert_eq!(
            env.resolve(&"software_req2".parse().expect("valid name"))
                .expect("resolves"),
            "software_req2"
        );
    }
}
