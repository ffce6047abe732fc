//! Declared resource and software requirements.

use study_common::name::{NameError, validate_name};

/// An abstract software requirement tag (e.g. `software_req1`).
///
/// Mapped to a concrete environment module by the environment resolver at
/// job compilation time; the engine treats it as an opaque, validated tag.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RequirementName(String);

impl RequirementName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RequirementName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for RequirementName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for RequirementName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == **other
    }
}

impl std::str::FromStr for RequirementName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_name(s)?;
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for RequirementName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_name(&value)?;
        Ok(Self(value))
    }
}

impl std::fmt::Display for RequirementName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl serde::Serialize for RequirementName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for RequirementName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value.try_into().map_err(serde::de::Error::custom)
    }
}

/// Resource requirements a node declares for its job: a wall-time ceiling
/// and the software its command needs on the execution host.
///
/// Carried verbatim into the compiled job spec.
#[derive(Debug, Clone, Eq, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Requirements {
    /// Wall-time ceiling in minutes.
    pub wall_time_mins: u32,
    /// Abstract software requirement tags.
    #[serde(default)]
    pub software: Vec<RequirementName>,
}

impl Requirements {
    pub fn wall_time(wall_time_mins: u32) -> Self {
        Self {
            wall_time_mins,
            software: Vec::new(),
        }
    }

    pub fn with_software(mut self, requirement: RequirementName) -> Self {
        self.software.push(requirement);
        self
    }
}

impl Default for Requirements {
    fn default() -> Self {
        // One hour unless a pipeline declares otherwise.
        Self {
            wall_time_mins: 60,
            software: Vec::new(),
        }
    }
}
