//! File-set format tags.

use crate::name::{NameError, validate_name};

/// A validated file-set format tag (e.g. `dicom`, `nifti_gz`, `zip`,
/// `text`).
///
/// Formats are opaque to the engine: they are matched verbatim between
/// data specifications and repository entries, and carried through to
/// compiled jobs. Format validation/conversion is an external concern.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FormatName(String);

impl FormatName {
    /// Returns a reference to the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for FormatName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for FormatName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for FormatName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == **other
    }
}

impl TryFrom<String> for FormatName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_name(&value)?;
        Ok(Self(value))
    }
}

impl std::str::FromStr for FormatName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_name(s)?;
        Ok(Self(s.to_string()))
    }
}

impl std::fmt::Display for FormatName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl serde::Serialize for FormatName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for FormatName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value.try_into().map_err(serde::de::Error::custom)
    }
}
