//! Validated name newtypes for the study data specification.
//!
//! All declared entities — data items, pipelines, switches, and parameters —
//! are identified by snake-case names. The newtypes in this module guarantee
//! at construction time that every instance holds a valid name, so lookup
//! keys never need re-validation deeper in the engine.

/// Validates that a name follows the required format:
/// - Must start with a lowercase letter or underscore
/// - Can only contain lowercase letters, underscores, and digits
/// - Must not be empty
pub fn validate_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }

    if let Some(first) = name.chars().next()
        && !(first.is_ascii_lowercase() || first == '_')
    {
        return Err(NameError::InvalidCharacter {
            character: first,
            value: name.to_string(),
        });
    }

    if let Some(c) = name
        .chars()
        .find(|&c| !(c.is_ascii_lowercase() || c == '_' || c.is_ascii_digit()))
    {
        return Err(NameError::InvalidCharacter {
            character: c,
            value: name.to_string(),
        });
    }

    Ok(())
}

/// Error type for name parsing failures.
#[derive(Debug, thiserror::Error)]
pub enum NameError {
    /// Name is empty
    #[error("name cannot be empty")]
    Empty,
    /// Name contains an invalid character
    #[error("invalid character '{character}' in name '{value}'")]
    InvalidCharacter { character: char, value: String },
}

macro_rules! name_newtype {
    ($(#[$docs:meta])* $name:ident) => {
        $(#[$docs])*
        #[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name(String);

        impl $name {
            /// Returns a reference to the inner string value
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the name and returns the inner String
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == **other
            }
        }

        impl PartialEq<String> for $name {
            fn eq(&self, other: &String) -> bool {
                self.0 == *other
            }
        }

        impl TryFrom<String> for $name {
            type Error = NameError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                validate_name(&value)?;
                Ok(Self(value))
            }
        }

        impl std::str::FromStr for $name {
            type Err = NameError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                validate_name(s)?;
                Ok(Self(s.to_string()))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                self.0.serialize(serializer)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let value = String::deserialize(deserializer)?;
                value.try_into().map_err(serde::de::Error::custom)
            }
        }
    };
}

name_newtype! {
    /// A validated data item name.
    ///
    /// Identifies an acquired or derived data item within a study's data
    /// specification. Item names are unique within a registry.
    ItemName
}

name_newtype! {
    /// A validated pipeline name.
    ///
    /// Identifies the pipeline that produces one or more derived items.
    PipelineName
}

name_newtype! {
    /// A validated switch name.
    ///
    /// Switches select among alternative processing branches at pipeline
    /// build time.
    SwitchName
}

name_newtype! {
    /// A validated parameter name.
    ParamName
}
