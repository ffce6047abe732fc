//! Subject and visit identifiers.
//!
//! Unlike specification names, these identify concrete entities in the data
//! repository (e.g. subject `PILOT1`, visit `SECOND`), so the format is
//! looser: any non-empty string of alphanumerics, `-` and `_`, with case
//! preserved exactly as the repository spells it.

/// Validates a repository identifier (subject or visit).
fn validate_id(id: &str) -> Result<(), IdError> {
    if id.is_empty() {
        return Err(IdError::Empty);
    }

    if let Some(c) = id
        .chars()
        .find(|&c| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
    {
        return Err(IdError::InvalidCharacter {
            character: c,
            value: id.to_string(),
        });
    }

    Ok(())
}

/// Error type for identifier parsing failures.
#[derive(Debug, thiserror::Error)]
pub enum IdError {
    /// Identifier is empty
    #[error("identifier cannot be empty")]
    Empty,
    /// Identifier contains an invalid character
    #[error("invalid character '{character}' in identifier '{value}'")]
    InvalidCharacter { character: char, value: String },
}

macro_rules! id_newtype {
    ($(#[$docs:meta])* $name:ident) => {
        $(#[$docs])*
        #[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name(String);

        impl $name {
            /// Returns a reference to the inner string value
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the identifier and returns the inner String
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
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

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                validate_id(&value)?;
                Ok(Self(value))
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                validate_id(s)?;
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

id_newtype! {
    /// A subject identifier as spelled in the data repository.
    SubjectId
}

id_newtype! {
    /// A visit identifier as spelled in the data repository.
    VisitId
}
