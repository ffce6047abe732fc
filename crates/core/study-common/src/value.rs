//! Scalar parameter and switch values.

/// A scalar study parameter value.
///
/// Parameters are bound once at study instantiation and are immutable for
/// the life of the study. Their values participate in provenance
/// fingerprints, so the canonical encoding used by
/// [`FingerprintBuilder`](crate::FingerprintBuilder) must be stable.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    /// A canonical, stable string encoding used for fingerprinting.
    ///
    /// Floats are rendered via Rust's shortest-roundtrip formatting, which
    /// is deterministic for a given bit pattern.
    pub fn canonical(&self) -> String {
        match self {
            ParamValue::Bool(v) => format!("b:{v}"),
            ParamValue::Int(v) => format!("i:{v}"),
            ParamValue::Float(v) => format!("f:{v}"),
            ParamValue::Str(v) => format!("s:{v}"),
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Bool(v) => v.fmt(f),
            ParamValue::Int(v) => v.fmt(f),
            ParamValue::Float(v) => v.fmt(f),
            ParamValue::Str(v) => v.fmt(f),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

/// A switch value: either a boolean or one choice from an enumerated
/// domain.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum SwitchValue {
    Bool(bool),
    Choice(String),
}

impl SwitchValue {
    /// A canonical, stable string encoding used for fingerprinting.
    pub fn canonical(&self) -> String {
        match self {
            SwitchValue::Bool(v) => format!("b:{v}"),
            SwitchValue::Choice(v) => format!("c:{v}"),
        }
    }
}

impl std::fmt::Display for SwitchValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwitchValue::Bool(v) => v.fmt(f),
            SwitchValue::Choice(v) => v.fmt(f),
        }
    }
}

impl From<bool> for SwitchValue {
    fn from(value: bool) -> Self {
        SwitchValue::Bool(value)
    }
}

impl From<&str> for SwitchValue {
    fn from(value: &str) -> Self {
        SwitchValue::Choice(value.to_string())
    }
}
