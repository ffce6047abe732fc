//! Data item specifications.

use study_common::{FormatName, Frequency, ItemName, ParamValue, PipelineName};

/// The declared value shape of a data item.
#[derive(Debug, Clone, Eq, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ValueKind {
    /// A set of files in a declared format.
    Fileset { format: FormatName },
    /// A scalar field value.
    Field,
}

impl ValueKind {
    /// Returns the declared format for fileset items.
    pub fn format(&self) -> Option<&FormatName> {
        match self {
            ValueKind::Fileset { format } => Some(format),
            ValueKind::Field => None,
        }
    }
}

/// Whether an item is acquired from the repository or derived by a
/// pipeline.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(tag = "source", rename_all = "kebab-case")]
pub enum DataKind {
    /// Resolved directly from the data repository; terminates dependency
    /// recursion.
    Acquired {
        /// Fallback value when the repository has no matching entry.
        /// Resolved lazily, only when actually needed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<ParamValue>,
    },
    /// Produced by the named pipeline.
    Derived { pipeline: PipelineName },
}

/// The specification of one named data item within a study.
///
/// Frequency is mandatory on every spec, acquired or derived: it decides
/// how many physical cache slots the item occupies and how the item
/// combines with inputs of other scopes.
#[derive(Debug, Clone, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct DataSpec {
    name: ItemName,
    #[serde(flatten)]
    kind: DataKind,
    #[serde(flatten)]
    value: ValueKind,
    frequency: Frequency,
    #[serde(default)]
    optional: bool,
}

impl DataSpec {
    /// Declares an acquired fileset item.
    pub fn acquired_fileset(name: ItemName, format: FormatName, frequency: Frequency) -> Self {
        Self {
            name,
            kind: DataKind::Acquired { default: None },
            value: ValueKind::Fileset { format },
            frequency,
            optional: false,
        }
    }

    /// Declares an acquired scalar field item.
    pub fn acquired_field(name: ItemName, frequency: Frequency) -> Self {
        Self {
            name,
            kind: DataKind::Acquired { default: None },
            value: ValueKind::Field,
            frequency,
            optional: false,
        }
    }

    /// Declares a derived fileset item produced by `pipeline`.
    pub fn derived_fileset(
        name: ItemName,
        format: FormatName,
        frequency: Frequency,
        pipeline: PipelineName,
    ) -> Self {
        Self {
            name,
            kind: DataKind::Derived { pipeline },
            value: ValueKind::Fileset { format },
            frequency,
            optional: false,
        }
    }

    /// Declares a derived scalar field item produced by `pipeline`.
    pub fn derived_field(name: ItemName, frequency: Frequency, pipeline: PipelineName) -> Self {
        Self {
            name,
            kind: DataKind::Derived { pipeline },
            value: ValueKind::Field,
            frequency,
            optional: false,
        }
    }

    /// Marks the item optional: resolution does not fail when the
    /// repository has no matching entry and no default is declared.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Declares a default value used when the repository has no matching
    /// entry for this acquired item. No effect on derived items.
    pub fn with_default(mut self, default: ParamValue) -> Self {
        if let DataKind::Acquired { default: slot } = &mut self.kind {
            *slot = Some(default);
        }
        self
    }

    pub fn name(&self) -> &ItemName {
        &self.name
    }

    pub fn kind(&self) -> &DataKind {
        &self.kind
    }

    pub fn value(&self) -> &ValueKind {
        &self.value
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Returns the producing pipeline for derived items.
    pub fn pipeline(&self) -> Option<&PipelineName> {
        match &self.kind {
            DataKind::Derived { pipeline } => Some(pipeline),
            DataKind::Acquired { .. } => None,
        }
    }

    /// Returns the declared default for acquired items.
    pub fn default_value(&self) -> Option<&ParamValue> {
        match &self.kind {
            DataKind::Acquired { default } => default.as_ref(),
            DataKind::Derived { .. } => None,
        }
    }

    pub fn is_derived(&self) -> bool {
        matches!(self.kind, DataKind::Derived { .. })
    }
}
