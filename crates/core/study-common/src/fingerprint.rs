//! Provenance fingerprints.
//!
//! A fingerprint is a stable SHA-256 digest over everything that can change
//! a derived item's value: the producing pipeline's name, every parameter
//! and switch value the pipeline build actually read, and the fingerprints
//! of every derived input it consumes. Because input fingerprints are
//! folded in transitively, any upstream parameter change invalidates every
//! downstream cache entry without a global invalidation scan.

use sha2::{Digest as _, Sha256};

use crate::{FormatName, ItemName, ParamName, ParamValue, PipelineName, SwitchName, SwitchValue};

/// A 64-character hex SHA-256 digest identifying one provenance state of a
/// data item.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Returns a reference to the inner hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A short prefix for log messages.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }

    /// Fingerprint of an acquired (non-derived) item.
    ///
    /// Acquired items have no producing pipeline; their provenance is their
    /// identity and declared format. Repository content hashing is a
    /// repository concern and is deliberately not folded in here.
    pub fn for_acquired(item: &ItemName, format: &FormatName) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"acquired\x00");
        hasher.update(item.as_str().as_bytes());
        hasher.update(b"\x00");
        hasher.update(format.as_str().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Fingerprint of an acquired scalar field item, which carries no
    /// format.
    pub fn for_acquired_field(item: &ItemName) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"acquired-field\x00");
        hasher.update(item.as_str().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Error type for [`Fingerprint`] parsing failures.
#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    #[error("invalid fingerprint length: expected 64, got {0}")]
    InvalidLength(usize),

    #[error("invalid hex character '{character}' at index {index}")]
    InvalidHexCharacter { character: char, index: usize },
}

impl std::str::FromStr for Fingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(FingerprintError::InvalidLength(s.len()));
        }
        if let Some((index, character)) =
            s.chars().enumerate().find(|(_, c)| !c.is_ascii_hexdigit())
        {
            return Err(FingerprintError::InvalidHexCharacter { character, index });
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = FingerprintError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl serde::Serialize for Fingerprint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Fingerprint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// Incrementally builds the fingerprint of a derived item.
///
/// Inputs are fed in a canonical order by the resolver (parameters and
/// switches sorted by name, input items sorted by name), with NUL-separated
/// length-framed fields so distinct input sets can never collide on
/// concatenation.
#[derive(Debug)]
pub struct FingerprintBuilder {
    hasher: Sha256,
}

impl FingerprintBuilder {
    /// Starts a fingerprint for the given producing pipeline.
    pub fn for_pipeline(pipeline: &PipelineName) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"derived\x00");
        hasher.update(pipeline.as_str().as_bytes());
        Self { hasher }
    }

    fn field(&mut self, tag: &[u8], body: &str) {
        self.hasher.update(tag);
        self.hasher.update((body.len() as u64).to_be_bytes());
        self.hasher.update(body.as_bytes());
    }

    /// Folds in a parameter value read during the pipeline build.
    pub fn param(&mut self, name: &ParamName, value: &ParamValue) {
        self.field(b"\x00p", name.as_str());
        self.field(b"\x00v", &value.canonical());
    }

    /// Folds in a switch value read during the pipeline build.
    pub fn switch(&mut self, name: &SwitchName, value: &SwitchValue) {
        self.field(b"\x00s", name.as_str());
        self.field(b"\x00v", &value.canonical());
    }

    /// Folds in the fingerprint of a consumed input item.
    pub fn input(&mut self, item: &ItemName, fingerprint: &Fingerprint) {
        self.field(b"\x00i", item.as_str());
        self.field(b"\x00f", fingerprint.as_str());
    }

    /// Finalizes the digest.
    pub fn finish(self) -> Fingerprint {
        Fingerprint(hex::encode(self.hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::{Fingerprint, FingerprintBuilder};

    fn pipeline_fp(param_value: i64) -> Fingerprint {
        let mut b = FingerprintBuilder::for_pipeline(&"pipeline1".parse().expect("valid name"));
        b.param(
            &"threshold".parse().expect("valid name"),
            &param_value.into(),
        );
        b.finish()
    }

    #[test]
    fn parameter_change_changes_fingerprint() {
        assert_ne!(pipeline_fp(1), pipeline_fp(2));
        assert_eq!(pipeline_fp(1), pipeline_fp(1));
    }

    #[test]
    fn upstream_fingerprint_propagates() {
        //* Given
        let upstream_a = pipeline_fp(1);
        let upstream_b = pipeline_fp(2);
        let item = "upstream_item".parse().expect("valid name");

        let downstream = |up: &Fingerprint| {
            let mut b = FingerprintBuilder::for_pipeline(&"pipeline2".parse().expect("valid name"));
            b.input(&item, up);
            b.finish()
        };

        //* Then
        assert_ne!(downstream(&upstream_a), downstream(&upstream_b));
    }

    #[test]
    fn acquired_fingerprint_is_stable() {
        //* Given
        let item = "acquired_file1".parse().expect("valid name");
        let format = "text".parse().expect("valid format");

        //* Then
        assert_eq!(
            Fingerprint::for_acquired(&item, &format),
            Fingerprint::for_acquired(&item, &format)
        );
    }

    #[test]
    fn parse_rejects_malformed_digests() {
        assert!("abc".parse::<Fingerprint>().is_err());
        assert!(
            "zz".repeat(32).parse::<Fingerprint>().is_err(),
            "non-hex must be rejected"
        );
    }
}
