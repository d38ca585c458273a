//! Artifact envelope
//!
//! Every persisted governance document is wrapped in the same envelope:
//! `{artifact_class, schema_id, schema_version, record, extensions}`.
//! The class decides which contract applies on write.

use crate::canonical::{
    find_forbidden_keys, serialize_canonical_with, ForbiddenKeys,
};
use crate::digest::ContentDigest;
use crate::error::{CanonError, CanonResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Contract class of an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactClass {
    /// Authoritative, byte-stable, no run metadata
    Canonical,
    /// Human or tool view; may carry run metadata; never gating input
    DerivedView,
    /// Pure run metadata
    RunMeta,
}

impl ArtifactClass {
    /// Wire token
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Canonical => "CANONICAL",
            Self::DerivedView => "DERIVED_VIEW",
            Self::RunMeta => "RUN_META",
        }
    }

    /// Parse wire token
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "CANONICAL" => Some(Self::Canonical),
            "DERIVED_VIEW" => Some(Self::DerivedView),
            "RUN_META" => Some(Self::RunMeta),
            _ => None,
        }
    }

    /// Forbidden key set applied when serializing this class
    #[must_use]
    pub fn forbidden_keys(self) -> ForbiddenKeys {
        match self {
            Self::Canonical => ForbiddenKeys::run_meta(),
            Self::DerivedView | Self::RunMeta => ForbiddenKeys::none(),
        }
    }
}

impl fmt::Display for ArtifactClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Artifact envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalArtifact {
    /// Contract class
    pub artifact_class: ArtifactClass,
    /// Schema identifier
    pub schema_id: String,
    /// Schema version
    pub schema_version: String,
    /// Payload
    pub record: Value,
    /// Free-form extensions (timing lives here for derived views)
    #[serde(default = "empty_object")]
    pub extensions: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl CanonicalArtifact {
    /// CANONICAL envelope
    #[must_use]
    pub fn canonical(
        schema_id: impl Into<String>,
        schema_version: impl Into<String>,
        record: Value,
    ) -> Self {
        Self {
            artifact_class: ArtifactClass::Canonical,
            schema_id: schema_id.into(),
            schema_version: schema_version.into(),
            record,
            extensions: empty_object(),
        }
    }

    /// DERIVED_VIEW envelope
    #[must_use]
    pub fn derived_view(
        schema_id: impl Into<String>,
        schema_version: impl Into<String>,
        record: Value,
    ) -> Self {
        Self {
            artifact_class: ArtifactClass::DerivedView,
            ..Self::canonical(schema_id, schema_version, record)
        }
    }

    /// Attach extensions
    #[must_use]
    pub fn with_extensions(mut self, extensions: Value) -> Self {
        self.extensions = extensions;
        self
    }

    /// Decode from an untyped document
    ///
    /// The canonical contract is checked before the shape, so a CANONICAL
    /// document carrying run metadata reports drift even when other envelope
    /// fields are missing.
    ///
    /// # Errors
    /// [`CanonError::CanonicalDrift`] or [`CanonError::InvalidShape`]
    pub fn from_value(value: Value) -> CanonResult<Self> {
        check_value_contract(&value)?;
        let Value::Object(map) = &value else {
            return Err(CanonError::invalid_shape("artifact must be a JSON object"));
        };
        for field in ["artifact_class", "schema_id", "schema_version", "record"] {
            if !map.contains_key(field) {
                return Err(CanonError::invalid_shape(format!(
                    "missing field `{field}`"
                )));
            }
        }
        serde_json::from_value(value).map_err(|e| CanonError::invalid_shape(e.to_string()))
    }

    /// Decode from bytes
    ///
    /// # Errors
    /// JSON decode failures and the errors of [`Self::from_value`]
    pub fn from_slice(bytes: &[u8]) -> CanonResult<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    /// Envelope as an untyped document
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(
            "artifact_class".into(),
            Value::String(self.artifact_class.as_str().into()),
        );
        map.insert("schema_id".into(), Value::String(self.schema_id.clone()));
        map.insert(
            "schema_version".into(),
            Value::String(self.schema_version.clone()),
        );
        map.insert("record".into(), self.record.clone());
        map.insert("extensions".into(), self.extensions.clone());
        Value::Object(map)
    }

    /// Enforce the class contract
    ///
    /// # Errors
    /// [`CanonError::CanonicalDrift`] if a CANONICAL artifact carries
    /// forbidden keys anywhere
    pub fn check_contract(&self) -> CanonResult<()> {
        check_value_contract(&self.to_value())
    }

    /// Stable bytes for this artifact
    ///
    /// # Errors
    /// Contract violations from [`Self::check_contract`]
    pub fn to_bytes(&self) -> CanonResult<Vec<u8>> {
        self.check_contract()?;
        Ok(serialize_canonical_with(
            &self.to_value(),
            &self.artifact_class.forbidden_keys(),
        ))
    }

    /// SHA-256 of [`Self::to_bytes`]
    ///
    /// # Errors
    /// Contract violations from [`Self::check_contract`]
    pub fn digest(&self) -> CanonResult<ContentDigest> {
        Ok(ContentDigest::compute(&self.to_bytes()?))
    }
}

/// Check an untyped document against its declared class contract
///
/// Documents without a recognised `artifact_class` are not checked.
///
/// # Errors
/// [`CanonError::CanonicalDrift`] listing every forbidden key path
pub fn check_value_contract(value: &Value) -> CanonResult<()> {
    let class = value
        .get("artifact_class")
        .and_then(Value::as_str)
        .and_then(ArtifactClass::parse);
    if class != Some(ArtifactClass::Canonical) {
        return Ok(());
    }
    let keys = find_forbidden_keys(value, &ForbiddenKeys::run_meta());
    if keys.is_empty() {
        Ok(())
    } else {
        Err(CanonError::CanonicalDrift { keys })
    }
}
