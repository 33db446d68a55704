//! FHIR model projection tables
//!
//! A `Model` is the schema-aware layer that lets path navigation turn raw
//! document fields into typed nodes: choice-type (`value[x]`) candidate
//! lists, recursive-path canonicalization, the type hierarchy, and the
//! element-path → type mapping. The tables are persisted as plain JSON,
//! one payload per FHIR release.

pub mod error;

pub use error::{Error, Result};

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Supported FHIR releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FhirVersion {
    Dstu2,
    Stu3,
    R4,
    R5,
}

impl FhirVersion {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dstu2" => Ok(FhirVersion::Dstu2),
            "stu3" => Ok(FhirVersion::Stu3),
            "r4" => Ok(FhirVersion::R4),
            "r5" => Ok(FhirVersion::R5),
            other => Err(Error::InvalidFhirVersion(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FhirVersion::Dstu2 => "dstu2",
            FhirVersion::Stu3 => "stu3",
            FhirVersion::R4 => "r4",
            FhirVersion::R5 => "r5",
        }
    }
}

impl fmt::Display for FhirVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SDC scoring metadata: which extension URIs carry item weights and which
/// CodeSystem property names them on a terminology server.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ScoreMetadata {
    #[serde(rename = "extensionURI")]
    pub extension_uris: Vec<String>,
    #[serde(rename = "propertyURI")]
    pub property_uri: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct ModelData {
    #[serde(rename = "choiceTypePaths", default)]
    choice_type_paths: HashMap<String, Vec<String>>,
    #[serde(rename = "pathsDefinedElsewhere", default)]
    paths_defined_elsewhere: HashMap<String, String>,
    #[serde(rename = "type2Parent", default)]
    type_to_parent: HashMap<String, String>,
    #[serde(rename = "path2Type", default)]
    path_to_type: HashMap<String, String>,
    #[serde(rename = "path2TypeWithoutElements", default)]
    path_to_type_without_elements: HashMap<String, String>,
    #[serde(default)]
    score: Option<ScoreMetadata>,
}

/// Model projection tables for one FHIR release.
#[derive(Debug, Clone)]
pub struct Model {
    version: FhirVersion,
    data: ModelData,
}

impl Model {
    /// Load a model from its persisted JSON payload.
    pub fn from_json(version: FhirVersion, json: &serde_json::Value) -> Result<Self> {
        let data: ModelData = serde_json::from_value(json.clone())?;
        Ok(Self { version, data })
    }

    pub fn from_json_str(version: FhirVersion, json: &str) -> Result<Self> {
        let data: ModelData = serde_json::from_str(json)?;
        Ok(Self { version, data })
    }

    pub fn from_file(version: FhirVersion, path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(version, &text)
    }

    /// An empty model: navigation still works, but untyped.
    pub fn empty(version: FhirVersion) -> Self {
        Self {
            version,
            data: ModelData::default(),
        }
    }

    pub fn version(&self) -> FhirVersion {
        self.version
    }

    /// Candidate concrete types for a choice-type element path
    /// (`Observation.value` → `["Quantity", "CodeableConcept", ...]`).
    pub fn choice_candidates(&self, path: &str) -> Option<&[String]> {
        self.data.choice_type_paths.get(path).map(|v| v.as_slice())
    }

    /// Whether the given dotted path names a choice-type element.
    pub fn is_choice_path(&self, path: &str) -> bool {
        self.data.choice_type_paths.contains_key(path)
    }

    /// Canonicalize a recursive path (`Questionnaire.item.item` →
    /// `Questionnaire.item`). Returns the path unchanged when it is not
    /// defined elsewhere.
    pub fn canonical_path<'a>(&'a self, path: &'a str) -> &'a str {
        self.data
            .paths_defined_elsewhere
            .get(path)
            .map(|s| s.as_str())
            .unwrap_or(path)
    }

    /// The declared type of an element path (`Patient.name` → `HumanName`).
    pub fn type_of_path(&self, path: &str) -> Option<&str> {
        self.data
            .path_to_type
            .get(path)
            .or_else(|| self.data.path_to_type_without_elements.get(path))
            .map(|s| s.as_str())
    }

    /// Immediate supertype of a type, if any (`Observation` → `DomainResource`).
    pub fn parent_of(&self, type_name: &str) -> Option<&str> {
        self.data.type_to_parent.get(type_name).map(|s| s.as_str())
    }

    /// Whether `type_name` is `candidate` or one of its transitive subtypes.
    pub fn is_subtype_of(&self, type_name: &str, candidate: &str) -> bool {
        let mut current = type_name;
        loop {
            if current.eq_ignore_ascii_case(candidate) {
                return true;
            }
            match self.parent_of(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    pub fn score(&self) -> Option<&ScoreMetadata> {
        self.data.score.as_ref()
    }
}
