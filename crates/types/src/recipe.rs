//! Recipe data structures
//!
//! A recipe is a declarative YAML document: package metadata, one source
//! artifact with a checksum, dependency lists for an external system
//! package manager, and two lifecycle phases (`build`, `install`) given as
//! ordered command lists.

use crate::report::PhaseKind;
use kiln_errors::{Error, RecipeError};
use serde::{Deserialize, Serialize};

fn default_prefix() -> String {
    "/usr/local".to_string()
}

/// A parsed recipe. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recipe {
    pub name: String,
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,

    /// URL of the source artifact (tarball or similar)
    pub source: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blake3: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintainer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Packages required to build (resolved by an external package manager)
    #[serde(default)]
    pub build_depends: Vec<String>,

    /// Run-time package dependencies (resolved by an external package manager)
    #[serde(default)]
    pub depends: Vec<String>,

    /// Final installation prefix baked into the build
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Ordered build commands
    pub build: Vec<String>,

    /// Ordered install commands (run after `build` succeeds)
    pub install: Vec<String>,
}

/// Algorithm-tagged checksum declared by a recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Checksum {
    Sha256(String),
    Blake3(String),
}

impl Checksum {
    /// Algorithm name as it appears in the recipe
    #[must_use]
    pub fn algorithm(&self) -> &'static str {
        match self {
            Checksum::Sha256(_) => "sha256",
            Checksum::Blake3(_) => "blake3",
        }
    }

    /// Hex digest string
    #[must_use]
    pub fn hex(&self) -> &str {
        match self {
            Checksum::Sha256(hex) | Checksum::Blake3(hex) => hex,
        }
    }
}

impl Recipe {
    /// Parse a recipe from YAML text and validate it
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed or the recipe fails
    /// validation (missing fields, bad checksum, empty phases).
    pub fn from_yaml(text: &str) -> Result<Self, Error> {
        let recipe: Recipe = serde_yml::from_str(text).map_err(|e| RecipeError::ParseError {
            message: e.to_string(),
        })?;
        recipe.validate()?;
        Ok(recipe)
    }

    /// The recipe's checksum, tagged with its algorithm
    ///
    /// # Errors
    ///
    /// Returns an error if neither `sha256` nor `blake3` is declared.
    /// Validation guarantees exactly one is present for parsed recipes.
    pub fn checksum(&self) -> Result<Checksum, Error> {
        match (&self.sha256, &self.blake3) {
            (Some(hex), None) => Ok(Checksum::Sha256(hex.clone())),
            (None, Some(hex)) => Ok(Checksum::Blake3(hex.clone())),
            (None, None) => Err(RecipeError::MissingField {
                field: "sha256 or blake3".to_string(),
            }
            .into()),
            (Some(_), Some(_)) => Err(RecipeError::InvalidChecksum {
                message: "declare either sha256 or blake3, not both".to_string(),
            }
            .into()),
        }
    }

    /// Commands of the given phase, in declared order
    #[must_use]
    pub fn phase(&self, kind: PhaseKind) -> &[String] {
        match kind {
            PhaseKind::Build => &self.build,
            PhaseKind::Install => &self.install,
        }
    }

    fn validate(&self) -> Result<(), Error> {
        for (field, value) in [
            ("name", &self.name),
            ("version", &self.version),
            ("source", &self.source),
        ] {
            if value.trim().is_empty() {
                return Err(RecipeError::MissingField {
                    field: field.to_string(),
                }
                .into());
            }
        }

        let checksum = self.checksum()?;
        let hex = checksum.hex();
        if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RecipeError::InvalidChecksum {
                message: format!(
                    "{} digest must be 64 hex characters, got {}",
                    checksum.algorithm(),
                    hex.len()
                ),
            }
            .into());
        }

        for kind in [PhaseKind::Build, PhaseKind::Install] {
            let commands = self.phase(kind);
            if commands.is_empty() || commands.iter().all(|c| c.trim().is_empty()) {
                return Err(RecipeError::EmptyPhase {
                    phase: kind.to_string(),
                }
                .into());
            }
        }

        if !self.prefix.starts_with('/') {
            return Err(RecipeError::InvalidPrefix {
                prefix: self.prefix.clone(),
                reason: "must be an absolute path".to_string(),
            }
            .into());
        }
        if self.prefix == "/" {
            return Err(RecipeError::InvalidPrefix {
                prefix: self.prefix.clone(),
                reason: "must not be the filesystem root".to_string(),
            }
            .into());
        }

        Ok(())
    }
}
