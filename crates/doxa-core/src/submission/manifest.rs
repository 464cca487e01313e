use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use super::archive::ExclusionRules;

/// Manifest file read from the root of a submission directory
pub const MANIFEST_FILE: &str = "doxa.yaml";

const COMPETITION_KEY: &str = "competition";
const ENVIRONMENT_KEY: &str = "environment";
const IGNORE_KEY: &str = "ignore";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("No {} manifest found in {}", MANIFEST_FILE, .0.display())]
    NotFound(PathBuf),

    #[error("The {} manifest is invalid: {}", MANIFEST_FILE, .0)]
    Invalid(String),

    #[error("No competition was specified - add `competition:` to {} or pass one explicitly", MANIFEST_FILE)]
    MissingCompetition,

    #[error("Could not read the manifest: {0}")]
    Io(#[from] io::Error),
}

/// A submission ready to be packed and announced to the platform.
#[derive(Debug, Clone)]
pub struct PreparedSubmission {
    pub competition: String,
    pub environment: Option<String>,
    /// Passthrough manifest keys, without `competition` and `environment`.
    pub metadata: Map<String, Value>,
    pub exclusions: ExclusionRules,
}

/// Read the manifest in `directory` and merge explicit overrides over it.
///
/// Overrides win over manifest values. A missing manifest is only acceptable
/// when a competition override is given.
pub fn prepare(
    directory: &Path,
    override_competition: Option<&str>,
    override_environment: Option<&str>,
) -> Result<PreparedSubmission, ManifestError> {
    let path = directory.join(MANIFEST_FILE);
    let mut metadata = match std::fs::read_to_string(&path) {
        Ok(contents) => parse_manifest(&contents)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if override_competition.is_none() {
                return Err(ManifestError::NotFound(directory.to_path_buf()));
            }
            debug!(directory = %directory.display(), "No manifest, using explicit competition");
            Map::new()
        }
        Err(e) => return Err(e.into()),
    };

    let manifest_competition = take_string(&mut metadata, COMPETITION_KEY)?;
    let manifest_environment = take_string(&mut metadata, ENVIRONMENT_KEY)?;
    let ignore = ignore_patterns(&metadata)?;

    let competition = override_competition
        .map(str::to_string)
        .or(manifest_competition)
        .filter(|c| !c.trim().is_empty())
        .ok_or(ManifestError::MissingCompetition)?;
    let environment = override_environment
        .map(str::to_string)
        .or(manifest_environment);

    let exclusions = ExclusionRules::new(&ignore)
        .map_err(|e| ManifestError::Invalid(format!("bad ignore pattern: {}", e)))?;

    Ok(PreparedSubmission {
        competition,
        environment,
        metadata,
        exclusions,
    })
}

fn parse_manifest(contents: &str) -> Result<Map<String, Value>, ManifestError> {
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(contents).map_err(|e| ManifestError::Invalid(e.to_string()))?;

    match yaml {
        serde_yaml::Value::Null => Ok(Map::new()),
        serde_yaml::Value::Mapping(_) => match serde_json::to_value(&yaml) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(ManifestError::Invalid("expected a mapping".to_string())),
            Err(e) => Err(ManifestError::Invalid(e.to_string())),
        },
        _ => Err(ManifestError::Invalid("expected a mapping".to_string())),
    }
}

fn take_string(metadata: &mut Map<String, Value>, key: &str) -> Result<Option<String>, ManifestError> {
    match metadata.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(other) => Err(ManifestError::Invalid(format!(
            "`{}` must be a string, found {}",
            key, other
        ))),
    }
}

fn ignore_patterns(metadata: &Map<String, Value>) -> Result<Vec<String>, ManifestError> {
    let invalid = || ManifestError::Invalid(format!("`{}` must be a list of glob patterns", IGNORE_KEY));
    match metadata.get(IGNORE_KEY) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
            .collect(),
        Some(_) => Err(invalid()),
    }
}
