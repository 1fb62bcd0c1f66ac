use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{error::DomainError, stage::StageConfig};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum StageFormat {
    Json,
    Yaml,
}

impl StageFormat {
    pub fn from_path(path: &Path) -> Result<Self, DomainError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(StageFormat::Json),
            Some("yaml") | Some("yml") => Ok(StageFormat::Yaml),
            other => Err(DomainError::validation(format!(
                "unsupported stage file extension {:?}",
                other
            ))),
        }
    }
}

pub struct StageLoader;

impl StageLoader {
    /// Reads and validates a stage file, choosing the format from its extension.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<StageConfig, DomainError> {
        let path = path.as_ref();
        let format = StageFormat::from_path(path)?;
        debug!(?path, ?format, "loading stage");
        let text = fs::read_to_string(path)?;
        Self::parse(&text, format)
    }

    pub fn parse(text: &str, format: StageFormat) -> Result<StageConfig, DomainError> {
        let stage: StageConfig = match format {
            StageFormat::Json => serde_json::from_str(text)
                .map_err(|err| DomainError::Serialization(err.to_string()))?,
            StageFormat::Yaml => serde_yaml::from_str(text)
                .map_err(|err| DomainError::Serialization(err.to_string()))?,
        };
        stage.validate()?;
        Ok(stage)
    }

    pub fn export(stage: &StageConfig, format: StageFormat) -> Result<Vec<u8>, DomainError> {
        match format {
            StageFormat::Json => serde_json::to_vec_pretty(stage)
                .map_err(|err| DomainError::Serialization(err.to_string())),
            StageFormat::Yaml => serde_yaml::to_string(stage)
                .map(String::into_bytes)
                .map_err(|err| DomainError::Serialization(err.to_string())),
        }
    }
}
