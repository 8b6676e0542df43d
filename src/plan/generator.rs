//! Text-generation collaborator used to embellish plan wording.

use crate::error::{ExperimentError, Result};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

/// A service that answers a prompt with a JSON object.
///
/// Implementations wrap whatever backend produces the text; the planning
/// layer only relies on this contract and treats every failure as a signal
/// to fall back to deterministic output.
pub trait TextGenerator {
    fn generate_json(&self, system: &str, prompt: &str) -> Result<Value>;
}

/// Replays a JSON response stored on disk, ignoring the prompt.
#[derive(Debug, Clone)]
pub struct JsonFileGenerator {
    path: PathBuf,
}

impl JsonFileGenerator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TextGenerator for JsonFileGenerator {
    fn generate_json(&self, _system: &str, _prompt: &str) -> Result<Value> {
        let text = fs::read_to_string(&self.path)
            .map_err(|e| ExperimentError::Generation(format!("{}: {}", self.path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| ExperimentError::Generation(format!("malformed JSON in {}: {}", self.path.display(), e)))
    }
}
