use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

use crate::error::ValidationError;
use crate::logw;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptEntry {
    #[serde(default)]
    pub prompt: String,
}

/// Prompts loaded from a JSON array such as `[{"prompt": "..."}, ...]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptList {
    pub items: Vec<PromptEntry>,
}

impl PromptList {
    pub fn from_json(text: &str) -> Result<Self> {
        let items: Vec<PromptEntry> =
            serde_json::from_str(text).with_context(|| "Failed to parse prompt list JSON")?;
        Ok(Self { items })
    }

    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read prompts: {}", path.as_ref().display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Invalid prompt file: {}", path.as_ref().display()))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Joins the prompts at `indices` with single spaces. Out-of-range indices
    /// and empty prompts are skipped.
    pub fn select(&self, indices: &[usize]) -> String {
        let mut selected = Vec::new();
        for &idx in indices {
            match self.items.get(idx) {
                Some(entry) if !entry.prompt.is_empty() => selected.push(entry.prompt.as_str()),
                Some(_) => {}
                None => logw(format!("Index {} is out of range. Skipping.", idx)),
            }
        }
        selected.join(" ")
    }
}

/// Parses `"1,2,3"` into `[1, 2, 3]`.
pub fn parse_indices(text: &str) -> Result<Vec<usize>, ValidationError> {
    let indices = text
        .split(',')
        .map(|part| part.trim().parse::<usize>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ValidationError::BadIndices(text.to_string()))?;
    if indices.is_empty() {
        return Err(ValidationError::BadIndices(text.to_string()));
    }
    Ok(indices)
}
