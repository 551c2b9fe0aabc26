use crate::error::{DownloaderError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// License requirements of a catalog entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    #[serde(default)]
    pub required: bool,
    /// Page where the license is accepted on the hub
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One downloadable model file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub local_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subfolder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_mb: Option<u64>,
}

impl ModelEntry {
    /// Entry with only a path, as the minimal catalog format allows
    #[must_use]
    pub fn new(local_path: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            license: None,
            repo_id: None,
            subfolder: None,
            filename: None,
            revision: None,
            size_mb: None,
        }
    }

    /// Canonical model identifier: the final `/` segment of `local_path`
    #[must_use]
    pub fn identifier(&self) -> &str {
        model_identifier(&self.local_path)
    }

    #[must_use]
    pub fn is_gated(&self) -> bool {
        self.license.as_ref().is_some_and(|l| l.required)
    }

    /// File name inside the hub repository
    #[must_use]
    pub fn hub_filename(&self) -> &str {
        self.filename.as_deref().unwrap_or_else(|| self.identifier())
    }

    /// Path of the file inside the hub repository, including the subfolder
    #[must_use]
    pub fn hub_path(&self) -> String {
        match self.subfolder.as_deref().map(|s| s.trim_matches('/')) {
            Some(sub) if !sub.is_empty() => format!("{sub}/{}", self.hub_filename()),
            _ => self.hub_filename().to_string(),
        }
    }

    /// Where the file lives under `models_root`; absolute paths and `..` are refused
    pub fn destination(&self, models_root: &Path) -> Result<PathBuf> {
        let relative = Path::new(&self.local_path);
        if !relative.is_relative()
            || relative.components().any(|c| {
                matches!(
                    c,
                    Component::ParentDir | Component::RootDir | Component::Prefix(_)
                )
            })
        {
            return Err(DownloaderError::ServiceUnavailable(format!(
                "Catalog entry '{}' points outside the models root",
                self.local_path
            )));
        }

        Ok(models_root.join(relative))
    }
}

/// Final path segment of a slash-delimited path
#[must_use]
pub fn model_identifier(local_path: &str) -> &str {
    local_path.rsplit('/').next().unwrap_or(local_path)
}

/// Ordered list of known models
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    pub entries: Vec<ModelEntry>,
}

impl Catalog {
    #[must_use]
    pub const fn new(entries: Vec<ModelEntry>) -> Self {
        Self { entries }
    }

    /// Parse `model_config.json`
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            DownloaderError::ServiceUnavailable(format!(
                "Model catalog not readable at {}: {e}",
                path.display()
            ))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            DownloaderError::ServiceUnavailable(format!("Failed to parse model catalog: {e}"))
        })
    }

    /// Find entry by identifier
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&ModelEntry> {
        self.entries.iter().find(|m| m.identifier() == name)
    }

    /// Resolve a name or fail with a suggestion
    pub fn resolve(&self, name: &str) -> Result<&ModelEntry> {
        self.find(name).ok_or_else(|| {
            let hint = self
                .suggest(name)
                .map(|s| format!(". Did you mean '{s}'?"))
                .unwrap_or_default();
            DownloaderError::NotFound(format!("No matching models found for {name}{hint}"))
        })
    }

    /// Entries whose `local_path` contains `needle`
    pub fn matching<'a>(&'a self, needle: &'a str) -> impl Iterator<Item = &'a ModelEntry> {
        self.entries
            .iter()
            .filter(move |m| m.local_path.contains(needle))
    }

    /// Get all identifiers in catalog order
    #[must_use]
    pub fn identifiers(&self) -> Vec<&str> {
        self.entries.iter().map(ModelEntry::identifier).collect()
    }

    /// Find closest match using Levenshtein distance
    #[must_use]
    pub fn suggest(&self, name: &str) -> Option<&str> {
        if name.is_empty() {
            return None;
        }

        self.entries
            .iter()
            .map(|m| (m.identifier(), levenshtein_distance(name, m.identifier())))
            .min_by_key(|(_, dist)| *dist)
            .filter(|(_, dist)| *dist <= 2) // Only suggest if within 2 edits
            .map(|(id, _)| id)
    }
}

/// Reads the catalog file on every call so edits apply without a restart
#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: PathBuf,
}

impl CatalogStore {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Catalog> {
        Catalog::load(&self.path)
    }
}

/// Calculate Levenshtein distance between two strings
#[allow(clippy::needless_range_loop)]
fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let len1 = s1.chars().count();
    let len2 = s2.chars().count();

    if len1 == 0 {
        return len2;
    }
    if len2 == 0 {
        return len1;
    }

    let mut matrix = vec![vec![0; len2 + 1]; len1 + 1];

    for i in 0..=len1 {
        matrix[i][0] = i;
    }
    for j in 0..=len2 {
        matrix[0][j] = j;
    }

    for (i, c1) in s1.chars().enumerate() {
        for (j, c2) in s2.chars().enumerate() {
            let cost = usize::from(c1 != c2);
            matrix[i + 1][j + 1] = (matrix[i][j + 1] + 1)
                .min(matrix[i + 1][j] + 1)
                .min(matrix[i][j] + cost);
        }
    }

    matrix[len1][len2]
}
