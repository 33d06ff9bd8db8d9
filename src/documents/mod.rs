//! Document store: provider profiles and the structured route catalog.
//!
//! The store is a directory of plain-text provider profiles (provider name encoded
//! in the filename) plus one JSON catalog file. Loading never fails as a whole:
//! unreadable or undecodable sources are reported and skipped.

mod catalog;

pub use catalog::{Catalog, District, DroppingPoint, Provider};

use crate::error::{BusbotError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Identifier used for the catalog source.
pub const CATALOG_SOURCE_ID: &str = "catalog";

/// Kind of a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Free-text provider profile (policies, contacts, amenities).
    Profile,
    /// Structured records (districts, fares, providers).
    Catalog,
}

/// Contents of a source document.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceBody {
    Text(String),
    Catalog(Catalog),
}

/// A source document as loaded from the document store.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    /// Provider name for profiles, [`CATALOG_SOURCE_ID`] for the catalog.
    pub id: String,
    pub body: SourceBody,
    /// Where the document was read from.
    pub path: PathBuf,
}

impl SourceDocument {
    /// Create a provider profile document.
    pub fn profile(provider: &str, text: impl Into<String>) -> Self {
        Self {
            id: normalize_provider(provider),
            body: SourceBody::Text(text.into()),
            path: PathBuf::new(),
        }
    }

    /// Create the catalog document.
    pub fn catalog(catalog: Catalog) -> Self {
        Self {
            id: CATALOG_SOURCE_ID.to_string(),
            body: SourceBody::Catalog(catalog),
            path: PathBuf::new(),
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self.body {
            SourceBody::Text(_) => SourceKind::Profile,
            SourceBody::Catalog(_) => SourceKind::Catalog,
        }
    }
}

/// A source that could not be loaded.
#[derive(Debug, Clone, Serialize)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of loading the document store.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<SourceDocument>,
    pub failures: Vec<LoadFailure>,
}

impl LoadReport {
    /// The catalog, if it loaded.
    pub fn catalog(&self) -> Option<&Catalog> {
        self.documents.iter().find_map(|d| match &d.body {
            SourceBody::Catalog(c) => Some(c),
            SourceBody::Text(_) => None,
        })
    }
}

/// Normalize a provider name: lowercase, trimmed, underscores as spaces.
pub fn normalize_provider(name: &str) -> String {
    name.trim()
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Canonical provider key: lowercase letters and digits only, so "Green Line",
/// "green_line" and "greenline" share one key. Used wherever providers are compared.
pub fn provider_key(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Compare provider names ignoring case, spacing and punctuation ("Green Line" == "greenline").
pub fn same_provider(a: &str, b: &str) -> bool {
    provider_key(a) == provider_key(b)
}

/// Filesystem-backed document store.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    catalog_path: PathBuf,
    profiles_dir: PathBuf,
}

impl DocumentStore {
    pub fn new(catalog_path: impl Into<PathBuf>, profiles_dir: impl Into<PathBuf>) -> Self {
        Self {
            catalog_path: catalog_path.into(),
            profiles_dir: profiles_dir.into(),
        }
    }

    pub fn catalog_path(&self) -> &Path {
        &self.catalog_path
    }

    pub fn profiles_dir(&self) -> &Path {
        &self.profiles_dir
    }

    /// Load every source document, collecting failures instead of aborting.
    #[instrument(skip(self), fields(catalog = ?self.catalog_path, profiles = ?self.profiles_dir))]
    pub fn load(&self) -> LoadReport {
        let mut report = LoadReport::default();

        // Source ids must be unique; the catalog's id is reserved even if it fails to load.
        let mut seen: HashMap<String, PathBuf> = HashMap::new();
        seen.insert(provider_key(CATALOG_SOURCE_ID), self.catalog_path.clone());

        match self.profile_paths() {
            Ok(paths) => {
                for path in paths {
                    let doc = match read_profile_file(&path) {
                        Ok(doc) => doc,
                        Err(reason) => {
                            record_failure(&mut report, path, reason);
                            continue;
                        }
                    };
                    if let Some(first) = seen.get(&provider_key(&doc.id)) {
                        let reason = format!(
                            "source id '{}' is already taken by {}",
                            doc.id,
                            first.display()
                        );
                        record_failure(&mut report, path, reason);
                        continue;
                    }
                    debug!("Loaded profile '{}' from {:?}", doc.id, path);
                    seen.insert(provider_key(&doc.id), path);
                    report.documents.push(doc);
                }
            }
            Err(e) => record_failure(&mut report, self.profiles_dir.clone(), e.to_string()),
        }

        match Catalog::from_path(&self.catalog_path) {
            Ok(catalog) => {
                let mut doc = SourceDocument::catalog(catalog);
                doc.path = self.catalog_path.clone();
                report.documents.push(doc);
            }
            Err(e) => record_failure(&mut report, self.catalog_path.clone(), e.to_string()),
        }

        info!(
            "Loaded {} source documents ({} skipped)",
            report.documents.len(),
            report.failures.len()
        );
        report
    }

    /// Load only the catalog.
    pub fn load_catalog(&self) -> Result<Catalog> {
        Catalog::from_path(&self.catalog_path).map_err(|e| BusbotError::DocumentRead {
            path: self.catalog_path.clone(),
            reason: e.to_string(),
        })
    }

    /// Raw profile text for a provider, if a profile exists.
    pub fn read_profile(&self, provider: &str) -> Result<Option<String>> {
        for path in self.profile_paths()? {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if same_provider(stem, provider) {
                let text = std::fs::read_to_string(&path).map_err(|e| BusbotError::DocumentRead {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
                return Ok(Some(text));
            }
        }
        Ok(None)
    }

    /// All `*.txt` files in the profiles directory, sorted by name.
    fn profile_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.profiles_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "txt"))
            .collect();
        paths.sort();
        Ok(paths)
    }
}

fn record_failure(report: &mut LoadReport, path: PathBuf, reason: String) {
    warn!("Skipping source {:?}: {}", path, reason);
    report.failures.push(LoadFailure { path, reason });
}

fn read_profile_file(path: &Path) -> std::result::Result<SourceDocument, String> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| "file name is not valid UTF-8".to_string())?;

    let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
    let text = String::from_utf8(bytes).map_err(|e| format!("not valid UTF-8: {}", e))?;
    let text = text.trim();
    if text.is_empty() {
        return Err("profile is empty".to_string());
    }

    let mut doc = SourceDocument::profile(stem, text);
    doc.path = path.to_path_buf();
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "districts": [{"name": "Dhaka", "dropping_points": [{"name": "Gabtoli", "price": 100}]}],
        "bus_providers": [{"name": "Hanif", "coverage_districts": ["Dhaka"]}]
    }"#;

    #[test]
    fn test_normalize_provider() {
        assert_eq!(normalize_provider("  Desh_Travel "), "desh travel");
        assert_eq!(normalize_provider("Green  Line"), "green line");
        assert!(same_provider("greenline", "Green Line"));
        assert!(same_provider("Shohagh-Paribahan", "shohagh paribahan"));
        assert!(!same_provider("ena", "hanif"));
        assert_eq!(provider_key("Green_Line"), "greenline");
    }

    #[test]
    fn test_duplicate_source_ids_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let profiles = dir.path().join("attachment");
        std::fs::create_dir(&profiles).unwrap();
        std::fs::write(profiles.join("Green Line.txt"), "Green Line: refund within 24 hours").unwrap();
        std::fs::write(profiles.join("green_line.txt"), "Second copy of the Green Line profile").unwrap();
        std::fs::write(profiles.join("catalog.txt"), "Not the route catalog").unwrap();
        std::fs::write(profiles.join("hanif.txt"), "Hotline: 01713-049530").unwrap();
        let catalog_path = dir.path().join("data.json");
        std::fs::write(&catalog_path, CATALOG).unwrap();

        let report = DocumentStore::new(&catalog_path, &profiles).load();

        let ids: Vec<&str> = report.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["green line", "hanif", CATALOG_SOURCE_ID]);

        let skipped: Vec<String> = report
            .failures
            .iter()
            .filter_map(|f| f.path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        assert_eq!(skipped, vec!["catalog.txt", "green_line.txt"]);
        assert!(report.failures.iter().all(|f| f.reason.contains("already taken")));

        // The first of the colliding profiles wins.
        let green = &report.documents[0];
        assert_eq!(green.body, SourceBody::Text("Green Line: refund within 24 hours".to_string()));
    }

    #[test]
    fn test_load_skips_bad_sources() {
        let dir = tempfile::tempdir().unwrap();
        let profiles = dir.path().join("attachment");
        std::fs::create_dir(&profiles).unwrap();
        std::fs::write(profiles.join("Hanif.txt"), "Hotline: 01713-049530").unwrap();
        std::fs::write(profiles.join("ena.txt"), [0xff, 0xfe, 0x00]).unwrap();
        std::fs::write(profiles.join("empty.txt"), "   \n").unwrap();
        std::fs::write(profiles.join("notes.md"), "ignored").unwrap();
        let catalog_path = dir.path().join("data.json");
        std::fs::write(&catalog_path, CATALOG).unwrap();

        let report = DocumentStore::new(&catalog_path, &profiles).load();

        let ids: Vec<&str> = report.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["hanif", CATALOG_SOURCE_ID]);
        assert_eq!(report.failures.len(), 2);
        assert!(report.catalog().is_some());
    }

    #[test]
    fn test_missing_catalog_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("soudia.txt"), "Soudia policy").unwrap();

        let report = DocumentStore::new(dir.path().join("missing.json"), dir.path()).load();

        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.documents[0].kind(), SourceKind::Profile);
        assert_eq!(report.failures.len(), 1);
        assert!(report.catalog().is_none());
    }

    #[test]
    fn test_read_profile_matches_loosely() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("green line.txt"), "Green Line policy").unwrap();
        let store = DocumentStore::new(dir.path().join("data.json"), dir.path());

        assert_eq!(
            store.read_profile("GreenLine").unwrap().as_deref(),
            Some("Green Line policy")
        );
        assert!(store.read_profile("hanif").unwrap().is_none());
    }
}
