//! Doctor command - verify configuration, documents and the index.

use crate::cli::Output;
use crate::config::Settings;
use crate::documents::DocumentStore;
use crate::embedding::create_embedder;
use crate::vector_store::{SqliteVectorStore, VectorStore};
use console::style;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

/// Run all diagnostic checks.
pub async fn run_doctor(settings: &Settings, config_path: Option<&std::path::Path>) -> anyhow::Result<()> {
    Output::header("busbot Doctor");
    println!();
    println!("Checking configuration, documents and the index...\n");

    let mut checks = Vec::new();

    let sections: [(&str, Vec<CheckResult>); 4] = [
        ("Configuration", check_configuration(settings, config_path)),
        ("API Credentials", check_credentials(settings)),
        ("Documents", check_documents(settings)),
        ("Index", check_index(settings).await),
    ];

    for (title, results) in sections {
        println!("{}", style(title).bold());
        for check in &results {
            check.print();
        }
        println!();
        checks.extend(results);
    }

    // Summary
    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before using busbot.",
            errors
        ));
        anyhow::bail!("doctor found {} error(s)", errors);
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {} warning(s).", warnings));
    } else {
        Output::success("All checks passed! busbot is ready to use.");
    }

    Ok(())
}

fn check_configuration(settings: &Settings, config_path: Option<&std::path::Path>) -> Vec<CheckResult> {
    let mut results = Vec::new();

    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(Settings::default_config_path);
    if path.exists() {
        results.push(CheckResult::ok("Config file", &path.display().to_string()));
    } else {
        results.push(CheckResult::warning(
            "Config file",
            "using defaults",
            &format!("Create {} to override settings", path.display()),
        ));
    }

    match settings.validate() {
        Ok(()) => results.push(CheckResult::ok("Settings", "valid")),
        Err(e) => results.push(CheckResult::error(
            "Settings",
            &e.to_string(),
            "Fix the value in the config file (see 'busbot config show')",
        )),
    }

    results
}

fn check_credentials(settings: &Settings) -> Vec<CheckResult> {
    let mut results = Vec::new();

    if settings.embedding.is_hosted() {
        results.push(check_api_key("Embedding", &settings.embedding.api_key_env));
    } else {
        results.push(CheckResult::ok(
            "Embedding",
            &format!("local '{}' embedder, no credential needed", settings.embedding.provider),
        ));
    }
    results.push(check_api_key("Generation", &settings.generation.api_key_env));

    results
}

/// Check that an API key variable is set, showing only a masked form.
fn check_api_key(name: &str, var: &str) -> CheckResult {
    match std::env::var(var) {
        Ok(key) if key.trim().is_empty() => {
            CheckResult::error(name, &format!("{} is empty", var), &format!("Set with: export {}='...'", var))
        }
        Ok(key) => CheckResult::ok(name, &format!("{} configured ({})", var, mask_key(&key))),
        Err(_) => CheckResult::error(
            name,
            &format!("{} not set", var),
            &format!("Set with: export {}='...'", var),
        ),
    }
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.trim().chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

fn check_documents(settings: &Settings) -> Vec<CheckResult> {
    let store = DocumentStore::new(settings.catalog_path(), settings.profiles_dir());
    let report = store.load();

    let mut results = Vec::new();

    match report.catalog() {
        Some(catalog) => results.push(CheckResult::ok(
            "Catalog",
            &format!(
                "{} ({} districts, {} providers)",
                store.catalog_path().display(),
                catalog.districts.len(),
                catalog.bus_providers.len()
            ),
        )),
        None => results.push(CheckResult::error(
            "Catalog",
            &format!("{} could not be loaded", store.catalog_path().display()),
            "Set documents.catalog_path to the route and fare JSON file",
        )),
    }

    let profiles = report.documents.len() - usize::from(report.catalog().is_some());
    if profiles > 0 {
        results.push(CheckResult::ok(
            "Provider profiles",
            &format!("{} in {}", profiles, store.profiles_dir().display()),
        ));
    } else {
        results.push(CheckResult::warning(
            "Provider profiles",
            &format!("none found in {}", store.profiles_dir().display()),
            "Place one <provider>.txt file per bus provider in documents.profiles_dir",
        ));
    }

    for failure in &report.failures {
        if failure.path.as_path() != store.catalog_path() {
            results.push(CheckResult::warning(
                "Skipped",
                &format!("{}: {}", failure.path.display(), failure.reason),
                "This document will be left out of the index",
            ));
        }
    }

    results
}

async fn check_index(settings: &Settings) -> Vec<CheckResult> {
    let db_path = settings.sqlite_path();
    if !db_path.exists() {
        return vec![CheckResult::warning(
            "Index",
            &format!("{} (not created yet)", db_path.display()),
            "Build it with: busbot ingest",
        )];
    }

    let mut results = Vec::new();
    let size = std::fs::metadata(&db_path)
        .map(|m| format_size(m.len()))
        .unwrap_or_else(|_| "unknown size".to_string());

    let store = match SqliteVectorStore::new(&db_path) {
        Ok(store) => store,
        Err(e) => {
            return vec![CheckResult::error(
                "Index",
                &e.to_string(),
                "Remove the file and run: busbot ingest",
            )]
        }
    };

    let entries = store.entry_count().await.unwrap_or(0);
    results.push(CheckResult::ok(
        "Index",
        &format!("{} ({}, {} entries)", db_path.display(), size, entries),
    ));

    let configured = create_embedder(settings).map(|e| e.model_id());
    match (store.indexed_model().await, configured) {
        (Ok(Some(indexed)), Ok(configured)) if indexed.model_id != configured => {
            results.push(CheckResult::error(
                "Embedding model",
                &format!("index built with '{}', configured '{}'", indexed.model_id, configured),
                "Rebuild with: busbot reindex",
            ))
        }
        (Ok(Some(indexed)), _) => {
            results.push(CheckResult::ok("Embedding model", &indexed.model_id))
        }
        (Ok(None), _) => results.push(CheckResult::warning(
            "Embedding model",
            "not recorded (empty index)",
            "Build the index with: busbot ingest",
        )),
        (Err(e), _) => results.push(CheckResult::error(
            "Embedding model",
            &e.to_string(),
            "Rebuild with: busbot reindex",
        )),
    }

    results
}

/// Format file size in human-readable format.
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_result_error() {
        let result = CheckResult::error("test", "failed", "fix it");
        assert_eq!(result.status, CheckStatus::Error);
        assert_eq!(result.hint, Some("fix it".to_string()));
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("AIzaSyD-1234567890abcd"), "AIza...abcd");
        assert_eq!(mask_key("short"), "*****");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
    }

    #[tokio::test]
    async fn test_missing_index_is_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.vector_store.sqlite_path = dir.path().join("index.db").display().to_string();

        let results = check_index(&settings).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, CheckStatus::Warning);
    }
}
