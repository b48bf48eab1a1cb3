//! `drl-migrate check`: verify the environment before a run.

use std::path::Path;

use anyhow::Result;

use crate::config::Config;
use crate::legacy::SqliteLegacyStore;
use crate::repository::{FedoraClient, Repository};

/// Outcome of one environment check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: &'static str,
    pub ok: bool,
    pub detail: String,
}

impl CheckResult {
    fn new(name: &'static str, outcome: std::result::Result<String, String>) -> Self {
        match outcome {
            Ok(detail) => Self {
                name,
                ok: true,
                detail,
            },
            Err(detail) => Self {
                name,
                ok: false,
                detail,
            },
        }
    }
}

/// Run every check, print a table, and report whether all passed.
pub async fn run_check(config: &Config) -> Result<bool> {
    let results = vec![
        CheckResult::new("legacy", check_legacy(config).await),
        CheckResult::new("repository", check_repository(config).await),
        CheckResult::new("encoder", check_encoder(&config.migration.encoder)),
        CheckResult::new("scratch", check_scratch(&config.migration.scratch_dir)),
    ];

    println!("{:<12} {:<8} DETAIL", "CHECK", "STATUS");
    for r in &results {
        println!(
            "{:<12} {:<8} {}",
            r.name,
            if r.ok { "OK" } else { "FAIL" },
            r.detail
        );
    }
    Ok(results.iter().all(|r| r.ok))
}

async fn check_legacy(config: &Config) -> std::result::Result<String, String> {
    let store = SqliteLegacyStore::open(&config.legacy.path)
        .await
        .map_err(|e| e.to_string())?;
    let count = store.item_count().await.map_err(|e| e.to_string())?;
    store.close().await;
    Ok(format!("{} ({} items)", config.legacy.path.display(), count))
}

async fn check_repository(config: &Config) -> std::result::Result<String, String> {
    let repo_cfg = &config.repository;
    let password = repo_cfg.password().map_err(|e| e.to_string())?;
    let client = FedoraClient::new(
        &repo_cfg.url,
        &repo_cfg.username,
        &password,
        repo_cfg.timeout(),
    )
    .map_err(|e| e.to_string())?;
    client.ping().await.map_err(|e| e.to_string())?;
    Ok(client.base_url().to_string())
}

pub(crate) fn check_encoder(encoder: &Path) -> std::result::Result<String, String> {
    if encoder.is_file() {
        Ok(encoder.display().to_string())
    } else {
        Err(format!("{} not found", encoder.display()))
    }
}

pub(crate) fn check_scratch(dir: &Path) -> std::result::Result<String, String> {
    std::fs::create_dir_all(dir).map_err(|e| format!("{}: {}", dir.display(), e))?;
    tempfile::tempfile_in(dir).map_err(|e| format!("{} not writable: {}", dir.display(), e))?;
    Ok(dir.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_encoder_fails() {
        let tmp = TempDir::new().unwrap();
        assert!(check_encoder(&tmp.path().join("encodeJp2")).is_err());
        let enc = tmp.path().join("encodeJp2");
        std::fs::write(&enc, "#!/bin/sh\n").unwrap();
        assert!(check_encoder(&enc).is_ok());
    }

    #[test]
    fn scratch_dir_is_created_and_writable() {
        let tmp = TempDir::new().unwrap();
        let scratch = tmp.path().join("a").join("b");
        assert!(check_scratch(&scratch).is_ok());
        assert!(scratch.is_dir());
        assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);
    }
}
