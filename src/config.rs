use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::Catalog;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub legacy: LegacyConfig,
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub migration: MigrationConfig,
    #[serde(default)]
    pub namespaces: BTreeMap<String, String>,
    #[serde(default)]
    pub content_models: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LegacyConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepositoryConfig {
    pub url: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_password_env")]
    pub password_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_username() -> String {
    "fedoraAdmin".to_string()
}
fn default_password_env() -> String {
    "FEDORA_PASSWORD".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}

/// What to do when the JP2 encoder fails for a page or image.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DerivativePolicy {
    /// Record the page as incomplete and carry on.
    #[default]
    Skip,
    /// Fail the whole item.
    Abort,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MigrationConfig {
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    #[serde(default = "default_encoder")]
    pub encoder: PathBuf,
    #[serde(default)]
    pub on_derivative_failure: DerivativePolicy,
    #[serde(default = "default_object_label_max")]
    pub object_label_max: usize,
    #[serde(default = "default_page_book_label_max")]
    pub page_book_label_max: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            encoder: default_encoder(),
            on_derivative_failure: DerivativePolicy::Skip,
            object_label_max: default_object_label_max(),
            page_book_label_max: default_page_book_label_max(),
        }
    }
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("drl-migrate")
}
fn default_encoder() -> PathBuf {
    PathBuf::from("/usr/local/dlxs/prep/i/image/encodeJp2")
}
fn default_object_label_max() -> usize {
    245
}
fn default_page_book_label_max() -> usize {
    205
}

impl Config {
    pub fn catalog(&self) -> Catalog {
        Catalog::new(self.namespaces.clone(), self.content_models.clone())
    }
}

impl RepositoryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Read the repository password from the configured environment variable.
    pub fn password(&self) -> Result<String> {
        std::env::var(&self.password_env).with_context(|| {
            format!(
                "repository password not set: export {} before running",
                self.password_env
            )
        })
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate repository
    let url = config.repository.url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("repository.url must be an http(s) URL, got '{}'", url);
    }
    if config.repository.timeout_secs == 0 {
        bail!("repository.timeout_secs must be > 0");
    }

    // Validate label limits
    if config.migration.object_label_max == 0 || config.migration.page_book_label_max == 0 {
        bail!("migration label limits must be > 0");
    }

    // Validate lookup tables
    let catalog = config.catalog();
    for (key, value) in catalog.entries() {
        if value.trim().is_empty() {
            bail!("empty mapping for '{}' in [namespaces]/[content_models]", key);
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("drl-migrate.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            &tmp,
            r#"
[legacy]
path = "./workflow.sqlite"

[repository]
url = "http://localhost:8080/fedora"
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.repository.username, "fedoraAdmin");
        assert_eq!(cfg.repository.password_env, "FEDORA_PASSWORD");
        assert_eq!(cfg.migration.object_label_max, 245);
        assert_eq!(cfg.migration.page_book_label_max, 205);
        assert_eq!(cfg.migration.on_derivative_failure, DerivativePolicy::Skip);
        assert_eq!(cfg.catalog().namespace_for("flood").unwrap(), "hpitt");
    }

    #[test]
    fn overrides_are_applied() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            &tmp,
            r#"
[legacy]
path = "./workflow.sqlite"

[repository]
url = "https://repo.example.edu/fedora"

[migration]
encoder = "/opt/bin/encodeJp2"
on_derivative_failure = "abort"

[namespaces]
newcoll = "pitt"

[content_models]
"image" = "islandora:largeImageCModel"
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.migration.encoder, PathBuf::from("/opt/bin/encodeJp2"));
        assert_eq!(cfg.migration.on_derivative_failure, DerivativePolicy::Abort);
        let catalog = cfg.catalog();
        assert_eq!(catalog.namespace_for("newcoll").unwrap(), "pitt");
        assert_eq!(
            catalog.content_model_for("image").unwrap(),
            "islandora:largeImageCModel"
        );
    }

    #[test]
    fn non_http_url_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            &tmp,
            "[legacy]\npath = \"x\"\n[repository]\nurl = \"ftp://host\"\n",
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn empty_mapping_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            &tmp,
            "[legacy]\npath = \"x\"\n[repository]\nurl = \"http://h\"\n[namespaces]\nflood = \" \"\n",
        );
        assert!(load_config(&path).is_err());
    }
}
