//! `drl-migrate migrate` command orchestration.
//!
//! Opens the legacy store, connects to the repository (one ping, fatal on
//! failure), then walks a collection or routes a single item and prints the
//! run summary. `--dry-run` never contacts the repository.

use std::io::Write;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::config::Config;
use crate::derivative::DerivativeGenerator;
use crate::legacy::{LegacyStore, SqliteLegacyStore};
use crate::models::LegacyItem;
use crate::progress::ProgressMode;
use crate::repository::{FedoraClient, Repository};
use crate::router::{plan_item, ObjectRouter};
use crate::summary::MigrationSummary;
use crate::walker;

/// Migrate every item of `collection`. Returns whether the run succeeded
/// (no failed or incomplete items).
pub async fn run_collection(
    config: &Config,
    collection: &str,
    dry_run: bool,
    progress: ProgressMode,
) -> Result<bool> {
    let legacy = open_legacy(config).await?;
    if dry_run {
        let items = legacy.collection_items(collection).await?;
        print_plan(config, &legacy, &items).await?;
        return Ok(true);
    }

    let repo = connect(config).await?;
    let generator = generator(config)?;
    let catalog = config.catalog();
    let router = ObjectRouter {
        catalog: &catalog,
        legacy: &legacy,
        repo: &repo,
        generator: &generator,
        settings: &config.migration,
    };
    let reporter = progress.reporter();
    let summary = walker::walk_collection(&router, collection, reporter.as_ref()).await?;
    summary.print();
    Ok(summary.is_success())
}

/// Migrate one item by id.
pub async fn run_item(config: &Config, item_id: &str, dry_run: bool) -> Result<bool> {
    let legacy = open_legacy(config).await?;
    let Some(item) = legacy.item(item_id).await? else {
        bail!("item '{}' not found in {}", item_id, config.legacy.path.display());
    };
    if dry_run {
        print_plan(config, &legacy, std::slice::from_ref(&item)).await?;
        return Ok(true);
    }

    let repo = connect(config).await?;
    let generator = generator(config)?;
    let catalog = config.catalog();
    let router = ObjectRouter {
        catalog: &catalog,
        legacy: &legacy,
        repo: &repo,
        generator: &generator,
        settings: &config.migration,
    };
    let mut summary = MigrationSummary::new(format!("item {}", item_id));
    summary.push(walker::migrate_one(&router, &item).await);
    summary.finish();
    summary.print();
    Ok(summary.is_success())
}

async fn open_legacy(config: &Config) -> Result<SqliteLegacyStore> {
    SqliteLegacyStore::open(&config.legacy.path)
        .await
        .with_context(|| {
            format!(
                "failed to open legacy database {}",
                config.legacy.path.display()
            )
        })
}

async fn connect(config: &Config) -> Result<FedoraClient> {
    let repo_cfg = &config.repository;
    let password = repo_cfg.password()?;
    let client = FedoraClient::new(
        &repo_cfg.url,
        &repo_cfg.username,
        &password,
        repo_cfg.timeout(),
    )?;
    client
        .ping()
        .await
        .with_context(|| format!("cannot reach repository at {}", client.base_url()))?;
    info!(url = client.base_url(), "repository reachable");
    Ok(client)
}

fn generator(config: &Config) -> Result<DerivativeGenerator> {
    let scratch = &config.migration.scratch_dir;
    std::fs::create_dir_all(scratch)
        .with_context(|| format!("cannot create scratch directory {}", scratch.display()))?;
    let encoder = &config.migration.encoder;
    if !encoder.is_file() {
        tracing::warn!(
            encoder = %encoder.display(),
            "JP2 encoder not found; derivatives will fail"
        );
    }
    Ok(DerivativeGenerator::new(encoder, scratch))
}

async fn print_plan(
    config: &Config,
    legacy: &dyn LegacyStore,
    items: &[LegacyItem],
) -> Result<()> {
    let catalog = config.catalog();
    let mut out = Vec::new();
    writeln!(
        out,
        "{:<16} {:<28} {:<36} {:>7}  MISSING",
        "ITEM", "PID", "CONTENT MODEL", "MASTERS"
    )?;
    for item in items {
        match plan_item(&catalog, legacy, item).await {
            Ok(plan) => {
                let missing = plan
                    .missing
                    .iter()
                    .map(|u| u.as_str())
                    .collect::<Vec<_>>()
                    .join(",");
                writeln!(
                    out,
                    "{:<16} {:<28} {:<36} {:>7}  {}",
                    item.id,
                    plan.pid.as_str(),
                    plan.content_model,
                    plan.masters,
                    if missing.is_empty() { "-" } else { missing.as_str() }
                )?;
            }
            Err(e) if e.is_skip() => writeln!(out, "{:<16} skip: {}", item.id, e)?,
            Err(e) => return Err(e.into()),
        }
    }
    writeln!(out, "{} item(s); dry run, nothing written", items.len())?;
    std::io::stdout().lock().write_all(&out)?;
    Ok(())
}
