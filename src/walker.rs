//! Collection walk: route every item of a collection in id order.
//!
//! One item's failure never stops the walk; it is recorded in the
//! [`MigrationSummary`] and the next item is routed. Only a failure to list
//! the collection itself is returned as an error.

use tracing::{error, info, warn};

use crate::error::MigrationError;
use crate::models::LegacyItem;
use crate::progress::{ProgressReporter, WalkEvent};
use crate::router::ObjectRouter;
use crate::summary::{ItemRecord, ItemStatus, MigrationSummary};

pub async fn walk_collection(
    router: &ObjectRouter<'_>,
    collection_id: &str,
    progress: &dyn ProgressReporter,
) -> Result<MigrationSummary, MigrationError> {
    let items = router.legacy.collection_items(collection_id).await?;
    let total = items.len() as u64;
    info!(collection = collection_id, items = total, "walking collection");
    if items.is_empty() {
        warn!(collection = collection_id, "collection has no items");
    }
    progress.report(WalkEvent::Started {
        collection: collection_id.to_string(),
        total,
    });

    let mut summary = MigrationSummary::new(format!("collection {}", collection_id));
    for (i, item) in items.iter().enumerate() {
        let record = migrate_one(router, item).await;
        progress.report(WalkEvent::Item {
            collection: collection_id.to_string(),
            item: item.id.clone(),
            n: i as u64 + 1,
            total,
            status: record.status.as_str(),
        });
        summary.push(record);
    }
    summary.finish();
    info!(
        collection = collection_id,
        migrated = summary.count(ItemStatus::Migrated),
        failed = summary.count(ItemStatus::Failed),
        "walk finished"
    );
    Ok(summary)
}

/// Route a single item and classify the result.
pub async fn migrate_one(router: &ObjectRouter<'_>, item: &LegacyItem) -> ItemRecord {
    let result = router.route_item(item).await;
    if let Err(e) = &result {
        if e.is_skip() {
            warn!(item = %item.id, reason = %e, "item skipped");
        } else {
            error!(item = %item.id, error = %e, "item failed");
        }
    }
    ItemRecord::from_result(&item.id, result)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::config::MigrationConfig;
    use crate::derivative::tests::{script, JP2_ENCODER};
    use crate::derivative::DerivativeGenerator;
    use crate::legacy::MemoryLegacyStore;
    use crate::models::{FileUse, LegacyFile, Pid};
    use crate::progress::ProgressReporter;
    use crate::repository::MemoryRepository;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<WalkEvent>>);

    impl ProgressReporter for Recorder {
        fn report(&self, event: WalkEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn add_image(legacy: &mut MemoryLegacyStore, tmp: &TempDir, id: &str, with_mods: bool) {
        legacy.add_item(LegacyItem {
            id: id.into(),
            name: format!("Image {}", id),
            type_name: "image".into(),
            collection_id: "flood".into(),
        });
        let mut uses = vec![
            (FileUse::Dc, "dc.xml"),
            (FileUse::Thumb, "tn.jpg"),
            (FileUse::Master, "master.tif"),
        ];
        if with_mods {
            uses.push((FileUse::Mods, "mods.xml"));
        }
        for (file_use, name) in uses {
            let path = tmp.path().join(format!("{}-{}", id, name));
            std::fs::write(&path, name).unwrap();
            legacy.add_file(LegacyFile {
                item_id: id.into(),
                file_use,
                path,
                name: name.into(),
            });
        }
    }

    #[tokio::test]
    async fn one_bad_item_does_not_stop_the_walk() {
        let tmp = TempDir::new().unwrap();
        let encoder = script(tmp.path(), "encodeJp2", JP2_ENCODER);
        let scratch = tmp.path().join("scratch");
        let mut legacy = MemoryLegacyStore::new();
        add_image(&mut legacy, &tmp, "i1", true);
        add_image(&mut legacy, &tmp, "i2", false);
        add_image(&mut legacy, &tmp, "i3", true);
        let repo = MemoryRepository::new();
        let catalog = Catalog::default();
        let generator = DerivativeGenerator::new(&encoder, &scratch);
        let settings = MigrationConfig {
            scratch_dir: scratch,
            encoder,
            ..MigrationConfig::default()
        };
        let router = ObjectRouter {
            catalog: &catalog,
            legacy: &legacy,
            repo: &repo,
            generator: &generator,
            settings: &settings,
        };
        let recorder = Recorder::default();

        let summary = walk_collection(&router, "flood", &recorder).await.unwrap();
        assert_eq!(summary.records.len(), 3);
        assert_eq!(summary.count(ItemStatus::Migrated), 2);
        assert_eq!(summary.count(ItemStatus::Skipped), 1);
        assert_eq!(summary.records[1].item_id, "i2");
        assert!(summary.is_success());
        assert_eq!(
            repo.created_pids(),
            vec![Pid::from("hpitt:i1"), Pid::from("hpitt:i3")]
        );

        let events = recorder.0.lock().unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[2],
            WalkEvent::Item {
                collection: "flood".into(),
                item: "i2".into(),
                n: 2,
                total: 3,
                status: "skipped",
            }
        );
        drop(events);

        let again = walk_collection(&router, "flood", &recorder).await.unwrap();
        assert_eq!(again.count(ItemStatus::AlreadyPresent), 2);
        assert_eq!(repo.created_pids().len(), 2);
    }
}
