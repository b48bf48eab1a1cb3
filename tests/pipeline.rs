//! End-to-end walks through the library with the in-memory legacy store and
//! repository.
#![cfg(unix)]

use std::fs::{self, File};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use drl_migrate::catalog::Catalog;
use drl_migrate::config::{DerivativePolicy, MigrationConfig};
use drl_migrate::derivative::DerivativeGenerator;
use drl_migrate::legacy::MemoryLegacyStore;
use drl_migrate::models::{FileUse, LegacyFile, LegacyItem, Pid};
use drl_migrate::progress::{NoProgress, ProgressReporter, WalkEvent};
use drl_migrate::repository::MemoryRepository;
use drl_migrate::router::ObjectRouter;
use drl_migrate::summary::ItemStatus;
use drl_migrate::walker::walk_collection;
use tempfile::TempDir;

const JP2_ENCODER: &str = r#"out="${1%.*}.jp2"; cp "$1" "$out" && echo "$out""#;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

struct Env {
    tmp: TempDir,
    legacy: MemoryLegacyStore,
    repo: MemoryRepository,
    catalog: Catalog,
    generator: DerivativeGenerator,
    settings: MigrationConfig,
}

impl Env {
    fn new(encoder_body: &str, policy: DerivativePolicy) -> Self {
        let tmp = TempDir::new().unwrap();
        let encoder = write_script(tmp.path(), "encodeJp2", encoder_body);
        let scratch = tmp.path().join("scratch");
        fs::create_dir_all(&scratch).unwrap();
        let settings = MigrationConfig {
            scratch_dir: scratch.clone(),
            encoder: encoder.clone(),
            on_derivative_failure: policy,
            ..MigrationConfig::default()
        };
        Self {
            generator: DerivativeGenerator::new(encoder, scratch),
            tmp,
            legacy: MemoryLegacyStore::new(),
            repo: MemoryRepository::new(),
            catalog: Catalog::default(),
            settings,
        }
    }

    fn router(&self) -> ObjectRouter<'_> {
        ObjectRouter {
            catalog: &self.catalog,
            legacy: &self.legacy,
            repo: &self.repo,
            generator: &self.generator,
            settings: &self.settings,
        }
    }

    fn item(&mut self, id: &str, name: &str, type_name: &str, collection: &str) {
        self.legacy.add_item(LegacyItem {
            id: id.into(),
            name: name.into(),
            type_name: type_name.into(),
            collection_id: collection.into(),
        });
    }

    fn file(&mut self, id: &str, file_use: FileUse, name: &str, body: &[u8]) {
        let dir = self.tmp.path().join("items").join(id);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        self.legacy.add_file(LegacyFile {
            item_id: id.into(),
            file_use,
            path,
            name: name.into(),
        });
    }

    fn base(&mut self, id: &str) {
        self.file(id, FileUse::Mods, "mods.xml", b"<mods/>");
        self.file(id, FileUse::Dc, "dc.xml", b"<oai_dc:dc/>");
        self.file(id, FileUse::Thumb, "tn.jpg", b"\xff\xd8");
    }

    fn ocr(&mut self, id: &str, pages: &[(&str, &str)]) {
        let dir = self.tmp.path().join("items").join(id);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("ocr.zip");
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        for (name, text) in pages {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(text.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
        self.legacy.add_file(LegacyFile {
            item_id: id.into(),
            file_use: FileUse::OcrZip,
            path,
            name: "ocr.zip".into(),
        });
    }

    fn scratch_is_empty(&self) -> bool {
        fs::read_dir(&self.settings.scratch_dir)
            .unwrap()
            .next()
            .is_none()
    }
}

fn mets(pages: &[(&str, &str)]) -> Vec<u8> {
    let mut files = String::new();
    let mut divs = String::new();
    for (i, (name, label)) in pages.iter().enumerate() {
        files.push_str(&format!(
            r#"<file ID="IMG{i}" MIMETYPE="image/tiff"><FLocat LOCTYPE="URL" xlink:href="file://images/{name}"/></file>"#
        ));
        divs.push_str(&format!(
            r#"<div ORDER="{i}" TYPE="page" LABEL="{label}"><fptr FILEID="IMG{i}"/></div>"#
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<mets xmlns="http://www.loc.gov/METS/" xmlns:xlink="http://www.w3.org/1999/xlink">
  <fileSec><fileGrp USE="master">{files}</fileGrp></fileSec>
  <structMap TYPE="physical"><div TYPE="volume">{divs}</div></structMap>
</mets>"#
    )
    .into_bytes()
}

#[derive(Default)]
struct Recorder(Mutex<Vec<WalkEvent>>);

impl ProgressReporter for Recorder {
    fn report(&self, event: WalkEvent) {
        self.0.lock().unwrap().push(event);
    }
}

#[tokio::test]
async fn test_book_collection_is_migrated_once() {
    let mut env = Env::new(JP2_ENCODER, DerivativePolicy::Skip);
    env.item("bk1", "Pittsburgh City Directory 1889", "text - cataloged", "pitttext");
    env.base("bk1");
    env.file("bk1", FileUse::MarcXml, "marc.xml", b"<record/>");
    env.file(
        "bk1",
        FileUse::Mets,
        "mets.xml",
        &mets(&[
            ("00000001.tif", "r0001"),
            ("00000002.tif", "unum"),
            ("00000003.tif", "1"),
        ]),
    );
    for page in ["00000001.tif", "00000002.tif", "00000003.tif"] {
        env.file("bk1", FileUse::Master, page, page.as_bytes());
    }
    env.ocr(
        "bk1",
        &[
            ("00000001.txt", "Preface. "),
            ("00000002.txt", "Plate. "),
            ("00000003.txt", "Abbott, John"),
        ],
    );

    let recorder = Recorder::default();
    let summary = walk_collection(&env.router(), "pitttext", &recorder)
        .await
        .unwrap();
    assert_eq!(summary.count(ItemStatus::Migrated), 1);
    assert!(summary.is_success());

    let book = Pid::from("hpitt:bk1");
    assert_eq!(
        env.repo.created_pids(),
        vec![
            book.clone(),
            Pid::from("hpitt:bk1-00000001"),
            Pid::from("hpitt:bk1-00000002"),
            Pid::from("hpitt:bk1-00000003"),
        ]
    );
    assert_eq!(
        env.repo.object(&Pid::from("hpitt:bk1-00000001")).unwrap().label,
        "Page I, Pittsburgh City Directory 1889"
    );
    assert_eq!(
        env.repo.object(&Pid::from("hpitt:bk1-00000002")).unwrap().label,
        "[unnumbered page (00000002)], Pittsburgh City Directory 1889"
    );
    assert_eq!(
        env.repo.datastream(&book, "BOOKOCR").unwrap().text(),
        "Preface. Plate. Abbott, John"
    );
    assert!(env.scratch_is_empty());
    assert_eq!(recorder.0.lock().unwrap().len(), 2);

    let writes = env.repo.write_count();
    let again = walk_collection(&env.router(), "pitttext", &NoProgress)
        .await
        .unwrap();
    assert_eq!(again.count(ItemStatus::AlreadyPresent), 1);
    assert_eq!(env.repo.write_count(), writes);
}

#[tokio::test]
async fn test_mixed_collection_summary() {
    let mut env = Env::new(JP2_ENCODER, DerivativePolicy::Skip);
    env.item("a", "Flood, 1936", "image", "flood");
    env.base("a");
    env.file("a", FileUse::Master, "a.tif", b"tiff");

    env.item("b", "No descriptive metadata", "image", "flood");
    env.file("b", FileUse::Dc, "dc.xml", b"<dc/>");
    env.file("b", FileUse::Thumb, "tn.jpg", b"jpg");

    env.item("c", "Flood map", "map", "flood");
    env.base("c");

    env.item("d", "Audio", "sound", "flood");
    env.base("d");

    let summary = walk_collection(&env.router(), "flood", &NoProgress)
        .await
        .unwrap();
    assert_eq!(summary.records.len(), 4);
    assert_eq!(summary.count(ItemStatus::Migrated), 1);
    assert_eq!(summary.count(ItemStatus::Skipped), 2);
    assert_eq!(summary.count(ItemStatus::Incomplete), 1);
    assert!(!summary.is_success());

    let mut out = Vec::new();
    summary.write_to(&mut out).unwrap();
    let report = String::from_utf8(out).unwrap();
    assert!(report.contains("skipped b"));
    assert!(report.contains("no MODS file"));
    assert!(report.contains("incomplete c (hpitt:c)"));
    assert!(report.contains("'sound'"));

    assert!(env.repo.object(&Pid::from("hpitt:b")).is_none());
    assert!(env.repo.object(&Pid::from("hpitt:d")).is_none());
}

#[tokio::test]
async fn test_encoder_failure_policy() {
    let mut skip = Env::new("exit 3", DerivativePolicy::Skip);
    skip.item("a", "Flood", "image", "flood");
    skip.base("a");
    skip.file("a", FileUse::Master, "a.tif", b"tiff");
    let summary = walk_collection(&skip.router(), "flood", &NoProgress)
        .await
        .unwrap();
    assert_eq!(summary.count(ItemStatus::Incomplete), 1);
    let pid = Pid::from("hpitt:a");
    assert!(skip.repo.datastream(&pid, "TIFF").is_some());
    assert!(skip.repo.datastream(&pid, "JP2").is_none());
    assert!(skip.scratch_is_empty());

    let mut abort = Env::new("exit 3", DerivativePolicy::Abort);
    abort.item("a", "Flood", "image", "flood");
    abort.base("a");
    abort.file("a", FileUse::Master, "a.tif", b"tiff");
    let summary = walk_collection(&abort.router(), "flood", &NoProgress)
        .await
        .unwrap();
    assert_eq!(summary.count(ItemStatus::Failed), 1);
    assert!(summary.records[0].reasons[0].contains("derivative generation failed"));
}

#[tokio::test]
async fn test_book_with_unlabelled_page_is_incomplete() {
    let mut env = Env::new(JP2_ENCODER, DerivativePolicy::Skip);
    env.item("bk2", "Atlas", "text - uncataloged", "pitttext");
    env.base("bk2");
    env.file(
        "bk2",
        FileUse::Mets,
        "mets.xml",
        &mets(&[("00000001.tif", "5")]),
    );
    env.file("bk2", FileUse::Master, "00000001.tif", b"p1");
    env.file("bk2", FileUse::Master, "00000002.tif", b"p2");

    let summary = walk_collection(&env.router(), "pitttext", &NoProgress)
        .await
        .unwrap();
    let record = &summary.records[0];
    assert_eq!(record.status, ItemStatus::Incomplete);
    assert_eq!(record.reasons.len(), 1);
    assert!(record.reasons[0].contains("00000002"));
    assert!(env.repo.object(&Pid::from("hpitt:bk2-00000001")).is_some());
    assert!(env.repo.object(&Pid::from("hpitt:bk2-00000002")).is_none());
}
