//! Per-item routing.
//!
//! Resolves an item's namespace and content model, retrieves or creates its
//! base object (MODS, DC and thumbnail), then hands it to the handler for its
//! type: large images and maps get TIFF + JP2, texts and manuscripts are
//! split into page objects by the [`PageAssembler`].

use std::path::Path;

use tracing::{debug, info, warn};

use crate::archive::OcrArchive;
use crate::assembler::{attach_jp2, BookAggregate, PageAssembler};
use crate::catalog::Catalog;
use crate::config::{DerivativePolicy, MigrationConfig};
use crate::derivative::DerivativeGenerator;
use crate::error::MigrationError;
use crate::legacy::LegacyStore;
use crate::models::{
    dsid, shorten, ControlGroup, DatastreamSpec, FileUse, ItemKind, LegacyFile, LegacyItem,
    ObjectSpec, Pid, RepositoryObject,
};
use crate::repository::Repository;
use crate::structure::{self, PageLabelMap};

/// How an item ended up when routing did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Base object and every type-specific datastream written.
    Migrated { pid: Pid },
    /// The pid already existed; nothing was written.
    AlreadyPresent { pid: Pid },
    /// The object exists but some pages or datastreams are missing.
    Incomplete { pid: Pid, issues: Vec<String> },
}

/// Result of retrieve-or-create on the base object.
#[derive(Debug)]
pub enum BaseObject {
    Existing(RepositoryObject),
    Created {
        object: RepositoryObject,
        issues: Vec<String>,
    },
}

/// What `--dry-run` reports for an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemPlan {
    pub pid: Pid,
    pub content_model: String,
    pub missing: Vec<FileUse>,
    pub masters: usize,
}

const REQUIRED_USES: [FileUse; 3] = [FileUse::Mods, FileUse::Dc, FileUse::Thumb];

/// Resolve where an item would go without touching the repository.
pub async fn plan_item(
    catalog: &Catalog,
    legacy: &dyn LegacyStore,
    item: &LegacyItem,
) -> Result<ItemPlan, MigrationError> {
    let ns = catalog.namespace_for(&item.collection_id)?;
    let cm = catalog.content_model_for(&item.type_name)?;
    let mut missing = Vec::new();
    for file_use in REQUIRED_USES {
        if legacy.file(&item.id, &file_use).await?.is_none() {
            missing.push(file_use);
        }
    }
    let masters = legacy.files(&item.id, &FileUse::Master).await?.len();
    Ok(ItemPlan {
        pid: Pid::base(ns, &item.id),
        content_model: cm.to_string(),
        missing,
        masters,
    })
}

pub struct ObjectRouter<'a> {
    pub catalog: &'a Catalog,
    pub legacy: &'a dyn LegacyStore,
    pub repo: &'a dyn Repository,
    pub generator: &'a DerivativeGenerator,
    pub settings: &'a MigrationConfig,
}

impl ObjectRouter<'_> {
    /// Migrate one item. `Err` means the item was skipped
    /// ([`MigrationError::is_skip`]) or failed.
    pub async fn route_item(&self, item: &LegacyItem) -> Result<ItemOutcome, MigrationError> {
        let ns = self.catalog.namespace_for(&item.collection_id)?;
        let cm = self.catalog.content_model_for(&item.type_name)?;
        info!(item = %item.id, namespace = ns, content_model = cm, "routing item");

        let (object, mut issues) = match self.retrieve_or_create(item, ns, cm).await? {
            BaseObject::Existing(object) => {
                info!(item = %item.id, pid = %object.pid, "object already exists; skipping");
                return Ok(ItemOutcome::AlreadyPresent { pid: object.pid });
            }
            BaseObject::Created { object, issues } => (object, issues),
        };

        match item.kind() {
            Some(ItemKind::Image) | Some(ItemKind::Map) => {
                self.handle_image(&object, item, &mut issues).await?
            }
            Some(ItemKind::TextCataloged) | Some(ItemKind::TextUncataloged) => {
                self.handle_text(&object, item, &mut issues).await?
            }
            Some(ItemKind::Manuscript) => self.handle_manuscript(&object, item, &mut issues).await?,
            None => warn!(
                item = %item.id,
                type_name = %item.type_name,
                "no handler for item type; only the base object was created"
            ),
        }

        if issues.is_empty() {
            info!(item = %item.id, pid = %object.pid, "item migrated");
            Ok(ItemOutcome::Migrated { pid: object.pid })
        } else {
            warn!(item = %item.id, pid = %object.pid, issues = issues.len(), "item incomplete");
            Ok(ItemOutcome::Incomplete {
                pid: object.pid,
                issues,
            })
        }
    }

    /// Return the existing object at the item's pid, or create it with its
    /// MODS, DC and TN datastreams. Nothing is written unless all three
    /// source files are present.
    pub async fn retrieve_or_create(
        &self,
        item: &LegacyItem,
        ns: &str,
        cm: &str,
    ) -> Result<BaseObject, MigrationError> {
        let pid = Pid::base(ns, &item.id);
        if let Some(existing) = self.repo.find_object(&pid).await? {
            return Ok(BaseObject::Existing(existing));
        }

        let mods = self.required_file(item, FileUse::Mods).await?;
        let dc = self.required_file(item, FileUse::Dc).await?;
        let thumb = self.required_file(item, FileUse::Thumb).await?;

        let label = shorten(&item.name, self.settings.object_label_max);
        let spec = ObjectSpec::base(pid, label, &Pid::root(ns), cm);
        let object = self.repo.create_object(&spec).await?;
        debug!(pid = %object.pid, "base object created");

        let mut issues = Vec::new();
        let datastreams = [
            (dsid::MODS, &mods, "text/xml", ControlGroup::InlineXml),
            (dsid::DC, &dc, "text/xml", ControlGroup::Managed),
            (dsid::TN, &thumb, "image/jpeg", ControlGroup::Managed),
        ];
        for (id, file, mime, group) in datastreams {
            let ds = DatastreamSpec::from_source(id, &file.source(), mime, group);
            self.attach(&object.pid, &ds, &mut issues).await;
        }
        Ok(BaseObject::Created { object, issues })
    }

    async fn required_file(
        &self,
        item: &LegacyItem,
        file_use: FileUse,
    ) -> Result<LegacyFile, MigrationError> {
        let missing = || MigrationError::MissingRequiredFile {
            item: item.id.clone(),
            file_use: file_use.to_string(),
        };
        let file = self
            .legacy
            .file(&item.id, &file_use)
            .await?
            .ok_or_else(missing)?;
        if !file.path.is_file() {
            warn!(item = %item.id, path = %file.path.display(), "{} file is not on disk", file_use);
            return Err(missing());
        }
        Ok(file)
    }

    async fn attach(&self, pid: &Pid, ds: &DatastreamSpec, issues: &mut Vec<String>) {
        match self.repo.write_datastream(pid, ds).await {
            Ok(()) => debug!(pid = %pid, dsid = %ds.dsid, "datastream attached"),
            Err(e) => {
                warn!(pid = %pid, dsid = %ds.dsid, error = %e, "datastream not attached");
                issues.push(format!("{}: {}", ds.dsid, e));
            }
        }
    }

    async fn attach_optional(
        &self,
        object: &RepositoryObject,
        item: &LegacyItem,
        file_use: FileUse,
        id: &str,
        issues: &mut Vec<String>,
    ) -> Result<Option<LegacyFile>, MigrationError> {
        let Some(file) = self.legacy.file(&item.id, &file_use).await? else {
            return Ok(None);
        };
        let ds = DatastreamSpec::from_source(id, &file.source(), "text/xml", ControlGroup::Managed);
        self.attach(&object.pid, &ds, issues).await;
        Ok(Some(file))
    }

    async fn handle_image(
        &self,
        object: &RepositoryObject,
        item: &LegacyItem,
        issues: &mut Vec<String>,
    ) -> Result<(), MigrationError> {
        let masters = self.legacy.files(&item.id, &FileUse::Master).await?;
        let Some(tiff) = masters.first() else {
            issues.push(format!("{}: no MASTER file", dsid::TIFF));
            return Ok(());
        };
        if masters.len() > 1 {
            warn!(item = %item.id, count = masters.len(), "several MASTER files; using {}", tiff.name);
        }
        let ds = DatastreamSpec::from_source(
            dsid::TIFF,
            &tiff.source(),
            "image/tiff",
            ControlGroup::Managed,
        );
        self.attach(&object.pid, &ds, issues).await;

        match attach_jp2(self.repo, self.generator, &object.pid, &tiff.source()).await {
            Ok(()) => Ok(()),
            Err(e @ MigrationError::Derivative(_))
                if self.settings.on_derivative_failure == DerivativePolicy::Abort =>
            {
                Err(e)
            }
            Err(e) => {
                warn!(pid = %object.pid, error = %e, "JP2 not attached");
                issues.push(format!("{}: {}", dsid::JP2, e));
                Ok(())
            }
        }
    }

    async fn handle_text(
        &self,
        object: &RepositoryObject,
        item: &LegacyItem,
        issues: &mut Vec<String>,
    ) -> Result<(), MigrationError> {
        if self
            .attach_optional(object, item, FileUse::MarcXml, dsid::MARCXML, issues)
            .await?
            .is_none()
        {
            debug!(item = %item.id, "no MARCXML file");
        }
        let Some(mets) = self
            .attach_optional(object, item, FileUse::Mets, dsid::METS, issues)
            .await?
        else {
            issues.push(format!("{}: no METS file; pages not created", dsid::METS));
            return Ok(());
        };
        let label_map = match self.read_structure(item, &mets) {
            Ok(map) => map,
            Err(e) => {
                issues.push(format!("{}: {}; pages not created", dsid::METS, e));
                return Ok(());
            }
        };

        let ocr = match self.legacy.file(&item.id, &FileUse::OcrZip).await? {
            Some(zip) => match OcrArchive::open(&zip.path) {
                Ok(archive) => Some(archive),
                Err(e) => {
                    issues.push(format!("{}: {}", dsid::OCR, e));
                    None
                }
            },
            None => {
                warn!(item = %item.id, "no OCR_ZIP file; pages will have no OCR");
                None
            }
        };

        self.assemble(object, item, ocr, &label_map, issues).await
    }

    /// Manuscripts follow the book layout without MARCXML or OCR. Labels come
    /// from METS when there is one, otherwise from the page file names.
    async fn handle_manuscript(
        &self,
        object: &RepositoryObject,
        item: &LegacyItem,
        issues: &mut Vec<String>,
    ) -> Result<(), MigrationError> {
        let mets = self
            .attach_optional(object, item, FileUse::Mets, dsid::METS, issues)
            .await?;
        let label_map = match mets {
            Some(mets) => match self.read_structure(item, &mets) {
                Ok(map) => map,
                Err(e) => {
                    issues.push(format!("{}: {}; pages not created", dsid::METS, e));
                    return Ok(());
                }
            },
            None => {
                let masters = self.legacy.files(&item.id, &FileUse::Master).await?;
                masters
                    .iter()
                    .map(|m| (m.name.clone(), m.basename()))
                    .collect::<PageLabelMap>()
            }
        };
        self.assemble(object, item, None, &label_map, issues).await
    }

    /// Unplaced files are only logged here; a page whose master was
    /// rejected is marked incomplete by the assembler.
    fn read_structure(
        &self,
        item: &LegacyItem,
        mets: &LegacyFile,
    ) -> Result<PageLabelMap, MigrationError> {
        let map = structure::read_structure_file(&mets.path).map_err(|e| {
            warn!(item = %item.id, error = %e, "structural metadata unusable");
            e
        })?;
        for rejected in map.rejections() {
            warn!(item = %item.id, error = %rejected, "file not placed by structural map");
        }
        Ok(map)
    }

    async fn assemble(
        &self,
        object: &RepositoryObject,
        item: &LegacyItem,
        ocr: Option<OcrArchive>,
        label_map: &PageLabelMap,
        issues: &mut Vec<String>,
    ) -> Result<(), MigrationError> {
        let masters = self.legacy.files(&item.id, &FileUse::Master).await?;
        if masters.is_empty() {
            issues.push("no MASTER files; pages not created".to_string());
            return Ok(());
        }
        let assembler = PageAssembler {
            repo: self.repo,
            generator: self.generator,
            scratch_dir: Path::new(&self.settings.scratch_dir),
            page_content_model: self.catalog.page_content_model()?,
            book_label_max: self.settings.page_book_label_max,
            object_label_max: self.settings.object_label_max,
            derivative_policy: self.settings.on_derivative_failure,
        };
        let aggregate = assembler
            .assemble_book(object, masters, ocr, label_map)
            .await?;
        info!(
            pid = %object.pid,
            pages = aggregate.pages.len(),
            ocr_bytes = aggregate.ocr_text.len(),
            "pages assembled"
        );
        issues.extend(book_issues(&aggregate));
        Ok(())
    }
}

fn book_issues(aggregate: &BookAggregate) -> Vec<String> {
    let mut out = Vec::new();
    for page in aggregate.incomplete_pages() {
        for issue in &page.issues {
            out.push(format!("page {}: {}", page.basename, issue));
        }
    }
    for issue in &aggregate.issues {
        out.push(format!("{}: {}", dsid::BOOKOCR, issue));
    }
    out
}
