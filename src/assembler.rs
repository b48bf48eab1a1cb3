//! Page assembly for multi-page (book) objects.
//!
//! For one book object, walks its MASTER files in filename order (that order
//! is the page sequence), and for each page:
//!
//! 1. resolves the display label from the structural label map,
//! 2. derives the page number from the numeric basename,
//! 3. pulls the page's OCR text out of the zipped bundle, if present,
//! 4. creates `<book pid>-<basename>` with TIFF, JP2 and OCR datastreams.
//!
//! All page OCR is concatenated into the book's `BOOKOCR` datastream.
//! Problems with one page are recorded on that page's [`PageReport`] and the
//! remaining pages are still processed.

use std::io::Write;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::archive::{OcrArchive, OcrPage};
use crate::config::DerivativePolicy;
use crate::derivative::DerivativeGenerator;
use crate::error::MigrationError;
use crate::labels;
use crate::models::{
    dsid, shorten, ControlGroup, DatastreamSpec, LegacyFile, ObjectSpec, Pid, RepositoryObject,
    SourceFile,
};
use crate::repository::Repository;
use crate::structure::PageLabelMap;

/// Outcome of one page.
#[derive(Debug)]
pub struct PageReport {
    pub basename: String,
    pub pid: Pid,
    pub created: bool,
    pub issues: Vec<MigrationError>,
}

impl PageReport {
    pub fn is_complete(&self) -> bool {
        self.created && self.issues.is_empty()
    }
}

/// Result of assembling a book.
#[derive(Debug, Default)]
pub struct BookAggregate {
    /// Concatenated OCR of every page, in page order.
    pub ocr_text: String,
    pub pages: Vec<PageReport>,
    /// Problems attaching book-level datastreams.
    pub issues: Vec<MigrationError>,
}

impl BookAggregate {
    pub fn incomplete_pages(&self) -> impl Iterator<Item = &PageReport> {
        self.pages.iter().filter(|p| !p.is_complete())
    }

    pub fn is_complete(&self) -> bool {
        self.issues.is_empty() && self.pages.iter().all(PageReport::is_complete)
    }
}

pub struct PageAssembler<'a> {
    pub repo: &'a dyn Repository,
    pub generator: &'a DerivativeGenerator,
    pub scratch_dir: &'a Path,
    pub page_content_model: &'a str,
    pub book_label_max: usize,
    /// Ceiling for the final page label.
    pub object_label_max: usize,
    pub derivative_policy: DerivativePolicy,
}

impl PageAssembler<'_> {
    /// Create one page object per master file under `book`.
    ///
    /// Returns `Err` only for failures that stop the whole book: scratch space
    /// being unusable, or a derivative failure under
    /// [`DerivativePolicy::Abort`].
    pub async fn assemble_book(
        &self,
        book: &RepositoryObject,
        mut masters: Vec<LegacyFile>,
        mut ocr: Option<OcrArchive>,
        label_map: &PageLabelMap,
    ) -> Result<BookAggregate, MigrationError> {
        masters.sort_by(|a, b| a.name.cmp(&b.name));
        std::fs::create_dir_all(self.scratch_dir)
            .map_err(|e| MigrationError::io(self.scratch_dir, e))?;

        let book_label = shorten(&book.label, self.book_label_max);
        let mut aggregate = BookAggregate::default();
        let mut any_ocr = false;

        for master in &masters {
            let basename = master.basename();
            let pid = book.pid.page(&basename);
            let mut report = PageReport {
                basename: basename.clone(),
                pid: pid.clone(),
                created: false,
                issues: Vec::new(),
            };

            if let Some(err) = label_map.rejection(&master.name) {
                warn!(page = %pid, file = %master.name, error = %err, "page rejected by structural map; skipped");
                report.issues.push(MigrationError::Structure(err.clone()));
                aggregate.pages.push(report);
                continue;
            }
            let Some(raw_label) = label_map.get(&master.name) else {
                warn!(page = %pid, file = %master.name, "no structural label; page skipped");
                report.issues.push(MigrationError::MissingLabel(master.name.clone()));
                aggregate.pages.push(report);
                continue;
            };
            let sequence: u32 = match basename.parse() {
                Ok(n) => n,
                Err(_) => {
                    warn!(page = %pid, "non-numeric page basename; page skipped");
                    report.issues.push(MigrationError::SequenceParse(basename));
                    aggregate.pages.push(report);
                    continue;
                }
            };
            let label = shorten(
                &format!("{}, {}", labels::normalize(raw_label, &basename), book_label),
                self.object_label_max,
            );

            let page_dir = tempfile::Builder::new()
                .prefix(&format!("{}-", pid.file_safe()))
                .tempdir_in(self.scratch_dir)
                .map_err(|e| MigrationError::io(self.scratch_dir, e))?;

            let ocr_page = match ocr.as_mut() {
                Some(archive) => extract_ocr(archive, &basename, page_dir.path(), &mut report),
                None => None,
            };
            if let Some(page) = &ocr_page {
                aggregate.ocr_text.push_str(&page.text);
                any_ocr = true;
            }

            let spec = ObjectSpec::page(
                pid.clone(),
                label,
                &book.pid,
                self.page_content_model,
                sequence,
            );
            if let Err(e) = self.repo.create_object(&spec).await {
                warn!(page = %pid, error = %e, "page object not created");
                report.issues.push(e);
                aggregate.pages.push(report);
                continue;
            }
            report.created = true;

            let tiff = DatastreamSpec::from_source(
                dsid::TIFF,
                &master.source(),
                "image/tiff",
                ControlGroup::Managed,
            );
            if let Err(e) = self.repo.write_datastream(&pid, &tiff).await {
                report.issues.push(e);
            }

            match attach_jp2(self.repo, self.generator, &pid, &master.source()).await {
                Ok(()) => {}
                Err(e @ MigrationError::Derivative(_))
                    if self.derivative_policy == DerivativePolicy::Abort =>
                {
                    return Err(e);
                }
                Err(e) => report.issues.push(e),
            }

            if let Some(page) = &ocr_page {
                let source = SourceFile::new(page.path.to_path_buf(), page.entry.clone())
                    .with_mime("text/plain");
                let ds = DatastreamSpec::from_source(
                    dsid::OCR,
                    &source,
                    "text/plain",
                    ControlGroup::Managed,
                );
                if let Err(e) = self.repo.write_datastream(&pid, &ds).await {
                    report.issues.push(e);
                }
            }

            if report.issues.is_empty() {
                info!(page = %pid, sequence, "page migrated");
            } else {
                for issue in &report.issues {
                    warn!(page = %pid, error = %issue, "page incomplete");
                }
            }
            aggregate.pages.push(report);
            // page_dir and the extracted OCR are removed here
        }

        if any_ocr {
            if let Err(e) = self.attach_book_ocr(book, &aggregate.ocr_text).await {
                warn!(book = %book.pid, error = %e, "BOOKOCR not attached");
                aggregate.issues.push(e);
            }
        }
        Ok(aggregate)
    }

    async fn attach_book_ocr(&self, book: &RepositoryObject, text: &str) -> Result<(), MigrationError> {
        let mut file = tempfile::Builder::new()
            .prefix(&format!("{}-", book.pid.file_safe()))
            .suffix(".txt")
            .tempfile_in(self.scratch_dir)
            .map_err(|e| MigrationError::io(self.scratch_dir, e))?;
        file.write_all(text.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| MigrationError::io(file.path(), e))?;

        let source = SourceFile::new(file.path(), format!("{}-ocr.txt", book.pid.file_safe()))
            .with_mime("text/plain");
        let ds = DatastreamSpec::from_source(dsid::BOOKOCR, &source, "text/plain", ControlGroup::Managed);
        self.repo.write_datastream(&book.pid, &ds).await?;
        debug!(book = %book.pid, bytes = text.len(), "BOOKOCR attached");
        Ok(())
    }
}

fn extract_ocr(
    archive: &mut OcrArchive,
    basename: &str,
    dir: &Path,
    report: &mut PageReport,
) -> Option<OcrPage> {
    let name = archive.entry_for(basename)?;
    match archive.extract(&name, dir) {
        Ok(page) => Some(page),
        Err(e) => {
            report.issues.push(e);
            None
        }
    }
}

/// Generate a JP2 from `master` and attach it to `pid`. The derivative is
/// deleted once attached, or on failure.
pub(crate) async fn attach_jp2(
    repo: &dyn Repository,
    generator: &DerivativeGenerator,
    pid: &Pid,
    master: &SourceFile,
) -> Result<(), MigrationError> {
    let jp2 = generator.make_derivative(master, &pid.file_safe())?;
    let ds = DatastreamSpec::from_source(
        dsid::JP2,
        &jp2.source("image/jp2"),
        "image/jp2",
        ControlGroup::Managed,
    );
    repo.write_datastream(pid, &ds).await
}
