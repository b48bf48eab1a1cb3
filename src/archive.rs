//! Zipped OCR bundles.
//!
//! A text item's `OCR_ZIP` holds one plain-text file per page, named after
//! the page image (`00000001.txt` for `00000001.tif`). Entries are extracted
//! on demand into scratch space and removed when the returned
//! [`tempfile::TempPath`] is dropped.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tempfile::TempPath;

use crate::error::MigrationError;

/// Largest OCR entry that will be extracted.
const MAX_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

pub struct OcrArchive {
    path: PathBuf,
    archive: zip::ZipArchive<File>,
    names: BTreeSet<String>,
}

/// One extracted OCR page: its scratch file and its decoded text.
pub struct OcrPage {
    pub entry: String,
    pub path: TempPath,
    pub text: String,
}

impl OcrArchive {
    pub fn open(path: &Path) -> Result<Self, MigrationError> {
        let file = File::open(path).map_err(|e| MigrationError::io(path, e))?;
        let archive = zip::ZipArchive::new(file).map_err(|e| MigrationError::Archive {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let names = archive.file_names().map(str::to_string).collect();
        Ok(Self {
            path: path.to_path_buf(),
            archive,
            names,
        })
    }

    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// The OCR entry name for a page basename, if the archive has one.
    pub fn entry_for(&self, basename: &str) -> Option<String> {
        let name = format!("{}.txt", basename);
        self.contains(&name).then_some(name)
    }

    /// Extract `name` into `dir` and read its text. The scratch file lives as
    /// long as the returned [`OcrPage`].
    pub fn extract(&mut self, name: &str, dir: &Path) -> Result<OcrPage, MigrationError> {
        let archive_err = |message: String| MigrationError::Archive {
            path: self.path.clone(),
            message,
        };
        let entry = self
            .archive
            .by_name(name)
            .map_err(|e| archive_err(format!("{}: {}", name, e)))?;
        let mut bytes = Vec::new();
        entry
            .take(MAX_ENTRY_BYTES)
            .read_to_end(&mut bytes)
            .map_err(|e| archive_err(format!("{}: {}", name, e)))?;
        if bytes.len() as u64 >= MAX_ENTRY_BYTES {
            return Err(archive_err(format!(
                "{} exceeds size limit ({} bytes)",
                name, MAX_ENTRY_BYTES
            )));
        }

        let file_name = Path::new(name)
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| archive_err(format!("entry {} has no file name", name)))?;
        let dest = dir.join(file_name);
        let path = TempPath::try_from_path(&dest).map_err(|e| MigrationError::io(&dest, e))?;
        std::fs::write(&path, &bytes).map_err(|e| MigrationError::io(&dest, e))?;

        Ok(OcrPage {
            entry: name.to_string(),
            path,
            text: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, body) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn lists_and_extracts_entries() {
        let tmp = TempDir::new().unwrap();
        let zip_path = tmp.path().join("ocr.zip");
        write_zip(
            &zip_path,
            &[("00000001.txt", "first page"), ("00000002.txt", "second")],
        );
        let mut archive = OcrArchive::open(&zip_path).unwrap();
        assert_eq!(
            archive.entry_names().collect::<Vec<_>>(),
            vec!["00000001.txt", "00000002.txt"]
        );
        assert_eq!(archive.entry_for("00000002").as_deref(), Some("00000002.txt"));
        assert_eq!(archive.entry_for("00000003"), None);

        let scratch = tmp.path().join("scratch");
        std::fs::create_dir(&scratch).unwrap();
        let page = archive.extract("00000001.txt", &scratch).unwrap();
        assert_eq!(page.text, "first page");
        let extracted = page.path.to_path_buf();
        assert!(extracted.exists());
        drop(page);
        assert!(!extracted.exists());
    }

    #[test]
    fn non_zip_is_an_archive_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ocr.zip");
        std::fs::write(&path, b"not a zip").unwrap();
        assert!(matches!(
            OcrArchive::open(&path),
            Err(MigrationError::Archive { .. })
        ));
    }
}
