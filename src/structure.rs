//! METS structural map parsing.
//!
//! Recovers the raw page label of every physical file in a METS document.
//! Files are declared in the file section (`mets:file` with an `ID` and a
//! `mets:FLocat` child whose `xlink:href` names the file); page divisions in
//! the structural map (`mets:div TYPE="page" LABEL="…"`) point back at them
//! through `mets:fptr FILEID="…"` (or a nested `mets:area FILEID="…"`).
//!
//! Every declared file must be claimed by exactly one page division. A file
//! that is not is rejected on its own; the rest of the document still maps.

use std::collections::HashMap;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

use crate::error::MigrationError;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StructureError {
    #[error("malformed document: {0}")]
    Malformed(String),

    #[error("file {file_id} ({href}) is not referenced by any page division")]
    MissingReference { file_id: String, href: String },

    #[error("file {file_id} ({href}) is claimed by {} page divisions: {}", .labels.len(), .labels.join(", "))]
    AmbiguousReference {
        file_id: String,
        href: String,
        labels: Vec<String>,
    },

    #[error("file {0} has no FLocat href")]
    MissingLocation(String),
}

/// Raw structural labels keyed by physical file name (e.g. `00000001.tif`),
/// plus the files the structural map could not place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLabelMap {
    labels: HashMap<String, String>,
    rejected: Vec<Rejected>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rejected {
    filename: Option<String>,
    error: StructureError,
}

impl PageLabelMap {
    pub fn get(&self, filename: &str) -> Option<&str> {
        self.labels.get(filename).map(String::as_str)
    }

    /// Why `filename` has no label, when the structural map rejected it.
    pub fn rejection(&self, filename: &str) -> Option<&StructureError> {
        self.rejected
            .iter()
            .find(|r| r.filename.as_deref() == Some(filename))
            .map(|r| &r.error)
    }

    pub fn rejections(&self) -> impl Iterator<Item = &StructureError> {
        self.rejected.iter().map(|r| &r.error)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    fn reject(&mut self, filename: Option<String>, error: StructureError) {
        self.rejected.push(Rejected { filename, error });
    }
}

impl FromIterator<(String, String)> for PageLabelMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        PageLabelMap {
            labels: iter.into_iter().collect(),
            rejected: Vec::new(),
        }
    }
}

struct FileDecl {
    id: String,
    href: Option<String>,
}

struct Claim {
    div: usize,
    label: String,
}

/// Read a METS file from disk, keeping per-file rejections in the map.
pub fn read_structure_file(path: &Path) -> Result<PageLabelMap, MigrationError> {
    let bytes = std::fs::read(path).map_err(|e| MigrationError::io(path, e))?;
    Ok(read_structure(&bytes)?)
}

/// Parse a METS document into a filename → raw label map, failing on the
/// first file that no single page division claims.
pub fn parse_structure(xml: &[u8]) -> Result<PageLabelMap, StructureError> {
    let map = read_structure(xml)?;
    let first = map.rejections().next().cloned();
    match first {
        Some(err) => Err(err),
        None => Ok(map),
    }
}

/// Parse a METS document into a filename → raw label map. Only a document
/// that cannot be read at all is an error; unplaced files are recorded as
/// rejections.
pub fn read_structure(xml: &[u8]) -> Result<PageLabelMap, StructureError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut files: Vec<FileDecl> = Vec::new();
    let mut in_file = false;
    // One entry per open div: Some((index, label)) for page divisions.
    let mut divs: Vec<Option<(usize, String)>> = Vec::new();
    let mut page_divs = 0usize;
    let mut claims: HashMap<String, Vec<Claim>> = HashMap::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| StructureError::Malformed(e.to_string()))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let empty = matches!(event, Event::Empty(_));
                match e.local_name().as_ref() {
                    b"file" => {
                        let id = required_attr(e, b"ID")?;
                        files.push(FileDecl { id, href: None });
                        in_file = !empty;
                    }
                    b"FLocat" if in_file => {
                        if let (Some(decl), Some(href)) = (files.last_mut(), attr(e, b"href")?) {
                            if decl.href.is_none() {
                                decl.href = Some(href);
                            }
                        }
                    }
                    b"div" => {
                        let entry = if attr(e, b"TYPE")?.as_deref() == Some("page") {
                            let label = match attr(e, b"LABEL")? {
                                Some(l) => l,
                                None => attr(e, b"ORDERLABEL")?.ok_or_else(|| {
                                    StructureError::Malformed(
                                        "page division without LABEL".to_string(),
                                    )
                                })?,
                            };
                            page_divs += 1;
                            Some((page_divs, label))
                        } else {
                            None
                        };
                        if !empty {
                            divs.push(entry);
                        }
                    }
                    b"fptr" | b"area" => {
                        let page = divs.iter().rev().find_map(|d| d.as_ref());
                        if let (Some((div, label)), Some(file_id)) = (page, attr(e, b"FILEID")?) {
                            let entry = claims.entry(file_id).or_default();
                            if entry.last().map(|c| c.div) != Some(*div) {
                                entry.push(Claim {
                                    div: *div,
                                    label: label.clone(),
                                });
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"file" => in_file = false,
                b"div" => {
                    divs.pop();
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let mut map = PageLabelMap::default();
    for decl in files {
        let Some(href) = decl.href else {
            map.reject(None, StructureError::MissingLocation(decl.id));
            continue;
        };
        let filename = file_name(&href);
        let mut found = claims.remove(&decl.id).unwrap_or_default();
        let label = match found.len() {
            0 => {
                let err = StructureError::MissingReference {
                    file_id: decl.id,
                    href,
                };
                map.reject(Some(filename), err);
                continue;
            }
            1 => found.remove(0).label,
            _ => {
                let err = StructureError::AmbiguousReference {
                    file_id: decl.id,
                    href,
                    labels: found.into_iter().map(|c| c.label).collect(),
                };
                map.reject(Some(filename), err);
                continue;
            }
        };
        if map.rejection(&filename).is_some() || map.labels.contains_key(&filename) {
            map.labels.remove(&filename);
            let err = StructureError::Malformed(format!(
                "file name {} is declared more than once",
                filename
            ));
            map.reject(Some(filename), err);
            continue;
        }
        map.labels.insert(filename, label);
    }
    Ok(map)
}

fn file_name(href: &str) -> String {
    let trimmed = href.strip_prefix("file://").unwrap_or(href);
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed)
        .to_string()
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, StructureError> {
    for a in e.attributes() {
        let a = a.map_err(|err| StructureError::Malformed(err.to_string()))?;
        if a.key.local_name().as_ref() == name {
            let value = a
                .unescape_value()
                .map_err(|err| StructureError::Malformed(err.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn required_attr(e: &BytesStart<'_>, name: &[u8]) -> Result<String, StructureError> {
    attr(e, name)?.ok_or_else(|| {
        StructureError::Malformed(format!(
            "<{}> without {}",
            String::from_utf8_lossy(e.local_name().as_ref()),
            String::from_utf8_lossy(name)
        ))
    })
}
