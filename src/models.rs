//! Core data models used throughout the migration.
//!
//! Legacy records ([`LegacyItem`], [`LegacyFile`]) are read-only inputs from
//! the workflow database. Repository-side values ([`Pid`], [`ObjectSpec`],
//! [`DatastreamSpec`]) describe what gets written to Fedora.

use std::fmt;
use std::path::{Path, PathBuf};

/// Relationship predicates written to RELS-EXT.
pub mod predicate {
    pub const HAS_MODEL: &str = "info:fedora/fedora-system:def/model#hasModel";
    pub const IS_MEMBER_OF_COLLECTION: &str =
        "info:fedora/fedora-system:def/relations-external#isMemberOfCollection";
    pub const IS_MEMBER_OF: &str = "info:fedora/fedora-system:def/relations-external#isMemberOf";
    pub const IS_PAGE_NUMBER: &str = "info:islandora/islandora-system:def/pageinfo#isPageNumber";
}

/// Datastream identifiers.
pub mod dsid {
    pub const MODS: &str = "MODS";
    pub const DC: &str = "DC";
    pub const TN: &str = "TN";
    pub const TIFF: &str = "TIFF";
    pub const JP2: &str = "JP2";
    pub const OCR: &str = "OCR";
    pub const MARCXML: &str = "MARCXML";
    pub const METS: &str = "METS";
    pub const BOOKOCR: &str = "BOOKOCR";
}

/// The item types the legacy workflow knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Image,
    TextCataloged,
    TextUncataloged,
    Map,
    Manuscript,
}

impl ItemKind {
    /// Parse the workflow's type name (e.g. `"text - cataloged"`).
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "image" => Some(ItemKind::Image),
            "text - cataloged" => Some(ItemKind::TextCataloged),
            "text - uncataloged" => Some(ItemKind::TextUncataloged),
            "map" => Some(ItemKind::Map),
            "manuscript" => Some(ItemKind::Manuscript),
            _ => None,
        }
    }
}

/// An item record from the legacy workflow database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyItem {
    /// Digital object id (`do_id`), e.g. `31735051234567`.
    pub id: String,
    pub name: String,
    /// Raw type name; kept as a string so unknown types can be reported.
    pub type_name: String,
    pub collection_id: String,
}

impl LegacyItem {
    pub fn kind(&self) -> Option<ItemKind> {
        ItemKind::from_type_name(&self.type_name)
    }
}

/// The `use` tag of a legacy file record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileUse {
    Master,
    Mods,
    Dc,
    Thumb,
    Mets,
    MarcXml,
    OcrZip,
    Kml,
    Other(String),
}

impl FileUse {
    pub fn as_str(&self) -> &str {
        match self {
            FileUse::Master => "MASTER",
            FileUse::Mods => "MODS",
            FileUse::Dc => "DC",
            FileUse::Thumb => "THUMB",
            FileUse::Mets => "METS",
            FileUse::MarcXml => "MARCXML",
            FileUse::OcrZip => "OCR_ZIP",
            FileUse::Kml => "KML",
            FileUse::Other(s) => s,
        }
    }

    pub fn parse(tag: &str) -> Self {
        match tag {
            "MASTER" => FileUse::Master,
            "MODS" => FileUse::Mods,
            "DC" => FileUse::Dc,
            "THUMB" => FileUse::Thumb,
            "METS" => FileUse::Mets,
            "MARCXML" => FileUse::MarcXml,
            "OCR_ZIP" => FileUse::OcrZip,
            "KML" => FileUse::Kml,
            other => FileUse::Other(other.to_string()),
        }
    }

    fn mime_hint(&self) -> Option<&'static str> {
        match self {
            FileUse::Master => Some("image/tiff"),
            FileUse::Mods | FileUse::Dc | FileUse::Mets | FileUse::MarcXml => Some("text/xml"),
            FileUse::Thumb => Some("image/jpeg"),
            FileUse::OcrZip => Some("application/zip"),
            FileUse::Kml => Some("application/vnd.google-earth.kml+xml"),
            FileUse::Other(_) => None,
        }
    }
}

impl fmt::Display for FileUse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file record attached to a legacy item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyFile {
    pub item_id: String,
    pub file_use: FileUse,
    pub path: PathBuf,
    /// File name as recorded by the workflow, e.g. `00000001.tif`.
    pub name: String,
}

impl LegacyFile {
    pub fn source(&self) -> SourceFile {
        SourceFile {
            path: self.path.clone(),
            display_name: self.name.clone(),
            mime_hint: self.file_use.mime_hint().map(str::to_string),
        }
    }

    /// The file name without its extension.
    pub fn basename(&self) -> String {
        basename(&self.name)
    }
}

/// A readable file on disk plus the name and type it should carry in the
/// repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub display_name: String,
    pub mime_hint: Option<String>,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, display_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            display_name: display_name.into(),
            mime_hint: None,
        }
    }

    pub fn with_mime(mut self, mime: &str) -> Self {
        self.mime_hint = Some(mime.to_string());
        self
    }
}

pub fn basename(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

/// Persistent identifier of a repository object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(String);

impl Pid {
    /// `<namespace>:<item id>`
    pub fn base(namespace: &str, item_id: &str) -> Self {
        Pid(format!("{}:{}", namespace, item_id))
    }

    /// `<namespace>:root`, the collection parent of base objects.
    pub fn root(namespace: &str) -> Self {
        Pid(format!("{}:root", namespace))
    }

    /// `<book pid>-<page basename>`
    pub fn page(&self, basename: &str) -> Self {
        Pid(format!("{}-{}", self.0, basename))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Form usable inside a file name.
    pub fn file_safe(&self) -> String {
        self.0.replace(':', "_")
    }

    pub fn uri(&self) -> String {
        format!("info:fedora/{}", self.0)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Pid {
    fn from(s: &str) -> Self {
        Pid(s.to_string())
    }
}

impl From<String> for Pid {
    fn from(s: String) -> Self {
        Pid(s)
    }
}

/// A created-or-retrieved repository object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryObject {
    pub pid: Pid,
    pub label: String,
}

/// Datastream storage policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlGroup {
    /// Inline XML (`X`).
    InlineXml,
    /// Managed copy held by the repository (`M`).
    Managed,
    /// External reference (`E`).
    External,
    /// Redirect (`R`).
    Redirect,
}

impl ControlGroup {
    pub fn code(&self) -> &'static str {
        match self {
            ControlGroup::InlineXml => "X",
            ControlGroup::Managed => "M",
            ControlGroup::External => "E",
            ControlGroup::Redirect => "R",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelObject {
    Resource(Pid),
    Literal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub predicate: String,
    pub object: RelObject,
}

impl Relationship {
    pub fn resource(predicate: &str, pid: &Pid) -> Self {
        Self {
            predicate: predicate.to_string(),
            object: RelObject::Resource(pid.clone()),
        }
    }

    pub fn literal(predicate: &str, value: impl Into<String>) -> Self {
        Self {
            predicate: predicate.to_string(),
            object: RelObject::Literal(value.into()),
        }
    }
}

/// Everything needed to create one repository object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSpec {
    pub pid: Pid,
    pub label: String,
    pub relationships: Vec<Relationship>,
}

impl ObjectSpec {
    /// A top-level object: member of its namespace's root collection.
    pub fn base(pid: Pid, label: String, collection: &Pid, content_model: &str) -> Self {
        Self {
            pid,
            label,
            relationships: vec![
                Relationship::resource(predicate::HAS_MODEL, &Pid::from(content_model)),
                Relationship::resource(predicate::IS_MEMBER_OF_COLLECTION, collection),
            ],
        }
    }

    /// A page of `book`, numbered `sequence`.
    pub fn page(pid: Pid, label: String, book: &Pid, content_model: &str, sequence: u32) -> Self {
        Self {
            pid,
            label,
            relationships: vec![
                Relationship::resource(predicate::HAS_MODEL, &Pid::from(content_model)),
                Relationship::resource(predicate::IS_MEMBER_OF, book),
                Relationship::literal(predicate::IS_PAGE_NUMBER, sequence.to_string()),
            ],
        }
    }
}

/// A datastream write: content is read from `source` at write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatastreamSpec {
    pub dsid: String,
    pub label: String,
    pub mime_type: String,
    pub control_group: ControlGroup,
    pub source: PathBuf,
}

impl DatastreamSpec {
    /// Build from a source file, preferring its own MIME hint over `fallback_mime`.
    pub fn from_source(
        dsid: &str,
        source: &SourceFile,
        fallback_mime: &str,
        control_group: ControlGroup,
    ) -> Self {
        Self {
            dsid: dsid.to_string(),
            label: source.display_name.clone(),
            mime_type: source
                .mime_hint
                .clone()
                .unwrap_or_else(|| fallback_mime.to_string()),
            control_group,
            source: source.path.clone(),
        }
    }
}

/// Truncate to at most `max` characters, on a char boundary.
pub fn shorten(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
