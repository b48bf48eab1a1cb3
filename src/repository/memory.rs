//! In-memory [`Repository`] for tests and dry inspection.
//!
//! Datastream content is copied out of its source file at write time, so
//! assertions still see it after scratch files are cleaned up. Like Fedora,
//! it rejects creating a pid twice, gives every new object a default `DC`
//! datastream, and refuses to add a datastream that is already there.

use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use super::Repository;
use crate::error::MigrationError;
use crate::models::{dsid, ControlGroup, DatastreamSpec, ObjectSpec, Pid, RepositoryObject};

#[derive(Debug, Clone)]
pub struct StoredDatastream {
    pub label: String,
    pub mime_type: String,
    pub control_group: ControlGroup,
    pub content: Vec<u8>,
}

impl StoredDatastream {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }
}

struct StoredObject {
    spec: ObjectSpec,
    datastreams: BTreeMap<String, StoredDatastream>,
}

impl StoredObject {
    /// A fresh object carrying the `DC` record Fedora generates on ingest.
    fn ingested(spec: ObjectSpec) -> Self {
        let content = format!(
            r#"<oai_dc:dc xmlns:oai_dc="http://www.openarchives.org/OAI/2.0/oai_dc/" xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>{}</dc:title><dc:identifier>{}</dc:identifier></oai_dc:dc>"#,
            quick_xml::escape::escape(spec.label.as_str()),
            spec.pid
        );
        let mut datastreams = BTreeMap::new();
        datastreams.insert(
            dsid::DC.to_string(),
            StoredDatastream {
                label: "Dublin Core Record for this object".to_string(),
                mime_type: "text/xml".to_string(),
                control_group: ControlGroup::InlineXml,
                content: content.into_bytes(),
            },
        );
        Self { spec, datastreams }
    }
}

pub struct MemoryRepository {
    objects: RwLock<BTreeMap<Pid, StoredObject>>,
    /// pids in creation order
    created: RwLock<Vec<Pid>>,
    writes: RwLock<usize>,
    failing_dsids: RwLock<HashSet<String>>,
    offline: bool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            created: RwLock::new(Vec::new()),
            writes: RwLock::new(0),
            failing_dsids: RwLock::new(HashSet::new()),
            offline: false,
        }
    }

    /// A repository whose `ping` always fails.
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::new()
        }
    }

    /// Make every write of `dsid` fail with a write error.
    pub fn fail_datastream(&self, dsid: &str) {
        self.failing_dsids.write().unwrap().insert(dsid.to_string());
    }

    /// Pre-populate an object without counting it as a migration write.
    pub fn seed(&self, spec: ObjectSpec) {
        self.objects
            .write()
            .unwrap()
            .insert(spec.pid.clone(), StoredObject::ingested(spec));
    }

    pub fn created_pids(&self) -> Vec<Pid> {
        self.created.read().unwrap().clone()
    }

    /// Number of object creations plus datastream writes.
    pub fn write_count(&self) -> usize {
        *self.writes.read().unwrap()
    }

    pub fn object(&self, pid: &Pid) -> Option<ObjectSpec> {
        self.objects.read().unwrap().get(pid).map(|o| o.spec.clone())
    }

    pub fn datastream(&self, pid: &Pid, dsid: &str) -> Option<StoredDatastream> {
        self.objects
            .read()
            .unwrap()
            .get(pid)
            .and_then(|o| o.datastreams.get(dsid).cloned())
    }

    pub fn datastream_ids(&self, pid: &Pid) -> Vec<String> {
        self.objects
            .read()
            .unwrap()
            .get(pid)
            .map(|o| o.datastreams.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn count_write(&self) {
        *self.writes.write().unwrap() += 1;
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn ping(&self) -> Result<(), MigrationError> {
        if self.offline {
            return Err(MigrationError::RepositoryConnection {
                url: "memory://".to_string(),
                message: "repository is offline".to_string(),
            });
        }
        Ok(())
    }

    async fn find_object(&self, pid: &Pid) -> Result<Option<RepositoryObject>, MigrationError> {
        Ok(self.objects.read().unwrap().get(pid).map(|o| RepositoryObject {
            pid: pid.clone(),
            label: o.spec.label.clone(),
        }))
    }

    async fn create_object(&self, spec: &ObjectSpec) -> Result<RepositoryObject, MigrationError> {
        let mut objects = self.objects.write().unwrap();
        if objects.contains_key(&spec.pid) {
            return Err(MigrationError::RepositoryWrite {
                pid: spec.pid.to_string(),
                what: "create object".to_string(),
                message: "object already exists".to_string(),
            });
        }
        objects.insert(spec.pid.clone(), StoredObject::ingested(spec.clone()));
        self.created.write().unwrap().push(spec.pid.clone());
        self.count_write();
        Ok(RepositoryObject {
            pid: spec.pid.clone(),
            label: spec.label.clone(),
        })
    }

    async fn datastream_exists(&self, pid: &Pid, dsid: &str) -> Result<bool, MigrationError> {
        Ok(self
            .objects
            .read()
            .unwrap()
            .get(pid)
            .is_some_and(|o| o.datastreams.contains_key(dsid)))
    }

    async fn add_datastream(&self, pid: &Pid, ds: &DatastreamSpec) -> Result<(), MigrationError> {
        self.store(pid, ds, false)
    }

    async fn modify_datastream(&self, pid: &Pid, ds: &DatastreamSpec) -> Result<(), MigrationError> {
        self.store(pid, ds, true)
    }
}

impl MemoryRepository {
    fn store(&self, pid: &Pid, ds: &DatastreamSpec, modify: bool) -> Result<(), MigrationError> {
        let write_err = |message: &str| MigrationError::RepositoryWrite {
            pid: pid.to_string(),
            what: format!("{} datastream {}", if modify { "modify" } else { "add" }, ds.dsid),
            message: message.to_string(),
        };
        if self.failing_dsids.read().unwrap().contains(&ds.dsid) {
            return Err(write_err("injected failure"));
        }
        let content = std::fs::read(&ds.source).map_err(|e| MigrationError::io(&ds.source, e))?;
        let mut objects = self.objects.write().unwrap();
        let object = objects
            .get_mut(pid)
            .ok_or_else(|| write_err("no such object"))?;
        match (modify, object.datastreams.contains_key(&ds.dsid)) {
            (false, true) => return Err(write_err("datastream already exists")),
            (true, false) => return Err(write_err("no such datastream")),
            _ => {}
        }
        let control_group = match object.datastreams.get(&ds.dsid) {
            Some(existing) => existing.control_group,
            None => ds.control_group,
        };
        object.datastreams.insert(
            ds.dsid.clone(),
            StoredDatastream {
                label: ds.label.clone(),
                mime_type: ds.mime_type.clone(),
                control_group,
                content,
            },
        );
        drop(objects);
        self.count_write();
        Ok(())
    }
}
