//! Target repository abstraction.
//!
//! [`Repository`] is the write surface the migration needs: existence
//! lookups, object creation and datastream attachment. Fedora gives every
//! new object a default `DC` datastream, so attachment goes through
//! [`Repository::write_datastream`], which modifies a datastream that is
//! already there and adds one that is not. [`fedora`] talks to a
//! Fedora 3 REST endpoint; [`memory`] records writes for tests.
//!
//! Writes are not transactional. An item interrupted part way keeps whatever
//! objects and datastreams were already written; a re-run only skips base
//! objects that already exist and never repairs a partial one.

use async_trait::async_trait;

use crate::error::MigrationError;
use crate::models::{DatastreamSpec, ObjectSpec, Pid, RepositoryObject};

pub mod fedora;
pub mod memory;

pub use fedora::FedoraClient;
pub use memory::MemoryRepository;

#[async_trait]
pub trait Repository: Send + Sync {
    /// Confirm the repository is reachable. Fails with
    /// [`MigrationError::RepositoryConnection`].
    async fn ping(&self) -> Result<(), MigrationError>;

    /// Look up an object; `Ok(None)` when it does not exist.
    async fn find_object(&self, pid: &Pid) -> Result<Option<RepositoryObject>, MigrationError>;

    /// Create an object with its relationships.
    async fn create_object(&self, spec: &ObjectSpec) -> Result<RepositoryObject, MigrationError>;

    /// Whether `pid` already carries a datastream `dsid`.
    async fn datastream_exists(&self, pid: &Pid, dsid: &str) -> Result<bool, MigrationError>;

    /// Add a new datastream, reading its content from `ds.source`. Fails if
    /// the datastream already exists.
    async fn add_datastream(&self, pid: &Pid, ds: &DatastreamSpec) -> Result<(), MigrationError>;

    /// Replace the content, label and MIME type of an existing datastream.
    async fn modify_datastream(&self, pid: &Pid, ds: &DatastreamSpec)
        -> Result<(), MigrationError>;

    /// Update the datastream if it exists, otherwise create it.
    async fn write_datastream(&self, pid: &Pid, ds: &DatastreamSpec) -> Result<(), MigrationError> {
        if self.datastream_exists(pid, &ds.dsid).await? {
            self.modify_datastream(pid, ds).await
        } else {
            self.add_datastream(pid, ds).await
        }
    }
}
