//! Fedora 3 REST client.
//!
//! Uses the API-M REST endpoints directly:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | ping | `GET /describe?xml=true` |
//! | find | `GET /objects/{pid}?format=xml` (404 → not found) |
//! | create | `POST /objects/{pid}?label=…` then `POST /objects/{pid}/relationships/new` per relationship |
//! | datastream exists | `GET /objects/{pid}/datastreams/{dsid}?format=xml` (404 → absent) |
//! | add datastream | `POST /objects/{pid}/datastreams/{dsid}?controlGroup=…&dsLabel=…&mimeType=…` |
//! | modify datastream | `PUT /objects/{pid}/datastreams/{dsid}?dsLabel=…&mimeType=…` |
//!
//! Transport failures (connect, timeout) surface as
//! [`MigrationError::RepositoryConnection`]; unexpected statuses as
//! [`MigrationError::RepositoryWrite`].

use std::time::Duration;

use async_trait::async_trait;
use quick_xml::events::Event;
use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::debug;

use super::Repository;
use crate::error::MigrationError;
use crate::models::{DatastreamSpec, ObjectSpec, Pid, RelObject, Relationship, RepositoryObject};

pub struct FedoraClient {
    base_url: String,
    username: String,
    password: String,
    http: reqwest::Client,
}

impl FedoraClient {
    pub fn new(
        base_url: &str,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, MigrationError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MigrationError::RepositoryConnection {
                url: base_url.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn object_url(&self, pid: &Pid) -> String {
        format!("{}/objects/{}", self.base_url, pid)
    }

    fn datastream_url(&self, pid: &Pid, dsid: &str) -> String {
        format!("{}/datastreams/{}", self.object_url(pid), dsid)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.basic_auth(&self.username, Some(&self.password))
    }

    async fn send(&self, req: RequestBuilder, pid: &Pid, what: &str) -> Result<Response, MigrationError> {
        self.authed(req).send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                MigrationError::RepositoryConnection {
                    url: self.base_url.clone(),
                    message: e.to_string(),
                }
            } else {
                write_error(pid, what, e.to_string())
            }
        })
    }

    async fn expect_success(resp: Response, pid: &Pid, what: &str) -> Result<(), MigrationError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(write_error(
            pid,
            what,
            format!("HTTP {}: {}", status, body.trim()),
        ))
    }

    async fn add_relationship(&self, pid: &Pid, rel: &Relationship) -> Result<(), MigrationError> {
        let what = format!("relationship {}", rel.predicate);
        let (object, literal) = relationship_object(rel);
        let req = self
            .http
            .post(format!("{}/relationships/new", self.object_url(pid)))
            .query(&[
                ("subject", pid.uri().as_str()),
                ("predicate", rel.predicate.as_str()),
                ("object", object.as_str()),
                ("isLiteral", if literal { "true" } else { "false" }),
            ]);
        let resp = self.send(req, pid, &what).await?;
        Self::expect_success(resp, pid, &what).await
    }
}

fn write_error(pid: &Pid, what: &str, message: String) -> MigrationError {
    MigrationError::RepositoryWrite {
        pid: pid.to_string(),
        what: what.to_string(),
        message,
    }
}

fn relationship_object(rel: &Relationship) -> (String, bool) {
    match &rel.object {
        RelObject::Resource(pid) => (pid.uri(), false),
        RelObject::Literal(value) => (value.clone(), true),
    }
}

/// Pull `objLabel` out of an object profile document.
fn parse_object_label(xml: &str) -> Option<String> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut in_label = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => in_label = e.local_name().as_ref() == b"objLabel",
            Ok(Event::Text(t)) if in_label => {
                return t.unescape().ok().map(|s| s.into_owned());
            }
            Ok(Event::End(_)) => in_label = false,
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

#[async_trait]
impl Repository for FedoraClient {
    async fn ping(&self) -> Result<(), MigrationError> {
        let conn_err = |message: String| MigrationError::RepositoryConnection {
            url: self.base_url.clone(),
            message,
        };
        let resp = self
            .authed(
                self.http
                    .get(format!("{}/describe", self.base_url))
                    .query(&[("xml", "true")]),
            )
            .send()
            .await
            .map_err(|e| conn_err(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(conn_err(format!("HTTP {}", resp.status())));
        }
        Ok(())
    }

    async fn find_object(&self, pid: &Pid) -> Result<Option<RepositoryObject>, MigrationError> {
        let req = self.http.get(self.object_url(pid)).query(&[("format", "xml")]);
        let resp = self.send(req, pid, "object lookup").await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let body = resp
                    .text()
                    .await
                    .map_err(|e| write_error(pid, "object lookup", e.to_string()))?;
                Ok(Some(RepositoryObject {
                    pid: pid.clone(),
                    label: parse_object_label(&body).unwrap_or_default(),
                }))
            }
            s => Err(write_error(pid, "object lookup", format!("HTTP {}", s))),
        }
    }

    async fn create_object(&self, spec: &ObjectSpec) -> Result<RepositoryObject, MigrationError> {
        debug!(pid = %spec.pid, "creating object");
        let req = self
            .http
            .post(self.object_url(&spec.pid))
            .query(&[("label", spec.label.as_str())]);
        let resp = self.send(req, &spec.pid, "create object").await?;
        Self::expect_success(resp, &spec.pid, "create object").await?;

        for rel in &spec.relationships {
            self.add_relationship(&spec.pid, rel).await?;
        }
        Ok(RepositoryObject {
            pid: spec.pid.clone(),
            label: spec.label.clone(),
        })
    }

    async fn datastream_exists(&self, pid: &Pid, dsid: &str) -> Result<bool, MigrationError> {
        let what = format!("datastream {} lookup", dsid);
        let req = self
            .http
            .get(self.datastream_url(pid, dsid))
            .query(&[("format", "xml")]);
        let resp = self.send(req, pid, &what).await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            s => Err(write_error(pid, &what, format!("HTTP {}", s))),
        }
    }

    async fn add_datastream(&self, pid: &Pid, ds: &DatastreamSpec) -> Result<(), MigrationError> {
        debug!(pid = %pid, dsid = %ds.dsid, source = %ds.source.display(), "adding datastream");
        let what = format!("add datastream {}", ds.dsid);
        let body = tokio::fs::read(&ds.source)
            .await
            .map_err(|e| MigrationError::io(&ds.source, e))?;
        let req = self
            .http
            .post(self.datastream_url(pid, &ds.dsid))
            .query(&[
                ("controlGroup", ds.control_group.code()),
                ("dsLabel", ds.label.as_str()),
                ("mimeType", ds.mime_type.as_str()),
            ])
            .header(reqwest::header::CONTENT_TYPE, ds.mime_type.as_str())
            .body(body);
        let resp = self.send(req, pid, &what).await?;
        Self::expect_success(resp, pid, &what).await
    }

    async fn modify_datastream(&self, pid: &Pid, ds: &DatastreamSpec) -> Result<(), MigrationError> {
        debug!(pid = %pid, dsid = %ds.dsid, source = %ds.source.display(), "modifying datastream");
        let what = format!("modify datastream {}", ds.dsid);
        let body = tokio::fs::read(&ds.source)
            .await
            .map_err(|e| MigrationError::io(&ds.source, e))?;
        let req = self
            .http
            .put(self.datastream_url(pid, &ds.dsid))
            .query(&[
                ("dsLabel", ds.label.as_str()),
                ("mimeType", ds.mime_type.as_str()),
            ])
            .header(reqwest::header::CONTENT_TYPE, ds.mime_type.as_str())
            .body(body);
        let resp = self.send(req, pid, &what).await?;
        Self::expect_success(resp, pid, &what).await
    }
}
