//! REST/relational backend.
//!
//! Talks to a PostgREST-style row API (the original system kept its
//! whispers in a hosted Postgres table behind exactly this interface).
//! The remote table carries the flat record columns plus an integer
//! `version` column; the conditional write is a PATCH filtered on both
//! `id` and `version` with `Prefer: return=representation`. Zero rows back
//! means the guard failed and the caller's compare-and-swap round was
//! lost.

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Backend, Version};
use crate::error::StoreError;
use crate::models::WhisperNode;

pub struct RestBackend {
    table_url: String,
    api_key: Option<String>,
    client: Client,
}

/// One row of the remote `whispers` table.
#[derive(Debug, Serialize, Deserialize)]
struct RestRow {
    id: Uuid,
    message: String,
    motif: Option<String>,
    phrase: Option<String>,
    author: Option<String>,
    timestamp: DateTime<Utc>,
    parent: Option<Uuid>,
    children: Option<Vec<Uuid>>,
    version: i64,
}

#[derive(Debug, Deserialize)]
struct ChildrenRow {
    children: Option<Vec<Uuid>>,
    version: i64,
}

impl RestBackend {
    /// `base_url` is the API root, e.g. `https://host/rest/v1`; the
    /// adapter appends the `whispers` table path itself.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            table_url: format!("{}/whispers", base_url.trim_end_matches('/')),
            api_key,
            client: Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::blocking::RequestBuilder {
        let mut req = self.client.request(method, url);
        if let Some(ref key) = self.api_key {
            req = req.header("apikey", key).bearer_auth(key);
        }
        req
    }

    fn row_url(&self, id: Uuid) -> String {
        format!("{}?id=eq.{}&select=*", self.table_url, id)
    }

    fn children_url(&self, id: Uuid) -> String {
        format!("{}?id=eq.{}&select=children,version", self.table_url, id)
    }

    fn guarded_patch_url(&self, id: Uuid, expected: Version) -> String {
        format!("{}?id=eq.{}&version=eq.{}", self.table_url, id, expected)
    }
}

fn row_to_node(row: RestRow) -> WhisperNode {
    WhisperNode {
        id: row.id,
        message: row.message,
        motif: row.motif,
        phrase: row.phrase,
        author: row.author,
        timestamp: row.timestamp,
        parent: row.parent,
        children: row.children.unwrap_or_default(),
    }
}

fn node_to_row(node: &WhisperNode) -> RestRow {
    RestRow {
        id: node.id,
        message: node.message.clone(),
        motif: node.motif.clone(),
        phrase: node.phrase.clone(),
        author: node.author.clone(),
        timestamp: node.timestamp,
        parent: node.parent,
        children: Some(node.children.clone()),
        version: 0,
    }
}

/// Translate a non-success response into a store error without leaking
/// the transport type.
fn unexpected(status: StatusCode, body: String) -> StoreError {
    StoreError::Backend(anyhow::anyhow!("remote table error {}: {}", status, body))
}

impl Backend for RestBackend {
    fn put(&self, node: &WhisperNode) -> Result<(), StoreError> {
        let response = self
            .request(reqwest::Method::POST, &self.table_url)
            .json(&node_to_row(node))
            .send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().unwrap_or_default();
        if status == StatusCode::CONFLICT {
            return Err(StoreError::Conflict(node.id));
        }
        Err(unexpected(status, body))
    }

    fn get(&self, id: Uuid) -> Result<WhisperNode, StoreError> {
        let response = self
            .request(reqwest::Method::GET, &self.row_url(id))
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(unexpected(status, response.text().unwrap_or_default()));
        }
        let mut rows: Vec<RestRow> = response.json()?;
        match rows.pop() {
            Some(row) => Ok(row_to_node(row)),
            None => Err(StoreError::NotFound(id)),
        }
    }

    fn list_all(&self) -> Result<Vec<WhisperNode>, StoreError> {
        let url = format!("{}?select=*", self.table_url);
        let response = self.request(reqwest::Method::GET, &url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(unexpected(status, response.text().unwrap_or_default()));
        }
        let rows: Vec<RestRow> = response.json()?;
        Ok(rows.into_iter().map(row_to_node).collect())
    }

    fn load_children(&self, parent: Uuid) -> Result<(Vec<Uuid>, Version), StoreError> {
        let response = self
            .request(reqwest::Method::GET, &self.children_url(parent))
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(unexpected(status, response.text().unwrap_or_default()));
        }
        let mut rows: Vec<ChildrenRow> = response.json()?;
        let row = rows.pop().ok_or(StoreError::NotFound(parent))?;
        Ok((row.children.unwrap_or_default(), row.version as Version))
    }

    fn store_children(
        &self,
        parent: Uuid,
        expected: Version,
        children: &[Uuid],
    ) -> Result<bool, StoreError> {
        let body = serde_json::json!({
            "children": children,
            "version": expected + 1,
        });
        let response = self
            .request(reqwest::Method::PATCH, &self.guarded_patch_url(parent, expected))
            .header("Prefer", "return=representation")
            .json(&body)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(unexpected(status, response.text().unwrap_or_default()));
        }
        // Zero rows back: the filter matched nothing, i.e. the version
        // moved. Nodes are never deleted, so a vanished id is not a case.
        let rows: Vec<serde_json::Value> = response.json()?;
        Ok(!rows.is_empty())
    }
}
