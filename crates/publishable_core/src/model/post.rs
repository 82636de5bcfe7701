//! Post record: a publishable article that tracks modification time.
//!
//! # Invariants
//! - `uuid` is stable and never reused for another post.
//! - `published_at` is the only source of truth for visibility.

use crate::clock::EpochMs;
use crate::model::entity::{Entity, Publishable, RecordId};
use crate::repo::{parse_record_id, RepoResult};
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Article row stored in `posts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Stable global ID.
    pub uuid: RecordId,
    pub title: String,
    /// Markdown body.
    pub body: String,
    /// Unix epoch milliseconds; `None` while a draft.
    pub published_at: Option<EpochMs>,
    /// Unix epoch milliseconds of the last write, `None` before first save.
    pub updated_at: Option<EpochMs>,
}

impl Post {
    /// Creates an unpublished draft with a generated stable ID.
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), title, body)
    }

    /// Creates an unpublished draft with a caller-provided stable ID.
    pub fn with_id(uuid: RecordId, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            uuid,
            title: title.into(),
            body: body.into(),
            published_at: None,
            updated_at: None,
        }
    }

    /// Sets the publication time at construction, e.g. for imports.
    pub fn with_published_at(mut self, at: Option<EpochMs>) -> Self {
        self.published_at = at;
        self
    }
}

impl Entity for Post {
    const TABLE: &'static str = "posts";
    const COLUMNS: &'static [&'static str] =
        &["uuid", "title", "body", "published_at", "updated_at"];

    fn key(&self) -> RecordId {
        self.uuid
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        let uuid_text: String = row.get("uuid")?;
        Ok(Self {
            uuid: parse_record_id(&uuid_text, Self::TABLE, Self::KEY)?,
            title: row.get("title")?,
            body: row.get("body")?,
            published_at: row.get("published_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn to_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("title", Value::Text(self.title.clone())),
            ("body", Value::Text(self.body.clone())),
            ("published_at", optional_integer(self.published_at)),
            ("updated_at", optional_integer(self.updated_at)),
        ]
    }

    fn updated_at(&self) -> Option<EpochMs> {
        self.updated_at
    }

    fn set_updated_at(&mut self, at: EpochMs) {
        self.updated_at = Some(at);
    }
}

impl Publishable for Post {
    fn published_at(&self) -> Option<EpochMs> {
        self.published_at
    }

    fn set_published_at(&mut self, value: Option<EpochMs>) {
        self.published_at = value;
    }
}

pub(crate) fn optional_integer(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}
