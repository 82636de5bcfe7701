//! Page record: goes live at `go_live_at` and keeps no modification time.

use crate::clock::EpochMs;
use crate::model::entity::{Entity, Publishable, RecordId};
use crate::model::post::optional_integer;
use crate::repo::{parse_record_id, RepoResult};
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Static page row stored in `pages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub uuid: RecordId,
    /// Unique URL slug.
    pub slug: String,
    pub go_live_at: Option<EpochMs>,
}

impl Page {
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            slug: slug.into(),
            go_live_at: None,
        }
    }
}

impl Entity for Page {
    const TABLE: &'static str = "pages";
    const COLUMNS: &'static [&'static str] = &["uuid", "slug", "go_live_at"];
    const UPDATED_AT: Option<&'static str> = None;

    fn key(&self) -> RecordId {
        self.uuid
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        let uuid_text: String = row.get("uuid")?;
        Ok(Self {
            uuid: parse_record_id(&uuid_text, Self::TABLE, Self::KEY)?,
            slug: row.get("slug")?,
            go_live_at: row.get("go_live_at")?,
        })
    }

    fn to_values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("slug", Value::Text(self.slug.clone())),
            ("go_live_at", optional_integer(self.go_live_at)),
        ]
    }
}

impl Publishable for Page {
    const PUBLISHED_AT: &'static str = "go_live_at";

    fn published_at(&self) -> Option<EpochMs> {
        self.go_live_at
    }

    fn set_published_at(&mut self, value: Option<EpochMs>) {
        self.go_live_at = value;
    }
}
