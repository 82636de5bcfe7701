//! Record capability traits.
//!
//! # Responsibility
//! - Describe how a record type maps onto one SQLite table.
//! - Describe where a publishable record keeps its `published_at` timestamp.
//!
//! # Invariants
//! - Every identifier exposed here must pass [`is_valid_identifier`];
//!   repositories refuse to construct otherwise.
//! - `published_at` semantics: `None` never published, `<= now` published,
//!   `> now` scheduled.

use crate::clock::EpochMs;
use crate::query::{PublicationScope, RecordQuery};
use crate::repo::RepoResult;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;
use rusqlite::Row;
use uuid::Uuid;

/// Stable identifier for every persisted record.
pub type RecordId = Uuid;

/// Default name of the publication timestamp column.
pub const DEFAULT_PUBLISHED_AT_COLUMN: &str = "published_at";

static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .expect("identifier pattern is valid")
});

/// Returns whether `value` is a plain or table-qualified SQL identifier.
///
/// Identifiers are interpolated into SQL text, so anything else is rejected.
pub fn is_valid_identifier(value: &str) -> bool {
    IDENTIFIER_RE.is_match(value)
}

/// A record type persisted in exactly one table.
pub trait Entity: Clone + Sized + 'static {
    /// Storage table name.
    const TABLE: &'static str;
    /// Primary key column, stored as UUID text.
    const KEY: &'static str = "uuid";
    /// Columns hydrated by [`Entity::from_row`], key included.
    const COLUMNS: &'static [&'static str];
    /// Modification-time column refreshed on every write, `None` if untracked.
    const UPDATED_AT: Option<&'static str> = Some("updated_at");

    fn key(&self) -> RecordId;

    /// Builds a record from one row selected with [`Entity::COLUMNS`].
    fn from_row(row: &Row<'_>) -> RepoResult<Self>;

    /// Column/value pairs written by a full save, key excluded.
    fn to_values(&self) -> Vec<(&'static str, Value)>;

    fn updated_at(&self) -> Option<EpochMs> {
        None
    }

    fn set_updated_at(&mut self, _at: EpochMs) {}

    /// Prefixes `column` with the table name for multi-table predicates.
    fn qualify_column(column: &str) -> String {
        format!("{}.{column}", Self::TABLE)
    }
}

/// A record whose visibility is governed by a nullable publication timestamp.
pub trait Publishable: Entity {
    /// Publication column; override per type to rename it.
    const PUBLISHED_AT: &'static str = DEFAULT_PUBLISHED_AT_COLUMN;

    fn published_at(&self) -> Option<EpochMs>;

    fn set_published_at(&mut self, value: Option<EpochMs>);

    fn published_at_column() -> &'static str {
        Self::PUBLISHED_AT
    }

    fn qualified_published_at_column() -> String {
        Self::qualify_column(Self::PUBLISHED_AT)
    }

    /// Point-in-time visibility check; no side effects.
    fn is_published_at(&self, now: EpochMs) -> bool {
        PublicationScope::Published.matches(self.published_at(), now)
    }

    /// Starts a query narrowed to records published as of execution time.
    fn query() -> RecordQuery<Self> {
        RecordQuery::new()
    }
}

/// Checks every identifier a record type contributes to generated SQL.
///
/// Returns the first offending identifier.
pub(crate) fn invalid_identifier<R: Publishable>() -> Option<String> {
    std::iter::once(R::TABLE)
        .chain(std::iter::once(R::KEY))
        .chain(std::iter::once(R::PUBLISHED_AT))
        .chain(R::UPDATED_AT)
        .chain(R::COLUMNS.iter().copied())
        .find(|identifier| !is_valid_identifier(identifier) || identifier.contains('.'))
        .map(str::to_string)
}
