//! Record repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist publishable records (full saves and column-limited updates).
//! - Execute publication-scoped queries.
//! - Fire `saving`/`saved` around full saves.
//!
//! # Invariants
//! - Identifiers of the record type are validated once, at construction.
//! - Storage errors surface unchanged inside `RepoError::Db`.
//! - A vetoed save writes nothing and leaves the tracked state untouched.

use crate::clock::{Clock, SystemClock};
use crate::db::DbError;
use crate::model::entity::{invalid_identifier, Publishable, RecordId};
use crate::model::tracked::Tracked;
use crate::publication::events::{EventDispatcher, ListenerError, ModelEvent, Propagation};
use crate::query::{PublicationScope, RecordQuery};
use log::{info, warn};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for record persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound(RecordId),
    InvalidData(String),
    /// Table or column name that cannot be interpolated into SQL.
    InvalidIdentifier(String),
    Listener(ListenerError),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted record data: {message}"),
            Self::InvalidIdentifier(value) => write!(f, "invalid SQL identifier `{value}`"),
            Self::Listener(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Listener(err) => Some(err),
            Self::NotFound(_) | Self::InvalidData(_) | Self::InvalidIdentifier(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ListenerError> for RepoError {
    fn from(value: ListenerError) -> Self {
        Self::Listener(value)
    }
}

/// Repository interface for one publishable record type.
pub trait RecordRepository {
    type Record: Publishable;

    /// Inserts or updates the full row.
    ///
    /// Returns `false` when a `saving` listener vetoed the write.
    fn save(&self, record: &mut Tracked<Self::Record>) -> RepoResult<bool>;

    /// Updates only `columns` on the row keyed by `id`.
    fn update_columns(&self, id: RecordId, columns: &[(&str, Value)]) -> RepoResult<()>;

    fn find(&self, id: RecordId, scope: PublicationScope)
        -> RepoResult<Option<Tracked<Self::Record>>>;

    fn get(&self, query: &RecordQuery<Self::Record>) -> RepoResult<Vec<Tracked<Self::Record>>>;

    fn first(
        &self,
        query: &RecordQuery<Self::Record>,
    ) -> RepoResult<Option<Tracked<Self::Record>>> {
        let limited = query.clone().limit(1);
        Ok(self.get(&limited)?.into_iter().next())
    }

    fn count(&self, query: &RecordQuery<Self::Record>) -> RepoResult<u64>;

    fn events(&self) -> &EventDispatcher;

    fn clock(&self) -> &dyn Clock;
}

/// SQLite-backed repository for record type `R`.
pub struct SqliteRecordRepository<'conn, R> {
    conn: &'conn Connection,
    events: EventsHandle,
    clock: Arc<dyn Clock>,
    _record: PhantomData<fn() -> R>,
}

enum EventsHandle {
    Global,
    Owned(Arc<EventDispatcher>),
}

impl<'conn, R: Publishable + PartialEq> SqliteRecordRepository<'conn, R> {
    /// Uses the process-wide dispatcher and the system clock.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        Self::build(conn, EventsHandle::Global, Arc::new(SystemClock))
    }

    /// Uses caller-provided listeners and time source.
    pub fn try_with(
        conn: &'conn Connection,
        events: Arc<EventDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> RepoResult<Self> {
        Self::build(conn, EventsHandle::Owned(events), clock)
    }

    fn build(
        conn: &'conn Connection,
        events: EventsHandle,
        clock: Arc<dyn Clock>,
    ) -> RepoResult<Self> {
        if let Some(identifier) = invalid_identifier::<R>() {
            return Err(RepoError::InvalidIdentifier(identifier));
        }
        ensure_table_exists(conn, R::TABLE)?;

        Ok(Self {
            conn,
            events,
            clock,
            _record: PhantomData,
        })
    }

    fn insert(&self, record: &R) -> RepoResult<()> {
        let values = record.to_values();
        let columns = std::iter::once(R::KEY)
            .chain(values.iter().map(|(column, _)| *column))
            .collect::<Vec<_>>();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders});",
            R::TABLE,
            columns.join(", ")
        );

        let binds = std::iter::once(Value::Text(record.key().to_string()))
            .chain(values.into_iter().map(|(_, value)| value));
        self.conn.execute(&sql, params_from_iter(binds))?;
        Ok(())
    }

    fn stamp(&self, record: &mut R) {
        if R::UPDATED_AT.is_some() {
            record.set_updated_at(self.clock.now_epoch_ms());
        }
    }
}

impl<R: Publishable + PartialEq> RecordRepository for SqliteRecordRepository<'_, R> {
    type Record = R;

    fn save(&self, record: &mut Tracked<R>) -> RepoResult<bool> {
        if self.events().dispatch(ModelEvent::Saving, record.get())? == Propagation::Halt {
            info!(
                "event=record_save module=repo status=cancelled table={} id={}",
                R::TABLE,
                record.key()
            );
            return Ok(false);
        }

        if record.exists() {
            if record.is_dirty() {
                // Stamp a copy so a failed update leaves the record untouched.
                let mut staged = record.get().clone();
                self.stamp(&mut staged);
                let columns = staged.to_values();
                self.update_columns(staged.key(), &columns)?;
                *record.get_mut() = staged;
            }
        } else {
            let mut staged = record.get().clone();
            self.stamp(&mut staged);
            self.insert(&staged)?;
            *record.get_mut() = staged;
            record.set_exists(true);
        }
        record.sync_original();

        info!(
            "event=record_save module=repo status=ok table={} id={}",
            R::TABLE,
            record.key()
        );
        self.events().dispatch(ModelEvent::Saved, record.get())?;
        Ok(true)
    }

    fn update_columns(&self, id: RecordId, columns: &[(&str, Value)]) -> RepoResult<()> {
        if columns.is_empty() {
            return Ok(());
        }
        if let Some((column, _)) = columns.iter().find(|(column, _)| {
            *column == R::KEY || !R::COLUMNS.iter().any(|known| known == column)
        }) {
            return Err(RepoError::InvalidIdentifier(column.to_string()));
        }

        let assignments = columns
            .iter()
            .map(|(column, _)| format!("{column} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {assignments} WHERE {} = ?;",
            R::TABLE,
            R::KEY
        );
        let binds = columns
            .iter()
            .map(|(_, value)| value.clone())
            .chain(std::iter::once(Value::Text(id.to_string())));

        let changed = self.conn.execute(&sql, params_from_iter(binds))?;
        if changed == 0 {
            warn!(
                "event=record_update module=repo status=error table={} id={id} error_code=not_found",
                R::TABLE
            );
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }

    fn find(&self, id: RecordId, scope: PublicationScope) -> RepoResult<Option<Tracked<R>>> {
        let query = RecordQuery::<R>::new()
            .with_scope(scope)
            .where_eq(R::KEY, id.to_string());
        self.first(&query)
    }

    fn get(&self, query: &RecordQuery<R>) -> RepoResult<Vec<Tracked<R>>> {
        let (sql, binds) = query.to_sql(self.clock.now_epoch_ms())?;
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut records = Vec::new();

        while let Some(row) = rows.next()? {
            records.push(Tracked::hydrated(R::from_row(row)?));
        }

        Ok(records)
    }

    fn count(&self, query: &RecordQuery<R>) -> RepoResult<u64> {
        let (sql, binds) = query.to_count_sql(self.clock.now_epoch_ms())?;
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(binds), |row| row.get(0))?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative row count {count}")))
    }

    fn events(&self) -> &EventDispatcher {
        match &self.events {
            EventsHandle::Global => EventDispatcher::global(),
            EventsHandle::Owned(events) => events.as_ref(),
        }
    }

    fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}

/// Parses a stored UUID key, naming the offending column on failure.
pub fn parse_record_id(value: &str, table: &str, column: &str) -> RepoResult<RecordId> {
    Uuid::parse_str(value).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{value}` in {table}.{column}"))
    })
}

fn ensure_table_exists(conn: &Connection, table: &str) -> RepoResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;

    if exists == 1 {
        Ok(())
    } else {
        Err(RepoError::InvalidData(format!(
            "table `{table}` is missing; open the database through db::open_db"
        )))
    }
}
