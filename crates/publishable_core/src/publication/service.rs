//! Publication use-case service.
//!
//! # Responsibility
//! - Move a single record between unpublished, scheduled and published.
//! - Fire `published`, `unpublishing` and `unpublished` around the change.
//! - Offer quiet variants that suspend every listener for the call.
//!
//! # Invariants
//! - `publish` writes only the publication column (plus `updated_at` when the
//!   record type tracks it) and never re-saves the whole row.
//! - A vetoed `unpublish` mutates nothing, in memory or in storage.
//! - Listener errors abort the call and reach the caller unchanged.

use crate::clock::EpochMs;
use crate::model::entity::{Entity, Publishable, RecordId};
use crate::model::tracked::Tracked;
use crate::publication::events::{ListenerResult, ModelEvent, Propagation};
use crate::query::{PublicationScope, RecordQuery};
use crate::repo::{RecordRepository, RepoResult};
use log::info;
use rusqlite::types::Value;

/// Publication operations over one record repository.
pub struct PublicationService<S: RecordRepository> {
    repo: S,
}

impl<S: RecordRepository> PublicationService<S> {
    pub fn new(repo: S) -> Self {
        Self { repo }
    }

    pub fn repo(&self) -> &S {
        &self.repo
    }

    /// Publishes `record` at `time`, defaulting to now.
    ///
    /// A future `time` schedules the record: it is stored but stays
    /// invisible to the default scope until the clock passes it.
    ///
    /// # Errors
    /// - `RepoError::NotFound` when no row has the record's key, e.g. a
    ///   record that was never saved. The update matches nothing, so the
    ///   in-memory record is left as is and `published` does not fire.
    ///   Save the record first.
    pub fn publish(
        &self,
        record: &mut Tracked<S::Record>,
        time: Option<EpochMs>,
    ) -> RepoResult<()> {
        let now = self.repo.clock().now_epoch_ms();
        let time = time.unwrap_or(now);

        let mut columns = vec![(
            <S::Record as Publishable>::PUBLISHED_AT,
            Value::Integer(time),
        )];
        let stamped_at = <S::Record as Entity>::UPDATED_AT.map(|column| {
            columns.push((column, Value::Integer(now)));
            now
        });
        self.repo.update_columns(record.key(), &columns)?;

        record.set_published_at(Some(time));
        if let Some(at) = stamped_at {
            record.set_updated_at(at);
        }
        record.sync_original_with(|original| {
            original.set_published_at(Some(time));
            if let Some(at) = stamped_at {
                original.set_updated_at(at);
            }
        });

        info!(
            "event=record_publish module=publication status=ok table={} id={} scheduled={}",
            <S::Record as Entity>::TABLE,
            record.key(),
            time > now
        );
        self.repo
            .events()
            .dispatch(ModelEvent::Published, record.get())?;
        Ok(())
    }

    /// Clears the publication timestamp and saves the record.
    ///
    /// Returns `false` when an `unpublishing` listener vetoes the change, or
    /// when the nested save is vetoed by a `saving` listener.
    pub fn unpublish(&self, record: &mut Tracked<S::Record>) -> RepoResult<bool> {
        let events = self.repo.events();
        if events.dispatch(ModelEvent::Unpublishing, record.get())? == Propagation::Halt {
            info!(
                "event=record_unpublish module=publication status=cancelled table={} id={}",
                <S::Record as Entity>::TABLE,
                record.key()
            );
            return Ok(false);
        }

        record.set_published_at(None);
        record.set_exists(true);
        let saved = self.repo.save(record)?;

        info!(
            "event=record_unpublish module=publication status={} table={} id={}",
            if saved { "ok" } else { "not_saved" },
            <S::Record as Entity>::TABLE,
            record.key()
        );
        events.dispatch(ModelEvent::Unpublished, record.get())?;
        Ok(saved)
    }

    /// [`PublicationService::publish`] at now, with every listener suspended.
    pub fn publish_quietly(&self, record: &mut Tracked<S::Record>) -> RepoResult<()> {
        self.repo
            .events()
            .without_events(|| self.publish(record, None))
    }

    /// [`PublicationService::unpublish`] with every listener suspended,
    /// including `saving`/`saved` from the nested save.
    pub fn unpublish_quietly(&self, record: &mut Tracked<S::Record>) -> RepoResult<bool> {
        self.repo.events().without_events(|| self.unpublish(record))
    }

    /// Whether `record` is visible as of the repository clock.
    pub fn is_published(&self, record: &S::Record) -> bool {
        record.is_published_at(self.repo.clock().now_epoch_ms())
    }

    pub fn on_published<F>(&self, listener: F)
    where
        F: Fn(&S::Record) -> ListenerResult + Send + Sync + 'static,
    {
        self.repo.events().on_published::<S::Record, _>(listener);
    }

    pub fn on_unpublishing<F>(&self, listener: F)
    where
        F: Fn(&S::Record) -> ListenerResult + Send + Sync + 'static,
    {
        self.repo.events().on_unpublishing::<S::Record, _>(listener);
    }

    pub fn on_unpublished<F>(&self, listener: F)
    where
        F: Fn(&S::Record) -> ListenerResult + Send + Sync + 'static,
    {
        self.repo.events().on_unpublished::<S::Record, _>(listener);
    }

    /// Starts a default-scoped query for this record type.
    pub fn query(&self) -> RecordQuery<S::Record> {
        RecordQuery::new()
    }

    pub fn get(&self, query: &RecordQuery<S::Record>) -> RepoResult<Vec<Tracked<S::Record>>> {
        self.repo.get(query)
    }

    pub fn count(&self, query: &RecordQuery<S::Record>) -> RepoResult<u64> {
        self.repo.count(query)
    }

    pub fn find(
        &self,
        id: RecordId,
        scope: PublicationScope,
    ) -> RepoResult<Option<Tracked<S::Record>>> {
        self.repo.find(id, scope)
    }
}
