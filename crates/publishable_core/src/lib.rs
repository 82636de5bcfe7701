//! Publication lifecycle for SQLite-backed records.
//!
//! Records carry a nullable `published_at` timestamp. Queries see only
//! records published as of now unless a scope modifier says otherwise, and
//! `PublicationService` publishes, schedules and unpublishes single records
//! with cancellable lifecycle events.

pub mod clock;
pub mod db;
pub mod logging;
pub mod model;
pub mod publication;
pub mod query;
pub mod repo;

pub use clock::{Clock, EpochMs, FixedClock, SystemClock, DAY_MS};
pub use logging::{
    default_log_level, init_logging, init_logging_with, logging_status, LogLevel, LoggingConfig,
    LoggingError,
};
pub use model::entity::{Entity, Publishable, RecordId, DEFAULT_PUBLISHED_AT_COLUMN};
pub use model::page::Page;
pub use model::post::Post;
pub use model::tracked::Tracked;
pub use publication::{
    EventDispatcher, ListenerError, ListenerResult, ModelEvent, Propagation, PublicationService,
};
pub use query::{Direction, Operator, PublicationScope, RecordQuery};
pub use repo::{RecordRepository, RepoError, RepoResult, SqliteRecordRepository};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
