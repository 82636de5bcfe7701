//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define record data access contracts.
//! - Isolate SQLite statement details from publication orchestration.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.

pub mod record_repo;

pub use record_repo::{
    parse_record_id, RecordRepository, RepoError, RepoResult, SqliteRecordRepository,
};
