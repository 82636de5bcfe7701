//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `publishable_core` linkage end to end.
//! - Seed one draft, one published and one scheduled post, then print how
//!   many rows each publication scope sees.
//!
//! # Environment
//! - `PUBLISHABLE_DB_PATH`: database file; in-memory when unset.
//! - `PUBLISHABLE_LOG_DIR`: absolute log directory; logging is off when unset.
//! - `PUBLISHABLE_LOG_LEVEL`: defaults to the build-mode level.

use log::warn;
use publishable_core::db::{open_db, open_db_in_memory};
use publishable_core::{
    default_log_level, init_logging, Clock, Post, PublicationScope, PublicationService,
    RecordRepository, SqliteRecordRepository, Tracked, DAY_MS,
};
use std::error::Error;
use std::process::ExitCode;

const SCOPES: [PublicationScope; 4] = [
    PublicationScope::Published,
    PublicationScope::Unpublished,
    PublicationScope::WithUnpublished,
    PublicationScope::WithoutPublished,
];

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("publishable_cli error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    if let Ok(log_dir) = std::env::var("PUBLISHABLE_LOG_DIR") {
        let level = std::env::var("PUBLISHABLE_LOG_LEVEL")
            .unwrap_or_else(|_| default_log_level().to_string());
        init_logging(&level, &log_dir)?;
    }

    let conn = match std::env::var("PUBLISHABLE_DB_PATH") {
        Ok(path) => open_db(path)?,
        Err(_) => open_db_in_memory()?,
    };
    let service = PublicationService::new(SqliteRecordRepository::<Post>::try_new(&conn)?);
    let now = service.repo().clock().now_epoch_ms();

    let mut draft = Tracked::new(Post::new("draft", ""));
    let mut live = Tracked::new(Post::new("live", ""));
    let mut scheduled = Tracked::new(Post::new("scheduled", ""));
    for record in [&mut draft, &mut live, &mut scheduled] {
        if !service.repo().save(record)? {
            warn!("event=cli_seed module=cli status=cancelled");
        }
    }
    service.publish(&mut live, Some(now - DAY_MS))?;
    service.publish(&mut scheduled, Some(now + DAY_MS))?;

    println!("publishable_core version={}", publishable_core::core_version());
    for scope in SCOPES {
        let count = service.count(&service.query().with_scope(scope))?;
        println!("scope={} count={count}", scope.as_str());
    }

    Ok(())
}
