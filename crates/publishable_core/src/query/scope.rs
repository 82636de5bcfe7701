//! Publication visibility scopes.
//!
//! # Responsibility
//! - Translate a visibility choice into a SQL condition on the qualified
//!   publication column.
//! - Mirror the same rule in memory for point-in-time checks.
//!
//! # Invariants
//! - `Published` is the default for every query.
//! - The SQL condition and [`PublicationScope::matches`] agree for every
//!   `(published_at, now)` pair.

use crate::clock::EpochMs;
use crate::query::builder::{Clause, Condition, Operator};
use rusqlite::types::Value;

/// Which records a query may see, relative to "now".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PublicationScope {
    /// `published_at <= now`.
    #[default]
    Published,
    /// `published_at IS NULL OR published_at > now`: drafts plus scheduled.
    Unpublished,
    /// No publication predicate.
    WithUnpublished,
    /// `published_at IS NULL`: drafts only.
    WithoutPublished,
}

impl PublicationScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::Unpublished => "unpublished",
            Self::WithUnpublished => "with_unpublished",
            Self::WithoutPublished => "without_published",
        }
    }

    /// Builds the predicate for `column` evaluated at `now`.
    ///
    /// Returns `None` when the scope places no restriction.
    pub fn condition(self, column: &str, now: EpochMs) -> Option<Condition> {
        match self {
            Self::Published => Some(Condition::Compare {
                column: column.to_string(),
                op: Operator::Le,
                value: Value::Integer(now),
            }),
            Self::Unpublished => Some(Condition::Group(vec![
                Clause::and(Condition::Null {
                    column: column.to_string(),
                    negated: false,
                }),
                Clause::or(Condition::Compare {
                    column: column.to_string(),
                    op: Operator::Gt,
                    value: Value::Integer(now),
                }),
            ])),
            Self::WithUnpublished => None,
            Self::WithoutPublished => Some(Condition::Null {
                column: column.to_string(),
                negated: false,
            }),
        }
    }

    /// In-memory twin of [`PublicationScope::condition`].
    pub fn matches(self, published_at: Option<EpochMs>, now: EpochMs) -> bool {
        match self {
            Self::Published => matches!(published_at, Some(at) if at <= now),
            Self::Unpublished => !matches!(published_at, Some(at) if at <= now),
            Self::WithUnpublished => true,
            Self::WithoutPublished => published_at.is_none(),
        }
    }
}
