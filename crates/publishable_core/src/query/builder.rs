//! Typed SELECT builder for publishable records.
//!
//! # Responsibility
//! - Collect caller predicates, ordering and paging for one record type.
//! - Combine them with the query's publication scope into SQL plus binds.
//!
//! # Invariants
//! - The scope predicate is always ANDed with the caller's predicates as a
//!   separate group, so `or_where*` can never widen visibility.
//! - Every column is table-qualified and validated before it reaches SQL.
//! - Building never touches storage.

use crate::clock::EpochMs;
use crate::model::entity::{is_valid_identifier, Entity, Publishable};
use crate::query::scope::PublicationScope;
use crate::repo::{RepoError, RepoResult};
use rusqlite::types::Value;
use std::marker::PhantomData;

/// Comparison operator for [`Condition::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// How a clause joins the clause before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        column: String,
        op: Operator,
        value: Value,
    },
    Null {
        column: String,
        negated: bool,
    },
    /// Parenthesized sub-expression.
    Group(Vec<Clause>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub connector: Connector,
    pub condition: Condition,
}

impl Clause {
    pub fn and(condition: Condition) -> Self {
        Self {
            connector: Connector::And,
            condition,
        }
    }

    pub fn or(condition: Condition) -> Self {
        Self {
            connector: Connector::Or,
            condition,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Query over one publishable record type.
///
/// Starts in [`PublicationScope::Published`]; `unpublished`,
/// `with_unpublished` and `without_published` swap the scope for this query
/// only.
#[derive(Debug, Clone)]
pub struct RecordQuery<R> {
    scope: PublicationScope,
    clauses: Vec<Clause>,
    order: Vec<(String, Direction)>,
    limit: Option<u32>,
    offset: u32,
    _record: PhantomData<fn() -> R>,
}

impl<R: Publishable> Default for RecordQuery<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Publishable> RecordQuery<R> {
    pub fn new() -> Self {
        Self {
            scope: PublicationScope::default(),
            clauses: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: 0,
            _record: PhantomData,
        }
    }

    pub fn scope(&self) -> PublicationScope {
        self.scope
    }

    pub fn with_scope(mut self, scope: PublicationScope) -> Self {
        self.scope = scope;
        self
    }

    /// Drafts and scheduled records only.
    pub fn unpublished(self) -> Self {
        self.with_scope(PublicationScope::Unpublished)
    }

    /// Every record regardless of publication state.
    pub fn with_unpublished(self) -> Self {
        self.with_scope(PublicationScope::WithUnpublished)
    }

    /// Records that were never published.
    pub fn without_published(self) -> Self {
        self.with_scope(PublicationScope::WithoutPublished)
    }

    pub fn where_cmp(self, column: &str, op: Operator, value: impl Into<Value>) -> Self {
        self.push(Clause::and(compare::<R>(column, op, value.into())))
    }

    pub fn or_where_cmp(self, column: &str, op: Operator, value: impl Into<Value>) -> Self {
        self.push(Clause::or(compare::<R>(column, op, value.into())))
    }

    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.where_cmp(column, Operator::Eq, value)
    }

    pub fn or_where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.or_where_cmp(column, Operator::Eq, value)
    }

    pub fn where_null(self, column: &str) -> Self {
        self.push(Clause::and(null::<R>(column, false)))
    }

    pub fn or_where_null(self, column: &str) -> Self {
        self.push(Clause::or(null::<R>(column, false)))
    }

    pub fn where_not_null(self, column: &str) -> Self {
        self.push(Clause::and(null::<R>(column, true)))
    }

    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.order.push((qualify::<R>(column), direction));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    /// Renders the full SELECT evaluated at `now`.
    pub fn to_sql(&self, now: EpochMs) -> RepoResult<(String, Vec<Value>)> {
        let select_list = R::COLUMNS
            .iter()
            .map(|column| format!("{} AS {column}", R::qualify_column(column)))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("SELECT {select_list} FROM {}", R::TABLE);
        let mut binds = Vec::new();
        self.render_where(now, &mut sql, &mut binds)?;

        if !self.order.is_empty() {
            let mut terms = Vec::with_capacity(self.order.len());
            for (column, direction) in &self.order {
                terms.push(format!("{} {}", checked(column)?, direction.as_sql()));
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ?");
            binds.push(Value::Integer(i64::from(limit)));
            if self.offset > 0 {
                sql.push_str(" OFFSET ?");
                binds.push(Value::Integer(i64::from(self.offset)));
            }
        } else if self.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            binds.push(Value::Integer(i64::from(self.offset)));
        }

        Ok((sql, binds))
    }

    /// Renders `SELECT COUNT(*)` with the same predicates; paging is ignored.
    pub fn to_count_sql(&self, now: EpochMs) -> RepoResult<(String, Vec<Value>)> {
        let mut sql = format!("SELECT COUNT(*) FROM {}", R::TABLE);
        let mut binds = Vec::new();
        self.render_where(now, &mut sql, &mut binds)?;
        Ok((sql, binds))
    }

    fn push(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    fn render_where(&self, now: EpochMs, sql: &mut String, binds: &mut Vec<Value>) -> RepoResult<()> {
        let mut parts = Vec::with_capacity(2);
        if let Some(condition) = self
            .scope
            .condition(&R::qualified_published_at_column(), now)
        {
            parts.push(Clause::and(condition));
        }
        if !self.clauses.is_empty() {
            parts.push(Clause::and(Condition::Group(self.clauses.clone())));
        }
        if parts.is_empty() {
            return Ok(());
        }

        sql.push_str(" WHERE ");
        render_clauses(&parts, sql, binds)
    }
}

fn qualify<R: Entity>(column: &str) -> String {
    if column.contains('.') {
        column.to_string()
    } else {
        R::qualify_column(column)
    }
}

fn compare<R: Entity>(column: &str, op: Operator, value: Value) -> Condition {
    Condition::Compare {
        column: qualify::<R>(column),
        op,
        value,
    }
}

fn null<R: Entity>(column: &str, negated: bool) -> Condition {
    Condition::Null {
        column: qualify::<R>(column),
        negated,
    }
}

fn checked(column: &str) -> RepoResult<&str> {
    if is_valid_identifier(column) {
        Ok(column)
    } else {
        Err(RepoError::InvalidIdentifier(column.to_string()))
    }
}

fn render_clauses(clauses: &[Clause], sql: &mut String, binds: &mut Vec<Value>) -> RepoResult<()> {
    for (index, clause) in clauses.iter().enumerate() {
        if index > 0 {
            sql.push_str(match clause.connector {
                Connector::And => " AND ",
                Connector::Or => " OR ",
            });
        }
        render_condition(&clause.condition, sql, binds)?;
    }
    Ok(())
}

fn render_condition(condition: &Condition, sql: &mut String, binds: &mut Vec<Value>) -> RepoResult<()> {
    match condition {
        Condition::Compare { column, op, value } => {
            sql.push_str(&format!("{} {} ?", checked(column)?, op.as_sql()));
            binds.push(value.clone());
        }
        Condition::Null { column, negated } => {
            let test = if *negated { "IS NOT NULL" } else { "IS NULL" };
            sql.push_str(&format!("{} {test}", checked(column)?));
        }
        Condition::Group(inner) if inner.len() == 1 => {
            render_condition(&inner[0].condition, sql, binds)?;
        }
        Condition::Group(inner) if inner.is_empty() => sql.push_str("1 = 1"),
        Condition::Group(inner) => {
            sql.push('(');
            render_clauses(inner, sql, binds)?;
            sql.push(')');
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Direction, Operator};
    use crate::model::entity::Publishable;
    use crate::model::page::Page;
    use crate::model::post::Post;
    use crate::repo::RepoError;
    use rusqlite::types::Value;

    const NOW: i64 = 1_000;
    const SELECT_POSTS: &str = "SELECT posts.uuid AS uuid, posts.title AS title, posts.body AS body, posts.published_at AS published_at, posts.updated_at AS updated_at FROM posts";

    #[test]
    fn default_query_filters_published_as_of_now() {
        let (sql, binds) = Post::query().to_sql(NOW).unwrap();
        assert_eq!(sql, format!("{SELECT_POSTS} WHERE posts.published_at <= ?"));
        assert_eq!(binds, vec![Value::Integer(NOW)]);
    }

    #[test]
    fn unpublished_groups_null_or_future() {
        let (sql, binds) = Post::query().unpublished().to_sql(NOW).unwrap();
        assert_eq!(
            sql,
            format!("{SELECT_POSTS} WHERE (posts.published_at IS NULL OR posts.published_at > ?)")
        );
        assert_eq!(binds, vec![Value::Integer(NOW)]);
    }

    #[test]
    fn with_unpublished_drops_the_predicate() {
        let (sql, binds) = Post::query().with_unpublished().to_sql(NOW).unwrap();
        assert_eq!(sql, SELECT_POSTS);
        assert!(binds.is_empty());
    }

    #[test]
    fn without_published_selects_nulls_only() {
        let (sql, _) = Post::query().without_published().to_sql(NOW).unwrap();
        assert_eq!(sql, format!("{SELECT_POSTS} WHERE posts.published_at IS NULL"));
    }

    #[test]
    fn caller_or_clauses_cannot_widen_the_scope() {
        let (sql, binds) = Post::query()
            .unpublished()
            .where_eq("title", "a".to_string())
            .or_where_eq("title", "b".to_string())
            .to_sql(NOW)
            .unwrap();
        assert_eq!(
            sql,
            format!(
                "{SELECT_POSTS} WHERE (posts.published_at IS NULL OR posts.published_at > ?) AND (posts.title = ? OR posts.title = ?)"
            )
        );
        assert_eq!(
            binds,
            vec![
                Value::Integer(NOW),
                Value::Text("a".to_string()),
                Value::Text("b".to_string()),
            ]
        );
    }

    #[test]
    fn ordering_and_paging_follow_predicates() {
        let (sql, binds) = Post::query()
            .with_unpublished()
            .where_cmp("updated_at", Operator::Ge, 5_i64)
            .order_by("published_at", Direction::Desc)
            .limit(10)
            .offset(20)
            .to_sql(NOW)
            .unwrap();
        assert!(sql.ends_with(
            "WHERE posts.updated_at >= ? ORDER BY posts.published_at DESC LIMIT ? OFFSET ?"
        ));
        assert_eq!(
            binds,
            vec![Value::Integer(5), Value::Integer(10), Value::Integer(20)]
        );
    }

    #[test]
    fn offset_without_limit_uses_unbounded_limit() {
        let (sql, _) = Post::query().with_unpublished().offset(3).to_sql(NOW).unwrap();
        assert!(sql.ends_with("LIMIT -1 OFFSET ?"));
    }

    #[test]
    fn count_ignores_paging() {
        let (sql, binds) = Post::query().limit(1).to_count_sql(NOW).unwrap();
        assert_eq!(sql, "SELECT COUNT(*) FROM posts WHERE posts.published_at <= ?");
        assert_eq!(binds, vec![Value::Integer(NOW)]);
    }

    #[test]
    fn renamed_column_is_used_in_every_scope() {
        let (sql, _) = Page::query().to_sql(NOW).unwrap();
        assert!(sql.ends_with("WHERE pages.go_live_at <= ?"));
        let (sql, _) = Page::query().without_published().to_sql(NOW).unwrap();
        assert!(sql.ends_with("WHERE pages.go_live_at IS NULL"));
    }

    #[test]
    fn invalid_column_is_rejected_before_execution() {
        let err = Post::query()
            .where_eq("title; DROP TABLE posts", 1_i64)
            .to_sql(NOW)
            .unwrap_err();
        assert!(matches!(err, RepoError::InvalidIdentifier(_)));
    }
}
