//! Publication-aware query construction.
//!
//! # Responsibility
//! - Hold the default visibility filter and its explicit modifiers.
//! - Render record queries into parameterized SQL.

pub mod builder;
pub mod scope;

pub use builder::{Clause, Condition, Connector, Direction, Operator, RecordQuery};
pub use scope::PublicationScope;
