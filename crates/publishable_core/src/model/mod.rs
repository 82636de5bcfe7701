//! Record model for publishable content.
//!
//! # Responsibility
//! - Define the capability traits a record type implements to be stored
//!   and filtered by publication state.
//! - Provide the concrete record types backed by the bundled schema.
//!
//! # Invariants
//! - Every record is identified by a stable `RecordId`.
//! - Visibility is derived from `published_at` and the clock, never stored
//!   as a flag.

pub mod entity;
pub mod page;
pub mod post;
pub mod tracked;
