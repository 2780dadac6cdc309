//! # tagtree-model
//!
//! Value types for the hierarchical tag taxonomy.
//! This crate provides the domain structures shared by the repository,
//! cache and persistence layers: tags and their synonyms, materialized
//! path helpers, paging/translation filters and the language mask codec.

pub mod error;
pub mod language;
pub mod path;
pub mod query;
pub mod tag;

pub use error::*;
pub use language::*;
pub use query::*;
pub use tag::*;
