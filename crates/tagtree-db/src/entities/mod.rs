//! Row types read from the tag tables.

pub mod link;
pub mod tag;

pub use link::*;
pub use tag::*;
