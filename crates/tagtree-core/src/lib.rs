//! # tagtree-core
//!
//! Tag tree repository for tagtree.
//!
//! This crate provides:
//! - The storage gateway contract and an in-memory gateway
//! - The tag repository (`TagsHandler`) enforcing tree invariants
//! - A read-through caching decorator with label based invalidation
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tagtree_core::{MemoryTagGateway, TagsConfig, TagsService};
//! use tagtree_model::{CreateStruct, Translations};
//!
//! # async fn demo() -> tagtree_model::TagsResult<()> {
//! let config = TagsConfig::default();
//! let languages = config.language_registry()?;
//! let gateway = Arc::new(MemoryTagGateway::new(languages.clone()));
//! let tags = config.build_service(gateway, languages);
//!
//! let animals = tags
//!     .create(&CreateStruct::new(0, "eng-GB").with_keyword("Animals", None))
//!     .await?;
//! let loaded = tags.load(animals.id, &Translations::all()).await?;
//! assert_eq!(loaded.path_string, format!("/{}/", animals.id));
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cached;
pub mod config;
pub mod gateway;
pub mod handler;
pub mod logger;
pub mod mapper;
pub mod memory;
pub mod service;

pub use cache::{CacheStats, MemoryTagCache, TagAwareCache};
pub use cached::{cache_tags, CachedTagsHandler};
pub use config::TagsConfig;
pub use gateway::{
    AttributeLink, FullTagData, KeywordRow, TagGateway, TagRow, TagTransaction,
    CONTENT_STATUS_PUBLISHED, KEYWORD_STATUS_PUBLISHED,
};
pub use handler::TagsHandler;
pub use logger::{CallCountLogger, PersistenceLogger, TracingPersistenceLogger};
pub use mapper::TagMapper;
pub use memory::{ContentObject, MemoryTagGateway};
pub use service::TagsService;
