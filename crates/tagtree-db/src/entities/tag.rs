//! Tag and translation rows.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use tagtree_core::{KeywordRow, TagRow};

/// Column list matching [`TagRecord`].
pub const TAG_COLUMNS: &str = "id, parent_id, main_tag_id, keyword, depth, path_string, \
     modified, remote_id, main_language_id, language_mask";

/// A row of `tags`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TagRecord {
    pub id: i64,
    /// 0 for root-level tags.
    pub parent_id: i64,
    /// 0 for main tags.
    pub main_tag_id: i64,
    pub keyword: String,
    pub depth: i32,
    pub path_string: String,
    /// Unix seconds.
    pub modified: i64,
    pub remote_id: String,
    pub main_language_id: i64,
    pub language_mask: i64,
}

impl From<TagRecord> for TagRow {
    fn from(r: TagRecord) -> Self {
        Self {
            id: r.id,
            parent_id: r.parent_id,
            main_tag_id: r.main_tag_id,
            keyword: r.keyword,
            depth: r.depth,
            path_string: r.path_string,
            modified: r.modified,
            remote_id: r.remote_id,
            main_language_id: r.main_language_id,
            language_mask: r.language_mask,
        }
    }
}

/// A row of `tag_keywords`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct KeywordRecord {
    pub keyword_id: i64,
    pub language_id: i64,
    pub keyword: String,
    pub locale: String,
    pub status: i32,
}

impl From<KeywordRecord> for KeywordRow {
    fn from(r: KeywordRecord) -> Self {
        Self {
            keyword_id: r.keyword_id,
            language_id: r.language_id,
            keyword: r.keyword,
            locale: r.locale,
            status: r.status,
        }
    }
}
