//! Content link rows.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use tagtree_core::AttributeLink;

/// A row of `content_links`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LinkRecord {
    pub id: i64,
    pub keyword_id: i64,
    pub object_id: i64,
    pub objectattribute_id: i64,
    pub objectattribute_version: i32,
    pub priority: i32,
}

impl From<LinkRecord> for AttributeLink {
    fn from(r: LinkRecord) -> Self {
        Self {
            id: r.id,
            keyword_id: r.keyword_id,
            object_id: r.object_id,
            objectattribute_id: r.objectattribute_id,
            objectattribute_version: r.objectattribute_version,
            priority: r.priority,
        }
    }
}
