//! Tag values handed out by the repository layer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::path;

/// Whether a node is a genuine taxonomy concept or an alias of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TagKind {
    Main,
    Synonym { main_tag_id: i64 },
}

impl TagKind {
    pub fn from_main_tag_id(main_tag_id: i64) -> Self {
        if main_tag_id > 0 {
            Self::Synonym { main_tag_id }
        } else {
            Self::Main
        }
    }

    /// Storage encoding: 0 for main tags.
    pub fn main_tag_id(self) -> i64 {
        match self {
            Self::Main => 0,
            Self::Synonym { main_tag_id } => main_tag_id,
        }
    }
}

/// A tag with its translations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    /// 0 for root-level tags.
    pub parent_tag_id: i64,
    pub kind: TagKind,
    /// Keyword in the best matching requested language.
    pub keyword: String,
    /// Locale code → keyword.
    pub keywords: BTreeMap<String, String>,
    pub depth: i32,
    pub path_string: String,
    pub modification_date: DateTime<Utc>,
    pub remote_id: String,
    pub always_available: bool,
    pub main_language_code: String,
    pub language_codes: Vec<String>,
}

impl Tag {
    pub fn is_synonym(&self) -> bool {
        matches!(self.kind, TagKind::Synonym { .. })
    }

    pub fn main_tag_id(&self) -> i64 {
        self.kind.main_tag_id()
    }

    /// Ids from the root down to this tag.
    pub fn path_ids(&self) -> Vec<i64> {
        path::path_ids(&self.path_string)
    }

    pub fn keyword_in(&self, language_code: &str) -> Option<&str> {
        self.keywords.get(language_code).map(String::as_str)
    }
}

/// Basic tag data without the translations map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagInfo {
    pub id: i64,
    pub parent_tag_id: i64,
    pub kind: TagKind,
    /// Main language keyword.
    pub keyword: String,
    pub depth: i32,
    pub path_string: String,
    pub modification_date: DateTime<Utc>,
    pub remote_id: String,
    pub always_available: bool,
    pub main_language_code: String,
    pub language_codes: Vec<String>,
}

impl TagInfo {
    pub fn is_synonym(&self) -> bool {
        matches!(self.kind, TagKind::Synonym { .. })
    }

    pub fn main_tag_id(&self) -> i64 {
        self.kind.main_tag_id()
    }
}

/// Input for creating a main tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateStruct {
    /// 0 creates a root-level tag.
    pub parent_tag_id: i64,
    pub main_language_code: String,
    pub keywords: BTreeMap<String, String>,
    pub remote_id: String,
    pub always_available: bool,
}

impl CreateStruct {
    pub fn new(parent_tag_id: i64, main_language_code: impl Into<String>) -> Self {
        Self {
            parent_tag_id,
            main_language_code: main_language_code.into(),
            keywords: BTreeMap::new(),
            remote_id: String::new(),
            always_available: true,
        }
    }

    /// Set a keyword; `None` uses the main language.
    pub fn set_keyword(&mut self, keyword: impl Into<String>, language: Option<&str>) {
        let language = language.unwrap_or(&self.main_language_code).to_string();
        self.keywords.insert(language, keyword.into());
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>, language: Option<&str>) -> Self {
        self.set_keyword(keyword, language);
        self
    }

    pub fn with_remote_id(mut self, remote_id: impl Into<String>) -> Self {
        self.remote_id = remote_id.into();
        self
    }

    pub fn main_keyword(&self) -> Option<&str> {
        self.keywords.get(&self.main_language_code).map(String::as_str)
    }
}

/// Input for creating a synonym of an existing main tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynonymCreateStruct {
    pub main_tag_id: i64,
    pub main_language_code: String,
    pub keywords: BTreeMap<String, String>,
    /// Generated when absent.
    pub remote_id: Option<String>,
    pub always_available: bool,
}

impl SynonymCreateStruct {
    pub fn new(main_tag_id: i64, main_language_code: impl Into<String>) -> Self {
        Self {
            main_tag_id,
            main_language_code: main_language_code.into(),
            keywords: BTreeMap::new(),
            remote_id: None,
            always_available: true,
        }
    }

    /// Set a keyword; `None` uses the main language.
    pub fn set_keyword(&mut self, keyword: impl Into<String>, language: Option<&str>) {
        let language = language.unwrap_or(&self.main_language_code).to_string();
        self.keywords.insert(language, keyword.into());
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>, language: Option<&str>) -> Self {
        self.set_keyword(keyword, language);
        self
    }

    pub fn main_keyword(&self) -> Option<&str> {
        self.keywords.get(&self.main_language_code).map(String::as_str)
    }
}

/// In-place update of a tag. Unset fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateStruct {
    /// Replaces the whole translations set when present.
    pub keywords: Option<BTreeMap<String, String>>,
    pub main_language_code: Option<String>,
    pub remote_id: Option<String>,
    pub always_available: Option<bool>,
}

impl UpdateStruct {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_none()
            && self.main_language_code.is_none()
            && self.remote_id.is_none()
            && self.always_available.is_none()
    }
}

/// A page of search hits plus the unpaged total.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub tags: Vec<Tag>,
    pub total_count: usize,
}
