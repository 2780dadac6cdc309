//! Storage gateway contract.
//!
//! The gateway owns the path string and depth invariants. Every operation
//! runs inside a unit of work obtained from [`TagGateway::begin`]; nothing is
//! visible to other readers until [`TagTransaction::commit`], and dropping
//! the unit discards all of its writes.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use tagtree_model::path;
use tagtree_model::{
    CreateStruct, LanguageMask, LanguageRegistry, Page, SynonymCreateStruct, TagsError,
    TagsResult, UpdateStruct,
};

/// Keyword rows with this status are the authoritative translations.
pub const KEYWORD_STATUS_PUBLISHED: i32 = 1;

/// Content objects with this status count as related content.
pub const CONTENT_STATUS_PUBLISHED: i32 = 1;

/// Flat storage shape of a tag or synonym row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRow {
    pub id: i64,
    pub parent_id: i64,
    pub main_tag_id: i64,
    pub keyword: String,
    pub depth: i32,
    pub path_string: String,
    pub modified: i64,
    pub remote_id: String,
    pub main_language_id: i64,
    pub language_mask: i64,
}

impl TagRow {
    pub fn is_synonym(&self) -> bool {
        self.main_tag_id > 0
    }

    pub fn mask(&self) -> LanguageMask {
        LanguageMask(self.language_mask)
    }
}

/// One translation of a tag keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRow {
    /// Id of the owning tag.
    pub keyword_id: i64,
    pub language_id: i64,
    pub keyword: String,
    pub locale: String,
    pub status: i32,
}

/// A tag row together with its published translations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullTagData {
    pub row: TagRow,
    /// Locale → keyword.
    pub keywords: BTreeMap<String, String>,
}

/// Association between a content attribute version and a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeLink {
    pub id: i64,
    /// Id of the linked tag.
    pub keyword_id: i64,
    pub object_id: i64,
    pub objectattribute_id: i64,
    pub objectattribute_version: i32,
    pub priority: i32,
}

/// Opens units of work against a backing store.
#[async_trait]
pub trait TagGateway: Send + Sync {
    async fn begin(&self) -> TagsResult<Box<dyn TagTransaction>>;
}

/// Tree reading and tree mutating primitives inside one unit of work.
#[async_trait]
pub trait TagTransaction: Send {
    /// Row of the tag with `tag_id`.
    async fn get_basic_tag_data(&mut self, tag_id: i64) -> TagsResult<TagRow>;

    /// Row and published translations of the tag with `tag_id`.
    async fn get_full_tag_data(&mut self, tag_id: i64) -> TagsResult<FullTagData>;

    async fn get_basic_tag_data_by_remote_id(&mut self, remote_id: &str) -> TagsResult<TagRow>;

    async fn get_full_tag_data_by_remote_id(&mut self, remote_id: &str)
        -> TagsResult<FullTagData>;

    /// Resolve a `/`-separated keyword path by walking down from the root.
    async fn get_basic_tag_data_by_url(&mut self, url: &str) -> TagsResult<TagRow>;

    /// Tag under `parent_id` having `keyword` in any translation.
    async fn get_full_tag_data_by_keyword_and_parent_id(
        &mut self,
        keyword: &str,
        parent_id: i64,
    ) -> TagsResult<FullTagData>;

    /// First level children of `parent_id`, synonyms excluded.
    async fn get_children(&mut self, parent_id: i64, page: Page) -> TagsResult<Vec<FullTagData>>;

    async fn get_children_count(&mut self, parent_id: i64) -> TagsResult<usize>;

    /// Tags having a translation equal to `keyword`.
    async fn get_tags_by_keyword(
        &mut self,
        keyword: &str,
        page: Page,
    ) -> TagsResult<Vec<FullTagData>>;

    async fn get_tags_by_keyword_count(&mut self, keyword: &str) -> TagsResult<usize>;

    /// Tags having a translation starting with `prefix`.
    async fn search_tags(&mut self, prefix: &str, page: Page) -> TagsResult<Vec<FullTagData>>;

    async fn search_tags_count(&mut self, prefix: &str) -> TagsResult<usize>;

    async fn get_synonyms(&mut self, tag_id: i64, page: Page) -> TagsResult<Vec<FullTagData>>;

    async fn get_synonym_count(&mut self, tag_id: i64) -> TagsResult<usize>;

    /// Distinct ids of published content whose current version links the tag.
    async fn get_related_content_ids(&mut self, tag_id: i64, page: Page) -> TagsResult<Vec<i64>>;

    async fn get_related_content_count(&mut self, tag_id: i64) -> TagsResult<usize>;

    /// Re-point a synonym at `main_tag`, adopting its parent context.
    async fn move_synonym(&mut self, synonym_id: i64, main_tag: &TagRow) -> TagsResult<()>;

    /// Insert a main tag below `parent` (root level when `None`); returns the new id.
    async fn create(
        &mut self,
        create_struct: &CreateStruct,
        parent: Option<&TagRow>,
    ) -> TagsResult<i64>;

    /// In-place update; never touches path or depth.
    async fn update(&mut self, update_struct: &UpdateStruct, tag_id: i64) -> TagsResult<()>;

    /// Insert a synonym of `main_tag`; returns the new id.
    async fn create_synonym(
        &mut self,
        synonym_struct: &SynonymCreateStruct,
        main_tag: &TagRow,
    ) -> TagsResult<i64>;

    /// Turn an existing main tag into a synonym of `main_tag`.
    async fn convert_to_synonym(&mut self, tag_id: i64, main_tag: &TagRow) -> TagsResult<()>;

    /// Move content links from one tag to another without duplicating any.
    async fn transfer_tag_attribute_links(
        &mut self,
        tag_id: i64,
        target_tag_id: i64,
    ) -> TagsResult<()>;

    /// Move the subtree (and synonyms) of `source` below `destination`.
    /// Returns the updated source row.
    async fn move_subtree(
        &mut self,
        source: &TagRow,
        destination: Option<&TagRow>,
    ) -> TagsResult<TagRow>;

    /// Delete a tag, its subtree, its synonyms and everything they own.
    /// Deleting an unknown id is a no-op.
    async fn delete_tag(&mut self, tag_id: i64) -> TagsResult<()>;

    /// Touch `modified` of every tag embedded in `path_string`.
    async fn update_subtree_modification_time(
        &mut self,
        path_string: &str,
        timestamp: Option<i64>,
    ) -> TagsResult<()>;

    async fn commit(self: Box<Self>) -> TagsResult<()>;

    async fn rollback(self: Box<Self>) -> TagsResult<()>;
}

/// Current unix timestamp in seconds.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Fresh globally unique remote id: md5 hex digest of a random uuid.
pub fn generate_remote_id() -> String {
    format!("{:x}", md5::compute(uuid::Uuid::new_v4().as_bytes()))
}

/// URL-decoded, non-blank segments of a keyword path.
pub fn url_segments(url: &str) -> Vec<String> {
    url.split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            urlencoding::decode(segment)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| segment.to_string())
        })
        .collect()
}

/// Language data derived from a set of keywords.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationSet {
    pub main_keyword: String,
    pub main_language_id: i64,
    pub language_mask: i64,
    /// Locale, language id, keyword.
    pub keywords: Vec<(String, i64, String)>,
}

impl TranslationSet {
    /// Resolve every locale through the registry and encode the mask.
    pub fn build(
        keywords: &BTreeMap<String, String>,
        main_language_code: &str,
        always_available: bool,
        registry: &dyn LanguageRegistry,
    ) -> TagsResult<Self> {
        let main_keyword = keywords.get(main_language_code).cloned().ok_or_else(|| {
            TagsError::invalid_argument(
                "keywords",
                format!("missing keyword in main language '{}'", main_language_code),
            )
        })?;

        let main_language_id = registry.language_id(main_language_code)?;
        let mask = LanguageMask::generate(
            keywords.keys().map(String::as_str),
            always_available,
            registry,
        )?;

        let mut resolved = Vec::with_capacity(keywords.len());
        for (locale, keyword) in keywords {
            resolved.push((locale.clone(), registry.language_id(locale)?, keyword.clone()));
        }

        Ok(Self {
            main_keyword,
            main_language_id,
            language_mask: mask.value(),
            keywords: resolved,
        })
    }

    pub fn keyword_rows(&self, tag_id: i64) -> Vec<KeywordRow> {
        self.keywords
            .iter()
            .map(|(locale, language_id, keyword)| KeywordRow {
                keyword_id: tag_id,
                language_id: *language_id,
                keyword: keyword.clone(),
                locale: locale.clone(),
                status: KEYWORD_STATUS_PUBLISHED,
            })
            .collect()
    }
}

/// Translations to write for an update, `None` when the update leaves
/// keywords, main language and always-available flag untouched.
pub fn plan_translation_update(
    update_struct: &UpdateStruct,
    current: &FullTagData,
    registry: &dyn LanguageRegistry,
) -> TagsResult<Option<TranslationSet>> {
    if update_struct.keywords.is_none()
        && update_struct.main_language_code.is_none()
        && update_struct.always_available.is_none()
    {
        return Ok(None);
    }

    let keywords = update_struct
        .keywords
        .as_ref()
        .unwrap_or(&current.keywords);
    if keywords.is_empty() {
        return Err(TagsError::invalid_argument(
            "keywords",
            "a tag needs at least one keyword",
        ));
    }
    let main_language_code = match &update_struct.main_language_code {
        Some(code) => code.clone(),
        None => registry.language_code(current.row.main_language_id)?,
    };
    let always_available = update_struct
        .always_available
        .unwrap_or_else(|| current.row.mask().is_always_available());

    TranslationSet::build(keywords, &main_language_code, always_available, registry).map(Some)
}

/// Rewrite the rows selected for a subtree move.
///
/// `rows` holds every row whose path starts with the source path plus the
/// source's synonyms. Paths are rebased from the source's former parent
/// prefix onto the destination path, depths are recomputed from the new
/// paths, and only the source and its synonyms are re-parented; every other
/// row keeps its parent, which moved along with it.
pub fn plan_subtree_move(
    source: &TagRow,
    destination: Option<&TagRow>,
    rows: Vec<TagRow>,
    timestamp: i64,
) -> Vec<TagRow> {
    let former_parent_path = path::parent_path(&source.path_string);
    let destination_path = destination
        .map(|d| d.path_string.as_str())
        .unwrap_or(path::ROOT_PATH);
    let destination_id = destination.map(|d| d.id).unwrap_or(0);

    rows.into_iter()
        .map(|mut row| {
            let new_path = path::rebase(&row.path_string, &former_parent_path, destination_path);
            if row.id == source.id || row.main_tag_id == source.id {
                row.parent_id = destination_id;
            }
            row.depth = path::depth_of(&new_path);
            row.path_string = new_path;
            row.modified = timestamp;
            row
        })
        .collect()
}

/// Fields a synonym takes over from its main tag.
pub fn synonym_placement(synonym_id: i64, main_tag: &TagRow) -> (i64, i64, i32, String) {
    (
        main_tag.parent_id,
        main_tag.id,
        main_tag.depth,
        path::synonym_path(synonym_id, &main_tag.path_string),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagtree_model::StaticLanguageRegistry;

    fn row(id: i64, parent_id: i64, main_tag_id: i64, path_string: &str) -> TagRow {
        TagRow {
            id,
            parent_id,
            main_tag_id,
            keyword: format!("tag {}", id),
            depth: path::depth_of(path_string),
            path_string: path_string.to_string(),
            modified: 0,
            remote_id: format!("remote-{}", id),
            main_language_id: 2,
            language_mask: 3,
        }
    }

    #[test]
    fn test_plan_subtree_move_rewrites_paths_and_parents() {
        let source = row(2, 1, 0, "/1/2/");
        let destination = row(4, 0, 0, "/4/");
        let rows = vec![
            source.clone(),
            row(5, 2, 0, "/1/2/5/"),
            row(6, 5, 0, "/1/2/5/6/"),
            row(3, 1, 2, "/1/3/"),
        ];

        let moved = plan_subtree_move(&source, Some(&destination), rows, 100);
        let by_id = |id: i64| moved.iter().find(|r| r.id == id).unwrap();

        assert_eq!(by_id(2).path_string, "/4/2/");
        assert_eq!(by_id(2).parent_id, 4);
        assert_eq!(by_id(2).depth, 2);

        assert_eq!(by_id(5).path_string, "/4/2/5/");
        assert_eq!(by_id(5).parent_id, 2);
        assert_eq!(by_id(6).path_string, "/4/2/5/6/");
        assert_eq!(by_id(6).depth, 4);

        assert_eq!(by_id(3).path_string, "/4/3/");
        assert_eq!(by_id(3).parent_id, 4);
        assert!(moved.iter().all(|r| r.modified == 100));
    }

    #[test]
    fn test_plan_subtree_move_from_and_to_root() {
        let source = row(2, 0, 0, "/2/");
        let destination = row(7, 1, 0, "/1/7/");
        let moved = plan_subtree_move(
            &source,
            Some(&destination),
            vec![source.clone(), row(5, 2, 0, "/2/5/")],
            1,
        );
        assert_eq!(moved[0].path_string, "/1/7/2/");
        assert_eq!(moved[0].depth, 3);
        assert_eq!(moved[1].path_string, "/1/7/2/5/");

        let source = row(2, 1, 0, "/1/2/");
        let moved = plan_subtree_move(&source, None, vec![source.clone()], 1);
        assert_eq!(moved[0].path_string, "/2/");
        assert_eq!(moved[0].parent_id, 0);
        assert_eq!(moved[0].depth, 1);
    }

    #[test]
    fn test_translation_set_requires_main_language_keyword() {
        let registry = StaticLanguageRegistry::new(["eng-GB", "cro-HR"]).unwrap();
        let mut keywords = BTreeMap::new();
        keywords.insert("cro-HR".to_string(), "Psi".to_string());

        let err = TranslationSet::build(&keywords, "eng-GB", true, &registry).unwrap_err();
        assert!(err.is_invalid_argument());

        keywords.insert("eng-GB".to_string(), "Dogs".to_string());
        let set = TranslationSet::build(&keywords, "eng-GB", false, &registry).unwrap();
        assert_eq!(set.main_keyword, "Dogs");
        assert_eq!(set.main_language_id, 2);
        assert_eq!(set.language_mask, 6);
        assert_eq!(set.keyword_rows(9).len(), 2);
    }

    #[test]
    fn test_url_segments_decode_and_skip_blanks() {
        assert_eq!(
            url_segments("/Animals//Big%20Cats/ "),
            vec!["Animals".to_string(), "Big Cats".to_string()]
        );
        assert!(url_segments("/").is_empty());
    }

    #[test]
    fn test_generated_remote_ids_are_md5_hex() {
        let a = generate_remote_id();
        let b = generate_remote_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
