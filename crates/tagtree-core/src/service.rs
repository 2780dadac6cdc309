//! Domain API of the tag repository.

use async_trait::async_trait;

use tagtree_model::{
    CreateStruct, Page, SearchResult, SynonymCreateStruct, Tag, TagInfo, TagsResult,
    Translations, UpdateStruct,
};

/// Tag repository operations. Implemented by the handler and by the caching
/// decorator wrapping it.
#[async_trait]
pub trait TagsService: Send + Sync {
    // ========================================================================
    // Reads
    // ========================================================================

    async fn load(&self, tag_id: i64, translations: &Translations) -> TagsResult<Tag>;

    async fn load_tag_info(&self, tag_id: i64) -> TagsResult<TagInfo>;

    async fn load_by_remote_id(&self, remote_id: &str, translations: &Translations)
        -> TagsResult<Tag>;

    async fn load_tag_info_by_remote_id(&self, remote_id: &str) -> TagsResult<TagInfo>;

    /// Resolve a keyword path such as `Animals/Dogs`.
    async fn load_tag_info_by_url(&self, url: &str) -> TagsResult<TagInfo>;

    async fn load_tag_by_keyword_and_parent_id(
        &self,
        keyword: &str,
        parent_id: i64,
        translations: &Translations,
    ) -> TagsResult<Tag>;

    /// Main-tag children of `tag_id` (0 for root level).
    async fn load_children(
        &self,
        tag_id: i64,
        page: Page,
        translations: &Translations,
    ) -> TagsResult<Vec<Tag>>;

    async fn get_children_count(&self, tag_id: i64, translations: &Translations)
        -> TagsResult<usize>;

    /// Tags whose keyword in `translation` equals `keyword`.
    async fn load_tags_by_keyword(
        &self,
        keyword: &str,
        translation: &str,
        use_always_available: bool,
        page: Page,
    ) -> TagsResult<Vec<Tag>>;

    async fn get_tags_by_keyword_count(
        &self,
        keyword: &str,
        translation: &str,
        use_always_available: bool,
    ) -> TagsResult<usize>;

    /// Tags whose keyword in `translation` starts with `prefix`.
    async fn search_tags(
        &self,
        prefix: &str,
        translation: &str,
        use_always_available: bool,
        page: Page,
    ) -> TagsResult<SearchResult>;

    async fn load_synonyms(
        &self,
        tag_id: i64,
        page: Page,
        translations: &Translations,
    ) -> TagsResult<Vec<Tag>>;

    async fn get_synonym_count(&self, tag_id: i64, translations: &Translations)
        -> TagsResult<usize>;

    async fn load_related_content_ids(&self, tag_id: i64, page: Page) -> TagsResult<Vec<i64>>;

    async fn get_related_content_count(&self, tag_id: i64) -> TagsResult<usize>;

    // ========================================================================
    // Writes
    // ========================================================================

    async fn create(&self, create_struct: &CreateStruct) -> TagsResult<Tag>;

    async fn update(&self, update_struct: &UpdateStruct, tag_id: i64) -> TagsResult<Tag>;

    async fn add_synonym(&self, synonym_struct: &SynonymCreateStruct) -> TagsResult<Tag>;

    async fn convert_to_synonym(&self, tag_id: i64, main_tag_id: i64) -> TagsResult<Tag>;

    /// Fold `tag_id` into `target_tag_id` and delete it.
    async fn merge(&self, tag_id: i64, target_tag_id: i64) -> TagsResult<()>;

    /// Copy the subtree of `source_id` below `destination_parent_id` (0 for
    /// root level); returns the copy of the source.
    async fn copy_subtree(&self, source_id: i64, destination_parent_id: i64) -> TagsResult<Tag>;

    async fn move_subtree(&self, source_id: i64, destination_parent_id: i64) -> TagsResult<Tag>;

    async fn delete_tag(&self, tag_id: i64) -> TagsResult<()>;
}
