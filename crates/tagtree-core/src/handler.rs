//! Tag repository.
//!
//! Composes gateway primitives into domain operations. Each operation opens
//! one unit of work, validates its arguments before the first write, and
//! commits before returning. Translation filtering happens here, so list
//! reads that filter by language load the unpaged list and page afterwards.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use tagtree_model::path;
use tagtree_model::{
    CreateStruct, LanguageRegistry, Page, SearchResult, SynonymCreateStruct, Tag, TagInfo,
    TagsError, TagsResult, Translations, UpdateStruct,
};

use crate::gateway::{FullTagData, TagGateway, TagRow, TagTransaction};
use crate::mapper::TagMapper;
use crate::service::TagsService;

/// Gateway-backed implementation of [`TagsService`].
pub struct TagsHandler {
    gateway: Arc<dyn TagGateway>,
    mapper: TagMapper,
}

impl TagsHandler {
    pub fn new(gateway: Arc<dyn TagGateway>, languages: Arc<dyn LanguageRegistry>) -> Self {
        Self {
            gateway,
            mapper: TagMapper::new(languages),
        }
    }

    fn visible_tag(
        &self,
        data: FullTagData,
        translations: &Translations,
        identifier: impl ToString,
    ) -> TagsResult<Tag> {
        if !self.mapper.is_visible(&data.row, translations) {
            return Err(TagsError::not_found("tag", identifier));
        }
        self.mapper.to_tag(data, translations)
    }

    /// Window to request from storage: everything when the handler still
    /// has to drop invisible rows.
    fn storage_page(page: Page, translations: &Translations) -> Page {
        if translations.requested().is_empty() {
            page
        } else {
            Page::ALL
        }
    }

    fn page_visible(
        &self,
        rows: Vec<FullTagData>,
        page: Page,
        translations: &Translations,
    ) -> TagsResult<Vec<Tag>> {
        let tags = self.mapper.to_visible_tags(rows, translations)?;
        if translations.requested().is_empty() {
            Ok(tags)
        } else {
            Ok(page.apply(tags))
        }
    }

    fn count_visible(&self, rows: &[FullTagData], translations: &Translations) -> usize {
        rows.iter()
            .filter(|data| self.mapper.is_visible(&data.row, translations))
            .count()
    }

    /// Whether the keyword in `translation` satisfies `predicate`, falling
    /// back to the main language keyword for always-available tags.
    fn keyword_matches<F>(
        &self,
        data: &FullTagData,
        translation: &str,
        use_always_available: bool,
        predicate: F,
    ) -> bool
    where
        F: Fn(&str) -> bool,
    {
        if data.keywords.get(translation).is_some_and(|k| predicate(k.as_str())) {
            return true;
        }
        if !use_always_available || !data.row.mask().is_always_available() {
            return false;
        }
        self.mapper
            .languages()
            .language_code(data.row.main_language_id)
            .ok()
            .and_then(|code| data.keywords.get(&code))
            .is_some_and(|k| predicate(k.as_str()))
    }

    fn copy_struct(&self, data: &FullTagData, parent_tag_id: i64) -> TagsResult<CreateStruct> {
        Ok(CreateStruct {
            parent_tag_id,
            main_language_code: self
                .mapper
                .languages()
                .language_code(data.row.main_language_id)?,
            keywords: data.keywords.clone(),
            remote_id: String::new(),
            always_available: data.row.mask().is_always_available(),
        })
    }

    fn synonym_copy_struct(
        &self,
        data: &FullTagData,
        main_tag_id: i64,
    ) -> TagsResult<SynonymCreateStruct> {
        Ok(SynonymCreateStruct {
            main_tag_id,
            main_language_code: self
                .mapper
                .languages()
                .language_code(data.row.main_language_id)?,
            keywords: data.keywords.clone(),
            remote_id: None,
            always_available: data.row.mask().is_always_available(),
        })
    }
}

/// Load a row that has to be a main tag.
async fn load_main_tag(
    tx: &mut Box<dyn TagTransaction>,
    tag_id: i64,
    argument: &str,
) -> TagsResult<TagRow> {
    let row = tx.get_basic_tag_data(tag_id).await?;
    if row.is_synonym() {
        return Err(TagsError::invalid_argument(
            argument,
            format!("tag {} is a synonym", tag_id),
        ));
    }
    Ok(row)
}

/// Reject `candidate` when it lies inside the subtree of `subtree_root`.
fn ensure_outside(candidate: &TagRow, subtree_root: &TagRow, argument: &str) -> TagsResult<()> {
    if path::is_within(&candidate.path_string, &subtree_root.path_string) {
        return Err(TagsError::invalid_argument(
            argument,
            format!(
                "tag {} is inside the subtree of tag {}",
                candidate.id, subtree_root.id
            ),
        ));
    }
    Ok(())
}

/// Validation shared by convert and merge: two distinct main tags, the
/// target outside the subtree of the tag that goes away.
async fn load_merge_pair(
    tx: &mut Box<dyn TagTransaction>,
    tag_id: i64,
    target_tag_id: i64,
) -> TagsResult<(TagRow, TagRow)> {
    if tag_id == target_tag_id {
        return Err(TagsError::invalid_argument(
            "target_tag_id",
            "a tag cannot be folded into itself",
        ));
    }
    let tag = load_main_tag(tx, tag_id, "tag_id").await?;
    let target = load_main_tag(tx, target_tag_id, "target_tag_id").await?;
    ensure_outside(&target, &tag, "target_tag_id")?;
    Ok((tag, target))
}

/// Move every main-tag child of `tag_id` below `destination`.
async fn move_children(
    tx: &mut Box<dyn TagTransaction>,
    tag_id: i64,
    destination: &TagRow,
) -> TagsResult<()> {
    for child in tx.get_children(tag_id, Page::ALL).await? {
        tx.move_subtree(&child.row, Some(destination)).await?;
    }
    Ok(())
}

#[async_trait]
impl TagsService for TagsHandler {
    async fn load(&self, tag_id: i64, translations: &Translations) -> TagsResult<Tag> {
        debug!(tag_id, "Loading tag");
        let mut tx = self.gateway.begin().await?;
        let data = tx.get_full_tag_data(tag_id).await?;
        tx.commit().await?;
        self.visible_tag(data, translations, tag_id)
    }

    async fn load_tag_info(&self, tag_id: i64) -> TagsResult<TagInfo> {
        let mut tx = self.gateway.begin().await?;
        let row = tx.get_basic_tag_data(tag_id).await?;
        tx.commit().await?;
        self.mapper.to_tag_info(row)
    }

    async fn load_by_remote_id(
        &self,
        remote_id: &str,
        translations: &Translations,
    ) -> TagsResult<Tag> {
        debug!(remote_id, "Loading tag by remote id");
        let mut tx = self.gateway.begin().await?;
        let data = tx.get_full_tag_data_by_remote_id(remote_id).await?;
        tx.commit().await?;
        self.visible_tag(data, translations, remote_id)
    }

    async fn load_tag_info_by_remote_id(&self, remote_id: &str) -> TagsResult<TagInfo> {
        let mut tx = self.gateway.begin().await?;
        let row = tx.get_basic_tag_data_by_remote_id(remote_id).await?;
        tx.commit().await?;
        self.mapper.to_tag_info(row)
    }

    async fn load_tag_info_by_url(&self, url: &str) -> TagsResult<TagInfo> {
        debug!(url, "Resolving tag url");
        let mut tx = self.gateway.begin().await?;
        let row = tx.get_basic_tag_data_by_url(url).await?;
        tx.commit().await?;
        self.mapper.to_tag_info(row)
    }

    async fn load_tag_by_keyword_and_parent_id(
        &self,
        keyword: &str,
        parent_id: i64,
        translations: &Translations,
    ) -> TagsResult<Tag> {
        let mut tx = self.gateway.begin().await?;
        let data = tx
            .get_full_tag_data_by_keyword_and_parent_id(keyword, parent_id)
            .await?;
        tx.commit().await?;
        self.visible_tag(data, translations, format!("{}/{}", parent_id, keyword))
    }

    async fn load_children(
        &self,
        tag_id: i64,
        page: Page,
        translations: &Translations,
    ) -> TagsResult<Vec<Tag>> {
        debug!(tag_id, offset = page.offset, limit = page.limit, "Loading children");
        let mut tx = self.gateway.begin().await?;
        if tag_id > 0 {
            tx.get_basic_tag_data(tag_id).await?;
        }
        let rows = tx
            .get_children(tag_id, Self::storage_page(page, translations))
            .await?;
        tx.commit().await?;
        self.page_visible(rows, page, translations)
    }

    async fn get_children_count(
        &self,
        tag_id: i64,
        translations: &Translations,
    ) -> TagsResult<usize> {
        let mut tx = self.gateway.begin().await?;
        if tag_id > 0 {
            tx.get_basic_tag_data(tag_id).await?;
        }
        let count = if translations.requested().is_empty() {
            tx.get_children_count(tag_id).await?
        } else {
            let rows = tx.get_children(tag_id, Page::ALL).await?;
            self.count_visible(&rows, translations)
        };
        tx.commit().await?;
        Ok(count)
    }

    async fn load_tags_by_keyword(
        &self,
        keyword: &str,
        translation: &str,
        use_always_available: bool,
        page: Page,
    ) -> TagsResult<Vec<Tag>> {
        debug!(keyword, translation, "Loading tags by keyword");
        let mut tx = self.gateway.begin().await?;
        let rows = tx.get_tags_by_keyword(keyword, Page::ALL).await?;
        tx.commit().await?;

        let translations = Translations::only([translation], use_always_available);
        let tags = rows
            .into_iter()
            .filter(|data| {
                self.keyword_matches(data, translation, use_always_available, |k| k == keyword)
            })
            .map(|data| self.mapper.to_tag(data, &translations))
            .collect::<TagsResult<Vec<_>>>()?;
        Ok(page.apply(tags))
    }

    async fn get_tags_by_keyword_count(
        &self,
        keyword: &str,
        translation: &str,
        use_always_available: bool,
    ) -> TagsResult<usize> {
        let mut tx = self.gateway.begin().await?;
        let rows = tx.get_tags_by_keyword(keyword, Page::ALL).await?;
        tx.commit().await?;

        Ok(rows
            .iter()
            .filter(|data| {
                self.keyword_matches(data, translation, use_always_available, |k| k == keyword)
            })
            .count())
    }

    async fn search_tags(
        &self,
        prefix: &str,
        translation: &str,
        use_always_available: bool,
        page: Page,
    ) -> TagsResult<SearchResult> {
        debug!(prefix, translation, "Searching tags");
        let mut tx = self.gateway.begin().await?;
        let rows = tx.search_tags(prefix, Page::ALL).await?;
        tx.commit().await?;

        let translations = Translations::only([translation], use_always_available);
        let matches: Vec<FullTagData> = rows
            .into_iter()
            .filter(|data| {
                self.keyword_matches(data, translation, use_always_available, |k| {
                    k.starts_with(prefix)
                })
            })
            .collect();
        let total_count = matches.len();
        let tags = page
            .apply(matches)
            .into_iter()
            .map(|data| self.mapper.to_tag(data, &translations))
            .collect::<TagsResult<Vec<_>>>()?;

        Ok(SearchResult { tags, total_count })
    }

    async fn load_synonyms(
        &self,
        tag_id: i64,
        page: Page,
        translations: &Translations,
    ) -> TagsResult<Vec<Tag>> {
        debug!(tag_id, offset = page.offset, limit = page.limit, "Loading synonyms");
        let mut tx = self.gateway.begin().await?;
        load_main_tag(&mut tx, tag_id, "tag_id").await?;
        let rows = tx
            .get_synonyms(tag_id, Self::storage_page(page, translations))
            .await?;
        tx.commit().await?;
        self.page_visible(rows, page, translations)
    }

    async fn get_synonym_count(
        &self,
        tag_id: i64,
        translations: &Translations,
    ) -> TagsResult<usize> {
        let mut tx = self.gateway.begin().await?;
        load_main_tag(&mut tx, tag_id, "tag_id").await?;
        let count = if translations.requested().is_empty() {
            tx.get_synonym_count(tag_id).await?
        } else {
            let rows = tx.get_synonyms(tag_id, Page::ALL).await?;
            self.count_visible(&rows, translations)
        };
        tx.commit().await?;
        Ok(count)
    }

    async fn load_related_content_ids(&self, tag_id: i64, page: Page) -> TagsResult<Vec<i64>> {
        let mut tx = self.gateway.begin().await?;
        tx.get_basic_tag_data(tag_id).await?;
        let ids = tx.get_related_content_ids(tag_id, page).await?;
        tx.commit().await?;
        Ok(ids)
    }

    async fn get_related_content_count(&self, tag_id: i64) -> TagsResult<usize> {
        let mut tx = self.gateway.begin().await?;
        tx.get_basic_tag_data(tag_id).await?;
        let count = tx.get_related_content_count(tag_id).await?;
        tx.commit().await?;
        Ok(count)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    async fn create(&self, create_struct: &CreateStruct) -> TagsResult<Tag> {
        if create_struct.parent_tag_id < 0 {
            return Err(TagsError::invalid_argument(
                "parent_tag_id",
                "must be 0 or a tag id",
            ));
        }
        if create_struct.main_keyword().is_none() {
            return Err(TagsError::invalid_argument(
                "keywords",
                format!(
                    "missing keyword in main language '{}'",
                    create_struct.main_language_code
                ),
            ));
        }

        let mut tx = self.gateway.begin().await?;
        let parent = if create_struct.parent_tag_id > 0 {
            Some(load_main_tag(&mut tx, create_struct.parent_tag_id, "parent_tag_id").await?)
        } else {
            None
        };

        let tag_id = tx.create(create_struct, parent.as_ref()).await?;
        let row = tx.get_basic_tag_data(tag_id).await?;
        tx.update_subtree_modification_time(&row.path_string, Some(row.modified))
            .await?;
        let data = tx.get_full_tag_data(tag_id).await?;
        tx.commit().await?;

        info!(tag_id, parent_id = create_struct.parent_tag_id, "Created tag");
        self.mapper.to_tag(data, &Translations::all())
    }

    async fn update(&self, update_struct: &UpdateStruct, tag_id: i64) -> TagsResult<Tag> {
        let mut tx = self.gateway.begin().await?;
        let row = tx.get_basic_tag_data(tag_id).await?;
        if !update_struct.is_empty() {
            tx.update(update_struct, tag_id).await?;
            tx.update_subtree_modification_time(&row.path_string, None)
                .await?;
        }
        let data = tx.get_full_tag_data(tag_id).await?;
        tx.commit().await?;

        info!(tag_id, "Updated tag");
        self.mapper.to_tag(data, &Translations::all())
    }

    async fn add_synonym(&self, synonym_struct: &SynonymCreateStruct) -> TagsResult<Tag> {
        if synonym_struct.main_keyword().is_none() {
            return Err(TagsError::invalid_argument(
                "keywords",
                format!(
                    "missing keyword in main language '{}'",
                    synonym_struct.main_language_code
                ),
            ));
        }

        let mut tx = self.gateway.begin().await?;
        let main_tag = load_main_tag(&mut tx, synonym_struct.main_tag_id, "main_tag_id").await?;
        let synonym_id = tx.create_synonym(synonym_struct, &main_tag).await?;
        let data = tx.get_full_tag_data(synonym_id).await?;
        tx.update_subtree_modification_time(&data.row.path_string, Some(data.row.modified))
            .await?;
        tx.commit().await?;

        info!(synonym_id, main_tag_id = main_tag.id, "Added synonym");
        self.mapper.to_tag(data, &Translations::all())
    }

    async fn convert_to_synonym(&self, tag_id: i64, main_tag_id: i64) -> TagsResult<Tag> {
        let mut tx = self.gateway.begin().await?;
        let (tag, main_tag) = load_merge_pair(&mut tx, tag_id, main_tag_id).await?;

        move_children(&mut tx, tag_id, &main_tag).await?;
        for synonym in tx.get_synonyms(tag_id, Page::ALL).await? {
            tx.move_synonym(synonym.row.id, &main_tag).await?;
        }
        tx.convert_to_synonym(tag_id, &main_tag).await?;

        tx.update_subtree_modification_time(&path::parent_path(&tag.path_string), None)
            .await?;
        tx.update_subtree_modification_time(&main_tag.path_string, None)
            .await?;
        let data = tx.get_full_tag_data(tag_id).await?;
        tx.commit().await?;

        info!(tag_id, main_tag_id, "Converted tag to synonym");
        self.mapper.to_tag(data, &Translations::all())
    }

    async fn merge(&self, tag_id: i64, target_tag_id: i64) -> TagsResult<()> {
        let mut tx = self.gateway.begin().await?;
        let (tag, target) = load_merge_pair(&mut tx, tag_id, target_tag_id).await?;

        move_children(&mut tx, tag_id, &target).await?;
        for synonym in tx.get_synonyms(tag_id, Page::ALL).await? {
            tx.transfer_tag_attribute_links(synonym.row.id, target_tag_id)
                .await?;
        }
        tx.transfer_tag_attribute_links(tag_id, target_tag_id)
            .await?;
        tx.delete_tag(tag_id).await?;

        tx.update_subtree_modification_time(&path::parent_path(&tag.path_string), None)
            .await?;
        tx.update_subtree_modification_time(&target.path_string, None)
            .await?;
        tx.commit().await?;

        info!(tag_id, target_tag_id, "Merged tag");
        Ok(())
    }

    async fn copy_subtree(&self, source_id: i64, destination_parent_id: i64) -> TagsResult<Tag> {
        let mut tx = self.gateway.begin().await?;
        let source = load_main_tag(&mut tx, source_id, "source_id").await?;
        let destination = if destination_parent_id > 0 {
            let destination =
                load_main_tag(&mut tx, destination_parent_id, "destination_parent_id").await?;
            ensure_outside(&destination, &source, "destination_parent_id")?;
            Some(destination)
        } else {
            None
        };

        // Breadth first; each entry pairs a source id with the parent of its copy.
        let mut pending: VecDeque<(i64, Option<TagRow>)> = VecDeque::new();
        pending.push_back((source.id, destination));
        let mut copy_root: Option<TagRow> = None;
        let mut copied = 0usize;

        while let Some((original_id, parent)) = pending.pop_front() {
            let data = tx.get_full_tag_data(original_id).await?;
            let parent_tag_id = parent.as_ref().map(|p| p.id).unwrap_or(0);
            let copy_id = tx
                .create(&self.copy_struct(&data, parent_tag_id)?, parent.as_ref())
                .await?;
            let copy = tx.get_basic_tag_data(copy_id).await?;
            copied += 1;

            for synonym in tx.get_synonyms(original_id, Page::ALL).await? {
                tx.create_synonym(&self.synonym_copy_struct(&synonym, copy_id)?, &copy)
                    .await?;
            }
            for child in tx.get_children(original_id, Page::ALL).await? {
                pending.push_back((child.row.id, Some(copy.clone())));
            }
            if copy_root.is_none() {
                copy_root = Some(copy);
            }
        }

        let copy_root = copy_root.ok_or_else(|| TagsError::not_found("tag", source_id))?;
        tx.update_subtree_modification_time(&copy_root.path_string, None)
            .await?;
        let data = tx.get_full_tag_data(copy_root.id).await?;
        tx.commit().await?;

        info!(
            source_id,
            destination_parent_id,
            copy_id = copy_root.id,
            copied,
            "Copied subtree"
        );
        self.mapper.to_tag(data, &Translations::all())
    }

    async fn move_subtree(&self, source_id: i64, destination_parent_id: i64) -> TagsResult<Tag> {
        let mut tx = self.gateway.begin().await?;
        let source = load_main_tag(&mut tx, source_id, "source_id").await?;
        let destination = if destination_parent_id > 0 {
            let destination =
                load_main_tag(&mut tx, destination_parent_id, "destination_parent_id").await?;
            ensure_outside(&destination, &source, "destination_parent_id")?;
            Some(destination)
        } else {
            None
        };

        let moved = tx.move_subtree(&source, destination.as_ref()).await?;
        tx.update_subtree_modification_time(&path::parent_path(&source.path_string), None)
            .await?;
        tx.update_subtree_modification_time(&moved.path_string, Some(moved.modified))
            .await?;
        let data = tx.get_full_tag_data(source_id).await?;
        tx.commit().await?;

        info!(
            source_id,
            destination_parent_id,
            path = %moved.path_string,
            "Moved subtree"
        );
        self.mapper.to_tag(data, &Translations::all())
    }

    async fn delete_tag(&self, tag_id: i64) -> TagsResult<()> {
        let mut tx = self.gateway.begin().await?;
        let row = match tx.get_basic_tag_data(tag_id).await {
            Ok(row) => row,
            Err(err) if err.is_not_found() => {
                debug!(tag_id, "Tag already gone, nothing to delete");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        tx.delete_tag(tag_id).await?;
        tx.update_subtree_modification_time(&path::parent_path(&row.path_string), None)
            .await?;
        tx.commit().await?;

        info!(tag_id, path = %row.path_string, "Deleted tag");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTagGateway;
    use tagtree_model::StaticLanguageRegistry;

    fn handler() -> TagsHandler {
        let languages: Arc<dyn LanguageRegistry> =
            Arc::new(StaticLanguageRegistry::new(["eng-GB", "cro-HR"]).unwrap());
        TagsHandler::new(
            Arc::new(MemoryTagGateway::new(languages.clone())),
            languages,
        )
    }

    #[tokio::test]
    async fn test_create_rejects_missing_main_keyword() {
        let handler = handler();
        let create = CreateStruct::new(0, "eng-GB").with_keyword("Psi", Some("cro-HR"));
        let err = handler.create(&create).await.unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[tokio::test]
    async fn test_create_below_synonym_is_rejected() {
        let handler = handler();
        let animals = handler
            .create(&CreateStruct::new(0, "eng-GB").with_keyword("Animals", None))
            .await
            .unwrap();
        let fauna = handler
            .add_synonym(&SynonymCreateStruct::new(animals.id, "eng-GB").with_keyword("Fauna", None))
            .await
            .unwrap();

        let err = handler
            .create(&CreateStruct::new(fauna.id, "eng-GB").with_keyword("Dogs", None))
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[tokio::test]
    async fn test_create_with_unknown_language_is_constraint_violation() {
        let handler = handler();
        let create = CreateStruct::new(0, "fre-FR").with_keyword("Chiens", None);
        let err = handler.create(&create).await.unwrap_err();
        assert!(err.is_constraint_violation());
    }
}
