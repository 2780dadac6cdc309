//! Read-through caching decorator.
//!
//! Point loads and synonym lists are cached under keys built from the
//! operation and its significant arguments. Each entry is labelled with
//! `tag-<id>` and `tag-path-<ancestor>` labels so writes can purge every
//! affected read by label.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use tagtree_model::path;
use tagtree_model::{
    CreateStruct, Page, SearchResult, SynonymCreateStruct, Tag, TagInfo, TagsError,
    TagsResult, Translations, UpdateStruct,
};

use crate::cache::TagAwareCache;
use crate::logger::{PersistenceLogger, TracingPersistenceLogger};
use crate::service::TagsService;

const KEY_PREFIX: &str = "tagtree";

/// Labels for an entity: its own id, every id on its path and, for
/// synonyms, the path label of the main tag.
pub fn cache_tags(tag_id: i64, path_string: &str, main_tag_id: i64) -> Vec<String> {
    let mut tags = vec![format!("tag-{}", tag_id)];
    tags.extend(
        path::path_ids(path_string)
            .into_iter()
            .map(|id| format!("tag-path-{}", id)),
    );
    if main_tag_id > 0 {
        tags.push(format!("tag-path-{}", main_tag_id));
    }
    tags
}

fn tag_label(tag_id: i64) -> String {
    format!("tag-{}", tag_id)
}

fn path_label(tag_id: i64) -> String {
    format!("tag-path-{}", tag_id)
}

/// [`TagsService`] decorator backed by a [`TagAwareCache`].
pub struct CachedTagsHandler<S: TagsService> {
    inner: S,
    cache: Arc<dyn TagAwareCache>,
    logger: Arc<dyn PersistenceLogger>,
}

impl<S: TagsService> CachedTagsHandler<S> {
    pub fn new(inner: S, cache: Arc<dyn TagAwareCache>) -> Self {
        Self::with_logger(inner, cache, Arc::new(TracingPersistenceLogger))
    }

    pub fn with_logger(
        inner: S,
        cache: Arc<dyn TagAwareCache>,
        logger: Arc<dyn PersistenceLogger>,
    ) -> Self {
        Self {
            inner,
            cache,
            logger,
        }
    }

    fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.cache.get(key)?;
        match decode(value) {
            Ok(decoded) => {
                debug!(key, "Cache hit");
                Some(decoded)
            }
            Err(err) => {
                warn!(key, error = %err, "Discarding undecodable cache entry");
                None
            }
        }
    }

    /// Save a value read through the inner handler after `read_at`.
    fn store<T: Serialize>(&self, key: &str, value: &T, tags: &[String], read_at: u64) {
        match encode(value) {
            Ok(encoded) => self.cache.set(key, encoded, tags, read_at),
            Err(err) => warn!(key, error = %err, "Could not encode cache entry"),
        }
    }

    fn invalidate(&self, labels: Vec<String>) {
        debug!(labels = ?labels, "Invalidating cache labels");
        self.cache.invalidate_tags(&labels);
    }

    fn log(&self, method: &str, args: Value) {
        self.logger.log_call(method, args);
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> TagsResult<T> {
    serde_json::from_value(value).map_err(|e| TagsError::Serialization(e.to_string()))
}

fn encode<T: Serialize>(value: &T) -> TagsResult<Value> {
    serde_json::to_value(value).map_err(|e| TagsError::Serialization(e.to_string()))
}

fn translations_args(translations: &Translations) -> Value {
    json!({
        "translations": translations.languages,
        "use_always_available": translations.use_always_available,
    })
}

#[async_trait]
impl<S: TagsService> TagsService for CachedTagsHandler<S> {
    async fn load(&self, tag_id: i64, translations: &Translations) -> TagsResult<Tag> {
        let key = format!("{}-tag-{}-{}", KEY_PREFIX, tag_id, translations.cache_key());
        if let Some(tag) = self.lookup::<Tag>(&key) {
            return Ok(tag);
        }

        let mut args = translations_args(translations);
        args["tag"] = json!(tag_id);
        self.log("load", args);

        let read_at = self.cache.epoch();
        let tag = self.inner.load(tag_id, translations).await?;
        self.store(
            &key,
            &tag,
            &cache_tags(tag.id, &tag.path_string, tag.main_tag_id()),
            read_at,
        );
        Ok(tag)
    }

    async fn load_tag_info(&self, tag_id: i64) -> TagsResult<TagInfo> {
        let key = format!("{}-tag-info-{}", KEY_PREFIX, tag_id);
        if let Some(info) = self.lookup::<TagInfo>(&key) {
            return Ok(info);
        }

        self.log("load_tag_info", json!({ "tag": tag_id }));

        let read_at = self.cache.epoch();
        let info = self.inner.load_tag_info(tag_id).await?;
        self.store(
            &key,
            &info,
            &cache_tags(info.id, &info.path_string, info.main_tag_id()),
            read_at,
        );
        Ok(info)
    }

    async fn load_by_remote_id(
        &self,
        remote_id: &str,
        translations: &Translations,
    ) -> TagsResult<Tag> {
        let key = format!(
            "{}-tag-byRemoteId-{}-{}",
            KEY_PREFIX,
            remote_id,
            translations.cache_key()
        );
        if let Some(tag) = self.lookup::<Tag>(&key) {
            return Ok(tag);
        }

        let mut args = translations_args(translations);
        args["tag"] = json!(remote_id);
        self.log("load_by_remote_id", args);

        let read_at = self.cache.epoch();
        let tag = self.inner.load_by_remote_id(remote_id, translations).await?;
        self.store(
            &key,
            &tag,
            &cache_tags(tag.id, &tag.path_string, tag.main_tag_id()),
            read_at,
        );
        Ok(tag)
    }

    async fn load_tag_info_by_remote_id(&self, remote_id: &str) -> TagsResult<TagInfo> {
        let key = format!("{}-tag-info-byRemoteId-{}", KEY_PREFIX, remote_id);
        if let Some(info) = self.lookup::<TagInfo>(&key) {
            return Ok(info);
        }

        self.log("load_tag_info_by_remote_id", json!({ "tag": remote_id }));

        let read_at = self.cache.epoch();
        let info = self.inner.load_tag_info_by_remote_id(remote_id).await?;
        self.store(
            &key,
            &info,
            &cache_tags(info.id, &info.path_string, info.main_tag_id()),
            read_at,
        );
        Ok(info)
    }

    async fn load_tag_info_by_url(&self, url: &str) -> TagsResult<TagInfo> {
        self.log("load_tag_info_by_url", json!({ "url": url }));
        self.inner.load_tag_info_by_url(url).await
    }

    async fn load_tag_by_keyword_and_parent_id(
        &self,
        keyword: &str,
        parent_id: i64,
        translations: &Translations,
    ) -> TagsResult<Tag> {
        let mut args = translations_args(translations);
        args["keyword"] = json!(keyword);
        args["parent_tag"] = json!(parent_id);
        self.log("load_tag_by_keyword_and_parent_id", args);

        self.inner
            .load_tag_by_keyword_and_parent_id(keyword, parent_id, translations)
            .await
    }

    async fn load_children(
        &self,
        tag_id: i64,
        page: Page,
        translations: &Translations,
    ) -> TagsResult<Vec<Tag>> {
        let mut args = translations_args(translations);
        args["tag"] = json!(tag_id);
        self.log("load_children", args);

        self.inner.load_children(tag_id, page, translations).await
    }

    async fn get_children_count(
        &self,
        tag_id: i64,
        translations: &Translations,
    ) -> TagsResult<usize> {
        let mut args = translations_args(translations);
        args["tag"] = json!(tag_id);
        self.log("get_children_count", args);

        self.inner.get_children_count(tag_id, translations).await
    }

    async fn load_tags_by_keyword(
        &self,
        keyword: &str,
        translation: &str,
        use_always_available: bool,
        page: Page,
    ) -> TagsResult<Vec<Tag>> {
        self.log(
            "load_tags_by_keyword",
            json!({
                "keyword": keyword,
                "translation": translation,
                "use_always_available": use_always_available,
            }),
        );

        self.inner
            .load_tags_by_keyword(keyword, translation, use_always_available, page)
            .await
    }

    async fn get_tags_by_keyword_count(
        &self,
        keyword: &str,
        translation: &str,
        use_always_available: bool,
    ) -> TagsResult<usize> {
        self.log(
            "get_tags_by_keyword_count",
            json!({
                "keyword": keyword,
                "translation": translation,
                "use_always_available": use_always_available,
            }),
        );

        self.inner
            .get_tags_by_keyword_count(keyword, translation, use_always_available)
            .await
    }

    async fn search_tags(
        &self,
        prefix: &str,
        translation: &str,
        use_always_available: bool,
        page: Page,
    ) -> TagsResult<SearchResult> {
        self.log(
            "search_tags",
            json!({
                "search_string": prefix,
                "translation": translation,
                "use_always_available": use_always_available,
            }),
        );

        self.inner
            .search_tags(prefix, translation, use_always_available, page)
            .await
    }

    async fn load_synonyms(
        &self,
        tag_id: i64,
        page: Page,
        translations: &Translations,
    ) -> TagsResult<Vec<Tag>> {
        // The full list is cached; every call pages the cached list.
        let key = format!(
            "{}-tag-synonyms-{}-{}",
            KEY_PREFIX,
            tag_id,
            translations.cache_key()
        );
        if let Some(synonyms) = self.lookup::<Vec<Tag>>(&key) {
            return Ok(page.apply(synonyms));
        }

        let mut args = translations_args(translations);
        args["tag"] = json!(tag_id);
        self.log("load_synonyms", args);

        let read_at = self.cache.epoch();
        let info = self.load_tag_info(tag_id).await?;
        let synonyms = self
            .inner
            .load_synonyms(tag_id, Page::ALL, translations)
            .await?;

        let mut labels = cache_tags(info.id, &info.path_string, info.main_tag_id());
        for synonym in &synonyms {
            for label in cache_tags(synonym.id, &synonym.path_string, synonym.main_tag_id()) {
                if !labels.contains(&label) {
                    labels.push(label);
                }
            }
        }
        self.store(&key, &synonyms, &labels, read_at);

        Ok(page.apply(synonyms))
    }

    async fn get_synonym_count(
        &self,
        tag_id: i64,
        translations: &Translations,
    ) -> TagsResult<usize> {
        let mut args = translations_args(translations);
        args["tag"] = json!(tag_id);
        self.log("get_synonym_count", args);

        self.inner.get_synonym_count(tag_id, translations).await
    }

    async fn load_related_content_ids(&self, tag_id: i64, page: Page) -> TagsResult<Vec<i64>> {
        self.log(
            "load_related_content_ids",
            json!({ "tag": tag_id, "offset": page.offset, "limit": page.limit }),
        );
        self.inner.load_related_content_ids(tag_id, page).await
    }

    async fn get_related_content_count(&self, tag_id: i64) -> TagsResult<usize> {
        self.log("get_related_content_count", json!({ "tag": tag_id }));
        self.inner.get_related_content_count(tag_id).await
    }

    // ========================================================================
    // Writes
    // ========================================================================

    async fn create(&self, create_struct: &CreateStruct) -> TagsResult<Tag> {
        self.log("create", json!({ "struct": create_struct }));
        self.inner.create(create_struct).await
    }

    async fn update(&self, update_struct: &UpdateStruct, tag_id: i64) -> TagsResult<Tag> {
        self.log("update", json!({ "tag": tag_id, "struct": update_struct }));
        let tag = self.inner.update(update_struct, tag_id).await?;
        self.invalidate(vec![tag_label(tag_id)]);
        Ok(tag)
    }

    async fn add_synonym(&self, synonym_struct: &SynonymCreateStruct) -> TagsResult<Tag> {
        self.log("add_synonym", json!({ "struct": synonym_struct }));
        let synonym = self.inner.add_synonym(synonym_struct).await?;
        self.invalidate(vec![tag_label(synonym_struct.main_tag_id)]);
        Ok(synonym)
    }

    async fn convert_to_synonym(&self, tag_id: i64, main_tag_id: i64) -> TagsResult<Tag> {
        self.log(
            "convert_to_synonym",
            json!({ "tag": tag_id, "main_tag": main_tag_id }),
        );
        let synonym = self.inner.convert_to_synonym(tag_id, main_tag_id).await?;
        self.invalidate(vec![path_label(tag_id), tag_label(main_tag_id)]);
        Ok(synonym)
    }

    async fn merge(&self, tag_id: i64, target_tag_id: i64) -> TagsResult<()> {
        self.log("merge", json!({ "tag": tag_id, "target_tag": target_tag_id }));
        self.inner.merge(tag_id, target_tag_id).await?;
        self.invalidate(vec![path_label(tag_id), path_label(target_tag_id)]);
        Ok(())
    }

    async fn copy_subtree(&self, source_id: i64, destination_parent_id: i64) -> TagsResult<Tag> {
        self.log(
            "copy_subtree",
            json!({ "source_tag": source_id, "destination_tag": destination_parent_id }),
        );
        let copy = self
            .inner
            .copy_subtree(source_id, destination_parent_id)
            .await?;
        self.invalidate(vec![path_label(source_id), path_label(destination_parent_id)]);
        Ok(copy)
    }

    async fn move_subtree(&self, source_id: i64, destination_parent_id: i64) -> TagsResult<Tag> {
        self.log(
            "move_subtree",
            json!({ "source_tag": source_id, "destination_tag": destination_parent_id }),
        );
        let moved = self
            .inner
            .move_subtree(source_id, destination_parent_id)
            .await?;
        self.invalidate(vec![path_label(source_id), path_label(destination_parent_id)]);
        Ok(moved)
    }

    async fn delete_tag(&self, tag_id: i64) -> TagsResult<()> {
        self.log("delete_tag", json!({ "tag": tag_id }));
        self.inner.delete_tag(tag_id).await?;
        self.invalidate(vec![path_label(tag_id)]);
        Ok(())
    }
}
