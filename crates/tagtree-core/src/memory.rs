//! In-memory storage gateway (for testing and development).
//!
//! Rows live in an arena keyed by id. A unit of work locks the arena, works
//! on a private copy and swaps it in on commit, so units are serialized and
//! a dropped unit leaves no trace.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use tagtree_model::path;
use tagtree_model::{
    CreateStruct, LanguageRegistry, Page, SynonymCreateStruct, TagsError, TagsResult,
    UpdateStruct,
};

use crate::gateway::{
    generate_remote_id, now_timestamp, plan_subtree_move, plan_translation_update,
    synonym_placement, url_segments, AttributeLink, FullTagData, KeywordRow, TagGateway,
    TagRow, TagTransaction, TranslationSet, CONTENT_STATUS_PUBLISHED, KEYWORD_STATUS_PUBLISHED,
};

/// Read-only mirror of an external content object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentObject {
    pub id: i64,
    pub current_version: i32,
    pub status: i32,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    next_tag_id: i64,
    tags: BTreeMap<i64, TagRow>,
    keywords: BTreeMap<(i64, String), KeywordRow>,
    next_link_id: i64,
    links: BTreeMap<i64, AttributeLink>,
    content_objects: BTreeMap<i64, ContentObject>,
}

impl MemoryState {
    fn row(&self, tag_id: i64) -> TagsResult<&TagRow> {
        self.tags
            .get(&tag_id)
            .ok_or_else(|| TagsError::not_found("tag", tag_id))
    }

    fn row_mut(&mut self, tag_id: i64) -> TagsResult<&mut TagRow> {
        self.tags
            .get_mut(&tag_id)
            .ok_or_else(|| TagsError::not_found("tag", tag_id))
    }

    fn translations(&self, tag_id: i64) -> impl Iterator<Item = &KeywordRow> {
        self.keywords
            .range((tag_id, String::new())..)
            .take_while(move |((id, _), _)| *id == tag_id)
            .map(|(_, row)| row)
            .filter(|row| row.status == KEYWORD_STATUS_PUBLISHED)
    }

    fn full(&self, row: &TagRow) -> FullTagData {
        FullTagData {
            row: row.clone(),
            keywords: self
                .translations(row.id)
                .map(|k| (k.locale.clone(), k.keyword.clone()))
                .collect(),
        }
    }

    fn full_where<F>(&self, page: Page, predicate: F) -> Vec<FullTagData>
    where
        F: Fn(&TagRow) -> bool,
    {
        let rows: Vec<&TagRow> = self.tags.values().filter(|row| predicate(row)).collect();
        page.apply(rows)
            .into_iter()
            .map(|row| self.full(row))
            .collect()
    }

    fn has_translation<F>(&self, tag_id: i64, predicate: F) -> bool
    where
        F: Fn(&str) -> bool,
    {
        self.translations(tag_id).any(|k| predicate(&k.keyword))
    }

    fn ensure_unique_remote_id(&self, remote_id: &str, except: Option<i64>) -> TagsResult<()> {
        let taken = self
            .tags
            .values()
            .any(|row| row.remote_id == remote_id && Some(row.id) != except);
        if taken {
            return Err(TagsError::ConstraintViolation(format!(
                "remote id '{}' is already in use",
                remote_id
            )));
        }
        Ok(())
    }

    /// First phase of the two-phase insert: store the row and hand out its id.
    fn insert_row(&mut self, mut row: TagRow) -> i64 {
        self.next_tag_id += 1;
        row.id = self.next_tag_id;
        self.tags.insert(row.id, row);
        self.next_tag_id
    }

    fn replace_translations(&mut self, tag_id: i64, rows: Vec<KeywordRow>) {
        self.keywords.retain(|(id, _), _| *id != tag_id);
        for row in rows {
            self.keywords.insert((tag_id, row.locale.clone()), row);
        }
    }

    fn related_content_ids(&self, tag_id: i64) -> Vec<i64> {
        let ids: BTreeSet<i64> = self
            .links
            .values()
            .filter(|link| link.keyword_id == tag_id)
            .filter(|link| {
                self.content_objects.get(&link.object_id).is_some_and(|object| {
                    object.status == CONTENT_STATUS_PUBLISHED
                        && object.current_version == link.objectattribute_version
                })
            })
            .map(|link| link.object_id)
            .collect();
        ids.into_iter().collect()
    }
}

/// Arena-backed gateway.
pub struct MemoryTagGateway {
    state: Arc<Mutex<MemoryState>>,
    languages: Arc<dyn LanguageRegistry>,
}

impl MemoryTagGateway {
    pub fn new(languages: Arc<dyn LanguageRegistry>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            languages,
        }
    }

    /// Register a content object the tag links can point at.
    pub async fn insert_content_object(&self, id: i64, current_version: i32, status: i32) {
        self.state.lock().await.content_objects.insert(
            id,
            ContentObject {
                id,
                current_version,
                status,
            },
        );
    }

    /// Link a content attribute version to a tag; returns the link id.
    pub async fn add_attribute_link(
        &self,
        tag_id: i64,
        object_id: i64,
        objectattribute_id: i64,
        objectattribute_version: i32,
    ) -> i64 {
        let mut state = self.state.lock().await;
        state.next_link_id += 1;
        let id = state.next_link_id;
        state.links.insert(
            id,
            AttributeLink {
                id,
                keyword_id: tag_id,
                object_id,
                objectattribute_id,
                objectattribute_version,
                priority: 0,
            },
        );
        id
    }

    pub async fn attribute_links(&self) -> Vec<AttributeLink> {
        self.state.lock().await.links.values().cloned().collect()
    }

    pub async fn rows(&self) -> Vec<TagRow> {
        self.state.lock().await.tags.values().cloned().collect()
    }

    pub async fn keyword_rows(&self) -> Vec<KeywordRow> {
        self.state.lock().await.keywords.values().cloned().collect()
    }
}

#[async_trait]
impl TagGateway for MemoryTagGateway {
    async fn begin(&self) -> TagsResult<Box<dyn TagTransaction>> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTagTransaction {
            guard,
            work,
            languages: self.languages.clone(),
        }))
    }
}

/// Unit of work over a private copy of the arena.
pub struct MemoryTagTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
    languages: Arc<dyn LanguageRegistry>,
}

#[async_trait]
impl TagTransaction for MemoryTagTransaction {
    async fn get_basic_tag_data(&mut self, tag_id: i64) -> TagsResult<TagRow> {
        self.work.row(tag_id).cloned()
    }

    async fn get_full_tag_data(&mut self, tag_id: i64) -> TagsResult<FullTagData> {
        let row = self.work.row(tag_id)?;
        Ok(self.work.full(row))
    }

    async fn get_basic_tag_data_by_remote_id(&mut self, remote_id: &str) -> TagsResult<TagRow> {
        self.work
            .tags
            .values()
            .find(|row| row.remote_id == remote_id)
            .cloned()
            .ok_or_else(|| TagsError::not_found("tag", remote_id))
    }

    async fn get_full_tag_data_by_remote_id(
        &mut self,
        remote_id: &str,
    ) -> TagsResult<FullTagData> {
        let row = self.get_basic_tag_data_by_remote_id(remote_id).await?;
        Ok(self.work.full(&row))
    }

    async fn get_basic_tag_data_by_url(&mut self, url: &str) -> TagsResult<TagRow> {
        let mut parent_id = 0;
        let mut found: Option<&TagRow> = None;
        for segment in url_segments(url) {
            let row = self
                .work
                .tags
                .values()
                .find(|row| row.parent_id == parent_id && row.keyword == segment)
                .ok_or_else(|| TagsError::not_found("tag", url))?;
            parent_id = row.id;
            found = Some(row);
        }
        found
            .cloned()
            .ok_or_else(|| TagsError::not_found("tag", url))
    }

    async fn get_full_tag_data_by_keyword_and_parent_id(
        &mut self,
        keyword: &str,
        parent_id: i64,
    ) -> TagsResult<FullTagData> {
        let state = &self.work;
        state
            .tags
            .values()
            .find(|row| row.parent_id == parent_id && state.has_translation(row.id, |k| k == keyword))
            .map(|row| state.full(row))
            .ok_or_else(|| TagsError::not_found("tag", format!("{}/{}", parent_id, keyword)))
    }

    async fn get_children(&mut self, parent_id: i64, page: Page) -> TagsResult<Vec<FullTagData>> {
        Ok(self
            .work
            .full_where(page, |row| row.parent_id == parent_id && row.main_tag_id == 0))
    }

    async fn get_children_count(&mut self, parent_id: i64) -> TagsResult<usize> {
        Ok(self
            .work
            .tags
            .values()
            .filter(|row| row.parent_id == parent_id && row.main_tag_id == 0)
            .count())
    }

    async fn get_tags_by_keyword(
        &mut self,
        keyword: &str,
        page: Page,
    ) -> TagsResult<Vec<FullTagData>> {
        let state = &self.work;
        Ok(state.full_where(page, |row| state.has_translation(row.id, |k| k == keyword)))
    }

    async fn get_tags_by_keyword_count(&mut self, keyword: &str) -> TagsResult<usize> {
        let state = &self.work;
        Ok(state
            .tags
            .values()
            .filter(|row| state.has_translation(row.id, |k| k == keyword))
            .count())
    }

    async fn search_tags(&mut self, prefix: &str, page: Page) -> TagsResult<Vec<FullTagData>> {
        let state = &self.work;
        Ok(state.full_where(page, |row| {
            state.has_translation(row.id, |k| k.starts_with(prefix))
        }))
    }

    async fn search_tags_count(&mut self, prefix: &str) -> TagsResult<usize> {
        let state = &self.work;
        Ok(state
            .tags
            .values()
            .filter(|row| state.has_translation(row.id, |k| k.starts_with(prefix)))
            .count())
    }

    async fn get_synonyms(&mut self, tag_id: i64, page: Page) -> TagsResult<Vec<FullTagData>> {
        Ok(self.work.full_where(page, |row| row.main_tag_id == tag_id))
    }

    async fn get_synonym_count(&mut self, tag_id: i64) -> TagsResult<usize> {
        Ok(self
            .work
            .tags
            .values()
            .filter(|row| row.main_tag_id == tag_id)
            .count())
    }

    async fn get_related_content_ids(&mut self, tag_id: i64, page: Page) -> TagsResult<Vec<i64>> {
        Ok(page.apply(self.work.related_content_ids(tag_id)))
    }

    async fn get_related_content_count(&mut self, tag_id: i64) -> TagsResult<usize> {
        Ok(self.work.related_content_ids(tag_id).len())
    }

    async fn move_synonym(&mut self, synonym_id: i64, main_tag: &TagRow) -> TagsResult<()> {
        let (parent_id, main_tag_id, depth, path_string) = synonym_placement(synonym_id, main_tag);
        let row = self.work.row_mut(synonym_id)?;
        row.parent_id = parent_id;
        row.main_tag_id = main_tag_id;
        row.depth = depth;
        row.path_string = path_string;
        Ok(())
    }

    async fn create(
        &mut self,
        create_struct: &CreateStruct,
        parent: Option<&TagRow>,
    ) -> TagsResult<i64> {
        let translations = TranslationSet::build(
            &create_struct.keywords,
            &create_struct.main_language_code,
            create_struct.always_available,
            self.languages.as_ref(),
        )?;
        let remote_id = if create_struct.remote_id.is_empty() {
            generate_remote_id()
        } else {
            create_struct.remote_id.clone()
        };
        self.work.ensure_unique_remote_id(&remote_id, None)?;

        let tag_id = self.work.insert_row(TagRow {
            id: 0,
            parent_id: parent.map(|p| p.id).unwrap_or(0),
            main_tag_id: 0,
            keyword: translations.main_keyword.clone(),
            depth: parent.map(|p| p.depth + 1).unwrap_or(1),
            path_string: String::new(),
            modified: now_timestamp(),
            remote_id,
            main_language_id: translations.main_language_id,
            language_mask: translations.language_mask,
        });

        let path_string = path::child_path(parent.map(|p| p.path_string.as_str()), tag_id);
        self.work.row_mut(tag_id)?.path_string = path_string;
        self.work
            .replace_translations(tag_id, translations.keyword_rows(tag_id));

        Ok(tag_id)
    }

    async fn update(&mut self, update_struct: &UpdateStruct, tag_id: i64) -> TagsResult<()> {
        let current = self.get_full_tag_data(tag_id).await?;
        let translations =
            plan_translation_update(update_struct, &current, self.languages.as_ref())?;

        if let Some(remote_id) = &update_struct.remote_id {
            self.work.ensure_unique_remote_id(remote_id, Some(tag_id))?;
            self.work.row_mut(tag_id)?.remote_id = remote_id.clone();
        }

        if let Some(translations) = translations {
            let row = self.work.row_mut(tag_id)?;
            row.keyword = translations.main_keyword.clone();
            row.main_language_id = translations.main_language_id;
            row.language_mask = translations.language_mask;
            self.work
                .replace_translations(tag_id, translations.keyword_rows(tag_id));
        }

        Ok(())
    }

    async fn create_synonym(
        &mut self,
        synonym_struct: &SynonymCreateStruct,
        main_tag: &TagRow,
    ) -> TagsResult<i64> {
        let translations = TranslationSet::build(
            &synonym_struct.keywords,
            &synonym_struct.main_language_code,
            synonym_struct.always_available,
            self.languages.as_ref(),
        )?;
        let remote_id = synonym_struct
            .remote_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(generate_remote_id);
        self.work.ensure_unique_remote_id(&remote_id, None)?;

        let synonym_id = self.work.insert_row(TagRow {
            id: 0,
            parent_id: main_tag.parent_id,
            main_tag_id: main_tag.id,
            keyword: translations.main_keyword.clone(),
            depth: main_tag.depth,
            path_string: String::new(),
            modified: now_timestamp(),
            remote_id,
            main_language_id: translations.main_language_id,
            language_mask: translations.language_mask,
        });

        let path_string = path::synonym_path(synonym_id, &main_tag.path_string);
        self.work.row_mut(synonym_id)?.path_string = path_string;
        self.work
            .replace_translations(synonym_id, translations.keyword_rows(synonym_id));

        Ok(synonym_id)
    }

    async fn convert_to_synonym(&mut self, tag_id: i64, main_tag: &TagRow) -> TagsResult<()> {
        let (parent_id, main_tag_id, depth, path_string) = synonym_placement(tag_id, main_tag);
        let row = self.work.row_mut(tag_id)?;
        row.parent_id = parent_id;
        row.main_tag_id = main_tag_id;
        row.depth = depth;
        row.path_string = path_string;
        row.modified = now_timestamp();
        Ok(())
    }

    async fn transfer_tag_attribute_links(
        &mut self,
        tag_id: i64,
        target_tag_id: i64,
    ) -> TagsResult<()> {
        let source_links: Vec<AttributeLink> = self
            .work
            .links
            .values()
            .filter(|link| link.keyword_id == tag_id)
            .cloned()
            .collect();

        for link in source_links {
            let duplicate = self.work.links.values().any(|other| {
                other.keyword_id == target_tag_id
                    && other.objectattribute_id == link.objectattribute_id
                    && other.objectattribute_version == link.objectattribute_version
            });
            if duplicate {
                self.work.links.remove(&link.id);
            } else if let Some(stored) = self.work.links.get_mut(&link.id) {
                stored.keyword_id = target_tag_id;
            }
        }

        Ok(())
    }

    async fn move_subtree(
        &mut self,
        source: &TagRow,
        destination: Option<&TagRow>,
    ) -> TagsResult<TagRow> {
        let selected: Vec<TagRow> = self
            .work
            .tags
            .values()
            .filter(|row| {
                row.path_string.starts_with(&source.path_string) || row.main_tag_id == source.id
            })
            .cloned()
            .collect();

        let moved = plan_subtree_move(source, destination, selected, now_timestamp());
        let mut updated_source = None;
        for row in moved {
            if row.id == source.id {
                updated_source = Some(row.clone());
            }
            self.work.tags.insert(row.id, row);
        }

        updated_source.ok_or_else(|| TagsError::not_found("tag", source.id))
    }

    async fn delete_tag(&mut self, tag_id: i64) -> TagsResult<()> {
        let ids: BTreeSet<i64> = self
            .work
            .tags
            .values()
            .filter(|row| path::contains_segment(&row.path_string, tag_id) || row.main_tag_id == tag_id)
            .map(|row| row.id)
            .collect();

        if ids.is_empty() {
            return Ok(());
        }

        self.work.links.retain(|_, link| !ids.contains(&link.keyword_id));
        self.work.keywords.retain(|(id, _), _| !ids.contains(id));
        self.work.tags.retain(|id, _| !ids.contains(id));
        Ok(())
    }

    async fn update_subtree_modification_time(
        &mut self,
        path_string: &str,
        timestamp: Option<i64>,
    ) -> TagsResult<()> {
        let timestamp = timestamp.unwrap_or_else(now_timestamp);
        for id in path::path_ids(path_string) {
            if let Some(row) = self.work.tags.get_mut(&id) {
                row.modified = timestamp;
            }
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> TagsResult<()> {
        let MemoryTagTransaction {
            mut guard, work, ..
        } = *self;
        *guard = work;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> TagsResult<()> {
        Ok(())
    }
}
