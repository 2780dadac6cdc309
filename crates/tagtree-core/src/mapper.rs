//! Row to domain value conversion.

use std::sync::Arc;

use chrono::DateTime;

use tagtree_model::{LanguageRegistry, Tag, TagInfo, TagKind, TagsResult, Translations};

use crate::gateway::{FullTagData, TagRow};

/// Builds `Tag` and `TagInfo` values from gateway rows.
#[derive(Clone)]
pub struct TagMapper {
    languages: Arc<dyn LanguageRegistry>,
}

impl TagMapper {
    pub fn new(languages: Arc<dyn LanguageRegistry>) -> Self {
        Self { languages }
    }

    pub fn languages(&self) -> &dyn LanguageRegistry {
        self.languages.as_ref()
    }

    pub fn is_visible(&self, row: &TagRow, translations: &Translations) -> bool {
        translations.is_visible(row.mask(), self.languages())
    }

    pub fn to_tag_info(&self, row: TagRow) -> TagsResult<TagInfo> {
        let main_language_code = self.languages.language_code(row.main_language_id)?;
        Ok(TagInfo {
            id: row.id,
            parent_tag_id: row.parent_id,
            kind: TagKind::from_main_tag_id(row.main_tag_id),
            depth: row.depth,
            modification_date: DateTime::from_timestamp(row.modified, 0).unwrap_or_default(),
            always_available: row.mask().is_always_available(),
            language_codes: row.mask().language_codes(self.languages()),
            main_language_code,
            keyword: row.keyword,
            path_string: row.path_string,
            remote_id: row.remote_id,
        })
    }

    pub fn to_tag(&self, data: FullTagData, translations: &Translations) -> TagsResult<Tag> {
        let FullTagData { row, keywords } = data;
        let main_language_code = self.languages.language_code(row.main_language_id)?;

        let keyword = translations
            .requested()
            .iter()
            .find_map(|code| keywords.get(code))
            .or_else(|| keywords.get(&main_language_code))
            .cloned()
            .unwrap_or_else(|| row.keyword.clone());

        Ok(Tag {
            id: row.id,
            parent_tag_id: row.parent_id,
            kind: TagKind::from_main_tag_id(row.main_tag_id),
            keyword,
            keywords,
            depth: row.depth,
            modification_date: DateTime::from_timestamp(row.modified, 0).unwrap_or_default(),
            always_available: row.mask().is_always_available(),
            language_codes: row.mask().language_codes(self.languages()),
            main_language_code,
            path_string: row.path_string,
            remote_id: row.remote_id,
        })
    }

    /// Map the visible entries of a list, preserving order.
    pub fn to_visible_tags(
        &self,
        rows: Vec<FullTagData>,
        translations: &Translations,
    ) -> TagsResult<Vec<Tag>> {
        rows.into_iter()
            .filter(|data| self.is_visible(&data.row, translations))
            .map(|data| self.to_tag(data, translations))
            .collect()
    }
}
