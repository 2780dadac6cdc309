//! PostgreSQL storage gateway.
//!
//! A unit of work is one database transaction. Every statement is
//! parameterized; subtree selection relies on `LIKE` prefix matches over
//! `path_string`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use tagtree_core::gateway::{
    generate_remote_id, now_timestamp, plan_subtree_move, plan_translation_update,
    synonym_placement, url_segments, TranslationSet,
};
use tagtree_core::{
    AttributeLink, FullTagData, KeywordRow, TagGateway, TagRow, TagTransaction,
    CONTENT_STATUS_PUBLISHED, KEYWORD_STATUS_PUBLISHED,
};
use tagtree_model::path;
use tagtree_model::{
    CreateStruct, LanguageRegistry, Page, SynonymCreateStruct, TagsError, TagsResult,
    UpdateStruct,
};

use crate::entities::{KeywordRecord, LinkRecord, TagRecord, TAG_COLUMNS};
use crate::error::db_err;

/// Escape `LIKE` wildcards so `value` matches literally.
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Pattern matching every string starting with `prefix`.
pub fn like_prefix(prefix: &str) -> String {
    format!("{}%", escape_like(prefix))
}

fn page_limit(page: Page) -> Option<i64> {
    page.max_items().map(|n| i64::try_from(n).unwrap_or(i64::MAX))
}

/// Offsets past `i64::MAX` saturate, yielding an empty page.
fn page_offset(page: Page) -> i64 {
    i64::try_from(page.offset).unwrap_or(i64::MAX)
}

/// Gateway over a Postgres pool.
#[derive(Clone)]
pub struct PgTagGateway {
    pool: PgPool,
    languages: Arc<dyn LanguageRegistry>,
}

impl PgTagGateway {
    pub fn new(pool: PgPool, languages: Arc<dyn LanguageRegistry>) -> Self {
        Self { pool, languages }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TagGateway for PgTagGateway {
    async fn begin(&self) -> TagsResult<Box<dyn TagTransaction>> {
        let tx = self.pool.begin().await.map_err(db_err)?;
        Ok(Box::new(PgTagTransaction {
            tx,
            languages: self.languages.clone(),
        }))
    }
}

/// Unit of work bound to one Postgres transaction.
pub struct PgTagTransaction {
    tx: Transaction<'static, Postgres>,
    languages: Arc<dyn LanguageRegistry>,
}

impl PgTagTransaction {
    async fn fetch_row(&mut self, tag_id: i64) -> TagsResult<Option<TagRow>> {
        let sql = format!("SELECT {} FROM tags WHERE id = $1", TAG_COLUMNS);
        let record = sqlx::query_as::<_, TagRecord>(&sql)
            .bind(tag_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(record.map(TagRow::from))
    }

    async fn fetch_rows(&mut self, sql: &str, binds: RowBinds<'_>) -> TagsResult<Vec<TagRow>> {
        let mut query = sqlx::query_as::<_, TagRecord>(sql);
        for bind in binds.0 {
            query = match bind {
                Bind::Int(v) => query.bind(v),
                Bind::OptInt(v) => query.bind(v),
                Bind::Text(v) => query.bind(v),
            };
        }
        let records = query.fetch_all(&mut *self.tx).await.map_err(db_err)?;
        Ok(records.into_iter().map(TagRow::from).collect())
    }

    async fn fetch_count(&mut self, sql: &str, binds: RowBinds<'_>) -> TagsResult<usize> {
        let mut query = sqlx::query_scalar::<_, i64>(sql);
        for bind in binds.0 {
            query = match bind {
                Bind::Int(v) => query.bind(v),
                Bind::OptInt(v) => query.bind(v),
                Bind::Text(v) => query.bind(v),
            };
        }
        let count = query.fetch_one(&mut *self.tx).await.map_err(db_err)?;
        Ok(count.max(0) as usize)
    }

    /// Attach published translations to each row, preserving order.
    async fn with_keywords(&mut self, rows: Vec<TagRow>) -> TagsResult<Vec<FullTagData>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let records = sqlx::query_as::<_, KeywordRecord>(
            r#"
            SELECT keyword_id, language_id, keyword, locale, status
            FROM tag_keywords
            WHERE keyword_id = ANY($1) AND status = $2
            "#,
        )
        .bind(&ids)
        .bind(KEYWORD_STATUS_PUBLISHED)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;

        let mut keywords: HashMap<i64, BTreeMap<String, String>> = HashMap::new();
        for row in records.into_iter().map(KeywordRow::from) {
            keywords
                .entry(row.keyword_id)
                .or_default()
                .insert(row.locale, row.keyword);
        }

        Ok(rows
            .into_iter()
            .map(|row| FullTagData {
                keywords: keywords.remove(&row.id).unwrap_or_default(),
                row,
            })
            .collect())
    }

    async fn full(&mut self, row: TagRow) -> TagsResult<FullTagData> {
        let mut data = self.with_keywords(vec![row]).await?;
        data.pop()
            .ok_or_else(|| TagsError::Storage("translation lookup lost its row".to_string()))
    }

    async fn ensure_unique_remote_id(&mut self, remote_id: &str, except: i64) -> TagsResult<()> {
        let taken: Option<i64> =
            sqlx::query_scalar("SELECT id FROM tags WHERE remote_id = $1 AND id <> $2")
                .bind(remote_id)
                .bind(except)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(db_err)?;
        if taken.is_some() {
            return Err(TagsError::ConstraintViolation(format!(
                "remote id '{}' is already in use",
                remote_id
            )));
        }
        Ok(())
    }

    /// First phase of the two-phase insert: the path is patched once the id
    /// is known.
    #[allow(clippy::too_many_arguments)]
    async fn insert_row(
        &mut self,
        parent_id: i64,
        main_tag_id: i64,
        depth: i32,
        remote_id: &str,
        translations: &TranslationSet,
    ) -> TagsResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO tags (parent_id, main_tag_id, keyword, depth, path_string,
                              modified, remote_id, main_language_id, language_mask)
            VALUES ($1, $2, $3, $4, '', $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(parent_id)
        .bind(main_tag_id)
        .bind(&translations.main_keyword)
        .bind(depth)
        .bind(now_timestamp())
        .bind(remote_id)
        .bind(translations.main_language_id)
        .bind(translations.language_mask)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(id)
    }

    async fn set_path(&mut self, tag_id: i64, path_string: &str) -> TagsResult<()> {
        sqlx::query("UPDATE tags SET path_string = $1 WHERE id = $2")
            .bind(path_string)
            .bind(tag_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn replace_translations(&mut self, tag_id: i64, rows: Vec<KeywordRow>) -> TagsResult<()> {
        sqlx::query("DELETE FROM tag_keywords WHERE keyword_id = $1")
            .bind(tag_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO tag_keywords (keyword_id, language_id, keyword, locale, status)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(row.keyword_id)
            .bind(row.language_id)
            .bind(&row.keyword)
            .bind(&row.locale)
            .bind(row.status)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        }
        Ok(())
    }

    async fn place_as_synonym(
        &mut self,
        tag_id: i64,
        main_tag: &TagRow,
        modified: Option<i64>,
    ) -> TagsResult<()> {
        let (parent_id, main_tag_id, depth, path_string) = synonym_placement(tag_id, main_tag);
        let result = sqlx::query(
            r#"
            UPDATE tags
            SET parent_id = $1, main_tag_id = $2, depth = $3, path_string = $4,
                modified = COALESCE($5, modified)
            WHERE id = $6
            "#,
        )
        .bind(parent_id)
        .bind(main_tag_id)
        .bind(depth)
        .bind(&path_string)
        .bind(modified)
        .bind(tag_id)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(TagsError::not_found("tag", tag_id));
        }
        Ok(())
    }
}

enum Bind<'a> {
    Int(i64),
    OptInt(Option<i64>),
    Text(&'a str),
}

/// Positional parameters for the list and count helpers.
struct RowBinds<'a>(Vec<Bind<'a>>);

impl<'a> RowBinds<'a> {
    fn new() -> Self {
        Self(Vec::new())
    }

    fn int(mut self, v: i64) -> Self {
        self.0.push(Bind::Int(v));
        self
    }

    fn text(mut self, v: &'a str) -> Self {
        self.0.push(Bind::Text(v));
        self
    }

    fn page(mut self, page: Page) -> Self {
        self.0.push(Bind::OptInt(page_limit(page)));
        self.0.push(Bind::Int(page_offset(page)));
        self
    }
}

const HAS_KEYWORD: &str = "EXISTS (SELECT 1 FROM tag_keywords k \
     WHERE k.keyword_id = t.id AND k.keyword = $1 AND k.status = 1)";

const HAS_KEYWORD_PREFIX: &str = "EXISTS (SELECT 1 FROM tag_keywords k \
     WHERE k.keyword_id = t.id AND k.keyword LIKE $1 ESCAPE '\\' AND k.status = 1)";

#[async_trait]
impl TagTransaction for PgTagTransaction {
    async fn get_basic_tag_data(&mut self, tag_id: i64) -> TagsResult<TagRow> {
        self.fetch_row(tag_id)
            .await?
            .ok_or_else(|| TagsError::not_found("tag", tag_id))
    }

    async fn get_full_tag_data(&mut self, tag_id: i64) -> TagsResult<FullTagData> {
        let row = self.get_basic_tag_data(tag_id).await?;
        self.full(row).await
    }

    async fn get_basic_tag_data_by_remote_id(&mut self, remote_id: &str) -> TagsResult<TagRow> {
        let sql = format!("SELECT {} FROM tags WHERE remote_id = $1", TAG_COLUMNS);
        let record = sqlx::query_as::<_, TagRecord>(&sql)
            .bind(remote_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
        record
            .map(TagRow::from)
            .ok_or_else(|| TagsError::not_found("tag", remote_id))
    }

    async fn get_full_tag_data_by_remote_id(
        &mut self,
        remote_id: &str,
    ) -> TagsResult<FullTagData> {
        let row = self.get_basic_tag_data_by_remote_id(remote_id).await?;
        self.full(row).await
    }

    async fn get_basic_tag_data_by_url(&mut self, url: &str) -> TagsResult<TagRow> {
        let sql = format!(
            "SELECT {} FROM tags WHERE parent_id = $1 AND keyword = $2 ORDER BY id LIMIT 1",
            TAG_COLUMNS
        );
        let mut parent_id = 0;
        let mut found = None;
        for segment in url_segments(url) {
            let record = sqlx::query_as::<_, TagRecord>(&sql)
                .bind(parent_id)
                .bind(&segment)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(db_err)?
                .ok_or_else(|| TagsError::not_found("tag", url))?;
            parent_id = record.id;
            found = Some(TagRow::from(record));
        }
        found.ok_or_else(|| TagsError::not_found("tag", url))
    }

    async fn get_full_tag_data_by_keyword_and_parent_id(
        &mut self,
        keyword: &str,
        parent_id: i64,
    ) -> TagsResult<FullTagData> {
        let sql = format!(
            "SELECT {} FROM tags t WHERE {} AND t.parent_id = $2 ORDER BY t.id LIMIT 1",
            TAG_COLUMNS, HAS_KEYWORD
        );
        let mut rows = self
            .fetch_rows(&sql, RowBinds::new().text(keyword).int(parent_id))
            .await?;
        match rows.pop() {
            Some(row) => self.full(row).await,
            None => Err(TagsError::not_found(
                "tag",
                format!("{}/{}", parent_id, keyword),
            )),
        }
    }

    async fn get_children(&mut self, parent_id: i64, page: Page) -> TagsResult<Vec<FullTagData>> {
        let sql = format!(
            "SELECT {} FROM tags WHERE parent_id = $1 AND main_tag_id = 0 \
             ORDER BY id LIMIT $2 OFFSET $3",
            TAG_COLUMNS
        );
        let rows = self
            .fetch_rows(&sql, RowBinds::new().int(parent_id).page(page))
            .await?;
        self.with_keywords(rows).await
    }

    async fn get_children_count(&mut self, parent_id: i64) -> TagsResult<usize> {
        self.fetch_count(
            "SELECT COUNT(*) FROM tags WHERE parent_id = $1 AND main_tag_id = 0",
            RowBinds::new().int(parent_id),
        )
        .await
    }

    async fn get_tags_by_keyword(
        &mut self,
        keyword: &str,
        page: Page,
    ) -> TagsResult<Vec<FullTagData>> {
        let sql = format!(
            "SELECT {} FROM tags t WHERE {} ORDER BY t.id LIMIT $2 OFFSET $3",
            TAG_COLUMNS, HAS_KEYWORD
        );
        let rows = self
            .fetch_rows(&sql, RowBinds::new().text(keyword).page(page))
            .await?;
        self.with_keywords(rows).await
    }

    async fn get_tags_by_keyword_count(&mut self, keyword: &str) -> TagsResult<usize> {
        let sql = format!("SELECT COUNT(*) FROM tags t WHERE {}", HAS_KEYWORD);
        self.fetch_count(&sql, RowBinds::new().text(keyword)).await
    }

    async fn search_tags(&mut self, prefix: &str, page: Page) -> TagsResult<Vec<FullTagData>> {
        let pattern = like_prefix(prefix);
        let sql = format!(
            "SELECT {} FROM tags t WHERE {} ORDER BY t.id LIMIT $2 OFFSET $3",
            TAG_COLUMNS, HAS_KEYWORD_PREFIX
        );
        let rows = self
            .fetch_rows(&sql, RowBinds::new().text(&pattern).page(page))
            .await?;
        self.with_keywords(rows).await
    }

    async fn search_tags_count(&mut self, prefix: &str) -> TagsResult<usize> {
        let pattern = like_prefix(prefix);
        let sql = format!("SELECT COUNT(*) FROM tags t WHERE {}", HAS_KEYWORD_PREFIX);
        self.fetch_count(&sql, RowBinds::new().text(&pattern)).await
    }

    async fn get_synonyms(&mut self, tag_id: i64, page: Page) -> TagsResult<Vec<FullTagData>> {
        let sql = format!(
            "SELECT {} FROM tags WHERE main_tag_id = $1 ORDER BY id LIMIT $2 OFFSET $3",
            TAG_COLUMNS
        );
        let rows = self
            .fetch_rows(&sql, RowBinds::new().int(tag_id).page(page))
            .await?;
        self.with_keywords(rows).await
    }

    async fn get_synonym_count(&mut self, tag_id: i64) -> TagsResult<usize> {
        self.fetch_count(
            "SELECT COUNT(*) FROM tags WHERE main_tag_id = $1",
            RowBinds::new().int(tag_id),
        )
        .await
    }

    async fn get_related_content_ids(&mut self, tag_id: i64, page: Page) -> TagsResult<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT l.object_id
            FROM content_links l
            INNER JOIN content_objects o
                ON o.id = l.object_id
               AND o.current_version = l.objectattribute_version
               AND o.status = $2
            WHERE l.keyword_id = $1
            ORDER BY l.object_id
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(tag_id)
        .bind(CONTENT_STATUS_PUBLISHED)
        .bind(page_limit(page))
        .bind(page_offset(page))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(ids)
    }

    async fn get_related_content_count(&mut self, tag_id: i64) -> TagsResult<usize> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT l.object_id)
            FROM content_links l
            INNER JOIN content_objects o
                ON o.id = l.object_id
               AND o.current_version = l.objectattribute_version
               AND o.status = $2
            WHERE l.keyword_id = $1
            "#,
        )
        .bind(tag_id)
        .bind(CONTENT_STATUS_PUBLISHED)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(count.max(0) as usize)
    }

    async fn move_synonym(&mut self, synonym_id: i64, main_tag: &TagRow) -> TagsResult<()> {
        self.place_as_synonym(synonym_id, main_tag, None).await
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

        let tag_id = self
            .insert_row(
                parent.map(|p| p.id).unwrap_or(0),
                0,
                parent.map(|p| p.depth + 1).unwrap_or(1),
                &remote_id,
                &translations,
            )
            .await?;
        let path_string = path::child_path(parent.map(|p| p.path_string.as_str()), tag_id);
        self.set_path(tag_id, &path_string).await?;
        self.replace_translations(tag_id, translations.keyword_rows(tag_id))
            .await?;

        debug!(tag_id, path = %path_string, "Inserted tag row");
        Ok(tag_id)
    }

    async fn update(&mut self, update_struct: &UpdateStruct, tag_id: i64) -> TagsResult<()> {
        let current = self.get_full_tag_data(tag_id).await?;
        let translations =
            plan_translation_update(update_struct, &current, self.languages.as_ref())?;

        if let Some(remote_id) = &update_struct.remote_id {
            self.ensure_unique_remote_id(remote_id, tag_id).await?;
            sqlx::query("UPDATE tags SET remote_id = $1 WHERE id = $2")
                .bind(remote_id)
                .bind(tag_id)
                .execute(&mut *self.tx)
                .await
                .map_err(db_err)?;
        }

        if let Some(translations) = translations {
            sqlx::query(
                r#"
                UPDATE tags
                SET keyword = $1, main_language_id = $2, language_mask = $3
                WHERE id = $4
                "#,
            )
            .bind(&translations.main_keyword)
            .bind(translations.main_language_id)
            .bind(translations.language_mask)
            .bind(tag_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
            self.replace_translations(tag_id, translations.keyword_rows(tag_id))
                .await?;
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

        let synonym_id = self
            .insert_row(
                main_tag.parent_id,
                main_tag.id,
                main_tag.depth,
                &remote_id,
                &translations,
            )
            .await?;
        let path_string = path::synonym_path(synonym_id, &main_tag.path_string);
        self.set_path(synonym_id, &path_string).await?;
        self.replace_translations(synonym_id, translations.keyword_rows(synonym_id))
            .await?;

        debug!(synonym_id, main_tag_id = main_tag.id, "Inserted synonym row");
        Ok(synonym_id)
    }

    async fn convert_to_synonym(&mut self, tag_id: i64, main_tag: &TagRow) -> TagsResult<()> {
        self.place_as_synonym(tag_id, main_tag, Some(now_timestamp()))
            .await
    }

    async fn transfer_tag_attribute_links(
        &mut self,
        tag_id: i64,
        target_tag_id: i64,
    ) -> TagsResult<()> {
        let links: Vec<AttributeLink> = sqlx::query_as::<_, LinkRecord>(
            r#"
            SELECT id, keyword_id, object_id, objectattribute_id,
                   objectattribute_version, priority
            FROM content_links
            WHERE keyword_id = $1
            ORDER BY id
            "#,
        )
        .bind(tag_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?
        .into_iter()
        .map(AttributeLink::from)
        .collect();

        for link in links {
            let duplicate: Option<i64> = sqlx::query_scalar(
                r#"
                SELECT id FROM content_links
                WHERE keyword_id = $1 AND objectattribute_id = $2
                  AND objectattribute_version = $3
                LIMIT 1
                "#,
            )
            .bind(target_tag_id)
            .bind(link.objectattribute_id)
            .bind(link.objectattribute_version)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;

            let query = if duplicate.is_some() {
                sqlx::query("DELETE FROM content_links WHERE id = $1").bind(link.id)
            } else {
                sqlx::query("UPDATE content_links SET keyword_id = $1 WHERE id = $2")
                    .bind(target_tag_id)
                    .bind(link.id)
            };
            query.execute(&mut *self.tx).await.map_err(db_err)?;
        }

        Ok(())
    }

    async fn move_subtree(
        &mut self,
        source: &TagRow,
        destination: Option<&TagRow>,
    ) -> TagsResult<TagRow> {
        let sql = format!(
            "SELECT {} FROM tags WHERE path_string LIKE $1 ESCAPE '\\' OR main_tag_id = $2 \
             ORDER BY id",
            TAG_COLUMNS
        );
        let pattern = like_prefix(&source.path_string);
        let selected = self
            .fetch_rows(&sql, RowBinds::new().text(&pattern).int(source.id))
            .await?;

        let moved = plan_subtree_move(source, destination, selected, now_timestamp());
        let mut updated_source = None;
        for row in moved {
            sqlx::query(
                r#"
                UPDATE tags
                SET parent_id = $1, depth = $2, path_string = $3, modified = $4
                WHERE id = $5
                "#,
            )
            .bind(row.parent_id)
            .bind(row.depth)
            .bind(&row.path_string)
            .bind(row.modified)
            .bind(row.id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;

            if row.id == source.id {
                updated_source = Some(row);
            }
        }

        updated_source.ok_or_else(|| TagsError::not_found("tag", source.id))
    }

    async fn delete_tag(&mut self, tag_id: i64) -> TagsResult<()> {
        let pattern = format!("%{}%", path::segment(tag_id));
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM tags WHERE path_string LIKE $1 OR main_tag_id = $2")
                .bind(&pattern)
                .bind(tag_id)
                .fetch_all(&mut *self.tx)
                .await
                .map_err(db_err)?;

        if ids.is_empty() {
            return Ok(());
        }

        for statement in [
            "DELETE FROM content_links WHERE keyword_id = ANY($1)",
            "DELETE FROM tag_keywords WHERE keyword_id = ANY($1)",
            "DELETE FROM tags WHERE id = ANY($1)",
        ] {
            sqlx::query(statement)
                .bind(&ids)
                .execute(&mut *self.tx)
                .await
                .map_err(db_err)?;
        }

        debug!(tag_id, deleted = ids.len(), "Deleted tag rows");
        Ok(())
    }

    async fn update_subtree_modification_time(
        &mut self,
        path_string: &str,
        timestamp: Option<i64>,
    ) -> TagsResult<()> {
        let ids = path::path_ids(path_string);
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query("UPDATE tags SET modified = $1 WHERE id = ANY($2)")
            .bind(timestamp.unwrap_or_else(now_timestamp))
            .bind(&ids)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> TagsResult<()> {
        self.tx.commit().await.map_err(db_err)
    }

    async fn rollback(self: Box<Self>) -> TagsResult<()> {
        self.tx.rollback().await.map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_patterns_escape_wildcards() {
        assert_eq!(like_prefix("/1/2/"), "/1/2/%");
        assert_eq!(like_prefix("50%_off"), "50\\%\\_off%");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_page_binds() {
        assert_eq!(page_limit(Page::ALL), None);
        let page = Page::new(5, 10).unwrap();
        assert_eq!(page_limit(page), Some(10));
        assert_eq!(page_offset(page), 5);

        let far = Page::new(usize::MAX, 10).unwrap();
        assert_eq!(page_offset(far), i64::MAX);
    }
}
