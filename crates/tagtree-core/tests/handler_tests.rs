//! Integration tests for the tag repository.
//!
//! These tests drive `TagsHandler` over the in-memory gateway and verify the
//! tree invariants of create, move, copy, merge, convert and delete, plus
//! translation filtering and the keyword lookups.

use std::sync::Arc;

use tagtree_core::{MemoryTagGateway, TagsHandler, TagsService, CONTENT_STATUS_PUBLISHED};
use tagtree_model::{
    CreateStruct, LanguageRegistry, Page, StaticLanguageRegistry, SynonymCreateStruct, Tag,
    TagKind, Translations, UpdateStruct,
};

// ============================================================================
// Helper functions
// ============================================================================

struct Fixture {
    gateway: Arc<MemoryTagGateway>,
    tags: TagsHandler,
}

fn fixture() -> Fixture {
    let languages: Arc<dyn LanguageRegistry> =
        Arc::new(StaticLanguageRegistry::new(["eng-GB", "cro-HR"]).unwrap());
    let gateway = Arc::new(MemoryTagGateway::new(languages.clone()));
    let tags = TagsHandler::new(gateway.clone(), languages);
    Fixture { gateway, tags }
}

/// Create a main tag with an English keyword.
async fn create_tag(tags: &impl TagsService, parent_id: i64, keyword: &str) -> Tag {
    tags.create(&CreateStruct::new(parent_id, "eng-GB").with_keyword(keyword, None))
        .await
        .unwrap_or_else(|e| panic!("Failed to create {keyword}: {e}"))
}

/// Add an English synonym to a main tag.
async fn add_synonym(tags: &impl TagsService, main_tag_id: i64, keyword: &str) -> Tag {
    tags.add_synonym(&SynonymCreateStruct::new(main_tag_id, "eng-GB").with_keyword(keyword, None))
        .await
        .unwrap_or_else(|e| panic!("Failed to add synonym {keyword}: {e}"))
}

async fn load(tags: &impl TagsService, tag_id: i64) -> Tag {
    tags.load(tag_id, &Translations::all())
        .await
        .unwrap_or_else(|e| panic!("Failed to load {tag_id}: {e}"))
}

async fn child_ids(tags: &impl TagsService, tag_id: i64) -> Vec<i64> {
    tags.load_children(tag_id, Page::ALL, &Translations::all())
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect()
}

// ============================================================================
// Create and load
// ============================================================================

#[tokio::test]
async fn test_animals_dogs_canines_scenario() {
    let Fixture { gateway, tags } = fixture();

    let animals = create_tag(&tags, 0, "Animals").await;
    assert_eq!((animals.id, animals.depth), (1, 1));
    assert_eq!(animals.path_string, "/1/");

    let dogs = create_tag(&tags, animals.id, "Dogs").await;
    assert_eq!((dogs.id, dogs.depth, dogs.parent_tag_id), (2, 2, 1));
    assert_eq!(dogs.path_string, "/1/2/");

    let canines = add_synonym(&tags, dogs.id, "Canines").await;
    assert_eq!(canines.id, 3);
    assert_eq!(canines.kind, TagKind::Synonym { main_tag_id: 2 });
    assert_eq!(canines.parent_tag_id, 1);
    assert_eq!(canines.depth, 2);
    assert_eq!(canines.path_string, "/1/3/");

    let pets = create_tag(&tags, 0, "Pets").await;
    assert_eq!(pets.id, 4);
    assert_eq!(pets.path_string, "/4/");

    gateway.insert_content_object(100, 1, CONTENT_STATUS_PUBLISHED).await;
    gateway.add_attribute_link(dogs.id, 100, 1000, 1).await;
    gateway.add_attribute_link(canines.id, 100, 1001, 1).await;

    let moved = tags.move_subtree(dogs.id, pets.id).await.unwrap();
    assert_eq!(moved.path_string, "/4/2/");
    assert_eq!(moved.depth, 2);
    assert_eq!(moved.parent_tag_id, 4);

    let canines = load(&tags, canines.id).await;
    assert_eq!(canines.parent_tag_id, 4);
    assert_eq!(canines.path_string, "/4/3/");
    assert_eq!(canines.depth, 2);

    tags.delete_tag(dogs.id).await.unwrap();
    assert!(tags
        .load(2, &Translations::all())
        .await
        .unwrap_err()
        .is_not_found());
    assert!(tags
        .load(3, &Translations::all())
        .await
        .unwrap_err()
        .is_not_found());

    let remaining: Vec<i64> = gateway.rows().await.iter().map(|r| r.id).collect();
    assert_eq!(remaining, vec![1, 4]);
    assert!(gateway
        .keyword_rows()
        .await
        .iter()
        .all(|k| k.keyword_id == 1 || k.keyword_id == 4));
    assert!(gateway.attribute_links().await.is_empty());
}

#[tokio::test]
async fn test_create_under_missing_parent_is_not_found() {
    let Fixture { tags, .. } = fixture();
    let err = tags
        .create(&CreateStruct::new(42, "eng-GB").with_keyword("Orphan", None))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_children_of_missing_tag_are_not_found() {
    let Fixture { tags, .. } = fixture();
    let animals = create_tag(&tags, 0, "Animals").await;

    assert_eq!(tags.get_children_count(animals.id, &Translations::all()).await.unwrap(), 0);
    assert_eq!(tags.get_children_count(0, &Translations::all()).await.unwrap(), 1);
    for translations in [Translations::all(), Translations::only(["eng-GB"], false)] {
        assert!(tags
            .get_children_count(42, &translations)
            .await
            .unwrap_err()
            .is_not_found());
        assert!(tags
            .load_children(42, Page::ALL, &translations)
            .await
            .unwrap_err()
            .is_not_found());
    }
}

#[tokio::test]
async fn test_path_decodes_to_ancestor_chain() {
    let Fixture { tags, .. } = fixture();
    let a = create_tag(&tags, 0, "A").await;
    let b = create_tag(&tags, a.id, "B").await;
    let c = create_tag(&tags, b.id, "C").await;

    assert_eq!(c.path_ids(), vec![a.id, b.id, c.id]);
    assert_eq!(c.depth as usize, c.path_ids().len());
}

#[tokio::test]
async fn test_remote_id_lookups() {
    let Fixture { tags, .. } = fixture();
    let created = tags
        .create(
            &CreateStruct::new(0, "eng-GB")
                .with_keyword("Animals", None)
                .with_remote_id("animals"),
        )
        .await
        .unwrap();

    let tag = tags
        .load_by_remote_id("animals", &Translations::all())
        .await
        .unwrap();
    assert_eq!(tag.id, created.id);

    let info = tags.load_tag_info_by_remote_id("animals").await.unwrap();
    assert_eq!(info.keyword, "Animals");
    assert_eq!(info.kind, TagKind::Main);

    assert!(tags
        .load_tag_info_by_remote_id("missing")
        .await
        .unwrap_err()
        .is_not_found());

    let err = tags
        .create(
            &CreateStruct::new(0, "eng-GB")
                .with_keyword("Other", None)
                .with_remote_id("animals"),
        )
        .await
        .unwrap_err();
    assert!(err.is_constraint_violation());
}

#[tokio::test]
async fn test_url_and_keyword_parent_lookups() {
    let Fixture { tags, .. } = fixture();
    let animals = create_tag(&tags, 0, "Animals").await;
    let big_cats = tags
        .create(
            &CreateStruct::new(animals.id, "eng-GB")
                .with_keyword("Big Cats", None)
                .with_keyword("Velike mačke", Some("cro-HR")),
        )
        .await
        .unwrap();

    let info = tags.load_tag_info_by_url("/Animals/Big%20Cats/").await.unwrap();
    assert_eq!(info.id, big_cats.id);

    assert!(tags
        .load_tag_info_by_url("Animals/Dogs")
        .await
        .unwrap_err()
        .is_not_found());

    let tag = tags
        .load_tag_by_keyword_and_parent_id(
            "Velike mačke",
            animals.id,
            &Translations::only(["cro-HR"], false),
        )
        .await
        .unwrap();
    assert_eq!(tag.id, big_cats.id);
    assert_eq!(tag.keyword, "Velike mačke");

    assert!(tags
        .load_tag_by_keyword_and_parent_id("Big Cats", 0, &Translations::all())
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_update_replaces_translations() {
    let Fixture { tags, .. } = fixture();
    let dogs = create_tag(&tags, 0, "Dogs").await;
    create_tag(&tags, 0, "Cats").await;

    let mut keywords = std::collections::BTreeMap::new();
    keywords.insert("eng-GB".to_string(), "Hounds".to_string());
    keywords.insert("cro-HR".to_string(), "Psi".to_string());
    let updated = tags
        .update(
            &UpdateStruct {
                keywords: Some(keywords),
                always_available: Some(false),
                ..Default::default()
            },
            dogs.id,
        )
        .await
        .unwrap();

    assert_eq!(updated.keyword, "Hounds");
    assert_eq!(updated.language_codes, vec!["eng-GB", "cro-HR"]);
    assert!(!updated.always_available);
    assert_eq!(updated.path_string, dogs.path_string);

    let info = tags.load_tag_info(dogs.id).await.unwrap();
    assert_eq!(info.keyword, "Hounds");

    let found = tags
        .load_tags_by_keyword("Psi", "cro-HR", false, Page::ALL)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, dogs.id);

    let cats_remote = tags.load_tag_info(2).await.unwrap().remote_id;
    let err = tags
        .update(
            &UpdateStruct {
                remote_id: Some(cats_remote),
                ..Default::default()
            },
            dogs.id,
        )
        .await
        .unwrap_err();
    assert!(err.is_constraint_violation());

    assert!(tags
        .update(&UpdateStruct::default(), 99)
        .await
        .unwrap_err()
        .is_not_found());
}

// ============================================================================
// Translations
// ============================================================================

#[tokio::test]
async fn test_translation_filtering() {
    let Fixture { tags, .. } = fixture();

    let mut croatian = CreateStruct::new(0, "cro-HR").with_keyword("Psi", None);
    croatian.always_available = false;
    let dogs = tags.create(&croatian).await.unwrap();

    let cats = create_tag(&tags, 0, "Cats").await;

    let mut birds = CreateStruct::new(0, "eng-GB")
        .with_keyword("Birds", None)
        .with_keyword("Ptice", Some("cro-HR"));
    birds.always_available = false;
    let birds = tags.create(&birds).await.unwrap();

    let english = Translations::only(["eng-GB"], false);
    let croatian_fallback = Translations::only(["cro-HR"], true);
    let croatian_strict = Translations::only(["cro-HR"], false);

    assert!(tags.load(dogs.id, &english).await.unwrap_err().is_not_found());
    assert_eq!(load(&tags, dogs.id).await.keyword, "Psi");

    assert_eq!(
        tags.load(cats.id, &croatian_fallback).await.unwrap().keyword,
        "Cats"
    );
    assert!(tags
        .load(cats.id, &croatian_strict)
        .await
        .unwrap_err()
        .is_not_found());
    assert_eq!(
        tags.load(birds.id, &croatian_strict).await.unwrap().keyword,
        "Ptice"
    );

    let visible: Vec<i64> = tags
        .load_children(0, Page::ALL, &english)
        .await
        .unwrap()
        .iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(visible, vec![cats.id, birds.id]);

    let second: Vec<i64> = tags
        .load_children(0, Page::new(1, 1).unwrap(), &english)
        .await
        .unwrap()
        .iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(second, vec![birds.id]);

    assert_eq!(tags.get_children_count(0, &english).await.unwrap(), 2);
    assert_eq!(
        tags.get_children_count(0, &Translations::all())
            .await
            .unwrap(),
        3
    );
    assert!(tags
        .load_children(0, Page::new(0, 0).unwrap(), &Translations::all())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_keyword_lookup_and_search() {
    let Fixture { tags, .. } = fixture();
    let cats = create_tag(&tags, 0, "Cats").await;
    let cattle = create_tag(&tags, 0, "Cattle").await;
    create_tag(&tags, 0, "Dogs").await;

    let found = tags
        .load_tags_by_keyword("Cats", "eng-GB", false, Page::ALL)
        .await
        .unwrap();
    assert_eq!(found.iter().map(|t| t.id).collect::<Vec<_>>(), vec![cats.id]);

    // Always-available tags match through their main language keyword.
    assert_eq!(
        tags.get_tags_by_keyword_count("Cats", "cro-HR", true)
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        tags.get_tags_by_keyword_count("Cats", "cro-HR", false)
            .await
            .unwrap(),
        0
    );

    let result = tags
        .search_tags("Ca", "eng-GB", false, Page::new(0, 1).unwrap())
        .await
        .unwrap();
    assert_eq!(result.total_count, 2);
    assert_eq!(result.tags.len(), 1);
    assert_eq!(result.tags[0].id, cats.id);

    let result = tags
        .search_tags("Ca", "eng-GB", false, Page::new(1, -1).unwrap())
        .await
        .unwrap();
    assert_eq!(result.tags[0].id, cattle.id);

    let result = tags
        .search_tags("Zebra", "eng-GB", true, Page::ALL)
        .await
        .unwrap();
    assert_eq!(result.total_count, 0);
}

// ============================================================================
// Move
// ============================================================================

#[tokio::test]
async fn test_move_preserves_relative_depths_and_order() {
    let Fixture { tags, .. } = fixture();
    let a = create_tag(&tags, 0, "A").await;
    let b = create_tag(&tags, a.id, "B").await;
    let c = create_tag(&tags, b.id, "C").await;
    let d = create_tag(&tags, b.id, "D").await;
    let e = create_tag(&tags, c.id, "E").await;
    let x = create_tag(&tags, 0, "X").await;

    let moved = tags.move_subtree(b.id, x.id).await.unwrap();
    assert_eq!(moved.path_string, format!("/{}/{}/", x.id, b.id));
    assert_eq!(moved.parent_tag_id, x.id);

    let c = load(&tags, c.id).await;
    assert_eq!(c.path_string, format!("/{}/{}/{}/", x.id, b.id, c.id));
    assert_eq!((c.depth, c.parent_tag_id), (3, b.id));

    let e = load(&tags, e.id).await;
    assert_eq!(
        e.path_string,
        format!("/{}/{}/{}/{}/", x.id, b.id, c.id, e.id)
    );
    assert_eq!(e.depth, 4);

    assert_eq!(child_ids(&tags, b.id).await, vec![c.id, d.id]);
    assert!(child_ids(&tags, a.id).await.is_empty());

    let c = tags.move_subtree(c.id, 0).await.unwrap();
    assert_eq!(c.path_string, format!("/{}/", c.id));
    assert_eq!((c.depth, c.parent_tag_id), (1, 0));
    let e = load(&tags, e.id).await;
    assert_eq!(e.path_string, format!("/{}/{}/", c.id, e.id));
    assert_eq!(e.depth, 2);
}

#[tokio::test]
async fn test_move_rejects_invalid_destinations() {
    let Fixture { tags, .. } = fixture();
    let a = create_tag(&tags, 0, "A").await;
    let b = create_tag(&tags, a.id, "B").await;
    let c = create_tag(&tags, b.id, "C").await;
    let synonym = add_synonym(&tags, c.id, "See").await;

    for destination in [b.id, c.id] {
        let err = tags.move_subtree(b.id, destination).await.unwrap_err();
        assert!(err.is_invalid_argument(), "destination {destination}");
    }
    assert!(tags
        .move_subtree(a.id, synonym.id)
        .await
        .unwrap_err()
        .is_invalid_argument());
    assert!(tags
        .move_subtree(synonym.id, 0)
        .await
        .unwrap_err()
        .is_invalid_argument());
    assert!(tags.move_subtree(b.id, 99).await.unwrap_err().is_not_found());

    // Nothing moved.
    assert_eq!(load(&tags, c.id).await.path_string, c.path_string);
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn test_delete_anchors_on_full_path_segments() {
    let Fixture { gateway, tags } = fixture();
    for n in 1..=11 {
        create_tag(&tags, 0, &format!("Root {}", n)).await;
    }
    let under_eleven = create_tag(&tags, 11, "Under eleven").await;
    let eleven_synonym = add_synonym(&tags, 11, "Eleven").await;
    let under_one = create_tag(&tags, 1, "Under one").await;
    assert_eq!(under_eleven.path_string, "/11/12/");
    assert_eq!(under_one.path_string, "/1/14/");

    tags.delete_tag(1).await.unwrap();

    let ids: Vec<i64> = gateway.rows().await.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13]);
    assert_eq!(load(&tags, eleven_synonym.id).await.main_tag_id(), 11);

    // Deleting again is a no-op.
    tags.delete_tag(1).await.unwrap();
    assert_eq!(gateway.rows().await.len(), 12);
}

#[tokio::test]
async fn test_delete_synonym_keeps_main_tag() {
    let Fixture { tags, .. } = fixture();
    let dogs = create_tag(&tags, 0, "Dogs").await;
    let hounds = add_synonym(&tags, dogs.id, "Hounds").await;

    tags.delete_tag(hounds.id).await.unwrap();

    assert_eq!(load(&tags, dogs.id).await.keyword, "Dogs");
    assert_eq!(
        tags.get_synonym_count(dogs.id, &Translations::all())
            .await
            .unwrap(),
        0
    );
}

// ============================================================================
// Merge and convert
// ============================================================================

#[tokio::test]
async fn test_merge_transfers_links_without_duplicates() {
    let Fixture { gateway, tags } = fixture();
    let a = create_tag(&tags, 0, "A").await;
    let b = create_tag(&tags, 0, "B").await;
    let a_child = create_tag(&tags, a.id, "A child").await;
    let a_synonym = add_synonym(&tags, a.id, "A synonym").await;

    for object_id in [100, 200, 300] {
        gateway
            .insert_content_object(object_id, 1, CONTENT_STATUS_PUBLISHED)
            .await;
    }
    gateway.add_attribute_link(a.id, 100, 1000, 1).await;
    gateway.add_attribute_link(b.id, 100, 1000, 1).await;
    gateway.add_attribute_link(a.id, 200, 2000, 1).await;
    gateway.add_attribute_link(a_synonym.id, 300, 3000, 1).await;

    tags.merge(a.id, b.id).await.unwrap();

    let links = gateway.attribute_links().await;
    assert_eq!(links.len(), 3);
    assert!(links.iter().all(|link| link.keyword_id == b.id));
    assert_eq!(
        tags.load_related_content_ids(b.id, Page::ALL).await.unwrap(),
        vec![100, 200, 300]
    );
    assert_eq!(tags.get_related_content_count(b.id).await.unwrap(), 3);

    let moved_child = load(&tags, a_child.id).await;
    assert_eq!(moved_child.parent_tag_id, b.id);
    assert_eq!(moved_child.path_string, format!("/{}/{}/", b.id, a_child.id));

    assert!(tags
        .load(a.id, &Translations::all())
        .await
        .unwrap_err()
        .is_not_found());
    assert!(tags
        .load(a_synonym.id, &Translations::all())
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_merge_validation() {
    let Fixture { tags, .. } = fixture();
    let a = create_tag(&tags, 0, "A").await;
    let child = create_tag(&tags, a.id, "Child").await;

    assert!(tags.merge(a.id, a.id).await.unwrap_err().is_invalid_argument());
    assert!(tags
        .merge(a.id, child.id)
        .await
        .unwrap_err()
        .is_invalid_argument());
    assert!(tags.merge(a.id, 99).await.unwrap_err().is_not_found());
    assert_eq!(child_ids(&tags, a.id).await, vec![child.id]);
}

#[tokio::test]
async fn test_convert_to_synonym_moves_children_and_synonyms() {
    let Fixture { tags, .. } = fixture();
    let a = create_tag(&tags, 0, "A").await;
    let b = create_tag(&tags, 0, "B").await;
    let a_child = create_tag(&tags, a.id, "A child").await;
    let a_synonym = add_synonym(&tags, a.id, "A synonym").await;

    let converted = tags.convert_to_synonym(a.id, b.id).await.unwrap();
    assert_eq!(converted.kind, TagKind::Synonym { main_tag_id: b.id });
    assert_eq!(converted.parent_tag_id, 0);
    assert_eq!(converted.depth, 1);
    assert_eq!(converted.path_string, format!("/{}/", a.id));

    let child = load(&tags, a_child.id).await;
    assert_eq!(child.parent_tag_id, b.id);
    assert_eq!(child.path_string, format!("/{}/{}/", b.id, a_child.id));

    let synonym_ids: Vec<i64> = tags
        .load_synonyms(b.id, Page::ALL, &Translations::all())
        .await
        .unwrap()
        .iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(synonym_ids, vec![a.id, a_synonym.id]);

    assert!(tags
        .convert_to_synonym(b.id, a.id)
        .await
        .unwrap_err()
        .is_invalid_argument());
}

// ============================================================================
// Copy
// ============================================================================

#[tokio::test]
async fn test_copy_subtree_builds_isomorphic_tree() {
    let Fixture { tags, .. } = fixture();
    let a = create_tag(&tags, 0, "A").await;
    let b = create_tag(&tags, a.id, "B").await;
    let c = create_tag(&tags, b.id, "C").await;
    tags.add_synonym(
        &SynonymCreateStruct::new(b.id, "eng-GB")
            .with_keyword("Bee", None)
            .with_keyword("Pčela", Some("cro-HR")),
    )
    .await
    .unwrap();
    let d = create_tag(&tags, 0, "D").await;

    let copy = tags.copy_subtree(a.id, d.id).await.unwrap();
    assert_eq!(copy.keyword, "A");
    assert_eq!(copy.parent_tag_id, d.id);
    assert_eq!(copy.depth, 2);
    assert_ne!(copy.remote_id, a.remote_id);

    let copied_children = tags
        .load_children(copy.id, Page::ALL, &Translations::all())
        .await
        .unwrap();
    assert_eq!(copied_children.len(), 1);
    let copied_b = &copied_children[0];
    assert_eq!(copied_b.keyword, "B");
    assert_eq!(copied_b.depth, 3);

    let copied_synonyms = tags
        .load_synonyms(copied_b.id, Page::ALL, &Translations::all())
        .await
        .unwrap();
    assert_eq!(copied_synonyms.len(), 1);
    assert_eq!(copied_synonyms[0].keyword_in("cro-HR"), Some("Pčela"));
    assert_eq!(copied_synonyms[0].parent_tag_id, copy.id);

    let copied_c = tags
        .load_children(copied_b.id, Page::ALL, &Translations::all())
        .await
        .unwrap();
    assert_eq!(copied_c.len(), 1);
    assert_eq!(copied_c[0].keyword, "C");
    assert_eq!(copied_c[0].depth, 4);
    assert_eq!(copied_c[0].path_ids()[..2], [d.id, copy.id]);

    // The source is untouched.
    assert_eq!(child_ids(&tags, a.id).await, vec![b.id]);
    assert_eq!(child_ids(&tags, b.id).await, vec![c.id]);

    assert!(tags
        .copy_subtree(a.id, c.id)
        .await
        .unwrap_err()
        .is_invalid_argument());

    let root_copy = tags.copy_subtree(b.id, 0).await.unwrap();
    assert_eq!(root_copy.path_string, format!("/{}/", root_copy.id));
    assert_eq!(root_copy.depth, 1);
}
