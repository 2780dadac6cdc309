//! Materialized path strings.
//!
//! A path is `"/"` followed by every ancestor id from the root down, then the
//! tag's own id, each terminated by `"/"`: `/1/2/5/`. The root context (no
//! parent) is the bare `"/"`.

/// Path of the virtual root every root-level tag hangs under.
pub const ROOT_PATH: &str = "/";

/// Ids embedded in a path string, root first.
pub fn path_ids(path: &str) -> Vec<i64> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .filter_map(|segment| segment.parse().ok())
        .collect()
}

/// Depth encoded by a path string: the number of ids it carries.
pub fn depth_of(path: &str) -> i32 {
    path.matches('/').count().saturating_sub(1) as i32
}

/// Path of a new tag with `id` placed under a parent with `parent_path`.
pub fn child_path(parent_path: Option<&str>, id: i64) -> String {
    format!("{}{}/", parent_path.unwrap_or(ROOT_PATH), id)
}

/// Path of a synonym: the main tag's path with its own trailing segment
/// replaced by the synonym id.
pub fn synonym_path(synonym_id: i64, main_tag_path: &str) -> String {
    format!("{}{}/", parent_path(main_tag_path), synonym_id)
}

/// The path without its own trailing segment; `"/"` for root-level tags.
pub fn parent_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => trimmed[..=idx].to_string(),
        None => ROOT_PATH.to_string(),
    }
}

/// Parent id encoded by a path: the second to last id, 0 at root level.
pub fn parent_id_of(path: &str) -> i64 {
    let ids = path_ids(path);
    if ids.len() < 2 {
        0
    } else {
        ids[ids.len() - 2]
    }
}

/// Whether `path` carries `id` as a full segment. `1` never matches `/11/`.
pub fn contains_segment(path: &str, id: i64) -> bool {
    path.contains(&segment(id))
}

/// The `"/<id>/"` needle used for subtree membership.
pub fn segment(id: i64) -> String {
    format!("/{}/", id)
}

/// Whether `path` lies inside the subtree rooted at `ancestor_path`
/// (the ancestor itself included).
pub fn is_within(path: &str, ancestor_path: &str) -> bool {
    path.starts_with(ancestor_path)
}

/// Replace the leading `old_prefix` of `path` with `new_prefix`.
///
/// The substitution is anchored at the start of the string, so a short
/// prefix such as `"/"` only ever rewrites the leading separator. Paths not
/// starting with `old_prefix` are returned unchanged.
pub fn rebase(path: &str, old_prefix: &str, new_prefix: &str) -> String {
    match path.strip_prefix(old_prefix) {
        Some(rest) => format!("{}{}", new_prefix, rest),
        None => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_ids_and_depth_agree() {
        let path = "/1/2/5/";
        assert_eq!(path_ids(path), vec![1, 2, 5]);
        assert_eq!(depth_of(path), 3);
        assert_eq!(depth_of(ROOT_PATH), 0);
        assert!(path_ids(ROOT_PATH).is_empty());
    }

    #[test]
    fn test_child_path() {
        assert_eq!(child_path(None, 7), "/7/");
        assert_eq!(child_path(Some("/1/"), 2), "/1/2/");
        assert_eq!(depth_of(&child_path(Some("/1/2/"), 9)), 3);
    }

    #[test]
    fn test_synonym_path_replaces_own_segment() {
        assert_eq!(synonym_path(3, "/1/2/"), "/1/3/");
        assert_eq!(synonym_path(3, "/2/"), "/3/");
    }

    #[test]
    fn test_parent_path_and_id() {
        assert_eq!(parent_path("/1/2/5/"), "/1/2/");
        assert_eq!(parent_path("/1/"), "/");
        assert_eq!(parent_id_of("/1/2/5/"), 2);
        assert_eq!(parent_id_of("/4/"), 0);
    }

    #[test]
    fn test_contains_segment_is_anchored() {
        assert!(contains_segment("/1/2/", 1));
        assert!(contains_segment("/1/2/", 2));
        assert!(!contains_segment("/11/21/", 1));
        assert!(!contains_segment("/11/21/", 2));
        assert!(!contains_segment("/3/12/", 1));
    }

    #[test]
    fn test_rebase_is_anchored_at_start() {
        assert_eq!(rebase("/1/2/3/", "/1/", "/4/"), "/4/2/3/");
        // Root-level source: the former parent prefix is the bare separator.
        assert_eq!(rebase("/2/3/", "/", "/4/"), "/4/2/3/");
        // Moving to root.
        assert_eq!(rebase("/1/2/3/", "/1/", "/"), "/2/3/");
        // A prefix occurring mid-string is left alone.
        assert_eq!(rebase("/5/1/2/", "/1/", "/4/"), "/5/1/2/");
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("/1/2/3/", "/1/2/"));
        assert!(is_within("/1/2/", "/1/2/"));
        assert!(!is_within("/1/22/", "/1/2/"));
    }
}
