//! Paging and translation filters shared by the read operations.

use serde::{Deserialize, Serialize};

use crate::error::{TagsError, TagsResult};
use crate::language::{LanguageMask, LanguageRegistry};

/// Offset/limit window. A limit of `-1` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: i64,
}

impl Page {
    pub const ALL: Page = Page {
        offset: 0,
        limit: -1,
    };

    pub fn new(offset: usize, limit: i64) -> TagsResult<Self> {
        if limit < -1 {
            return Err(TagsError::invalid_argument(
                "limit",
                format!("must be -1 or greater, got {}", limit),
            ));
        }
        Ok(Self { offset, limit })
    }

    /// Maximum number of items in the window, `None` when unbounded.
    pub fn max_items(&self) -> Option<usize> {
        if self.limit < 0 {
            None
        } else {
            Some(self.limit as usize)
        }
    }

    /// Apply the window to an owned list.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.offset);
        match self.max_items() {
            Some(max) => iter.take(max).collect(),
            None => iter.collect(),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::ALL
    }
}

/// Which translations a read should consider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Translations {
    /// Requested locale codes in priority order; `None` means all.
    pub languages: Option<Vec<String>>,
    /// Show tags marked always-available even without a requested translation.
    pub use_always_available: bool,
}

impl Translations {
    pub fn all() -> Self {
        Self {
            languages: None,
            use_always_available: true,
        }
    }

    pub fn only<I, S>(languages: I, use_always_available: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            languages: Some(languages.into_iter().map(Into::into).collect()),
            use_always_available,
        }
    }

    /// Requested codes, empty when all translations are requested.
    pub fn requested(&self) -> &[String] {
        self.languages.as_deref().unwrap_or(&[])
    }

    /// Cache key fragment: `0` for all translations, else codes joined by `|`.
    pub fn cache_key(&self) -> String {
        let requested = self.requested();
        let languages = if requested.is_empty() {
            "0".to_string()
        } else {
            requested.join("|")
        };
        let always_available = if self.use_always_available { "1" } else { "0" };
        format!("{}-{}", languages, always_available)
    }

    /// Whether a tag with `mask` is visible under this filter. Codes unknown
    /// to the registry cannot be present in any mask and are ignored.
    pub fn is_visible(&self, mask: LanguageMask, registry: &dyn LanguageRegistry) -> bool {
        let requested = self.requested();
        if requested.is_empty() {
            return true;
        }
        let has_requested = requested
            .iter()
            .filter_map(|code| registry.language_id(code).ok())
            .any(|id| mask.contains(id));

        has_requested || (self.use_always_available && mask.is_always_available())
    }
}

impl Default for Translations {
    fn default() -> Self {
        Self::all()
    }
}
