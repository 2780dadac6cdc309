//! Language registry contract and the language mask codec.
//!
//! A language mask is a bitmask over language ids. Every registered language
//! owns one bit (ids are powers of two starting at 2) and bit `1` is reserved
//! for the "always available" flag.

use serde::{Deserialize, Serialize};

use crate::error::{TagsError, TagsResult};

/// Reserved bit marking a tag as available in every language.
pub const ALWAYS_AVAILABLE_BIT: i64 = 1;

/// A registered language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    /// Single-bit id, never `1`.
    pub id: i64,
    /// Locale code, e.g. `eng-GB`.
    pub code: String,
}

/// Resolves language codes to ids and back.
pub trait LanguageRegistry: Send + Sync {
    /// Id of a language code; unknown codes are a constraint violation.
    fn language_id(&self, code: &str) -> TagsResult<i64>;

    /// Code of a language id.
    fn language_code(&self, id: i64) -> TagsResult<String>;

    /// All registered languages in registration order.
    fn languages(&self) -> Vec<Language>;
}

/// Most languages a mask can carry: bits 1 through 62 of an `i64`.
pub const MAX_LANGUAGES: usize = 62;

/// Registry built from a fixed list of codes.
///
/// The n-th code gets id `2^(n+1)`.
#[derive(Debug, Clone, Default)]
pub struct StaticLanguageRegistry {
    languages: Vec<Language>,
}

impl StaticLanguageRegistry {
    /// Register `codes` in order; duplicates register once. More than
    /// [`MAX_LANGUAGES`] distinct codes is an invalid argument.
    pub fn new<I, S>(codes: I) -> TagsResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut languages: Vec<Language> = Vec::new();
        for code in codes {
            let code = code.into();
            if languages.iter().any(|l| l.code == code) {
                continue;
            }
            if languages.len() == MAX_LANGUAGES {
                return Err(TagsError::invalid_argument(
                    "languages",
                    format!("at most {} languages fit a language mask", MAX_LANGUAGES),
                ));
            }
            let id = 1_i64 << (languages.len() + 1);
            languages.push(Language { id, code });
        }
        Ok(Self { languages })
    }
}

impl LanguageRegistry for StaticLanguageRegistry {
    fn language_id(&self, code: &str) -> TagsResult<i64> {
        self.languages
            .iter()
            .find(|l| l.code == code)
            .map(|l| l.id)
            .ok_or_else(|| {
                TagsError::ConstraintViolation(format!("language '{}' is not registered", code))
            })
    }

    fn language_code(&self, id: i64) -> TagsResult<String> {
        self.languages
            .iter()
            .find(|l| l.id == id)
            .map(|l| l.code.clone())
            .ok_or_else(|| TagsError::not_found("language", id))
    }

    fn languages(&self) -> Vec<Language> {
        self.languages.clone()
    }
}

/// Encoded set of available translations plus the always-available flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LanguageMask(pub i64);

impl LanguageMask {
    /// Encode the languages in `codes` and the always-available flag.
    pub fn generate<'a, I>(
        codes: I,
        always_available: bool,
        registry: &dyn LanguageRegistry,
    ) -> TagsResult<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut mask = 0_i64;
        for code in codes {
            mask |= registry.language_id(code)?;
        }
        if always_available {
            mask |= ALWAYS_AVAILABLE_BIT;
        }
        Ok(Self(mask))
    }

    pub fn value(self) -> i64 {
        self.0
    }

    pub fn is_always_available(self) -> bool {
        self.0 & ALWAYS_AVAILABLE_BIT != 0
    }

    pub fn contains(self, language_id: i64) -> bool {
        language_id != ALWAYS_AVAILABLE_BIT && self.0 & language_id != 0
    }

    /// Language ids set in the mask, lowest bit first.
    pub fn language_ids(self) -> Vec<i64> {
        (1..63)
            .map(|bit| 1_i64 << bit)
            .filter(|id| self.0 & id != 0)
            .collect()
    }

    /// Codes of the languages set in the mask; bits unknown to the registry
    /// are skipped.
    pub fn language_codes(self, registry: &dyn LanguageRegistry) -> Vec<String> {
        self.language_ids()
            .into_iter()
            .filter_map(|id| registry.language_code(id).ok())
            .collect()
    }
}
