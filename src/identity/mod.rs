//! Canonical post identifiers shared by the post store and the vector index.


use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{Result, SearchError};

/// The single join key between a post row and its vector index entry.
///
/// Ids minted by [`IdentifierAuthority`] are hyphenated UUID v4 strings, but any
/// non-empty id handed over by an upstream writer is accepted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    #[inline]
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(SearchError::Validation(
                "Document id must not be empty".to_string(),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the id as a UUID when it was minted as one.
    #[inline]
    pub fn as_uuid(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.0).ok()
    }
}

impl fmt::Display for DocumentId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DocumentId {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DocumentId {
    type Error = SearchError;

    #[inline]
    fn try_from(value: String) -> Result<Self> {
        if value.trim().is_empty() {
            return Err(SearchError::Validation(
                "Document id must not be empty".to_string(),
            ));
        }
        Ok(Self(value))
    }
}

impl From<DocumentId> for String {
    #[inline]
    fn from(id: DocumentId) -> Self {
        id.0
    }
}

/// Mints new canonical ids. Stateless, so callers never coordinate.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentifierAuthority;

impl IdentifierAuthority {
    #[inline]
    pub fn new_id() -> DocumentId {
        DocumentId(Uuid::new_v4().to_string())
    }
}
