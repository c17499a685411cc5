
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::Result;
use crate::identity::DocumentId;
use crate::service::Document;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub description: String,
    pub created_date: NaiveDateTime,
    /// Set after the post's vector was last upserted; `None` means not searchable yet
    pub indexed_date: Option<NaiveDateTime>,
}

impl Post {
    #[inline]
    pub fn document_id(&self) -> Result<DocumentId> {
        DocumentId::parse(&self.id)
    }

    #[inline]
    pub fn is_indexed(&self) -> bool {
        self.indexed_date.is_some()
    }

    /// The fields the indexing service embeds
    #[inline]
    pub fn to_document(&self) -> Result<Document> {
        Ok(Document {
            id: self.document_id()?,
            title: self.title.clone(),
            description: self.description.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPost {
    pub id: DocumentId,
    pub title: String,
    pub description: String,
}
