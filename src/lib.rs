use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Schema conflict: {0}")]
    SchemaConflict(String),

    #[error("Post {id} was not indexed: {cause}")]
    NotIndexed {
        id: String,
        #[source]
        cause: Box<SearchError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl SearchError {
    /// Whether repeating the same call may succeed without any change on the caller's side.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::DependencyUnavailable(_) => true,
            Self::NotIndexed { cause, .. } => {
                !matches!(**cause, Self::SchemaConflict(_) | Self::Validation(_))
            }
            _ => false,
        }
    }
}

impl From<config::ConfigError> for SearchError {
    #[inline]
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod identity;
pub mod indexer;
pub mod service;
