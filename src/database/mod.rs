// Database module
// SQLite holds the posts, the vector index holds their embeddings

pub mod index;
pub mod lancedb;
pub mod qdrant;
pub mod sqlite;

pub use index::{
    CollectionSpec, DistanceMetric, IndexPoint, PointPayload, ScoredPoint, VectorIndex,
};
pub use sqlite::*;
