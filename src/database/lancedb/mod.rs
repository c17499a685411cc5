// LanceDB vector database module
// Arrow row layout for post vectors and the embedded store built on it

#[cfg(test)]
mod tests;

pub mod vector_store;

pub use vector_store::VectorStore;

use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use std::collections::HashMap;
use std::sync::Arc;

use super::index::{CollectionSpec, DistanceMetric, IndexPoint, ScoredPoint};
use crate::identity::DocumentId;
use crate::{Result, SearchError};

/// Schema metadata key recording the metric a table was created for
pub const METRIC_METADATA_KEY: &str = "distance_metric";

/// Arrow schema of a post vector table: `id`, `vector`, nullable `title`
#[inline]
pub fn collection_schema(spec: &CollectionSpec) -> SchemaRef {
    let metadata = HashMap::from([(
        METRIC_METADATA_KEY.to_string(),
        spec.metric.as_str().to_string(),
    )]);

    Arc::new(Schema::new_with_metadata(
        vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    spec.dimension as i32,
                ),
                false,
            ),
            Field::new("title", DataType::Utf8, true),
        ],
        metadata,
    ))
}

/// Reads the vector width and recorded metric back out of a table schema.
#[inline]
pub fn schema_shape(schema: &Schema) -> Result<(usize, Option<DistanceMetric>)> {
    let dimension = schema
        .fields()
        .iter()
        .find(|field| field.name() == "vector")
        .and_then(|field| match field.data_type() {
            DataType::FixedSizeList(_, size) => Some(*size as usize),
            _ => None,
        })
        .ok_or_else(|| {
            SearchError::SchemaConflict(
                "Existing table has no fixed-size vector column".to_string(),
            )
        })?;

    let metric = schema
        .metadata()
        .get(METRIC_METADATA_KEY)
        .and_then(|m| m.parse().ok());

    Ok((dimension, metric))
}

/// Builds one record batch from points. Every vector must match the collection dimension.
#[inline]
pub fn points_to_batch(spec: &CollectionSpec, points: &[IndexPoint]) -> Result<RecordBatch> {
    let mut flat_values = Vec::with_capacity(points.len() * spec.dimension);
    for point in points {
        spec.check_vector(&point.vector)?;
        flat_values.extend_from_slice(&point.vector);
    }

    let ids: Vec<&str> = points.iter().map(|p| p.id.as_str()).collect();
    let titles: Vec<Option<&str>> = points
        .iter()
        .map(|p| p.payload.title.as_deref())
        .collect();

    let field = Arc::new(Field::new("item", DataType::Float32, true));
    let vector_array = FixedSizeListArray::try_new(
        field,
        spec.dimension as i32,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| SearchError::Database(format!("Failed to create vector array: {e}")))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(titles)),
    ];

    RecordBatch::try_new(collection_schema(spec), arrays)
        .map_err(|e| SearchError::Database(format!("Failed to create record batch: {e}")))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| SearchError::Database(format!("Missing {name} column")))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| SearchError::Database(format!("Invalid {name} column type")))
}

/// Extracts the `id` column of a batch.
#[inline]
pub fn batch_ids(batch: &RecordBatch) -> Result<Vec<DocumentId>> {
    let ids = string_column(batch, "id")?;
    (0..batch.num_rows())
        .map(|row| DocumentId::parse(ids.value(row)))
        .collect()
}

/// Converts a search result batch into scored hits, keeping row order.
#[inline]
pub fn batch_to_hits(batch: &RecordBatch, metric: DistanceMetric) -> Result<Vec<ScoredPoint>> {
    let ids = string_column(batch, "id")?;
    let titles = string_column(batch, "title")?;

    let distances = batch
        .column_by_name("_distance")
        .ok_or_else(|| SearchError::Database("Missing _distance column".to_string()))?
        .as_any()
        .downcast_ref::<Float32Array>()
        .ok_or_else(|| SearchError::Database("Invalid _distance column type".to_string()))?;

    (0..batch.num_rows())
        .map(|row| {
            if distances.is_null(row) {
                return Err(SearchError::Database(format!(
                    "Search hit {} has no distance",
                    ids.value(row)
                )));
            }
            let distance = distances.value(row);

            Ok(ScoredPoint {
                id: DocumentId::parse(ids.value(row))?,
                score: metric.score_from_distance(distance),
                title: (!titles.is_null(row)).then(|| titles.value(row).to_string()),
            })
        })
        .collect()
}
