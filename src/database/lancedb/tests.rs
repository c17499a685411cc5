use super::*;

fn spec() -> CollectionSpec {
    CollectionSpec {
        name: "posts".to_string(),
        dimension: 3,
        metric: DistanceMetric::Cosine,
    }
}

fn point(id: &str, vector: Vec<f32>, title: Option<&str>) -> IndexPoint {
    IndexPoint::new(
        DocumentId::parse(id).expect("valid id"),
        vector,
        title.map(ToString::to_string),
    )
}

#[test]
fn schema_records_dimension_and_metric() {
    let schema = collection_schema(&spec());
    let (dimension, metric) = schema_shape(&schema).expect("schema has vector column");
    assert_eq!(dimension, 3);
    assert_eq!(metric, Some(DistanceMetric::Cosine));
}

#[test]
fn schema_without_vector_column_conflicts() {
    let schema = Schema::new(vec![Field::new("id", DataType::Utf8, false)]);
    assert!(matches!(
        schema_shape(&schema),
        Err(SearchError::SchemaConflict(_))
    ));
}

#[test]
fn points_become_one_batch() {
    let points = vec![
        point("a", vec![1.0, 0.0, 0.0], Some("First")),
        point("b", vec![0.0, 1.0, 0.0], None),
    ];
    let batch = points_to_batch(&spec(), &points).expect("batch builds");

    assert_eq!(batch.num_rows(), 2);
    let ids = batch_ids(&batch).expect("ids extract");
    assert_eq!(ids[0].as_str(), "a");
    assert_eq!(ids[1].as_str(), "b");

    let titles = string_column(&batch, "title").expect("title column");
    assert!(!titles.is_null(0));
    assert!(titles.is_null(1));
}

#[test]
fn wrong_width_vector_is_rejected_before_building() {
    let points = vec![point("a", vec![1.0, 0.0], None)];
    assert!(matches!(
        points_to_batch(&spec(), &points),
        Err(SearchError::SchemaConflict(_))
    ));
}

fn with_distances(batch: &RecordBatch, distances: Float32Array) -> RecordBatch {
    let mut columns = batch.columns().to_vec();
    columns.push(Arc::new(distances));
    let mut fields: Vec<Field> = batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.as_ref().clone())
        .collect();
    fields.push(Field::new("_distance", DataType::Float32, true));
    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).expect("batch with distance")
}

#[test]
fn hits_use_distance_column() {
    let points = vec![point("a", vec![1.0, 0.0, 0.0], Some("First"))];
    let batch = points_to_batch(&spec(), &points).expect("batch builds");
    let with_distance = with_distances(&batch, Float32Array::from(vec![0.25_f32]));

    let hits = batch_to_hits(&with_distance, DistanceMetric::Cosine).expect("hits parse");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id.as_str(), "a");
    assert!((hits[0].score - 0.75).abs() < 1e-6);
    assert_eq!(hits[0].title.as_deref(), Some("First"));
}

#[test]
fn hits_without_distance_are_rejected() {
    let points = vec![
        point("a", vec![1.0, 0.0, 0.0], Some("First")),
        point("b", vec![0.0, 1.0, 0.0], None),
    ];
    let batch = points_to_batch(&spec(), &points).expect("batch builds");

    assert!(matches!(
        batch_to_hits(&batch, DistanceMetric::Cosine),
        Err(SearchError::Database(_))
    ));

    let partial = with_distances(&batch, Float32Array::from(vec![Some(0.1_f32), None]));
    assert!(matches!(
        batch_to_hits(&partial, DistanceMetric::Cosine),
        Err(SearchError::Database(_))
    ));
}
