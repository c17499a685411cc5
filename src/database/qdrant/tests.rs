use super::*;

fn id(raw: &str) -> DocumentId {
    DocumentId::parse(raw).expect("valid id")
}

#[test]
fn uuid_ids_map_to_themselves() {
    let raw = "6f1c2a8e-3b4d-4e5f-9a0b-1c2d3e4f5a6b";
    assert_eq!(point_id_string(Some(&point_id_for(&id(raw)))).as_deref(), Some(raw));
}

#[test]
fn other_uuid_spellings_get_their_own_points() {
    let lower = "6f1c2a8e-3b4d-4e5f-9a0b-1c2d3e4f5a6b";
    let upper = "6F1C2A8E-3B4D-4E5F-9A0B-1C2D3E4F5A6B";
    let simple = "6f1c2a8e3b4d4e5f9a0b1c2d3e4f5a6b";

    let lower_point = point_id_string(Some(&point_id_for(&id(lower)))).expect("uuid point id");
    let upper_point = point_id_string(Some(&point_id_for(&id(upper)))).expect("uuid point id");
    let simple_point = point_id_string(Some(&point_id_for(&id(simple)))).expect("uuid point id");

    assert_eq!(lower_point, lower);
    assert_ne!(upper_point, lower_point);
    assert_ne!(simple_point, lower_point);
    assert_ne!(upper_point, simple_point);
}

#[test]
fn other_ids_map_to_stable_uuids() {
    let first = point_id_string(Some(&point_id_for(&id("id1")))).expect("uuid point id");
    let again = point_id_string(Some(&point_id_for(&id("id1")))).expect("uuid point id");
    let other = point_id_string(Some(&point_id_for(&id("id2")))).expect("uuid point id");

    assert_eq!(first, again);
    assert_ne!(first, other);
    assert!(Uuid::parse_str(&first).is_ok());
}

#[test]
fn payload_carries_canonical_id_and_title() {
    let point = IndexPoint::new(id("id1"), vec![0.0; 3], Some("Cache".to_string()));
    let payload = payload_for(&point);

    assert_eq!(payload_string(&payload, "id").as_deref(), Some("id1"));
    assert_eq!(payload_string(&payload, "title").as_deref(), Some("Cache"));

    let untitled = IndexPoint::new(id("id2"), vec![0.0; 3], None);
    assert!(!payload_for(&untitled).contains_key("title"));
}

#[test]
fn payload_id_wins_over_point_id() {
    let point = IndexPoint::new(id("id1"), vec![0.0; 3], None);
    let payload = payload_for(&point);
    let point_id = point_id_for(&point.id);

    let recovered = document_id_of(&payload, Some(&point_id)).expect("id recovered");
    assert_eq!(recovered.as_str(), "id1");

    let fallback = document_id_of(&HashMap::new(), Some(&point_id)).expect("id recovered");
    assert!(Uuid::parse_str(fallback.as_str()).is_ok());

    assert!(document_id_of(&HashMap::new(), None).is_err());
}

#[test]
fn euclidean_scores_are_flipped() {
    assert!(
        normalize_score(DistanceMetric::Euclidean, 0.1)
            > normalize_score(DistanceMetric::Euclidean, 2.0)
    );
    assert!((normalize_score(DistanceMetric::Cosine, 0.8) - 0.8).abs() < f32::EPSILON);
}

#[test]
fn distances_round_trip() {
    for metric in [
        DistanceMetric::Cosine,
        DistanceMetric::Euclidean,
        DistanceMetric::Dot,
    ] {
        assert_eq!(from_qdrant_distance(to_qdrant_distance(metric)), Some(metric));
    }
    assert_eq!(from_qdrant_distance(Distance::Manhattan), None);
}

fn status_error(status: tonic::Status) -> QdrantError {
    QdrantError::ResponseError { status }
}

#[test]
fn transient_failures_are_retryable() {
    for status in [
        tonic::Status::unavailable("connection refused"),
        tonic::Status::deadline_exceeded("slow"),
        tonic::Status::internal("panic in segment"),
    ] {
        let error = classify("Failed to upsert points", status_error(status));
        assert!(
            matches!(error, SearchError::DependencyUnavailable(_)),
            "unexpected error: {error}"
        );
        assert!(error.is_retryable());
    }

    let io = QdrantError::Io(std::io::Error::other("reset by peer"));
    assert!(classify("Failed to count points", io).is_retryable());
}

#[test]
fn rejected_requests_are_not_retryable() {
    let auth = classify(
        "Failed to check collection",
        status_error(tonic::Status::unauthenticated("bad api key")),
    );
    assert!(matches!(auth, SearchError::Config(_)), "unexpected error: {auth}");
    assert!(!auth.is_retryable());

    let denied = classify(
        "Failed to check collection",
        status_error(tonic::Status::permission_denied("read only key")),
    );
    assert!(matches!(denied, SearchError::Config(_)));

    let invalid = classify(
        "Failed to upsert points",
        status_error(tonic::Status::invalid_argument("wrong vector size")),
    );
    assert!(matches!(invalid, SearchError::Database(_)));
    assert!(!invalid.is_retryable());

    let message = invalid.to_string();
    assert!(message.contains("Failed to upsert points"));
    assert!(message.contains("wrong vector size"));
}

#[test]
fn only_already_exists_counts_as_lost_create_race() {
    let exists = status_error(tonic::Status::already_exists("collection exists"));
    let down = status_error(tonic::Status::unavailable("down"));
    let conversion = QdrantError::ConversionError("sparse".to_string());

    assert!(is_already_exists(&exists));
    assert!(!is_already_exists(&down));
    assert!(!is_already_exists(&conversion));
}

#[test]
fn settings_require_endpoint() {
    let mut config = Config::default();
    assert!(QdrantSettings::from_config(&config).is_err());

    config.index.endpoint = Some("http://localhost:6334".to_string());
    config.index.api_key = Some("key".to_string());
    let settings = QdrantSettings::from_config(&config).expect("settings built");
    assert_eq!(settings.url, "http://localhost:6334");
    assert_eq!(settings.api_key.as_deref(), Some("key"));
    assert_eq!(settings.timeout, Duration::from_secs(60));
}

#[tokio::test]
async fn client_builds_without_network() {
    let settings = QdrantSettings {
        url: "http://localhost:6334".to_string(),
        api_key: None,
        timeout: Duration::from_secs(5),
    };
    let index = QdrantIndex::connect(&settings).expect("client builds lazily");
    assert_eq!(index.backend_name(), "qdrant");
}
