//! HTTP surface tests over a stubbed provider and an in-memory index.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::Engine;
use http_body_util::BodyExt;
use image::{DynamicImage, GrayImage};
use std::io::Cursor;
use std::sync::Arc;
use tower::ServiceExt;
use trombino_core::{
    Embedding, EmbeddingProvider, EnrollmentRecord, FaceAttributes, FaceCapture, ModelInfo,
    ProviderError, VectorIndex,
};
use trombino_store::MemoryIndex;
use trombinod::{build_router, AppState, Config};

const BOUNDARY: &str = "trombino-test-boundary";

/// Provider stub with a fixed embedding and detection confidence.
struct StubProvider {
    confidence: f32,
    embedding: Vec<f32>,
    no_face: bool,
}

impl StubProvider {
    fn with_confidence(confidence: f32) -> Self {
        Self { confidence, embedding: vec![1.0, 0.0, 0.0], no_face: false }
    }

    fn no_face() -> Self {
        Self { confidence: 0.0, embedding: vec![], no_face: true }
    }
}

impl EmbeddingProvider for StubProvider {
    fn embed(&self, _image: &[u8], strict: bool) -> Result<Option<FaceCapture>, ProviderError> {
        if self.no_face {
            return if strict { Err(ProviderError::NoFaceDetected) } else { Ok(None) };
        }
        Ok(Some(FaceCapture {
            embedding: Embedding { values: self.embedding.clone(), model_version: None },
            detection_confidence: self.confidence,
        }))
    }

    fn analyze(&self, _image: &[u8]) -> Result<FaceAttributes, ProviderError> {
        Ok(FaceAttributes {
            age: 31,
            gender: "Woman".into(),
            dominant_emotion: "happy".into(),
            dominant_race: "white".into(),
        })
    }

    fn info(&self) -> ModelInfo {
        ModelInfo { model: "stub-model".into(), detector: "stub-detector".into() }
    }
}

fn app_with(provider: StubProvider, index: Arc<MemoryIndex>) -> Router {
    let mut config = Config::default();
    config.index_backend = "memory".into();
    build_router(Arc::new(AppState::new(config, Arc::new(provider), index)))
}

fn enrolled_index(person: &str, values: Vec<f32>) -> Arc<MemoryIndex> {
    let index = Arc::new(MemoryIndex::new());
    index
        .insert(EnrollmentRecord::new(
            person,
            None,
            Embedding { values, model_version: None },
        ))
        .unwrap();
    index
}

fn png(img: GrayImage) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageLuma8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

/// Sharp, well-lit image accepted by the default quality gate.
fn good_image() -> Vec<u8> {
    png(GrayImage::from_fn(32, 32, |x, y| {
        image::Luma([if (x + y) % 2 == 0 { 40 } else { 160 }])
    }))
}

/// Flat near-black image rejected as TOO_DARK.
fn dark_image() -> Vec<u8> {
    png(GrayImage::from_pixel(32, 32, image::Luma([5])))
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a [u8]),
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File(name, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"img.png\"\r\n\
                         Content-Type: image/png\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn b64_image() -> String {
    base64::engine::general_purpose::STANDARD.encode(b"any bytes, stub ignores them")
}

#[tokio::test]
async fn status_reports_model_identity() {
    let app = app_with(StubProvider::with_confidence(0.99), Arc::new(MemoryIndex::new()));
    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["model"], "stub-model");
    assert_eq!(body["detector"], "stub-detector");
}

#[tokio::test]
async fn identify_base64_low_confidence_short_circuits() {
    // Even with a perfect gallery match available, a shaky detection is
    // rejected before the index is consulted.
    let index = enrolled_index("ada", vec![1.0, 0.0, 0.0]);
    let app = app_with(StubProvider::with_confidence(0.50), index);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/identify-base64",
            serde_json::json!({ "img_base64": b64_image() }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["matched"], false);
    assert_eq!(body["reason"], "LOW_CONFIDENCE");
    assert!(body.get("distance").is_none());
}

#[tokio::test]
async fn identify_base64_empty_index() {
    let app = app_with(StubProvider::with_confidence(0.95), Arc::new(MemoryIndex::new()));

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/identify-base64",
            serde_json::json!({ "img_base64": b64_image() }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["matched"], false);
    assert_eq!(body["reason"], "EMPTY_INDEX");
}

#[tokio::test]
async fn identify_base64_matches_enrolled_person() {
    let index = enrolled_index("ada", vec![1.0, 0.0, 0.0]);
    let app = app_with(StubProvider::with_confidence(0.97), index);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/identify-base64",
            serde_json::json!({ "img_base64": b64_image() }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["matched"], true);
    assert_eq!(body["person"], "ada");
    assert_eq!(body["reason"], "MATCHED");
    assert!(body["distance"].as_f64().unwrap() < 1e-6);
}

#[tokio::test]
async fn identify_base64_distant_neighbor_is_not_a_match() {
    // Orthogonal embedding: cosine distance 1.0, far past the 0.40 ceiling.
    let index = enrolled_index("ada", vec![0.0, 1.0, 0.0]);
    let app = app_with(StubProvider::with_confidence(0.97), index);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/identify-base64",
            serde_json::json!({ "img_base64": b64_image() }),
        ))
        .await
        .unwrap();

    let body = json_body(response).await;
    assert_eq!(body["matched"], false);
    assert_eq!(body["reason"], "BELOW_SIMILARITY_THRESHOLD");
    assert!((body["distance"].as_f64().unwrap() - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn identify_base64_no_face_is_a_decision_not_an_error() {
    let app = app_with(StubProvider::no_face(), Arc::new(MemoryIndex::new()));

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/identify-base64",
            serde_json::json!({ "img_base64": b64_image() }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["matched"], false);
    assert_eq!(body["reason"], "NO_FACE_DETECTED");
}

#[tokio::test]
async fn identify_base64_accepts_data_uri_prefix() {
    let index = enrolled_index("ada", vec![1.0, 0.0, 0.0]);
    let app = app_with(StubProvider::with_confidence(0.97), index);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/identify-base64",
            serde_json::json!({ "img_base64": format!("data:image/jpeg;base64,{}", b64_image()) }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["matched"], true);
    assert_eq!(body["person"], "ada");
}

#[tokio::test]
async fn identify_multipart_empty_index_is_404() {
    let app = app_with(StubProvider::with_confidence(0.95), Arc::new(MemoryIndex::new()));

    let response = app
        .oneshot(multipart_request("/api/identify", &[Part::File("file", &good_image())]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "EMPTY_INDEX");
}

#[tokio::test]
async fn register_then_people() {
    let index = Arc::new(MemoryIndex::new());
    let app = app_with(StubProvider::with_confidence(0.99), index);

    let response = app
        .clone()
        .oneshot(multipart_request(
            "/api/register",
            &[Part::Text("name", "ada"), Part::File("file", &good_image())],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["accepted"], 1);

    let response = app
        .oneshot(Request::builder().uri("/api/people").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["total_records"], 1);
    assert_eq!(body["people"], serde_json::json!(["ada"]));
}

#[tokio::test]
async fn register_multi_reports_partial_failures() {
    let index = Arc::new(MemoryIndex::new());
    let app = app_with(StubProvider::with_confidence(0.99), index.clone());

    let good = good_image();
    let dark = dark_image();
    let response = app
        .oneshot(multipart_request(
            "/api/register-multi",
            &[
                Part::Text("name", "grace"),
                Part::File("files", &good),
                Part::File("files", &dark),
                Part::File("files", &good),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["accepted"], 2);
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["index"], 1);
    assert_eq!(errors[0]["reason"]["kind"], "QUALITY");
    assert_eq!(errors[0]["reason"]["reason"], "TOO_DARK");

    // Accepted images carry their batch position.
    assert_eq!(index.stats().unwrap().total_records, 2);
}

#[tokio::test]
async fn register_multi_total_failure_is_400() {
    let app = app_with(StubProvider::with_confidence(0.99), Arc::new(MemoryIndex::new()));

    let dark = dark_image();
    let response = app
        .oneshot(multipart_request(
            "/api/register-multi",
            &[Part::Text("name", "grace"), Part::File("files", &dark), Part::File("files", &dark)],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "TOTAL_ENROLLMENT_FAILURE");
    assert_eq!(body["error"]["rejections"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn register_without_name_is_400() {
    let app = app_with(StubProvider::with_confidence(0.99), Arc::new(MemoryIndex::new()));

    let response = app
        .oneshot(multipart_request("/api/register", &[Part::File("file", &good_image())]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn verify_same_embedding_is_verified() {
    let app = app_with(StubProvider::with_confidence(0.99), Arc::new(MemoryIndex::new()));

    let img = good_image();
    let response = app
        .oneshot(multipart_request(
            "/api/verify",
            &[Part::File("file1", &img), Part::File("file2", &img)],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["verified"], true);
    assert!(body["distance"].as_f64().unwrap() < 1e-6);
    assert!((body["threshold"].as_f64().unwrap() - 0.40).abs() < 1e-6);
    assert_eq!(body["model"], "stub-model");
    assert_eq!(body["detector_backend"], "stub-detector");
}

#[tokio::test]
async fn verify_without_face_is_400_with_reason() {
    let app = app_with(StubProvider::no_face(), Arc::new(MemoryIndex::new()));

    let img = good_image();
    let response = app
        .oneshot(multipart_request(
            "/api/verify",
            &[Part::File("file1", &img), Part::File("file2", &img)],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "NO_FACE_DETECTED");
}

#[tokio::test]
async fn analyze_base64_returns_attributes() {
    let app = app_with(StubProvider::with_confidence(0.99), Arc::new(MemoryIndex::new()));

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/analyze-base64",
            serde_json::json!({ "img_base64": b64_image() }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["age"], 31);
    assert_eq!(body["gender"], "Woman");
    assert_eq!(body["dominant_emotion"], "happy");
    assert_eq!(body["dominant_race"], "white");
}

#[tokio::test]
async fn remove_person_deletes_records() {
    let index = enrolled_index("ada", vec![1.0, 0.0, 0.0]);
    let app = app_with(StubProvider::with_confidence(0.99), index.clone());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/people/ada")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["deleted"], 1);
    assert_eq!(index.stats().unwrap().total_records, 0);

    let response = app
        .oneshot(Request::builder().uri("/api/records").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body.as_array().unwrap().len(), 0);
}
