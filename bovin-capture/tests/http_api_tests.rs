//! Integration tests for the bovin-capture HTTP API
//!
//! Runs requests through the router with the mock backend.

mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

use bovin_capture::capture::{
    CameraFeed, CaptureSettings, FeedRegistry, SourceSelector, StillFrameFeed,
};
use bovin_capture::config::BackendMode;
use bovin_capture::models::{CameraInfo, CameraStatus};
use bovin_capture::services::{Collaborators, InMemoryRecordStore, MockCollaborator};
use bovin_capture::workflow::{WorkflowServices, WorkflowSettings};
use bovin_capture::{build_router, AppState};
use bovin_common::events::{CameraRole, EventBus};

use common::jpeg_bytes;

const BOUNDARY: &str = "bovin-test-boundary";

fn test_app_with(selector: SourceSelector) -> (Router, AppState) {
    let services = Arc::new(WorkflowServices::new(
        Collaborators::mock(MockCollaborator::new(), InMemoryRecordStore::new()),
        selector,
        WorkflowSettings::default(),
        EventBus::new(64),
    ));
    let state = AppState::new(services, BackendMode::Mock);
    (build_router(state.clone()), state)
}

fn test_app() -> (Router, AppState) {
    test_app_with(SourceSelector::upload_only(CaptureSettings::default()))
}

fn camera_app() -> (Router, AppState) {
    let cameras = vec![
        CameraInfo {
            id: "couloir".to_string(),
            name: "Couloir".to_string(),
            role: CameraRole::Identification,
            status: CameraStatus::Online,
            snapshot_url: None,
        },
        CameraInfo {
            id: "bascule".to_string(),
            name: "Bascule".to_string(),
            role: CameraRole::Morphology,
            status: CameraStatus::Offline,
            snapshot_url: None,
        },
    ];
    let mut feeds = FeedRegistry::new();
    feeds.insert(
        "couloir",
        Arc::new(CameraFeed::new(Arc::new(StillFrameFeed::test_pattern(16, 16)))),
    );
    test_app_with(SourceSelector::new(cameras, feeds, CaptureSettings::default()))
}

fn multipart_body(field: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn upload_request(uri: &str, bytes: &[u8]) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body("image", "vache.jpg", "image/jpeg", bytes)))
        .unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn open(app: &Router) -> String {
    let (status, body) = send(app, post("/workflows")).await;
    assert_eq!(status, StatusCode::CREATED);
    body["workflow_id"].as_str().unwrap().to_string()
}

/// Registry removal happens on a spawned task after submit or cancel
async fn wait_until_released(state: &AppState) {
    for _ in 0..100 {
        if state.workflows.read().await.is_empty() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("workflow was not released");
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _state) = test_app();

    let (status, body) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "bovin-capture");
    assert_eq!(body["backend"], "mock");
    assert_eq!(body["open_workflows"], 0);
}

#[tokio::test]
async fn test_open_workflow_starts_at_identification() {
    let (app, state) = test_app();

    let (status, body) = send(&app, post("/workflows")).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "active");
    assert_eq!(body["step"], "identification");
    assert_eq!(body["can_advance"], false);
    assert_eq!(body["can_go_back"], false);
    assert_eq!(body["preferred_source"], "upload");
    assert_eq!(state.workflows.read().await.len(), 1);
}

#[tokio::test]
async fn test_open_with_unknown_camera_is_rejected() {
    let (app, state) = camera_app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/workflows")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"camera_ids": ["grange"]}).to_string()))
        .unwrap();

    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert!(state.workflows.read().await.is_empty());
}

#[tokio::test]
async fn test_open_with_camera_filter() {
    let (app, _state) = camera_app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/workflows")
        .body(Body::from(json!({"camera_ids": ["bascule"]}).to_string()))
        .unwrap();

    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::CREATED);
    // The online identification camera was filtered out
    assert_eq!(body["preferred_source"], "upload");
}

#[tokio::test]
async fn test_list_cameras_by_role() {
    let (app, _state) = camera_app();

    let (status, body) = send(&app, get("/cameras?role=morphology")).await;

    assert_eq!(status, StatusCode::OK);
    let cameras = body["cameras"].as_array().unwrap();
    assert_eq!(cameras.len(), 1);
    assert_eq!(cameras[0]["id"], "bascule");
    assert_eq!(cameras[0]["status"], "offline");

    let (_, all) = send(&app, get("/cameras")).await;
    assert_eq!(all["cameras"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unknown_workflow_is_not_found() {
    let (app, _state) = test_app();
    let uri = format!("/workflows/{}", uuid::Uuid::new_v4());

    let (status, body) = send(&app, get(&uri)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_next_without_image_is_conflict() {
    let (app, _state) = test_app();
    let id = open(&app).await;

    let (status, body) = send(&app, post(&format!("/workflows/{}/next", id))).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "GATE_CLOSED");

    let (_, snapshot) = send(&app, get(&format!("/workflows/{}", id))).await;
    assert_eq!(snapshot["step"], "identification");
}

#[tokio::test]
async fn test_upload_rejects_unsupported_content() {
    let (app, _state) = test_app();
    let id = open(&app).await;

    let (status, body) = send(
        &app,
        upload_request(&format!("/workflows/{}/capture/upload", id), b"GIF89a-not-allowed"),
    )
    .await;

    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["error"]["code"], "INVALID_FORMAT");

    let (_, snapshot) = send(&app, get(&format!("/workflows/{}", id))).await;
    assert_eq!(snapshot["last_error"]["code"], "INVALID_FORMAT");
}

#[tokio::test]
async fn test_oversized_upload_is_attached_to_step() {
    let (app, state) = test_app();
    let id = open(&app).await;

    let (status, body) = send(
        &app,
        upload_request(
            &format!("/workflows/{}/capture/upload", id),
            &jpeg_bytes(12 * 1024 * 1024, 5),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"]["code"], "TOO_LARGE");
    assert!(body["error"]["message"].as_str().unwrap().contains("10 MB"));

    let (_, snapshot) = send(&app, get(&format!("/workflows/{}", id))).await;
    assert_eq!(snapshot["step"], "identification");
    assert_eq!(snapshot["last_error"]["code"], "TOO_LARGE");
    assert_eq!(snapshot["last_error"]["step"], "identification");
    assert_eq!(snapshot["last_error"]["retryable"], false);
    assert!(snapshot["captures"]["identification"].is_null());
    assert!(state.last_error.read().await.is_some());

    // A file within the limit is accepted afterwards and clears the error
    let (status, body) = send(
        &app,
        upload_request(&format!("/workflows/{}/capture/upload", id), &jpeg_bytes(2048, 6)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["workflow"]["last_error"].is_null());
}

#[tokio::test]
async fn test_oversized_attachment_on_auto_capture_is_attached_to_step() {
    let (app, _state) = test_app();
    let id = open(&app).await;

    let (status, body) = send(
        &app,
        upload_request(
            &format!("/workflows/{}/capture", id),
            &jpeg_bytes(12 * 1024 * 1024, 7),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"]["code"], "TOO_LARGE");
    let (_, snapshot) = send(&app, get(&format!("/workflows/{}", id))).await;
    assert_eq!(snapshot["last_error"]["code"], "TOO_LARGE");
}

#[tokio::test]
async fn test_upload_without_image_part_is_bad_request() {
    let (app, _state) = test_app();
    let id = open(&app).await;
    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/workflows/{}/capture/upload", id))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(
            "photo",
            "vache.jpg",
            "image/jpeg",
            &jpeg_bytes(64, 1),
        )))
        .unwrap();

    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_capture_without_camera_or_file_is_unavailable() {
    let (app, _state) = test_app();
    let id = open(&app).await;

    let (status, body) = send(&app, post(&format!("/workflows/{}/capture", id))).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "SOURCE_UNAVAILABLE");
}

#[tokio::test]
async fn test_capture_uses_online_camera() {
    let (app, _state) = camera_app();
    let id = open(&app).await;

    let (status, body) = send(&app, post(&format!("/workflows/{}/capture", id))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["report"]["source"], "camera");
    assert_eq!(body["report"]["mime_type"], "image/jpeg");
    assert_eq!(body["workflow"]["can_advance"], true);
}

#[tokio::test]
async fn test_submit_before_results_is_conflict() {
    let (app, _state) = test_app();
    let id = open(&app).await;

    let (status, body) = send(&app, post(&format!("/workflows/{}/submit", id))).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn test_full_capture_flow() {
    let (app, state) = test_app();
    let id = open(&app).await;
    let base = format!("/workflows/{}", id);

    let (status, body) = send(
        &app,
        upload_request(&format!("{}/capture/upload", base), &jpeg_bytes(2048, 1)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["report"]["source"], "upload");

    let (status, body) = send(&app, post(&format!("{}/next", base))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transition"]["new_step"], "morphology");
    let cow_id = body["workflow"]["identification"]["animal_id"].clone();
    assert!(cow_id.as_str().unwrap().starts_with("FR"));

    send(
        &app,
        upload_request(&format!("{}/capture/upload", base), &jpeg_bytes(2048, 2)),
    )
    .await;
    let (status, body) = send(&app, post(&format!("{}/next", base))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["workflow"]["step"], "results");
    assert_eq!(body["workflow"]["can_submit"], true);

    let (status, body) = send(&app, post(&format!("{}/submit", base))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["record"]["cow_id"], cow_id);
    assert_eq!(body["record"]["source_detection"], "automatique");
    assert_eq!(body["record"]["hauteur_au_garrot"]["valeur"], 124.5);
    assert_eq!(body["record"]["largeur_du_corps"]["valeur"], 57.2);
    assert_eq!(body["record"]["longueur_du_corps"]["valeur"], 142.0);

    wait_until_released(&state).await;
    let (status, _) = send(&app, get(&base)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_back_keeps_capture_over_http() {
    let (app, _state) = test_app();
    let id = open(&app).await;
    let base = format!("/workflows/{}", id);
    send(
        &app,
        upload_request(&format!("{}/capture/upload", base), &jpeg_bytes(1024, 1)),
    )
    .await;
    send(&app, post(&format!("{}/next", base))).await;

    let (status, body) = send(&app, post(&format!("{}/back", base))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transition"]["new_step"], "identification");
    assert_eq!(body["workflow"]["captures"]["identification"]["source"], "upload");
    assert_eq!(body["workflow"]["can_advance"], true);
}

#[tokio::test]
async fn test_cancel_releases_workflow() {
    let (app, state) = test_app();
    let id = open(&app).await;

    let (status, body) = send(&app, post(&format!("/workflows/{}/cancel", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["workflow_id"], id.as_str());

    wait_until_released(&state).await;
    let (status, _) = send(&app, post(&format!("/workflows/{}/next", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_reports_last_collaborator_error() {
    let (app, _state) = test_app();
    let id = open(&app).await;
    send(
        &app,
        upload_request(&format!("/workflows/{}/capture/upload", id), b"not an image"),
    )
    .await;

    let (_, body) = send(&app, get("/health")).await;
    assert!(body["last_error"].as_str().is_some());
}
