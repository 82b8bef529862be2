#![cfg(feature = "serve")]
//! Router tests for the detection service, driven through `oneshot` with a
//! fixed detector so no model file is needed.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use image::{ImageFormat, Rgb, RgbImage};
use obbkit::geom::{BBoxXYXY, Pixel};
use obbkit::serve::{router, AppState, Detection, Detector};
use obbkit::ObbkitError;
use tower::ServiceExt;

mod common;
use common::write_text;

const BOUNDARY: &str = "obbkit-test-boundary";
const MODEL_PATH: &str = "weights/best.onnx";
const BODY_LIMIT: usize = 1024 * 1024;

struct FixedDetector(Vec<Detection>);

impl Detector for FixedDetector {
    fn detect(&self, _image: &RgbImage) -> Result<Vec<Detection>, ObbkitError> {
        Ok(self.0.clone())
    }
}

fn app(static_dir: Option<PathBuf>) -> Router {
    let detections = vec![
        Detection {
            bbox: BBoxXYXY::<Pixel>::from_xyxy(2.0, 2.0, 12.0, 10.0),
            score: 0.9,
            class_id: 0,
        },
        Detection {
            bbox: BBoxXYXY::<Pixel>::from_xyxy(5.0, 5.0, 15.0, 15.0),
            score: 0.6,
            class_id: 1,
        },
    ];
    let state = AppState::new(Arc::new(FixedDetector(detections)), MODEL_PATH, static_dir);
    router(state, BODY_LIMIT)
}

fn png_bytes() -> Vec<u8> {
    let image = RgbImage::from_pixel(20, 16, Rgb([30, 60, 90]));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode png");
    bytes
}

fn multipart_request(field: &str, contents: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"upload.png\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/predict")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("build request")
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("build request")
}

#[tokio::test]
async fn health_reports_model_path() {
    let response = app(None).oneshot(get("/health")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["model_path"], MODEL_PATH);
}

#[tokio::test]
async fn root_without_static_page_returns_hint() {
    let response = app(None).oneshot(get("/")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["message"], "Send an image via POST /predict");
}

#[tokio::test]
async fn root_and_static_serve_the_static_dir() {
    let temp = tempfile::tempdir().expect("create temp dir");
    write_text(&temp.path().join("index.html"), "<h1>detector</h1>");
    write_text(&temp.path().join("app.js"), "console.log('hi');");

    let response = app(Some(temp.path().to_path_buf()))
        .oneshot(get("/"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().expect("ascii");
    assert!(content_type.starts_with("text/html"));
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    assert_eq!(&body[..], b"<h1>detector</h1>");

    let response = app(Some(temp.path().to_path_buf()))
        .oneshot(get("/static/app.js"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn predict_returns_annotated_jpeg() {
    let response = app(None)
        .oneshot(multipart_request("file", &png_bytes()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert_eq!(headers[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(headers["x-detections"], "2");
    assert_eq!(headers["x-model-path"], MODEL_PATH);
    let elapsed: f64 = headers["x-inference-time"]
        .to_str()
        .expect("ascii")
        .parse()
        .expect("seconds");
    assert!(elapsed >= 0.0);

    let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    assert_eq!(&body[..2], &[0xFF, 0xD8]);
    let decoded = image::load_from_memory(&body).expect("decode jpeg");
    assert_eq!((decoded.width(), decoded.height()), (20, 16));
}

#[tokio::test]
async fn predict_rejects_undecodable_upload() {
    let response = app(None)
        .oneshot(multipart_request("file", b"this is not an image"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["detail"], "Could not open the image.");
}

#[tokio::test]
async fn predict_rejects_empty_or_missing_file() {
    let response = app(None)
        .oneshot(multipart_request("file", b""))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["detail"], "No file was uploaded.");

    let response = app(None)
        .oneshot(multipart_request("other", &png_bytes()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["detail"], "No file was uploaded.");
}
