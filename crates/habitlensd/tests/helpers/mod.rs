#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use habitlens_core::{
    ActivityError, Detector, DetectorError, Embedder, Embedding, EmbeddingError, FaceBox, FaceCrop,
    JointScorer,
};
use habitlensd::api::{self, AppState};
use habitlensd::config::VerificationConfig;
use habitlensd::engine::{spawn_engine, Models};
use http_body_util::BodyExt;
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::Value;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

/// Finds one face whenever the top-left pixel is bright red, and counts calls.
pub struct RedDetector {
    pub calls: Arc<AtomicUsize>,
}

impl Detector for RedDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<FaceBox>, DetectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if image.get_pixel(0, 0)[0] > 200 {
            Ok(vec![FaceBox { x: 8.0, y: 8.0, width: 16.0, height: 16.0, confidence: 0.97 }])
        } else {
            Ok(vec![])
        }
    }
}

/// Embeds a crop as its centred mean colour.
pub struct ColourEmbedder;

impl Embedder for ColourEmbedder {
    fn embed(&mut self, face: &FaceCrop) -> Result<Embedding, EmbeddingError> {
        let p = face.image().get_pixel(80, 80);
        Ok(Embedding::new(p.0.iter().map(|&c| c as f32 - 128.0).collect()))
    }
}

/// Similarity 0.4 for anything mentioning cycling, 0.1 otherwise.
pub struct KeywordScorer;

impl JointScorer for KeywordScorer {
    fn encode_image(&mut self, _image: &RgbImage) -> Result<Vec<f32>, ActivityError> {
        Ok(vec![1.0, 0.0])
    }

    fn encode_text(&mut self, text: &str) -> Result<Vec<f32>, ActivityError> {
        let sim: f32 = if text.contains("cycling") { 0.4 } else { 0.1 };
        Ok(vec![sim, (1.0 - sim * sim).sqrt()])
    }
}

/// Router backed by stub models. Returns the detector call counter too.
pub fn test_app() -> (Router, Arc<AtomicUsize>) {
    test_app_with_limit(16 * 1024 * 1024)
}

/// `test_app` with a custom request body limit.
pub fn test_app_with_limit(body_limit_bytes: usize) -> (Router, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let models = Models {
        detector: Box::new(RedDetector { calls: calls.clone() }),
        embedder: Box::new(ColourEmbedder),
        scorer: Box::new(KeywordScorer),
    };
    let engine = spawn_engine(models, 0.2).unwrap();
    let state = AppState {
        engine,
        defaults: VerificationConfig::default(),
    };
    (api::router(state, body_limit_bytes), calls)
}

/// Base64 PNG of a solid 32x32 image.
pub fn solid_png_b64(rgb: [u8; 3]) -> String {
    let img = RgbImage::from_pixel(32, 32, Rgb(rgb));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    STANDARD.encode(buf.into_inner())
}

/// A photo the stub detector finds a face in.
pub fn face_photo() -> String {
    solid_png_b64([255, 0, 0])
}

/// A photo the stub detector finds no face in.
pub fn empty_photo() -> String {
    solid_png_b64([20, 20, 20])
}

pub async fn post_json(app: Router, uri: &str, body: String) -> (StatusCode, Value) {
    let req = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    send(app, req).await
}

pub async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}
