//! HTTP routes: request validation, image decoding, and the JSON envelope.
//!
//! Handlers validate and decode before anything reaches the engine, so a
//! malformed request never touches a model.

use crate::config::VerificationConfig;
use crate::engine::{DetectOutcome, EngineHandle, FaceVerifyOutcome};
use crate::error::ApiError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{Method, Uri};
use axum::routing::{get, post};
use axum::{Json, Router};
use habitlens_core::{decode_base64_image, ConfidenceBucket};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub defaults: VerificationConfig,
}

/// Build the router with all endpoints.
pub fn router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/detect-face", post(detect_face))
        .route("/verify-face", post(verify_face))
        .route("/verify-activity", post(verify_activity))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct DetectFaceRequest {
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyFaceRequest {
    pub profile_photo: Option<String>,
    pub habit_photo: Option<String>,
    pub threshold: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyActivityRequest {
    pub image: Option<String>,
    pub activity: Option<String>,
    pub threshold: Option<f32>,
}

#[derive(Debug, Serialize)]
struct DetectFaceResponse {
    success: bool,
    face_detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    /// Detector's reason when no face was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct PhotoConfidence {
    profile_photo: f32,
    habit_photo: f32,
}

#[derive(Debug, Serialize)]
struct VerifyFaceResponse {
    success: bool,
    verified: bool,
    similarity_score: f32,
    confidence: PhotoConfidence,
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct VerifyActivityResponse {
    success: bool,
    verified: bool,
    similarity_score: f32,
    confidence: ConfidenceBucket,
    threshold: f32,
    message: &'static str,
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "message": "Face verification API is running",
    }))
}

/// Not finding a face is a 200 with `success: false`, unlike verify-face.
async fn detect_face(
    State(state): State<AppState>,
    payload: Result<Json<DetectFaceRequest>, JsonRejection>,
) -> Result<Json<DetectFaceResponse>, ApiError> {
    let Json(req) = payload.map_err(invalid_body)?;
    let [image] = require([("image", req.image)])?;

    let image = decode_field("image", image).await?;

    let response = match state.engine.detect(image).await? {
        DetectOutcome::Detected { confidence } => {
            tracing::info!(confidence, "detect-face: face found");
            DetectFaceResponse {
                success: true,
                face_detected: true,
                confidence: Some(confidence),
                message: Some("Face detected successfully"),
                error: None,
            }
        }
        DetectOutcome::NoFace { reason } => {
            tracing::info!(%reason, "detect-face: no face");
            DetectFaceResponse {
                success: false,
                face_detected: false,
                confidence: None,
                message: None,
                error: Some(reason),
            }
        }
    };

    Ok(Json(response))
}

async fn verify_face(
    State(state): State<AppState>,
    payload: Result<Json<VerifyFaceRequest>, JsonRejection>,
) -> Result<Json<VerifyFaceResponse>, ApiError> {
    let Json(req) = payload.map_err(invalid_body)?;
    let [profile, habit] = require([("profile_photo", req.profile_photo), ("habit_photo", req.habit_photo)])?;
    let threshold = req.threshold.unwrap_or(state.defaults.face_threshold);

    let profile = decode_field("profile_photo", profile).await?;
    let habit = decode_field("habit_photo", habit).await?;

    match state.engine.verify_faces(profile, habit, threshold).await? {
        FaceVerifyOutcome::Compared {
            result,
            profile_confidence,
            habit_confidence,
        } => {
            tracing::info!(
                verified = result.is_match,
                similarity = result.similarity_score,
                threshold,
                "verify-face"
            );
            Ok(Json(VerifyFaceResponse {
                success: true,
                verified: result.is_match,
                similarity_score: result.similarity_score,
                confidence: PhotoConfidence {
                    profile_photo: profile_confidence,
                    habit_photo: habit_confidence,
                },
                message: if result.is_match {
                    "Face verified successfully!"
                } else {
                    "Face verification failed - photos do not match"
                },
            }))
        }
        FaceVerifyOutcome::NoFace { photo, reason } => Err(ApiError::NoFace { photo, reason }),
    }
}

async fn verify_activity(
    State(state): State<AppState>,
    payload: Result<Json<VerifyActivityRequest>, JsonRejection>,
) -> Result<Json<VerifyActivityResponse>, ApiError> {
    let Json(req) = payload.map_err(invalid_body)?;
    let [image, activity] = require([("image", req.image), ("activity", req.activity)])?;
    let threshold = req.threshold.unwrap_or(state.defaults.activity_threshold);

    let image = decode_field("image", image).await?;

    let verdict = state.engine.verify_activity(image, activity, threshold).await?;
    tracing::info!(
        verified = verdict.verified,
        similarity = verdict.similarity_score,
        confidence = verdict.confidence.as_str(),
        threshold,
        "verify-activity"
    );

    Ok(Json(VerifyActivityResponse {
        success: true,
        verified: verdict.verified,
        similarity_score: verdict.similarity_score,
        confidence: verdict.confidence,
        threshold: verdict.threshold,
        message: if verdict.verified {
            "Activity verified"
        } else {
            "Activity not verified"
        },
    }))
}

/// Unwrap required fields, naming every missing one in the error.
fn require<const N: usize>(fields: [(&'static str, Option<String>); N]) -> Result<[String; N], ApiError> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| *name)
        .collect();

    if !missing.is_empty() {
        return Err(ApiError::Validation(format!(
            "Missing {} in request",
            missing.join(" and ")
        )));
    }

    Ok(fields.map(|(_, value)| value.unwrap_or_default()))
}

/// Decode a base64 image field on the blocking pool.
async fn decode_field(field: &'static str, payload: String) -> Result<RgbImage, ApiError> {
    tokio::task::spawn_blocking(move || decode_base64_image(&payload))
        .await?
        .map_err(|source| ApiError::Decode { field, source })
}

fn invalid_body(rejection: JsonRejection) -> ApiError {
    ApiError::Body {
        status: rejection.status(),
        message: rejection.body_text(),
    }
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(uri.path().to_string())
}

async fn method_not_allowed(method: Method, uri: Uri) -> ApiError {
    ApiError::MethodNotAllowed {
        method: method.to_string(),
        path: uri.path().to_string(),
    }
}
