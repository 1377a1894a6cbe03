mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use helpers::{empty_photo, face_photo, post_json, send, solid_png_b64, test_app, test_app_with_limit};
use serde_json::json;
use std::sync::atomic::Ordering;

#[tokio::test]
async fn health_reports_healthy() {
    let (app, _) = test_app();
    let (status, body) = send(app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["message"], "Face verification API is running");
}

#[tokio::test]
async fn detect_face_finds_face() {
    let (app, _) = test_app();
    let (status, body) = post_json(app, "/detect-face", json!({ "image": face_photo() }).to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["face_detected"], true);
    assert!((body["confidence"].as_f64().unwrap() - 0.97).abs() < 1e-6);
    assert_eq!(body["message"], "Face detected successfully");
}

#[tokio::test]
async fn detect_face_without_face_is_not_an_http_error() {
    let (app, _) = test_app();
    let (status, body) = post_json(app, "/detect-face", json!({ "image": empty_photo() }).to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["face_detected"], false);
    assert_eq!(body["error"], "No face detected in image");
    assert!(body.get("confidence").is_none());
}

#[tokio::test]
async fn detect_face_requires_image() {
    let (app, calls) = test_app();
    let (status, body) = post_json(app, "/detect-face", "{}".into()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Missing image in request");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn verify_face_same_person_matches() {
    let (app, _) = test_app();
    let req = json!({ "profile_photo": face_photo(), "habit_photo": face_photo() });
    let (status, body) = post_json(app, "/verify-face", req.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["verified"], true);
    assert!((body["similarity_score"].as_f64().unwrap() - 1.0).abs() < 1e-5);
    assert!((body["confidence"]["profile_photo"].as_f64().unwrap() - 0.97).abs() < 1e-6);
    assert!((body["confidence"]["habit_photo"].as_f64().unwrap() - 0.97).abs() < 1e-6);
    assert_eq!(body["message"], "Face verified successfully!");
}

#[tokio::test]
async fn verify_face_different_people_do_not_match() {
    let (app, _) = test_app();
    // Stub embeddings (127,-128,-128) and (127,-128,127): distance ~0.668.
    let req = json!({
        "profile_photo": face_photo(),
        "habit_photo": solid_png_b64([255, 0, 255]),
    });
    let (status, body) = post_json(app, "/verify-face", req.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["verified"], false);
    let sim = body["similarity_score"].as_f64().unwrap();
    assert!((sim - 0.3325).abs() < 1e-3, "{sim}");
    assert_eq!(body["message"], "Face verification failed - photos do not match");
}

#[tokio::test]
async fn verify_face_threshold_override_flips_decision() {
    let (app, _) = test_app();
    let req = json!({
        "profile_photo": face_photo(),
        "habit_photo": solid_png_b64([255, 0, 255]),
        "threshold": 0.7,
    });
    let (status, body) = post_json(app, "/verify-face", req.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], true);
}

#[tokio::test]
async fn verify_face_missing_photo_skips_models() {
    let (app, calls) = test_app();
    let (status, body) = post_json(app, "/verify-face", json!({ "profile_photo": face_photo() }).to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing habit_photo in request");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn verify_face_reports_photo_without_face() {
    let (app, _) = test_app();
    let req = json!({ "profile_photo": face_photo(), "habit_photo": empty_photo() });
    let (status, body) = post_json(app, "/verify-face", req.to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "No face detected in habit photo");
    assert_eq!(body["details"], "No face detected in image");
}

#[tokio::test]
async fn verify_face_rejects_bad_base64() {
    let (app, calls) = test_app();
    let req = json!({ "profile_photo": "not an image!!", "habit_photo": face_photo() });
    let (status, body) = post_json(app, "/verify-face", req.to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["field"], "profile_photo");
    assert!(body["error"].as_str().unwrap().starts_with("Invalid image data"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn verify_face_accepts_data_url() {
    let (app, _) = test_app();
    let photo = format!("data:image/png;base64,{}", face_photo());
    let req = json!({ "profile_photo": photo, "habit_photo": face_photo() });
    let (status, body) = post_json(app, "/verify-face", req.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], true);
}

#[tokio::test]
async fn verify_activity_uses_default_threshold() {
    let (app, _) = test_app();
    let req = json!({ "image": face_photo(), "activity": "a person cycling" });
    let (status, body) = post_json(app, "/verify-activity", req.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["verified"], true);
    assert!((body["threshold"].as_f64().unwrap() - 0.25).abs() < 1e-6);
    assert!((body["similarity_score"].as_f64().unwrap() - 0.4).abs() < 1e-5);
    assert_eq!(body["confidence"], "high");
    assert_eq!(body["message"], "Activity verified");
}

#[tokio::test]
async fn verify_activity_confidence_ignores_threshold() {
    let (app, _) = test_app();
    let req = json!({ "image": face_photo(), "activity": "cycling", "threshold": 0.5 });
    let (status, body) = post_json(app, "/verify-activity", req.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], false);
    assert_eq!(body["confidence"], "high");
    assert!((body["threshold"].as_f64().unwrap() - 0.5).abs() < 1e-6);
    assert_eq!(body["message"], "Activity not verified");
}

#[tokio::test]
async fn verify_activity_low_score() {
    let (app, _) = test_app();
    let req = json!({ "image": empty_photo(), "activity": "meditating" });
    let (status, body) = post_json(app, "/verify-activity", req.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], false);
    assert_eq!(body["confidence"], "low");
}

#[tokio::test]
async fn verify_activity_names_all_missing_fields() {
    let (app, _) = test_app();
    let (status, body) = post_json(app, "/verify-activity", "{}".into()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing image and activity in request");
}

#[tokio::test]
async fn invalid_json_is_rejected() {
    let (app, _) = test_app();
    let (status, body) = post_json(app, "/verify-face", "{not json".into()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid JSON body"));
}

#[tokio::test]
async fn detect_face_rejects_bad_image_data() {
    let (app, calls) = test_app();
    let (status, body) = post_json(app, "/detect-face", json!({ "image": "%%%not-base64%%%" }).to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["field"], "image");
    assert!(body["error"].as_str().unwrap().starts_with("Invalid image data"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn verify_activity_rejects_bytes_that_are_not_an_image() {
    let (app, _) = test_app();
    // Valid base64, but not an image container
    let req = json!({ "image": "aGVsbG8gd29ybGQ=", "activity": "a person cycling" });
    let (status, body) = post_json(app, "/verify-activity", req.to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["field"], "image");
    assert!(body["error"].as_str().unwrap().starts_with("Invalid image data"));
}

#[tokio::test]
async fn verify_activity_names_missing_activity() {
    let (app, _) = test_app();
    let (status, body) = post_json(app, "/verify-activity", json!({ "image": face_photo() }).to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Missing activity in request");
}

#[tokio::test]
async fn unknown_path_returns_json_404() {
    let (app, _) = test_app();
    let (status, body) = send(app, Request::get("/nope").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Not found: /nope");
}

#[tokio::test]
async fn wrong_method_returns_json_405() {
    let (app, calls) = test_app();
    let (status, body) = send(app, Request::get("/verify-face").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Method GET not allowed for /verify-face");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn oversized_body_returns_413() {
    let (app, calls) = test_app_with_limit(1024);
    let req = json!({ "image": "A".repeat(4096) });
    let (status, body) = post_json(app, "/detect-face", req.to_string()).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid JSON body"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
