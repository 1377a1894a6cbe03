use crate::config::ModelConfig;
use habitlens_core::{
    compare_faces, locate_face, verify_activity, ActivityError, ActivityVerdict, ClipScorer,
    ComparisonResult, Detector, DetectorError, Embedder, EmbeddingError, FaceDetector, FaceEmbedder,
    FaceLocation, JointScorer,
};
use image::RgbImage;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Requests that can wait for the engine before senders block.
const ENGINE_QUEUE_DEPTH: usize = 16;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("activity model error: {0}")]
    Activity(#[from] ActivityError),
    #[error("model panicked: {0}")]
    Panicked(String),
    #[error("failed to start engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// The three external models, owned by the engine thread.
pub struct Models {
    pub detector: Box<dyn Detector + Send>,
    pub embedder: Box<dyn Embedder + Send>,
    pub scorer: Box<dyn JointScorer + Send>,
}

impl Models {
    /// Load SCRFD, FaceNet and CLIP from the model directory. Fails fast
    /// if any file is missing or invalid.
    pub fn load(config: &ModelConfig) -> Result<Self, EngineError> {
        let scrfd_path = config.scrfd_model_path();
        let detector = FaceDetector::load(&scrfd_path)?;
        tracing::info!(path = %scrfd_path, "SCRFD detector loaded");

        let facenet_path = config.facenet_model_path();
        let embedder = FaceEmbedder::load(&facenet_path)?;
        tracing::info!(path = %facenet_path, "FaceNet embedder loaded");

        let scorer = ClipScorer::load(
            &config.clip_visual_model_path(),
            &config.clip_textual_model_path(),
            &config.clip_tokenizer_path(),
        )?;
        tracing::info!(dir = %config.model_dir.display(), "CLIP scorer loaded");

        Ok(Self {
            detector: Box::new(detector),
            embedder: Box::new(embedder),
            scorer: Box::new(scorer),
        })
    }
}

/// Which photo of a face verification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Photo {
    Profile,
    Habit,
}

impl Photo {
    pub fn label(&self) -> &'static str {
        match self {
            Photo::Profile => "profile photo",
            Photo::Habit => "habit photo",
        }
    }
}

/// Result of a face detection request.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectOutcome {
    Detected { confidence: f32 },
    NoFace { reason: String },
}

/// Result of a face verification request.
#[derive(Debug, Clone, PartialEq)]
pub enum FaceVerifyOutcome {
    Compared {
        result: ComparisonResult,
        profile_confidence: f32,
        habit_confidence: f32,
    },
    NoFace {
        photo: Photo,
        reason: String,
    },
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Detect {
        image: RgbImage,
        reply: oneshot::Sender<Result<DetectOutcome, EngineError>>,
    },
    VerifyFaces {
        profile: RgbImage,
        habit: RgbImage,
        threshold: f32,
        reply: oneshot::Sender<Result<FaceVerifyOutcome, EngineError>>,
    },
    VerifyActivity {
        image: RgbImage,
        activity: String,
        threshold: f32,
        reply: oneshot::Sender<Result<ActivityVerdict, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, EngineError>>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Detect the largest face in an image.
    pub async fn detect(&self, image: RgbImage) -> Result<DetectOutcome, EngineError> {
        self.request(|reply| EngineRequest::Detect { image, reply }).await
    }

    /// Detect, crop and embed the face in each photo, then compare.
    pub async fn verify_faces(
        &self,
        profile: RgbImage,
        habit: RgbImage,
        threshold: f32,
    ) -> Result<FaceVerifyOutcome, EngineError> {
        self.request(|reply| EngineRequest::VerifyFaces {
            profile,
            habit,
            threshold,
            reply,
        })
        .await
    }

    /// Score an image against an activity description.
    pub async fn verify_activity(
        &self,
        image: RgbImage,
        activity: String,
        threshold: f32,
    ) -> Result<ActivityVerdict, EngineError> {
        self.request(|reply| EngineRequest::VerifyActivity {
            image,
            activity,
            threshold,
            reply,
        })
        .await
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns `models` and serves one request at a time until every
/// `EngineHandle` is dropped. ONNX sessions need exclusive access while
/// running, so this is the only place inference happens. A panic inside a
/// model call fails that request only.
pub fn spawn_engine(mut models: Models, face_margin: f32) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(ENGINE_QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("habitlens-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Detect { image, reply } => {
                        let result = guarded("detect", || run_detect(&mut models, face_margin, &image));
                        let _ = reply.send(result);
                    }
                    EngineRequest::VerifyFaces {
                        profile,
                        habit,
                        threshold,
                        reply,
                    } => {
                        let result = guarded("verify_faces", || {
                            run_verify_faces(&mut models, face_margin, &profile, &habit, threshold)
                        });
                        let _ = reply.send(result);
                    }
                    EngineRequest::VerifyActivity {
                        image,
                        activity,
                        threshold,
                        reply,
                    } => {
                        let result = guarded("verify_activity", || {
                            verify_activity(models.scorer.as_mut(), &image, &activity, threshold)
                                .map_err(EngineError::from)
                        });
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

/// Run one model call, turning a panic into `EngineError::Panicked`.
fn guarded<T>(op: &'static str, f: impl FnOnce() -> Result<T, EngineError>) -> Result<T, EngineError> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::error!(op, %message, "model call panicked");
        Err(EngineError::Panicked(message))
    })
}

fn run_detect(models: &mut Models, margin: f32, image: &RgbImage) -> Result<DetectOutcome, EngineError> {
    match locate_face(models.detector.as_mut(), image, margin)? {
        FaceLocation::Found { confidence, .. } => Ok(DetectOutcome::Detected { confidence }),
        FaceLocation::NotFound { reason } => Ok(DetectOutcome::NoFace { reason }),
    }
}

/// Locate both faces (profile first), embed, compare. Stops at the first
/// photo without a face; nothing is embedded in that case.
fn run_verify_faces(
    models: &mut Models,
    margin: f32,
    profile: &RgbImage,
    habit: &RgbImage,
    threshold: f32,
) -> Result<FaceVerifyOutcome, EngineError> {
    let mut located = Vec::with_capacity(2);
    for (photo, image) in [(Photo::Profile, profile), (Photo::Habit, habit)] {
        match locate_face(models.detector.as_mut(), image, margin)? {
            FaceLocation::Found { crop, confidence } => located.push((crop, confidence)),
            FaceLocation::NotFound { reason } => {
                tracing::debug!(photo = photo.label(), %reason, "verify: no face");
                return Ok(FaceVerifyOutcome::NoFace { photo, reason });
            }
        }
    }

    let (habit_crop, habit_confidence) = located.remove(1);
    let (profile_crop, profile_confidence) = located.remove(0);

    let profile_embedding = models.embedder.embed(&profile_crop)?;
    let habit_embedding = models.embedder.embed(&habit_crop)?;
    let result = compare_faces(&profile_embedding, &habit_embedding, threshold);

    tracing::debug!(
        distance = result.distance,
        threshold,
        is_match = result.is_match,
        "verify: faces compared"
    );

    Ok(FaceVerifyOutcome::Compared {
        result,
        profile_confidence,
        habit_confidence,
    })
}
