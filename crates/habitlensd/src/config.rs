use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Daemon configuration: optional TOML file, then `HABITLENS_*` environment
/// overrides, then command-line flags.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub models: ModelConfig,
    pub verification: VerificationConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Maximum request body size; base64 photos are large.
    pub body_limit_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory containing the ONNX model files and the CLIP tokenizer.
    pub model_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VerificationConfig {
    /// Cosine-distance threshold for a face match when the request has none.
    pub face_threshold: f32,
    /// Similarity threshold for activity verification when the request has none.
    pub activity_threshold: f32,
    /// Fractional padding around a detected face before cropping.
    pub face_margin: f32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5000,
            log_level: "info".into(),
            body_limit_bytes: 16 * 1024 * 1024,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_dir: habitlens_core::default_model_dir(),
        }
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            face_threshold: habitlens_core::DEFAULT_FACE_THRESHOLD,
            activity_threshold: habitlens_core::DEFAULT_ACTIVITY_THRESHOLD,
            face_margin: habitlens_core::DEFAULT_MARGIN,
        }
    }
}

/// An environment override whose value failed to parse. The setting keeps
/// its previous value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedOverride {
    pub key: &'static str,
    pub value: String,
}

impl Config {
    /// Load from a TOML file when given, then apply environment overrides.
    ///
    /// Runs before logging is set up, so rejected overrides are returned for
    /// the caller to report.
    pub fn load(path: Option<&Path>) -> Result<(Self, Vec<RejectedOverride>)> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                toml::from_str(&contents).context("failed to parse config TOML")?
            }
            None => Config::default(),
        };

        let rejected = config.apply_overrides(|key| std::env::var(key).ok());
        Ok((config, rejected))
    }

    /// Apply `HABITLENS_*` overrides from `lookup`. Values that fail to
    /// parse are skipped and returned.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Vec<RejectedOverride> {
        let mut rejected = Vec::new();

        if let Some(v) = lookup("HABITLENS_HOST") {
            self.server.host = v;
        }
        override_parsed(&lookup, "HABITLENS_PORT", &mut self.server.port, &mut rejected);
        if let Some(v) = lookup("HABITLENS_LOG_LEVEL") {
            self.server.log_level = v;
        }
        override_parsed(&lookup, "HABITLENS_BODY_LIMIT_BYTES", &mut self.server.body_limit_bytes, &mut rejected);
        if let Some(v) = lookup("HABITLENS_MODEL_DIR") {
            self.models.model_dir = PathBuf::from(v);
        }
        override_parsed(&lookup, "HABITLENS_FACE_THRESHOLD", &mut self.verification.face_threshold, &mut rejected);
        override_parsed(
            &lookup,
            "HABITLENS_ACTIVITY_THRESHOLD",
            &mut self.verification.activity_threshold,
            &mut rejected,
        );
        override_parsed(&lookup, "HABITLENS_FACE_MARGIN", &mut self.verification.face_margin, &mut rejected);

        rejected
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl ModelConfig {
    fn model_path(&self, file: &str) -> String {
        self.model_dir.join(file).to_string_lossy().into_owned()
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_path(habitlens_core::SCRFD_MODEL_FILE)
    }

    /// Path to the FaceNet embedding model.
    pub fn facenet_model_path(&self) -> String {
        self.model_path(habitlens_core::FACENET_MODEL_FILE)
    }

    /// Path to the CLIP image encoder.
    pub fn clip_visual_model_path(&self) -> String {
        self.model_path(habitlens_core::CLIP_VISUAL_MODEL_FILE)
    }

    /// Path to the CLIP text encoder.
    pub fn clip_textual_model_path(&self) -> String {
        self.model_path(habitlens_core::CLIP_TEXTUAL_MODEL_FILE)
    }

    /// Path to the CLIP tokenizer.
    pub fn clip_tokenizer_path(&self) -> String {
        self.model_path(habitlens_core::CLIP_TOKENIZER_FILE)
    }
}

fn override_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    slot: &mut T,
    rejected: &mut Vec<RejectedOverride>,
) {
    if let Some(raw) = lookup(key) {
        match raw.parse() {
            Ok(v) => *slot = v,
            Err(_) => rejected.push(RejectedOverride { key, value: raw }),
        }
    }
}
