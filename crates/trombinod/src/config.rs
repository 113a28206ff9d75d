//! Daemon configuration.
//!
//! Defaults, overridden by an optional TOML file, overridden in turn by
//! `TROMBINO_*` environment variables. Every calibration constant the
//! matching and quality policies depend on lives here — they are tied
//! to the specific embedding model and go stale the moment the model is
//! swapped.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use trombino_core::{MatchPolicy, QualityThresholds};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP listener binds to.
    pub bind_addr: String,
    pub port: u16,
    /// Directory containing the exported ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite enrollment database.
    pub db_path: PathBuf,
    /// Index backend: "sqlite" (persistent) or "memory" (volatile).
    pub index_backend: String,
    /// Detector confidence floor for identity matching.
    pub min_detection_confidence: f32,
    /// Nearest-neighbor distance ceiling for a positive match.
    pub max_distance: f32,
    /// Quality gate: minimum mean brightness, inclusive.
    pub min_brightness: f32,
    /// Quality gate: maximum mean brightness, inclusive.
    pub max_brightness: f32,
    /// Quality gate: minimum Laplacian variance, inclusive.
    pub min_sharpness: f32,
    /// Per-request deadline for decode + inference + index work.
    pub request_timeout_secs: u64,
    pub max_body_mb: usize,
    /// Permissive CORS for browser frontends.
    pub enable_cors: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("trombino");

        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 8000,
            model_dir: PathBuf::from("models"),
            db_path: data_dir.join("faces.db"),
            index_backend: "sqlite".to_string(),
            min_detection_confidence: 0.90,
            max_distance: 0.40,
            min_brightness: 40.0,
            max_brightness: 220.0,
            min_sharpness: 50.0,
            request_timeout_secs: 30,
            max_body_mb: 10,
            enable_cors: true,
        }
    }
}

impl Config {
    /// Load from the optional TOML file, then apply `TROMBINO_*`
    /// environment overrides.
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match file {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| anyhow::anyhow!("read {}: {e}", path.display()))?;
                toml::from_str(&text)
                    .map_err(|e| anyhow::anyhow!("parse {}: {e}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        env_string("TROMBINO_BIND_ADDR", &mut self.bind_addr);
        env_parse("TROMBINO_PORT", &mut self.port);
        env_path("TROMBINO_MODEL_DIR", &mut self.model_dir);
        env_path("TROMBINO_DB_PATH", &mut self.db_path);
        env_string("TROMBINO_INDEX_BACKEND", &mut self.index_backend);
        env_parse("TROMBINO_MIN_DETECTION_CONFIDENCE", &mut self.min_detection_confidence);
        env_parse("TROMBINO_MAX_DISTANCE", &mut self.max_distance);
        env_parse("TROMBINO_MIN_BRIGHTNESS", &mut self.min_brightness);
        env_parse("TROMBINO_MAX_BRIGHTNESS", &mut self.max_brightness);
        env_parse("TROMBINO_MIN_SHARPNESS", &mut self.min_sharpness);
        env_parse("TROMBINO_REQUEST_TIMEOUT_SECS", &mut self.request_timeout_secs);
        env_parse("TROMBINO_MAX_BODY_MB", &mut self.max_body_mb);
        if let Ok(v) = std::env::var("TROMBINO_ENABLE_CORS") {
            self.enable_cors = v != "0";
        }
    }

    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join("face_det.onnx")
    }

    pub fn embedder_model_path(&self) -> PathBuf {
        self.model_dir.join("facenet128.onnx")
    }

    pub fn analyzer_model_path(&self) -> PathBuf {
        self.model_dir.join("face_attrs.onnx")
    }

    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy {
            min_detection_confidence: self.min_detection_confidence,
            max_distance: self.max_distance,
        }
    }

    pub fn quality_thresholds(&self) -> QualityThresholds {
        QualityThresholds {
            min_brightness: self.min_brightness,
            max_brightness: self.max_brightness,
            min_sharpness: self.min_sharpness,
        }
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_mb * 1024 * 1024
    }

    pub fn socket_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        Ok(format!("{}:{}", self.bind_addr, self.port).parse()?)
    }
}

fn env_string(key: &str, slot: &mut String) {
    if let Ok(v) = std::env::var(key) {
        *slot = v;
    }
}

fn env_path(key: &str, slot: &mut PathBuf) {
    if let Ok(v) = std::env::var(key) {
        *slot = PathBuf::from(v);
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, slot: &mut T) {
    if let Some(v) = std::env::var(key).ok().and_then(|v| v.parse().ok()) {
        *slot = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.min_detection_confidence, 0.90);
        assert_eq!(cfg.max_distance, 0.40);
        assert_eq!(cfg.min_brightness, 40.0);
        assert_eq!(cfg.max_brightness, 220.0);
        assert_eq!(cfg.min_sharpness, 50.0);
        assert_eq!(cfg.index_backend, "sqlite");
    }

    #[test]
    fn test_toml_overrides() {
        let cfg: Config = toml::from_str(
            r#"
            port = 9100
            max_distance = 0.55
            index_backend = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.max_distance, 0.55);
        assert_eq!(cfg.index_backend, "memory");
        // untouched keys keep their defaults
        assert_eq!(cfg.min_brightness, 40.0);
    }

    #[test]
    fn test_socket_addr() {
        let cfg = Config::default();
        assert_eq!(cfg.socket_addr().unwrap().port(), 8000);
    }

    #[test]
    fn test_model_paths() {
        let mut cfg = Config::default();
        cfg.model_dir = PathBuf::from("/opt/models");
        assert_eq!(cfg.embedder_model_path(), PathBuf::from("/opt/models/facenet128.onnx"));
    }
}
