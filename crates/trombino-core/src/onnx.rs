//! ONNX-backed embedding provider.
//!
//! Wraps three ONNX Runtime sessions: a single-output face detector, a
//! FaceNet-style 128-d embedding model, and an optional attribute model
//! (age / gender / emotion / race heads). Images are decoded and cropped
//! in memory; nothing touches the filesystem after model load.
//!
//! Expected model contracts:
//! - detector: input 1x3x320x320, one f32 output of N rows
//!   `[score, x1, y1, x2, y2]` with coordinates normalized to [0, 1];
//! - embedder: input 1x3x160x160 (prewhitened), output 1x128;
//! - analyzer: input 1x3x224x224 (scaled to [0, 1]), outputs
//!   `[age_bins(101), gender(2), emotion(7), race(6)]` in that order.

use crate::provider::{EmbeddingProvider, ProviderError};
use crate::types::{Embedding, FaceAttributes, FaceCapture, ModelInfo};
use image::DynamicImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;

const DETECTOR_INPUT_SIZE: usize = 320;
const DETECTOR_MEAN: f32 = 127.5;
const DETECTOR_STD: f32 = 128.0;
/// Detections scoring below this are treated as background, not faces.
const DETECTOR_SCORE_FLOOR: f32 = 0.5;

const FACENET_INPUT_SIZE: usize = 160;
const FACENET_EMBEDDING_DIM: usize = 128;
const FACENET_MODEL_VERSION: &str = "facenet-128";

const ANALYZER_INPUT_SIZE: usize = 224;
const ANALYZER_HEADS: [&str; 4] = ["age", "gender", "emotion", "race"];
const AGE_BINS: usize = 101;
const GENDER_LABELS: [&str; 2] = ["Woman", "Man"];
const EMOTION_LABELS: [&str; 7] = ["angry", "disgust", "fear", "happy", "sad", "surprise", "neutral"];
const RACE_LABELS: [&str; 6] = ["asian", "indian", "black", "white", "middle eastern", "latino hispanic"];

/// One face located by the detector, coordinates normalized to [0, 1].
#[derive(Debug, Clone, Copy)]
struct Detection {
    score: f32,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

/// Production [`EmbeddingProvider`] running ONNX models on the CPU.
///
/// Sessions are serialized behind mutexes; callers offload to a worker
/// pool, so contention here only lines up CPU-bound work that could not
/// run in parallel on the sessions anyway.
pub struct OnnxProvider {
    detector: Mutex<Session>,
    embedder: Mutex<Session>,
    analyzer: Option<Mutex<Session>>,
}

impl OnnxProvider {
    /// Load the detector and embedder models, plus the attribute model
    /// when a path for it is given. Fails fast if a file is missing.
    pub fn load(
        detector_path: &Path,
        embedder_path: &Path,
        analyzer_path: Option<&Path>,
    ) -> Result<Self, ProviderError> {
        let detector = load_session(detector_path)?;
        tracing::info!(path = %detector_path.display(), "face detector loaded");

        let embedder = load_session(embedder_path)?;
        tracing::info!(path = %embedder_path.display(), "embedding model loaded");

        let analyzer = match analyzer_path {
            Some(path) => {
                let session = load_session(path)?;
                tracing::info!(path = %path.display(), "attribute model loaded");
                Some(Mutex::new(session))
            }
            None => {
                tracing::warn!("no attribute model configured; analyze endpoints will be unavailable");
                None
            }
        };

        Ok(Self {
            detector: Mutex::new(detector),
            embedder: Mutex::new(embedder),
            analyzer,
        })
    }

    /// Run the detector and return the highest-scoring face, if any.
    fn detect_best(&self, img: &DynamicImage) -> Result<Option<Detection>, ProviderError> {
        let input = detector_tensor(img);

        let mut session = self
            .detector
            .lock()
            .map_err(|_| ProviderError::InferenceFailed("detector session poisoned".into()))?;
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ProviderError::InferenceFailed(format!("detector output: {e}")))?;

        Ok(best_detection(raw, DETECTOR_SCORE_FLOOR))
    }

    /// Crop the detected face and run the embedding model over it.
    fn extract_embedding(&self, img: &DynamicImage, face: &Detection) -> Result<Embedding, ProviderError> {
        let crop = crop_face(img, face, FACENET_INPUT_SIZE as u32);
        let input = prewhitened_tensor(&crop, FACENET_INPUT_SIZE);

        let mut session = self
            .embedder
            .lock()
            .map_err(|_| ProviderError::InferenceFailed("embedder session poisoned".into()))?;
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ProviderError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != FACENET_EMBEDDING_DIM {
            return Err(ProviderError::InferenceFailed(format!(
                "expected {FACENET_EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding {
            values: l2_normalize(raw),
            model_version: Some(FACENET_MODEL_VERSION.to_string()),
        })
    }
}

impl EmbeddingProvider for OnnxProvider {
    fn embed(&self, image: &[u8], strict: bool) -> Result<Option<FaceCapture>, ProviderError> {
        let img = image::load_from_memory(image)
            .map_err(|e| ProviderError::ImageUnreadable(e.to_string()))?;

        let Some(face) = self.detect_best(&img)? else {
            return if strict { Err(ProviderError::NoFaceDetected) } else { Ok(None) };
        };

        let embedding = self.extract_embedding(&img, &face)?;
        tracing::debug!(score = face.score, "face embedded");

        Ok(Some(FaceCapture {
            embedding,
            detection_confidence: face.score.clamp(0.0, 1.0),
        }))
    }

    fn analyze(&self, image: &[u8]) -> Result<FaceAttributes, ProviderError> {
        let analyzer = self.analyzer.as_ref().ok_or(ProviderError::AnalyzerUnavailable)?;

        let img = image::load_from_memory(image)
            .map_err(|e| ProviderError::ImageUnreadable(e.to_string()))?;

        // Permissive: analyze the full frame when no face is found.
        let crop = match self.detect_best(&img)? {
            Some(face) => crop_face(&img, &face, ANALYZER_INPUT_SIZE as u32),
            None => img.resize_exact(
                ANALYZER_INPUT_SIZE as u32,
                ANALYZER_INPUT_SIZE as u32,
                image::imageops::FilterType::Triangle,
            ),
        };
        let input = scaled_tensor(&crop, ANALYZER_INPUT_SIZE);

        let mut session = analyzer
            .lock()
            .map_err(|_| ProviderError::InferenceFailed("analyzer session poisoned".into()))?;
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        if outputs.len() < ANALYZER_HEADS.len() {
            return Err(ProviderError::InferenceFailed(format!(
                "analyzer produced {} outputs, expected {}",
                outputs.len(),
                ANALYZER_HEADS.len()
            )));
        }

        let mut heads = Vec::with_capacity(ANALYZER_HEADS.len());
        for (i, name) in ANALYZER_HEADS.iter().enumerate() {
            let (_, raw) = outputs[i]
                .try_extract_tensor::<f32>()
                .map_err(|e| ProviderError::InferenceFailed(format!("{name} head: {e}")))?;
            heads.push(raw.to_vec());
        }

        attributes_from_heads(&heads)
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            model: FACENET_MODEL_VERSION.to_string(),
            detector: "onnx-ssd".to_string(),
        }
    }
}

fn load_session(path: &Path) -> Result<Session, ProviderError> {
    if !path.exists() {
        return Err(ProviderError::ModelNotFound(path.display().to_string()));
    }
    Ok(Session::builder()?
        .with_intra_threads(2)
        .map_err(ort::Error::from)?
        .commit_from_file(path)?)
}

/// Parse flat detector output (rows of `[score, x1, y1, x2, y2]`) and
/// keep the best row at or above `floor`.
fn best_detection(raw: &[f32], floor: f32) -> Option<Detection> {
    let mut best: Option<Detection> = None;
    for row in raw.chunks_exact(5) {
        let det = Detection { score: row[0], x1: row[1], y1: row[2], x2: row[3], y2: row[4] };
        if det.score < floor || det.x2 <= det.x1 || det.y2 <= det.y1 {
            continue;
        }
        if best.map_or(true, |b| det.score > b.score) {
            best = Some(det);
        }
    }
    best
}

/// Crop the face region (clamped to the frame) and resize to `size`.
fn crop_face(img: &DynamicImage, face: &Detection, size: u32) -> DynamicImage {
    let (w, h) = (img.width() as f32, img.height() as f32);
    let x1 = (face.x1.clamp(0.0, 1.0) * w) as u32;
    let y1 = (face.y1.clamp(0.0, 1.0) * h) as u32;
    let x2 = (face.x2.clamp(0.0, 1.0) * w).ceil() as u32;
    let y2 = (face.y2.clamp(0.0, 1.0) * h).ceil() as u32;
    let cw = (x2 - x1).max(1);
    let ch = (y2 - y1).max(1);

    img.crop_imm(x1, y1, cw, ch)
        .resize_exact(size, size, image::imageops::FilterType::Triangle)
}

/// NCHW tensor for the detector: resize and normalize to its input
/// distribution.
fn detector_tensor(img: &DynamicImage) -> Array4<f32> {
    let size = DETECTOR_INPUT_SIZE;
    let rgb = img
        .resize_exact(size as u32, size as u32, image::imageops::FilterType::Triangle)
        .to_rgb8();

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - DETECTOR_MEAN) / DETECTOR_STD;
        }
    }
    tensor
}

/// NCHW tensor standardized per-image (FaceNet prewhitening): zero mean,
/// unit variance with a floor of `1/sqrt(n)` on the standard deviation.
fn prewhitened_tensor(img: &DynamicImage, size: usize) -> Array4<f32> {
    let rgb = img.to_rgb8();
    let pixels: Vec<f32> = rgb.as_raw().iter().map(|&p| p as f32).collect();

    let n = pixels.len() as f32;
    let mean = pixels.iter().sum::<f32>() / n;
    let variance = pixels.iter().map(|p| (p - mean).powi(2)).sum::<f32>() / n;
    let std = variance.sqrt().max(1.0 / n.sqrt());

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - mean) / std;
        }
    }
    tensor
}

/// NCHW tensor scaled to [0, 1] for the attribute model.
fn scaled_tensor(img: &DynamicImage, size: usize) -> Array4<f32> {
    let rgb = img.to_rgb8();
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }
    tensor
}

/// Map the analyzer's output heads, in `[age, gender, emotion, race]`
/// order, to attributes. A model exporting the wrong number of heads is
/// an inference fault, not a panic.
fn attributes_from_heads(heads: &[Vec<f32>]) -> Result<FaceAttributes, ProviderError> {
    let [age, gender, emotion, race] = heads else {
        return Err(ProviderError::InferenceFailed(format!(
            "expected {} analyzer heads, got {}",
            ANALYZER_HEADS.len(),
            heads.len()
        )));
    };

    if age.len() != AGE_BINS {
        return Err(ProviderError::InferenceFailed(format!(
            "expected {AGE_BINS} age bins, got {}",
            age.len()
        )));
    }

    Ok(FaceAttributes {
        age: expected_age(age),
        gender: argmax_label(gender, &GENDER_LABELS)?.to_string(),
        dominant_emotion: argmax_label(emotion, &EMOTION_LABELS)?.to_string(),
        dominant_race: argmax_label(race, &RACE_LABELS)?.to_string(),
    })
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}

/// Apparent age as the expectation over the 101-bin age distribution.
fn expected_age(bins: &[f32]) -> u32 {
    let total: f32 = bins.iter().sum();
    if total <= 0.0 {
        return 0;
    }
    let expectation: f32 = bins
        .iter()
        .enumerate()
        .map(|(age, p)| age as f32 * p / total)
        .sum();
    expectation.round().max(0.0) as u32
}

fn argmax_label<'a>(scores: &[f32], labels: &[&'a str]) -> Result<&'a str, ProviderError> {
    if scores.len() != labels.len() {
        return Err(ProviderError::InferenceFailed(format!(
            "expected {} classes, got {}",
            labels.len(),
            scores.len()
        )));
    }
    let mut best = 0usize;
    for (i, score) in scores.iter().enumerate() {
        if *score > scores[best] {
            best = i;
        }
    }
    Ok(labels[best])
}
