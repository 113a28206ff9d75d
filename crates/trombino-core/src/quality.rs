//! Image quality gate — brightness and focus checks before enrollment.
//!
//! Pure function of the image bytes: decode, grayscale, mean brightness,
//! then variance of a 4-neighbor Laplacian as a focus score. Runs ahead
//! of the embedding provider so obviously bad captures never reach the
//! model or the index.

use crate::types::{QualityReason, QualityVerdict};

/// Calibration thresholds for the quality gate.
///
/// Tied to the capture conditions the embedding model was calibrated
/// against; always sourced from configuration, never hard-coded at call
/// sites.
#[derive(Debug, Clone, Copy)]
pub struct QualityThresholds {
    /// Minimum acceptable mean brightness (0–255). A mean of exactly
    /// this value is accepted.
    pub min_brightness: f32,
    /// Maximum acceptable mean brightness (0–255), inclusive.
    pub max_brightness: f32,
    /// Minimum acceptable Laplacian variance, inclusive.
    pub min_sharpness: f32,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_brightness: 40.0,
            max_brightness: 220.0,
            min_sharpness: 50.0,
        }
    }
}

/// Assesses images against [`QualityThresholds`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityGate {
    pub thresholds: QualityThresholds,
}

impl QualityGate {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    /// Assess raw image bytes. Never fails: an undecodable input yields
    /// an `UNREADABLE` verdict rather than an error.
    pub fn assess(&self, bytes: &[u8]) -> QualityVerdict {
        let gray = match image::load_from_memory(bytes) {
            Ok(img) => img.to_luma8(),
            Err(err) => {
                tracing::debug!(error = %err, "quality gate: image decode failed");
                return QualityVerdict {
                    acceptable: false,
                    reason: QualityReason::Unreadable,
                    measurement: 0.0,
                };
            }
        };

        let brightness = mean_brightness(gray.as_raw());
        if brightness < self.thresholds.min_brightness {
            return QualityVerdict {
                acceptable: false,
                reason: QualityReason::TooDark,
                measurement: brightness,
            };
        }
        if brightness > self.thresholds.max_brightness {
            return QualityVerdict {
                acceptable: false,
                reason: QualityReason::TooBright,
                measurement: brightness,
            };
        }

        let sharpness = laplacian_variance(gray.as_raw(), gray.width(), gray.height());
        if sharpness < self.thresholds.min_sharpness {
            return QualityVerdict {
                acceptable: false,
                reason: QualityReason::TooBlurry,
                measurement: sharpness,
            };
        }

        QualityVerdict {
            acceptable: true,
            reason: QualityReason::Ok,
            measurement: sharpness,
        }
    }
}

/// Average pixel brightness (0.0–255.0).
fn mean_brightness(gray: &[u8]) -> f32 {
    if gray.is_empty() {
        return 0.0;
    }
    (gray.iter().map(|&b| b as f64).sum::<f64>() / gray.len() as f64) as f32
}

/// Variance of the 4-neighbor Laplacian over interior pixels.
///
/// The Laplacian responds to edges; a sharp image has a wide response
/// distribution and a defocused one collapses toward zero. Images
/// smaller than 3x3 have no interior and score 0.
fn laplacian_variance(gray: &[u8], width: u32, height: u32) -> f32 {
    let w = width as usize;
    let h = height as usize;
    if w < 3 || h < 3 || gray.len() < w * h {
        return 0.0;
    }

    let n = ((w - 2) * (h - 2)) as f64;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let center = gray[y * w + x] as f64;
            let lap = gray[(y - 1) * w + x] as f64
                + gray[(y + 1) * w + x] as f64
                + gray[y * w + x - 1] as f64
                + gray[y * w + x + 1] as f64
                - 4.0 * center;
            sum += lap;
            sum_sq += lap * lap;
        }
    }

    let mean = sum / n;
    (sum_sq / n - mean * mean) as f32
}
