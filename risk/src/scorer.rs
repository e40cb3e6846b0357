//! Scorer and vision seams
//!
//! The trained risk model and the crack detector are opaque capabilities.
//! This module fixes the feature layout they consume and the neutral
//! defaults used when they are missing or fail.

use crate::history::DisplacementStats;
use crate::RiskClass;
use geoguard_sim::SensorReading;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Feature order expected by the risk scorer
pub const FEATURE_NAMES: [&str; 11] = [
    "disp_last",
    "disp_1h_mean",
    "disp_1h_std",
    "pore_kpa",
    "vibration_g",
    "slope_deg",
    "aspect_deg",
    "curvature",
    "roughness",
    "precip_mm_1h",
    "temp_c",
];

/// Static terrain attributes at a sensor
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TerrainFeatures {
    pub slope_deg: f64,
    pub aspect_deg: f64,
    pub curvature: f64,
    pub roughness: f64,
}

/// Fused per-sensor feature vector
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub disp_last: f64,
    pub disp_1h_mean: f64,
    pub disp_1h_std: f64,
    pub pore_kpa: f64,
    pub vibration_g: f64,
    pub slope_deg: f64,
    pub aspect_deg: f64,
    pub curvature: f64,
    pub roughness: f64,
    pub precip_mm_1h: f64,
    pub temp_c: f64,
}

impl FeatureVector {
    /// Fuse a reading, its displacement history, terrain and rainfall.
    ///
    /// Without history the current displacement stands in for the 1 h mean.
    pub fn fuse(
        reading: &SensorReading,
        history: Option<DisplacementStats>,
        terrain: TerrainFeatures,
        precip_mm_1h: f64,
    ) -> Self {
        let disp = reading.values.displacement_mm;
        let stats = history.unwrap_or(DisplacementStats {
            last_mm: disp,
            mean_1h_mm: disp,
            std_1h_mm: 0.0,
            samples: 0,
        });

        Self {
            disp_last: disp,
            disp_1h_mean: stats.mean_1h_mm,
            disp_1h_std: stats.std_1h_mm,
            pore_kpa: reading.values.pore_kpa,
            vibration_g: reading.values.vibration_g,
            slope_deg: terrain.slope_deg,
            aspect_deg: terrain.aspect_deg,
            curvature: terrain.curvature,
            roughness: terrain.roughness,
            precip_mm_1h,
            temp_c: reading.values.temperature_c,
        }
    }

    /// Values in [`FEATURE_NAMES`] order
    pub fn to_array(&self) -> [f64; 11] {
        [
            self.disp_last,
            self.disp_1h_mean,
            self.disp_1h_std,
            self.pore_kpa,
            self.vibration_g,
            self.slope_deg,
            self.aspect_deg,
            self.curvature,
            self.roughness,
            self.precip_mm_1h,
            self.temp_c,
        ]
    }

    pub fn named(&self) -> Vec<(&'static str, f64)> {
        FEATURE_NAMES.iter().copied().zip(self.to_array()).collect()
    }
}

/// Trained risk model
pub trait RiskScorer: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> anyhow::Result<f64>;
}

impl<F> RiskScorer for F
where
    F: Fn(&FeatureVector) -> anyhow::Result<f64> + Send + Sync,
{
    fn predict(&self, features: &FeatureVector) -> anyhow::Result<f64> {
        self(features)
    }
}

/// Scorer result with its class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreOutcome {
    pub risk_score: f64,
    pub risk_class: RiskClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ScoreOutcome {
    /// Neutral low-risk default
    pub fn unavailable(note: impl Into<String>) -> Self {
        Self {
            risk_score: 0.0,
            risk_class: RiskClass::Low,
            note: Some(note.into()),
        }
    }

    fn scored(score: f64) -> Self {
        let risk_score = score.clamp(0.0, 1.0);
        Self {
            risk_score,
            risk_class: RiskClass::from_score(risk_score),
            note: None,
        }
    }
}

/// Run an optional scorer. Never fails: a missing or failing model
/// yields the neutral default.
pub fn score_features(scorer: Option<&dyn RiskScorer>, features: &FeatureVector) -> ScoreOutcome {
    let Some(scorer) = scorer else {
        return ScoreOutcome::unavailable("model not loaded");
    };

    match scorer.predict(features) {
        Ok(score) if score.is_finite() => ScoreOutcome::scored(score),
        Ok(score) => {
            tracing::warn!("Scorer returned non-finite value {}", score);
            ScoreOutcome::unavailable(format!("scorer returned {}", score))
        }
        Err(e) => {
            tracing::warn!("Scorer failed: {}", e);
            ScoreOutcome::unavailable(format!("scorer error: {}", e))
        }
    }
}

/// Crack detection model over an encoded image
pub trait CrackDetector: Send + Sync {
    fn predict_crack(&self, image: &[u8]) -> anyhow::Result<f64>;
}

/// Stand-in used when no model is loaded: uniform random score
#[derive(Debug, Default, Clone, Copy)]
pub struct MockCrackDetector;

impl CrackDetector for MockCrackDetector {
    fn predict_crack(&self, _image: &[u8]) -> anyhow::Result<f64> {
        Ok(rand::thread_rng().gen_range(0.0..1.0))
    }
}

/// Crack score in [0, 1]. No detector falls back to the mock; a failed
/// prediction scores 0.0.
pub fn assess_image(detector: Option<&dyn CrackDetector>, image: &[u8]) -> f64 {
    let Some(detector) = detector else {
        tracing::debug!("No crack detector loaded, using mock score");
        return MockCrackDetector.predict_crack(image).unwrap_or(0.0);
    };

    match detector.predict_crack(image) {
        Ok(score) if score.is_finite() => score.clamp(0.0, 1.0),
        Ok(score) => {
            tracing::warn!("Crack detector returned non-finite value {}", score);
            0.0
        }
        Err(e) => {
            tracing::warn!("Crack prediction failed: {}", e);
            0.0
        }
    }
}
