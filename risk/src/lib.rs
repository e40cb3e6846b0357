//! GeoGuard Risk Fusion Library
//!
//! Combines simulated sensor telemetry, a weather signal and a visual
//! inspection score into a bounded slope failure risk, and projects it
//! over a spatial grid.

pub mod climate;
pub mod fusion;
pub mod grid;
pub mod history;
pub mod scorer;
pub mod weather;

use chrono::{DateTime, Utc};
use geoguard_sim::SimError;
use serde::{Deserialize, Serialize};

pub use climate::{ClimateRiskModel, ImpactBreakdown, ImpactWeights};
pub use fusion::{FusionConfig, FusionEngine, SimulationContext};
pub use grid::{GridConfig, RiskGridBuilder, RiskGridCell};
pub use weather::{Provenance, WeatherCondition, WeatherProvider, WeatherSnapshot};

/// Named risk band used for alerting
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    Safe,
    Low,
    Medium,
    High,
    Evacuate,
}

impl RiskBand {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 0.8 => RiskBand::Evacuate,
            s if s >= 0.6 => RiskBand::High,
            s if s >= 0.4 => RiskBand::Medium,
            s if s >= 0.2 => RiskBand::Low,
            _ => RiskBand::Safe,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskBand::Evacuate => "EVACUATE - Critical Risk",
            RiskBand::High => "HIGH - Stop Operations",
            RiskBand::Medium => "MEDIUM - Enhanced Monitoring",
            RiskBand::Low => "LOW - Normal Operations",
            RiskBand::Safe => "SAFE - All Clear",
        }
    }
}

/// Risk class reported for grid cells and scorer output
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RiskClass {
    Low,
    Medium,
    High,
    Imminent,
}

impl RiskClass {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s > 0.75 => RiskClass::Imminent,
            s if s > 0.6 => RiskClass::High,
            s if s > 0.35 => RiskClass::Medium,
            _ => RiskClass::Low,
        }
    }
}

/// Alert categories
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Enhanced risk at or above 0.8
    Evacuate,
    /// Enhanced risk at or above 0.6
    SuspendOperations,
    /// Enhanced risk at or above 0.4
    EnhancedMonitoring,
    /// More than 30mm in 24h
    HeavyRain,
    /// More than 15mm in 24h
    ModerateRain,
    /// Peak intensity above 20mm/h
    CriticalIntensity,
    /// Peak intensity above 12mm/h
    HighIntensity,
    Lightning,
    /// Vision system reports a major crack
    MajorCrack,
    /// A displacement channel is near its critical threshold
    GroundDisplacement,
}

impl AlertKind {
    /// Risk band alerts, as opposed to weather or source alerts
    pub fn is_risk_band(&self) -> bool {
        matches!(
            self,
            AlertKind::Evacuate | AlertKind::SuspendOperations | AlertKind::EnhancedMonitoring
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
}

impl Alert {
    pub fn new(kind: AlertKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Aggregate of the sensor snapshot behind an assessment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorSummary {
    pub active_sensors: usize,
    pub max_displacement_mm: f64,
    pub max_pore_kpa: f64,
    pub max_vibration_g: f64,
    pub displacement_risk: f64,
    pub pore_risk: f64,
    pub vibration_risk: f64,
}

/// Latest vision system result
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VisualSummary {
    pub risk_score: f64,
    pub last_check: Option<DateTime<Utc>>,
}

/// Inputs the fusion engine used
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskSources {
    /// `None` when no sensor reported (network paused or empty)
    pub sensors: Option<SensorSummary>,
    pub visual: VisualSummary,
}

/// Weather-enhanced risk assessment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub base_risk: f64,
    pub enhanced_risk: f64,
    pub weather_impact: f64,
    pub risk_multiplier: f64,
    pub risk_band: RiskBand,
    pub impact_breakdown: ImpactBreakdown,
    /// Weather conditions driving the impact
    pub impact_factors: Vec<String>,
    pub alerts: Vec<Alert>,
    pub weather: WeatherSnapshot,
    pub sources: Option<RiskSources>,
    pub timestamp: DateTime<Utc>,
}

impl RiskAssessment {
    pub fn has_alert(&self, kind: AlertKind) -> bool {
        self.alerts.iter().any(|a| a.kind == kind)
    }
}

/// Receives assessments produced by the monitoring loop
pub trait AssessmentHandler: Send + Sync {
    /// Called for every new assessment
    fn on_assessment(&self, assessment: &RiskAssessment);

    /// Called when the assessment saw no sensors
    fn on_sensors_silent(&self);
}

/// Simple logging handler
pub struct LoggingAssessmentHandler;

impl AssessmentHandler for LoggingAssessmentHandler {
    fn on_assessment(&self, assessment: &RiskAssessment) {
        tracing::info!(
            band = ?assessment.risk_band,
            provenance = ?assessment.weather.provenance,
            "Risk {:.3} (base {:.3}, weather impact {:.3})",
            assessment.enhanced_risk,
            assessment.base_risk,
            assessment.weather_impact
        );

        for alert in &assessment.alerts {
            tracing::warn!(kind = ?alert.kind, "{}", alert);
        }
    }

    fn on_sensors_silent(&self) {
        tracing::warn!("No sensor readings available");
    }
}

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum RiskError {
    #[error("Simulator error: {0}")]
    Sim(#[from] SimError),

    #[error("Weather request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Weather service returned status {0}")]
    WeatherStatus(u16),

    #[error("Malformed weather payload: {0}")]
    MalformedWeather(String),
}

pub type Result<T> = std::result::Result<T, RiskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_band_boundaries() {
        assert_eq!(RiskBand::from_score(0.0), RiskBand::Safe);
        assert_eq!(RiskBand::from_score(0.2), RiskBand::Low);
        assert_eq!(RiskBand::from_score(0.45), RiskBand::Medium);
        assert_eq!(RiskBand::from_score(0.6), RiskBand::High);
        assert_eq!(RiskBand::from_score(0.8), RiskBand::Evacuate);
        assert_eq!(RiskBand::from_score(1.0), RiskBand::Evacuate);
    }

    #[test]
    fn risk_class_boundaries_are_exclusive() {
        assert_eq!(RiskClass::from_score(0.35), RiskClass::Low);
        assert_eq!(RiskClass::from_score(0.36), RiskClass::Medium);
        assert_eq!(RiskClass::from_score(0.6), RiskClass::Medium);
        assert_eq!(RiskClass::from_score(0.7), RiskClass::High);
        assert_eq!(RiskClass::from_score(0.76), RiskClass::Imminent);
    }

    #[test]
    fn only_band_alerts_are_risk_band() {
        assert!(AlertKind::Evacuate.is_risk_band());
        assert!(AlertKind::SuspendOperations.is_risk_band());
        assert!(AlertKind::EnhancedMonitoring.is_risk_band());
        assert!(!AlertKind::HeavyRain.is_risk_band());
        assert!(!AlertKind::Lightning.is_risk_band());
    }
}
