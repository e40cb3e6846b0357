//! GeoGuard Sensor Simulator
//!
//! Produces plausible, event-reactive geotechnical telemetry for a mine
//! slope monitoring network.
//!
//! # Modules
//!
//! - [`events`] - Rain and tremor event injections
//! - [`simulator`] - Per-sensor stochastic state machine
//!
//! # Example
//!
//! ```rust,no_run
//! use geoguard_sim::{SensorSimulator, SimulatorConfig};
//!
//! let mut sim = SensorSimulator::new(SimulatorConfig::default()).unwrap();
//! sim.trigger_tremor(0.8, 0.5).unwrap();
//! sim.advance(chrono::Local::now());
//!
//! for reading in sim.snapshot() {
//!     println!("{}: {:.4} {}", reading.sensor_id, reading.primary_value, reading.category.unit());
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod events;
pub mod simulator;

pub use events::{ActiveEvents, Event, RainEvent, TremorEvent};
pub use simulator::{start_ticker, SensorSimulator, SharedSimulator, SimulatorConfig};

/// Sensor categories deployed on the slope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorCategory {
    /// Crack meter / extensometer
    Displacement,
    /// Piezometer
    PorePressure,
    /// Geophone / accelerometer
    Vibration,
    /// Inclinometer
    Tilt,
}

impl SensorCategory {
    pub const ALL: [SensorCategory; 4] = [
        SensorCategory::Displacement,
        SensorCategory::PorePressure,
        SensorCategory::Vibration,
        SensorCategory::Tilt,
    ];

    /// Unit of the category's primary channel
    pub fn unit(&self) -> &'static str {
        match self {
            SensorCategory::Displacement => "mm",
            SensorCategory::PorePressure => "kPa",
            SensorCategory::Vibration => "g",
            SensorCategory::Tilt => "deg",
        }
    }

    /// Primary channel value for this category
    pub fn primary_value(&self, state: &SensorState) -> f64 {
        match self {
            SensorCategory::Displacement => state.displacement_mm,
            SensorCategory::PorePressure => state.pore_kpa,
            SensorCategory::Vibration => state.vibration_g,
            SensorCategory::Tilt => state.tilt_deg,
        }
    }
}

impl std::fmt::Display for SensorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SensorCategory::Displacement => "displacement",
            SensorCategory::PorePressure => "pore_pressure",
            SensorCategory::Vibration => "vibration",
            SensorCategory::Tilt => "tilt",
        };
        f.write_str(name)
    }
}

/// WGS84 position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Planar distance in degrees. Good enough over a few hundred metres.
    pub fn degree_distance(&self, other: &GeoPoint) -> f64 {
        ((self.lat - other.lat).powi(2) + (self.lon - other.lon).powi(2)).sqrt()
    }
}

/// Mutable physical state of one sensor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorState {
    pub displacement_mm: f64,
    pub pore_kpa: f64,
    pub vibration_g: f64,
    pub tilt_deg: f64,
    pub temperature_c: f64,
}

/// Drift anchors fixed at sensor installation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub displacement_mm: f64,
    pub pore_kpa: f64,
}

/// Simulated field sensor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sensor {
    pub id: String,
    pub category: SensorCategory,
    pub location: GeoPoint,
    pub state: SensorState,
    baseline: Baseline,
}

impl Sensor {
    pub fn new(
        id: &str,
        category: SensorCategory,
        location: GeoPoint,
        state: SensorState,
        baseline: Baseline,
    ) -> Self {
        Self {
            id: id.to_string(),
            category,
            location,
            state,
            baseline,
        }
    }

    pub fn baseline(&self) -> Baseline {
        self.baseline
    }

    /// Reading of the current state
    pub fn reading(&self, timestamp: DateTime<Utc>) -> SensorReading {
        SensorReading {
            sensor_id: self.id.clone(),
            category: self.category,
            timestamp,
            values: self.state,
            baseline: self.baseline,
            location: self.location,
            primary_value: self.category.primary_value(&self.state),
        }
    }
}

/// Sensor reading with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub sensor_id: String,
    pub category: SensorCategory,
    pub timestamp: DateTime<Utc>,
    pub values: SensorState,
    pub baseline: Baseline,
    pub location: GeoPoint,
    pub primary_value: f64,
}

/// Simulator error types
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("Invalid event parameter: {0}")]
    InvalidEvent(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Sensor not found: {0}")]
    SensorNotFound(String),
}

pub type Result<T> = std::result::Result<T, SimError>;
