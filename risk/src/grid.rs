//! Spatial risk grid
//!
//! Square grid of cells centred on the site. Each cell blends a static
//! mine proximity term, a seeded geology layer and inverse distance
//! weighted sensor risk, then scales the blend by precipitation.

use crate::climate::ImpactWeights;
use crate::weather::WeatherSnapshot;
use crate::RiskClass;
use geoguard_sim::{GeoPoint, SensorReading};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Grid builder parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Cell edge in degrees (~40 m)
    pub cell_size_deg: f64,
    /// Proximity risk at the grid centre
    pub proximity_peak: f64,
    /// Seed for the geology noise
    pub geology_seed: u64,
    pub geology_noise_sd: f64,
    pub geology_cap: f64,
    /// Half-width of the excavation strip through the centre (cells)
    pub excavation_half_width: f64,
    /// Offset added to sensor distances before inversion (degrees)
    pub idw_epsilon: f64,
    pub idw_power: i32,
    pub proximity_weight: f64,
    pub geology_weight: f64,
    pub sensor_weight: f64,
    /// Upper bound on a single sensor's point risk
    pub sensor_risk_cap: f64,
    /// Multiplier applied even in dry weather
    pub climate_base: f64,
    pub climate_gain: f64,
    pub climate_weights: ImpactWeights,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cell_size_deg: 0.0004,
            proximity_peak: 0.85,
            geology_seed: 42,
            geology_noise_sd: 0.05,
            geology_cap: 0.6,
            excavation_half_width: 4.0,
            idw_epsilon: 1e-4,
            idw_power: 3,
            proximity_weight: 0.45,
            geology_weight: 0.35,
            sensor_weight: 0.20,
            sensor_risk_cap: 0.9,
            climate_base: 1.1,
            climate_gain: 0.8,
            climate_weights: ImpactWeights::precipitation(),
        }
    }
}

/// One grid cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskGridCell {
    pub id: String,
    pub row: usize,
    pub col: usize,
    pub lat: f64,
    pub lon: f64,
    pub risk_score: f64,
    pub risk_class: RiskClass,
    pub mine_proximity: f64,
    pub geological: f64,
    pub sensor_influence: f64,
}

/// Builds risk grids around a fixed centre
#[derive(Debug, Clone)]
pub struct RiskGridBuilder {
    center: GeoPoint,
    config: GridConfig,
}

impl RiskGridBuilder {
    pub fn new(center: GeoPoint) -> Self {
        Self::with_config(center, GridConfig::default())
    }

    pub fn with_config(center: GeoPoint, config: GridConfig) -> Self {
        Self { center, config }
    }

    pub fn center(&self) -> GeoPoint {
        self.center
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Build an `n` x `n` grid in row-major order.
    ///
    /// Deterministic for identical readings and weather.
    pub fn build(&self, readings: &[SensorReading], weather: &WeatherSnapshot, n: usize) -> Vec<RiskGridCell> {
        let cfg = &self.config;
        let mid = grid_center(n);
        let precipitation_impact = cfg.climate_weights.impact(weather);
        let climate_factor = cfg.climate_base + precipitation_impact * cfg.climate_gain;

        let sensor_points: Vec<(GeoPoint, f64)> = readings
            .iter()
            .map(|r| (r.location, self.sensor_point_risk(r)))
            .collect();

        let mut rng = StdRng::seed_from_u64(cfg.geology_seed);
        let mut cells = Vec::with_capacity(n * n);

        for row in 0..n {
            for col in 0..n {
                let location = GeoPoint::new(
                    self.center.lat + (row as f64 - mid) * cfg.cell_size_deg,
                    self.center.lon + (col as f64 - mid) * cfg.cell_size_deg,
                );

                let proximity = mine_proximity(row, col, n, cfg.proximity_peak);

                let noise: f64 = rng.sample::<f64, _>(StandardNormal) * cfg.geology_noise_sd;
                let zones = geology_zones(row, col, n, cfg.excavation_half_width);
                let geological = (zones + noise).clamp(0.0, cfg.geology_cap);

                let sensor_influence = self.sensor_influence(&location, &sensor_points);

                let base = proximity * cfg.proximity_weight
                    + geological * cfg.geology_weight
                    + sensor_influence * cfg.sensor_weight;
                let risk_score = (base * climate_factor).min(1.0);

                cells.push(RiskGridCell {
                    id: format!("R{}-C{}", row, col),
                    row,
                    col,
                    lat: location.lat,
                    lon: location.lon,
                    risk_score,
                    risk_class: RiskClass::from_score(risk_score),
                    mine_proximity: proximity,
                    geological,
                    sensor_influence,
                });
            }
        }

        tracing::debug!(
            "Built {}x{} risk grid from {} sensors (climate factor {:.3})",
            n,
            n,
            readings.len(),
            climate_factor
        );

        cells
    }

    /// Blended risk of one sensor, capped
    pub fn sensor_point_risk(&self, reading: &SensorReading) -> f64 {
        let v = &reading.values;
        let risk = v.displacement_mm / 10.0 * 0.4 + v.pore_kpa / 50.0 * 0.35 + v.vibration_g / 0.5 * 0.25;
        risk.min(self.config.sensor_risk_cap)
    }

    fn sensor_influence(&self, at: &GeoPoint, sensors: &[(GeoPoint, f64)]) -> f64 {
        let locations: Vec<GeoPoint> = sensors.iter().map(|(p, _)| *p).collect();
        idw_weights(at, &locations, self.config.idw_epsilon, self.config.idw_power)
            .iter()
            .zip(sensors)
            .map(|(w, (_, risk))| w * risk)
            .sum()
    }
}

/// Index of the centre cell, which sits on the site coordinate
fn grid_center(n: usize) -> f64 {
    (n / 2) as f64
}

/// Proximity risk: `peak * exp(-d / d_max)`, `d` measured from the centre
/// cell and `d_max = (n / 2) * sqrt(2)`
pub fn mine_proximity(row: usize, col: usize, n: usize, peak: f64) -> f64 {
    let mid = grid_center(n);
    let max_dist = mid * std::f64::consts::SQRT_2;
    if max_dist <= 0.0 {
        return peak;
    }

    let dist = ((row as f64 - mid).powi(2) + (col as f64 - mid).powi(2)).sqrt();
    peak * (-dist / max_dist).exp()
}

/// Sum of the static geology zone offsets for a cell, before noise
pub fn geology_zones(row: usize, col: usize, n: usize, strip_half_width: f64) -> f64 {
    let mid = grid_center(n);
    let (r, c) = (row as f64, col as f64);
    let mut risk = 0.0;

    // unstable north-west formation
    if r < mid && c < mid {
        risk += 0.35;
    }
    // south-east slope, higher water table
    if r > mid && c > mid {
        risk += 0.30;
    }
    // active excavation strip
    if (r - mid).abs() < strip_half_width || (c - mid).abs() < strip_half_width {
        risk += 0.25;
    }

    risk
}

/// Normalized inverse distance weights, `1 / (d + eps)^power`.
///
/// Empty for no sensors, otherwise summing to 1.
pub fn idw_weights(at: &GeoPoint, sensors: &[GeoPoint], epsilon: f64, power: i32) -> Vec<f64> {
    let raw: Vec<f64> = sensors
        .iter()
        .map(|s| 1.0 / (at.degree_distance(s) + epsilon).powi(power))
        .collect();

    let total: f64 = raw.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return vec![0.0; sensors.len()];
    }

    raw.into_iter().map(|w| w / total).collect()
}
