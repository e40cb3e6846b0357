//! Risk Fusion Engine
//!
//! Aggregates the sensor network, the latest visual inspection and the
//! weather into a single assessment, and serves the spatial risk grid.

use crate::climate::ClimateRiskModel;
use crate::grid::{RiskGridBuilder, RiskGridCell};
use crate::history::DisplacementHistory;
use crate::scorer::{
    assess_image, score_features, CrackDetector, FeatureVector, RiskScorer, ScoreOutcome,
    TerrainFeatures,
};
use crate::weather::WeatherProvider;
use crate::{Alert, AlertKind, RiskAssessment, RiskSources, Result, SensorSummary, VisualSummary};
use chrono::{Local, Utc};
use geoguard_sim::{start_ticker, SensorReading, SensorSimulator, SharedSimulator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Configuration for fusion engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    pub displacement_weight: f64,
    pub pore_weight: f64,
    pub vibration_weight: f64,
    pub visual_weight: f64,
    /// Displacement treated as full risk (mm)
    pub displacement_critical_mm: f64,
    /// Pore pressure treated as full risk (kPa)
    pub pore_critical_kpa: f64,
    /// Vibration treated as full risk (g)
    pub vibration_critical_g: f64,
    /// Visual score above which a crack alert is raised
    pub crack_alert_threshold: f64,
    /// Displacement risk above which a ground movement alert is raised
    pub displacement_alert_threshold: f64,
    /// Displacement history span (seconds)
    pub history_window_secs: i64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            displacement_weight: 0.4,
            pore_weight: 0.3,
            vibration_weight: 0.2,
            visual_weight: 0.1,
            displacement_critical_mm: 10.0,
            pore_critical_kpa: 50.0,
            vibration_critical_g: 0.5,
            crack_alert_threshold: 0.8,
            displacement_alert_threshold: 0.8,
            history_window_secs: 3600,
        }
    }
}

impl FusionConfig {
    /// Per-channel maxima over a snapshot. `None` for an empty snapshot.
    pub fn summarize(&self, readings: &[SensorReading]) -> Option<SensorSummary> {
        if readings.is_empty() {
            return None;
        }

        let mut summary = SensorSummary {
            active_sensors: readings.len(),
            max_displacement_mm: 0.0,
            max_pore_kpa: 0.0,
            max_vibration_g: 0.0,
            displacement_risk: 0.0,
            pore_risk: 0.0,
            vibration_risk: 0.0,
        };

        for reading in readings {
            let v = &reading.values;
            summary.max_displacement_mm = summary.max_displacement_mm.max(v.displacement_mm);
            summary.max_pore_kpa = summary.max_pore_kpa.max(v.pore_kpa);
            summary.max_vibration_g = summary.max_vibration_g.max(v.vibration_g);

            summary.displacement_risk = summary
                .displacement_risk
                .max((v.displacement_mm / self.displacement_critical_mm).min(1.0));
            summary.pore_risk = summary
                .pore_risk
                .max((v.pore_kpa / self.pore_critical_kpa).min(1.0));
            summary.vibration_risk = summary
                .vibration_risk
                .max((v.vibration_g / self.vibration_critical_g).min(1.0));
        }

        Some(summary)
    }

    /// Weighted geotechnical risk before weather
    pub fn base_risk(&self, sensors: Option<&SensorSummary>, visual_risk: f64) -> f64 {
        let sensor_risk = sensors.map_or(0.0, |s| {
            s.displacement_risk * self.displacement_weight
                + s.pore_risk * self.pore_weight
                + s.vibration_risk * self.vibration_weight
        });
        sensor_risk + visual_risk * self.visual_weight
    }
}

/// Risk Fusion Engine
pub struct FusionEngine {
    config: FusionConfig,
    simulator: SharedSimulator,
    weather: Arc<dyn WeatherProvider>,
    climate: ClimateRiskModel,
    grid: RiskGridBuilder,
    scorer: Option<Arc<dyn RiskScorer>>,
    crack_detector: Option<Arc<dyn CrackDetector>>,
    visual: RwLock<VisualSummary>,
    history: RwLock<DisplacementHistory>,
}

impl FusionEngine {
    /// Create engine around a simulator. The grid is centred on the
    /// simulator's site.
    pub fn new(simulator: SensorSimulator, weather: Arc<dyn WeatherProvider>) -> Self {
        Self::with_config(simulator, weather, FusionConfig::default())
    }

    pub fn with_config(
        simulator: SensorSimulator,
        weather: Arc<dyn WeatherProvider>,
        config: FusionConfig,
    ) -> Self {
        let site = simulator.config().site;
        let history = DisplacementHistory::new(chrono::Duration::seconds(config.history_window_secs));

        Self {
            config,
            simulator: Arc::new(RwLock::new(simulator)),
            weather,
            climate: ClimateRiskModel::new(),
            grid: RiskGridBuilder::new(site),
            scorer: None,
            crack_detector: None,
            visual: RwLock::new(VisualSummary::default()),
            history: RwLock::new(history),
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn RiskScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn with_crack_detector(mut self, detector: Arc<dyn CrackDetector>) -> Self {
        self.crack_detector = Some(detector);
        self
    }

    pub fn with_climate_model(mut self, climate: ClimateRiskModel) -> Self {
        self.climate = climate;
        self
    }

    pub fn with_grid_builder(mut self, grid: RiskGridBuilder) -> Self {
        self.grid = grid;
        self
    }

    /// Shared handle to the simulation, for triggers and the ticker
    pub fn simulator(&self) -> SharedSimulator {
        self.simulator.clone()
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Advance the simulation one tick and record the readings
    pub async fn advance(&self) -> Vec<SensorReading> {
        let readings = self.simulator.write().await.poll(Local::now());
        self.record_readings(&readings).await;
        readings
    }

    /// Feed readings into the displacement history
    pub async fn record_readings(&self, readings: &[SensorReading]) {
        let recorded = self.history.write().await.record(readings);
        tracing::trace!("Recorded {} displacement samples", recorded);
    }

    /// Current weather-enhanced assessment
    pub async fn current_assessment(&self) -> RiskAssessment {
        // The read guard is dropped before the weather call
        let readings = self.simulator.read().await.snapshot();
        self.record_readings(&readings).await;

        let weather = self.weather.get_weather().await;
        let visual = self.visual.read().await.clone();

        let sensors = self.config.summarize(&readings);
        if sensors.is_none() {
            tracing::debug!("Assessment without sensor readings");
        }

        let base_risk = self.config.base_risk(sensors.as_ref(), visual.risk_score);
        let mut assessment = self.climate.enhance(base_risk, &weather);

        if visual.risk_score > self.config.crack_alert_threshold {
            assessment.alerts.push(Alert::new(
                AlertKind::MajorCrack,
                "CRITICAL: Major crack detected by vision system",
            ));
        }

        if let Some(s) = &sensors {
            if s.displacement_risk > self.config.displacement_alert_threshold {
                assessment.alerts.push(Alert::new(
                    AlertKind::GroundDisplacement,
                    format!(
                        "CRITICAL: Significant ground displacement detected ({:.2}mm)",
                        s.max_displacement_mm
                    ),
                ));
            }
        }

        assessment.sources = Some(RiskSources { sensors, visual });
        assessment
    }

    /// Spatial risk grid of `grid_size` x `grid_size` cells
    pub async fn risk_grid(&self, grid_size: usize) -> Vec<RiskGridCell> {
        let weather = self.weather.get_weather().await;
        let readings = self.simulator.read().await.snapshot();
        self.grid.build(&readings, &weather, grid_size)
    }

    /// Run the crack detector on an image and cache the score
    pub async fn update_visual_risk(&self, image: &[u8]) -> f64 {
        let score = assess_image(self.crack_detector.as_deref(), image);
        self.set_visual_risk(score).await;
        score
    }

    /// Cache a visual risk score from an external inspection
    pub async fn set_visual_risk(&self, score: f64) {
        let score = if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 };

        let mut visual = self.visual.write().await;
        visual.risk_score = score;
        visual.last_check = Some(Utc::now());
        tracing::info!("Visual risk updated: {:.3}", score);
    }

    pub async fn visual_risk(&self) -> VisualSummary {
        self.visual.read().await.clone()
    }

    /// Score a prepared feature vector
    pub fn score(&self, features: &FeatureVector) -> ScoreOutcome {
        score_features(self.scorer.as_deref(), features)
    }

    /// Fuse one sensor's current state, its displacement history and the
    /// given terrain, then score it
    pub async fn score_sensor(&self, sensor_id: &str, terrain: TerrainFeatures) -> Result<ScoreOutcome> {
        let precip_mm_1h = self.weather.get_weather().await.rainfall_1h_mm;

        let reading = {
            let sim = self.simulator.read().await;
            sim.sensor(sensor_id)?.reading(sim.clock())
        };
        let history = self.history.read().await.stats(sensor_id);

        let features = FeatureVector::fuse(&reading, history, terrain, precip_mm_1h);
        Ok(self.score(&features))
    }
}

/// Owner of the running simulation: the engine plus its background tasks
pub struct SimulationContext {
    engine: Arc<FusionEngine>,
    ticker: Option<JoinHandle<()>>,
    recorder: Option<JoinHandle<()>>,
}

impl SimulationContext {
    pub fn new(engine: FusionEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            ticker: None,
            recorder: None,
        }
    }

    pub fn engine(&self) -> Arc<FusionEngine> {
        self.engine.clone()
    }

    /// Start ticking the simulation every `interval`
    pub fn start(&mut self, interval: Duration) {
        if self.is_running() {
            tracing::warn!("Simulation already running");
            return;
        }

        let (ticker, mut rx) = start_ticker(self.engine.simulator(), interval);

        let engine = self.engine.clone();
        let recorder = tokio::spawn(async move {
            while let Some(readings) = rx.recv().await {
                engine.record_readings(&readings).await;
            }
        });

        self.ticker = Some(ticker);
        self.recorder = Some(recorder);
        tracing::info!("Simulation started ({:?} interval)", interval);
    }

    pub fn stop(&mut self) {
        let mut stopped = false;
        for handle in [self.ticker.take(), self.recorder.take()].into_iter().flatten() {
            handle.abort();
            stopped = true;
        }
        if stopped {
            tracing::info!("Simulation stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.ticker.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for SimulationContext {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weather::{FixedWeather, WeatherCondition, WeatherSnapshot};
    use crate::RiskBand;
    use geoguard_sim::{Baseline, GeoPoint, Sensor, SensorCategory, SensorState, SimulatorConfig};

    fn sensor(id: &str, category: SensorCategory, disp: f64, pore: f64, vib: f64) -> Sensor {
        Sensor::new(
            id,
            category,
            GeoPoint::new(11.1022, 79.1563),
            SensorState {
                displacement_mm: disp,
                pore_kpa: pore,
                vibration_g: vib,
                tilt_deg: 0.0,
                temperature_c: 25.0,
            },
            Baseline {
                displacement_mm: disp,
                pore_kpa: pore,
            },
        )
    }

    fn engine(sensors: Vec<Sensor>, weather: WeatherSnapshot) -> FusionEngine {
        let sim = SensorSimulator::from_sensors(SimulatorConfig::default(), sensors, 3).unwrap();
        FusionEngine::new(sim, Arc::new(FixedWeather::new(weather)))
    }

    #[test]
    fn summary_takes_channel_maxima() {
        let config = FusionConfig::default();
        let readings: Vec<SensorReading> = [
            sensor("S01", SensorCategory::Displacement, 12.0, 10.0, 0.001),
            sensor("S02", SensorCategory::PorePressure, 1.0, 25.0, 0.1),
        ]
        .iter()
        .map(|s| s.reading(Utc::now()))
        .collect();

        let summary = config.summarize(&readings).unwrap();
        assert_eq!(summary.active_sensors, 2);
        assert_eq!(summary.max_displacement_mm, 12.0);
        assert_eq!(summary.displacement_risk, 1.0);
        assert!((summary.pore_risk - 0.5).abs() < 1e-12);
        assert!((summary.vibration_risk - 0.2).abs() < 1e-12);

        let base = config.base_risk(Some(&summary), 0.5);
        assert!((base - (0.4 + 0.15 + 0.04 + 0.05)).abs() < 1e-12);

        assert!(config.summarize(&[]).is_none());
        assert!((config.base_risk(None, 0.5) - 0.05).abs() < 1e-12);
    }

    #[tokio::test]
    async fn assessment_reports_sources() {
        let engine = engine(
            vec![sensor("S01", SensorCategory::Displacement, 2.0, 10.0, 0.001)],
            WeatherSnapshot::calm(),
        );
        let assessment = engine.current_assessment().await;

        // 2/10*0.4 + 10/50*0.3 + 0.001/0.5*0.2
        let expected = 0.08 + 0.06 + 0.0004;
        assert!((assessment.base_risk - expected).abs() < 1e-12);
        assert_eq!(assessment.enhanced_risk, assessment.base_risk);
        assert_eq!(assessment.risk_band, RiskBand::Safe);

        let sources = assessment.sources.unwrap();
        assert_eq!(sources.sensors.unwrap().active_sensors, 1);
        assert!(sources.visual.last_check.is_none());
    }

    #[tokio::test]
    async fn critical_sources_raise_alerts() {
        let engine = engine(
            vec![sensor("S01", SensorCategory::Displacement, 9.0, 10.0, 0.001)],
            WeatherSnapshot::calm(),
        );
        engine.set_visual_risk(0.95).await;

        let assessment = engine.current_assessment().await;
        assert!(assessment.has_alert(AlertKind::MajorCrack));
        assert!(assessment.has_alert(AlertKind::GroundDisplacement));
        // source alerts come after the climate alerts
        assert_eq!(assessment.alerts.last().map(|a| a.kind), Some(AlertKind::GroundDisplacement));
    }

    #[tokio::test]
    async fn paused_network_reports_no_sensors() {
        let engine = engine(
            vec![sensor("S01", SensorCategory::Displacement, 9.0, 40.0, 0.3)],
            WeatherSnapshot::calm(),
        );
        engine.simulator().write().await.set_active(false);

        let assessment = engine.current_assessment().await;
        assert_eq!(assessment.base_risk, 0.0);
        assert!(assessment.sources.as_ref().unwrap().sensors.is_none());
        assert!(!assessment.has_alert(AlertKind::GroundDisplacement));
    }

    #[tokio::test]
    async fn grid_uses_precipitation_weights() {
        let storm = WeatherSnapshot {
            rainfall_24h_mm: 50.0,
            condition: WeatherCondition::Thunderstorm,
            humidity_pct: 100.0,
            ..WeatherSnapshot::calm()
        };
        let engine = engine(
            vec![sensor("S01", SensorCategory::Displacement, 1.0, 10.0, 0.001)],
            storm,
        );

        let grid = engine.risk_grid(5).await;
        assert_eq!(grid.len(), 25);
        assert_eq!(grid, engine.risk_grid(5).await);
    }

    #[tokio::test]
    async fn visual_risk_is_clamped() {
        let engine = engine(vec![], WeatherSnapshot::calm());

        engine.set_visual_risk(3.0).await;
        assert_eq!(engine.visual_risk().await.risk_score, 1.0);

        let score = engine.update_visual_risk(b"frame").await;
        assert!((0.0..1.0).contains(&score));
        assert!(engine.visual_risk().await.last_check.is_some());
    }

    #[tokio::test]
    async fn sensor_scoring_uses_history() {
        let scorer = |f: &FeatureVector| -> anyhow::Result<f64> { Ok(f.disp_1h_mean / 10.0) };
        let engine = engine(
            vec![sensor("S01", SensorCategory::Displacement, 5.0, 10.0, 0.001)],
            WeatherSnapshot::calm(),
        )
        .with_scorer(Arc::new(scorer));

        for _ in 0..5 {
            engine.advance().await;
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let outcome = engine.score_sensor("S01", TerrainFeatures::default()).await.unwrap();
        assert!(outcome.note.is_none());
        assert!(outcome.risk_score > 0.3 && outcome.risk_score < 0.7);

        assert!(engine.score_sensor("S99", TerrainFeatures::default()).await.is_err());
    }

    #[tokio::test]
    async fn every_category_feeds_displacement_history() {
        let scorer = |f: &FeatureVector| -> anyhow::Result<f64> { Ok(f.disp_1h_std) };
        let sensors = vec![sensor("S01", SensorCategory::Tilt, 1.0, 10.0, 0.001)];
        let sim = SensorSimulator::from_sensors(SimulatorConfig::default(), sensors, 4).unwrap();
        let engine = FusionEngine::new(sim, Arc::new(FixedWeather::new(WeatherSnapshot::calm())))
            .with_scorer(Arc::new(scorer));

        engine.simulator().write().await.trigger_tremor(0.8, 0.5).unwrap();
        for _ in 0..5 {
            engine.advance().await;
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let outcome = engine.score_sensor("S01", TerrainFeatures::default()).await.unwrap();
        assert!(outcome.risk_score > 0.0);
    }

    #[tokio::test]
    async fn context_starts_and_stops() {
        let engine = engine(
            vec![sensor("S01", SensorCategory::Displacement, 1.0, 10.0, 0.001)],
            WeatherSnapshot::calm(),
        );
        let mut context = SimulationContext::new(engine);

        context.start(Duration::from_millis(10));
        assert!(context.is_running());
        tokio::time::sleep(Duration::from_millis(50)).await;

        context.stop();
        tokio::task::yield_now().await;
        assert!(!context.is_running());
    }
}
