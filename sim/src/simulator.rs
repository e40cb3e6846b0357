//! Sensor physics simulator
//!
//! Every call to [`SensorSimulator::advance`] moves each sensor one tick
//! forward: Brownian drift, the day/night cycle, then whatever rain or
//! tremor events are active.

use crate::events::{
    ActiveEvents, Event, RainEvent, TremorEvent, DAMAGE_THRESHOLD_G, VIBRATION_FLOOR_G,
};
use crate::{Baseline, GeoPoint, Result, Sensor, SensorCategory, SensorReading, SensorState, SimError};
use chrono::{DateTime, Local, TimeZone, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

/// Mean site temperature (°C)
const BASE_TEMPERATURE_C: f64 = 25.0;
/// Daily temperature swing (± °C)
const TEMPERATURE_AMPLITUDE_C: f64 = 10.0;
/// Daily pore pressure swing (± kPa), applied as a slow per-tick term
const PORE_CYCLE_AMPLITUDE_KPA: f64 = 10.0;
/// Hour of the daily peak
const PEAK_HOUR: f64 = 14.0;

/// Probability that rain nudges a displacement sensor on a given tick
const RAIN_DISPLACEMENT_PROBABILITY: f64 = 0.3;

/// Simulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Number of sensors to place
    pub sensor_count: usize,
    /// Site reference point
    pub site: GeoPoint,
    /// Maximum placement offset from the site point (degrees)
    pub placement_jitter_deg: f64,
    /// Displacement drift standard deviation per tick (mm)
    pub displacement_drift_sd: f64,
    /// Pore pressure drift standard deviation per tick (kPa)
    pub pore_drift_sd: f64,
    /// Fraction of the gap to the baseline closed each tick (0 = pure random walk)
    pub reversion_rate: f64,
    /// Decay rate used when a tremor is triggered without one (1/s)
    pub default_tremor_decay: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            sensor_count: 10,
            site: GeoPoint::new(11.102222, 79.156389),
            placement_jitter_deg: 0.001,
            displacement_drift_sd: 0.05,
            pore_drift_sd: 0.5,
            reversion_rate: 0.0,
            default_tremor_decay: 0.5,
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.reversion_rate) {
            return Err(SimError::InvalidConfig(format!(
                "reversion_rate must be within [0, 1], got {}",
                self.reversion_rate
            )));
        }
        if self.displacement_drift_sd < 0.0 || self.pore_drift_sd < 0.0 {
            return Err(SimError::InvalidConfig(
                "drift standard deviations must be non-negative".to_string(),
            ));
        }
        if self.placement_jitter_deg < 0.0 {
            return Err(SimError::InvalidConfig(
                "placement_jitter_deg must be non-negative".to_string(),
            ));
        }
        if !self.default_tremor_decay.is_finite() || self.default_tremor_decay <= 0.0 {
            return Err(SimError::InvalidConfig(
                "default_tremor_decay must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Tremor contribution for one tick, shared by every sensor
#[derive(Debug, Clone, Copy)]
enum TremorTick {
    Quiet,
    Shaking(f64),
    Ended,
}

/// Day/night phase in [-1, 1]: +1 at 14:00, -1 at 02:00 in `t`'s own zone
pub fn daily_phase<Tz: TimeZone>(t: &DateTime<Tz>) -> f64 {
    let hours = t.hour() as f64 + t.minute() as f64 / 60.0 + t.second() as f64 / 3600.0;
    (2.0 * PI * (hours - PEAK_HOUR) / 24.0).cos()
}

/// Per-sensor stochastic state machine
pub struct SensorSimulator {
    config: SimulatorConfig,
    sensors: Vec<Sensor>,
    events: ActiveEvents,
    active: bool,
    last_tick: Option<DateTime<Utc>>,
    rng: StdRng,
}

impl SensorSimulator {
    /// Create simulator with randomly placed sensors
    pub fn new(config: SimulatorConfig) -> Result<Self> {
        Self::build(config, StdRng::from_entropy())
    }

    /// Create simulator with a reproducible random stream
    pub fn with_seed(config: SimulatorConfig, seed: u64) -> Result<Self> {
        Self::build(config, StdRng::seed_from_u64(seed))
    }

    /// Create simulator over an explicit sensor set
    pub fn from_sensors(config: SimulatorConfig, sensors: Vec<Sensor>, seed: u64) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            sensors,
            events: ActiveEvents::default(),
            active: true,
            last_tick: None,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    fn build(config: SimulatorConfig, mut rng: StdRng) -> Result<Self> {
        config.validate()?;
        let sensors = (0..config.sensor_count)
            .map(|i| Self::place_sensor(&config, &mut rng, i))
            .collect::<Vec<_>>();

        tracing::info!(
            "Sensor simulator initialized with {} sensors around ({:.6}, {:.6})",
            sensors.len(),
            config.site.lat,
            config.site.lon
        );

        Ok(Self {
            config,
            sensors,
            events: ActiveEvents::default(),
            active: true,
            last_tick: None,
            rng,
        })
    }

    fn place_sensor(config: &SimulatorConfig, rng: &mut StdRng, index: usize) -> Sensor {
        let category = SensorCategory::ALL[rng.gen_range(0..SensorCategory::ALL.len())];
        let jitter = config.placement_jitter_deg;
        let (dlat, dlon) = if jitter > 0.0 {
            (rng.gen_range(-jitter..=jitter), rng.gen_range(-jitter..=jitter))
        } else {
            (0.0, 0.0)
        };

        let state = SensorState {
            displacement_mm: rng.gen_range(0.0..0.5),
            pore_kpa: rng.gen_range(5.0..15.0),
            vibration_g: VIBRATION_FLOOR_G,
            tilt_deg: rng.gen_range(0.0..0.1),
            temperature_c: BASE_TEMPERATURE_C,
        };
        let baseline = Baseline {
            displacement_mm: rng.gen_range(0.0..0.5),
            pore_kpa: rng.gen_range(5.0..15.0),
        };

        Sensor::new(
            &format!("S{:02}", index + 1),
            category,
            GeoPoint::new(config.site.lat + dlat, config.site.lon + dlon),
            state,
            baseline,
        )
    }

    /// Advance every sensor by one tick
    pub fn advance<Tz: TimeZone>(&mut self, now: DateTime<Tz>) {
        if !self.active {
            return;
        }

        let phase = daily_phase(&now);
        let now = now.with_timezone(&Utc);
        self.anchor_events(now);

        let tremor = match self.events.tremor {
            Some(tremor) => {
                let decayed = tremor.decayed_at(now);
                if decayed < VIBRATION_FLOOR_G {
                    self.events.tremor = None;
                    tracing::info!("Tremor subsided (magnitude {:.3}g)", tremor.magnitude);
                    TremorTick::Ended
                } else {
                    TremorTick::Shaking(decayed)
                }
            }
            None => TremorTick::Quiet,
        };
        let rain = self.events.rain.map(|r| r.intensity);

        let Self {
            config,
            sensors,
            rng,
            ..
        } = self;

        for sensor in sensors.iter_mut() {
            let baseline = sensor.baseline();
            let state = &mut sensor.state;

            // Brownian drift
            let dz: f64 = rng.sample(StandardNormal);
            let pz: f64 = rng.sample(StandardNormal);
            state.displacement_mm += dz * config.displacement_drift_sd;
            state.pore_kpa += pz * config.pore_drift_sd;

            if config.reversion_rate > 0.0 {
                state.displacement_mm +=
                    config.reversion_rate * (baseline.displacement_mm - state.displacement_mm);
                state.pore_kpa += config.reversion_rate * (baseline.pore_kpa - state.pore_kpa);
            }

            // Daily cycle: evaporation by day, recharge by night
            state.temperature_c = BASE_TEMPERATURE_C + TEMPERATURE_AMPLITUDE_C * phase;
            state.pore_kpa += -phase * PORE_CYCLE_AMPLITUDE_KPA * 0.1 * 0.01;

            if let Some(intensity) = rain {
                state.pore_kpa += intensity * 0.05 * rng.gen::<f64>();

                if sensor.category == SensorCategory::Displacement
                    && rng.gen_bool(RAIN_DISPLACEMENT_PROBABILITY)
                {
                    state.displacement_mm += intensity * 0.001;
                }
            }

            match tremor {
                TremorTick::Shaking(decayed) => {
                    state.vibration_g = decayed + rng.gen_range(0.0..0.002);

                    // Residual ground shift, never undone
                    if decayed > DAMAGE_THRESHOLD_G {
                        state.displacement_mm += decayed * 0.1;
                        state.tilt_deg += decayed * 0.05;
                    }
                }
                TremorTick::Ended => state.vibration_g = VIBRATION_FLOOR_G,
                TremorTick::Quiet => state.vibration_g = rng.gen_range(0.0005..0.0015),
            }

            state.displacement_mm = state.displacement_mm.max(0.0);
            state.pore_kpa = state.pore_kpa.max(0.0);
        }

        self.last_tick = Some(now);

        tracing::trace!(
            sensors = self.sensors.len(),
            rain = rain.is_some(),
            phase,
            "Simulation advanced"
        );
    }

    /// Events stamped ahead of the tick clock start on this tick
    fn anchor_events(&mut self, now: DateTime<Utc>) {
        if let Some(rain) = self.events.rain.as_mut() {
            rain.start_time = rain.start_time.min(now);
        }
        if let Some(tremor) = self.events.tremor.as_mut() {
            tremor.start_time = tremor.start_time.min(now);
        }
    }

    /// Simulation clock: the last tick, or wall time before the first one
    pub fn clock(&self) -> DateTime<Utc> {
        self.last_tick.unwrap_or_else(Utc::now)
    }

    /// Current readings without advancing. Empty while the master switch is off.
    pub fn snapshot(&self) -> Vec<SensorReading> {
        if !self.active {
            return Vec::new();
        }

        let timestamp = self.clock();
        self.sensors.iter().map(|s| s.reading(timestamp)).collect()
    }

    /// Advance then snapshot
    pub fn poll<Tz: TimeZone>(&mut self, now: DateTime<Tz>) -> Vec<SensorReading> {
        self.advance(now);
        self.snapshot()
    }

    /// Record an event, replacing any active event of the same kind
    pub fn trigger(&mut self, event: Event) {
        match &event {
            Event::Rain(rain) => {
                tracing::info!("Rain started (intensity: {})", rain.intensity);
            }
            Event::Tremor(tremor) => {
                tracing::info!(
                    "Tremor triggered (magnitude: {}g, decay: {}/s)",
                    tremor.magnitude,
                    tremor.decay_rate
                );
            }
        }
        self.events.record(event);
    }

    /// Start rain on the simulation clock
    pub fn trigger_rain(&mut self, intensity: f64) -> Result<()> {
        let rain = RainEvent::new(intensity, self.clock())?;
        self.trigger(Event::Rain(rain));
        Ok(())
    }

    pub fn stop_rain(&mut self) {
        if self.events.rain.take().is_some() {
            tracing::info!("Rain stopped");
        }
    }

    /// Start a tremor on the simulation clock
    pub fn trigger_tremor(&mut self, magnitude: f64, decay_rate: f64) -> Result<()> {
        let tremor = TremorEvent::new(magnitude, decay_rate, self.clock())?;
        self.trigger(Event::Tremor(tremor));
        Ok(())
    }

    /// Start a tremor with the configured decay rate
    pub fn trigger_default_tremor(&mut self, magnitude: f64) -> Result<()> {
        self.trigger_tremor(magnitude, self.config.default_tremor_decay)
    }

    /// Master switch. Turning it off freezes state and events in place.
    pub fn set_active(&mut self, active: bool) {
        if self.active != active {
            tracing::info!("Sensor network {}", if active { "resumed" } else { "paused" });
        }
        self.active = active;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn active_events(&self) -> ActiveEvents {
        self.events
    }

    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    pub fn sensor(&self, id: &str) -> Result<&Sensor> {
        self.sensors
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| SimError::SensorNotFound(id.to_string()))
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }
}

/// Simulator shared between the ticker and request handlers
pub type SharedSimulator = Arc<RwLock<SensorSimulator>>;

/// Start advancing the simulation on a fixed interval.
///
/// Each tick's readings are sent on the returned channel. The task ends
/// when the receiver is dropped or the handle is aborted.
pub fn start_ticker(
    simulator: SharedSimulator,
    interval: Duration,
) -> (JoinHandle<()>, mpsc::Receiver<Vec<SensorReading>>) {
    let (tx, rx) = mpsc::channel(64);

    let handle = tokio::spawn(async move {
        let mut interval_timer = tokio::time::interval(interval);

        loop {
            interval_timer.tick().await;

            // Release the write lock before awaiting the send
            let readings = {
                let mut sim = simulator.write().await;
                sim.poll(Local::now())
            };

            if tx.send(readings).await.is_err() {
                tracing::debug!("Reading receiver dropped, stopping ticker");
                return;
            }
        }
    });

    (handle, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn sensor(id: &str, category: SensorCategory) -> Sensor {
        Sensor::new(
            id,
            category,
            GeoPoint::new(11.1022, 79.1563),
            SensorState {
                displacement_mm: 0.2,
                pore_kpa: 10.0,
                vibration_g: VIBRATION_FLOOR_G,
                tilt_deg: 0.05,
                temperature_c: 25.0,
            },
            Baseline {
                displacement_mm: 0.2,
                pore_kpa: 10.0,
            },
        )
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap()
    }

    #[test]
    fn daily_phase_peaks_at_two_pm() {
        assert!((daily_phase(&at(14)) - 1.0).abs() < 1e-9);
        assert!((daily_phase(&at(2)) + 1.0).abs() < 1e-9);
        assert!(daily_phase(&at(8)).abs() < 1e-9);
    }

    #[test]
    fn temperature_follows_daily_cycle() {
        let mut sim = SensorSimulator::with_seed(SimulatorConfig::default(), 7).unwrap();

        sim.advance(at(14));
        assert!(sim.sensors().iter().all(|s| (s.state.temperature_c - 35.0).abs() < 1e-9));

        sim.advance(at(2));
        assert!(sim.sensors().iter().all(|s| (s.state.temperature_c - 15.0).abs() < 1e-9));
    }

    #[test]
    fn default_network_has_ten_numbered_sensors() {
        let sim = SensorSimulator::with_seed(SimulatorConfig::default(), 1).unwrap();
        let ids: Vec<_> = sim.sensors().iter().map(|s| s.id.as_str()).collect();

        assert_eq!(ids.len(), 10);
        assert_eq!(ids[0], "S01");
        assert_eq!(ids[9], "S10");

        let site = sim.config().site;
        for s in sim.sensors() {
            assert!((s.location.lat - site.lat).abs() <= 0.001 + 1e-12);
            assert!((s.location.lon - site.lon).abs() <= 0.001 + 1e-12);
        }
    }

    #[test]
    fn displacement_and_pore_never_negative() {
        let config = SimulatorConfig {
            displacement_drift_sd: 2.0,
            pore_drift_sd: 20.0,
            ..Default::default()
        };
        let mut sim = SensorSimulator::with_seed(config, 99).unwrap();
        let start = at(0);

        for tick in 0..2000 {
            sim.advance(start + ChronoDuration::seconds(tick));
            for s in sim.sensors() {
                assert!(s.state.displacement_mm >= 0.0);
                assert!(s.state.pore_kpa >= 0.0);
            }
        }
    }

    #[test]
    fn tremor_decays_then_deactivates() {
        let mut sim = SensorSimulator::from_sensors(
            SimulatorConfig::default(),
            vec![sensor("S01", SensorCategory::Vibration)],
            3,
        )
        .unwrap();
        let t0 = at(10);
        sim.trigger(Event::Tremor(TremorEvent::new(0.8, 0.5, t0).unwrap()));

        sim.advance(t0);
        let first = sim.sensors()[0].state.vibration_g;
        assert!((first - 0.8).abs() <= 0.002 + 1e-12);

        let mut previous = first;
        let mut seconds = 1;
        while sim.active_events().tremor.is_some() {
            sim.advance(t0 + ChronoDuration::seconds(seconds));
            let v = sim.sensors()[0].state.vibration_g;
            // Noise band is 0.002g
            assert!(v <= previous + 0.002, "vibration rose from {} to {}", previous, v);
            previous = v;
            seconds += 1;
            assert!(seconds < 60, "tremor never ended");
        }

        // 0.8 * exp(-0.5 t) < 0.001 once t > ~13.4s
        assert!(seconds >= 14);
        assert_eq!(sim.sensors()[0].state.vibration_g, VIBRATION_FLOOR_G);

        sim.advance(t0 + ChronoDuration::seconds(seconds));
        let background = sim.sensors()[0].state.vibration_g;
        assert!((0.0005..0.0015).contains(&background));
    }

    #[test]
    fn strong_tremor_leaves_permanent_shift() {
        let config = SimulatorConfig {
            displacement_drift_sd: 0.0,
            pore_drift_sd: 0.0,
            ..Default::default()
        };
        let mut sim =
            SensorSimulator::from_sensors(config, vec![sensor("S01", SensorCategory::Tilt)], 5)
                .unwrap();
        let t0 = at(9);
        sim.trigger(Event::Tremor(TremorEvent::new(1.0, 0.5, t0).unwrap()));

        sim.advance(t0);
        let s = &sim.sensors()[0].state;
        assert!((s.displacement_mm - (0.2 + 0.1)).abs() < 1e-9);
        assert!((s.tilt_deg - (0.05 + 0.05)).abs() < 1e-9);

        // Shift survives after the tremor is gone
        sim.advance(t0 + ChronoDuration::seconds(120));
        assert!(sim.active_events().tremor.is_none());
        assert!(sim.sensors()[0].state.displacement_mm >= 0.3 - 1e-9);
    }

    #[test]
    fn rain_raises_pore_pressure_until_stopped() {
        let config = SimulatorConfig {
            displacement_drift_sd: 0.0,
            pore_drift_sd: 0.0,
            ..Default::default()
        };
        let mut sim = SensorSimulator::from_sensors(
            config,
            vec![sensor("S01", SensorCategory::PorePressure)],
            11,
        )
        .unwrap();
        sim.trigger_rain(50.0).unwrap();

        // 08:00 has zero daily phase, so only rain moves pore pressure
        let t0 = at(8);
        for i in 0..50 {
            sim.advance(t0 + ChronoDuration::milliseconds(i));
        }
        let wet = sim.sensors()[0].state.pore_kpa;
        assert!(wet > 10.0 + 10.0, "pore pressure only reached {}", wet);

        sim.stop_rain();
        assert!(sim.active_events().rain.is_none());
        sim.advance(t0);
        assert!((sim.sensors()[0].state.pore_kpa - wet).abs() < 1e-6);
    }

    #[test]
    fn invalid_trigger_leaves_state_untouched() {
        let mut sim = SensorSimulator::with_seed(SimulatorConfig::default(), 2).unwrap();
        sim.trigger_rain(5.0).unwrap();
        let before = sim.active_events();

        assert!(sim.trigger_rain(-1.0).is_err());
        assert!(sim.trigger_tremor(-0.2, 0.5).is_err());
        assert!(sim.trigger_tremor(0.2, -0.5).is_err());
        assert_eq!(sim.active_events(), before);
    }

    #[test]
    fn retrigger_restarts_tremor_clock() {
        let mut sim = SensorSimulator::with_seed(SimulatorConfig::default(), 4).unwrap();
        let t0 = at(12);
        sim.trigger(Event::Tremor(TremorEvent::new(0.3, 0.5, t0).unwrap()));
        let t1 = t0 + ChronoDuration::seconds(5);
        sim.trigger(Event::Tremor(TremorEvent::new(0.6, 0.2, t1).unwrap()));

        let tremor = sim.active_events().tremor.unwrap();
        assert_eq!(tremor.magnitude, 0.6);
        assert_eq!(tremor.decay_rate, 0.2);
        assert_eq!(tremor.start_time, t1);
    }

    #[test]
    fn master_switch_freezes_state() {
        let mut sim = SensorSimulator::with_seed(SimulatorConfig::default(), 8).unwrap();
        sim.advance(at(6));
        sim.trigger_rain(3.0).unwrap();
        let frozen = sim.snapshot();
        assert_eq!(frozen.len(), 10);

        sim.set_active(false);
        assert!(sim.snapshot().is_empty());
        sim.advance(at(7));
        sim.advance(at(8));

        sim.set_active(true);
        assert_eq!(sim.snapshot(), frozen);
        assert!(sim.active_events().rain.is_some());
    }

    #[test]
    fn unknown_sensor_is_an_error() {
        let sim = SensorSimulator::with_seed(SimulatorConfig::default(), 1).unwrap();
        assert!(sim.sensor("S01").is_ok());
        assert!(matches!(sim.sensor("X99"), Err(SimError::SensorNotFound(_))));
    }

    #[test]
    fn config_validation() {
        assert!(SimulatorConfig::default().validate().is_ok());
        let bad = SimulatorConfig {
            reversion_rate: 1.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        assert!(matches!(
            SensorSimulator::with_seed(bad, 1),
            Err(SimError::InvalidConfig(_))
        ));
    }

    #[test]
    fn tremor_decays_on_a_clock_behind_wall_time() {
        let config = SimulatorConfig {
            displacement_drift_sd: 0.0,
            pore_drift_sd: 0.0,
            ..Default::default()
        };
        let mut sim =
            SensorSimulator::from_sensors(config, vec![sensor("S01", SensorCategory::Tilt)], 6)
                .unwrap();
        sim.trigger_tremor(0.8, 0.5).unwrap();

        let t0 = at(10);
        for s in 0..600 {
            sim.advance(t0 + ChronoDuration::seconds(s));
        }

        assert!(sim.active_events().tremor.is_none());
        assert!(sim.sensors()[0].state.vibration_g < 0.0015);
        // 0.8g decays past 0.05g within six ticks, so the shift stays bounded
        assert!(sim.sensors()[0].state.displacement_mm < 0.2 + 0.5);
    }

    #[test]
    fn trigger_after_tick_uses_tick_clock() {
        let mut sim = SensorSimulator::with_seed(SimulatorConfig::default(), 12).unwrap();
        sim.advance(at(3));
        sim.trigger_tremor(0.4, 0.5).unwrap();
        sim.trigger_rain(2.0).unwrap();

        let events = sim.active_events();
        assert_eq!(events.tremor.map(|t| t.start_time), Some(at(3)));
        assert_eq!(events.rain.map(|r| r.start_time), Some(at(3)));
    }

    #[tokio::test]
    async fn ticker_publishes_readings() {
        let sim = SensorSimulator::with_seed(SimulatorConfig::default(), 21).unwrap();
        let sim: SharedSimulator = Arc::new(RwLock::new(sim));
        let (handle, mut rx) = start_ticker(sim.clone(), Duration::from_millis(5));

        let readings = rx.recv().await.unwrap();
        assert_eq!(readings.len(), 10);

        handle.abort();
    }
}
