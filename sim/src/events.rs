//! Event injections
//!
//! Rain raises pore pressure until it is explicitly cleared; a tremor
//! decays exponentially and ends itself once it falls below the
//! vibration floor.

use crate::{Result, SimError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Vibration floor (g). A decayed tremor below this is over.
pub const VIBRATION_FLOOR_G: f64 = 0.001;

/// Decayed vibration above which the ground takes a permanent shift (g)
pub const DAMAGE_THRESHOLD_G: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RainEvent {
    pub intensity: f64,
    pub start_time: DateTime<Utc>,
}

impl RainEvent {
    pub fn new(intensity: f64, start_time: DateTime<Utc>) -> Result<Self> {
        if !intensity.is_finite() || intensity < 0.0 {
            return Err(SimError::InvalidEvent(format!(
                "rain intensity must be a non-negative number, got {}",
                intensity
            )));
        }
        Ok(Self { intensity, start_time })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TremorEvent {
    pub magnitude: f64,
    pub start_time: DateTime<Utc>,
    pub decay_rate: f64,
}

impl TremorEvent {
    pub fn new(magnitude: f64, decay_rate: f64, start_time: DateTime<Utc>) -> Result<Self> {
        if !magnitude.is_finite() || magnitude < 0.0 {
            return Err(SimError::InvalidEvent(format!(
                "tremor magnitude must be a non-negative number, got {}",
                magnitude
            )));
        }
        if !decay_rate.is_finite() || decay_rate <= 0.0 {
            return Err(SimError::InvalidEvent(format!(
                "tremor decay rate must be positive, got {}",
                decay_rate
            )));
        }
        Ok(Self {
            magnitude,
            start_time,
            decay_rate,
        })
    }

    /// Decayed magnitude at `now`: `magnitude * exp(-decay_rate * elapsed)`
    pub fn decayed_at(&self, now: DateTime<Utc>) -> f64 {
        let elapsed = (now - self.start_time).num_milliseconds().max(0) as f64 / 1000.0;
        self.magnitude * (-self.decay_rate * elapsed).exp()
    }
}

/// Tagged event variant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Rain(RainEvent),
    Tremor(TremorEvent),
}

/// Currently active events. At most one per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveEvents {
    pub rain: Option<RainEvent>,
    pub tremor: Option<TremorEvent>,
}

impl ActiveEvents {
    /// Record an event, replacing any active event of the same kind
    pub fn record(&mut self, event: Event) {
        match event {
            Event::Rain(rain) => self.rain = Some(rain),
            Event::Tremor(tremor) => self.tremor = Some(tremor),
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.rain.is_none() && self.tremor.is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.rain
            .map(Event::Rain)
            .into_iter()
            .chain(self.tremor.map(Event::Tremor))
    }
}
