//! Climate Risk Model
//!
//! Turns a weather snapshot and a base geotechnical risk into an enhanced
//! risk. Rain matters more when the slope is already stressed, so the
//! weather impact is scaled by a multiplier that grows with the base risk.

use crate::weather::{WeatherCondition, WeatherSnapshot};
use crate::{Alert, AlertKind, RiskAssessment, RiskBand};
use chrono::Utc;
use serde::{Deserialize, Serialize};

// Normalization spans
const RAINFALL_24H_SPAN_MM: f64 = 50.0;
const RAINFALL_72H_SPAN_MM: f64 = 100.0;
const INTENSITY_SPAN_MM_PER_H: f64 = 25.0;
const HUMIDITY_ONSET_PCT: f64 = 70.0;
const HUMIDITY_SPAN_PCT: f64 = 25.0;
const WIND_SPAN_MPS: f64 = 25.0;

// Alert and impact factor thresholds
const HEAVY_RAIN_24H_MM: f64 = 30.0;
const MODERATE_RAIN_24H_MM: f64 = 15.0;
const SATURATION_72H_MM: f64 = 60.0;
const CRITICAL_INTENSITY_MM_PER_H: f64 = 20.0;
const HIGH_INTENSITY_MM_PER_H: f64 = 12.0;

/// Per-factor weights of the weather impact
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpactWeights {
    pub rainfall_24h: f64,
    pub rainfall_72h: f64,
    pub intensity: f64,
    pub conditions: f64,
    pub humidity_wind: f64,
}

impl ImpactWeights {
    /// All five factors. Used by the scalar assessment.
    pub const fn full() -> Self {
        Self {
            rainfall_24h: 0.35,
            rainfall_72h: 0.25,
            intensity: 0.20,
            conditions: 0.10,
            humidity_wind: 0.10,
        }
    }

    /// Precipitation and sky condition only. Used by the risk grid.
    pub const fn precipitation() -> Self {
        Self {
            humidity_wind: 0.0,
            ..Self::full()
        }
    }

    /// Weighted contribution of each normalized factor
    pub fn breakdown(&self, factors: &ImpactFactors) -> ImpactBreakdown {
        ImpactBreakdown {
            rainfall_24h: factors.rainfall_24h * self.rainfall_24h,
            rainfall_72h: factors.rainfall_72h * self.rainfall_72h,
            intensity: factors.intensity * self.intensity,
            conditions: factors.conditions * self.conditions,
            humidity_wind: factors.humidity_wind * self.humidity_wind,
        }
    }

    /// Weather impact of a snapshot under these weights
    pub fn impact(&self, weather: &WeatherSnapshot) -> f64 {
        self.breakdown(&ImpactFactors::from_weather(weather)).total()
    }
}

impl Default for ImpactWeights {
    fn default() -> Self {
        Self::full()
    }
}

/// Weather factors normalized to [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpactFactors {
    pub rainfall_24h: f64,
    pub rainfall_72h: f64,
    pub intensity: f64,
    pub conditions: f64,
    pub humidity_wind: f64,
}

impl ImpactFactors {
    pub fn from_weather(weather: &WeatherSnapshot) -> Self {
        let humidity = ((weather.humidity_pct - HUMIDITY_ONSET_PCT) / HUMIDITY_SPAN_PCT).clamp(0.0, 1.0);
        let wind = (weather.wind_speed_mps / WIND_SPAN_MPS).clamp(0.0, 1.0);

        Self {
            rainfall_24h: unit(weather.rainfall_24h_mm / RAINFALL_24H_SPAN_MM),
            rainfall_72h: unit(weather.rainfall_72h_mm / RAINFALL_72H_SPAN_MM),
            intensity: unit(weather.max_rain_intensity_mm_per_h / INTENSITY_SPAN_MM_PER_H),
            conditions: weather.condition.severity(),
            humidity_wind: (humidity + wind) / 2.0,
        }
    }
}

fn unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Per-factor contributions to the weather impact
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpactBreakdown {
    pub rainfall_24h: f64,
    pub rainfall_72h: f64,
    pub intensity: f64,
    pub conditions: f64,
    pub humidity_wind: f64,
}

impl ImpactBreakdown {
    pub fn total(&self) -> f64 {
        self.rainfall_24h + self.rainfall_72h + self.intensity + self.conditions + self.humidity_wind
    }
}

/// How strongly weather moves a given base risk
pub fn risk_multiplier(base_risk: f64) -> f64 {
    match base_risk {
        r if r >= 0.7 => 0.6,
        r if r >= 0.5 => 0.4,
        r if r >= 0.3 => 0.3,
        _ => 0.2,
    }
}

/// Weather amplification of a base risk
#[derive(Debug, Clone, Default)]
pub struct ClimateRiskModel {
    weights: ImpactWeights,
}

impl ClimateRiskModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: ImpactWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ImpactWeights {
        &self.weights
    }

    /// Enhance `base_risk` with the weather's impact
    pub fn enhance(&self, base_risk: f64, weather: &WeatherSnapshot) -> RiskAssessment {
        let factors = ImpactFactors::from_weather(weather);
        let breakdown = self.weights.breakdown(&factors);
        let weather_impact = breakdown.total();
        let multiplier = risk_multiplier(base_risk);

        let enhanced_risk = (base_risk + weather_impact * multiplier).clamp(0.0, 1.0);

        tracing::debug!(
            "Climate enhancement: base {:.3} + impact {:.3} x {:.1} = {:.3}",
            base_risk,
            weather_impact,
            multiplier,
            enhanced_risk
        );

        RiskAssessment {
            base_risk,
            enhanced_risk,
            weather_impact,
            risk_multiplier: multiplier,
            risk_band: RiskBand::from_score(enhanced_risk),
            impact_breakdown: breakdown,
            impact_factors: impact_factors(weather),
            alerts: generate_alerts(enhanced_risk, weather),
            weather: weather.clone(),
            sources: None,
            timestamp: Utc::now(),
        }
    }
}

/// Alerts in reporting order: risk band, rainfall, intensity, lightning
pub fn generate_alerts(risk: f64, weather: &WeatherSnapshot) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if risk >= 0.8 {
        alerts.push(Alert::new(
            AlertKind::Evacuate,
            "CRITICAL: Weather exacerbating high risk - EVACUATE all personnel",
        ));
    } else if risk >= 0.6 {
        alerts.push(Alert::new(
            AlertKind::SuspendOperations,
            "HIGH: Suspend blasting and excavation due to weather/ground conditions",
        ));
    } else if risk >= 0.4 {
        alerts.push(Alert::new(
            AlertKind::EnhancedMonitoring,
            "MEDIUM: Enhanced monitoring, hourly slope and drainage inspections",
        ));
    }

    let rain_24h = weather.rainfall_24h_mm;
    if rain_24h > HEAVY_RAIN_24H_MM {
        alerts.push(Alert::new(
            AlertKind::HeavyRain,
            format!("Heavy rain ({}mm in 24h) - monitor drainage", rain_24h),
        ));
    } else if rain_24h > MODERATE_RAIN_24H_MM {
        alerts.push(Alert::new(
            AlertKind::ModerateRain,
            format!("Rain ({}mm in 24h) - check drainage", rain_24h),
        ));
    }

    let intensity = weather.max_rain_intensity_mm_per_h;
    if intensity > CRITICAL_INTENSITY_MM_PER_H {
        alerts.push(Alert::new(
            AlertKind::CriticalIntensity,
            format!("Critical rain intensity ({}mm/h) - high erosion risk", intensity),
        ));
    } else if intensity > HIGH_INTENSITY_MM_PER_H {
        alerts.push(Alert::new(
            AlertKind::HighIntensity,
            format!("High rain intensity ({}mm/h) - erosion concern", intensity),
        ));
    }

    if weather.condition == WeatherCondition::Thunderstorm {
        alerts.push(Alert::new(
            AlertKind::Lightning,
            "Lightning: secure equipment and avoid high points",
        ));
    }

    alerts
}

/// Weather conditions worth naming as risk drivers
pub fn impact_factors(weather: &WeatherSnapshot) -> Vec<String> {
    let mut factors = Vec::new();

    if weather.rainfall_24h_mm > HEAVY_RAIN_24H_MM {
        factors.push(format!("Heavy rainfall ({}mm in 24h)", weather.rainfall_24h_mm));
    } else if weather.rainfall_24h_mm > MODERATE_RAIN_24H_MM {
        factors.push(format!("Moderate rainfall ({}mm in 24h)", weather.rainfall_24h_mm));
    }

    if weather.rainfall_72h_mm > SATURATION_72H_MM {
        factors.push(format!(
            "High cumulative rainfall ({}mm in 72h)",
            weather.rainfall_72h_mm
        ));
    }

    if weather.max_rain_intensity_mm_per_h > CRITICAL_INTENSITY_MM_PER_H {
        factors.push(format!(
            "Critical rain intensity ({}mm/h)",
            weather.max_rain_intensity_mm_per_h
        ));
    } else if weather.max_rain_intensity_mm_per_h > HIGH_INTENSITY_MM_PER_H {
        factors.push(format!(
            "High rain intensity ({}mm/h)",
            weather.max_rain_intensity_mm_per_h
        ));
    }

    if weather.condition == WeatherCondition::Thunderstorm {
        factors.push("Thunderstorm conditions".to_string());
    }

    factors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weather(rain_24h: f64, rain_72h: f64, intensity: f64, condition: WeatherCondition) -> WeatherSnapshot {
        WeatherSnapshot {
            rainfall_24h_mm: rain_24h,
            rainfall_72h_mm: rain_72h,
            max_rain_intensity_mm_per_h: intensity,
            condition,
            ..WeatherSnapshot::calm()
        }
    }

    #[test]
    fn calm_weather_leaves_risk_unchanged() {
        let model = ClimateRiskModel::new();
        let assessment = model.enhance(0.2, &WeatherSnapshot::calm());

        assert_eq!(assessment.weather_impact, 0.0);
        assert_eq!(assessment.enhanced_risk, assessment.base_risk);
        assert!(assessment.alerts.iter().all(|a| a.kind.is_risk_band()));
        assert!(assessment.alerts.is_empty());
        assert!(assessment.impact_factors.is_empty());
    }

    #[test]
    fn storm_on_high_risk_clamps_to_one() {
        let model = ClimateRiskModel::new();
        let storm = weather(60.0, 0.0, 0.0, WeatherCondition::Thunderstorm);
        let assessment = model.enhance(0.9, &storm);

        assert_eq!(assessment.enhanced_risk, 1.0);
        assert_eq!(assessment.risk_multiplier, 0.6);
        assert_eq!(assessment.risk_band, RiskBand::Evacuate);
        assert!(assessment.has_alert(AlertKind::Evacuate));
        assert!(assessment.has_alert(AlertKind::HeavyRain));
        assert!(assessment.has_alert(AlertKind::Lightning));
    }

    #[test]
    fn multiplier_grows_with_base_risk() {
        assert_eq!(risk_multiplier(0.0), 0.2);
        assert_eq!(risk_multiplier(0.29), 0.2);
        assert_eq!(risk_multiplier(0.3), 0.3);
        assert_eq!(risk_multiplier(0.5), 0.4);
        assert_eq!(risk_multiplier(0.7), 0.6);
    }

    #[test]
    fn factors_saturate_at_one() {
        let w = WeatherSnapshot {
            humidity_pct: 100.0,
            wind_speed_mps: 40.0,
            ..weather(200.0, 500.0, 90.0, WeatherCondition::Thunderstorm)
        };
        let factors = ImpactFactors::from_weather(&w);

        assert_eq!(factors.rainfall_24h, 1.0);
        assert_eq!(factors.rainfall_72h, 1.0);
        assert_eq!(factors.intensity, 1.0);
        assert_eq!(factors.conditions, 1.0);
        assert_eq!(factors.humidity_wind, 1.0);
        assert!((ImpactWeights::full().impact(&w) - 1.0).abs() < 1e-12);
        assert!((ImpactWeights::precipitation().impact(&w) - 0.9).abs() < 1e-12);
    }

    #[test]
    fn humidity_below_onset_contributes_nothing() {
        let w = WeatherSnapshot {
            humidity_pct: 60.0,
            wind_speed_mps: 12.5,
            ..WeatherSnapshot::calm()
        };
        let factors = ImpactFactors::from_weather(&w);
        assert!((factors.humidity_wind - 0.25).abs() < 1e-12);
    }

    #[test]
    fn weight_sets_differ_only_in_humidity_wind() {
        let w = WeatherSnapshot {
            humidity_pct: 95.0,
            wind_speed_mps: 25.0,
            ..weather(25.0, 50.0, 12.5, WeatherCondition::Rain)
        };
        let full = ImpactWeights::full().impact(&w);
        let precipitation = ImpactWeights::precipitation().impact(&w);

        // 0.5*0.35 + 0.5*0.25 + 0.5*0.20 + 0.6*0.10 = 0.46
        assert!((precipitation - 0.46).abs() < 1e-12);
        assert!((full - precipitation - 0.10).abs() < 1e-12);
    }

    #[test]
    fn breakdown_sums_to_impact() {
        let model = ClimateRiskModel::new();
        let w = WeatherSnapshot {
            humidity_pct: 85.0,
            wind_speed_mps: 10.0,
            ..weather(18.0, 70.0, 14.0, WeatherCondition::Drizzle)
        };
        let a = model.enhance(0.55, &w);

        assert!((a.impact_breakdown.total() - a.weather_impact).abs() < 1e-12);
        assert!((a.enhanced_risk - (0.55 + a.weather_impact * 0.4)).abs() < 1e-12);
    }

    #[test]
    fn alerts_are_ordered_and_exclusive_within_category() {
        let w = weather(35.0, 90.0, 22.0, WeatherCondition::Thunderstorm);
        let kinds: Vec<AlertKind> = generate_alerts(0.65, &w).iter().map(|a| a.kind).collect();

        assert_eq!(
            kinds,
            vec![
                AlertKind::SuspendOperations,
                AlertKind::HeavyRain,
                AlertKind::CriticalIntensity,
                AlertKind::Lightning,
            ]
        );

        let kinds: Vec<AlertKind> = generate_alerts(0.4, &w).iter().map(|a| a.kind).collect();
        assert_eq!(kinds[0], AlertKind::EnhancedMonitoring);
        assert_eq!(kinds.len(), 4);

        let moderate = weather(20.0, 0.0, 15.0, WeatherCondition::Rain);
        let kinds: Vec<AlertKind> = generate_alerts(0.1, &moderate).iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AlertKind::ModerateRain, AlertKind::HighIntensity]);
    }

    #[test]
    fn thresholds_are_strict() {
        let w = weather(30.0, 60.0, 20.0, WeatherCondition::Rain);
        let kinds: Vec<AlertKind> = generate_alerts(0.0, &w).iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AlertKind::ModerateRain, AlertKind::HighIntensity]);

        let factors = impact_factors(&w);
        assert_eq!(factors.len(), 2);
        assert!(!factors.iter().any(|f| f.contains("72h")));
    }
}
