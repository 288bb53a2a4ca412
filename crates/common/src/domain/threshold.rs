use crate::domain::SensorType;
use serde::{Deserialize, Serialize};

/// Per-metric alarm ceilings. Loaded once at startup and shared read-only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub temperature_threshold: f64,
    pub humidity_threshold: f64,
}

impl ThresholdConfig {
    pub fn new(temperature_threshold: f64, humidity_threshold: f64) -> Self {
        Self {
            temperature_threshold,
            humidity_threshold,
        }
    }

    pub fn threshold_for(&self, sensor_type: SensorType) -> f64 {
        match sensor_type {
            SensorType::Temperature => self.temperature_threshold,
            SensorType::Humidity => self.humidity_threshold,
        }
    }
}
