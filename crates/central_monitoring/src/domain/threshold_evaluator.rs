use common::{SensorReading, SensorType, ThresholdConfig};
use std::fmt;
use std::sync::Arc;
use tracing::error;

/// One reading that exceeded the threshold of its metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Alarm {
    pub sensor_type: SensorType,
    pub warehouse_id: String,
    pub sensor_id: String,
    pub value: f64,
    pub threshold: f64,
}

impl fmt::Display for Alarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `{:?}` keeps the decimal point on whole numbers (40.0, not 40).
        write!(
            f,
            "ALARM: {} threshold exceeded in warehouse {}! Current: {:?}, Threshold: {:?}",
            self.sensor_type.label(),
            self.warehouse_id,
            self.value,
            self.threshold
        )
    }
}

/// Alarm for `reading` if its value is strictly above the threshold of its
/// metric.
pub fn evaluate(reading: &SensorReading, thresholds: &ThresholdConfig) -> Option<Alarm> {
    let threshold = thresholds.threshold_for(reading.sensor_type);
    (reading.value > threshold).then(|| Alarm {
        sensor_type: reading.sensor_type,
        warehouse_id: reading.warehouse_id.clone(),
        sensor_id: reading.sensor_id.clone(),
        value: reading.value,
        threshold,
    })
}

/// Checks readings against the process-wide thresholds and reports alarms.
///
/// Holds no state besides the thresholds, so evaluating a redelivered
/// reading again is harmless.
#[derive(Debug, Clone)]
pub struct ThresholdEvaluator {
    thresholds: Arc<ThresholdConfig>,
}

impl ThresholdEvaluator {
    pub fn new(thresholds: Arc<ThresholdConfig>) -> Self {
        Self { thresholds }
    }

    /// Evaluate one reading, logging an error-level line when it alarms.
    pub fn check(&self, reading: &SensorReading) -> Option<Alarm> {
        let alarm = evaluate(reading, &self.thresholds)?;
        error!(
            sensor_type = %alarm.sensor_type,
            warehouse_id = %alarm.warehouse_id,
            sensor_id = %alarm.sensor_id,
            value = alarm.value,
            threshold = alarm.threshold,
            "{}",
            alarm
        );
        Some(alarm)
    }
}
