use common::{SensorReading, SensorType};
use thiserror::Error;

const FIELD_SEPARATOR: char = ';';
const KEY_VALUE_SEPARATOR: char = '=';
const EXPECTED_FIELDS: usize = 2;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("expected 2 fields, found {found}")]
    WrongFieldCount { found: usize },

    #[error("field {field} has no '=' separator")]
    MissingSeparator { field: usize },

    #[error("value '{raw}' is not a number")]
    InvalidValue { raw: String },
}

/// Parse one raw line of the form `sensorId=<id>;value=<number>`.
///
/// Fields are taken by position: the first carries the sensor id and the
/// second the value, whatever their key names. The metric and warehouse id
/// come from the caller, never from the line.
pub fn parse(
    raw_line: &str,
    sensor_type: SensorType,
    warehouse_id: &str,
) -> Result<SensorReading, ParseError> {
    let fields: Vec<&str> = raw_line.split(FIELD_SEPARATOR).collect();
    if fields.len() != EXPECTED_FIELDS {
        return Err(ParseError::WrongFieldCount {
            found: fields.len(),
        });
    }

    let sensor_id = field_value(fields[0], 0)?;
    let raw_value = field_value(fields[1], 1)?;
    let value = raw_value
        .parse::<f64>()
        .map_err(|_| ParseError::InvalidValue {
            raw: raw_value.to_string(),
        })?;

    Ok(SensorReading::new(
        warehouse_id,
        sensor_id,
        value,
        sensor_type,
    ))
}

fn field_value(field: &str, index: usize) -> Result<&str, ParseError> {
    field
        .split_once(KEY_VALUE_SEPARATOR)
        .map(|(_, value)| value.trim())
        .ok_or(ParseError::MissingSeparator { field: index })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_line() {
        let reading = parse("sensorId=S1;value=42.3", SensorType::Temperature, "WH-001").unwrap();

        assert_eq!(reading.warehouse_id, "WH-001");
        assert_eq!(reading.sensor_id, "S1");
        assert_eq!(reading.value, 42.3);
        assert_eq!(reading.sensor_type, SensorType::Temperature);
    }

    #[test]
    fn test_metric_comes_from_caller() {
        let reading = parse("sensorId=H1;value=65.0", SensorType::Humidity, "WH-2").unwrap();
        assert_eq!(reading.sensor_type, SensorType::Humidity);
    }

    #[test]
    fn test_trims_values_and_trailing_newline() {
        let reading = parse("sensorId= t1 ;value= 30 \n", SensorType::Temperature, "WH").unwrap();

        assert_eq!(reading.sensor_id, "t1");
        assert_eq!(reading.value, 30.0);
    }

    #[test]
    fn test_fields_are_positional() {
        let reading = parse("id=dev-9;reading=-4.5", SensorType::Temperature, "WH").unwrap();

        assert_eq!(reading.sensor_id, "dev-9");
        assert_eq!(reading.value, -4.5);
    }

    #[test]
    fn test_value_may_contain_separator_after_first() {
        let err = parse("sensorId=a=b;value=x=1", SensorType::Temperature, "WH").unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidValue {
                raw: "x=1".to_string()
            }
        );
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(
            parse("garbage", SensorType::Temperature, "WH").unwrap_err(),
            ParseError::WrongFieldCount { found: 1 }
        );
    }

    #[test]
    fn test_rejects_extra_fields() {
        assert_eq!(
            parse("sensorId=t1;value=1;unit=C", SensorType::Temperature, "WH").unwrap_err(),
            ParseError::WrongFieldCount { found: 3 }
        );
        assert_eq!(
            parse("sensorId=t1;value=1;", SensorType::Temperature, "WH").unwrap_err(),
            ParseError::WrongFieldCount { found: 3 }
        );
    }

    #[test]
    fn test_rejects_missing_separator() {
        assert_eq!(
            parse("sensorId=t1;value", SensorType::Humidity, "WH").unwrap_err(),
            ParseError::MissingSeparator { field: 1 }
        );
        assert_eq!(
            parse("t1;value=3", SensorType::Humidity, "WH").unwrap_err(),
            ParseError::MissingSeparator { field: 0 }
        );
    }

    #[test]
    fn test_rejects_non_numeric_value() {
        assert_eq!(
            parse("sensorId=t1;value=hot", SensorType::Temperature, "WH").unwrap_err(),
            ParseError::InvalidValue {
                raw: "hot".to_string()
            }
        );
        assert!(matches!(
            parse("sensorId=t1;value=", SensorType::Temperature, "WH"),
            Err(ParseError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_accepts_empty_sensor_id() {
        let reading = parse("sensorId=;value=1", SensorType::Temperature, "WH").unwrap();
        assert_eq!(reading.sensor_id, "");
    }

    #[test]
    fn test_accepts_float_grammar_edge_cases() {
        assert_eq!(
            parse("sensorId=t;value=1e2", SensorType::Temperature, "WH")
                .unwrap()
                .value,
            100.0
        );
        assert!(parse("sensorId=t;value=NaN", SensorType::Temperature, "WH")
            .unwrap()
            .value
            .is_nan());
    }
}
