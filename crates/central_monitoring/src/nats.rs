mod sensor_reading_service;

pub use sensor_reading_service::*;
