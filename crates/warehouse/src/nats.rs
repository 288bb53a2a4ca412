mod sensor_reading_producer;

pub use sensor_reading_producer::*;
