mod reading_normalizer;
mod reading_publisher;

pub use reading_normalizer::*;
pub use reading_publisher::*;
