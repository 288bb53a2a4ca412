mod threshold_evaluator;

pub use threshold_evaluator::*;
