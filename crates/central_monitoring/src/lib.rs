mod central_monitor;
mod domain;
mod nats;

pub use central_monitor::*;
pub use domain::*;
pub use nats::*;
