mod domain;
mod nats;
mod udp;
mod warehouse_gateway;

pub use domain::*;
pub use nats::*;
pub use udp::*;
pub use warehouse_gateway::*;
