mod client;
mod message;
mod middleware;
mod trace_context;
mod traits;
mod tower_consumer;

pub use client::*;
pub use message::*;
pub use middleware::*;
pub use trace_context::*;
pub use traits::*;
pub use tower_consumer::*;
