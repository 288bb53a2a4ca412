#[cfg(any(test, feature = "testing"))]
mod capture;
mod config;
mod init;

#[cfg(any(test, feature = "testing"))]
pub use capture::*;
pub use config::*;
pub use init::*;
