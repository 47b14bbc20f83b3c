//! rtl_tcp-compatible I/Q server core.
//!
//! A [`Server`] accepts one client at a time. Each client gets a
//! [`SessionEngine`] running on its own thread that reads 5-byte commands and
//! reconfigures the device, while the driver's callback thread pushes packed
//! sample blocks through a [`StreamProducer`].

pub mod config;
pub mod consumer;
pub mod driver;
pub mod error;
pub mod pack;
pub mod producer;
pub mod retry;
pub mod sampling;
pub mod server;
pub mod session;

pub use config::SessionConfig;
pub use driver::{DeviceDriver, DriverError, SignalSource, SimulatedDriver};
pub use error::SessionError;
pub use producer::{StreamGate, StreamProducer};
pub use retry::RetryPolicy;
pub use server::Server;
pub use session::SessionEngine;
