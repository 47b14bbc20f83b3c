//! Wire and state vocabulary shared by the rtl_tcp-compatible server.
//!
//! Nothing in here touches a socket or a device; the engine crate owns all I/O.

mod command;
mod event;
mod header;
mod state;
mod units;

pub use command::{COMMAND_LEN, Command, CommandCode};
pub use event::Event;
pub use header::{HEADER_LEN, HEADER_MAGIC, WelcomeHeader};
pub use state::{Antenna, BitWidth, SessionState};
pub use units::{Decibels, Hertz};
