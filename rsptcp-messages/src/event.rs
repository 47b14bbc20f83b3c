use crate::{Command, SessionState};

/// Events published by a running session.
#[derive(Debug, Clone)]
pub enum Event {
    /// Device settings after startup and after every applied command.
    StateSnapshot(SessionState),
    /// A socket write stalled; the next `discard_blocks` sample blocks are dropped.
    StreamStalled { discard_blocks: u32 },
    /// A command was rejected or the device refused it.
    CommandFailed { command: Command, reason: String },
    /// The session thread is about to exit.
    SessionEnded,
}
