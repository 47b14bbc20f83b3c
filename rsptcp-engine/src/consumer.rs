use log::{debug, info};
use rsptcp_messages::{COMMAND_LEN, Command};
use std::io::{self, ErrorKind, Read};

use crate::driver::DeviceDriver;
use crate::session::SessionEngine;

/// Reads fixed-size commands off the client connection.
pub struct CommandReader<R> {
    reader: R,
}

impl<R: Read> CommandReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Block until a full command arrives. `Ok(None)` means the client closed
    /// the connection, possibly in the middle of a command.
    pub fn next_command(&mut self) -> io::Result<Option<Command>> {
        let mut buf = [0u8; COMMAND_LEN];
        match self.reader.read_exact(&mut buf) {
            Ok(()) => Ok(Some(Command::parse(buf))),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Apply commands one at a time until the client goes away.
///
/// Each command finishes, including any reconfiguration, before the next one
/// is read. Failed commands are reported by the engine and the loop goes on.
pub fn run_command_loop<R: Read, D: DeviceDriver>(
    reader: R,
    engine: &mut SessionEngine<D>,
) -> io::Result<()> {
    let mut commands = CommandReader::new(reader);
    while let Some(command) = commands.next_command()? {
        debug!("Received {command}");
        if let Err(e) = engine.execute(command) {
            debug!("Continuing after failed command: {e}");
        }
    }
    info!("Socket closed by client");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_reads_consecutive_commands() {
        let bytes = [1, 0x0A, 0x99, 0xBE, 0x00, 8, 0, 0, 0, 1];
        let mut reader = CommandReader::new(Cursor::new(bytes.to_vec()));
        assert_eq!(
            reader.next_command().unwrap(),
            Some(Command::SetFrequency(0x0A99_BE00))
        );
        assert_eq!(
            reader.next_command().unwrap(),
            Some(Command::SetAgcMode(true))
        );
        assert_eq!(reader.next_command().unwrap(), None);
    }

    #[test]
    fn test_truncated_command_ends_stream() {
        let mut reader = CommandReader::new(Cursor::new(vec![2, 0, 0x1F]));
        assert_eq!(reader.next_command().unwrap(), None);
    }

    /// Hands out one byte per read call.
    struct Trickle(Vec<u8>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0.is_empty() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.0.remove(0);
            Ok(1)
        }
    }

    #[test]
    fn test_command_assembled_from_partial_reads() {
        let mut reader = CommandReader::new(Trickle(vec![33, 0, 0, 0, 6]));
        assert_eq!(reader.next_command().unwrap(), Some(Command::SetAntenna(6)));
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(ErrorKind::ConnectionReset.into())
        }
    }

    #[test]
    fn test_read_error_is_reported() {
        let mut reader = CommandReader::new(Broken);
        let err = reader.next_command().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionReset);
    }
}
