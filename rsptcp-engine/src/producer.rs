//! The driver-callback side of a session: pack each block and push it to the
//! client without ever blocking the driver for more than one write timeout.

use flume::Sender;
use log::{debug, error, info, trace, warn};
use rsptcp_messages::{BitWidth, Event, Hertz};
use std::io::{self, ErrorKind, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::driver::{SampleBlock, StreamHandler};
use crate::pack;

/// The state the session publishes to the callback context.
///
/// The streaming flag is the only synchronisation between reconfiguration and
/// sample delivery: it goes false before a stream is torn down and true only
/// after a successful init.
#[derive(Debug, Default)]
pub struct StreamGate {
    streaming: AtomicBool,
    sample_rate_hz: AtomicU64,
}

impl StreamGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    pub fn set_streaming(&self, on: bool) {
        self.streaming.store(on, Ordering::SeqCst);
    }

    /// The rate blocks are delivered at, after any decimation.
    pub fn sample_rate(&self) -> Hertz {
        Hertz(self.sample_rate_hz.load(Ordering::SeqCst))
    }

    pub fn set_sample_rate(&self, rate: Hertz) {
        self.sample_rate_hz.store(rate.as_hz(), Ordering::SeqCst);
    }
}

/// Self-imposed drop window entered after a stalled write.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Backpressure {
    pub blocked_cycles_remaining: u32,
    pub discarding: bool,
}

impl Backpressure {
    /// Called once per block. Returns true if the block must be dropped.
    fn should_discard(&mut self) -> bool {
        if self.blocked_cycles_remaining > 0 {
            self.blocked_cycles_remaining -= 1;
            if !self.discarding {
                self.discarding = true;
                info!("Discarding samples for one second");
            }
            return true;
        }
        if self.discarding {
            self.discarding = false;
            info!("Resuming sample delivery");
        }
        false
    }

    /// Arm the window for roughly one second of blocks.
    fn enter(&mut self, sample_rate: Hertz, samples_per_block: usize) -> u32 {
        let blocks = sample_rate.as_hz() / samples_per_block.max(1) as u64;
        self.blocked_cycles_remaining = u32::try_from(blocks).unwrap_or(u32::MAX);
        self.blocked_cycles_remaining
    }
}

/// Packs sample blocks and writes them to the client.
///
/// `W` must be a blocking writer with a write timeout configured; a write
/// failing with `WouldBlock` or `TimedOut` is treated as a stalled socket.
pub struct StreamProducer<W> {
    writer: Option<W>,
    gate: Arc<StreamGate>,
    bit_width: BitWidth,
    backpressure: Backpressure,
    event_tx: Sender<Event>,
    buf: Vec<u8>,
}

impl<W: Write + Send> StreamProducer<W> {
    pub fn new(
        writer: W,
        gate: Arc<StreamGate>,
        bit_width: BitWidth,
        event_tx: Sender<Event>,
    ) -> Self {
        Self {
            writer: Some(writer),
            gate,
            bit_width,
            backpressure: Backpressure::default(),
            event_tx,
            buf: Vec::new(),
        }
    }

    /// Drop the client writer; later blocks are discarded.
    pub fn detach(&mut self) -> Option<W> {
        self.writer.take()
    }

    pub fn backpressure(&self) -> Backpressure {
        self.backpressure
    }

    pub fn writer(&self) -> Option<&W> {
        self.writer.as_ref()
    }

    fn handle(&mut self, block: &SampleBlock<'_>) {
        if block.hardware_removed {
            error!("Hardware removed");
            return;
        }
        if block.reset {
            warn!("Stream reset by driver");
            return;
        }
        if !self.gate.is_streaming() || self.writer.is_none() {
            return;
        }
        if self.backpressure.should_discard() {
            return;
        }

        pack::pack_block(block.samples, self.bit_width, &mut self.buf);
        trace!(
            "Block {} with {} samples, {} bytes",
            block.first_sample_num,
            block.samples.len(),
            self.buf.len()
        );

        if let Err(e) = self.flush() {
            let discard_blocks = self
                .backpressure
                .enter(self.gate.sample_rate(), block.samples.len());
            error!("Error in streaming callback: socket error {e}");
            if self
                .event_tx
                .try_send(Event::StreamStalled { discard_blocks })
                .is_err()
            {
                debug!("Event channel full or closed, stall not reported");
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        let mut sent = 0;
        while sent < self.buf.len() {
            match writer.write(&self.buf[sent..]) {
                Ok(0) => return Err(ErrorKind::WriteZero.into()),
                Ok(n) => sent += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl<W: Write + Send> StreamHandler for StreamProducer<W> {
    fn on_block(&mut self, block: &SampleBlock<'_>) {
        self.handle(block);
    }

    fn close(&mut self) {
        self.detach();
    }
}
