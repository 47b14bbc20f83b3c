//! Session lifecycle: accept a client, greet it, run its session thread and
//! tear everything down when it leaves. One client at a time.

use anyhow::{Result, anyhow};
use flume::RecvTimeoutError;
use log::{error, info, warn};
use rsptcp_messages::{Event, WelcomeHeader};
use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use crate::config::SessionConfig;
use crate::consumer;
use crate::driver::DeviceDriver;
use crate::session::SessionEngine;

const EVENT_QUEUE_DEPTH: usize = 64;
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Serves one device to one client at a time.
pub struct Server<D> {
    listener: TcpListener,
    driver: D,
    config: SessionConfig,
}

impl<D: DeviceDriver> Server<D> {
    pub fn bind<A: ToSocketAddrs>(addr: A, driver: D, config: SessionConfig) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self {
            listener,
            driver,
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Serve clients one after another. Only a failing listener ends this.
    pub fn run(&mut self) -> Result<()> {
        loop {
            let (client, peer) = self.listener.accept()?;
            if let Err(e) = self.serve(client, peer) {
                error!("Session with {peer} failed: {e:#}");
            }
        }
    }

    /// Accept a single client and serve it to completion.
    pub fn serve_one(&mut self) -> Result<()> {
        let (client, peer) = self.listener.accept()?;
        self.serve(client, peer)
    }

    fn serve(&mut self, client: TcpStream, peer: SocketAddr) -> Result<()> {
        info!("Client connected from {peer}");
        serve_client(&mut self.driver, &self.config, client)?;
        info!("Session with {peer} ended");
        Ok(())
    }
}

/// Greet the client, then run its session on a dedicated thread while this
/// thread logs the session's events.
pub fn serve_client<D: DeviceDriver>(
    driver: &mut D,
    config: &SessionConfig,
    mut client: TcpStream,
) -> Result<()> {
    client.write_all(&WelcomeHeader::rsp2(config.bit_width).to_bytes())?;

    let reader = client.try_clone()?;
    let (event_tx, event_rx) = flume::bounded(EVENT_QUEUE_DEPTH);
    let mut engine = SessionEngine::for_client(driver, config.clone(), client, event_tx.clone())?;

    thread::scope(|s| {
        let session = thread::Builder::new()
            .name("session".into())
            .spawn_scoped(s, move || {
                run_session(&mut engine, reader);
                engine.shutdown();
                let _ = event_tx.try_send(Event::SessionEnded);
            })?;

        loop {
            match event_rx.recv_timeout(EVENT_POLL_INTERVAL) {
                Ok(Event::SessionEnded) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(event) => log_event(&event),
                Err(RecvTimeoutError::Timeout) => {
                    if session.is_finished() {
                        break;
                    }
                }
            }
        }

        session
            .join()
            .map_err(|_| anyhow!("Session thread panicked"))
    })
}

/// Body of the session thread: startup, then commands until disconnect.
fn run_session<D: DeviceDriver>(engine: &mut SessionEngine<D>, reader: TcpStream) {
    info!("Session thread entered");
    if let Err(e) = engine.startup() {
        error!("Initialization failed: {e}");
        return;
    }
    if let Err(e) = consumer::run_command_loop(reader, engine) {
        error!("Error in receive: {e}");
    }
    info!("Session thread terminating");
}

fn log_event(event: &Event) {
    match event {
        Event::StateSnapshot(state) => info!(
            "Device: {} at {} ({} on device), gain reduction {} dB, AGC {}, {}, streaming {}",
            state.frequency,
            state.sample_rate,
            state.device_sample_rate,
            state.gain_reduction,
            if state.agc_enabled { "on" } else { "off" },
            state.antenna,
            state.streaming
        ),
        Event::StreamStalled { discard_blocks } => {
            warn!("Client not keeping up, dropping the next {discard_blocks} blocks")
        }
        Event::CommandFailed { command, reason } => warn!("{command} rejected: {reason}"),
        Event::SessionEnded => info!("Session ended"),
    }
}
