//! Session engine: owns the device settings of one client session and runs
//! the reconfiguration protocols against the driver.

use flume::Sender;
use log::{debug, error, info, warn};
use rsptcp_messages::{Antenna, Command, Decibels, Event, Hertz, SessionState};
use std::io;
use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::SessionConfig;
use crate::driver::{
    AgcMode, DcOffsetMode, DeviceDriver, DriverError, GainMode, ReinitRequest, SharedHandler,
    StreamParams,
};
use crate::error::SessionError;
use crate::producer::{StreamGate, StreamProducer};
use crate::sampling::{self, SAMPLING_CONFIGS};

/// How long a sample write may wait for the socket.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// AGC setpoint in dBFS, tuned for DAB reception.
pub const AGC_SETPOINT: Decibels = Decibels(-25.0);

const DC_TRACK_TIME_MAX: u8 = 63;
const MAX_PPM_CORRECTION: i32 = 1000;
const MAX_GAIN_INDEX: i32 = 100;

/// Settings only the session thread touches.
#[derive(Debug, Clone)]
struct DeviceSettings {
    frequency: Hertz,
    config_index: usize,
    gain_reduction: u8,
    agc_enabled: bool,
    ppm_correction: i32,
    antenna: Antenna,
}

/// Drives one device for one client.
///
/// The producer side only ever sees the [`StreamGate`]; everything else here
/// is owned by the session thread, and one command runs to completion before
/// the next is read.
pub struct SessionEngine<D: DeviceDriver> {
    driver: D,
    config: SessionConfig,
    settings: DeviceSettings,
    samples_per_block: usize,
    gate: Arc<StreamGate>,
    handler: SharedHandler,
    client: Option<TcpStream>,
    event_tx: Sender<Event>,
    started: bool,
}

impl<D: DeviceDriver> SessionEngine<D> {
    /// Create an engine whose driver delivers blocks to `handler`.
    pub fn new(
        driver: D,
        config: SessionConfig,
        handler: SharedHandler,
        gate: Arc<StreamGate>,
        event_tx: Sender<Event>,
    ) -> Self {
        debug!("Constructing a new session engine");
        let settings = DeviceSettings {
            frequency: config.frequency,
            config_index: config.config_index(),
            gain_reduction: config.gain_reduction,
            agc_enabled: false,
            ppm_correction: 0,
            antenna: config.antenna,
        };
        gate.set_sample_rate(SAMPLING_CONFIGS[settings.config_index].rate);
        Self {
            driver,
            config,
            settings,
            samples_per_block: 0,
            gate,
            handler,
            client: None,
            event_tx,
            started: false,
        }
    }

    /// Create an engine streaming to a connected client.
    pub fn for_client(
        driver: D,
        config: SessionConfig,
        client: TcpStream,
        event_tx: Sender<Event>,
    ) -> io::Result<Self> {
        client.set_nodelay(true)?;
        let writer = client.try_clone()?;
        writer.set_write_timeout(Some(WRITE_TIMEOUT))?;

        let gate = Arc::new(StreamGate::new());
        let producer =
            StreamProducer::new(writer, gate.clone(), config.bit_width, event_tx.clone());
        let mut engine = Self::new(
            driver,
            config,
            Arc::new(Mutex::new(producer)),
            gate,
            event_tx,
        );
        engine.client = Some(client);
        Ok(engine)
    }

    pub fn state(&self) -> SessionState {
        let config = &SAMPLING_CONFIGS[self.settings.config_index];
        SessionState {
            frequency: self.settings.frequency,
            device_sample_rate: config.device_rate,
            sample_rate: config.rate,
            config_index: self.settings.config_index,
            gain_reduction: self.settings.gain_reduction,
            agc_enabled: self.settings.agc_enabled,
            ppm_correction: self.settings.ppm_correction,
            antenna: self.settings.antenna,
            bit_width: self.config.bit_width,
            streaming: self.gate.is_streaming(),
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn samples_per_block(&self) -> usize {
        self.samples_per_block
    }

    pub fn gate(&self) -> &Arc<StreamGate> {
        &self.gate
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Bring the device up with the configured defaults.
    ///
    /// A failed stream init leaves the gate closed and the session running, so
    /// a later rate or frequency command can bring the stream up. Only a
    /// removed device is fatal.
    pub fn startup(&mut self) -> Result<(), SessionError> {
        self.started = true;

        match self.driver.api_version() {
            Ok(version) => info!("API Version {version}"),
            Err(e) => warn!("ApiVersion returned with: {e}"),
        }

        let index = self.settings.config_index;
        let stream_up = match self.open_stream(index, self.settings.frequency) {
            Ok(()) => true,
            Err(e) => match e.driver_error() {
                Some(DriverError::AlreadyInitialised) => {
                    info!("Stream already initialised");
                    true
                }
                Some(DriverError::HwRemoved) => {
                    error!("API Init failed with error: {e}");
                    return Err(e);
                }
                _ => {
                    error!("API Init failed with error: {e}");
                    warn!("Not streaming until a rate or frequency command succeeds");
                    false
                }
            },
        };

        match self.driver.hardware_version() {
            Ok(version) => info!("Hardware version {version}"),
            Err(e) => warn!("GetHwVersion returned with: {e}"),
        }

        if let Err(e) = self.set_antenna(self.settings.antenna) {
            warn!("Startup: {e}");
        }

        let mode = DcOffsetMode::OneShot;
        let result = self.driver.set_dc_offset_mode(mode, true);
        info!("SetDcMode({}, speed-up) returned with: {}", mode.code(), status(&result));
        let result = self.driver.set_dc_track_time(DC_TRACK_TIME_MAX);
        info!("SetDcTrackTime({DC_TRACK_TIME_MAX}) returned with: {}", status(&result));

        if let Err(e) = self.set_agc(true) {
            warn!("Startup: {e}");
        }

        if stream_up {
            if SAMPLING_CONFIGS[index].decimation_enabled {
                if let Err(e) = self.apply_decimation(index) {
                    warn!("Startup: {e}");
                }
            }
            self.commit_stream(index);
            info!("Starting SDR streaming");
        }

        self.publish(Event::StateSnapshot(self.state()));
        Ok(())
    }

    /// Validate and apply one client command.
    ///
    /// Unknown and unsupported commands are logged and succeed.
    pub fn execute(&mut self, command: Command) -> Result<(), SessionError> {
        let result = match command {
            Command::SetFrequency(value) => match Hertz::try_from(value) {
                Ok(hz) if hz.as_hz() > 0 => self.set_frequency(hz),
                _ => Err(SessionError::InvalidValue {
                    what: "frequency",
                    value,
                }),
            },
            Command::SetSampleRate(value) => match Hertz::try_from(value) {
                Ok(rate) => self.set_sample_rate(rate),
                Err(_) => Err(SessionError::InvalidValue {
                    what: "sample rate",
                    value,
                }),
            },
            Command::SetFrequencyCorrection(ppm) => self.set_frequency_correction(ppm),
            Command::SetTunerGainByIndex(gain) => self.set_gain(gain),
            Command::SetAgcMode(on) => self.set_agc(on),
            Command::SetAntenna(value) => match Antenna::from_selector(value) {
                Some(antenna) => self.set_antenna(antenna),
                None => Err(SessionError::InvalidValue {
                    what: "antenna",
                    value,
                }),
            },
            Command::Unsupported { code, value } => {
                warn!("Unsupported command {} ({value}), ignored", code.name());
                return Ok(());
            }
            Command::Unknown { .. } => {
                warn!("Unknown Command; {:02x?}", command.to_bytes());
                return Ok(());
            }
        };

        match &result {
            Ok(()) => self.publish(Event::StateSnapshot(self.state())),
            Err(e) => {
                warn!("{command} failed: {e}");
                self.publish(Event::CommandFailed {
                    command,
                    reason: e.to_string(),
                });
            }
        }
        result
    }

    /// Retune, retrying once on an update race and falling back to a
    /// frequency-only reinit when the plain retune is refused.
    ///
    /// With no stream running, the stream is brought up at the new frequency
    /// instead.
    pub fn set_frequency(&mut self, frequency: Hertz) -> Result<(), SessionError> {
        let result = if self.started && !self.gate.is_streaming() {
            self.restart_stream(frequency)
        } else {
            self.retune(frequency)
        };

        match &result {
            Ok(()) => {
                self.settings.frequency = frequency;
                info!("Frequency set to (Hz): {}", frequency.as_hz());
            }
            Err(e) => {
                error!("Frequency setting error: {e}");
                error!("Requested Frequency was: {}", frequency.as_hz());
            }
        }
        result
    }

    fn retune(&mut self, frequency: Hertz) -> Result<(), SessionError> {
        let policy = self.config.retune_retry;
        let driver = &mut self.driver;
        let retune = policy.run(
            "SetRf",
            || {
                let result = driver.set_frequency(frequency);
                info!(
                    "SetRf({} MHz) returned with: {}",
                    frequency.as_mhz_f64(),
                    status(&result)
                );
                result
            },
            |e| *e == DriverError::RfUpdateError,
        );

        match retune {
            Ok(()) => Ok(()),
            Err(DriverError::OutOfRange | DriverError::RfUpdateError) => {
                self.reinit_frequency(frequency)
            }
            Err(e) => Err(SessionError::driver("SetRf")(e)),
        }
    }

    fn restart_stream(&mut self, frequency: Hertz) -> Result<(), SessionError> {
        info!("Stream is down, initialising it at {frequency}");
        self.uninit_stream()?;
        self.bring_up(self.settings.config_index, frequency)
    }

    fn reinit_frequency(&mut self, frequency: Hertz) -> Result<(), SessionError> {
        let request = ReinitRequest::frequency(frequency);
        let result = self.driver.reinit_stream(&request);
        info!(
            "Reinit({}) returned with: {}",
            request.reasons().join("|"),
            status(&result)
        );
        let info = result.map_err(SessionError::driver("Reinit"))?;
        self.samples_per_block = info.samples_per_block;
        Ok(())
    }

    /// Tear the stream down and bring it back up at another table entry.
    ///
    /// An unsupported rate restores the previous entry and reports the valid rates.
    pub fn set_sample_rate(&mut self, rate: Hertz) -> Result<(), SessionError> {
        let previous = self.settings.config_index;
        let was_streaming = self.gate.is_streaming();

        self.gate.set_streaming(false);
        if let Err(e) = self.uninit_stream() {
            // Teardown never happened, so the old stream is still live.
            self.gate.set_streaming(was_streaming);
            return Err(e);
        }

        let Some(index) = sampling::lookup(rate) else {
            warn!(
                "Invalid Sampling Rate: {}; Must be {}",
                rate.as_hz(),
                sampling::describe_valid_rates()
            );
            if let Err(e) = self.bring_up(previous, self.settings.frequency) {
                error!("Could not restore previous sampling configuration: {e}");
            }
            return Err(SessionError::UnsupportedRate {
                requested: rate,
                valid: sampling::valid_rates(),
            });
        };

        if let Err(e) = self.bring_up(index, self.settings.frequency) {
            error!("Sampling Rate setting error: {e}");
            error!("Requested Sampling Rate was: {}", rate.as_hz());
            return Err(e);
        }
        info!(
            "Sampling Rate set to (Hz): {}",
            SAMPLING_CONFIGS[index].device_rate.as_hz()
        );
        Ok(())
    }

    /// Frequency correction in ppm, within ±1000.
    pub fn set_frequency_correction(&mut self, ppm: i32) -> Result<(), SessionError> {
        if !(-MAX_PPM_CORRECTION..=MAX_PPM_CORRECTION).contains(&ppm) {
            return Err(SessionError::InvalidValue {
                what: "ppm correction",
                value: ppm,
            });
        }
        let result = self.driver.set_frequency_correction(ppm);
        info!("SetPpm({ppm}) returned with: {}", status(&result));
        result.map_err(SessionError::driver("SetPpm"))?;
        self.settings.ppm_correction = ppm;
        info!("PPM correction: {ppm}");
        Ok(())
    }

    /// Client gain 0..=100, applied as `100 - gain` dB of gain reduction.
    pub fn set_gain(&mut self, gain: i32) -> Result<(), SessionError> {
        if !(0..=MAX_GAIN_INDEX).contains(&gain) {
            return Err(SessionError::InvalidValue {
                what: "gain",
                value: gain,
            });
        }
        let reduction = (MAX_GAIN_INDEX - gain) as u8;
        let result = self.driver.set_gain_reduction(reduction);
        info!("SetGr({reduction}) returned with: {}", status(&result));
        result.map_err(SessionError::driver("SetGr"))?;
        self.settings.gain_reduction = reduction;
        Ok(())
    }

    pub fn set_agc(&mut self, on: bool) -> Result<(), SessionError> {
        let mode = if on {
            AgcMode::Enabled {
                setpoint: AGC_SETPOINT,
            }
        } else {
            AgcMode::Disabled
        };
        let result = self.driver.set_agc(mode);
        info!("AgcControl({mode:?}) returned with: {}", status(&result));
        result.map_err(SessionError::driver("AgcControl"))?;
        self.settings.agc_enabled = on;
        Ok(())
    }

    pub fn set_antenna(&mut self, antenna: Antenna) -> Result<(), SessionError> {
        let result = self.driver.set_antenna(antenna);
        info!(
            "AntennaControl({}) returned with: {}",
            antenna.selector(),
            status(&result)
        );
        result.map_err(SessionError::driver("AntennaControl"))?;
        self.settings.antenna = antenna;
        info!("{antenna} selected");
        Ok(())
    }

    /// Stop streaming, release the device and close the client socket.
    /// Does nothing unless the session was started.
    pub fn shutdown(&mut self) {
        if !self.started {
            info!("Already stopped. Nothing to do here.");
            return;
        }
        info!("Stopping...");

        self.gate.set_streaming(false);
        if let Err(e) = self.uninit_stream() {
            warn!("Continuing shutdown with device in unknown state: {e}");
        }

        let result = self.driver.release_device();
        info!(
            "ReleaseDevice({}) returned with: {}",
            self.config.device_index,
            status(&result)
        );

        match self.handler.lock() {
            Ok(mut handler) => handler.close(),
            Err(poisoned) => poisoned.into_inner().close(),
        }

        if let Some(client) = self.client.take() {
            if let Err(e) = client.shutdown(Shutdown::Both) {
                debug!("Socket shutdown: {e}");
            }
            info!("Socket closed");
        }
        self.started = false;
    }

    /// Init, decimate, then open the gate. Nothing is committed unless every
    /// step succeeds.
    fn bring_up(&mut self, index: usize, frequency: Hertz) -> Result<(), SessionError> {
        self.open_stream(index, frequency)?;
        self.apply_decimation(index)?;
        self.settings.frequency = frequency;
        self.commit_stream(index);
        Ok(())
    }

    /// Init the stream at a table entry.
    fn open_stream(&mut self, index: usize, frequency: Hertz) -> Result<(), SessionError> {
        let config = &SAMPLING_CONFIGS[index];
        let params = StreamParams {
            device_rate: config.device_rate,
            frequency,
            bandwidth: config.bandwidth,
            gain_reduction: self.settings.gain_reduction,
            gain_mode: GainMode::UseSetGr,
        };
        let result = self.driver.init_stream(&params, self.handler.clone());
        info!(
            "StreamInit(bw {} kHz, srate {} MHz, rf {} MHz) returned with: {}",
            config.bandwidth.code(),
            config.device_rate.as_mhz_f64(),
            frequency.as_mhz_f64(),
            status(&result)
        );
        let info = result.map_err(SessionError::driver("StreamInit"))?;
        self.samples_per_block = info.samples_per_block;
        Ok(())
    }

    fn commit_stream(&mut self, index: usize) {
        self.settings.config_index = index;
        self.gate.set_sample_rate(SAMPLING_CONFIGS[index].rate);
        self.gate.set_streaming(true);
    }

    /// Program the entry's decimation, switching it off explicitly when unused.
    fn apply_decimation(&mut self, index: usize) -> Result<(), SessionError> {
        let decimation = SAMPLING_CONFIGS[index].decimation();
        let result = self.driver.set_decimation(decimation);
        info!(
            "DecimateControl({}, {}) returned with: {}",
            decimation.enabled,
            decimation.factor,
            status(&result)
        );
        match (&result, decimation.enabled) {
            (Ok(()), true) => info!("Decimation Factor set to {}", decimation.factor),
            (Ok(()), false) => info!("No Decimation applied"),
            (Err(_), _) => warn!("Requested Decimation Factor was: {}", decimation.factor),
        }
        result.map_err(SessionError::driver("DecimateControl"))
    }

    /// Uninit with retries. A stream that is not up counts as torn down.
    fn uninit_stream(&mut self) -> Result<(), SessionError> {
        let policy = self.config.uninit_retry;
        let driver = &mut self.driver;
        let result = policy.run(
            "StreamUninit",
            || {
                let result = driver.uninit_stream();
                info!("StreamUninit returned with: {}", status(&result));
                result
            },
            |e| *e != DriverError::NotInitialised,
        );
        match result {
            Ok(()) | Err(DriverError::NotInitialised) => Ok(()),
            Err(e) => {
                error!("StreamUninit failed with: {e}");
                Err(SessionError::driver("StreamUninit")(e))
            }
        }
    }

    fn publish(&self, event: Event) {
        if self.event_tx.try_send(event).is_err() {
            debug!("Event channel full or closed, event dropped");
        }
    }
}

/// Driver status for log lines: `0` on success, otherwise code and name.
fn status<T>(result: &Result<T, DriverError>) -> String {
    match result {
        Ok(_) => "0".to_string(),
        Err(e) => format!("{} ({e})", e.status_code()),
    }
}
