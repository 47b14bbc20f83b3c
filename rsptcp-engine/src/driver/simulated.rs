use flume::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, trace};
use num_complex::Complex;
use rsptcp_messages::{Antenna, Decibels, Hertz};
use std::f64::consts::TAU;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{
    AgcMode, Bandwidth, Decimation, DcOffsetMode, DeviceDriver, DriverError, ReinitRequest,
    SampleBlock, SharedHandler, StreamInfo, StreamParams,
};

const API_VERSION: f32 = 2.13;
const HW_VERSION: u8 = 2;
const SAMPLES_PER_BLOCK: usize = 1008;
const FULL_SCALE: f32 = 8191.0;
/// Gain reduction at which a tone comes out at its nominal level.
const REFERENCE_GAIN_REDUCTION: f32 = 50.0;
const MIN_FREQUENCY: Hertz = Hertz::khz(1);
const MAX_FREQUENCY: Hertz = Hertz::mhz(2000);
const MIN_DEVICE_RATE: Hertz = Hertz::mhz(2);
const MAX_DEVICE_RATE: Hertz = Hertz::mhz(10);
const DECIMATION_FACTORS: [u32; 7] = [1, 2, 4, 8, 16, 32, 64];
const MAX_DC_TRACK_TIME: u8 = 63;

/// Where the simulated device gets its samples from.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalSource {
    /// Complex tone `offset_hz` away from the tuned frequency at `level` dBFS.
    Tone { offset_hz: f64, level: Decibels },
    /// Interleaved little-endian i16 I/Q pairs, replayed in a loop.
    File { path: PathBuf },
}

impl Default for SignalSource {
    fn default() -> Self {
        SignalSource::Tone {
            offset_hz: 10_000.0,
            level: Decibels(-6.0),
        }
    }
}

/// Stands in for the receiver hardware: keeps the device settings, enforces
/// the API's status rules and delivers paced sample blocks from its own thread.
pub struct SimulatedDriver {
    generator: Option<Generator>,
    worker: Option<Worker>,
    frequency: Hertz,
    device_rate: Hertz,
    bandwidth: Bandwidth,
    gain_reduction: u8,
    agc: AgcMode,
    antenna: Antenna,
    ppm: i32,
    dc_offset: (DcOffsetMode, bool),
    dc_track_time: u8,
    decimation: Decimation,
    released: bool,
}

impl SimulatedDriver {
    pub fn new(source: SignalSource) -> io::Result<Self> {
        let generator = match source {
            SignalSource::Tone { offset_hz, level } => Generator::Tone {
                offset_hz,
                level,
                phase: 0.0,
            },
            SignalSource::File { path } => Generator::File(IqFileReader::open(path)?),
        };
        Ok(Self {
            generator: Some(generator),
            worker: None,
            frequency: Hertz(0),
            device_rate: Hertz(0),
            bandwidth: Bandwidth::Bw1536k,
            gain_reduction: REFERENCE_GAIN_REDUCTION as u8,
            agc: AgcMode::Disabled,
            antenna: Antenna::A,
            ppm: 0,
            dc_offset: (DcOffsetMode::Static, false),
            dc_track_time: 0,
            decimation: Decimation::OFF,
            released: false,
        })
    }

    pub fn is_streaming(&self) -> bool {
        self.worker.is_some()
    }

    pub fn frequency(&self) -> Hertz {
        self.frequency
    }

    pub fn device_rate(&self) -> Hertz {
        self.device_rate
    }

    pub fn decimation(&self) -> Decimation {
        self.decimation
    }

    pub fn antenna(&self) -> Antenna {
        self.antenna
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn gain_reduction(&self) -> u8 {
        self.gain_reduction
    }

    pub fn agc(&self) -> AgcMode {
        self.agc
    }

    pub fn ppm_correction(&self) -> i32 {
        self.ppm
    }

    pub fn dc_tracking(&self) -> (DcOffsetMode, bool, u8) {
        (self.dc_offset.0, self.dc_offset.1, self.dc_track_time)
    }

    fn shape(&self) -> Shape {
        let factor = if self.decimation.enabled {
            self.decimation.factor
        } else {
            1
        };
        let level = match self.agc {
            AgcMode::Enabled { setpoint } => setpoint,
            AgcMode::Disabled => Decibels(REFERENCE_GAIN_REDUCTION - self.gain_reduction as f32),
        };
        Shape {
            output_rate: self.device_rate.as_hz() as f64 / factor as f64,
            gain: level,
        }
    }

    fn update_worker(&self) {
        if let Some(worker) = &self.worker {
            // A closed channel means the thread already exited; uninit reports that.
            let _ = worker.control_tx.send(Control::Reshape(self.shape()));
        }
    }

    fn require_stream(&self) -> Result<(), DriverError> {
        if self.worker.is_some() {
            Ok(())
        } else {
            Err(DriverError::NotInitialised)
        }
    }

    fn stop_worker(&mut self) -> Result<(), DriverError> {
        let Some(worker) = self.worker.take() else {
            return Err(DriverError::NotInitialised);
        };
        let _ = worker.control_tx.send(Control::Stop);
        match worker.handle.join() {
            Ok(generator) => {
                self.generator = Some(generator);
                Ok(())
            }
            Err(_) => {
                error!("Simulated stream thread panicked");
                Err(DriverError::HwError)
            }
        }
    }
}

fn check_frequency(frequency: Hertz) -> Result<(), DriverError> {
    if (MIN_FREQUENCY..=MAX_FREQUENCY).contains(&frequency) {
        Ok(())
    } else {
        Err(DriverError::OutOfRange)
    }
}

fn check_device_rate(rate: Hertz) -> Result<(), DriverError> {
    if (MIN_DEVICE_RATE..=MAX_DEVICE_RATE).contains(&rate) {
        Ok(())
    } else {
        Err(DriverError::OutOfRange)
    }
}

impl DeviceDriver for SimulatedDriver {
    fn api_version(&mut self) -> Result<f32, DriverError> {
        Ok(API_VERSION)
    }

    fn hardware_version(&mut self) -> Result<u8, DriverError> {
        Ok(HW_VERSION)
    }

    fn init_stream(
        &mut self,
        params: &StreamParams,
        handler: SharedHandler,
    ) -> Result<StreamInfo, DriverError> {
        if self.worker.is_some() {
            return Err(DriverError::AlreadyInitialised);
        }
        check_device_rate(params.device_rate)?;
        check_frequency(params.frequency)?;
        let generator = self.generator.take().ok_or(DriverError::HwError)?;

        self.released = false;
        self.frequency = params.frequency;
        self.device_rate = params.device_rate;
        self.bandwidth = params.bandwidth;
        self.gain_reduction = params.gain_reduction;

        let (control_tx, control_rx) = flume::unbounded();
        let shape = self.shape();
        let handle = thread::Builder::new()
            .name("sim-stream".into())
            .spawn(move || stream_worker(generator, shape, handler, control_rx))
            .map_err(|e| {
                error!("Could not start simulated stream thread: {e}");
                DriverError::OutOfMemError
            })?;
        self.worker = Some(Worker { control_tx, handle });

        debug!(
            "Simulated stream up: {} at {}, bw {} kHz",
            self.device_rate,
            self.frequency,
            self.bandwidth.code()
        );
        Ok(StreamInfo {
            samples_per_block: SAMPLES_PER_BLOCK,
        })
    }

    fn reinit_stream(&mut self, request: &ReinitRequest) -> Result<StreamInfo, DriverError> {
        self.require_stream()?;
        if let Some(frequency) = request.frequency {
            check_frequency(frequency)?;
        }
        if let Some(rate) = request.device_rate {
            check_device_rate(rate)?;
        }
        self.frequency = request.frequency.unwrap_or(self.frequency);
        self.device_rate = request.device_rate.unwrap_or(self.device_rate);
        self.bandwidth = request.bandwidth.unwrap_or(self.bandwidth);
        self.update_worker();
        Ok(StreamInfo {
            samples_per_block: SAMPLES_PER_BLOCK,
        })
    }

    fn uninit_stream(&mut self) -> Result<(), DriverError> {
        self.stop_worker()
    }

    fn set_frequency(&mut self, frequency: Hertz) -> Result<(), DriverError> {
        self.require_stream()?;
        check_frequency(frequency)?;
        self.frequency = frequency;
        self.update_worker();
        Ok(())
    }

    fn set_frequency_correction(&mut self, ppm: i32) -> Result<(), DriverError> {
        self.ppm = ppm;
        Ok(())
    }

    fn set_gain_reduction(&mut self, db: u8) -> Result<(), DriverError> {
        if db > 100 {
            return Err(DriverError::InvalidParam);
        }
        self.gain_reduction = db;
        self.update_worker();
        Ok(())
    }

    fn set_agc(&mut self, mode: AgcMode) -> Result<(), DriverError> {
        self.agc = mode;
        self.update_worker();
        Ok(())
    }

    fn set_antenna(&mut self, antenna: Antenna) -> Result<(), DriverError> {
        self.antenna = antenna;
        Ok(())
    }

    fn set_dc_offset_mode(
        &mut self,
        mode: DcOffsetMode,
        speed_up: bool,
    ) -> Result<(), DriverError> {
        self.dc_offset = (mode, speed_up);
        Ok(())
    }

    fn set_dc_track_time(&mut self, time: u8) -> Result<(), DriverError> {
        if time > MAX_DC_TRACK_TIME {
            return Err(DriverError::InvalidParam);
        }
        self.dc_track_time = time;
        Ok(())
    }

    fn set_decimation(&mut self, decimation: Decimation) -> Result<(), DriverError> {
        if !DECIMATION_FACTORS.contains(&decimation.factor) {
            return Err(DriverError::InvalidParam);
        }
        self.decimation = decimation;
        self.update_worker();
        Ok(())
    }

    fn release_device(&mut self) -> Result<(), DriverError> {
        if self.worker.is_some() {
            self.stop_worker()?;
        }
        self.released = true;
        Ok(())
    }
}

impl Drop for SimulatedDriver {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.stop_worker();
        }
    }
}

struct Worker {
    control_tx: Sender<Control>,
    handle: JoinHandle<Generator>,
}

enum Control {
    Reshape(Shape),
    Stop,
}

#[derive(Debug, Clone, Copy)]
struct Shape {
    output_rate: f64,
    gain: Decibels,
}

impl Shape {
    fn block_period(&self) -> Duration {
        Duration::from_secs_f64(SAMPLES_PER_BLOCK as f64 / self.output_rate.max(1.0))
    }
}

/// Callback thread: one block per period until told to stop.
fn stream_worker(
    mut generator: Generator,
    mut shape: Shape,
    handler: SharedHandler,
    control_rx: Receiver<Control>,
) -> Generator {
    let mut samples = vec![Complex::new(0i16, 0i16); SAMPLES_PER_BLOCK];
    let mut first_sample_num: u32 = 0;
    loop {
        match control_rx.recv_timeout(shape.block_period()) {
            Ok(Control::Reshape(new_shape)) => shape = new_shape,
            Ok(Control::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                let fault = generator.fill(&mut samples, &shape).err();
                if let Some(e) = &fault {
                    error!("Simulated source failed: {e}");
                }
                let block = SampleBlock {
                    samples: &samples,
                    first_sample_num,
                    reset: false,
                    hardware_removed: fault.is_some(),
                };
                match handler.lock() {
                    Ok(mut handler) => handler.on_block(&block),
                    Err(_) => error!("Stream handler poisoned, block dropped"),
                }
                trace!("Delivered block {first_sample_num}");
                first_sample_num = first_sample_num.wrapping_add(SAMPLES_PER_BLOCK as u32);
            }
        }
    }
    info!("Simulated stream stopped");
    generator
}

enum Generator {
    Tone {
        offset_hz: f64,
        level: Decibels,
        phase: f64,
    },
    File(IqFileReader),
}

impl Generator {
    fn fill(&mut self, buf: &mut [Complex<i16>], shape: &Shape) -> io::Result<()> {
        match self {
            Generator::Tone {
                offset_hz,
                level,
                phase,
            } => {
                let amplitude =
                    (FULL_SCALE * Decibels(level.0 + shape.gain.0).to_linear()).min(FULL_SCALE);
                let step = TAU * *offset_hz / shape.output_rate.max(1.0);
                for s in buf.iter_mut() {
                    let (sin, cos) = phase.sin_cos();
                    *s = Complex::new(
                        (amplitude as f64 * cos) as i16,
                        (amplitude as f64 * sin) as i16,
                    );
                    *phase = (*phase + step) % TAU;
                }
                Ok(())
            }
            Generator::File(reader) => reader.read_block(buf),
        }
    }
}

/// Reads interleaved little-endian i16 I/Q pairs, restarting at EOF.
struct IqFileReader {
    reader: BufReader<File>,
}

impl IqFileReader {
    fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        if file.metadata()?.len() < 4 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "I/Q file holds no complete sample",
            ));
        }
        Ok(Self {
            reader: BufReader::new(file),
        })
    }

    fn read_block(&mut self, buf: &mut [Complex<i16>]) -> io::Result<()> {
        let mut pair = [0u8; 4];
        for s in buf.iter_mut() {
            match self.reader.read_exact(&mut pair) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    self.reader.seek(SeekFrom::Start(0))?;
                    self.reader.read_exact(&mut pair)?;
                }
                Err(e) => return Err(e),
            }
            *s = Complex::new(
                i16::from_le_bytes([pair[0], pair[1]]),
                i16::from_le_bytes([pair[2], pair[3]]),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{GainMode, StreamHandler};
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tempfile::NamedTempFile;

    /// Forwards every block it sees into a channel.
    struct Probe {
        tx: Sender<Vec<Complex<i16>>>,
    }

    impl StreamHandler for Probe {
        fn on_block(&mut self, block: &SampleBlock<'_>) {
            let _ = self.tx.send(block.samples.to_vec());
        }
    }

    fn capture() -> (SharedHandler, Receiver<Vec<Complex<i16>>>) {
        let (tx, rx) = flume::unbounded();
        (Arc::new(Mutex::new(Probe { tx })), rx)
    }

    fn params() -> StreamParams {
        StreamParams {
            device_rate: Hertz(2_048_000),
            frequency: Hertz(100_000_000),
            bandwidth: Bandwidth::Bw1536k,
            gain_reduction: 50,
            gain_mode: GainMode::UseSetGr,
        }
    }

    /// Helper to create a temp file with interleaved i16 I/Q
    fn create_iq_file(samples: &[i16]) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        for &val in samples {
            temp_file.write_all(&val.to_le_bytes()).unwrap();
        }
        temp_file.flush().unwrap();
        temp_file
    }

    #[test]
    fn test_stream_delivers_blocks_until_uninit() {
        let mut driver = SimulatedDriver::new(SignalSource::default()).unwrap();
        let (handler, rx) = capture();

        let info = driver.init_stream(&params(), handler).unwrap();
        assert_eq!(info.samples_per_block, SAMPLES_PER_BLOCK);

        let block = rx.recv_timeout(Duration::from_secs(2)).expect("Should receive a block");
        assert_eq!(block.len(), SAMPLES_PER_BLOCK);
        assert!(block.iter().any(|s| s.re != 0 || s.im != 0));

        driver.uninit_stream().unwrap();
        assert!(!driver.is_streaming());
        while rx.try_recv().is_ok() {}
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_status_rules() {
        let mut driver = SimulatedDriver::new(SignalSource::default()).unwrap();
        assert_eq!(
            driver.set_frequency(Hertz(100_000_000)),
            Err(DriverError::NotInitialised)
        );
        assert_eq!(driver.uninit_stream(), Err(DriverError::NotInitialised));

        let (handler, _rx) = capture();
        driver.init_stream(&params(), handler.clone()).unwrap();
        assert_eq!(
            driver.init_stream(&params(), handler).unwrap_err(),
            DriverError::AlreadyInitialised
        );
        assert_eq!(
            driver.set_frequency(Hertz::mhz(3000)),
            Err(DriverError::OutOfRange)
        );
        assert_eq!(
            driver.set_decimation(Decimation {
                enabled: true,
                factor: 3
            }),
            Err(DriverError::InvalidParam)
        );
        assert_eq!(driver.set_dc_track_time(64), Err(DriverError::InvalidParam));

        driver.release_device().unwrap();
        assert!(driver.is_released());
        assert!(!driver.is_streaming());
    }

    #[test]
    fn test_init_rejects_out_of_range_rate() {
        let mut driver = SimulatedDriver::new(SignalSource::default()).unwrap();
        let (handler, _rx) = capture();
        let mut p = params();
        p.device_rate = Hertz(384_000);
        assert_eq!(
            driver.init_stream(&p, handler.clone()).unwrap_err(),
            DriverError::OutOfRange
        );
        // The generator survives a rejected init.
        driver.init_stream(&params(), handler).unwrap();
    }

    #[test]
    fn test_reinit_keeps_unspecified_settings() {
        let mut driver = SimulatedDriver::new(SignalSource::default()).unwrap();
        let (handler, _rx) = capture();
        driver.init_stream(&params(), handler).unwrap();

        driver
            .reinit_stream(&ReinitRequest::frequency(Hertz(200_000_000)))
            .unwrap();
        assert_eq!(driver.frequency(), Hertz(200_000_000));
        assert_eq!(driver.device_rate(), Hertz(2_048_000));
    }

    #[test]
    fn test_file_source_replays_and_loops() {
        let temp_file = create_iq_file(&[1, -1, 2, -2, 3, -3]);
        let mut reader = IqFileReader::open(temp_file.path()).unwrap();
        let mut buf = vec![Complex::new(0i16, 0i16); 5];

        reader.read_block(&mut buf).unwrap();

        assert_eq!(
            buf,
            vec![
                Complex::new(1, -1),
                Complex::new(2, -2),
                Complex::new(3, -3),
                Complex::new(1, -1),
                Complex::new(2, -2),
            ]
        );
    }

    #[test]
    fn test_file_source_not_found() {
        let result = SimulatedDriver::new(SignalSource::File {
            path: "/nonexistent/path/to/file.iq".into(),
        });
        assert_eq!(result.err().unwrap().kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_empty_file_rejected() {
        let temp_file = create_iq_file(&[]);
        let result = IqFileReader::open(temp_file.path());
        assert_eq!(result.err().unwrap().kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_file_source_streams_through_driver() {
        let temp_file = create_iq_file(&[100, 200]);
        let mut driver = SimulatedDriver::new(SignalSource::File {
            path: temp_file.path().to_path_buf(),
        })
        .unwrap();
        let (handler, rx) = capture();
        driver.init_stream(&params(), handler).unwrap();

        let block = rx.recv_timeout(Duration::from_secs(2)).expect("Should receive a block");
        assert!(block.iter().all(|s| *s == Complex::new(100, 200)));
        driver.uninit_stream().unwrap();
    }
}
