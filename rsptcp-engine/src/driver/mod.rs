//! Device driver capability consumed by the session engine.
//!
//! Every call is synchronous and may fail with a [`DriverError`]; none of them
//! retry. Sample delivery happens on a context the driver owns: the handler
//! passed to [`DeviceDriver::init_stream`] is invoked from there.

mod simulated;

pub use simulated::{SignalSource, SimulatedDriver};

use num_complex::Complex;
use rsptcp_messages::{Antenna, Decibels, Hertz};
use std::sync::{Arc, Mutex};

/// Status codes of the device API, minus success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    #[error("generic failure")]
    Fail,
    #[error("invalid parameter")]
    InvalidParam,
    #[error("out of range")]
    OutOfRange,
    #[error("gain update error")]
    GainUpdateError,
    #[error("rf update error")]
    RfUpdateError,
    #[error("sample rate update error")]
    FsUpdateError,
    #[error("hardware error")]
    HwError,
    #[error("aliasing error")]
    AliasingError,
    #[error("already initialised")]
    AlreadyInitialised,
    #[error("not initialised")]
    NotInitialised,
    #[error("not enabled")]
    NotEnabled,
    #[error("hardware version error")]
    HwVerError,
    #[error("out of memory")]
    OutOfMemError,
    #[error("hardware removed")]
    HwRemoved,
}

impl DriverError {
    /// Numeric status code as reported by the device API.
    pub const fn status_code(self) -> u32 {
        match self {
            Self::Fail => 1,
            Self::InvalidParam => 2,
            Self::OutOfRange => 3,
            Self::GainUpdateError => 4,
            Self::RfUpdateError => 5,
            Self::FsUpdateError => 6,
            Self::HwError => 7,
            Self::AliasingError => 8,
            Self::AlreadyInitialised => 9,
            Self::NotInitialised => 10,
            Self::NotEnabled => 11,
            Self::HwVerError => 12,
            Self::OutOfMemError => 13,
            Self::HwRemoved => 14,
        }
    }
}

/// IF filter bandwidth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bandwidth {
    Bw200k,
    Bw300k,
    Bw600k,
    Bw1536k,
    Bw5000k,
    Bw6000k,
    Bw7000k,
    Bw8000k,
}

impl Bandwidth {
    /// Bandwidth code: the filter width in kHz.
    pub const fn code(self) -> u32 {
        match self {
            Self::Bw200k => 200,
            Self::Bw300k => 300,
            Self::Bw600k => 600,
            Self::Bw1536k => 1536,
            Self::Bw5000k => 5000,
            Self::Bw6000k => 6000,
            Self::Bw7000k => 7000,
            Self::Bw8000k => 8000,
        }
    }
}

/// How the device interprets gain reduction requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GainMode {
    #[default]
    UseSetGr,
}

/// Parameters for a full stream initialisation.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamParams {
    pub device_rate: Hertz,
    pub frequency: Hertz,
    pub bandwidth: Bandwidth,
    pub gain_reduction: u8,
    pub gain_mode: GainMode,
}

/// What the driver reports back after (re)initialising a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub samples_per_block: usize,
}

/// A lightweight reinitialisation. `None` fields keep their current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReinitRequest {
    pub frequency: Option<Hertz>,
    pub device_rate: Option<Hertz>,
    pub bandwidth: Option<Bandwidth>,
}

impl ReinitRequest {
    pub fn frequency(hz: Hertz) -> Self {
        Self {
            frequency: Some(hz),
            ..Default::default()
        }
    }

    /// Human-readable list of what this request changes, for logging.
    pub fn reasons(&self) -> Vec<&'static str> {
        let mut reasons = Vec::new();
        if self.frequency.is_some() {
            reasons.push("rf_freq");
        }
        if self.device_rate.is_some() {
            reasons.push("fs_freq");
        }
        if self.bandwidth.is_some() {
            reasons.push("bw_type");
        }
        reasons
    }
}

/// AGC loop setting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AgcMode {
    Disabled,
    /// 5 Hz loop holding the level at `setpoint` dBFS.
    Enabled { setpoint: Decibels },
}

/// Tuner DC offset correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DcOffsetMode {
    Static,
    OneShot,
}

impl DcOffsetMode {
    pub const fn code(self) -> u8 {
        match self {
            Self::Static => 0,
            Self::OneShot => 4,
        }
    }
}

/// Driver-side decimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimation {
    pub enabled: bool,
    pub factor: u32,
}

impl Decimation {
    pub const OFF: Self = Self {
        enabled: false,
        factor: 1,
    };
}

/// One block of raw samples as delivered by the driver.
#[derive(Debug, Clone, Copy)]
pub struct SampleBlock<'a> {
    pub samples: &'a [Complex<i16>],
    pub first_sample_num: u32,
    /// The driver reset its stream; the block content is meaningless.
    pub reset: bool,
    /// The device was unplugged.
    pub hardware_removed: bool,
}

/// Receives sample blocks on the driver's callback context.
///
/// Implementations must return promptly and must never panic back into the driver.
pub trait StreamHandler: Send {
    fn on_block(&mut self, block: &SampleBlock<'_>);

    /// The session is over; release the client connection.
    fn close(&mut self) {}
}

/// Handler shared between the session (which creates it) and the driver
/// (which calls it). Only the driver's callback context locks it in steady state.
pub type SharedHandler = Arc<Mutex<dyn StreamHandler>>;

/// Narrow capability surface of the receiver hardware.
pub trait DeviceDriver: Send {
    fn api_version(&mut self) -> Result<f32, DriverError>;
    fn hardware_version(&mut self) -> Result<u8, DriverError>;

    /// Start streaming. Blocks are delivered to `handler` until `uninit_stream`.
    fn init_stream(
        &mut self,
        params: &StreamParams,
        handler: SharedHandler,
    ) -> Result<StreamInfo, DriverError>;
    fn reinit_stream(&mut self, request: &ReinitRequest) -> Result<StreamInfo, DriverError>;
    fn uninit_stream(&mut self) -> Result<(), DriverError>;

    fn set_frequency(&mut self, frequency: Hertz) -> Result<(), DriverError>;
    fn set_frequency_correction(&mut self, ppm: i32) -> Result<(), DriverError>;
    fn set_gain_reduction(&mut self, db: u8) -> Result<(), DriverError>;
    fn set_agc(&mut self, mode: AgcMode) -> Result<(), DriverError>;
    fn set_antenna(&mut self, antenna: Antenna) -> Result<(), DriverError>;
    fn set_dc_offset_mode(&mut self, mode: DcOffsetMode, speed_up: bool)
    -> Result<(), DriverError>;
    fn set_dc_track_time(&mut self, time: u8) -> Result<(), DriverError>;
    fn set_decimation(&mut self, decimation: Decimation) -> Result<(), DriverError>;
    fn release_device(&mut self) -> Result<(), DriverError>;
}

/// Lets a session borrow a driver that outlives it.
impl<D: DeviceDriver + ?Sized> DeviceDriver for &mut D {
    fn api_version(&mut self) -> Result<f32, DriverError> {
        (**self).api_version()
    }

    fn hardware_version(&mut self) -> Result<u8, DriverError> {
        (**self).hardware_version()
    }

    fn init_stream(
        &mut self,
        params: &StreamParams,
        handler: SharedHandler,
    ) -> Result<StreamInfo, DriverError> {
        (**self).init_stream(params, handler)
    }

    fn reinit_stream(&mut self, request: &ReinitRequest) -> Result<StreamInfo, DriverError> {
        (**self).reinit_stream(request)
    }

    fn uninit_stream(&mut self) -> Result<(), DriverError> {
        (**self).uninit_stream()
    }

    fn set_frequency(&mut self, frequency: Hertz) -> Result<(), DriverError> {
        (**self).set_frequency(frequency)
    }

    fn set_frequency_correction(&mut self, ppm: i32) -> Result<(), DriverError> {
        (**self).set_frequency_correction(ppm)
    }

    fn set_gain_reduction(&mut self, db: u8) -> Result<(), DriverError> {
        (**self).set_gain_reduction(db)
    }

    fn set_agc(&mut self, mode: AgcMode) -> Result<(), DriverError> {
        (**self).set_agc(mode)
    }

    fn set_antenna(&mut self, antenna: Antenna) -> Result<(), DriverError> {
        (**self).set_antenna(antenna)
    }

    fn set_dc_offset_mode(
        &mut self,
        mode: DcOffsetMode,
        speed_up: bool,
    ) -> Result<(), DriverError> {
        (**self).set_dc_offset_mode(mode, speed_up)
    }

    fn set_dc_track_time(&mut self, time: u8) -> Result<(), DriverError> {
        (**self).set_dc_track_time(time)
    }

    fn set_decimation(&mut self, decimation: Decimation) -> Result<(), DriverError> {
        (**self).set_decimation(decimation)
    }

    fn release_device(&mut self) -> Result<(), DriverError> {
        (**self).release_device()
    }
}
