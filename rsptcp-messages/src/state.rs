use crate::Hertz;

/// Sample format on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitWidth {
    /// Offset-binary bytes, `sample / 64 + 127`.
    Eight = 1,
    /// Little-endian signed 16-bit.
    #[default]
    Sixteen = 2,
}

impl BitWidth {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Eight),
            2 => Some(Self::Sixteen),
            _ => None,
        }
    }

    /// Bytes one I/Q pair occupies on the wire.
    pub const fn bytes_per_pair(self) -> usize {
        match self {
            Self::Eight => 2,
            Self::Sixteen => 4,
        }
    }
}

/// Antenna input of an RSP2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Antenna {
    #[default]
    A,
    B,
}

impl Antenna {
    /// Selector value the device API uses for this input.
    pub const fn selector(self) -> i32 {
        match self {
            Self::A => 5,
            Self::B => 6,
        }
    }

    /// Accepts the device selector values 5/6 and the command-line style 1/2.
    pub fn from_selector(value: i32) -> Option<Self> {
        match value {
            1 | 5 => Some(Self::A),
            2 | 6 => Some(Self::B),
            _ => None,
        }
    }
}

impl std::fmt::Display for Antenna {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "Antenna A"),
            Self::B => write!(f, "Antenna B"),
        }
    }
}

/// Snapshot of a session's device settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    /// Tuned frequency
    pub frequency: Hertz,
    /// Rate the device samples at (before decimation)
    pub device_sample_rate: Hertz,
    /// Rate the client receives
    pub sample_rate: Hertz,
    /// Index into the sampling configuration table
    pub config_index: usize,
    /// Gain reduction in dB
    pub gain_reduction: u8,
    pub agc_enabled: bool,
    pub ppm_correction: i32,
    pub antenna: Antenna,
    pub bit_width: BitWidth,
    /// Whether sample blocks are currently forwarded to the client
    pub streaming: bool,
}
