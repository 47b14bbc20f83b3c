/// Size of one client command on the wire: a code byte and a 32-bit value.
pub const COMMAND_LEN: usize = 5;

/// Command codes of the rtl_tcp protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandCode {
    SetFrequency = 1,
    SetSampleRate = 2,
    SetGainMode = 3,
    SetGain = 4,
    SetFrequencyCorrection = 5,
    SetIfGain = 6,
    SetAgcMode = 8,
    SetDirectSampling = 9,
    SetOffsetTuning = 10,
    SetTunerGainByIndex = 13,
    SetAntenna = 33,
}

impl CommandCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::SetFrequency,
            2 => Self::SetSampleRate,
            3 => Self::SetGainMode,
            4 => Self::SetGain,
            5 => Self::SetFrequencyCorrection,
            6 => Self::SetIfGain,
            8 => Self::SetAgcMode,
            9 => Self::SetDirectSampling,
            10 => Self::SetOffsetTuning,
            13 => Self::SetTunerGainByIndex,
            33 => Self::SetAntenna,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::SetFrequency => "set_frequency",
            Self::SetSampleRate => "set_sample_rate",
            Self::SetGainMode => "set_gain_mode",
            Self::SetGain => "set_gain",
            Self::SetFrequencyCorrection => "set_freq_correction",
            Self::SetIfGain => "set_if_gain",
            Self::SetAgcMode => "set_agc_mode",
            Self::SetDirectSampling => "set_direct_sampling",
            Self::SetOffsetTuning => "set_offset_tuning",
            Self::SetTunerGainByIndex => "set_tuner_gain_by_index",
            Self::SetAntenna => "set_antenna",
        }
    }
}

/// A decoded client command.
///
/// Values are kept as the raw signed integers the client sent; range checks
/// belong to the session, which knows what the device accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Tune to a frequency in Hz.
    SetFrequency(i32),
    /// Change the logical sample rate in Hz.
    SetSampleRate(i32),
    /// Frequency correction in ppm.
    SetFrequencyCorrection(i32),
    /// Gain on a 0..=100 scale, higher is more gain.
    SetTunerGainByIndex(i32),
    /// AGC on (non-zero) or off (zero).
    SetAgcMode(bool),
    /// Antenna selector.
    SetAntenna(i32),
    /// A valid rtl_tcp command this device has no use for.
    Unsupported { code: CommandCode, value: i32 },
    /// A code outside the rtl_tcp table.
    Unknown { code: u8, value: i32 },
}

impl Command {
    /// Decode one 5-byte command. The value is big-endian on the wire.
    pub fn parse(bytes: [u8; COMMAND_LEN]) -> Self {
        let value = i32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let Some(code) = CommandCode::from_u8(bytes[0]) else {
            return Self::Unknown {
                code: bytes[0],
                value,
            };
        };
        match code {
            CommandCode::SetFrequency => Self::SetFrequency(value),
            CommandCode::SetSampleRate => Self::SetSampleRate(value),
            CommandCode::SetFrequencyCorrection => Self::SetFrequencyCorrection(value),
            CommandCode::SetTunerGainByIndex => Self::SetTunerGainByIndex(value),
            CommandCode::SetAgcMode => Self::SetAgcMode(value != 0),
            CommandCode::SetAntenna => Self::SetAntenna(value),
            code => Self::Unsupported { code, value },
        }
    }

    /// Encode back into wire form. Used by clients and tests.
    pub fn to_bytes(self) -> [u8; COMMAND_LEN] {
        let (code, value) = match self {
            Self::SetFrequency(v) => (CommandCode::SetFrequency as u8, v),
            Self::SetSampleRate(v) => (CommandCode::SetSampleRate as u8, v),
            Self::SetFrequencyCorrection(v) => (CommandCode::SetFrequencyCorrection as u8, v),
            Self::SetTunerGainByIndex(v) => (CommandCode::SetTunerGainByIndex as u8, v),
            Self::SetAgcMode(on) => (CommandCode::SetAgcMode as u8, on as i32),
            Self::SetAntenna(v) => (CommandCode::SetAntenna as u8, v),
            Self::Unsupported { code, value } => (code as u8, value),
            Self::Unknown { code, value } => (code, value),
        };
        let v = value.to_be_bytes();
        [code, v[0], v[1], v[2], v[3]]
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SetFrequency(v) => write!(f, "set_frequency({v} Hz)"),
            Self::SetSampleRate(v) => write!(f, "set_sample_rate({v} Hz)"),
            Self::SetFrequencyCorrection(v) => write!(f, "set_freq_correction({v} ppm)"),
            Self::SetTunerGainByIndex(v) => write!(f, "set_tuner_gain_by_index({v})"),
            Self::SetAgcMode(on) => write!(f, "set_agc_mode({})", if *on { "on" } else { "off" }),
            Self::SetAntenna(v) => write!(f, "set_antenna({v})"),
            Self::Unsupported { code, value } => write!(f, "{}({value})", code.name()),
            Self::Unknown { code, value } => write!(f, "unknown(0x{code:02x}, {value})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frequency_is_big_endian() {
        let cmd = Command::parse([1, 0x0A, 0x99, 0xBE, 0x00]);
        assert_eq!(cmd, Command::SetFrequency(0x0A99_BE00));
        assert_eq!(cmd, Command::SetFrequency(177_847_808));
    }

    #[test]
    fn test_parse_sample_rate() {
        let cmd = Command::parse([2, 0x00, 0x1E, 0x84, 0x80]);
        assert_eq!(cmd, Command::SetSampleRate(2_000_000));
    }

    #[test]
    fn test_parse_negative_value() {
        let cmd = Command::parse([5, 0xFF, 0xFF, 0xFF, 0xF6]);
        assert_eq!(cmd, Command::SetFrequencyCorrection(-10));
    }

    #[test]
    fn test_parse_agc_mode_any_nonzero_is_on() {
        assert_eq!(Command::parse([8, 0, 0, 0, 0]), Command::SetAgcMode(false));
        assert_eq!(Command::parse([8, 0, 0, 0, 1]), Command::SetAgcMode(true));
        assert_eq!(Command::parse([8, 0, 1, 0, 0]), Command::SetAgcMode(true));
    }

    #[test]
    fn test_parse_unsupported_and_unknown() {
        assert_eq!(
            Command::parse([3, 0, 0, 0, 1]),
            Command::Unsupported {
                code: CommandCode::SetGainMode,
                value: 1
            }
        );
        assert_eq!(
            Command::parse([0x7F, 0, 0, 0, 2]),
            Command::Unknown {
                code: 0x7F,
                value: 2
            }
        );
    }

    #[test]
    fn test_to_bytes_matches_wire_layout() {
        assert_eq!(
            Command::SetSampleRate(2_048_000).to_bytes(),
            [2, 0x00, 0x1F, 0x40, 0x00]
        );
        assert_eq!(Command::SetAntenna(6).to_bytes(), [33, 0, 0, 0, 6]);
    }

    #[test]
    fn test_display_names_command() {
        assert_eq!(
            Command::Unsupported {
                code: CommandCode::SetOffsetTuning,
                value: 1
            }
            .to_string(),
            "set_offset_tuning(1)"
        );
        assert_eq!(Command::SetAgcMode(true).to_string(), "set_agc_mode(on)");
    }
}
