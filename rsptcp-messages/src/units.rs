/// Frequency in Hertz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hertz(pub u64);

impl std::fmt::Display for Hertz {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} Hz", self.0)
    }
}

impl Hertz {
    pub const fn khz(khz: u64) -> Self {
        Self(khz * 1_000)
    }

    pub const fn mhz(mhz: u64) -> Self {
        Self(mhz * 1_000_000)
    }

    pub const fn as_hz(self) -> u64 {
        self.0
    }

    /// Value in MHz, the unit the device API takes rates and frequencies in.
    pub fn as_mhz_f64(self) -> f64 {
        self.0 as f64 / 1e6
    }
}

/// Command values arrive as signed 32-bit integers; negative values have no
/// meaning as a frequency or rate.
impl TryFrom<i32> for Hertz {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        u64::try_from(value).map(Self).map_err(|_| value)
    }
}

/// Level in decibels. Used both for gain reduction and for dBFS setpoints.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Decibels(pub f32);

impl std::fmt::Display for Decibels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1} dB", self.0)
    }
}

impl Decibels {
    /// Convert decibels to linear amplitude.
    /// For voltage/amplitude: linear = 10^(dB/20)
    pub fn to_linear(self) -> f32 {
        10.0_f32.powf(self.0 / 20.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hertz_from_command_value() {
        assert_eq!(Hertz::try_from(178_352_128), Ok(Hertz(178_352_128)));
        assert_eq!(Hertz::try_from(0), Ok(Hertz(0)));
        assert_eq!(Hertz::try_from(-5), Err(-5));
    }

    #[test]
    fn test_hertz_constructors() {
        assert_eq!(Hertz::khz(384), Hertz(384_000));
        assert_eq!(Hertz::mhz(2), Hertz(2_000_000));
        assert!((Hertz(2_048_000).as_mhz_f64() - 2.048).abs() < 1e-9);
    }

    #[test]
    fn test_decibels_linear() {
        assert!((Decibels(0.0).to_linear() - 1.0).abs() < 1e-6);
        assert!((Decibels(-20.0).to_linear() - 0.1).abs() < 1e-6);
    }
}
