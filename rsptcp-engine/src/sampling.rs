use rsptcp_messages::Hertz;

use crate::driver::{Bandwidth, Decimation};

/// One supported combination of client rate, device rate, filter and decimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingConfig {
    /// Rate the client sees
    pub rate: Hertz,
    /// Rate the device ADC runs at
    pub device_rate: Hertz,
    pub bandwidth: Bandwidth,
    pub decimation_factor: u32,
    pub decimation_enabled: bool,
}

impl SamplingConfig {
    const fn new(
        rate: u64,
        device_rate: u64,
        bandwidth: Bandwidth,
        decimation_factor: u32,
        decimation_enabled: bool,
    ) -> Self {
        Self {
            rate: Hertz(rate),
            device_rate: Hertz(device_rate),
            bandwidth,
            decimation_factor,
            decimation_enabled,
        }
    }

    /// Decimation to program after the stream is up. Always concrete, so a
    /// previous factor is switched off explicitly.
    pub fn decimation(&self) -> Decimation {
        if self.decimation_enabled {
            Decimation {
                enabled: true,
                factor: self.decimation_factor,
            }
        } else {
            Decimation::OFF
        }
    }
}

/// Every sampling configuration the server offers, in ascending rate order.
pub static SAMPLING_CONFIGS: [SamplingConfig; 6] = [
    SamplingConfig::new(384_000, 3_072_000, Bandwidth::Bw200k, 8, true),
    SamplingConfig::new(512_000, 2_048_000, Bandwidth::Bw300k, 4, true),
    SamplingConfig::new(1_024_000, 2_048_000, Bandwidth::Bw600k, 2, true),
    SamplingConfig::new(2_048_000, 2_048_000, Bandwidth::Bw1536k, 1, false),
    SamplingConfig::new(4_096_000, 4_096_000, Bandwidth::Bw5000k, 1, false),
    SamplingConfig::new(8_192_000, 8_192_000, Bandwidth::Bw8000k, 1, false),
];

/// Index of the 2.048 MHz configuration.
pub const DEFAULT_CONFIG_INDEX: usize = 3;

/// Exact-match lookup of a client sample rate.
pub fn lookup(rate: Hertz) -> Option<usize> {
    SAMPLING_CONFIGS.iter().position(|c| c.rate == rate)
}

/// All supported client rates.
pub fn valid_rates() -> Vec<Hertz> {
    SAMPLING_CONFIGS.iter().map(|c| c.rate).collect()
}

/// "384000 or 512000 or ..." for log messages.
pub fn describe_valid_rates() -> String {
    SAMPLING_CONFIGS
        .iter()
        .map(|c| c.rate.as_hz().to_string())
        .collect::<Vec<_>>()
        .join(" or ")
}
