use log::warn;
use rsptcp_messages::{Antenna, BitWidth, Hertz};

use crate::retry::RetryPolicy;
use crate::sampling::{self, DEFAULT_CONFIG_INDEX};

/// Session defaults, normally filled from the command line.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub frequency: Hertz,
    pub sample_rate: Hertz,
    pub gain_reduction: u8,
    pub bit_width: BitWidth,
    pub antenna: Antenna,
    pub device_index: u32,
    pub uninit_retry: RetryPolicy,
    pub retune_retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frequency: Hertz(178_352_000),
            sample_rate: Hertz(2_048_000),
            gain_reduction: 50,
            bit_width: BitWidth::Sixteen,
            antenna: Antenna::A,
            device_index: 0,
            uninit_retry: RetryPolicy::UNINIT,
            retune_retry: RetryPolicy::RETUNE,
        }
    }
}

impl SessionConfig {
    /// Table index for the configured rate, falling back to the default entry.
    pub fn config_index(&self) -> usize {
        sampling::lookup(self.sample_rate).unwrap_or_else(|| {
            warn!(
                "Invalid Sampling Rate: {}; Must be {}. Using {}",
                self.sample_rate.as_hz(),
                sampling::describe_valid_rates(),
                sampling::SAMPLING_CONFIGS[DEFAULT_CONFIG_INDEX].rate
            );
            DEFAULT_CONFIG_INDEX
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.frequency, Hertz(178_352_000));
        assert_eq!(config.gain_reduction, 50);
        assert_eq!(config.bit_width, BitWidth::Sixteen);
        assert_eq!(config.config_index(), DEFAULT_CONFIG_INDEX);
    }

    #[test]
    fn test_config_index_resolves_table_rate() {
        let config = SessionConfig {
            sample_rate: Hertz(384_000),
            ..Default::default()
        };
        assert_eq!(config.config_index(), 0);
    }

    #[test]
    fn test_config_index_falls_back() {
        let config = SessionConfig {
            sample_rate: Hertz(2_000_000),
            ..Default::default()
        };
        assert_eq!(config.config_index(), DEFAULT_CONFIG_INDEX);
    }
}
