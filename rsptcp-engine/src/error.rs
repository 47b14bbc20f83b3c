use rsptcp_messages::Hertz;

use crate::driver::DriverError;
use crate::sampling;

/// Why a command or reconfiguration step did not take effect.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{op} failed: {source} ({})", .source.status_code())]
    Driver {
        op: &'static str,
        #[source]
        source: DriverError,
    },

    #[error("invalid sampling rate {requested}; must be {}", sampling::describe_valid_rates())]
    UnsupportedRate { requested: Hertz, valid: Vec<Hertz> },

    #[error("{what} value {value} out of range")]
    InvalidValue { what: &'static str, value: i32 },
}

impl SessionError {
    pub(crate) fn driver(op: &'static str) -> impl FnOnce(DriverError) -> Self {
        move |source| Self::Driver { op, source }
    }

    /// The driver status behind this error, if any.
    pub fn driver_error(&self) -> Option<DriverError> {
        match self {
            Self::Driver { source, .. } => Some(*source),
            _ => None,
        }
    }
}
