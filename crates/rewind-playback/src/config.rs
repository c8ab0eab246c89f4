//! Session configuration.

use std::error::Error;
use std::fmt;

use crate::sequencer::EndBehaviour;

/// Errors detected by [`SessionConfig::validate`].
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// `record_fps` is not a finite positive number.
    InvalidRecordFps {
        /// The invalid value.
        value: f32,
    },
    /// `time_scale` is NaN or infinite.
    InvalidTimeScale {
        /// The invalid value.
        value: f32,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRecordFps { value } => {
                write!(f, "record_fps must be finite and > 0, got {value}")
            }
            Self::InvalidTimeScale { value } => {
                write!(f, "time_scale must be finite, got {value}")
            }
        }
    }
}

impl Error for ConfigError {}

/// Configuration for a [`ReplaySession`](crate::session::ReplaySession).
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    /// Snapshots sampled per second of recording. Default: 16.
    pub record_fps: f32,
    /// Playback speed multiplier. Negative values play backwards.
    /// Default: 1.0.
    pub time_scale: f32,
    /// What happens when playback runs off either end. Default:
    /// [`EndBehaviour::StopPlayback`].
    pub end_behaviour: EndBehaviour,
    /// Seed for identity generation. `None` seeds from the OS.
    pub identity_seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            record_fps: 16.0,
            time_scale: 1.0,
            end_behaviour: EndBehaviour::StopPlayback,
            identity_seed: None,
        }
    }
}

impl SessionConfig {
    /// Seconds between recorded samples.
    pub fn record_interval(&self) -> f32 {
        1.0 / self.record_fps
    }

    /// Check every setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.record_fps.is_finite() || self.record_fps <= 0.0 {
            return Err(ConfigError::InvalidRecordFps {
                value: self.record_fps,
            });
        }
        validate_time_scale(self.time_scale)
    }
}

pub(crate) fn validate_time_scale(value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::InvalidTimeScale { value });
    }
    Ok(())
}
