//! Storage target configuration and validation.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Extra history kept beyond the rolling window, in seconds.
///
/// Eviction only runs on append, so without the margin a window could
/// briefly hold less than its configured length.
pub const ROLLING_WINDOW_MARGIN: f32 = 0.2;

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected by the `validate()` methods in this module.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// `record_window` is NaN, infinite or negative.
    InvalidRecordWindow {
        /// The invalid value.
        value: f32,
    },
    /// A multichannel target needs at least one channel.
    NoChannels,
    /// `chunk_size` is zero.
    ChunkSizeZero,
    /// `cache_capacity` is below the minimum of 2 (one chunk being read
    /// plus one read ahead).
    CacheTooSmall {
        /// The configured capacity.
        configured: usize,
    },
    /// A duration setting is zero where the worker would spin or never
    /// wait.
    ZeroDuration {
        /// Which setting.
        setting: &'static str,
    },
    /// The file path is empty.
    EmptyPath,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRecordWindow { value } => {
                write!(f, "record_window must be finite and >= 0, got {value}")
            }
            Self::NoChannels => write!(f, "channels must be at least 1"),
            Self::ChunkSizeZero => write!(f, "chunk_size must be at least 1"),
            Self::CacheTooSmall { configured } => {
                write!(f, "cache_capacity {configured} is below minimum of 2")
            }
            Self::ZeroDuration { setting } => write!(f, "{setting} must be non-zero"),
            Self::EmptyPath => write!(f, "file path is empty"),
        }
    }
}

impl Error for ConfigError {}

fn validate_window(value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::InvalidRecordWindow { value });
    }
    Ok(())
}

// ── MemoryTargetConfig ────────────────────────────────────────────

/// Configuration for [`MemoryTarget`](crate::memory::MemoryTarget).
#[derive(Clone, Debug, PartialEq)]
pub struct MemoryTargetConfig {
    /// Seconds of history to keep. `0.0` keeps everything. Default: 0.
    pub record_window: f32,
}

impl Default for MemoryTargetConfig {
    fn default() -> Self {
        Self { record_window: 0.0 }
    }
}

impl MemoryTargetConfig {
    /// Check that the window is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_window(self.record_window)
    }
}

// ── MultichannelConfig ────────────────────────────────────────────

/// Configuration for
/// [`MultichannelMemoryTarget`](crate::multichannel::MultichannelMemoryTarget).
#[derive(Clone, Debug, PartialEq)]
pub struct MultichannelConfig {
    /// Initial number of channels. Default: 1. Minimum: 1.
    pub channels: usize,
    /// Rolling window applied to every channel. Default: 0 (unbounded).
    pub record_window: f32,
}

impl Default for MultichannelConfig {
    fn default() -> Self {
        Self {
            channels: 1,
            record_window: 0.0,
        }
    }
}

impl MultichannelConfig {
    /// Check the channel floor and the window.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels == 0 {
            return Err(ConfigError::NoChannels);
        }
        validate_window(self.record_window)
    }
}

// ── FileTargetConfig ──────────────────────────────────────────────

/// Configuration for [`FileTarget`](crate::file::FileTarget).
#[derive(Clone, Debug, PartialEq)]
pub struct FileTargetConfig {
    /// Replay file location.
    pub path: PathBuf,
    /// Snapshots per chunk before it is handed to the writer. Default: 24.
    pub chunk_size: usize,
    /// Decoded chunks kept in memory while reading. Default: 8. Minimum: 2.
    pub cache_capacity: usize,
    /// Longest time a blocking call waits for its task. `None` waits
    /// forever, checking for a stopped worker every `poll_interval`.
    /// Default: 30 s.
    pub task_timeout: Option<Duration>,
    /// Poll period used when waiting without a timeout. Default: 10 ms.
    pub poll_interval: Duration,
    /// How long drop waits for the worker to drain. Default: 2 s.
    pub shutdown_timeout: Duration,
}

impl FileTargetConfig {
    /// Defaults for a file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Check every setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyPath);
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ChunkSizeZero);
        }
        if self.cache_capacity < 2 {
            return Err(ConfigError::CacheTooSmall {
                configured: self.cache_capacity,
            });
        }
        if self.task_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroDuration {
                setting: "task_timeout",
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroDuration {
                setting: "poll_interval",
            });
        }
        Ok(())
    }
}

impl Default for FileTargetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("recording.rwd"),
            chunk_size: 24,
            cache_capacity: 8,
            task_timeout: Some(Duration::from_secs(30)),
            poll_interval: Duration::from_millis(10),
            shutdown_timeout: Duration::from_secs(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        MemoryTargetConfig::default().validate().unwrap();
        MultichannelConfig::default().validate().unwrap();
        FileTargetConfig::default().validate().unwrap();
    }

    #[test]
    fn negative_or_nan_window_rejected() {
        for value in [-1.0, f32::NAN, f32::INFINITY] {
            let cfg = MemoryTargetConfig {
                record_window: value,
            };
            assert!(matches!(
                cfg.validate(),
                Err(ConfigError::InvalidRecordWindow { .. })
            ));
        }
    }

    #[test]
    fn zero_channels_rejected() {
        let cfg = MultichannelConfig {
            channels: 0,
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::NoChannels));
    }

    #[test]
    fn file_limits_enforced() {
        let mut cfg = FileTargetConfig::new("a.rwd");
        cfg.chunk_size = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ChunkSizeZero));

        let mut cfg = FileTargetConfig::new("a.rwd");
        cfg.cache_capacity = 1;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::CacheTooSmall { configured: 1 })
        );

        let mut cfg = FileTargetConfig::new("");
        cfg.chunk_size = 4;
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyPath));

        let mut cfg = FileTargetConfig::new("a.rwd");
        cfg.task_timeout = Some(Duration::ZERO);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::ZeroDuration { .. })
        ));
    }
}
