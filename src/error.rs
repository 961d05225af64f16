//! Error handling for encrypted training
//!
//! Provides a single `HeError` type shared by the primitive layer and the
//! gradient-descent engine. Every variant is fatal for the current run; nothing
//! here is retried automatically.

use std::fmt;

/// Coarse classification of an [`HeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Incompatible dimensions, degrees, scales or parameters. Detected before
    /// (or instead of) any ciphertext operation.
    Configuration,
    /// A rescale was requested on a ciphertext with no level left.
    DepthExhausted,
}

/// Encrypted training error
#[derive(Debug, Clone, PartialEq)]
pub enum HeError {
    /// Generic configuration error with a message
    Configuration(String),
    /// Polynomial degree outside {3, 5, 7}
    InvalidDegree(usize),
    /// Operand scales differ (bits)
    ScaleMismatch { left: u32, right: u32 },
    /// Operand levels differ
    LevelMismatch { left: usize, right: usize },
    /// Fixed-point representation would overflow
    ScaleOverflow { scale_bits: u32 },
    /// No key-switching key for the requested rotation
    MissingRotationKey { offset: usize },
    /// Planned iterations need more depth than the initial level provides
    DepthBudget { required: usize, available: usize },
    /// A rescale (or a whole iteration) needs more levels than remain
    DepthExhausted { required: usize, available: usize },
    /// Training data could not be read or parsed
    Data(String),
}

impl HeError {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            HeError::DepthExhausted { .. } => ErrorKind::DepthExhausted,
            _ => ErrorKind::Configuration,
        }
    }

    pub fn is_depth_exhausted(&self) -> bool {
        self.kind() == ErrorKind::DepthExhausted
    }
}

impl fmt::Display for HeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            HeError::InvalidDegree(d) => {
                write!(f, "invalid approximation degree {} (expected 3, 5 or 7)", d)
            }
            HeError::ScaleMismatch { left, right } => {
                write!(f, "scale mismatch: 2^{} vs 2^{}", left, right)
            }
            HeError::LevelMismatch { left, right } => {
                write!(f, "level mismatch: {} vs {}", left, right)
            }
            HeError::ScaleOverflow { scale_bits } => {
                write!(f, "fixed-point overflow at scale 2^{}", scale_bits)
            }
            HeError::MissingRotationKey { offset } => {
                write!(f, "no rotation key for offset {}", offset)
            }
            HeError::DepthBudget {
                required,
                available,
            } => write!(
                f,
                "depth budget exceeded: plan needs {} levels, {} available",
                required, available
            ),
            HeError::DepthExhausted {
                required,
                available,
            } => write!(
                f,
                "depth exhausted: {} levels required, {} remaining",
                required, available
            ),
            HeError::Data(msg) => write!(f, "data error: {}", msg),
        }
    }
}

impl std::error::Error for HeError {}

impl From<std::io::Error> for HeError {
    fn from(err: std::io::Error) -> Self {
        Self::Data(err.to_string())
    }
}

/// Result type for encrypted training operations
pub type Result<T> = std::result::Result<T, HeError>;

/// Create a configuration `HeError` with format string support
macro_rules! config_err {
    ($($arg:tt)*) => {
        $crate::error::HeError::Configuration(format!($($arg)*))
    };
}

pub(crate) use config_err;
