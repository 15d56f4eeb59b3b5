use thiserror::Error;

/// Errors surfaced while constructing a windowing operator.
///
/// Everything past construction is infallible at the type level: a malformed
/// [`crate::item::Item`] reaching an operator is a wiring bug, not a data
/// condition, and is handled by panicking (see the runtime contract in
/// [`crate::operator`]).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("frameLength must be positive, got {0}")]
    NonPositiveFrameLength(i64),

    #[error("framesPerWindow must be at least 1, got {0}")]
    NonPositiveFramesPerWindow(i64),

    #[error("maxGap must be non-negative, got {0}")]
    NegativeMaxGap(i64),
}
