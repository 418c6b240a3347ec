//! Error types for the RingFlight engine
//!
//! This module defines the error types used throughout the engine,
//! including backend failures, slot allocation and per-frame draw failures.

use std::fmt;

/// Result type for RingFlight engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Reason a single frame could not be drawn
///
/// These are transient: the frame is skipped and the next tick tries again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawFailure {
    /// The surface had no drawable available this frame
    NoDrawable,
    /// The queue could not produce a command buffer
    NoCommandBuffer,
    /// The command buffer could not open a render encoder
    NoRenderEncoder,
}

impl fmt::Display for DrawFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrawFailure::NoDrawable => write!(f, "no drawable available"),
            DrawFailure::NoCommandBuffer => write!(f, "no command buffer available"),
            DrawFailure::NoRenderEncoder => write!(f, "no render encoder available"),
        }
    }
}

/// RingFlight engine errors
#[derive(Debug, Clone)]
pub enum Error {
    /// Backend-specific error (Vulkan, mock, etc.)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (buffer, texture, pipeline, etc.)
    InvalidResource(String),

    /// Initialization failed (engine, device, subsystems)
    InitializationFailed(String),

    /// Backend could not provide slot memory while building a frame pool
    AllocationFailed(String),

    /// Rejected configuration (zero-sized slot, zero depth, empty mesh, ...)
    InvalidConfig(String),

    /// Transient per-frame failure, the frame is skipped
    DrawFailure(DrawFailure),

    /// Bounded slot acquisition gave up
    AcquireTimeout {
        /// How long the caller waited, in milliseconds
        waited_ms: u64,
    },
}

impl Error {
    /// Whether the error only affects the current frame
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::DrawFailure(_) | Error::AcquireTimeout { .. })
    }
}

impl From<DrawFailure> for Error {
    fn from(failure: DrawFailure) -> Self {
        Error::DrawFailure(failure)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::AllocationFailed(msg) => write!(f, "Allocation failed: {}", msg),
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::DrawFailure(failure) => write!(f, "Draw failure: {}", failure),
            Error::AcquireTimeout { waited_ms } => {
                write!(f, "Timed out acquiring a frame slot after {} ms", waited_ms)
            }
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
