//! Error types for the native plugin
//!
//! Nothing here crosses the language boundary as a structured value: the
//! Unity surface only logs, and the JNI surface collapses every error into
//! an integer sentinel via [`to_sentinel`].

use std::fmt;
use jni::sys::jint;
use thiserror::Error;

/// Result type alias for plugin operations
pub type Result<T> = std::result::Result<T, PluginError>;

/// Returned across JNI when an operation succeeded
pub const SENTINEL_OK: jint = 1;

/// Returned across JNI when an operation failed
pub const SENTINEL_FAILED: jint = 0;

/// Main error type for the native plugin
#[derive(Error, Debug)]
pub enum PluginError {
    // === GPU errors ===
    #[error("Texture allocation failed: texture {texture} glGetError=0x{code:x}")]
    Allocation { texture: u32, code: u32 },

    #[error("Cannot allocate pixel buffer for {width}x{height}")]
    PixelBuffer { width: u32, height: u32 },

    #[error("Failed to load GL library {library}: {reason}")]
    GlLoad { library: String, reason: String },

    // === Parameter errors ===
    #[error("Invalid argument: {parameter}: {reason}")]
    InvalidArgument { parameter: String, reason: String },

    #[error("Null pointer: {context}")]
    NullPointer { context: String },

    // === Cross-runtime errors ===
    #[error("Hardware buffer conversion failed: {0}")]
    ConversionFailure(String),

    #[error("JNI error: {0}")]
    Jni(#[from] jni::errors::Error),
}

// Helper constructors for common error patterns
impl PluginError {
    /// Create an invalid argument error
    pub fn invalid_argument(parameter: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::InvalidArgument {
            parameter: parameter.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a null pointer error
    pub fn null_pointer(context: impl fmt::Display) -> Self {
        Self::NullPointer {
            context: context.to_string(),
        }
    }

    /// Create a GL loading error
    pub fn gl_load(library: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::GlLoad {
            library: library.to_string(),
            reason: reason.to_string(),
        }
    }

    /// The GL error code carried by this error, if any
    pub fn gl_code(&self) -> Option<u32> {
        match self {
            Self::Allocation { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Collapse a result into a JNI sentinel, logging the failure.
pub fn to_sentinel(operation: &str, result: Result<()>) -> jint {
    match result {
        Ok(()) => SENTINEL_OK,
        Err(e) => {
            log::error!("{} failed: {}", operation, e);
            SENTINEL_FAILED
        }
    }
}
