//! Error types for the OCR request queue.
//!
//! `enqueue` never returns an error: engine failures and caller cancellations
//! both surface as a `None` result. Errors show up at the edges instead:
//!
//! - `Io` - File system errors from configuration loading or engine I/O
//! - `Ocr` - The engine ran but could not produce a usable result
//! - `Validation` - Invalid configuration or OCR parameters
//! - `Serialization` - Malformed TOML/JSON configuration files
//! - `Engine` - The engine binary or backend itself misbehaved
//!
//! # Example
//!
//! ```rust
//! use ocrqueue::{OcrQueueError, Result};
//!
//! fn check_language(code: &str) -> Result<()> {
//!     if code.is_empty() {
//!         return Err(OcrQueueError::validation("language code must not be empty"));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_language("").is_err());
//! ```
use thiserror::Error;

/// Result type alias using `OcrQueueError`.
pub type Result<T> = std::result::Result<T, OcrQueueError>;

/// Main error type for queue configuration and engine operations.
#[derive(Debug, Error)]
pub enum OcrQueueError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("OCR error: {message}")]
    Ocr {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Engine error in '{engine}': {message}")]
    Engine { message: String, engine: String },
}

impl From<serde_json::Error> for OcrQueueError {
    fn from(err: serde_json::Error) -> Self {
        OcrQueueError::Serialization {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<toml::de::Error> for OcrQueueError {
    fn from(err: toml::de::Error) -> Self {
        OcrQueueError::Serialization {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

macro_rules! error_constructor {
    ($name:ident, $variant:ident) => {
        pastey::paste! {
            #[doc = "Create a " $variant " error"]
            pub fn $name<S: Into<String>>(message: S) -> Self {
                Self::$variant {
                    message: message.into(),
                    source: None,
                }
            }

            #[doc = "Create a " $variant " error with source"]
            pub fn [<$name _with_source>]<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
                message: S,
                source: E,
            ) -> Self {
                Self::$variant {
                    message: message.into(),
                    source: Some(Box::new(source)),
                }
            }
        }
    };
}

impl OcrQueueError {
    error_constructor!(ocr, Ocr);
    error_constructor!(validation, Validation);
    error_constructor!(serialization, Serialization);

    /// Create an Engine error attributed to the named engine
    pub fn engine<E: Into<String>, S: Into<String>>(engine: E, message: S) -> Self {
        Self::Engine {
            engine: engine.into(),
            message: message.into(),
        }
    }
}
