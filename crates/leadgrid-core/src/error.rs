//! Core error types for LeadGrid.
//!
//! Each subsystem crate defines its own error enum; this module holds the
//! errors raised by the shared model, configuration, and geo utilities.

use thiserror::Error;

/// Central error type for core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration errors (file loading, parsing, validation)
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Geometry errors (grid generation, coordinates)
    #[error("geo error: {0}")]
    Geo(#[from] GeoError),

    /// Validation errors (invalid input, constraints)
    #[error("validation error: {0}")]
    Validation(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to determine config directory path
    #[error("could not determine config directory (XDG base directories not available)")]
    NoConfigDir,

    /// Failed to parse TOML
    #[error("failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config
    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// I/O error reading/writing config
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue {
        /// Field name
        field: String,
        /// Reason for invalidity
        reason: String,
    },
}

/// Errors raised by grid generation and coordinate handling.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeoError {
    /// Search radius was zero, negative, or not a finite number
    #[error("radius must be a positive number of kilometres, got {0}")]
    InvalidRadius(f64),

    /// Latitude or longitude out of range
    #[error("coordinates out of range: ({latitude}, {longitude})")]
    InvalidCoordinates {
        /// Latitude in degrees
        latitude: f64,
        /// Longitude in degrees
        longitude: f64,
    },
}

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::Validation("empty keyword".to_string());
        assert_eq!(err.to_string(), "validation error: empty keyword");

        let err = GeoError::InvalidRadius(-1.0);
        assert_eq!(
            err.to_string(),
            "radius must be a positive number of kilometres, got -1"
        );
    }

    #[test]
    fn test_error_from_geo() {
        let core_err: CoreError = GeoError::InvalidRadius(0.0).into();
        assert!(matches!(core_err, CoreError::Geo(_)));
    }

    #[test]
    fn test_error_from_config() {
        let core_err: CoreError = ConfigError::NoConfigDir.into();
        assert!(matches!(core_err, CoreError::Config(_)));
    }
}
