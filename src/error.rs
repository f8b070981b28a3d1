//! Error types and handling for the Glowmarkt bridge
//!
//! The taxonomy follows how the scheduler reacts: connectivity failures are
//! retried next cycle, auth failures trigger one re-authentication, payload
//! failures are dropped at the decoder. "No data yet" is not an error; it is
//! returned as a value by the API client.

use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, GlowError>;

/// Main error type for the bridge
#[derive(Debug, Error)]
pub enum GlowError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Timeout or transport failure talking to Glowmarkt
    #[error("Cannot connect: {message}")]
    CannotConnect { message: String },

    /// Token rejected (401/404) or explicit `valid: false` from the auth endpoint
    #[error("Invalid auth: {message}")]
    InvalidAuth { message: String },

    /// MQTT payload could not be interpreted
    #[error("Malformed payload: {message}")]
    MalformedPayload { message: String },

    /// Non-auth HTTP failure returned by the API
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// MQTT client errors
    #[error("MQTT error: {message}")]
    Mqtt { message: String },
}

impl GlowError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        GlowError::Config {
            message: message.into(),
        }
    }

    /// Create a new connectivity error
    pub fn cannot_connect<S: Into<String>>(message: S) -> Self {
        GlowError::CannotConnect {
            message: message.into(),
        }
    }

    /// Create a new auth error
    pub fn invalid_auth<S: Into<String>>(message: S) -> Self {
        GlowError::InvalidAuth {
            message: message.into(),
        }
    }

    /// Create a new payload error
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        GlowError::MalformedPayload {
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(status: u16, message: S) -> Self {
        GlowError::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        GlowError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        GlowError::Io {
            message: message.into(),
        }
    }

    /// Create a new MQTT error
    pub fn mqtt<S: Into<String>>(message: S) -> Self {
        GlowError::Mqtt {
            message: message.into(),
        }
    }

    /// Whether this error means the token was rejected
    pub fn is_auth(&self) -> bool {
        matches!(self, GlowError::InvalidAuth { .. })
    }

    /// Whether the failure is worth retrying on the next cycle without
    /// touching credentials
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GlowError::CannotConnect { .. } | GlowError::Api { .. } | GlowError::Serialization { .. }
        )
    }
}

impl From<std::io::Error> for GlowError {
    fn from(err: std::io::Error) -> Self {
        GlowError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for GlowError {
    fn from(err: serde_yaml::Error) -> Self {
        GlowError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for GlowError {
    fn from(err: serde_json::Error) -> Self {
        GlowError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for GlowError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return GlowError::cannot_connect(err.to_string());
        }
        if err.is_decode() {
            return GlowError::Serialization {
                message: err.to_string(),
            };
        }
        let status = err.status().map(|s| s.as_u16()).unwrap_or(0);
        GlowError::api(status, err.to_string())
    }
}

impl From<chrono::ParseError> for GlowError {
    fn from(err: chrono::ParseError) -> Self {
        GlowError::validation("datetime".to_string(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = GlowError::config("test config error");
        assert!(matches!(err, GlowError::Config { .. }));

        let err = GlowError::invalid_auth("token expired");
        assert!(err.is_auth());
        assert!(!err.is_transient());

        let err = GlowError::cannot_connect("timeout");
        assert!(err.is_transient());
        assert!(!err.is_auth());
    }

    #[test]
    fn test_error_display() {
        let err = GlowError::config("test error");
        assert_eq!(format!("{}", err), "Configuration error: test error");

        let err = GlowError::api(500, "boom");
        assert_eq!(format!("{}", err), "API error: 500 - boom");

        let err = GlowError::validation("gas.calorific_value", "Must be positive");
        assert_eq!(
            format!("{}", err),
            "Validation error: gas.calorific_value - Must be positive"
        );
    }
}
