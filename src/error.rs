use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetgateError {
    /// I/O errors from configuration file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// A configuration value is outside its accepted range
    #[error("Invalid setting `{name}`: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    /// A global logger was already installed
    #[error("Failed to install logger: {0}")]
    Logger(#[from] log::SetLoggerError),
}

/// A convenient Result type alias using `NetgateError`.
pub type Result<T> = std::result::Result<T, NetgateError>;

impl NetgateError {
    /// Creates a new invalid setting error with a descriptive message.
    pub fn invalid_setting(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            name,
            reason: reason.into(),
        }
    }
}

/// Convert `NetgateError` to a String for hosts that report errors as text.
impl From<NetgateError> for String {
    fn from(error: NetgateError) -> Self {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_setting_message() {
        let err = NetgateError::invalid_setting("window_size", "must be at least 1");
        assert_eq!(
            err.to_string(),
            "Invalid setting `window_size`: must be at least 1"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: NetgateError = io.into();
        assert!(matches!(err, NetgateError::Io(_)));
        let text: String = err.into();
        assert!(text.starts_with("I/O error"));
    }
}
