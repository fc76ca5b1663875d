//! Error types for the Titulky.com provider
//!
//! This module defines all error types used throughout the library.

use thiserror::Error;

/// Error type for Titulky.com provider operations
#[derive(Error, Debug)]
pub enum TitulkyError {
    /// Invalid or missing provider configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Login, logout or re-authentication failure
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with an unexpected status code
    #[error("Unexpected status code {status} for {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// Failed to parse HTML content
    #[error("Failed to parse page: {0}")]
    Parse(String),

    /// Required HTML element was not found
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Invalid URL format
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// CAPTCHA challenge could not be passed
    #[error("CAPTCHA failed: {0}")]
    Captcha(String),

    /// Archive could not be read or held no subtitle file
    #[error("Archive extraction failed: {0}")]
    Archive(String),

    /// Provider was used before `initialize()` or after `terminate()`
    #[error("Provider has not been initialized")]
    NotInitialized,
}

/// Result type alias for Titulky.com provider operations
pub type Result<T> = std::result::Result<T, TitulkyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_configuration() {
        let error = TitulkyError::Configuration("username must be specified".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: username must be specified"
        );
    }

    #[test]
    fn test_error_display_authentication() {
        let error = TitulkyError::Authentication("login to premium server failed".to_string());
        assert_eq!(
            error.to_string(),
            "Authentication failed: login to premium server failed"
        );
    }

    #[test]
    fn test_error_display_unexpected_status() {
        let error = TitulkyError::UnexpectedStatus {
            status: 503,
            url: "https://premium.titulky.com/".to_string(),
        };
        let display = error.to_string();
        assert!(display.contains("503"));
        assert!(display.contains("https://premium.titulky.com/"));
    }

    #[test]
    fn test_error_display_parse() {
        let error = TitulkyError::Parse("missing episode number".to_string());
        assert_eq!(error.to_string(), "Failed to parse page: missing episode number");
    }

    #[test]
    fn test_error_display_element_not_found() {
        let error = TitulkyError::ElementNotFound("form.cloudForm".to_string());
        assert_eq!(error.to_string(), "Element not found: form.cloudForm");
    }

    #[test]
    fn test_error_display_not_initialized() {
        let error = TitulkyError::NotInitialized;
        assert_eq!(error.to_string(), "Provider has not been initialized");
    }

    #[test]
    fn test_error_display_captcha() {
        let error = TitulkyError::Captcha("CHYBA - wrong code".to_string());
        assert_eq!(error.to_string(), "CAPTCHA failed: CHYBA - wrong code");
    }
}
