//! Data types for the Titulky.com provider
//!
//! This module contains the core data structures used throughout the library.
//! Records implement Serialize and Deserialize for JSON compatibility with
//! host applications; downloaded content bytes are never serialized.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TitulkyError};

/// Subtitle language offered by the site
///
/// Titulky.com carries Czech and Slovak subtitles only, distinguished on the
/// listing page by a country-flag image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubtitleLanguage {
    Czech,
    Slovak,
}

impl SubtitleLanguage {
    /// ISO 639-3 code used by host applications
    pub fn code(&self) -> &'static str {
        match self {
            SubtitleLanguage::Czech => "ces",
            SubtitleLanguage::Slovak => "slk",
        }
    }
}

impl std::fmt::Display for SubtitleLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Kind of video a query is made for
///
/// The site models movies as a pseudo-series with season 0 and episode 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Movie,
    Episode,
}

/// Identity of the video subtitles are searched for
#[derive(Debug, Clone)]
pub enum Video {
    Movie {
        /// IMDB id including the "tt" prefix
        imdb_id: Option<String>,
    },
    Episode {
        /// IMDB id of the series (not the episode), including the "tt" prefix
        series_imdb_id: Option<String>,
        season: u32,
        episode: u32,
    },
}

/// A single subtitle entry found on the site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleRecord {
    /// Site-internal subtitle id
    pub sub_id: String,
    /// IMDB id the query was made with
    pub imdb_id: String,
    /// Language detected from the row's flag image
    pub language: SubtitleLanguage,
    /// Season number, None for movies
    pub season: Option<u32>,
    /// Episode number, None for movies
    pub episode: Option<u32>,
    /// Free-text release description, empty if the site shows "???"
    pub release_info: String,
    /// Name of the uploader
    pub uploader: String,
    /// Whether the subtitles were approved by the site (row class pbl1)
    pub approved: bool,
    /// URL of the subtitle detail page
    pub page_link: String,
    /// URL the subtitle file is downloaded from
    pub download_link: String,
    /// Frame rate from the detail page, populated only when the
    /// skip-wrong-fps policy is enabled
    pub fps: Option<f64>,
    /// Raw subtitle bytes, set only after a successful download
    #[serde(skip)]
    pub content: Option<Vec<u8>>,
}

/// Provider configuration
///
/// All four fields are required; validation happens at provider construction.
#[derive(Debug, Clone, Deserialize)]
pub struct TitulkyConfig {
    pub username: String,
    pub password: String,
    /// Drop subtitles that were not approved by the site
    pub approved_only: bool,
    /// Resolve frame rates so the host can penalize mismatching subtitles
    pub skip_wrong_fps: bool,
}

impl TitulkyConfig {
    /// Build a configuration from dynamic host settings.
    ///
    /// Missing or wrong-typed fields are configuration errors, matching the
    /// provider contract of failing fast at construction time.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let username = value
            .get("username")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                TitulkyError::Configuration("username and password must be specified".to_string())
            })?;
        let password = value
            .get("password")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                TitulkyError::Configuration("username and password must be specified".to_string())
            })?;
        let approved_only = value
            .get("approved_only")
            .and_then(serde_json::Value::as_bool)
            .ok_or_else(|| {
                TitulkyError::Configuration("approved_only must be a boolean".to_string())
            })?;
        let skip_wrong_fps = value
            .get("skip_wrong_fps")
            .and_then(serde_json::Value::as_bool)
            .ok_or_else(|| {
                TitulkyError::Configuration("skip_wrong_fps must be a boolean".to_string())
            })?;

        let config = Self {
            username: username.to_string(),
            password: password.to_string(),
            approved_only,
            skip_wrong_fps,
        };
        config.validate()?;

        Ok(config)
    }

    /// Check that credentials are present and non-empty.
    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() || self.password.trim().is_empty() {
            return Err(TitulkyError::Configuration(
                "username and password must be specified".to_string(),
            ));
        }
        Ok(())
    }
}
