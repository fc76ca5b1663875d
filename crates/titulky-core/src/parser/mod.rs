//! HTML parsers for Titulky.com pages
//!
//! This module contains parsers for extracting data from site HTML pages:
//! - `catalog`: per-title listing page enumerating subtitles per episode
//! - `detail`: subtitle detail page (frame rate block)
//! - `download`: CAPTCHA-gated download landing page

pub mod catalog;
pub mod detail;
pub mod download;

// Re-export main parsing functions
pub use catalog::{parse_catalog, CatalogRow};
pub use detail::parse_fps;
pub use download::{has_captcha, parse_countdown, parse_download_anchor, site_error_message};
