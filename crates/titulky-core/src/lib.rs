//! Titulky.com Subtitle Provider Core Library
//!
//! This crate provides a subtitle provider for Titulky.com, a Czech and
//! Slovak subtitle catalog running two site deployments with separate
//! logins: a paid "premium" backend with direct downloads and a free
//! "normal" backend gating downloads behind a CAPTCHA.
//!
//! # Features
//! - Authenticated sessions against both backends with cookie caching
//! - Subtitle listing by IMDB id for movies and TV series episodes
//! - Frame-rate lookup with per-subtitle caching
//! - CAPTCHA-gated and direct download flows with archive extraction
//!
//! The cache, CAPTCHA solver and archive extractor are host concerns and
//! are injected through the [`CacheStore`], [`CaptchaSolver`] and
//! [`ArchiveExtractor`] traits.

pub mod archive;
pub mod cache;
pub mod captcha;
pub mod error;
pub mod parser;
pub mod provider;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use archive::{detect_archive, fix_line_endings, ArchiveExtractor, ArchiveKind};
pub use cache::{CacheStore, MemoryCache};
pub use captcha::{CaptchaChallenge, CaptchaSolver};
pub use error::{Result, TitulkyError};
pub use provider::TitulkyProvider;
pub use session::{BackendKind, Credentials, SessionManager, SiteUrls};
pub use types::{MediaType, SubtitleLanguage, SubtitleRecord, TitulkyConfig, Video};
