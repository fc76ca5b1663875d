//! Main Titulky.com provider API
//!
//! This module provides the high-level provider surface expected by a host
//! subtitle-aggregation application. It combines the session manager with
//! the page parsers, the CAPTCHA solver and the archive extractor to list
//! and download subtitles for a given video.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::archive::{detect_archive, fix_line_endings, ArchiveExtractor};
use crate::cache::{fps_key, CacheStore};
use crate::captcha::{normalize_solution, CaptchaChallenge, CaptchaSolver};
use crate::error::{Result, TitulkyError};
use crate::parser;
use crate::parser::catalog::CatalogRow;
use crate::session::{BackendKind, Credentials, PageResponse, SessionManager, SiteUrls};
use crate::types::{MediaType, SubtitleLanguage, SubtitleRecord, TitulkyConfig, Video};

/// Maximum attempts for the CAPTCHA-gated download flow
const MAX_DOWNLOAD_ATTEMPTS: usize = 3;

/// Subtitle provider for Titulky.com
///
/// The cache, CAPTCHA solver and archive extractor are injected by the
/// host. Lifecycle: construct, `initialize()`, any number of
/// `list_subtitles`/`download_subtitle` calls, `terminate()`.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use titulky_core::{MemoryCache, TitulkyConfig, TitulkyProvider};
/// # use titulky_core::{ArchiveExtractor, ArchiveKind, CaptchaChallenge, CaptchaSolver};
/// # struct Solver;
/// # #[async_trait::async_trait]
/// # impl CaptchaSolver for Solver {
/// #     async fn solve(&self, _: CaptchaChallenge) -> titulky_core::Result<String> { Ok(String::new()) }
/// # }
/// # struct Extractor;
/// # impl ArchiveExtractor for Extractor {
/// #     fn extract_subtitle(&self, _: ArchiveKind, data: &[u8]) -> titulky_core::Result<Vec<u8>> { Ok(data.to_vec()) }
/// # }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = TitulkyConfig {
///         username: "user".into(),
///         password: "pass".into(),
///         approved_only: false,
///         skip_wrong_fps: false,
///     };
///     let mut provider = TitulkyProvider::new(
///         config,
///         Arc::new(MemoryCache::new()),
///         Arc::new(Solver),
///         Arc::new(Extractor),
///     )?;
///     provider.initialize().await?;
///     Ok(())
/// }
/// ```
pub struct TitulkyProvider {
    config: TitulkyConfig,
    urls: SiteUrls,
    cache: Arc<dyn CacheStore>,
    captcha_solver: Arc<dyn CaptchaSolver>,
    archive_extractor: Arc<dyn ArchiveExtractor>,
    session: Option<SessionManager>,
}

impl TitulkyProvider {
    /// Create a provider against the real site.
    ///
    /// # Errors
    /// Returns a `Configuration` error for missing or empty credentials.
    pub fn new(
        config: TitulkyConfig,
        cache: Arc<dyn CacheStore>,
        captcha_solver: Arc<dyn CaptchaSolver>,
        archive_extractor: Arc<dyn ArchiveExtractor>,
    ) -> Result<Self> {
        Self::with_urls(
            config,
            SiteUrls::default(),
            cache,
            captcha_solver,
            archive_extractor,
        )
    }

    /// Create a provider with custom base URLs (used by tests).
    pub fn with_urls(
        config: TitulkyConfig,
        urls: SiteUrls,
        cache: Arc<dyn CacheStore>,
        captcha_solver: Arc<dyn CaptchaSolver>,
        archive_extractor: Arc<dyn ArchiveExtractor>,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            urls,
            cache,
            captcha_solver,
            archive_extractor,
            session: None,
        })
    }

    /// Establish both backend sessions and log in.
    pub async fn initialize(&mut self) -> Result<()> {
        let credentials = Credentials {
            username: self.config.username.clone(),
            password: self.config.password.clone(),
        };
        let session =
            SessionManager::connect(self.urls.clone(), credentials, Arc::clone(&self.cache))
                .await?;
        self.session = Some(session);

        Ok(())
    }

    /// Release both backend sessions.
    ///
    /// Safe to call at any point, including after mid-session errors.
    pub fn terminate(&mut self) {
        self.session = None;
    }

    /// Log out of both backends and clear cached session state.
    pub async fn logout(&self) -> Result<()> {
        self.session()?.logout().await
    }

    fn session(&self) -> Result<&SessionManager> {
        self.session.as_ref().ok_or(TitulkyError::NotInitialized)
    }

    /// List subtitles matching the video in any of the requested languages.
    ///
    /// Videos without an IMDB id cannot be searched and yield an empty list.
    pub async fn list_subtitles(
        &self,
        video: &Video,
        languages: &HashSet<SubtitleLanguage>,
    ) -> Result<Vec<SubtitleRecord>> {
        match video {
            Video::Episode {
                series_imdb_id: Some(imdb_id),
                season,
                episode,
            } => {
                tracing::info!("searching subtitles for a TV series episode");
                self.query(languages, MediaType::Episode, imdb_id, *season, *episode)
                    .await
            }
            Video::Movie {
                imdb_id: Some(imdb_id),
            } => {
                tracing::info!("searching subtitles for a movie");
                self.query(languages, MediaType::Movie, imdb_id, 0, 0).await
            }
            _ => {
                tracing::info!("skipping video, no IMDB id found");
                Ok(Vec::new())
            }
        }
    }

    /// Browse subtitles for one title.
    ///
    /// The site lists all of a season's subtitles on one page and treats
    /// movies as a pseudo-series with season 0 and episode 0.
    async fn query(
        &self,
        languages: &HashSet<SubtitleLanguage>,
        media_type: MediaType,
        imdb_id: &str,
        season: u32,
        episode: u32,
    ) -> Result<Vec<SubtitleRecord>> {
        let session = self.session()?;

        let id_digits = imdb_id.strip_prefix("tt").unwrap_or(imdb_id);
        let browse_url = self.urls.browse_url(&[
            ("action", "serial".to_string()),
            ("step", season.to_string()),
            ("id", id_digits.to_string()),
        ]);

        // The listing URL redirects to a page keyed by the site's own id.
        let html = session.fetch_page(&browse_url, None, true).await?;

        let Some(index) = parser::parse_catalog(&html, &self.urls)? else {
            tracing::info!("could not find the listing container, no subtitles found");
            return Ok(Vec::new());
        };

        let mut surviving: BTreeMap<u32, Vec<(CatalogRow, Option<f64>)>> = BTreeMap::new();
        for (ep_number, rows) in index {
            for row in rows {
                if !languages.contains(&row.language) {
                    tracing::debug!("language not in desired languages, skipping");
                    continue;
                }
                if self.config.approved_only && !row.approved {
                    tracing::debug!("approved only, skipping");
                    continue;
                }
                let fps = if self.config.skip_wrong_fps {
                    self.retrieve_fps(session, &row.sub_id).await?
                } else {
                    None
                };
                surviving.entry(ep_number).or_default().push((row, fps));
            }
        }

        let Some(rows) = surviving.remove(&episode) else {
            tracing::info!("no subtitles found");
            return Ok(Vec::new());
        };

        let is_episode = media_type == MediaType::Episode;
        let subtitles = rows
            .into_iter()
            .map(|(row, fps)| SubtitleRecord {
                sub_id: row.sub_id,
                imdb_id: imdb_id.to_string(),
                language: row.language,
                season: is_episode.then_some(season),
                episode: is_episode.then_some(episode),
                release_info: row.release_info,
                uploader: row.uploader,
                approved: row.approved,
                page_link: row.details_link,
                download_link: row.download_link,
                fps,
                content: None,
            })
            .collect();

        Ok(subtitles)
    }

    /// Resolve the frame rate of one subtitle entry through the cache.
    ///
    /// Unknown values are cached as well so repeated lookups never re-fetch
    /// a detail page that carries no usable frame rate.
    async fn retrieve_fps(
        &self,
        session: &SessionManager,
        sub_id: &str,
    ) -> Result<Option<f64>> {
        let key = fps_key(sub_id);

        if let Some(raw) = self.cache.get(&key) {
            let cached = serde_json::from_str::<Option<f64>>(&raw).unwrap_or(None);
            tracing::debug!("reusing cached fps value {cached:?} for subtitle {sub_id}");
            return Ok(cached);
        }

        let detail_url = self.urls.browse_url(&[
            ("action", "detail".to_string()),
            ("id", sub_id.to_string()),
        ]);
        let html = session.fetch_page(&detail_url, None, true).await?;

        let fps = parser::parse_fps(&html);
        match fps {
            Some(value) => tracing::debug!("retrieved fps value {value} for subtitle {sub_id}"),
            None => tracing::debug!("could not determine fps value for subtitle {sub_id}"),
        }

        if let Ok(encoded) = serde_json::to_string(&fps) {
            self.cache.set(&key, &encoded);
        }

        Ok(fps)
    }

    /// Download the subtitle file and store its content on the record.
    ///
    /// Soft failures (missing final link, empty content, premium status
    /// errors) leave `content` unset without returning an error; callers
    /// must treat an unset content field as a failed download.
    pub async fn download_subtitle(&self, record: &mut SubtitleRecord) -> Result<()> {
        let session = self.session()?;

        let body = if record
            .download_link
            .starts_with(&self.urls.premium_download_prefix())
        {
            self.download_premium(session, record).await?
        } else {
            self.download_normal(session, record).await?
        };
        let Some(body) = body else {
            return Ok(());
        };

        let content = match detect_archive(&body) {
            Some(kind) => {
                tracing::debug!("identified {kind} archive");
                self.archive_extractor.extract_subtitle(kind, &body)?
            }
            None => fix_line_endings(&body),
        };

        if content.is_empty() {
            tracing::error!("subtitle is empty ({})", record.download_link);
        } else {
            record.content = Some(content);
        }

        Ok(())
    }

    async fn download_premium(
        &self,
        session: &SessionManager,
        record: &SubtitleRecord,
    ) -> Result<Option<Vec<u8>>> {
        let res = session
            .get_request(&record.download_link, Some(&record.page_link), false)
            .await?;

        if res.status.is_client_error() || res.status.is_server_error() {
            tracing::error!(
                "error downloading subtitle from premium server ({})",
                record.download_link
            );
            return Ok(None);
        }

        Ok(Some(res.body))
    }

    /// Navigate the normal backend's CAPTCHA-gated download flow.
    async fn download_normal(
        &self,
        session: &SessionManager,
        record: &SubtitleRecord,
    ) -> Result<Option<Vec<u8>>> {
        let mut down_page = String::new();

        for attempt in 0..MAX_DOWNLOAD_ATTEMPTS {
            let last_attempt = attempt + 1 == MAX_DOWNLOAD_ATTEMPTS;
            tracing::debug!(
                "trying to download subtitle {}/{}",
                attempt + 1,
                MAX_DOWNLOAD_ATTEMPTS
            );

            down_page = session
                .fetch_page(&record.download_link, Some(&record.page_link), false)
                .await?;

            if !parser::has_captcha(&down_page) {
                break;
            }
            tracing::debug!("found CAPTCHA challenge");

            let image = match self.fetch_captcha_image(session, &record.page_link).await {
                Ok(image) => image,
                Err(err) if last_attempt => return Err(err),
                Err(_) => {
                    tracing::error!("error reading CAPTCHA image");
                    continue;
                }
            };

            let challenge = CaptchaChallenge {
                image,
                user_agent: session.user_agent().to_string(),
                cookies: session.normal_cookies(),
                invisible: true,
            };
            let code = match self.captcha_solver.solve(challenge).await {
                Ok(text) => normalize_solution(&text),
                Err(err) => {
                    tracing::error!("could not solve CAPTCHA: {err}");
                    continue;
                }
            };
            tracing::debug!("CAPTCHA code: '{code}'");
            if code.is_empty() {
                tracing::error!("empty CAPTCHA solution");
                continue;
            }

            let form = [
                ("downkod", code.as_str()),
                ("securedown", "2"),
                ("zip", ""),
                ("T", "1-1652287319136"),
                ("titulky", record.sub_id.as_str()),
                ("histstamp", ""),
            ];
            let res = match session
                .post_form(
                    BackendKind::Normal,
                    &self.urls.captcha_submit_url(),
                    &form,
                    Some(self.urls.normal_base()),
                )
                .await
                .and_then(PageResponse::error_for_status)
            {
                Ok(res) => res,
                Err(err) if last_attempt => return Err(err),
                Err(_) => {
                    tracing::error!("error sending CAPTCHA code");
                    continue;
                }
            };

            down_page = res.text();

            if let Some(message) = parser::site_error_message(&down_page) {
                if last_attempt {
                    return Err(TitulkyError::Captcha(message));
                }
                tracing::error!("CAPTCHA code rejected: {message}");
                continue;
            }

            break;
        }

        let Some(down_url) = parser::parse_download_anchor(&down_page) else {
            tracing::error!("cannot find downlink ({})", record.download_link);
            return Ok(None);
        };

        if let Some(delay) = parser::parse_countdown(&down_page) {
            tracing::debug!("delaying {}ms before downloading", delay.as_millis());
            tokio::time::sleep(delay).await;
        }

        let res = session
            .get_request(&down_url, Some(&record.page_link), false)
            .await?
            .error_for_status()?;

        Ok(Some(res.body))
    }

    async fn fetch_captcha_image(
        &self,
        session: &SessionManager,
        page_link: &str,
    ) -> Result<Vec<u8>> {
        let res = session
            .get_request(&self.urls.captcha_image_url(), Some(page_link), false)
            .await?
            .error_for_status()?;
        Ok(res.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveKind;
    use crate::cache::MemoryCache;
    use async_trait::async_trait;

    struct NoopSolver;

    #[async_trait]
    impl CaptchaSolver for NoopSolver {
        async fn solve(&self, _challenge: CaptchaChallenge) -> Result<String> {
            Ok(String::new())
        }
    }

    struct PassthroughExtractor;

    impl ArchiveExtractor for PassthroughExtractor {
        fn extract_subtitle(&self, _kind: ArchiveKind, data: &[u8]) -> Result<Vec<u8>> {
            Ok(data.to_vec())
        }
    }

    fn config() -> TitulkyConfig {
        TitulkyConfig {
            username: "user".to_string(),
            password: "pass".to_string(),
            approved_only: false,
            skip_wrong_fps: false,
        }
    }

    fn provider(config: TitulkyConfig) -> Result<TitulkyProvider> {
        TitulkyProvider::new(
            config,
            Arc::new(MemoryCache::new()),
            Arc::new(NoopSolver),
            Arc::new(PassthroughExtractor),
        )
    }

    #[test]
    fn test_provider_creation() {
        assert!(provider(config()).is_ok());
    }

    #[test]
    fn test_provider_creation_empty_username() {
        let mut bad = config();
        bad.username = String::new();
        let result = provider(bad);
        assert!(matches!(result, Err(TitulkyError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_list_subtitles_before_initialize() {
        let provider = provider(config()).unwrap();
        let languages = HashSet::from([SubtitleLanguage::Czech]);
        let video = Video::Movie {
            imdb_id: Some("tt1234567".to_string()),
        };
        let result = provider.list_subtitles(&video, &languages).await;
        assert!(matches!(result, Err(TitulkyError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_download_before_initialize() {
        let provider = provider(config()).unwrap();
        let mut record = SubtitleRecord {
            sub_id: "1".to_string(),
            imdb_id: "tt1".to_string(),
            language: SubtitleLanguage::Czech,
            season: None,
            episode: None,
            release_info: String::new(),
            uploader: String::new(),
            approved: true,
            page_link: String::new(),
            download_link: String::new(),
            fps: None,
            content: None,
        };
        let result = provider.download_subtitle(&mut record).await;
        assert!(matches!(result, Err(TitulkyError::NotInitialized)));
        assert!(record.content.is_none());
    }

    #[tokio::test]
    async fn test_list_subtitles_without_imdb_id() {
        let mut provider = provider(config()).unwrap();
        // No session is needed, the video is rejected before any request.
        provider.terminate();
        let languages = HashSet::from([SubtitleLanguage::Czech]);
        let video = Video::Movie { imdb_id: None };
        let result = provider.list_subtitles(&video, &languages).await.unwrap();
        assert!(result.is_empty());
    }
}
