//! Authenticated HTTP sessions for the two Titulky.com backends
//!
//! The site runs a paid ("premium") and a free ("normal") deployment with
//! separate logins and download semantics. This module owns one cookie-backed
//! session per backend, persists cookies and the chosen user agent through
//! the injected cache so short-lived invocations skip re-authentication, and
//! transparently re-logs in when the site redirects to its "please log in"
//! message page.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use reqwest::header::{self, HeaderMap};
use reqwest::{Method, StatusCode};

use crate::cache::{CacheStore, NORMAL_COOKIEJAR_KEY, PREMIUM_COOKIEJAR_KEY, USER_AGENT_KEY};
use crate::error::{Result, TitulkyError};

/// Request timeout applied to every request on both backends
const TIMEOUT_SECS: u64 = 30;

/// Maximum number of transparent re-login retries in [`SessionManager::get_request`]
const MAX_REAUTH_RETRIES: u32 = 5;

/// Maximum redirect hops followed when a caller allows redirects
const MAX_REDIRECT_HOPS: u32 = 10;

/// Marker carried by the "session expired" redirect message
const EXPIRED_SESSION_MARKER: &str = "Přihlašte se";

/// Marker carried by the login redirect of a restricted (non-V.I.P.) account
const RESTRICTED_ACCOUNT_MARKER: &str = "omezené";

/// Pool of browser user agents; one is picked per cache lifetime and shared
/// by both backend sessions.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:115.0) Gecko/20100101 Firefox/115.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36 Edg/118.0.2088.76",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:120.0) Gecko/20100101 Firefox/120.0",
];

/// Session cookies, cached as a JSON object between invocations
pub type CookieJar = BTreeMap<String, String>;

/// One of the two independent site deployments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Premium,
    Normal,
}

impl BackendKind {
    /// Cache key the backend's cookie jar is stored under
    pub fn cookiejar_key(&self) -> &'static str {
        match self {
            BackendKind::Premium => PREMIUM_COOKIEJAR_KEY,
            BackendKind::Normal => NORMAL_COOKIEJAR_KEY,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            BackendKind::Premium => "premium",
            BackendKind::Normal => "normal",
        }
    }
}

/// Base URLs of both backends plus the URL templates derived from them
///
/// Overridable so tests can point the sessions at a local server.
#[derive(Debug, Clone)]
pub struct SiteUrls {
    premium_base: String,
    normal_base: String,
}

impl Default for SiteUrls {
    fn default() -> Self {
        Self {
            premium_base: "https://premium.titulky.com".to_string(),
            normal_base: "https://www.titulky.com".to_string(),
        }
    }
}

impl SiteUrls {
    pub fn new(premium_base: impl Into<String>, normal_base: impl Into<String>) -> Self {
        Self {
            premium_base: premium_base.into(),
            normal_base: normal_base.into(),
        }
    }

    pub fn premium_base(&self) -> &str {
        &self.premium_base
    }

    pub fn normal_base(&self) -> &str {
        &self.normal_base
    }

    pub fn base(&self, kind: BackendKind) -> &str {
        match kind {
            BackendKind::Premium => &self.premium_base,
            BackendKind::Normal => &self.normal_base,
        }
    }

    pub fn logout_url(&self, kind: BackendKind) -> String {
        format!("{}?action=logout", self.base(kind))
    }

    /// Direct download URL prefix of the premium backend
    pub fn premium_download_prefix(&self) -> String {
        format!("{}/download.php?id=", self.premium_base)
    }

    /// CAPTCHA-gated download URL prefix of the normal backend
    pub fn normal_download_prefix(&self) -> String {
        format!(
            "{}/idown.php?R=&zip=&histstamp=&toUTF=1&T=1-1652287319136&titulky=",
            self.normal_base
        )
    }

    pub fn captcha_image_url(&self) -> String {
        format!("{}/captcha/captcha.php", self.normal_base)
    }

    pub fn captcha_submit_url(&self) -> String {
        format!("{}/idown.php", self.normal_base)
    }

    /// Build a premium-backend query URL from ordered key/value pairs.
    ///
    /// Spaces are turned into `+`; everything else is passed through the way
    /// the site expects it.
    pub fn browse_url(&self, params: &[(&str, String)]) -> String {
        let query = params
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}/?{}", self.premium_base, query).replace(' ', "+")
    }
}

/// Login credentials for both backends
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// A fully buffered HTTP response
///
/// Responses are small (HTML pages, captcha images, subtitle files), so
/// buffering keeps the session surface simple and lets callers inspect the
/// status, redirect target and body independently.
#[derive(Debug)]
pub struct PageResponse {
    pub status: StatusCode,
    /// URL the response was served from
    pub url: String,
    /// Raw `Location` header, if any
    pub location: Option<String>,
    pub body: Vec<u8>,
}

impl PageResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Fail on 4xx/5xx statuses, mirroring `raise_for_status`.
    pub fn error_for_status(self) -> Result<Self> {
        if self.status.is_client_error() || self.status.is_server_error() {
            return Err(TitulkyError::UnexpectedStatus {
                status: self.status.as_u16(),
                url: self.url,
            });
        }
        Ok(self)
    }
}

struct BackendSession {
    kind: BackendKind,
    client: reqwest::Client,
    cookies: Mutex<CookieJar>,
}

impl BackendSession {
    fn new(kind: BackendKind, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(browser_headers())
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            kind,
            client,
            cookies: Mutex::new(CookieJar::new()),
        })
    }
}

/// Fixed browser-like header set shared by both sessions.
///
/// Accept-Encoding is left to reqwest, which also handles decompression.
fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
            .parse()
            .unwrap(),
    );
    headers.insert(header::ACCEPT_LANGUAGE, "cz,sk,en;q=0.5".parse().unwrap());
    headers.insert("DNT", "1".parse().unwrap());
    headers.insert(header::CONNECTION, "keep-alive".parse().unwrap());
    headers.insert("Upgrade-Insecure-Requests", "1".parse().unwrap());
    headers.insert(header::CACHE_CONTROL, "max-age=0".parse().unwrap());
    headers
}

/// Owns the two authenticated backend sessions
pub struct SessionManager {
    urls: SiteUrls,
    credentials: Credentials,
    cache: Arc<dyn CacheStore>,
    user_agent: String,
    premium: BackendSession,
    normal: BackendSession,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("urls", &self.urls)
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Build both sessions and log in.
    ///
    /// The user agent is picked once from a fixed pool and cached; both
    /// backends share it until the cache is cleared by `logout`.
    pub async fn connect(
        urls: SiteUrls,
        credentials: Credentials,
        cache: Arc<dyn CacheStore>,
    ) -> Result<Self> {
        let user_agent = match cache.get(USER_AGENT_KEY) {
            Some(agent) => agent,
            None => {
                let agent = USER_AGENTS[rand::rng().random_range(0..USER_AGENTS.len())].to_string();
                cache.set(USER_AGENT_KEY, &agent);
                agent
            }
        };

        let premium = BackendSession::new(BackendKind::Premium, &user_agent)?;
        let normal = BackendSession::new(BackendKind::Normal, &user_agent)?;

        let manager = Self {
            urls,
            credentials,
            cache,
            user_agent,
            premium,
            normal,
        };
        manager.login(false).await?;

        Ok(manager)
    }

    pub fn urls(&self) -> &SiteUrls {
        &self.urls
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Current cookies of the normal session, handed to the CAPTCHA solver.
    pub fn normal_cookies(&self) -> CookieJar {
        self.normal.cookies.lock().clone()
    }

    /// Authenticate both backends.
    ///
    /// With `bypass_cache` false a cached cookie jar is adopted and the live
    /// login skipped; with `bypass_cache` true both backends are always
    /// re-authenticated against the site.
    pub async fn login(&self, bypass_cache: bool) -> Result<()> {
        match self.cached_jar(BackendKind::Premium, bypass_cache) {
            Some(jar) => {
                tracing::info!("reusing cached premium cookies");
                self.premium.cookies.lock().extend(jar);
            }
            None => self.login_premium().await?,
        }

        match self.cached_jar(BackendKind::Normal, bypass_cache) {
            Some(jar) => {
                tracing::info!("reusing cached normal cookies");
                self.normal.cookies.lock().extend(jar);
            }
            None => self.login_normal().await?,
        }

        Ok(())
    }

    fn cached_jar(&self, kind: BackendKind, bypass_cache: bool) -> Option<CookieJar> {
        if bypass_cache {
            return None;
        }
        let raw = self.cache.get(kind.cookiejar_key())?;
        // An unreadable cached jar falls back to a live login.
        serde_json::from_str(&raw).ok()
    }

    fn store_jar(&self, kind: BackendKind) {
        let jar = self.backend(kind).cookies.lock().clone();
        if let Ok(encoded) = serde_json::to_string(&jar) {
            self.cache.set(kind.cookiejar_key(), &encoded);
        }
    }

    async fn login_premium(&self) -> Result<()> {
        tracing::info!("logging in to premium server");

        let form = [
            ("LoginName", self.credentials.username.as_str()),
            ("LoginPassword", self.credentials.password.as_str()),
        ];
        let res = self
            .post_form(
                BackendKind::Premium,
                self.urls.premium_base(),
                &form,
                Some(self.urls.premium_base()),
            )
            .await?;

        let location_qs = res
            .location
            .as_deref()
            .map(parse_location_query)
            .unwrap_or_default();

        // A redirect that does not point to an error message page means we
        // are logged in.
        let redirected_ok = res.status == StatusCode::FOUND
            && location_qs.get("msg_type").is_some_and(|t| t == "i");
        if !redirected_ok {
            return Err(TitulkyError::Authentication(
                "login to premium server failed".to_string(),
            ));
        }
        if location_qs
            .get("msg")
            .is_some_and(|msg| msg.contains(RESTRICTED_ACCOUNT_MARKER))
        {
            return Err(TitulkyError::Authentication(
                "V.I.P. account is required for this provider to work".to_string(),
            ));
        }

        tracing::info!("logged in to premium server, caching cookies");
        self.store_jar(BackendKind::Premium);

        Ok(())
    }

    async fn login_normal(&self) -> Result<()> {
        tracing::info!("logging in to normal server");

        let form = [
            ("Login", self.credentials.username.as_str()),
            ("Detail2", ""),
            ("prihlasit", "Přihlásit"),
            ("Password", self.credentials.password.as_str()),
            ("foreverlog", "1"),
        ];
        let res = self
            .post_form(
                BackendKind::Normal,
                self.urls.normal_base(),
                &form,
                Some(self.urls.normal_base()),
            )
            .await?;

        if !(res.status == StatusCode::OK && res.text().contains("/?welcome")) {
            return Err(TitulkyError::Authentication(
                "login to normal server failed".to_string(),
            ));
        }

        tracing::info!("logged in to normal server, caching cookies");
        self.store_jar(BackendKind::Normal);

        Ok(())
    }

    /// Log out of both backends and clear all cached session state.
    ///
    /// The cache keys are cleared unconditionally; success is judged by the
    /// premium backend's logout redirect carrying the informational marker.
    pub async fn logout(&self) -> Result<()> {
        tracing::info!("logging out");

        let premium_res = self
            .send(
                BackendKind::Premium,
                Method::GET,
                &self.urls.logout_url(BackendKind::Premium),
                Some(self.urls.premium_base()),
                None,
            )
            .await?;

        let normal_res = self
            .send(
                BackendKind::Normal,
                Method::GET,
                &self.urls.logout_url(BackendKind::Normal),
                Some(self.urls.normal_base()),
                None,
            )
            .await;

        tracing::info!("clearing cached session state");
        self.cache.delete(PREMIUM_COOKIEJAR_KEY);
        self.cache.delete(NORMAL_COOKIEJAR_KEY);
        self.cache.delete(USER_AGENT_KEY);

        normal_res?;

        let location_qs = premium_res
            .location
            .as_deref()
            .map(parse_location_query)
            .unwrap_or_default();
        if premium_res.status == StatusCode::FOUND
            && location_qs.get("msg_type").is_some_and(|t| t == "i")
        {
            Ok(())
        } else {
            Err(TitulkyError::Authentication("logout failed".to_string()))
        }
    }

    /// GET a URL through whichever backend serves it.
    ///
    /// Handles expired cached cookies transparently: a redirect to the
    /// "please log in" message page forces a live re-login and the request
    /// is sent again, at most [`MAX_REAUTH_RETRIES`] times so a permanently
    /// logged-out backend cannot trap us in a loop.
    pub async fn get_request(
        &self,
        url: &str,
        referer: Option<&str>,
        allow_redirects: bool,
    ) -> Result<PageResponse> {
        let referer = referer.unwrap_or(self.urls.premium_base());

        let mut attempt = 0;
        loop {
            if attempt >= MAX_REAUTH_RETRIES {
                return Err(TitulkyError::Authentication(
                    "got into a re-login loop and could not get authenticated".to_string(),
                ));
            }

            tracing::debug!(url, "fetching url");

            let kind = self.backend_for(url);
            let res = self.execute_get(kind, url, referer, allow_redirects).await?;

            if res.status == StatusCode::FOUND {
                if let Some(location) = res.location.as_deref() {
                    let qs = parse_location_query(location);
                    if qs.get("msg_type").is_some_and(|t| t == "e")
                        && qs
                            .get("msg")
                            .is_some_and(|msg| msg.contains(EXPIRED_SESSION_MARKER))
                    {
                        tracing::info!("login cookies expired, re-authenticating");
                        self.login(true).await?;
                        attempt += 1;
                        continue;
                    }
                }
            }

            return Ok(res);
        }
    }

    /// GET a page body, requiring a 200 response with non-empty content.
    pub async fn fetch_page(
        &self,
        url: &str,
        referer: Option<&str>,
        allow_redirects: bool,
    ) -> Result<String> {
        let res = self.get_request(url, referer, allow_redirects).await?;

        if res.status != StatusCode::OK {
            return Err(TitulkyError::UnexpectedStatus {
                status: res.status.as_u16(),
                url: res.url,
            });
        }
        let text = res.text();
        if text.is_empty() {
            return Err(TitulkyError::Parse(format!(
                "no response returned from {}",
                res.url
            )));
        }

        Ok(text)
    }

    /// POST a form through one backend's session (login, CAPTCHA submit).
    pub async fn post_form(
        &self,
        kind: BackendKind,
        url: &str,
        form: &[(&str, &str)],
        referer: Option<&str>,
    ) -> Result<PageResponse> {
        self.send(kind, Method::POST, url, referer, Some(form)).await
    }

    fn backend(&self, kind: BackendKind) -> &BackendSession {
        match kind {
            BackendKind::Premium => &self.premium,
            BackendKind::Normal => &self.normal,
        }
    }

    /// URLs under the premium base go through the premium session, anything
    /// else through the normal one.
    fn backend_for(&self, url: &str) -> BackendKind {
        if url.starts_with(self.urls.premium_base()) {
            BackendKind::Premium
        } else {
            BackendKind::Normal
        }
    }

    async fn execute_get(
        &self,
        kind: BackendKind,
        url: &str,
        referer: &str,
        allow_redirects: bool,
    ) -> Result<PageResponse> {
        let mut res = self.send(kind, Method::GET, url, Some(referer), None).await?;

        if allow_redirects {
            let mut hops = 0;
            while res.status.is_redirection() && hops < MAX_REDIRECT_HOPS {
                let Some(location) = res.location.clone() else {
                    break;
                };
                let next = resolve_redirect(&res.url, &location)?;
                res = self.send(kind, Method::GET, &next, Some(referer), None).await?;
                hops += 1;
            }
        }

        Ok(res)
    }

    async fn send(
        &self,
        kind: BackendKind,
        method: Method,
        url: &str,
        referer: Option<&str>,
        form: Option<&[(&str, &str)]>,
    ) -> Result<PageResponse> {
        let backend = self.backend(kind);

        let mut builder = backend.client.request(method, url);
        if let Some(referer) = referer {
            builder = builder.header(header::REFERER, urlencoding::encode(referer).into_owned());
        }
        {
            let jar = backend.cookies.lock();
            if !jar.is_empty() {
                builder = builder.header(header::COOKIE, cookie_header(&jar));
            }
        }
        if let Some(form) = form {
            builder = builder.form(form);
        }

        let response = builder.send().await?;

        let status = response.status();
        let final_url = response.url().to_string();
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        // Sessions absorb cookies from every response, the same way a
        // browser (or requests.Session) would.
        {
            let mut jar = backend.cookies.lock();
            for value in response.headers().get_all(header::SET_COOKIE) {
                if let Ok(raw) = value.to_str() {
                    if let Some((name, val)) =
                        raw.split(';').next().and_then(|pair| pair.split_once('='))
                    {
                        jar.insert(name.trim().to_string(), val.trim().to_string());
                    }
                }
            }
        }

        let body = response.bytes().await?.to_vec();

        tracing::debug!(
            backend = kind.label(),
            status = status.as_u16(),
            url = final_url.as_str(),
            "request finished"
        );

        Ok(PageResponse {
            status,
            url: final_url,
            location,
            body,
        })
    }
}

/// Join a redirect target against the URL it was served from.
fn resolve_redirect(current: &str, location: &str) -> Result<String> {
    let base =
        url::Url::parse(current).map_err(|_| TitulkyError::InvalidUrl(current.to_string()))?;
    let target = base
        .join(location)
        .map_err(|_| TitulkyError::InvalidUrl(location.to_string()))?;
    Ok(target.to_string())
}

/// Parse the query string of a redirect `Location` into decoded pairs.
fn parse_location_query(location: &str) -> HashMap<String, String> {
    let Some((_, query)) = location.split_once('?') else {
        return HashMap::new();
    };

    query
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let value = value.replace('+', " ");
            let decoded = urlencoding::decode(&value)
                .map(|cow| cow.into_owned())
                .unwrap_or(value);
            Some((key.to_string(), decoded))
        })
        .collect()
}

fn cookie_header(jar: &CookieJar) -> String {
    jar.iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_urls() {
        let urls = SiteUrls::default();
        assert_eq!(urls.premium_base(), "https://premium.titulky.com");
        assert_eq!(urls.normal_base(), "https://www.titulky.com");
        assert_eq!(
            urls.logout_url(BackendKind::Premium),
            "https://premium.titulky.com?action=logout"
        );
        assert_eq!(
            urls.premium_download_prefix(),
            "https://premium.titulky.com/download.php?id="
        );
        assert!(urls
            .normal_download_prefix()
            .starts_with("https://www.titulky.com/idown.php?"));
        assert_eq!(
            urls.captcha_image_url(),
            "https://www.titulky.com/captcha/captcha.php"
        );
    }

    #[test]
    fn test_browse_url_keeps_param_order() {
        let urls = SiteUrls::default();
        let url = urls.browse_url(&[
            ("action", "serial".to_string()),
            ("step", "0".to_string()),
            ("id", "1234567".to_string()),
        ]);
        assert_eq!(
            url,
            "https://premium.titulky.com/?action=serial&step=0&id=1234567"
        );
    }

    #[test]
    fn test_browse_url_replaces_spaces() {
        let urls = SiteUrls::default();
        let url = urls.browse_url(&[("q", "some title".to_string())]);
        assert!(url.ends_with("?q=some+title"));
    }

    #[test]
    fn test_parse_location_query_decodes() {
        let qs = parse_location_query("/index.php?msg_type=e&msg=P%C5%99ihla%C5%A1te+se+znovu");
        assert_eq!(qs.get("msg_type").map(String::as_str), Some("e"));
        assert_eq!(
            qs.get("msg").map(String::as_str),
            Some("Přihlašte se znovu")
        );
    }

    #[test]
    fn test_parse_location_query_no_query() {
        assert!(parse_location_query("/index.php").is_empty());
        assert!(parse_location_query("").is_empty());
    }

    #[test]
    fn test_cookie_header_format() {
        let mut jar = CookieJar::new();
        jar.insert("a".to_string(), "1".to_string());
        jar.insert("b".to_string(), "2".to_string());
        assert_eq!(cookie_header(&jar), "a=1; b=2");
    }

    #[test]
    fn test_resolve_redirect_relative() {
        let resolved =
            resolve_redirect("https://premium.titulky.com/?action=serial", "/?msg_type=i").unwrap();
        assert_eq!(resolved, "https://premium.titulky.com/?msg_type=i");
    }

    #[test]
    fn test_resolve_redirect_absolute() {
        let resolved = resolve_redirect(
            "https://premium.titulky.com/",
            "https://www.titulky.com/?welcome",
        )
        .unwrap();
        assert_eq!(resolved, "https://www.titulky.com/?welcome");
    }

    #[test]
    fn test_backend_cookiejar_keys() {
        assert_eq!(
            BackendKind::Premium.cookiejar_key(),
            "premium_titulky_cookiejar"
        );
        assert_eq!(
            BackendKind::Normal.cookiejar_key(),
            "normal_titulky_cookiejar"
        );
    }
}
