//! Download landing-page parser
//!
//! The normal backend's download flow goes through a landing page that may
//! show a CAPTCHA image, reports failures inline with a "CHYBA -" marker,
//! reveals the final link in an `a#downlink` anchor and sometimes embeds a
//! `CountDown(<seconds>)` script throttling the download.

use std::time::Duration;

use scraper::{Html, Selector};

/// Error marker used by the site inside an otherwise 200 response
const SITE_ERROR_MARKER: &str = "CHYBA -";

/// Message length used when the error text has no line break
const SITE_ERROR_FALLBACK_LEN: usize = 40;

/// Check whether the landing page shows a CAPTCHA image.
pub fn has_captcha(html: &str) -> bool {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("img[src='./captcha/captcha.php']") else {
        return false;
    };
    document.select(&selector).next().is_some()
}

/// Extract the site's inline error message, if the page carries one.
pub fn site_error_message(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let text = document.root_element().text().collect::<String>();

    let start = text.find(SITE_ERROR_MARKER)?;
    let tail = &text[start..];
    let message = match tail.find('\n') {
        Some(pos) if pos > 0 => tail[..pos].to_string(),
        _ => tail.chars().take(SITE_ERROR_FALLBACK_LEN).collect(),
    };

    Some(message)
}

/// Resolve the final download URL from the `a#downlink` anchor.
///
/// The anchor's text holds the host and path without a scheme; `https` is
/// assumed unless the text already carries one.
pub fn parse_download_anchor(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a#downlink").ok()?;
    let anchor = document.select(&selector).next()?;

    let target = anchor.text().next()?.trim();
    if target.is_empty() {
        return None;
    }

    if target.contains("://") {
        Some(target.to_string())
    } else {
        Some(format!("https://{target}"))
    }
}

/// Parse the `CountDown(<seconds>)` throttle embedded in the page.
///
/// A half second is added on top of the advertised delay so the download
/// never fires before the site's own countdown has elapsed.
pub fn parse_countdown(html: &str) -> Option<Duration> {
    let start = html.find("CountDown(")? + "CountDown(".len();
    let rest = &html[start..];
    let end = rest.find(')')?;
    let seconds: u64 = rest[..end].trim().parse().ok()?;

    Some(Duration::from_millis(seconds * 1000 + 500))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_captcha() {
        let html = "<html><body><img src=\"./captcha/captcha.php\"></body></html>";
        assert!(has_captcha(html));
    }

    #[test]
    fn test_has_captcha_other_images() {
        let html = "<html><body><img src=\"img/flag-CZ.gif\"></body></html>";
        assert!(!has_captcha(html));
        assert!(!has_captcha("<html><body></body></html>"));
    }

    #[test]
    fn test_site_error_message_up_to_newline() {
        let html = "<html><body><p>CHYBA - špatně opsaný kód\ndalší text</p></body></html>";
        assert_eq!(
            site_error_message(html),
            Some("CHYBA - špatně opsaný kód".to_string())
        );
    }

    #[test]
    fn test_site_error_message_without_newline_is_capped() {
        let html = format!(
            "<html><body><p>CHYBA - {}</p></body></html>",
            "x".repeat(100)
        );
        let message = site_error_message(&html).unwrap();
        assert_eq!(message.chars().count(), 40);
        assert!(message.starts_with("CHYBA - "));
    }

    #[test]
    fn test_site_error_message_absent() {
        assert_eq!(site_error_message("<html><body>ok</body></html>"), None);
    }

    #[test]
    fn test_parse_download_anchor() {
        let html = "<html><body><a id=\"downlink\"> www.titulky.com/files/sub.srt </a></body></html>";
        assert_eq!(
            parse_download_anchor(html),
            Some("https://www.titulky.com/files/sub.srt".to_string())
        );
    }

    #[test]
    fn test_parse_download_anchor_with_scheme() {
        let html = "<html><body><a id=\"downlink\">http://127.0.0.1:9000/files/sub.srt</a></body></html>";
        assert_eq!(
            parse_download_anchor(html),
            Some("http://127.0.0.1:9000/files/sub.srt".to_string())
        );
    }

    #[test]
    fn test_parse_download_anchor_missing() {
        assert_eq!(parse_download_anchor("<html><body></body></html>"), None);
        let empty = "<html><body><a id=\"downlink\"> </a></body></html>";
        assert_eq!(parse_download_anchor(empty), None);
    }

    #[test]
    fn test_parse_countdown() {
        let html = "<html><body><script>CountDown(12)</script></body></html>";
        assert_eq!(parse_countdown(html), Some(Duration::from_millis(12_500)));
    }

    #[test]
    fn test_parse_countdown_absent_or_malformed() {
        assert_eq!(parse_countdown("<html><body></body></html>"), None);
        assert_eq!(
            parse_countdown("<script>CountDown(soon)</script>"),
            None
        );
    }
}
