//! Subtitle detail-page parser
//!
//! The only thing read from a detail page is the frame rate, shown in an
//! "uploaded by" info block marked with a film-reel icon.

use scraper::{Html, Selector};

/// Extract the frame rate from a subtitle detail page.
///
/// The block's text is expected to start with `<value> fps`; a decimal comma
/// is normalized before parsing. Any structural mismatch yields `None`, the
/// "unknown" sentinel the caller caches.
pub fn parse_fps(html: &str) -> Option<f64> {
    let document = Html::parse_document(html);

    let container_selector = Selector::parse("div.ulozil").ok()?;
    let icon_selector = Selector::parse("img[src='img/ico/Movieroll.png']").ok()?;

    let container = document
        .select(&container_selector)
        .find(|div| div.select(&icon_selector).next().is_some())?;

    let text = container.text().collect::<String>();
    let mut tokens = text.split_whitespace();
    let value = tokens.next()?;
    let unit = tokens.next()?;
    if !unit.eq_ignore_ascii_case("fps") {
        return None;
    }

    value.replace(',', ".").parse().ok()
}
