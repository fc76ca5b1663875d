//! Catalog listing parser for Titulky.com
//!
//! The per-title listing page enumerates subtitles for all episodes of a
//! season (or a single pseudo-episode 0 for movies). Rows come in document
//! order: an `h5` row announces the episode number of the subtitle rows that
//! follow it, and rows classed `pbl1` (approved) or `pbl0` (unapproved) hold
//! the actual entries.

use std::collections::BTreeMap;

use scraper::{ElementRef, Html, Selector};

use crate::error::{Result, TitulkyError};
use crate::session::SiteUrls;
use crate::types::SubtitleLanguage;

/// One parsed subtitle row, before policy filters and materialization
#[derive(Debug, Clone)]
pub struct CatalogRow {
    pub sub_id: String,
    pub release_info: String,
    pub approved: bool,
    pub language: SubtitleLanguage,
    pub uploader: String,
    pub details_link: String,
    pub download_link: String,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| TitulkyError::Parse(format!("Invalid selector: {e:?}")))
}

/// Parse the subtitle listing page into an episode-number index.
///
/// Returns `Ok(None)` when the listing container is missing, which the site
/// uses for unknown titles; that case is an empty result, not an error.
/// Rows with indeterminate language or with row-level defects are skipped;
/// a subtitle row before any episode-number row and unparsable episode
/// numbers are fatal for the whole page.
pub fn parse_catalog(
    html: &str,
    urls: &SiteUrls,
) -> Result<Option<BTreeMap<u32, Vec<CatalogRow>>>> {
    let document = Html::parse_document(html);

    let container_selector = selector("form.cloudForm")?;
    let row_selector = selector("div.row")?;
    let number_selector = selector("h5")?;
    let anchor_selector = selector("a")?;
    let czech_flag_selector = selector("img[src*='flag-CZ']")?;
    let slovak_flag_selector = selector("img[src*='flag-SK']")?;

    let Some(container) = document.select(&container_selector).next() else {
        return Ok(None);
    };

    let id_regex = regex_lite::Regex::new(r"id=(\d+)")
        .map_err(|e| TitulkyError::Parse(format!("Invalid regex: {e}")))?;

    let mut index: BTreeMap<u32, Vec<CatalogRow>> = BTreeMap::new();
    let mut current_episode: Option<u32> = None;

    for row in container.select(&row_selector) {
        // Episode-number marker rows update the running context, e.g. "3."
        if let Some(number_container) = row.select(&number_selector).next() {
            let text = number_container.text().collect::<String>();
            let number_str = text.trim().trim_end_matches('.');
            let number = if number_str.is_empty() {
                0
            } else {
                number_str.parse::<u32>().map_err(|_| {
                    TitulkyError::Parse("could not parse episode number".to_string())
                })?
            };
            current_episode = Some(number);
            continue;
        }

        let mut classes = (false, false);
        for class in row.value().classes() {
            match class {
                "pbl1" => classes.0 = true,
                "pbl0" => classes.1 = true,
                _ => {}
            }
        }
        let (approved_class, unapproved_class) = classes;
        if !approved_class && !unapproved_class {
            continue;
        }
        let Some(anchor) = row.select(&anchor_selector).next() else {
            continue;
        };

        let Some(episode) = current_episode else {
            return Err(TitulkyError::Parse(
                "episode number row missing before subtitle entry".to_string(),
            ));
        };

        // "???" is the site's placeholder for an unknown release
        let mut release_info = anchor.text().collect::<String>().trim().to_string();
        if release_info == "???" {
            release_info.clear();
        }

        let Some(tail) = anchor.value().attr("href").and_then(|href| href.get(1..)) else {
            tracing::debug!("subtitle row without a detail link, skipping");
            continue;
        };
        let details_link = format!("{}{}", urls.premium_base(), tail);

        let Some(sub_id) = id_regex
            .captures(&details_link)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
        else {
            tracing::debug!(details_link, "no subtitle id in detail link, skipping");
            continue;
        };

        let download_link = if unapproved_class {
            format!("{}{}", urls.premium_download_prefix(), sub_id)
        } else {
            format!("{}{}", urls.normal_download_prefix(), sub_id)
        };

        let Some(uploader) = nth_child_text(&row, 2) else {
            tracing::debug!("subtitle row without an uploader cell, skipping");
            continue;
        };

        let czech = row.select(&czech_flag_selector).next().is_some();
        let slovak = row.select(&slovak_flag_selector).next().is_some();
        let language = match (czech, slovak) {
            (true, false) => SubtitleLanguage::Czech,
            (false, true) => SubtitleLanguage::Slovak,
            // Rows with both flags or neither are indeterminate.
            _ => {
                tracing::debug!("unknown language while parsing subtitle row, skipping");
                continue;
            }
        };

        index.entry(episode).or_default().push(CatalogRow {
            sub_id,
            release_info,
            approved: approved_class,
            language,
            uploader,
            details_link,
            download_link,
        });
    }

    Ok(Some(index))
}

/// Text of the row's n-th element child; the uploader sits at a fixed
/// position in the row markup.
fn nth_child_text(row: &ElementRef, index: usize) -> Option<String> {
    let child = row.children().filter_map(ElementRef::wrap).nth(index)?;
    Some(child.text().collect::<String>().trim().to_string())
}
