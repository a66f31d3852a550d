//! Mangafox adapter. Directory and search listings, series detail, chapter list, and reader pages.
//!
//! The selectors below are the site contract; the tests pin them against representative markup.

use crate::model::{CatalogEntry, Chapter, ListingPage};
use crate::source::error::ScraperError;
use crate::source::urls::{normalize, strip_page_file};
use crate::source::{
    dates, element_text, optional_text, parse_markup, parse_selector, Source, SourceId,
};
use chrono::{DateTime, Local};
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

pub const NAME: &str = "Mangafox (EN)";
pub const BASE_URL: &str = "http://mangafox.me";
pub const POPULAR_URL: &str = "http://mangafox.me/directory/";
pub const SEARCH_URL: &str =
    "http://mangafox.me/search.php?name_method=cw&advopts=1&order=az&sort=name";

const POPULAR_ITEMS: &str = "div#mangalist > ul.list > li";
const POPULAR_ANCHOR: &str = "a.title";
// Rows after the header row.
const SEARCH_ITEMS: &str = "table#listing > tbody > tr:nth-child(n+2)";
const SEARCH_ANCHOR: &str = "a.series_preview";
const NEXT_MARKER: &str = "span.next";

/// Value of the page selector option that is a control, not a page.
const SENTINEL_OPTION: &str = "0";
const PAGE_EXTENSION: &str = ".html";

/// The Mangafox source. Stateless; every method is a pure function of its inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mangafox;

/// Drop the decorative last word the site appends to series headings ("One Piece Manga").
/// A single-word title is returned unchanged.
pub fn strip_title_suffix(title: &str) -> &str {
    let title = title.trim();
    match title.rfind(' ') {
        Some(space) => title[..space].trim_end(),
        None => title,
    }
}

/// Parse one listing page: every item matching `items`, then the "next" control.
fn parse_listing(
    html: &str,
    context: &str,
    items: &str,
    anchor: &str,
    next_base: &str,
) -> Result<ListingPage, ScraperError> {
    let doc = parse_markup(html, context)?;
    let item_sel = parse_selector(items)?;
    let anchor_sel = parse_selector(anchor)?;
    let entries = doc
        .select(&item_sel)
        .filter_map(|item| entry_from_item(item, &anchor_sel))
        .collect();
    Ok(ListingPage {
        entries,
        next_url: next_page_url(&doc, next_base)?,
    })
}

/// Placeholder entry from one listing item, or `None` when the title anchor is missing.
fn entry_from_item(item: ElementRef<'_>, anchor_sel: &Selector) -> Option<CatalogEntry> {
    let Some(anchor) = item.select(anchor_sel).next() else {
        debug!("listing item without title anchor; skipped");
        return None;
    };
    let Some(href) = anchor.value().attr("href").and_then(navigable_href) else {
        debug!("listing anchor without navigable href; skipped");
        return None;
    };
    Some(CatalogEntry::placeholder(
        normalize(BASE_URL, href),
        element_text(anchor),
    ))
}

/// The trimmed href, or `None` when following it would not leave the page.
fn navigable_href(href: &str) -> Option<&str> {
    let href = href.trim();
    let inert = href.is_empty() || href.starts_with('#') || href.starts_with("javascript:");
    (!inert).then_some(href)
}

/// URL of the next listing page, resolved against `base`, or `None` on the last page.
///
/// The next control is the first link wrapping a `span.next`. A control without a navigable
/// href counts as absent.
pub fn next_page_url(doc: &Html, base: &str) -> Result<Option<String>, ScraperError> {
    let link_sel = parse_selector("a")?;
    let marker_sel = parse_selector(NEXT_MARKER)?;
    let next = doc
        .select(&link_sel)
        .find(|a| a.select(&marker_sel).next().is_some())
        .and_then(|a| a.value().attr("href"))
        .and_then(navigable_href)
        .map(|href| normalize(base, href));
    Ok(next)
}

/// Upload time of one chapter block. Absent and unrecognised dates both give 0, logged apart.
fn upload_date(
    block: ElementRef<'_>,
    date_sel: &Selector,
    url: &str,
    now: &DateTime<Local>,
) -> i64 {
    let Some(text) = block.select(date_sel).next().map(element_text) else {
        debug!(chapter = %url, "chapter has no date");
        return 0;
    };
    match dates::try_resolve(&text, now) {
        Some(ts) => ts,
        None => {
            warn!(chapter = %url, date = %text, "unresolved upload date");
            0
        }
    }
}

impl Source for Mangafox {
    fn id(&self) -> SourceId {
        SourceId::Mangafox
    }

    fn name(&self) -> &'static str {
        NAME
    }

    fn base_url(&self) -> &'static str {
        BASE_URL
    }

    fn popular_url(&self) -> String {
        POPULAR_URL.to_string()
    }

    fn search_url(&self, query: &str) -> Result<String, ScraperError> {
        Url::parse_with_params(SEARCH_URL, &[("name", query.trim()), ("page", "1")])
            .map(String::from)
            .map_err(|e| ScraperError::InvalidUrl {
                input: SEARCH_URL.to_string(),
                reason: e.to_string(),
            })
    }

    fn parse_popular(&self, html: &str) -> Result<ListingPage, ScraperError> {
        // Directory pagination links are relative to the directory root.
        parse_listing(html, "directory page", POPULAR_ITEMS, POPULAR_ANCHOR, POPULAR_URL)
    }

    fn parse_search(&self, html: &str) -> Result<ListingPage, ScraperError> {
        // Search pagination links are relative to the site root.
        parse_listing(html, "search page", SEARCH_ITEMS, SEARCH_ANCHOR, BASE_URL)
    }

    fn parse_detail(&self, url: &str, html: &str) -> Result<CatalogEntry, ScraperError> {
        let doc = parse_markup(html, url)?;
        let info_sel = parse_selector("div#title")?;
        let title_sel = parse_selector("h2 > a")?;
        let row_sel = parse_selector("table > tbody > tr:nth-child(2)")?;
        let author_sel = parse_selector("td:nth-child(2)")?;
        let artist_sel = parse_selector("td:nth-child(3)")?;
        let genre_sel = parse_selector("td:nth-child(4)")?;
        let summary_sel = parse_selector("p.summary")?;
        let cover_sel = parse_selector("div.cover > img")?;

        let info = doc.select(&info_sel).next();
        let title = info
            .and_then(|i| optional_text(i, &title_sel))
            .map(|t| strip_title_suffix(&t).to_string())
            .ok_or_else(|| ScraperError::RequiredFieldAbsent {
                field: "title",
                context: url.to_string(),
            })?;
        let row = info.and_then(|i| i.select(&row_sel).next());
        let cell = |sel: &Selector| row.and_then(|r| optional_text(r, sel));

        Ok(CatalogEntry {
            url: url.to_string(),
            title: Some(title),
            author: cell(&author_sel),
            artist: cell(&artist_sel),
            genre: cell(&genre_sel),
            description: info.and_then(|i| optional_text(i, &summary_sel)),
            thumbnail_url: doc
                .select(&cover_sel)
                .next()
                .and_then(|img| img.value().attr("src"))
                .filter(|src| !src.trim().is_empty())
                .map(|src| normalize(BASE_URL, src)),
            initialized: true,
        })
    }

    fn parse_chapters(
        &self,
        manga_url: &str,
        html: &str,
        now: &DateTime<Local>,
    ) -> Result<Vec<Chapter>, ScraperError> {
        let doc = parse_markup(html, manga_url)?;
        let block_sel = parse_selector("div#chapters li div")?;
        let link_sel = parse_selector("a.tips")?;
        let date_sel = parse_selector("span.date")?;
        let date_fetch = now.timestamp_millis();

        let chapters = doc
            .select(&block_sel)
            .filter_map(|block| {
                let Some(link) = block.select(&link_sel).next() else {
                    debug!(manga = %manga_url, "chapter block without link; skipped");
                    return None;
                };
                let Some(href) = link.value().attr("href").and_then(navigable_href) else {
                    debug!(manga = %manga_url, "chapter link without navigable href; skipped");
                    return None;
                };
                let url = normalize(BASE_URL, href);
                Some(Chapter {
                    manga_url: manga_url.to_string(),
                    name: element_text(link),
                    date_upload: upload_date(block, &date_sel, &url, now),
                    date_fetch,
                    url,
                })
            })
            .collect();
        Ok(chapters)
    }

    fn parse_page_urls(&self, html: &str) -> Result<Vec<String>, ScraperError> {
        let doc = parse_markup(html, "reader page")?;
        let select_sel = parse_selector("select.m")?;
        let option_sel = parse_selector("option")?;
        let nav_sel = parse_selector("div#series a")?;

        let select = doc
            .select(&select_sel)
            .next()
            .ok_or_else(|| ScraperError::RequiredFieldAbsent {
                field: "page selector",
                context: "reader page".to_string(),
            })?;
        let nav_href = doc
            .select(&nav_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .ok_or_else(|| ScraperError::RequiredFieldAbsent {
                field: "series navigation link",
                context: "reader page".to_string(),
            })?;
        let chapter_url = normalize(BASE_URL, nav_href);
        let base = strip_page_file(&chapter_url);

        Ok(select
            .select(&option_sel)
            .filter_map(|option| option.value().attr("value"))
            .map(str::trim)
            .filter(|value| !value.is_empty() && *value != SENTINEL_OPTION)
            .map(|value| format!("{base}{value}{PAGE_EXTENSION}"))
            .collect())
    }

    fn parse_image_url(&self, html: &str) -> Result<String, ScraperError> {
        let doc = parse_markup(html, "reader page")?;
        let image_sel = parse_selector("#image")?;
        doc.select(&image_sel)
            .next()
            .and_then(|img| img.value().attr("src"))
            .filter(|src| !src.trim().is_empty())
            .map(|src| normalize(BASE_URL, src))
            .ok_or_else(|| ScraperError::RequiredFieldAbsent {
                field: "page image",
                context: "reader page".to_string(),
            })
    }
}
