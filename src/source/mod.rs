//! Source adapters: the adapter contract, the source registry, the pagination driver, and shared
//! extraction helpers.

mod client;
mod error;

pub mod dates;
pub mod mangafox;
pub mod urls;

pub use client::{PoliteClient, PoliteClientBuilder};
pub use error::ScraperError;

use crate::model::{CatalogEntry, Chapter, CrawlStop, Listing, ListingPage};
use chrono::{DateTime, Local};
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use std::str::FromStr;
use tracing::{info, warn};

/// Supplies raw markup for a URL. [PoliteClient] is the network implementation.
pub trait Fetch {
    fn fetch(&mut self, url: &str) -> Result<String, ScraperError>;
}

/// Known source sites. Used for dispatch and for the `--site` override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceId {
    Mangafox,
}

impl SourceId {
    pub fn name(self) -> &'static str {
        match self {
            SourceId::Mangafox => "mangafox",
        }
    }
}

impl FromStr for SourceId {
    type Err = ScraperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mangafox" | "mf" => Ok(SourceId::Mangafox),
            _ => Err(ScraperError::UnknownSource {
                name: s.to_string(),
            }),
        }
    }
}

/// Resolve which source handles a URL, unless an override is given.
pub fn resolve_site(
    url_input: &str,
    override_site: Option<SourceId>,
) -> Result<SourceId, ScraperError> {
    if let Some(site) = override_site {
        return Ok(site);
    }
    let url = Url::parse(url_input).map_err(|e| ScraperError::InvalidUrl {
        input: url_input.to_string(),
        reason: e.to_string(),
    })?;
    let host = url.host_str().ok_or_else(|| ScraperError::InvalidUrl {
        input: url_input.to_string(),
        reason: "URL has no host".to_string(),
    })?;
    if host.contains("mangafox") || host.contains("fanfox") {
        Ok(SourceId::Mangafox)
    } else {
        Err(ScraperError::UnrecognizedHost {
            host: host.to_string(),
        })
    }
}

/// Build the adapter registered for a source.
pub fn source_for(id: SourceId) -> Box<dyn Source> {
    match id {
        SourceId::Mangafox => Box::new(mangafox::Mangafox),
    }
}

/// Options for a multi-page listing traversal.
#[derive(Default)]
pub struct CrawlOptions<'a> {
    /// Stop after this many pages even if a next page exists. `None` follows every "next" link.
    pub max_pages: Option<u32>,
    /// Called after each page with the running page count and the page URL.
    pub progress: Option<&'a dyn Fn(u32, &str)>,
}

/// Contract implemented by every site adapter.
///
/// The `parse_*` methods are pure functions of the markup. The provided `list_*`/`fetch_*`
/// methods drive a [Fetch] collaborator and the pagination loop on top of them.
pub trait Source: Send + Sync {
    fn id(&self) -> SourceId;
    fn name(&self) -> &'static str;
    fn base_url(&self) -> &'static str;

    /// First page of the popularity listing.
    fn popular_url(&self) -> String;
    /// First page of the search listing for `query`.
    fn search_url(&self, query: &str) -> Result<String, ScraperError>;

    fn parse_popular(&self, html: &str) -> Result<ListingPage, ScraperError>;
    fn parse_search(&self, html: &str) -> Result<ListingPage, ScraperError>;
    /// Detail fields of the entry at `url`. The caller merges them into its placeholder.
    fn parse_detail(&self, url: &str, html: &str) -> Result<CatalogEntry, ScraperError>;
    /// Chapters listed on the entry page. Upload dates resolve in the local time zone, using the
    /// zone's own offset for each date rather than the offset in effect at `now`.
    fn parse_chapters(
        &self,
        manga_url: &str,
        html: &str,
        now: &DateTime<Local>,
    ) -> Result<Vec<Chapter>, ScraperError>;
    fn parse_page_urls(&self, html: &str) -> Result<Vec<String>, ScraperError>;
    fn parse_image_url(&self, html: &str) -> Result<String, ScraperError>;

    fn list_popular(
        &self,
        client: &mut dyn Fetch,
        options: &CrawlOptions<'_>,
    ) -> Result<Listing, ScraperError> {
        crawl_listing(client, &self.popular_url(), |html| self.parse_popular(html), options)
    }

    fn list_search(
        &self,
        client: &mut dyn Fetch,
        query: &str,
        options: &CrawlOptions<'_>,
    ) -> Result<Listing, ScraperError> {
        let start = self.search_url(query)?;
        crawl_listing(client, &start, |html| self.parse_search(html), options)
    }

    /// Fetch the detail page of `entry` and return the enriched, initialized entry.
    fn fetch_detail(
        &self,
        client: &mut dyn Fetch,
        entry: &CatalogEntry,
    ) -> Result<CatalogEntry, ScraperError> {
        let html = client.fetch(&entry.url)?;
        let detail = self.parse_detail(&entry.url, &html)?;
        Ok(entry.merge_detail(detail))
    }

    fn fetch_chapters(
        &self,
        client: &mut dyn Fetch,
        manga_url: &str,
        now: &DateTime<Local>,
    ) -> Result<Vec<Chapter>, ScraperError> {
        let html = client.fetch(manga_url)?;
        self.parse_chapters(manga_url, &html, now)
    }

    fn fetch_page_urls(
        &self,
        client: &mut dyn Fetch,
        chapter_url: &str,
    ) -> Result<Vec<String>, ScraperError> {
        let html = client.fetch(chapter_url)?;
        self.parse_page_urls(&html)
    }

    fn fetch_image_url(
        &self,
        client: &mut dyn Fetch,
        page_url: &str,
    ) -> Result<String, ScraperError> {
        let html = client.fetch(page_url)?;
        self.parse_image_url(&html)
    }
}

/// Follow "next" links from `start_url`, accumulating entries in page order.
///
/// Traversal ends when a page has no next link, when `options.max_pages` is reached, or when a
/// page after the first fails to fetch or parse (earlier pages are kept). A failing first page is
/// returned as the error.
pub fn crawl_listing<F>(
    client: &mut dyn Fetch,
    start_url: &str,
    parse: F,
    options: &CrawlOptions<'_>,
) -> Result<Listing, ScraperError>
where
    F: Fn(&str) -> Result<ListingPage, ScraperError>,
{
    let mut entries = Vec::new();
    let mut pages_fetched = 0u32;
    let mut next = Some(start_url.to_string());

    while let Some(url) = next.take() {
        if options.max_pages.is_some_and(|max| pages_fetched >= max) {
            warn!(url = %url, pages_fetched, "page limit reached; listing truncated");
            return Ok(Listing {
                entries,
                pages_fetched,
                stop: CrawlStop::PageLimit,
            });
        }

        let page = match client.fetch(&url).and_then(|html| parse(&html)) {
            Ok(page) => page,
            Err(e) if pages_fetched == 0 => return Err(e),
            Err(e) => {
                warn!(url = %url, error = %e, "listing page failed; keeping earlier pages");
                return Ok(Listing {
                    entries,
                    pages_fetched,
                    stop: CrawlStop::PageFailed {
                        message: e.to_string(),
                        url,
                    },
                });
            }
        };

        pages_fetched += 1;
        info!(url = %url, page = pages_fetched, entries = page.entries.len(), "listing page");
        if let Some(progress) = options.progress {
            progress(pages_fetched, &url);
        }
        entries.extend(page.entries);
        next = page.next_url;
    }

    Ok(Listing {
        entries,
        pages_fetched,
        stop: CrawlStop::LastPage,
    })
}

/// Parse a CSS selector or return a parse error (avoids panics from Selector::parse).
pub(crate) fn parse_selector(sel: &str) -> Result<Selector, ScraperError> {
    Selector::parse(sel).map_err(|e| ScraperError::InvalidSelector {
        selector: sel.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a page into a document. Empty or whitespace-only bodies are malformed; anything else is
/// accepted since the HTML parser recovers from broken markup.
pub(crate) fn parse_markup(html: &str, context: &str) -> Result<Html, ScraperError> {
    if html.trim().is_empty() {
        return Err(ScraperError::MalformedMarkup {
            context: context.to_string(),
            reason: "empty document".to_string(),
        });
    }
    Ok(Html::parse_document(html))
}

/// Text content of an element with whitespace runs collapsed.
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the first match of `sel` under `scope`, if present and non-empty.
pub(crate) fn optional_text(scope: ElementRef<'_>, sel: &Selector) -> Option<String> {
    scope
        .select(sel)
        .next()
        .map(element_text)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Serves fixture pages by URL and records every fetch.
    struct FixtureFetcher {
        pages: HashMap<String, String>,
        fetched: Vec<String>,
    }

    impl FixtureFetcher {
        fn new(pages: impl IntoIterator<Item = (String, String)>) -> Self {
            Self {
                pages: pages.into_iter().collect(),
                fetched: Vec::new(),
            }
        }
    }

    impl Fetch for FixtureFetcher {
        fn fetch(&mut self, url: &str) -> Result<String, ScraperError> {
            self.fetched.push(url.to_string());
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| ScraperError::HttpStatus {
                    status: 404,
                    url: url.to_string(),
                })
        }
    }

    /// Directory page `n` of `total`, with two entries and a next link unless it is the last.
    fn directory_page(n: u32, total: u32) -> String {
        let next = if n < total {
            format!(r#"<a href="{}.htm" class="next"><span class="next">Next</span></a>"#, n + 1)
        } else {
            String::new()
        };
        format!(
            r#"<html><body><div id="mangalist"><ul class="list">
<li><a class="title" href="http://mangafox.me/manga/p{n}_a/">Page {n} A</a></li>
<li><a class="title" href="http://mangafox.me/manga/p{n}_b/">Page {n} B</a></li>
</ul></div><div id="nav">{next}</div></body></html>"#
        )
    }

    fn directory_url(n: u32) -> String {
        if n == 1 {
            mangafox::POPULAR_URL.to_string()
        } else {
            format!("{}{}.htm", mangafox::POPULAR_URL, n)
        }
    }

    fn directory_chain(total: u32) -> FixtureFetcher {
        FixtureFetcher::new((1..=total).map(|n| (directory_url(n), directory_page(n, total))))
    }

    #[test]
    fn crawl_follows_chain_until_no_next_link() -> Result<(), ScraperError> {
        let source = mangafox::Mangafox;
        let mut fetcher = directory_chain(4);
        let listing = source.list_popular(&mut fetcher, &CrawlOptions::default())?;

        assert_eq!(fetcher.fetched.len(), 4);
        assert_eq!(listing.pages_fetched, 4);
        assert_eq!(listing.stop, CrawlStop::LastPage);
        let titles: Vec<_> = listing
            .entries
            .iter()
            .filter_map(|e| e.title.as_deref())
            .collect();
        assert_eq!(
            titles,
            [
                "Page 1 A", "Page 1 B", "Page 2 A", "Page 2 B", "Page 3 A", "Page 3 B",
                "Page 4 A", "Page 4 B"
            ]
        );
        Ok(())
    }

    #[test]
    fn crawl_single_page_without_next_fetches_once() -> Result<(), ScraperError> {
        let mut fetcher = directory_chain(1);
        let listing = mangafox::Mangafox.list_popular(&mut fetcher, &CrawlOptions::default())?;
        assert_eq!(fetcher.fetched, [mangafox::POPULAR_URL]);
        assert_eq!(listing.entries.len(), 2);
        Ok(())
    }

    #[test]
    fn crawl_stops_at_page_limit() -> Result<(), ScraperError> {
        let mut fetcher = directory_chain(5);
        let options = CrawlOptions {
            max_pages: Some(2),
            progress: None,
        };
        let listing = mangafox::Mangafox.list_popular(&mut fetcher, &options)?;
        assert_eq!(fetcher.fetched.len(), 2);
        assert_eq!(listing.entries.len(), 4);
        assert_eq!(listing.stop, CrawlStop::PageLimit);
        Ok(())
    }

    #[test]
    fn crawl_keeps_earlier_pages_when_later_page_fails() -> Result<(), ScraperError> {
        let mut fetcher = directory_chain(3);
        fetcher.pages.remove(&directory_url(3));
        let listing = mangafox::Mangafox.list_popular(&mut fetcher, &CrawlOptions::default())?;
        assert_eq!(listing.pages_fetched, 2);
        assert_eq!(listing.entries.len(), 4);
        match listing.stop {
            CrawlStop::PageFailed { url, message } => {
                assert_eq!(url, directory_url(3));
                assert!(message.contains("404"));
            }
            other => panic!("expected PageFailed, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn crawl_stops_on_malformed_later_page() -> Result<(), ScraperError> {
        let mut fetcher = directory_chain(3);
        fetcher.pages.insert(directory_url(2), "   ".to_string());
        let listing = mangafox::Mangafox.list_popular(&mut fetcher, &CrawlOptions::default())?;
        assert_eq!(fetcher.fetched.len(), 2);
        assert_eq!(listing.entries.len(), 2);
        assert!(matches!(listing.stop, CrawlStop::PageFailed { .. }));
        Ok(())
    }

    #[test]
    fn crawl_first_page_failure_is_an_error() {
        let mut fetcher = FixtureFetcher::new(Vec::new());
        let result = mangafox::Mangafox.list_popular(&mut fetcher, &CrawlOptions::default());
        assert!(matches!(result, Err(ScraperError::HttpStatus { status: 404, .. })));
    }

    #[test]
    fn crawl_reports_progress_per_page() -> Result<(), ScraperError> {
        let mut fetcher = directory_chain(3);
        let seen = std::cell::RefCell::new(Vec::new());
        let record = |n: u32, url: &str| seen.borrow_mut().push((n, url.to_string()));
        let options = CrawlOptions {
            max_pages: None,
            progress: Some(&record),
        };
        mangafox::Mangafox.list_popular(&mut fetcher, &options)?;
        let seen = seen.into_inner();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2], (3, directory_url(3)));
        Ok(())
    }

    #[test]
    fn search_listing_follows_site_root_relative_next() -> Result<(), ScraperError> {
        let source = mangafox::Mangafox;
        let first = source.search_url("one piece")?;
        let second = "http://mangafox.me/search.php?name=one+piece&page=2".to_string();
        let page = |title: &str, next: &str| {
            format!(
                r#"<table id="listing"><tr><th>Name</th></tr>
<tr><td><a class="series_preview" href="http://mangafox.me/manga/{title}/">{title}</a></td></tr>
</table>{next}"#
            )
        };
        let mut fetcher = FixtureFetcher::new([
            (
                first.clone(),
                page(
                    "one_piece",
                    r#"<a href="/search.php?name=one+piece&amp;page=2"><span class="next">&gt;</span></a>"#,
                ),
            ),
            (second.clone(), page("one_piece_party", "")),
        ]);
        let listing = source.list_search(&mut fetcher, "one piece", &CrawlOptions::default())?;
        assert_eq!(fetcher.fetched, [first, second]);
        assert_eq!(listing.entries.len(), 2);
        assert_eq!(listing.entries[1].title.as_deref(), Some("one_piece_party"));
        Ok(())
    }

    #[test]
    fn fetch_detail_merges_into_placeholder() -> Result<(), ScraperError> {
        let url = "http://mangafox.me/manga/naruto/";
        let mut fetcher = FixtureFetcher::new([(
            url.to_string(),
            r#"<div id="title"><h2><a href="/manga/naruto/">Naruto Manga</a></h2><p class="summary">Ninja.</p></div>"#
                .to_string(),
        )]);
        let placeholder = CatalogEntry::placeholder(url, "Naruto");
        let entry = mangafox::Mangafox.fetch_detail(&mut fetcher, &placeholder)?;
        assert!(entry.initialized);
        assert_eq!(entry.url, url);
        assert_eq!(entry.title.as_deref(), Some("Naruto"));
        assert_eq!(entry.description.as_deref(), Some("Ninja."));
        Ok(())
    }

    #[test]
    fn site_detection_mangafox() -> Result<(), ScraperError> {
        assert_eq!(
            resolve_site("http://mangafox.me/manga/one_piece/", None)?,
            SourceId::Mangafox
        );
        Ok(())
    }

    #[test]
    fn site_detection_unrecognized_host_errors() -> Result<(), String> {
        let result = resolve_site("https://example.com/foo", None);
        match &result {
            Err(ScraperError::UnrecognizedHost { host }) if host == "example.com" => Ok(()),
            _ => Err(format!("expected UnrecognizedHost, got {:?}", result)),
        }
    }

    #[test]
    fn site_detection_invalid_url_errors() -> Result<(), String> {
        let result = resolve_site("not-a-url", None);
        match &result {
            Err(ScraperError::InvalidUrl { input, .. }) if input == "not-a-url" => Ok(()),
            _ => Err(format!("expected InvalidUrl, got {:?}", result)),
        }
    }

    #[test]
    fn site_override_ignores_url_host() -> Result<(), ScraperError> {
        let site = resolve_site("https://example.com/foo", Some(SourceId::Mangafox))?;
        assert_eq!(site, SourceId::Mangafox);
        Ok(())
    }

    #[test]
    fn source_id_from_str_and_registry() -> Result<(), ScraperError> {
        let id: SourceId = "MangaFox".parse()?;
        assert_eq!(id, SourceId::Mangafox);
        assert_eq!(source_for(id).id(), SourceId::Mangafox);
        assert_eq!(source_for(id).name(), "Mangafox (EN)");
        assert!(matches!(
            "other".parse::<SourceId>(),
            Err(ScraperError::UnknownSource { .. })
        ));
        Ok(())
    }

    #[test]
    fn parse_markup_rejects_empty_document() {
        assert!(matches!(
            parse_markup(" \n\t", "listing page"),
            Err(ScraperError::MalformedMarkup { .. })
        ));
        assert!(parse_markup("<p>unclosed", "listing page").is_ok());
    }

    #[test]
    fn element_text_collapses_whitespace() -> Result<(), ScraperError> {
        let doc = Html::parse_fragment("<p>  One\n   Piece <b>Manga</b> </p>");
        let p = doc
            .select(&parse_selector("p")?)
            .next()
            .ok_or(ScraperError::RequiredFieldAbsent {
                field: "p",
                context: "fixture".to_string(),
            })?;
        assert_eq!(element_text(p), "One Piece Manga");
        Ok(())
    }
}
