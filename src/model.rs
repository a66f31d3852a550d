//! Catalog data model shared by every source adapter.
//!
//! Timestamps are milliseconds since the Unix epoch. A `date_upload` of 0 means the site's date
//! text was absent or could not be resolved.

use serde::{Deserialize, Serialize};

/// One work listed on a source site, identified by its site-scoped URL.
///
/// List pages produce placeholders (`initialized == false`, url and title only); the detail page
/// produces a fully loaded value through [CatalogEntry::merge_detail].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub url: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub artist: Option<String>,
    pub description: Option<String>,
    pub genre: Option<String>,
    #[serde(rename = "thumbnailUrl")]
    pub thumbnail_url: Option<String>,
    pub initialized: bool,
}

impl CatalogEntry {
    /// Placeholder as extracted from a listing page. An empty title is recorded as absent.
    pub fn placeholder(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: Some(title.into()).filter(|t| !t.is_empty()),
            ..Self::default()
        }
    }

    /// Build the enriched entry from this placeholder and the fields read off the detail page.
    ///
    /// Detail fields win when present; anything the detail page lacked keeps the placeholder's
    /// value. The result is always `initialized`, and the URL stays the placeholder's identity.
    pub fn merge_detail(&self, detail: CatalogEntry) -> CatalogEntry {
        CatalogEntry {
            url: self.url.clone(),
            title: detail.title.or_else(|| self.title.clone()),
            author: detail.author.or_else(|| self.author.clone()),
            artist: detail.artist.or_else(|| self.artist.clone()),
            description: detail.description.or_else(|| self.description.clone()),
            genre: detail.genre.or_else(|| self.genre.clone()),
            thumbnail_url: detail.thumbnail_url.or_else(|| self.thumbnail_url.clone()),
            initialized: true,
        }
    }
}

/// One chapter of a catalog entry. Never mutated after extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    /// URL of the parent [CatalogEntry].
    #[serde(rename = "mangaUrl")]
    pub manga_url: String,
    pub name: String,
    pub url: String,
    /// Upload time resolved from the site's date text; 0 when unknown.
    #[serde(rename = "dateUpload")]
    pub date_upload: i64,
    /// When this record was observed.
    #[serde(rename = "dateFetch")]
    pub date_fetch: i64,
}

/// Entries of one fetched listing page plus the link to the following page, if any.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListingPage {
    pub entries: Vec<CatalogEntry>,
    #[serde(rename = "nextUrl")]
    pub next_url: Option<String>,
}

/// Why a multi-page traversal stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum CrawlStop {
    /// The last fetched page had no "next" control.
    LastPage,
    /// The caller-supplied page bound was reached while a next page still existed.
    PageLimit,
    /// A page after the first could not be fetched or parsed; earlier pages are kept.
    PageFailed { url: String, message: String },
}

/// Entries accumulated across every page of one listing, in page-then-document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub entries: Vec<CatalogEntry>,
    #[serde(rename = "pagesFetched")]
    pub pages_fetched: u32,
    pub stop: CrawlStop,
}
