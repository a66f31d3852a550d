//! foxscrape: catalog, chapter and reader-page extraction for the Mangafox manga directory.

pub mod cli;
pub mod config;
pub mod logging;
pub mod model;
pub mod source;

// Re-exports for CLI and consumers.
pub use model::{CatalogEntry, Chapter, CrawlStop, Listing, ListingPage};
pub use source::{
    crawl_listing, resolve_site, source_for, CrawlOptions, Fetch, PoliteClient,
    PoliteClientBuilder, ScraperError, Source, SourceId,
};
