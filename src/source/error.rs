//! Shared error type for source adapters, the network client and the pagination driver.

use thiserror::Error;

/// Errors surfaced by a source adapter. Absent optional nodes and unresolved dates are not errors.
#[derive(Debug, Error)]
pub enum ScraperError {
    // Site / URL
    #[error("Invalid URL: {input}: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("Could not detect source from URL host '{host}'. Use --site mangafox.")]
    UnrecognizedHost { host: String },

    #[error("Unknown source '{name}'. Known sources: mangafox.")]
    UnknownSource { name: String },

    // HTTP and network
    #[error("Network error: could not reach {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to read response body: {source}")]
    BodyRead { source: reqwest::Error },

    // Parsing
    #[error("Invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Malformed markup in {context}: {reason}")]
    MalformedMarkup { context: String, reason: String },

    #[error("Extraction failed: required {field} not found in {context} (site markup may have changed)")]
    RequiredFieldAbsent {
        field: &'static str,
        context: String,
    },
}
