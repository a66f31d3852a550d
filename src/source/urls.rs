//! URL normalization for hrefs found in listing, detail and reader pages.

use reqwest::Url;

/// Resolve `href` against `base` into one canonical absolute URL.
///
/// Absolute hrefs are re-serialized as-is; relative and protocol-relative hrefs are joined per
/// standard URL rules. If `base` itself is not a valid URL the href is returned trimmed.
/// Normalizing an already normalized URL returns it unchanged.
pub fn normalize(base: &str, href: &str) -> String {
    let href = href.trim();
    if let Ok(absolute) = Url::parse(href) {
        return absolute.to_string();
    }
    match Url::parse(base).and_then(|b| b.join(href)) {
        Ok(joined) => joined.to_string(),
        Err(_) => href.to_string(),
    }
}

/// Drop a trailing page file such as `1.html`, keeping the directory with its trailing slash.
pub fn strip_page_file(url: &str) -> &str {
    match url.rfind('/') {
        Some(slash) if url[slash + 1..].ends_with(".html") => &url[..=slash],
        _ => url,
    }
}
