//! Optional config file loading. Search order: ./foxscrape.toml, then
//! $XDG_CONFIG_HOME/foxscrape/config.toml (or ~/.config/foxscrape/config.toml).

use serde::Deserialize;

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Delay in seconds between requests.
    pub request_delay_secs: Option<u64>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Number of HTTP attempts for transient failures (default 3).
    pub retry_count: Option<u32>,
    /// Delay in seconds before each retry (e.g. [1, 2, 4]).
    pub retry_backoff_secs: Option<Vec<u64>>,
    /// Upper bound on listing pages fetched per command. Unset follows every "next" link.
    pub max_pages: Option<u32>,
}

/// Search order: (1) ./foxscrape.toml, (2) $XDG_CONFIG_HOME/foxscrape/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("foxscrape.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("foxscrape").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            let s = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
            let config: Config = toml::from_str(&s)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
            tracing::debug!(path = %path.display(), "loaded config");
            return Ok(Some(config));
        }
    }
    Ok(None)
}
