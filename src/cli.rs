//! CLI parsing and orchestration. Parses args, runs one source operation, writes JSON. Maps errors
//! to exit codes.

use crate::config;
use crate::model::CatalogEntry;
use crate::source::urls::normalize;
use crate::source::{
    resolve_site, source_for, CrawlOptions, PoliteClient, ScraperError, Source, SourceId,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::cell::RefCell;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Scraper(#[from] ScraperError),

    #[error("Failed to write output: {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::Scraper(_) => 2,
            CliRunError::Output { .. } | CliRunError::Json(_) => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "foxscrape")]
#[command(about = "Scrape Mangafox listings, series details, chapters and reader pages as JSON")]
#[command(
    after_help = "Config file keys (user_agent, request_delay_secs, timeout_secs, retry_count, retry_backoff_secs, max_pages) are read from ./foxscrape.toml or the user config dir. CLI flags override config."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Override site detection (mangafox).
    #[arg(long, global = true, value_parser = parse_site)]
    pub site: Option<SourceId>,

    /// Write JSON here instead of stdout.
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Stop listings after this many pages (overrides config; default unbounded).
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_pages: Option<u32>,

    /// HTTP User-Agent (overrides config).
    #[arg(long, global = true)]
    pub user_agent: Option<String>,

    /// Delay between requests in seconds (overrides config; default 1).
    #[arg(long, global = true)]
    pub delay: Option<u64>,

    /// Request timeout in seconds (overrides config; default 30).
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Suppress progress output (warnings and errors only).
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Debug logging and the full error chain.
    #[arg(long, global = true)]
    pub verbose: bool,
}

impl Args {
    /// Default log filter when RUST_LOG is unset.
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the site directory in popularity order, following every page.
    Popular,
    /// List search results for a title query, following every page.
    Search { query: String },
    /// Fetch one series' detail page.
    Detail { url: String },
    /// List the chapters of a series.
    Chapters { url: String },
    /// List the reader page URLs of a chapter.
    Pages { url: String },
    /// Resolve the image URL shown on one reader page.
    Image { url: String },
}

fn parse_site(s: &str) -> Result<SourceId, String> {
    s.parse::<SourceId>().map_err(|_| {
        format!("Invalid --site value: '{}'. Use 'mangafox'.", s)
    })
}

/// Resolve the source for a URL argument, turning URL problems into input errors.
fn site_for_url(url: &str, override_site: Option<SourceId>) -> Result<SourceId, CliRunError> {
    resolve_site(url, override_site).map_err(|e| match &e {
        ScraperError::InvalidUrl { input, reason } => CliRunError::InvalidInput(format!(
            "Expected a page URL. Example: http://mangafox.me/manga/one_piece/ Invalid: {}: {}",
            input, reason
        )),
        ScraperError::UnrecognizedHost { host } => CliRunError::InvalidInput(format!(
            "Unsupported site: {}. Use --site mangafox to override, or provide a Mangafox URL.",
            host
        )),
        _ => CliRunError::Scraper(e),
    })
}

fn build_client(args: &Args, config: Option<&config::Config>) -> Result<PoliteClient, CliRunError> {
    const DEFAULT_DELAY_SECS: u64 = 1;
    const DEFAULT_TIMEOUT_SECS: u64 = 30;
    const DEFAULT_RETRY_COUNT: u32 = 3;
    let delay_secs = args
        .delay
        .or_else(|| config.and_then(|c| c.request_delay_secs))
        .unwrap_or(DEFAULT_DELAY_SECS);
    let timeout_secs = args
        .timeout
        .or_else(|| config.and_then(|c| c.timeout_secs))
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    let retry_count = config
        .and_then(|c| c.retry_count)
        .unwrap_or(DEFAULT_RETRY_COUNT)
        .max(1);
    let retry_backoff_secs = config
        .and_then(|c| c.retry_backoff_secs.clone())
        .unwrap_or_else(|| vec![1, 2, 4]);
    let user_agent = args
        .user_agent
        .clone()
        .or_else(|| config.and_then(|c| c.user_agent.clone()));

    let mut builder = PoliteClient::builder()
        .delay_secs(delay_secs)
        .timeout_secs(timeout_secs)
        .retry_count(retry_count)
        .retry_backoff_secs(retry_backoff_secs);
    if let Some(ua) = user_agent {
        builder = builder.user_agent(ua);
    }
    builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))
}

/// Serialize `value` as pretty JSON to `output`, or stdout when unset.
fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<(), CliRunError> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => std::fs::write(path, json + "\n").map_err(|e| CliRunError::Output {
            path: path.to_path_buf(),
            source: e,
        }),
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", json).map_err(|e| CliRunError::Output {
                path: PathBuf::from("<stdout>"),
                source: e,
            })
        }
    }
}

/// Ensure output path parent exists.
fn validate_output_path(path: &Path) -> Result<(), CliRunError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(CliRunError::InvalidInput(format!(
                "Cannot write output: {}: parent directory does not exist.",
                path.display()
            )));
        }
    }
    Ok(())
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let site = match &args.command {
        Command::Popular => args.site.unwrap_or(SourceId::Mangafox),
        Command::Search { query } => {
            if query.trim().is_empty() {
                return Err(CliRunError::InvalidInput(
                    "Search query must not be empty.".to_string(),
                ));
            }
            args.site.unwrap_or(SourceId::Mangafox)
        }
        Command::Detail { url }
        | Command::Chapters { url }
        | Command::Pages { url }
        | Command::Image { url } => site_for_url(url, args.site)?,
    };
    if let Some(path) = &args.output {
        validate_output_path(path)?;
    }

    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let mut client = build_client(args, config.as_ref())?;
    let source = source_for(site);
    let now = chrono::Local::now();

    let spinner: RefCell<Option<indicatif::ProgressBar>> = RefCell::new(None);
    let progress_cb = |pages: u32, _url: &str| {
        let mut state = spinner.borrow_mut();
        let pb = state.get_or_insert_with(|| {
            let bar = indicatif::ProgressBar::new_spinner();
            let style = indicatif::ProgressStyle::with_template("{spinner} {msg} ({elapsed})")
                .unwrap_or_else(|_| indicatif::ProgressStyle::default_spinner());
            bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        pb.set_message(format!("Fetched listing page {}", pages));
    };
    let progress: Option<&dyn Fn(u32, &str)> = if args.quiet { None } else { Some(&progress_cb) };
    let options = CrawlOptions {
        max_pages: args.max_pages.or_else(|| config.as_ref().and_then(|c| c.max_pages)),
        progress,
    };

    let output = args.output.as_deref();
    let result = run_command(&args.command, source.as_ref(), &mut client, &options, &now, output);

    if let Some(pb) = spinner.borrow_mut().take() {
        pb.disable_steady_tick();
        pb.finish_and_clear();
    }
    result?;

    if let (Some(path), false) = (&args.output, args.quiet) {
        eprintln!("Wrote {}", path.display());
    }
    Ok(())
}

fn run_command(
    command: &Command,
    source: &dyn Source,
    client: &mut PoliteClient,
    options: &CrawlOptions<'_>,
    now: &chrono::DateTime<chrono::Local>,
    output: Option<&Path>,
) -> Result<(), CliRunError> {
    match command {
        Command::Popular => write_json(&source.list_popular(client, options)?, output),
        Command::Search { query } => {
            write_json(&source.list_search(client, query, options)?, output)
        }
        Command::Detail { url } => {
            let placeholder = CatalogEntry {
                url: normalize(source.base_url(), url),
                ..CatalogEntry::default()
            };
            write_json(&source.fetch_detail(client, &placeholder)?, output)
        }
        Command::Chapters { url } => {
            let url = normalize(source.base_url(), url);
            write_json(&source.fetch_chapters(client, &url, now)?, output)
        }
        Command::Pages { url } => {
            let url = normalize(source.base_url(), url);
            write_json(&source.fetch_page_urls(client, &url)?, output)
        }
        Command::Image { url } => {
            let url = normalize(source.base_url(), url);
            write_json(&source.fetch_image_url(client, &url)?, output)
        }
    }
}
