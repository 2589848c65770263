//! Logging setup
//!
//! Human-readable or JSON logs go to stderr (stdout carries only command
//! output), optionally mirrored to an append-only log file. `RUST_LOG`
//! takes precedence over `--log-level`.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use clap::ValueEnum;
use regex::{Captures, Regex};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Log verbosity accepted by `--log-level`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "UPPER")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Equivalent `EnvFilter` directive
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Where and how to log
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub level: LogLevel,
    pub file: Option<PathBuf>,
    pub console: bool,
    pub json: bool,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global tracing subscriber
///
/// # Errors
///
/// Fails if the log file cannot be opened or a subscriber is already set.
///
/// # Examples
///
/// ```no_run
/// use sheets_reader::logging::{init_logging, LogLevel, LogOptions};
///
/// let options = LogOptions {
///     level: LogLevel::Debug,
///     console: true,
///     ..Default::default()
/// };
/// init_logging(&options).unwrap();
/// ```
pub fn init_logging(options: &LogOptions) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(options.level.as_directive()))?;

    let mut layers: Vec<BoxedLayer> = Vec::new();

    if options.console {
        let layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
        if options.json {
            layers.push(layer.json().with_current_span(true).boxed());
        } else {
            layers.push(layer.boxed());
        }
    }

    if let Some(path) = &options.file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;

        let layer = fmt::layer()
            .with_writer(Arc::new(file))
            .with_ansi(false)
            .with_target(true);
        if options.json {
            layers.push(layer.json().with_current_span(true).boxed());
        } else {
            layers.push(layer.boxed());
        }
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()?;

    Ok(())
}

fn sensitive_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (
                r#"(?i)"[^"]*(?:key|token|secret|credential)[^"]*"\s*:\s*"[^"]*""#,
                r#""***REDACTED***""#,
            ),
            (r"ya29\.[a-zA-Z0-9_-]+", "***TOKEN***"),
            (
                r"(?i)https://[^/\s]*google[^/\s]*/\S*[?&](?:key|token|access_token)=[^&\s]*",
                "https://***REDACTED***/",
            ),
            (
                r"(?i)/[^/\s]*(?:key|credential|secret)[^/\s]*\.json",
                "/***CREDENTIALS***.json",
            ),
            (
                r"(?i)[a-zA-Z0-9_-]+@[a-zA-Z0-9_-]+\.iam\.gserviceaccount\.com",
                "***SERVICE_ACCOUNT***@***.iam.gserviceaccount.com",
            ),
        ]
        .into_iter()
        .filter_map(|(pattern, replacement)| {
            Regex::new(pattern).ok().map(|re| (re, replacement))
        })
        .collect()
    })
}

fn document_id_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\b[a-zA-Z0-9_-]{30,}\b").ok())
        .as_ref()
}

/// Long opaque tokens, but not SCREAMING_SNAKE_CASE identifiers
fn mask_document_ids(message: &str) -> String {
    match document_id_pattern() {
        Some(re) => re
            .replace_all(message, |caps: &Captures| {
                let found = &caps[0];
                if found.chars().all(|c| c.is_ascii_uppercase() || c == '_') {
                    found.to_string()
                } else {
                    "***SHEET_ID***".to_string()
                }
            })
            .into_owned(),
        None => message.to_string(),
    }
}

/// Redact credentials, tokens and document ids from a message
///
/// # Examples
///
/// ```
/// use sheets_reader::logging::mask_sensitive;
///
/// let masked = mask_sensitive("token ya29.a0AfH6SMBx expired");
/// assert_eq!(masked, "token ***TOKEN*** expired");
/// ```
pub fn mask_sensitive(message: &str) -> String {
    let masked = sensitive_patterns()
        .iter()
        .fold(message.to_string(), |acc, (re, replacement)| {
            re.replace_all(&acc, *replacement).into_owned()
        });
    mask_document_ids(&masked)
}
