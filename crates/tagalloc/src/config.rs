use clap::ValueEnum;
use std::str::FromStr;

pub const FORMAT_ENV: &str = "TAGALLOC_FORMAT";
pub const REPORT_LIMIT_ENV: &str = "TAGALLOC_REPORT_LIMIT";
pub const HTTP_PORT_ENV: &str = "TAGALLOC_HTTP_PORT";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    #[default]
    Table,
    Json,
    JsonPretty,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Ok(Format::Table),
            "json" => Ok(Format::Json),
            "json-pretty" | "json_pretty" => Ok(Format::JsonPretty),
            other => Err(format!(
                "invalid format '{}', expected table, json or json-pretty",
                other
            )),
        }
    }
}

/// How memory reports are rendered and where they are served.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReportConfig {
    pub format: Format,
    /// Show only the N largest owners; 0 shows all.
    pub limit: usize,
    pub http_port: Option<u16>,
}

impl ReportConfig {
    /// Reads `TAGALLOC_FORMAT`, `TAGALLOC_REPORT_LIMIT` and
    /// `TAGALLOC_HTTP_PORT`. Malformed values fall back to defaults with a
    /// warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = ReportConfig::default();

        if let Some(raw) = lookup(FORMAT_ENV) {
            match raw.parse() {
                Ok(format) => config.format = format,
                Err(e) => warn_env(FORMAT_ENV, &e),
            }
        }
        if let Some(raw) = lookup(REPORT_LIMIT_ENV) {
            match raw.trim().parse() {
                Ok(limit) => config.limit = limit,
                Err(e) => warn_env(REPORT_LIMIT_ENV, &e),
            }
        }
        if let Some(raw) = lookup(HTTP_PORT_ENV) {
            match raw.trim().parse() {
                Ok(port) => config.http_port = Some(port),
                Err(e) => warn_env(HTTP_PORT_ENV, &e),
            }
        }

        config
    }
}

fn warn_env(key: &str, err: &dyn std::fmt::Display) {
    eprintln!("[tagalloc] ignoring {}: {}", key, err);
}
