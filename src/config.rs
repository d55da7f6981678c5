use std::time::Duration;

use clap::Parser;

use crate::services::{exporter::Source, histogram::Buckets};

/// Largest accepted `--scrape.timeout`, one day.
pub const MAX_SCRAPE_TIMEOUT_SECS: f64 = 86_400.0;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "mastodon-exporter",
    version,
    about = "Prometheus exporter for Mastodon moderation and usage statistics"
)]
pub struct Config {
    /// Postgres connection string for the Mastodon database
    #[arg(long = "mastodon.database-url", env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    /// Address to listen on for the web interface and telemetry
    #[arg(
        long = "web.listen-address",
        env = "MASTODON_EXPORTER_WEB_LISTEN_ADDRESS",
        default_value = "0.0.0.0:9393"
    )]
    pub listen_address: String,

    /// Path under which to expose metrics
    #[arg(
        long = "web.telemetry-path",
        env = "MASTODON_EXPORTER_WEB_TELEMETRY_PATH",
        default_value = "/metrics",
        value_parser = parse_telemetry_path
    )]
    pub telemetry_path: String,

    /// Metric families queried on every scrape
    #[arg(
        long = "collectors",
        env = "MASTODON_EXPORTER_COLLECTORS",
        value_enum,
        value_delimiter = ',',
        default_value = "reports,resolution,accounts,posts"
    )]
    pub collectors: Vec<Source>,

    /// Upper bounds in seconds of the report resolution time histogram
    #[arg(
        long = "resolution.buckets",
        env = "MASTODON_EXPORTER_RESOLUTION_BUCKETS",
        default_value = "60,600,1800,3600,14400,28800,86400,172800,604800"
    )]
    pub resolution_buckets: Buckets,

    /// Upper bound in seconds for a whole scrape
    #[arg(long = "scrape.timeout", env = "MASTODON_EXPORTER_SCRAPE_TIMEOUT")]
    pub scrape_timeout: Option<f64>,

    /// Seconds subtracted from the timeout announced by Prometheus
    #[arg(
        long = "scrape.timeout-offset",
        env = "MASTODON_EXPORTER_SCRAPE_TIMEOUT_OFFSET",
        default_value_t = 0.5
    )]
    pub scrape_timeout_offset: f64,

    #[arg(
        long = "db.max-connections",
        env = "MASTODON_EXPORTER_DB_MAX_CONNECTIONS",
        default_value_t = 5
    )]
    pub db_max_connections: u32,

    /// Log filter used when RUST_LOG is not set
    #[arg(long = "log.level", env = "MASTODON_EXPORTER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(timeout) = self.scrape_timeout {
            if !timeout.is_finite() || timeout <= 0.0 || timeout > MAX_SCRAPE_TIMEOUT_SECS {
                anyhow::bail!(
                    "--scrape.timeout must be between 0 and {MAX_SCRAPE_TIMEOUT_SECS} seconds, got {timeout}"
                );
            }
        }
        if !self.scrape_timeout_offset.is_finite() || self.scrape_timeout_offset < 0.0 {
            anyhow::bail!(
                "--scrape.timeout-offset must not be negative, got {}",
                self.scrape_timeout_offset
            );
        }
        if self.db_max_connections == 0 {
            anyhow::bail!("--db.max-connections must be at least 1");
        }
        if self.collectors.is_empty() {
            anyhow::bail!("--collectors must name at least one collector");
        }
        Ok(())
    }

    /// Time a scrape may take, from the `X-Prometheus-Scrape-Timeout-Seconds`
    /// header (minus the offset) capped by `--scrape.timeout`. A value too
    /// large for a `Duration` means no deadline.
    pub fn scrape_budget(&self, requested: Option<f64>) -> Option<Duration> {
        let requested = requested
            .filter(|t| t.is_finite() && *t > 0.0)
            .map(|t| t - self.scrape_timeout_offset);
        let seconds = match (requested, self.scrape_timeout) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }?;
        Duration::try_from_secs_f64(seconds.max(0.0)).ok()
    }
}

fn parse_telemetry_path(path: &str) -> Result<String, String> {
    if !path.starts_with('/') {
        return Err(format!("telemetry path {path:?} must start with '/'"));
    }
    if path == "/" || path == "/health" {
        return Err(format!("telemetry path {path:?} is already served by the exporter"));
    }
    Ok(path.to_string())
}
