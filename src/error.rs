use thiserror::Error;

/// Failures talking to the Mastodon database.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Only raised at startup; a scrape never reconnects.
    #[error("unable to connect to database: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("querying database: {0}")]
    Query(#[source] sqlx::Error),

    #[error("scanning row {row}: {source}")]
    RowScan {
        row: usize,
        #[source]
        source: sqlx::Error,
    },
}

/// Why a single metric family is missing from a scrape.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("scrape deadline exceeded while querying")]
    DeadlineExceeded,

    #[error("not attempted, scrape deadline already passed")]
    Skipped,
}

#[derive(Debug, Error, PartialEq)]
pub enum BucketsError {
    #[error("bucket list is empty")]
    Empty,

    #[error("bucket boundary {0} is not a positive finite number")]
    NotPositive(f64),

    #[error("bucket boundaries must be strictly increasing ({prev} then {next})")]
    NotIncreasing { prev: f64, next: f64 },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("metric {0} is already registered")]
    Duplicate(String),

    #[error(transparent)]
    Prometheus(#[from] prometheus::Error),
}
