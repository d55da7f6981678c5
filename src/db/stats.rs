use futures_util::future::BoxFuture;
use sqlx::{PgPool, Row};

use crate::{
    error::StoreError,
    models::stats::{AccountCounts, ReportCounts},
};

/// Read-only aggregate queries against the Mastodon database.
///
/// Implementations must be stateless reads: the exporter may call them from
/// overlapping scrapes against one shared pool.
pub trait MastodonStore: Send + Sync {
    fn report_counts(&self) -> BoxFuture<'_, Result<ReportCounts, StoreError>>;

    /// Seconds between creation and resolution, one entry per resolved report.
    /// A single undecodable row fails the whole query.
    fn resolution_durations(&self) -> BoxFuture<'_, Result<Vec<f64>, StoreError>>;

    fn account_counts(&self) -> BoxFuture<'_, Result<AccountCounts, StoreError>>;

    fn post_count(&self) -> BoxFuture<'_, Result<i64, StoreError>>;
}

/// Folds decoded rows into durations; the first undecodable row fails them all.
pub(crate) fn collect_durations<I>(decoded: I) -> Result<Vec<f64>, StoreError>
where
    I: IntoIterator<Item = Result<f64, sqlx::Error>>,
{
    decoded
        .into_iter()
        .enumerate()
        .map(|(row, value)| value.map_err(|source| StoreError::RowScan { row, source }))
        .collect()
}

impl MastodonStore for PgPool {
    fn report_counts(&self) -> BoxFuture<'_, Result<ReportCounts, StoreError>> {
        Box::pin(async move {
            sqlx::query_as::<_, ReportCounts>(
                "SELECT
                   COUNT(*) FILTER (WHERE action_taken_at IS NOT NULL)::BIGINT AS resolved,
                   COUNT(*) FILTER (WHERE action_taken_at IS NULL)::BIGINT AS unresolved
                 FROM reports",
            )
            .fetch_one(self)
            .await
            .map_err(StoreError::Query)
        })
    }

    fn resolution_durations(&self) -> BoxFuture<'_, Result<Vec<f64>, StoreError>> {
        Box::pin(async move {
            // EXTRACT returns NUMERIC on recent Postgres versions
            let rows = sqlx::query(
                "SELECT EXTRACT(EPOCH FROM (action_taken_at - created_at))::FLOAT8 AS time_to_resolution
                 FROM reports
                 WHERE action_taken_at IS NOT NULL",
            )
            .fetch_all(self)
            .await
            .map_err(StoreError::Query)?;

            collect_durations(rows.iter().map(|r| r.try_get::<f64, _>("time_to_resolution")))
        })
    }

    fn account_counts(&self) -> BoxFuture<'_, Result<AccountCounts, StoreError>> {
        Box::pin(async move {
            sqlx::query_as::<_, AccountCounts>(
                "WITH unsuspended AS (
                   SELECT actor_type FROM accounts
                   WHERE domain IS NULL AND suspended_at IS NULL
                 ),
                 unsuspended_stats AS (
                   SELECT COUNT(*)::BIGINT AS unsuspended,
                          COUNT(*) FILTER (WHERE actor_type IN ('Application', 'Service'))::BIGINT AS bots,
                          COUNT(*) FILTER (WHERE actor_type = 'Group')::BIGINT AS groups,
                          COUNT(*) FILTER (WHERE actor_type = 'Person' OR actor_type IS NULL)::BIGINT AS people
                   FROM unsuspended
                 ),
                 suspended AS (
                   SELECT COUNT(*)::BIGINT AS suspended
                   FROM accounts
                   WHERE domain IS NULL AND suspended_at IS NOT NULL
                 )
                 SELECT a.unsuspended, a.bots, a.groups, a.people, b.suspended
                 FROM unsuspended_stats AS a, suspended AS b",
            )
            .fetch_one(self)
            .await
            .map_err(StoreError::Query)
        })
    }

    fn post_count(&self) -> BoxFuture<'_, Result<i64, StoreError>> {
        Box::pin(async move {
            sqlx::query_scalar::<_, i64>(
                "SELECT COALESCE(SUM(s.statuses_count), 0)::BIGINT
                 FROM accounts AS a
                 JOIN account_stats AS s ON a.id = s.account_id
                 WHERE a.domain IS NULL",
            )
            .fetch_one(self)
            .await
            .map_err(StoreError::Query)
        })
    }
}
