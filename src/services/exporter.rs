use clap::ValueEnum;
use futures_util::future::BoxFuture;
use prometheus::core::Desc;
use prometheus::proto::{MetricFamily, MetricType};
use tokio::time::Instant;
use tracing::{debug, error};

use crate::{
    db::stats::MastodonStore,
    error::{ScrapeError, StoreError},
    services::{
        families::{
            account_count_samples, error_count_sample, post_count_sample, report_count_samples,
            resolution_histogram_sample, Family,
        },
        histogram::{build_histogram, Buckets},
        registry::Collector,
    },
};

/// One independently-failing group of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Source {
    Reports,
    Resolution,
    Accounts,
    Posts,
}

impl Source {
    pub const ALL: [Source; 4] = [
        Source::Reports,
        Source::Resolution,
        Source::Accounts,
        Source::Posts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Reports => "reports",
            Source::Resolution => "resolution",
            Source::Accounts => "accounts",
            Source::Posts => "posts",
        }
    }
}

/// Per-family results of one scrape, in the order they were attempted.
#[derive(Debug)]
pub struct ScrapeOutcome {
    pub results: Vec<(Source, Result<MetricFamily, ScrapeError>)>,
}

impl ScrapeOutcome {
    pub fn error_count(&self) -> u64 {
        self.results.iter().filter(|(_, r)| r.is_err()).count() as u64
    }

    /// Successful families followed by the error gauge, which is always present.
    pub fn into_families(self, errors: &Family) -> Vec<MetricFamily> {
        let error_count = self.error_count();
        let mut families: Vec<MetricFamily> = self
            .results
            .into_iter()
            .filter_map(|(_, result)| result.ok())
            .collect();
        families.push(error_count_sample(errors, error_count));
        families
    }
}

/// Scrape orchestrator: queries each enabled source on demand and turns the
/// answers into samples. Holds no per-scrape state, so overlapping scrapes
/// are independent.
pub struct MastodonExporter<S> {
    store: S,
    sources: Vec<Source>,
    buckets: Buckets,
    num_reports: Family,
    resolved_time_seconds: Family,
    num_accounts: Family,
    num_posts: Family,
    errors: Family,
}

impl<S: MastodonStore> MastodonExporter<S> {
    pub fn new(store: S, sources: &[Source], buckets: Buckets) -> prometheus::Result<Self> {
        let mut enabled: Vec<Source> = Vec::with_capacity(sources.len());
        for source in sources {
            if !enabled.contains(source) {
                enabled.push(*source);
            }
        }

        Ok(Self {
            store,
            sources: enabled,
            buckets,
            num_reports: Family::new(
                "num_reports",
                "Number of reports for this Mastodon instance.",
                MetricType::GAUGE,
                &["resolved"],
            )?,
            resolved_time_seconds: Family::new(
                "resolved_time_seconds",
                "Time taken to resolve reports in this Mastodon instance.",
                MetricType::HISTOGRAM,
                &[],
            )?,
            num_accounts: Family::new(
                "num_accounts",
                "Number of accounts on this Mastodon instance.",
                MetricType::GAUGE,
                &["type"],
            )?,
            num_posts: Family::new(
                "num_posts",
                "Number of posts on this Mastodon instance.",
                MetricType::GAUGE,
                &[],
            )?,
            errors: Family::new(
                "errors",
                "Number of errors encountered while querying.",
                MetricType::GAUGE,
                &[],
            )?,
        })
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    fn family(&self, source: Source) -> &Family {
        match source {
            Source::Reports => &self.num_reports,
            Source::Resolution => &self.resolved_time_seconds,
            Source::Accounts => &self.num_accounts,
            Source::Posts => &self.num_posts,
        }
    }

    async fn query(&self, source: Source) -> Result<MetricFamily, StoreError> {
        let family = self.family(source);
        let mf = match source {
            Source::Reports => report_count_samples(family, self.store.report_counts().await?),
            Source::Resolution => {
                let durations = self.store.resolution_durations().await?;
                resolution_histogram_sample(family, &build_histogram(&self.buckets, &durations))
            }
            Source::Accounts => account_count_samples(family, self.store.account_counts().await?),
            Source::Posts => post_count_sample(family, self.store.post_count().await?),
        };
        Ok(mf)
    }

    /// Attempt every enabled source once, in order.
    ///
    /// A failure is logged and recorded, never retried and never stops the
    /// remaining sources. Once `deadline` passes, the source in flight fails
    /// with [`ScrapeError::DeadlineExceeded`] and the rest are recorded as
    /// [`ScrapeError::Skipped`] without touching the store.
    pub async fn scrape(&self, deadline: Option<Instant>) -> ScrapeOutcome {
        let mut results = Vec::with_capacity(self.sources.len());

        for &source in &self.sources {
            debug!(family = source.as_str(), "Fetching metrics");
            let result = match deadline {
                Some(deadline) if Instant::now() >= deadline => Err(ScrapeError::Skipped),
                Some(deadline) => match tokio::time::timeout_at(deadline, self.query(source)).await {
                    Ok(result) => result.map_err(ScrapeError::from),
                    Err(_) => Err(ScrapeError::DeadlineExceeded),
                },
                None => self.query(source).await.map_err(ScrapeError::from),
            };

            if let Err(e) = &result {
                error!(family = source.as_str(), error = %e, "Error querying metrics");
            }
            results.push((source, result));
        }

        ScrapeOutcome { results }
    }
}

impl<S: MastodonStore> Collector for MastodonExporter<S> {
    fn describe(&self) -> Vec<&Desc> {
        self.sources
            .iter()
            .map(|s| self.family(*s).desc())
            .chain(std::iter::once(self.errors.desc()))
            .collect()
    }

    fn collect(&self, deadline: Option<Instant>) -> BoxFuture<'_, Vec<MetricFamily>> {
        Box::pin(async move {
            let outcome = self.scrape(deadline).await;
            debug!(errors = outcome.error_count(), "Scrape finished");
            outcome.into_families(&self.errors)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::db::stats::fake::FakeStore;
    use crate::services::families::tests::gauge_values;

    const REPORTS_ONLY: [Source; 2] = [Source::Reports, Source::Resolution];

    fn exporter(store: FakeStore, sources: &[Source]) -> MastodonExporter<FakeStore> {
        MastodonExporter::new(store, sources, Buckets::default()).unwrap()
    }

    fn find<'a>(families: &'a [MetricFamily], name: &str) -> Option<&'a MetricFamily> {
        families.iter().find(|mf| mf.get_name() == name)
    }

    fn error_gauge(families: &[MetricFamily]) -> f64 {
        let mf = find(families, "mastodon_exporter_errors").expect("error gauge always emitted");
        gauge_values(mf)[""]
    }

    fn names(families: &[MetricFamily]) -> Vec<&str> {
        families.iter().map(|mf| mf.get_name()).collect()
    }

    #[tokio::test]
    async fn test_all_families_succeed() {
        let exporter = exporter(FakeStore::healthy(), &Source::ALL);
        let families = exporter.collect(None).await;

        assert_eq!(
            names(&families),
            vec![
                "mastodon_exporter_num_reports",
                "mastodon_exporter_resolved_time_seconds",
                "mastodon_exporter_num_accounts",
                "mastodon_exporter_num_posts",
                "mastodon_exporter_errors",
            ]
        );
        assert_eq!(error_gauge(&families), 0.0);

        let reports = gauge_values(find(&families, "mastodon_exporter_num_reports").unwrap());
        assert_eq!(reports["true"], 3.0);
        assert_eq!(reports["false"], 0.0);

        let hist = find(&families, "mastodon_exporter_resolved_time_seconds")
            .unwrap()
            .get_metric()[0]
            .get_histogram();
        assert_eq!(hist.get_sample_count(), 3);
        assert_eq!(hist.get_sample_sum(), 4245.0);
        assert_eq!(hist.get_bucket()[0].get_cumulative_count(), 1);
        assert_eq!(hist.get_bucket()[4].get_cumulative_count(), 3);
    }

    #[tokio::test]
    async fn test_report_count_failure_is_isolated() {
        let store = FakeStore {
            reports: None,
            ..FakeStore::healthy()
        };
        let families = exporter(store, &REPORTS_ONLY).collect(None).await;

        assert_eq!(error_gauge(&families), 1.0);
        assert!(find(&families, "mastodon_exporter_num_reports").is_none());
        let hist = find(&families, "mastodon_exporter_resolved_time_seconds").unwrap();
        assert_eq!(hist.get_metric()[0].get_histogram().get_sample_count(), 3);
    }

    #[tokio::test]
    async fn test_duration_failure_is_isolated() {
        let store = FakeStore {
            durations: None,
            ..FakeStore::healthy()
        };
        let families = exporter(store, &REPORTS_ONLY).collect(None).await;

        assert_eq!(error_gauge(&families), 1.0);
        assert!(find(&families, "mastodon_exporter_resolved_time_seconds").is_none());
        let reports = gauge_values(find(&families, "mastodon_exporter_num_reports").unwrap());
        assert_eq!(reports["true"], 3.0);
    }

    #[tokio::test]
    async fn test_bad_row_fails_whole_family() {
        let store = FakeStore {
            bad_row: true,
            ..FakeStore::healthy()
        };
        let exporter = exporter(store, &REPORTS_ONLY);
        let outcome = exporter.scrape(None).await;

        assert_eq!(outcome.error_count(), 1);
        let (source, result) = &outcome.results[1];
        assert_eq!(*source, Source::Resolution);
        assert!(matches!(
            result,
            Err(ScrapeError::Store(StoreError::RowScan { row: 1, .. }))
        ));
    }

    #[tokio::test]
    async fn test_total_failure_emits_only_error_gauge() {
        let store = FakeStore::default();
        let families = exporter(store.clone(), &REPORTS_ONLY).collect(None).await;

        assert_eq!(names(&families), vec!["mastodon_exporter_errors"]);
        assert_eq!(error_gauge(&families), 2.0);
        // No retries within a scrape.
        assert_eq!(store.calls(), 2);

        let families = exporter(FakeStore::default(), &Source::ALL).collect(None).await;
        assert_eq!(names(&families), vec!["mastodon_exporter_errors"]);
        assert_eq!(error_gauge(&families), 4.0);
    }

    #[tokio::test]
    async fn test_empty_durations_still_reported() {
        let store = FakeStore {
            durations: Some(vec![]),
            ..FakeStore::healthy()
        };
        let families = exporter(store, &[Source::Resolution]).collect(None).await;

        assert_eq!(error_gauge(&families), 0.0);
        let hist = find(&families, "mastodon_exporter_resolved_time_seconds")
            .unwrap()
            .get_metric()[0]
            .get_histogram();
        assert_eq!(hist.get_sample_count(), 0);
        assert_eq!(hist.get_sample_sum(), 0.0);
        assert!(hist.get_bucket().iter().all(|b| b.get_cumulative_count() == 0));
    }

    #[tokio::test]
    async fn test_repeated_scrapes_are_identical() {
        let exporter = exporter(FakeStore::healthy(), &Source::ALL);
        let first = exporter.collect(None).await;
        let second = exporter.collect(None).await;
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_remaining_families() {
        let store = FakeStore {
            slow: vec!["resolution"],
            ..FakeStore::healthy()
        };
        let exporter = exporter(store.clone(), &Source::ALL);
        let deadline = Instant::now() + Duration::from_secs(5);
        let outcome = exporter.scrape(Some(deadline)).await;

        let kinds: Vec<&str> = outcome
            .results
            .iter()
            .map(|(_, r)| match r {
                Ok(_) => "ok",
                Err(ScrapeError::DeadlineExceeded) => "deadline",
                Err(ScrapeError::Skipped) => "skipped",
                Err(ScrapeError::Store(_)) => "store",
            })
            .collect();
        assert_eq!(kinds, vec!["ok", "deadline", "skipped", "skipped"]);
        // Skipped families never reach the store.
        assert_eq!(store.calls(), 2);

        let families = outcome.into_families(&exporter.errors);
        assert_eq!(
            names(&families),
            vec!["mastodon_exporter_num_reports", "mastodon_exporter_errors"]
        );
        assert_eq!(error_gauge(&families), 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_deadline_still_emits_error_gauge() {
        let store = FakeStore::healthy();
        let exporter = exporter(store.clone(), &REPORTS_ONLY);
        let families = exporter.collect(Some(Instant::now())).await;

        assert_eq!(names(&families), vec!["mastodon_exporter_errors"]);
        assert_eq!(error_gauge(&families), 2.0);
        assert_eq!(store.calls(), 0);
    }

    #[test]
    fn test_describe_lists_enabled_families() {
        let exporter = exporter(
            FakeStore::healthy(),
            &[Source::Posts, Source::Reports, Source::Posts],
        );
        assert_eq!(exporter.sources(), &[Source::Posts, Source::Reports]);

        let described: Vec<&str> = exporter
            .describe()
            .iter()
            .map(|d| d.fq_name.as_str())
            .collect();
        assert_eq!(
            described,
            vec![
                "mastodon_exporter_num_posts",
                "mastodon_exporter_num_reports",
                "mastodon_exporter_errors",
            ]
        );
    }
}
