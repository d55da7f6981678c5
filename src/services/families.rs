use std::collections::HashMap;

use prometheus::core::Desc;
use prometheus::proto::{Bucket, Gauge, Histogram, LabelPair, Metric, MetricFamily, MetricType};
use prometheus::Opts;

use crate::{
    models::stats::{AccountCounts, ReportCounts},
    services::histogram::HistogramAccumulator,
};

pub const NAMESPACE: &str = "mastodon";
pub const SUBSYSTEM: &str = "exporter";

/// Static identity of one metric family: fully-qualified name, help text,
/// kind and label names. Built once at startup and reused on every scrape.
#[derive(Debug, Clone)]
pub struct Family {
    desc: Desc,
    kind: MetricType,
}

impl Family {
    pub fn new(
        name: &str,
        help: &str,
        kind: MetricType,
        label_names: &[&str],
    ) -> prometheus::Result<Self> {
        let fq_name = Opts::new(name, help)
            .namespace(NAMESPACE)
            .subsystem(SUBSYSTEM)
            .fq_name();
        let desc = Desc::new(
            fq_name,
            help.to_string(),
            label_names.iter().map(|l| l.to_string()).collect(),
            HashMap::new(),
        )?;
        Ok(Self { desc, kind })
    }

    pub fn desc(&self) -> &Desc {
        &self.desc
    }

    pub fn name(&self) -> &str {
        &self.desc.fq_name
    }

    pub fn kind(&self) -> MetricType {
        self.kind
    }

    pub fn label_names(&self) -> &[String] {
        &self.desc.variable_labels
    }

    fn labels(&self, values: &[&str]) -> Vec<LabelPair> {
        debug_assert_eq!(values.len(), self.desc.variable_labels.len());
        self.desc
            .variable_labels
            .iter()
            .zip(values)
            .map(|(name, value)| {
                let mut pair = LabelPair::default();
                pair.set_name(name.clone());
                pair.set_value(value.to_string());
                pair
            })
            .collect()
    }

    fn gauge(&self, value: f64, label_values: &[&str]) -> Metric {
        let mut gauge = Gauge::default();
        gauge.set_value(value);

        let mut metric = Metric::default();
        metric.set_label(self.labels(label_values).into());
        metric.set_gauge(gauge);
        metric
    }

    fn histogram(&self, acc: &HistogramAccumulator, label_values: &[&str]) -> Metric {
        let buckets: Vec<Bucket> = acc
            .buckets()
            .iter()
            .map(|&(upper_bound, cumulative)| {
                let mut bucket = Bucket::default();
                bucket.set_upper_bound(upper_bound);
                bucket.set_cumulative_count(cumulative);
                bucket
            })
            .collect();

        let mut histogram = Histogram::default();
        histogram.set_sample_count(acc.count());
        histogram.set_sample_sum(acc.sum());
        histogram.set_bucket(buckets.into());

        let mut metric = Metric::default();
        metric.set_label(self.labels(label_values).into());
        metric.set_histogram(histogram);
        metric
    }

    fn with_samples(&self, metrics: Vec<Metric>) -> MetricFamily {
        let mut mf = MetricFamily::default();
        mf.set_name(self.desc.fq_name.clone());
        mf.set_help(self.desc.help.clone());
        mf.set_field_type(self.kind);
        mf.set_metric(metrics.into());
        mf
    }
}

// Pure sample builders. None of these can fail; every error is raised by the
// store queries before a builder is reached.

/// Two gauges labelled `resolved="true"` and `resolved="false"`.
pub fn report_count_samples(family: &Family, counts: ReportCounts) -> MetricFamily {
    family.with_samples(vec![
        family.gauge(counts.resolved as f64, &["true"]),
        family.gauge(counts.unresolved as f64, &["false"]),
    ])
}

/// One unlabelled histogram; the `+Inf` bucket is left to the encoder.
pub fn resolution_histogram_sample(family: &Family, acc: &HistogramAccumulator) -> MetricFamily {
    family.with_samples(vec![family.histogram(acc, &[])])
}

pub fn account_count_samples(family: &Family, counts: AccountCounts) -> MetricFamily {
    family.with_samples(
        counts
            .by_type()
            .into_iter()
            .map(|(kind, count)| family.gauge(count as f64, &[kind]))
            .collect(),
    )
}

pub fn post_count_sample(family: &Family, posts: i64) -> MetricFamily {
    family.with_samples(vec![family.gauge(posts as f64, &[])])
}

pub fn error_count_sample(family: &Family, errors: u64) -> MetricFamily {
    family.with_samples(vec![family.gauge(errors as f64, &[])])
}
