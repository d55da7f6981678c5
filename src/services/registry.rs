use std::collections::HashSet;

use futures_util::future::BoxFuture;
use prometheus::core::Desc;
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Gauge, Opts, TextEncoder};
use tokio::time::Instant;

use crate::{
    error::RegistryError,
    services::families::{NAMESPACE, SUBSYSTEM},
};

/// A pull-model metric source.
///
/// `describe` is called once at registration; `collect` runs on every scrape
/// and must always return, reporting its own failures as samples.
pub trait Collector: Send + Sync {
    fn describe(&self) -> Vec<&Desc>;

    fn collect(&self, deadline: Option<Instant>) -> BoxFuture<'_, Vec<MetricFamily>>;
}

/// Every metric source served by the exporter. Built once in `main` and
/// handed to the HTTP layer.
pub struct MetricsRegistry {
    static_metrics: prometheus::Registry,
    collectors: Vec<Box<dyn Collector>>,
    names: HashSet<String>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            static_metrics: prometheus::Registry::new(),
            collectors: Vec::new(),
            names: HashSet::new(),
        }
    }

    fn claim_names<'a>(&mut self, descs: impl IntoIterator<Item = &'a Desc>) -> Result<(), RegistryError> {
        let names: Vec<String> = descs.into_iter().map(|d| d.fq_name.clone()).collect();
        if let Some(dup) = names.iter().find(|n| self.names.contains(*n)) {
            return Err(RegistryError::Duplicate(dup.clone()));
        }
        self.names.extend(names);
        Ok(())
    }

    /// Register a synchronous collector whose values do not depend on the store.
    pub fn register_static(
        &mut self,
        collector: Box<dyn prometheus::core::Collector>,
    ) -> Result<(), RegistryError> {
        self.claim_names(collector.desc())?;
        self.static_metrics.register(collector)?;
        Ok(())
    }

    pub fn register(&mut self, collector: Box<dyn Collector>) -> Result<(), RegistryError> {
        self.claim_names(collector.describe())?;
        self.collectors.push(collector);
        Ok(())
    }

    /// Fresh snapshot of every registered family, sorted by name.
    pub async fn gather(&self, deadline: Option<Instant>) -> Vec<MetricFamily> {
        let mut families = self.static_metrics.gather();
        for collector in &self.collectors {
            families.extend(collector.collect(deadline).await);
        }
        families.sort_by(|a, b| a.get_name().cmp(b.get_name()));
        families
    }

    /// Render a snapshot in the text exposition format.
    pub async fn encode(&self, deadline: Option<Instant>) -> prometheus::Result<String> {
        let families = self.gather(deadline).await;
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// `mastodon_exporter_build_info{version="..."} 1`
pub fn build_info() -> prometheus::Result<Gauge> {
    let opts = Opts::new(
        "build_info",
        "A metric with a constant '1' value labeled by the version of the exporter.",
    )
    .namespace(NAMESPACE)
    .subsystem(SUBSYSTEM)
    .const_label("version", env!("CARGO_PKG_VERSION"));
    let gauge = Gauge::with_opts(opts)?;
    gauge.set(1.0);
    Ok(gauge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::families::{error_count_sample, Family};
    use prometheus::proto::MetricType;

    struct Constant(Family);

    impl Collector for Constant {
        fn describe(&self) -> Vec<&Desc> {
            vec![self.0.desc()]
        }

        fn collect(&self, _deadline: Option<Instant>) -> BoxFuture<'_, Vec<MetricFamily>> {
            Box::pin(async move { vec![error_count_sample(&self.0, 0)] })
        }
    }

    fn constant(name: &str) -> Box<dyn Collector> {
        Box::new(Constant(
            Family::new(name, "test", MetricType::GAUGE, &[]).unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_gather_is_sorted() {
        let mut registry = MetricsRegistry::new();
        registry.register(constant("zeta")).unwrap();
        registry.register(constant("alpha")).unwrap();
        registry.register_static(Box::new(build_info().unwrap())).unwrap();

        let names: Vec<String> = registry
            .gather(None)
            .await
            .iter()
            .map(|mf| mf.get_name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "mastodon_exporter_alpha",
                "mastodon_exporter_build_info",
                "mastodon_exporter_zeta",
            ]
        );
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut registry = MetricsRegistry::new();
        registry.register(constant("errors")).unwrap();

        let err = registry.register(constant("errors")).unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate(name) if name == "mastodon_exporter_errors"));
    }

    #[tokio::test]
    async fn test_encode_build_info() {
        let mut registry = MetricsRegistry::new();
        registry.register_static(Box::new(build_info().unwrap())).unwrap();

        let text = registry.encode(None).await.unwrap();
        let expected = format!(
            "mastodon_exporter_build_info{{version=\"{}\"}} 1",
            env!("CARGO_PKG_VERSION")
        );
        assert!(text.contains(&expected), "{text}");
        assert!(text.contains("# TYPE mastodon_exporter_build_info gauge"));
    }
}
