// Local crates
use crate::metrics::metrics::{Grouping, Reading};
use crate::orchestrator::Publisher;

// External crates
use prometheus::{Gauge, Opts, Registry, proto::MetricFamily};
use tracing::instrument;

/// Publisher failures. Logged by the orchestrator, never escalated.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// A reading could not become a gauge.
    #[error("invalid metric: {0}")]
    Metric(#[source] prometheus::Error),
    /// The push client refused the push or the gateway answered with an error.
    #[error("push gateway request failed: {0}")]
    Push(#[source] prometheus::Error),
    /// The blocking push task panicked or was cancelled.
    #[error("push task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Turns readings into gauge families using a throwaway registry, keeping the
/// process-global prometheus registry out of the picture.
pub fn gather(readings: &[Reading]) -> Result<Vec<MetricFamily>, PublishError> {
    let registry = Registry::new();
    for reading in readings {
        let gauge = Gauge::with_opts(Opts::new(reading.name.as_str(), reading.help))
            .map_err(PublishError::Metric)?;
        gauge.set(reading.value);
        registry
            .register(Box::new(gauge))
            .map_err(PublishError::Metric)?;
    }
    Ok(registry.gather())
}

/// Pushes readings to a Prometheus push gateway with "add" semantics: metrics
/// with the same name in the same group are replaced, others are kept.
#[derive(Debug, Clone)]
pub struct PushgatewayPublisher {
    url: String,
}

impl PushgatewayPublisher {
    /// Publisher pushing to the gateway at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Gateway address.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Publisher for PushgatewayPublisher {
    #[instrument(
        name = "rsync_prom_publisher::push",
        target = "metrics::push",
        skip_all,
        fields(job = %grouping.job, instance = %grouping.instance),
        level = "debug"
    )]
    async fn publish(&self, grouping: &Grouping, readings: &[Reading]) -> Result<(), PublishError> {
        let families = gather(readings)?;
        let url = self.url.clone();
        let job = grouping.job.clone();
        let labels = grouping.labels();

        tracing::debug!(
            pushgateway = %url,
            families = families.len(),
            "Pushing metric families to push gateway"
        );
        // the push client is blocking
        tokio::task::spawn_blocking(move || {
            prometheus::push_add_metrics(&job, labels, &url, families, None)
        })
        .await?
        .map_err(PublishError::Push)
    }
}

/// Logs readings instead of pushing them. Used for dry runs and when no
/// gateway is wanted.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

impl Publisher for LogPublisher {
    async fn publish(&self, grouping: &Grouping, readings: &[Reading]) -> Result<(), PublishError> {
        // validate names the same way a real push would
        gather(readings)?;
        for reading in readings {
            tracing::info!(
                job = %grouping.job,
                instance = %grouping.instance,
                metric = %reading.name,
                value = reading.value,
                "Metric reading"
            );
        }
        Ok(())
    }
}
