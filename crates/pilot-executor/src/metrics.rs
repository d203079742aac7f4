use prometheus::core::Collector;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::time::Duration;

/// Run metrics collector
///
/// Each executor owns its registry, so several executors (or tests) never
/// collide on metric names.
#[derive(Clone)]
pub struct ExecutionMetrics {
    runs_started: IntCounter,
    runs_succeeded: IntCounter,
    runs_failed: IntCounter,
    /// Incremented on start, decremented once the final record is written
    active_runs: IntGauge,
    run_duration: Histogram,
    registry: Registry,
}

/// Point-in-time counter values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub active: i64,
}

impl ExecutionMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let duration_opts = HistogramOpts::new(
            "agentpilot_run_duration_seconds",
            "Wall-clock time from run start to its final record",
        )
        .buckets(prometheus::exponential_buckets(0.005, 4.0, 9)?);

        Ok(Self {
            runs_started: register(
                &registry,
                IntCounter::new("agentpilot_runs_started_total", "Agent runs started")?,
            )?,
            active_runs: register(
                &registry,
                IntGauge::new("agentpilot_active_runs", "Agent runs in flight")?,
            )?,
            runs_succeeded: register(
                &registry,
                IntCounter::new("agentpilot_runs_succeeded_total", "Runs recorded as success")?,
            )?,
            runs_failed: register(
                &registry,
                IntCounter::new("agentpilot_runs_failed_total", "Runs recorded as error")?,
            )?,
            run_duration: register(&registry, Histogram::with_opts(duration_opts)?)?,
            registry,
        })
    }

    pub fn run_started(&self) {
        self.runs_started.inc();
        self.active_runs.inc();
    }

    pub fn run_succeeded(&self, elapsed: Duration) {
        self.runs_succeeded.inc();
        self.run_duration.observe(elapsed.as_secs_f64());
        self.active_runs.dec();
    }

    pub fn run_failed(&self, elapsed: Duration) {
        self.runs_failed.inc();
        self.run_duration.observe(elapsed.as_secs_f64());
        self.active_runs.dec();
    }

    /// Registry for scraping
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Metrics in the Prometheus text exposition format
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            started: self.runs_started.get(),
            succeeded: self.runs_succeeded.get(),
            failed: self.runs_failed.get(),
            active: self.active_runs.get(),
        }
    }
}

fn register<C>(registry: &Registry, collector: C) -> Result<C, prometheus::Error>
where
    C: Collector + Clone + 'static,
{
    registry.register(Box::new(collector.clone()))?;
    Ok(collector)
}
