use anyhow::Result;
use hyper::{
    header::CONTENT_TYPE,
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::net::SocketAddr;
use tracing::{info, warn};

/// Counters describing the collector's cycles.
#[derive(Clone)]
pub struct CollectorMetrics {
    pub cycles: IntCounter,
    pub fetch_failures: IntCounter,
    pub snapshots_persisted: IntCounter,
    pub entity_failures: IntCounter,
    pub entities_finished: IntCounter,
    pub tracked_entities: IntGauge,
}

impl CollectorMetrics {
    fn register(registry: &Registry) -> Result<Self> {
        let metrics = Self {
            cycles: IntCounter::new("collector_cycles_total", "Polling cycles started")?,
            fetch_failures: IntCounter::new(
                "collector_fetch_failures_total",
                "Cycles aborted because the feed could not be fetched",
            )?,
            snapshots_persisted: IntCounter::new(
                "collector_snapshots_persisted_total",
                "Snapshots written or rewritten",
            )?,
            entity_failures: IntCounter::new(
                "collector_entity_failures_total",
                "Per-match processing errors",
            )?,
            entities_finished: IntCounter::new(
                "collector_entities_finished_total",
                "Matches that left the feed",
            )?,
            tracked_entities: IntGauge::new(
                "collector_tracked_entities",
                "Matches currently held in memory",
            )?,
        };
        registry.register(Box::new(metrics.cycles.clone()))?;
        registry.register(Box::new(metrics.fetch_failures.clone()))?;
        registry.register(Box::new(metrics.snapshots_persisted.clone()))?;
        registry.register(Box::new(metrics.entity_failures.clone()))?;
        registry.register(Box::new(metrics.entities_finished.clone()))?;
        registry.register(Box::new(metrics.tracked_entities.clone()))?;
        Ok(metrics)
    }
}

#[derive(Clone)]
pub struct MetricsHandle {
    registry: Registry,
    collector: CollectorMetrics,
}

impl MetricsHandle {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = CollectorMetrics::register(&registry)?;
        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn collector(&self) -> &CollectorMetrics {
        &self.collector
    }

    /// Current registry contents in the Prometheus text format.
    pub fn render(&self) -> Result<(String, Vec<u8>)> {
        encode(&self.registry)
    }

    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let registry = self.registry.clone();
        let make_svc = make_service_fn(move |_| {
            let registry = registry.clone();
            async move {
                Ok::<_, hyper::Error>(service_fn(move |_req: Request<Body>| {
                    let registry = registry.clone();
                    async move { Ok::<_, hyper::Error>(scrape(&registry)) }
                }))
            }
        });

        let server = Server::bind(&addr).serve(make_svc);
        info!(%addr, "metrics exporter listening");
        server.await?;
        Ok(())
    }
}

fn encode(registry: &Registry) -> Result<(String, Vec<u8>)> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}

fn scrape(registry: &Registry) -> Response<Body> {
    match encode(registry) {
        Ok((content_type, buffer)) => {
            let mut response = Response::new(Body::from(buffer));
            if let Ok(value) = content_type.parse() {
                response.headers_mut().insert(CONTENT_TYPE, value);
            }
            response
        }
        Err(err) => {
            warn!(error = ?err, "failed to encode metrics");
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_collector_series() {
        let handle = MetricsHandle::new().expect("metrics should register");
        handle.collector().cycles.inc();
        handle.collector().snapshots_persisted.inc_by(3);
        handle.collector().tracked_entities.set(2);

        let (content_type, body) = handle.render().expect("render");
        let text = String::from_utf8(body).expect("utf8");
        assert!(content_type.starts_with("text/plain"));
        assert!(text.contains("collector_cycles_total 1"));
        assert!(text.contains("collector_snapshots_persisted_total 3"));
        assert!(text.contains("collector_tracked_entities 2"));
    }

    #[test]
    fn handles_have_independent_registries() {
        let a = MetricsHandle::new().unwrap();
        let b = MetricsHandle::new().unwrap();
        a.collector().cycles.inc();
        assert_eq!(b.collector().cycles.get(), 0);
    }

    #[tokio::test]
    async fn scrape_sets_content_type() {
        let handle = MetricsHandle::new().unwrap();
        handle.collector().fetch_failures.inc();
        let response = scrape(handle.registry());
        assert_eq!(response.status(), StatusCode::OK);
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("collector_fetch_failures_total 1"));
    }
}
