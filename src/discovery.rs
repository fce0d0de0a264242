use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, error, warn};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::lookup_builder::LookupBuilder;
use crate::metrics::Metrics;
use crate::topic_map::TopicMap;

/// Periodically rebuilds a [`TopicMap`] from a [`LookupBuilder`], starting
/// immediately and then on every tick of `rebuild_interval`, until cancelled.
pub struct DiscoverySynchronizer {
    builder: LookupBuilder,
    topic_map: Arc<TopicMap>,
    metrics: Arc<Metrics>,
    rebuild_interval: Duration,
    fatal_on_sync_error: bool,
    print_sync: bool,
}

impl DiscoverySynchronizer {
    pub fn new(
        builder: LookupBuilder,
        topic_map: Arc<TopicMap>,
        metrics: Arc<Metrics>,
        rebuild_interval: Duration,
        fatal_on_sync_error: bool,
        print_sync: bool,
    ) -> Self {
        Self {
            builder,
            topic_map,
            metrics,
            rebuild_interval,
            fatal_on_sync_error,
            print_sync,
        }
    }

    pub async fn run(self, cancellation: CancellationToken) {
        let mut ticker = time::interval(self.rebuild_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    debug!("discovery synchronizer stopping");
                    return;
                }
                _ = ticker.tick() => {
                    self.sync_once().await;
                }
            }
        }
    }

    async fn sync_once(&self) {
        match self.builder.build().await {
            Ok(table) => {
                let topic_count = table.len();
                self.topic_map.sync(table);
                self.metrics.record_sync_success(unix_millis_now());
                if self.print_sync {
                    debug!("connector-sdk rebuilt routing table: {topic_count} topics");
                }
            }
            Err(e) => {
                self.metrics.record_sync_failure();
                if self.fatal_on_sync_error {
                    error!("fatal: failed to rebuild routing table: {e}");
                    std::process::exit(1);
                } else {
                    warn!("failed to rebuild routing table, will retry: {e}");
                }
            }
        }
    }
}

fn unix_millis_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::gateway_client::GatewayClient;
    use crate::types::FunctionRecord;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    struct CountingGateway {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl GatewayClient for CountingGateway {
        async fn namespaces(&self) -> Result<Vec<String>, GatewayError> {
            Ok(vec![])
        }

        async fn functions(&self, _namespace: &str) -> Result<Vec<FunctionRecord>, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![FunctionRecord {
                name: "echo".to_string(),
                namespace: None,
                annotations: Some(HashMap::from([("topic".to_string(), "topic1".to_string())])),
            }])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rebuilds_immediately_and_then_on_each_tick() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gateway = CountingGateway {
            calls: calls.clone(),
        };
        let topic_map = Arc::new(TopicMap::new());
        let metrics = Arc::new(Metrics::new());
        let builder = LookupBuilder::new(Box::new(gateway), ",");

        let synchronizer = DiscoverySynchronizer::new(
            builder,
            topic_map.clone(),
            metrics,
            Duration::from_secs(10),
            false,
            false,
        );

        let cancellation = CancellationToken::new();
        let run_cancellation = cancellation.clone();
        let handle = tokio::spawn(async move { synchronizer.run(run_cancellation).await });

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(topic_map.match_topic("topic1"), vec!["echo".to_string()]);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        cancellation.cancel();
        handle.await.unwrap();
    }

    #[derive(Clone)]
    struct FailingGateway;

    #[async_trait]
    impl GatewayClient for FailingGateway {
        async fn namespaces(&self) -> Result<Vec<String>, GatewayError> {
            Err(GatewayError::Unauthorized)
        }

        async fn functions(&self, _namespace: &str) -> Result<Vec<FunctionRecord>, GatewayError> {
            Ok(vec![])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sync_failure_is_recorded_without_aborting_by_default() {
        let topic_map = Arc::new(TopicMap::new());
        let metrics = Arc::new(Metrics::new());
        let builder = LookupBuilder::new(Box::new(FailingGateway), ",");

        let synchronizer = DiscoverySynchronizer::new(
            builder,
            topic_map,
            metrics.clone(),
            Duration::from_secs(10),
            false,
            false,
        );

        let cancellation = CancellationToken::new();
        let run_cancellation = cancellation.clone();
        let handle = tokio::spawn(async move { synchronizer.run(run_cancellation).await });

        tokio::time::advance(Duration::from_millis(1)).await;
        cancellation.cancel();
        handle.await.unwrap();

        assert_eq!(metrics.snapshot().sync_failure_count, 1);
    }
}
