use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::ControllerConfig;
use crate::discovery::DiscoverySynchronizer;
use crate::gateway_client::GatewayClient;
use crate::invoker::Invoker;
use crate::lookup_builder::LookupBuilder;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::observer::{Observer, ResponsePrinter};
use crate::topic_map::TopicMap;
use crate::types::{Headers, InvocationContext, InvocationResponse};

/// The response stream's capacity. Tokio has no true zero-capacity channel; a
/// capacity of one gives the same practical effect the spec calls for: `invoke`
/// blocks once a response is in flight and no fan-out task has drained it yet.
const RESPONSE_CHANNEL_CAPACITY: usize = 1;

/// Owns the invoker, the routing table, and the response stream, and wires them
/// together. One `Controller` is meant to live for the lifetime of a process.
pub struct Controller {
    invoker: Box<dyn Invoker>,
    topic_map: Arc<TopicMap>,
    gateway: Box<dyn GatewayClient>,
    topic_annotation_delimiter: String,
    rebuild_interval: Duration,
    fatal_on_sync_error: bool,
    print_sync: bool,
    observers: Arc<RwLock<Vec<Box<dyn Observer>>>>,
    metrics: Arc<Metrics>,
    response_tx: mpsc::Sender<InvocationResponse>,
    discovery_cancellation: CancellationToken,
}

impl Controller {
    pub fn new(
        gateway: Box<dyn GatewayClient>,
        invoker: Box<dyn Invoker>,
        config: &ControllerConfig,
    ) -> Self {
        let (response_tx, response_rx) = mpsc::channel(RESPONSE_CHANNEL_CAPACITY);
        let observers: Arc<RwLock<Vec<Box<dyn Observer>>>> = Arc::new(RwLock::new(Vec::new()));
        let metrics = Arc::new(Metrics::new());

        if config.print_response {
            observers.write().unwrap().push(Box::new(ResponsePrinter {
                print_body: config.print_response_body,
            }));
        }

        spawn_fan_out(response_rx, observers.clone(), metrics.clone());

        Self {
            invoker,
            topic_map: Arc::new(TopicMap::new()),
            gateway,
            topic_annotation_delimiter: config.topic_annotation_delimiter.clone(),
            rebuild_interval: *config.rebuild_interval,
            fatal_on_sync_error: config.fatal_on_sync_error,
            print_sync: config.print_sync,
            observers,
            metrics,
            response_tx,
            discovery_cancellation: CancellationToken::new(),
        }
    }

    /// Registers an additional observer. Observers registered before or after
    /// `begin_map_builder`/`invoke` calls all receive every response from that
    /// point forward.
    pub fn subscribe(&self, observer: Box<dyn Observer>) {
        self.observers.write().unwrap().push(observer);
    }

    /// Dispatches `payload` to every function subscribed to `topic`, with no
    /// caller-supplied correlation id, cancellation, or extra headers.
    pub async fn invoke(&self, topic: &str, payload: &[u8]) {
        self.invoke_with_context(&InvocationContext::default(), topic, payload, &Headers::new())
            .await;
    }

    /// Dispatches `payload` to every function subscribed to `topic`, carrying
    /// `ctx` and `extra_headers` through to the invoker.
    pub async fn invoke_with_context(
        &self,
        ctx: &InvocationContext,
        topic: &str,
        payload: &[u8],
        extra_headers: &Headers,
    ) {
        self.invoker
            .invoke(
                ctx,
                &self.topic_map,
                topic,
                payload,
                extra_headers,
                &self.response_tx,
            )
            .await;
    }

    /// A snapshot of the currently-known topics.
    pub fn topics(&self) -> Vec<String> {
        self.topic_map.topics()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Spawns the discovery synchronizer as a background task: an immediate
    /// rebuild, then one every `rebuild-interval`, until the controller is
    /// dropped or [`Controller::stop`] is called. Call once per controller.
    pub fn begin_map_builder(&self) {
        let builder = LookupBuilder::new(
            self.gateway.clone(),
            self.topic_annotation_delimiter.clone(),
        );
        let synchronizer = DiscoverySynchronizer::new(
            builder,
            self.topic_map.clone(),
            self.metrics.clone(),
            self.rebuild_interval,
            self.fatal_on_sync_error,
            self.print_sync,
        );

        let cancellation = self.discovery_cancellation.clone();
        tokio::spawn(async move { synchronizer.run(cancellation).await });
    }

    /// Stops the background discovery synchronizer, if one was started.
    pub fn stop(&self) {
        self.discovery_cancellation.cancel();
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.discovery_cancellation.cancel();
    }
}

fn spawn_fan_out(
    mut response_rx: mpsc::Receiver<InvocationResponse>,
    observers: Arc<RwLock<Vec<Box<dyn Observer>>>>,
    metrics: Arc<Metrics>,
) {
    tokio::spawn(async move {
        while let Some(response) = response_rx.recv().await {
            if !response.function.is_empty() {
                metrics.record_invocation(&response.function);
            }

            let observers = observers.read().unwrap();
            for observer in observers.iter() {
                observer.on_response(&response);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigDuration;
    use crate::error::GatewayError;
    use crate::topic_map::RoutingTable;
    use crate::types::FunctionRecord;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(gateway_url: &str) -> ControllerConfig {
        ControllerConfig {
            gateway_url: gateway_url.to_string(),
            upstream_timeout: ConfigDuration::new(Duration::from_secs(5)),
            rebuild_interval: ConfigDuration::new(Duration::from_secs(10)),
            topic_annotation_delimiter: ",".to_string(),
            async_function_invocation: false,
            content_type: String::new(),
            user_agent: String::new(),
            print_response: false,
            print_response_body: false,
            print_request_body: false,
            print_sync: false,
            basic_auth: false,
            fatal_on_sync_error: false,
        }
    }

    #[derive(Clone)]
    struct EmptyGateway;

    #[async_trait]
    impl GatewayClient for EmptyGateway {
        async fn namespaces(&self) -> Result<Vec<String>, GatewayError> {
            Ok(vec![])
        }

        async fn functions(&self, _namespace: &str) -> Result<Vec<FunctionRecord>, GatewayError> {
            Ok(vec![])
        }
    }

    struct RecordingObserver {
        seen: Arc<Mutex<Vec<InvocationResponse>>>,
    }

    impl Observer for RecordingObserver {
        fn on_response(&self, response: &InvocationResponse) {
            self.seen.lock().unwrap().push(response.clone());
        }
    }

    #[tokio::test]
    async fn subscribed_observer_receives_invocation_responses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/function/echo"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes("ok"))
            .mount(&server)
            .await;

        let invoker = crate::invoker::HttpInvoker::new(crate::invoker::HttpInvokerConfig {
            gateway_url: server.uri(),
            upstream_timeout: Duration::from_secs(5),
            credentials: None,
            async_function_invocation: false,
            content_type: String::new(),
            user_agent: String::new(),
            print_request_body: false,
            print_response_body: false,
        })
        .unwrap();

        let config = test_config(&server.uri());
        let controller = Controller::new(Box::new(EmptyGateway), Box::new(invoker), &config);

        let mut table = RoutingTable::new();
        table.insert("topic1".to_string(), vec!["echo".to_string()]);
        controller.topic_map.sync(table);

        let seen = Arc::new(Mutex::new(Vec::new()));
        controller.subscribe(Box::new(RecordingObserver { seen: seen.clone() }));

        controller.invoke("topic1", b"hello").await;

        // Give the fan-out task a chance to drain the response channel.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let responses = seen.lock().unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].function, "echo");
        assert_eq!(responses[0].status, Some(200));

        assert_eq!(controller.metrics().invocation_count["echo"], 1);
    }

    #[tokio::test]
    async fn topics_reflects_the_current_routing_table() {
        let config = test_config("http://localhost");
        let invoker = crate::invoker::HttpInvoker::new(crate::invoker::HttpInvokerConfig {
            gateway_url: "http://localhost".to_string(),
            upstream_timeout: Duration::from_secs(5),
            credentials: None,
            async_function_invocation: false,
            content_type: String::new(),
            user_agent: String::new(),
            print_request_body: false,
            print_response_body: false,
        })
        .unwrap();

        let controller = Controller::new(Box::new(EmptyGateway), Box::new(invoker), &config);
        assert!(controller.topics().is_empty());

        let mut table = RoutingTable::new();
        table.insert("topic1".to_string(), vec!["echo".to_string()]);
        controller.topic_map.sync(table);

        assert_eq!(controller.topics(), vec!["topic1".to_string()]);
    }
}
