//! A thin usage example, not a supported product surface: emits a synthetic
//! event on a fixed topic every ten seconds, the way a pub/sub adapter would.
use std::time::{Duration, SystemTime};

use connector_core::config::{self, BasicAuthCredentials};
use connector_core::controller::Controller;
use connector_core::gateway_client::HttpGatewayClient;
use connector_core::invoker::{HttpInvoker, HttpInvokerConfig};
use connector_core::log_setup;
use connector_core::observer::{Observer, ResponsePrinter};
use connector_core::types::{Headers, InvocationContext};
use log::info;

const TOPIC: &str = "payment.received";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (controller_config, log_config) = config::load(Some("connector.yaml"))?;
    log_setup::setup(&log_config)?;

    let credentials = match std::env::var("CONNECTOR_PASSWORD") {
        Ok(password) if !password.is_empty() => Some(BasicAuthCredentials {
            user: std::env::var("CONNECTOR_USERNAME").unwrap_or_else(|_| "admin".to_string()),
            password,
        }),
        _ => None,
    };

    controller_config.validate(&credentials)?;

    let gateway = HttpGatewayClient::new(
        controller_config.gateway_url.clone(),
        *controller_config.upstream_timeout,
        credentials.clone(),
    )?;

    let invoker = HttpInvoker::new(HttpInvokerConfig {
        gateway_url: controller_config.gateway_url.clone(),
        upstream_timeout: *controller_config.upstream_timeout,
        credentials,
        async_function_invocation: controller_config.async_function_invocation,
        content_type: controller_config.content_type.clone(),
        user_agent: controller_config.user_agent.clone(),
        print_request_body: controller_config.print_request_body,
        print_response_body: controller_config.print_response_body,
    })?;

    let controller = Controller::new(Box::new(gateway), Box::new(invoker), &controller_config);
    controller.subscribe(Box::new(ResponsePrinter {
        print_body: controller_config.print_response_body,
    }) as Box<dyn Observer>);

    controller.begin_map_builder();

    let mut message_id: u64 = 0;
    let mut ticker = tokio::time::interval(Duration::from_secs(10));

    loop {
        ticker.tick().await;

        info!("emitting event on topic {TOPIC} - {}", controller_config.gateway_url);

        let mut headers = Headers::new();
        headers.insert("X-Connector".to_string(), vec!["cmd/timer".to_string()]);
        headers.insert("X-Message-Id".to_string(), vec![message_id.to_string()]);

        let payload = format!("test {:?}", SystemTime::now());
        controller
            .invoke_with_context(&InvocationContext::default(), TOPIC, payload.as_bytes(), &headers)
            .await;

        message_id += 1;
    }
}
