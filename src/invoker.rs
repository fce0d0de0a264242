use std::time::{Duration, Instant};

use async_trait::async_trait;
use dyn_clonable::clonable;
use log::{debug, warn};
use tokio::sync::mpsc;

use crate::config::BasicAuthCredentials;
use crate::topic_map::TopicMap;
use crate::types::{Headers, InvocationContext, InvocationResponse};

/// Issues one HTTP POST per topic subscriber and publishes each outcome onto a
/// response channel.
#[async_trait]
#[clonable]
pub trait Invoker: Clone + Send + Sync {
    async fn invoke(
        &self,
        ctx: &InvocationContext,
        topic_map: &TopicMap,
        topic: &str,
        payload: &[u8],
        extra_headers: &Headers,
        responses: &mpsc::Sender<InvocationResponse>,
    );
}

#[derive(Clone)]
pub struct HttpInvoker {
    gateway_url: String,
    client: reqwest::Client,
    credentials: Option<BasicAuthCredentials>,
    async_function_invocation: bool,
    content_type: String,
    user_agent: String,
    print_request_body: bool,
    print_response_body: bool,
}

pub struct HttpInvokerConfig {
    pub gateway_url: String,
    pub upstream_timeout: Duration,
    pub credentials: Option<BasicAuthCredentials>,
    pub async_function_invocation: bool,
    pub content_type: String,
    pub user_agent: String,
    pub print_request_body: bool,
    pub print_response_body: bool,
}

impl HttpInvoker {
    pub fn new(config: HttpInvokerConfig) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_millis(250))
            .timeout(config.upstream_timeout)
            .build()?;

        Ok(Self {
            gateway_url: config.gateway_url,
            client,
            credentials: config.credentials,
            async_function_invocation: config.async_function_invocation,
            content_type: config.content_type,
            user_agent: config.user_agent,
            print_request_body: config.print_request_body,
            print_response_body: config.print_response_body,
        })
    }

    fn function_base(&self) -> &'static str {
        if self.async_function_invocation {
            "async-function"
        } else {
            "function"
        }
    }

    /// Headers are applied in order, so that an explicit entry in `extra_headers`
    /// always wins over the connector's own defaults: `Content-Type` (if
    /// configured), `X-Connector` (unless overridden), `X-Topic` (unless
    /// overridden), then every `extra_headers` entry, then `User-Agent`.
    fn build_headers(&self, topic: &str, extra_headers: &Headers) -> Vec<(String, String)> {
        let mut headers = Vec::new();

        if !self.content_type.is_empty() {
            headers.push(("Content-Type".to_string(), self.content_type.clone()));
        }

        if !has_header(extra_headers, "X-Connector") {
            headers.push(("X-Connector".to_string(), "connector-sdk".to_string()));
        }

        if !has_header(extra_headers, "X-Topic") {
            headers.push(("X-Topic".to_string(), topic.to_string()));
        }

        for (name, values) in extra_headers {
            for value in values {
                headers.push((name.clone(), value.clone()));
            }
        }

        if !self.user_agent.is_empty() {
            headers.push(("User-Agent".to_string(), self.user_agent.clone()));
        }

        headers
    }

    async fn invoke_one(
        &self,
        ctx: &InvocationContext,
        topic: &str,
        function_id: &str,
        payload: &[u8],
        extra_headers: &Headers,
    ) -> InvocationResponse {
        let url = format!("{}/{}/{}", self.gateway_url, self.function_base(), function_id);

        if self.print_request_body {
            debug!(
                "connector-sdk request to {function_id}: {}",
                String::from_utf8_lossy(payload)
            );
        }

        let mut request = self.client.post(&url).body(payload.to_vec());

        for (name, value) in self.build_headers(topic, extra_headers) {
            request = request.header(name, value);
        }

        if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.user, Some(&creds.password));
        }

        let start = Instant::now();

        let outcome = tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => {
                Err(format!("invocation of {function_id} was cancelled"))
            }
            result = request.send() => result.map_err(|e| format!("failed to invoke {function_id}: {e}")),
        };

        let response = match outcome {
            Err(message) => {
                warn!("{message}");
                return InvocationResponse::error(
                    ctx.correlation_id.clone(),
                    topic,
                    function_id,
                    message,
                    start.elapsed(),
                );
            }
            Ok(response) => response,
        };

        let status = response.status().as_u16();
        let headers = response_headers(&response);

        let body = match response.bytes().await {
            Ok(body) => body.to_vec(),
            Err(e) => {
                let message = format!("failed to read response body from {function_id}: {e}");
                warn!("{message}");
                return InvocationResponse::error(
                    ctx.correlation_id.clone(),
                    topic,
                    function_id,
                    message,
                    start.elapsed(),
                );
            }
        };

        if self.print_response_body {
            debug!(
                "connector-sdk response from {function_id}: [{status}] {}",
                String::from_utf8_lossy(&body)
            );
        }

        InvocationResponse::success(
            ctx.correlation_id.clone(),
            topic,
            function_id,
            status,
            body,
            headers,
            start.elapsed(),
        )
    }
}

fn response_headers(response: &reqwest::Response) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in response.headers() {
        headers
            .entry(name.to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    headers
}

fn has_header(headers: &Headers, name: &str) -> bool {
    headers.keys().any(|k| k.eq_ignore_ascii_case(name))
}

#[async_trait]
impl Invoker for HttpInvoker {
    async fn invoke(
        &self,
        ctx: &InvocationContext,
        topic_map: &TopicMap,
        topic: &str,
        payload: &[u8],
        extra_headers: &Headers,
        responses: &mpsc::Sender<InvocationResponse>,
    ) {
        if payload.is_empty() {
            let _ = responses
                .send(InvocationResponse::error(
                    ctx.correlation_id.clone(),
                    topic,
                    "",
                    "no message to send",
                    Duration::ZERO,
                ))
                .await;
            return;
        }

        for function_id in topic_map.match_topic(topic) {
            let response = self
                .invoke_one(ctx, topic, &function_id, payload, extra_headers)
                .await;

            if responses.send(response).await.is_err() {
                // No one is draining the stream any more; nothing further to do.
                return;
            }
        }
    }
}
