use std::time::Duration;

use async_trait::async_trait;
use dyn_clonable::clonable;
use reqwest::StatusCode;

use crate::config::BasicAuthCredentials;
use crate::error::GatewayError;
use crate::types::FunctionRecord;

/// How long an idle pooled connection is kept around. Short enough that sockets
/// aren't held open for long, long enough to keep the pool hot across consecutive
/// discovery polls.
const IDLE_POOL_TIMEOUT: Duration = Duration::from_millis(250);

/// Read-only access to a FaaS gateway's discovery endpoints.
#[async_trait]
#[clonable]
pub trait GatewayClient: Clone + Send + Sync {
    /// `GET /system/namespaces`. A `404` is not an error — it means the gateway
    /// doesn't support multiple namespaces — and yields an empty list.
    async fn namespaces(&self) -> Result<Vec<String>, GatewayError>;

    /// `GET /system/functions`, optionally scoped to a namespace.
    async fn functions(&self, namespace: &str) -> Result<Vec<FunctionRecord>, GatewayError>;
}

#[derive(Clone)]
pub struct HttpGatewayClient {
    gateway_url: String,
    client: reqwest::Client,
    credentials: Option<BasicAuthCredentials>,
}

impl HttpGatewayClient {
    pub fn new(
        gateway_url: impl Into<String>,
        upstream_timeout: Duration,
        credentials: Option<BasicAuthCredentials>,
    ) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(IDLE_POOL_TIMEOUT)
            .timeout(upstream_timeout)
            .build()?;

        Ok(Self {
            gateway_url: gateway_url.into(),
            client,
            credentials,
        })
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.get(url);
        if let Some(creds) = &self.credentials {
            req = req.basic_auth(&creds.user, Some(&creds.password));
        }
        req
    }
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    async fn namespaces(&self) -> Result<Vec<String>, GatewayError> {
        let url = format!("{}/system/namespaces", self.gateway_url);

        let response = self
            .request(&url)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(url.clone(), e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            StatusCode::UNAUTHORIZED => Err(GatewayError::Unauthorized),
            _ => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| GatewayError::Transport(url.clone(), e))?;

                if bytes.is_empty() {
                    return Ok(Vec::new());
                }

                serde_json::from_slice(&bytes).map_err(|e| GatewayError::Parse(url, e))
            }
        }
    }

    async fn functions(&self, namespace: &str) -> Result<Vec<FunctionRecord>, GatewayError> {
        let url = format!("{}/system/functions", self.gateway_url);

        let mut req = self.request(&url);
        if !namespace.is_empty() {
            req = req.query(&[("namespace", namespace)]);
        }

        let response = req
            .send()
            .await
            .map_err(|e| GatewayError::Transport(url.clone(), e))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(GatewayError::Unauthorized);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Transport(url.clone(), e))?;

        if bytes.is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&bytes).map_err(|e| GatewayError::Parse(url, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> HttpGatewayClient {
        HttpGatewayClient::new(server.uri(), Duration::from_secs(5), None).unwrap()
    }

    #[tokio::test]
    async fn namespaces_returns_empty_list_on_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/system/namespaces"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert_eq!(client.namespaces().await.unwrap(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn namespaces_errors_on_401() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/system/namespaces"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert!(matches!(
            client.namespaces().await,
            Err(GatewayError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn namespaces_parses_json_array() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/system/namespaces"))
            .respond_with(ResponseTemplate::new(200).set_body_json(["openfaas-fn", "fn"]))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert_eq!(
            client.namespaces().await.unwrap(),
            vec!["openfaas-fn".to_string(), "fn".to_string()]
        );
    }

    #[tokio::test]
    async fn functions_passes_namespace_query_param() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/system/functions"))
            .and(query_param("namespace", "openfaas-fn"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"name": "echo", "namespace": "openfaas-fn", "annotations": {"topic": "topic1"}}
            ])))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let functions = client.functions("openfaas-fn").await.unwrap();
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].name, "echo");
    }

    #[tokio::test]
    async fn functions_without_namespace_omits_query_param() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/system/functions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert!(client.functions("").await.unwrap().is_empty());
    }
}
