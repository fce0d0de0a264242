use thiserror::Error;

/// Errors raised while loading or validating a [`crate::config::ControllerConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("gateway-url must be set")]
    MissingGatewayUrl,

    #[error("basic-auth is enabled but no credentials were supplied")]
    MissingCredentials,

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Errors talking to the FaaS gateway's discovery endpoints.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("unauthorized: gateway rejected credentials")]
    Unauthorized,

    #[error("request to {0} failed: {1}")]
    Transport(String, #[source] reqwest::Error),

    #[error("failed to parse response from {0}: {1}")]
    Parse(String, #[source] serde_json::Error),
}

/// Errors rebuilding the routing table.
#[derive(Error, Debug)]
pub enum LookupBuilderError {
    #[error("failed to list functions for namespace {namespace:?}: {source}")]
    Namespace {
        namespace: String,
        #[source]
        source: GatewayError,
    },

    #[error("failed to list namespaces: {0}")]
    Namespaces(#[source] GatewayError),
}
