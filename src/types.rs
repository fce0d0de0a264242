use std::{collections::HashMap, time::Duration};

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

/// A header bag: name to list-of-values, mirroring how HTTP headers are actually
/// represented (a name can repeat).
pub type Headers = HashMap<String, Vec<String>>;

/// A function as reported by `GET /system/functions`. Only `annotations["topic"]`
/// is meaningful to this crate; everything else rides along unexamined.
#[derive(Deserialize, Debug, Clone)]
pub struct FunctionRecord {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub annotations: Option<HashMap<String, String>>,
}

/// Carries cancellation and an optional caller-assigned correlation id through a
/// single `invoke` call, so observers can tie a stream of responses back to the
/// message that produced them.
#[derive(Clone, Debug, Default)]
pub struct InvocationContext {
    pub correlation_id: Option<String>,
    pub cancellation: CancellationToken,
}

impl InvocationContext {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            cancellation: CancellationToken::new(),
        }
    }
}

/// One outcome of invoking a single subscriber. Exactly one of `error` or
/// `(status, body)` is populated.
#[derive(Debug, Clone)]
pub struct InvocationResponse {
    pub context: Option<String>,
    pub topic: String,
    pub function: String,
    pub status: Option<u16>,
    pub body: Option<Vec<u8>>,
    pub headers: Headers,
    pub error: Option<String>,
    pub duration: Duration,
}

impl InvocationResponse {
    pub fn error(
        context: Option<String>,
        topic: impl Into<String>,
        function: impl Into<String>,
        error: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            context,
            topic: topic.into(),
            function: function.into(),
            status: None,
            body: None,
            headers: Headers::new(),
            error: Some(error.into()),
            duration,
        }
    }

    pub fn success(
        context: Option<String>,
        topic: impl Into<String>,
        function: impl Into<String>,
        status: u16,
        body: Vec<u8>,
        headers: Headers,
        duration: Duration,
    ) -> Self {
        Self {
            context,
            topic: topic.into(),
            function: function.into(),
            status: Some(status),
            body: Some(body),
            headers,
            error: None,
            duration,
        }
    }
}
