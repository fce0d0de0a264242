use crate::error::LookupBuilderError;
use crate::gateway_client::GatewayClient;
use crate::topic_map::RoutingTable;
use crate::types::FunctionRecord;

/// Builds a topic→[function] routing table by polling a gateway's discovery
/// endpoints and extracting `topic` annotations.
pub struct LookupBuilder {
    gateway: Box<dyn GatewayClient>,
    topic_delimiter: String,
}

impl LookupBuilder {
    pub fn new(gateway: Box<dyn GatewayClient>, topic_delimiter: impl Into<String>) -> Self {
        Self {
            gateway,
            topic_delimiter: topic_delimiter.into(),
        }
    }

    /// Compiles a map of topic names to functions that have advertised to receive
    /// messages on that topic, across every namespace the gateway reports (or a
    /// single anonymous namespace if it reports none).
    pub async fn build(&self) -> Result<RoutingTable, LookupBuilderError> {
        let namespaces = self
            .gateway
            .namespaces()
            .await
            .map_err(LookupBuilderError::Namespaces)?;

        let namespaces = if namespaces.is_empty() {
            vec![String::new()]
        } else {
            namespaces
        };

        let mut table = RoutingTable::new();

        for namespace in namespaces {
            let functions = self.gateway.functions(&namespace).await.map_err(|source| {
                LookupBuilderError::Namespace {
                    namespace: namespace.clone(),
                    source,
                }
            })?;

            for function in functions {
                self.add_function(&mut table, &namespace, &function);
            }
        }

        Ok(table)
    }

    fn add_function(&self, table: &mut RoutingTable, namespace: &str, function: &FunctionRecord) {
        let Some(annotations) = &function.annotations else {
            return;
        };

        let Some(topic_value) = annotations.get("topic") else {
            return;
        };

        let function_id = compose_function_id(&function.name, namespace);

        for topic in split_topics(topic_value, &self.topic_delimiter) {
            table.entry(topic).or_default().push(function_id.clone());
        }
    }
}

/// `name + "." + namespace` when a non-empty namespace is known, else `name`.
/// Kept in one place; the invoker treats the result as an opaque path segment.
pub fn compose_function_id(name: &str, namespace: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{name}.{namespace}")
    }
}

/// Splits `value` on `delimiter` (unless `delimiter` is empty or doesn't occur in
/// `value`, in which case `value` is a single token), trims each token, and drops
/// empty-after-trim tokens.
fn split_topics<'a>(value: &'a str, delimiter: &str) -> Vec<String> {
    let tokens: Vec<&'a str> = if !delimiter.is_empty() && value.contains(delimiter) {
        value.split(delimiter).collect()
    } else {
        vec![value]
    };

    tokens
        .into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
