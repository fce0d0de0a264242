use std::{ops::Deref, str::FromStr, time::Duration};

use config::{Config, Environment, File, FileFormat};
use serde::{
    de::{self, Visitor},
    Deserialize,
};

use crate::error::ConfigError;

/// Wrapper type to support human-readable duration deserialization with serde,
/// e.g. `"30s"`, `"5m"`, `"500ms"`.
#[derive(Debug, Clone, Copy)]
pub struct ConfigDuration(Duration);

impl ConfigDuration {
    pub fn new(d: Duration) -> Self {
        Self(d)
    }
}

impl Deref for ConfigDuration {
    type Target = Duration;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Duration> for ConfigDuration {
    fn from(d: Duration) -> Self {
        Self(d)
    }
}

impl<'de> Deserialize<'de> for ConfigDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer
            .deserialize_str(HumanReadableDurationVisitor)
            .map(ConfigDuration)
    }
}

struct HumanReadableDurationVisitor;

impl<'de> Visitor<'de> for HumanReadableDurationVisitor {
    type Value = Duration;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            formatter,
            "an unsigned integer followed by a unit: `h`, `m`, `s`, `ms`, `us` or `ns`"
        )
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        let split_offset = v
            .chars()
            .take_while(|c| c.is_numeric())
            .map(|c| c.len_utf8())
            .sum::<usize>();
        if split_offset == 0 || split_offset >= v.len() {
            return Err(E::invalid_value(de::Unexpected::Str(v), &self));
        }
        let (value, unit) = v.split_at(split_offset);

        let value = value
            .parse::<u64>()
            .map_err(|_| E::invalid_value(de::Unexpected::Str(value), &"an unsigned integer"))?;

        let duration = match unit {
            "h" => Duration::from_secs(value * 60 * 60),
            "m" => Duration::from_secs(value * 60),
            "s" => Duration::from_secs(value),
            "ms" => Duration::from_millis(value),
            "us" => Duration::from_micros(value),
            "ns" => Duration::from_nanos(value),
            u => {
                return Err(E::invalid_value(
                    de::Unexpected::Str(u),
                    &"a unit: `h`, `m`, `s`, `ms`, `us` or `ns`",
                ))
            }
        };

        Ok(duration)
    }
}

#[derive(Clone, Debug)]
pub struct ConfigLogLevelFilter(log::LevelFilter);

impl Deref for ConfigLogLevelFilter {
    type Target = log::LevelFilter;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de> Deserialize<'de> for ConfigLogLevelFilter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_str(ConfigLogLevelFilterVisitor)
    }
}

struct ConfigLogLevelFilterVisitor;

impl<'de> Visitor<'de> for ConfigLogLevelFilterVisitor {
    type Value = ConfigLogLevelFilter;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            formatter,
            "one of `off`, `error`, `warn`, `info`, `debug`, `trace`"
        )
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        let level = log::LevelFilter::from_str(v)
            .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))?;
        Ok(ConfigLogLevelFilter(level))
    }
}

/// Basic auth credentials to present to the gateway, when `basic-auth` is enabled.
#[derive(Clone, Debug)]
pub struct BasicAuthCredentials {
    pub user: String,
    pub password: String,
}

/// Configures structured logging for a process embedding the core. Library code never
/// touches this directly; only a process's entry point does.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct LogConfig {
    pub level: Option<ConfigLogLevelFilter>,
    #[serde(default)]
    pub filters: Vec<LogFilterConfig>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct LogFilterConfig {
    pub module: String,
    pub level: ConfigLogLevelFilter,
}

/// Recognized configuration for the connector core, see SPEC_FULL.md §6.
#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "kebab-case")]
pub struct ControllerConfig {
    pub gateway_url: String,

    pub upstream_timeout: ConfigDuration,

    pub rebuild_interval: ConfigDuration,

    #[serde(default)]
    pub topic_annotation_delimiter: String,

    #[serde(default)]
    pub async_function_invocation: bool,

    #[serde(default)]
    pub content_type: String,

    #[serde(default)]
    pub user_agent: String,

    #[serde(default)]
    pub print_response: bool,

    #[serde(default)]
    pub print_response_body: bool,

    #[serde(default)]
    pub print_request_body: bool,

    #[serde(default)]
    pub print_sync: bool,

    #[serde(default)]
    pub basic_auth: bool,

    /// Re-enables the original source's behavior of aborting the process when a
    /// discovery sync fails, instead of logging and retrying at the next tick.
    #[serde(default)]
    pub fatal_on_sync_error: bool,
}

impl ControllerConfig {
    pub fn validate(&self, credentials: &Option<BasicAuthCredentials>) -> Result<(), ConfigError> {
        if self.gateway_url.is_empty() {
            return Err(ConfigError::MissingGatewayUrl);
        }

        if self.basic_auth && credentials.is_none() {
            return Err(ConfigError::MissingCredentials);
        }

        Ok(())
    }
}

/// Loads a [`ControllerConfig`] and [`LogConfig`] from built-in defaults, an optional
/// `connector.yaml` file in the working directory, and environment variables prefixed
/// with `CONNECTOR__` (double underscore separating nested keys), in that precedence
/// order.
pub fn load(config_file: Option<&str>) -> Result<(ControllerConfig, LogConfig), ConfigError> {
    let defaults: Vec<(&str, &str)> = vec![
        ("log.level", "warn"),
        ("controller.gateway-url", ""),
        ("controller.upstream-timeout", "10s"),
        ("controller.rebuild-interval", "10s"),
        ("controller.topic-annotation-delimiter", ","),
        ("controller.async-function-invocation", "false"),
        ("controller.content-type", ""),
        ("controller.user-agent", ""),
        ("controller.print-response", "false"),
        ("controller.print-response-body", "false"),
        ("controller.print-request-body", "false"),
        ("controller.print-sync", "false"),
        ("controller.basic-auth", "false"),
        ("controller.fatal-on-sync-error", "false"),
    ];

    let env = Environment::default()
        .prefix("CONNECTOR")
        .prefix_separator("__")
        .keep_prefix(false)
        .separator("__")
        .try_parsing(true);

    let mut builder = Config::builder();

    for (key, val) in defaults {
        builder = builder.set_default(key, val)?;
    }

    builder = builder.set_default("log.filters", Vec::<String>::new())?;

    if let Some(path) = config_file {
        builder = builder.add_source(File::new(path, FileFormat::Yaml).required(false));
    }

    builder = builder.add_source(env);

    let config = builder.build()?;

    let controller_config = config.get("controller")?;
    let log_config = config.get("log")?;

    Ok((controller_config, log_config))
}
