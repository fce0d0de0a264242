use anyhow::Result;
use env_logger::Builder;

use crate::config::LogConfig;

/// Initializes the `env_logger` backend for the `log` facade. Intended to be called
/// once, near the very start of a process that embeds the connector core — library
/// code in this crate never calls this itself.
pub fn setup(config: &LogConfig) -> Result<()> {
    let mut builder = Builder::new();

    if let Some(level) = &config.level {
        builder.filter_level(**level);
    }

    for filter in &config.filters {
        builder.filter(Some(&filter.module), *filter.level);
    }

    builder.try_init()?;

    Ok(())
}
