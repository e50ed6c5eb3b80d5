use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{Result, TaggerError};

/// Installs the global `fmt` subscriber.
///
/// `RUST_LOG` wins over the configured level; `debug` raises this crate's
/// targets to `debug` on top of either.
pub fn init(config: &LoggingConfig, debug: bool) -> Result<()> {
    let mut filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| TaggerError::Logging(e.to_string()))?;

    if debug {
        let directive = "call_chain_tagger=debug"
            .parse()
            .map_err(|e: tracing_subscriber::filter::ParseError| {
                TaggerError::Logging(e.to_string())
            })?;
        filter = filter.add_directive(directive);
    }

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match config.format {
        LogFormat::Pretty => builder.with_target(true).try_init(),
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
    };

    installed.map_err(|e| TaggerError::Logging(e.to_string()))
}
