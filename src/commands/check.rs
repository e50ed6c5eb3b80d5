use crate::config::{self, TaggerConfig};
use crate::error::Result;
use tracing::{info, warn};

pub fn run_config_check(config: &TaggerConfig) -> Result<()> {
    info!("Running configuration check...");

    config::validate(config)?;
    info!("✓ Configuration is valid");

    info!("\nTagging:");
    info!("  Enabled: {}", config.enabled);
    info!("  Log intercepted errors: {}", config.interceptor.log_errors);

    info!("\nListener:");
    info!("  Enabled: {}", config.listener.enabled);
    info!("  Event level: {:?}", config.listener.event_level);
    info!("  Confirmation lines: {}", config.listener.confirmation_lines);
    match config::compile_tracked_kinds(&config.listener.tracked_kinds)? {
        Some(set) => info!("  Tracked kinds: {} pattern(s)", set.len()),
        None => info!("  Tracked kinds: all"),
    }

    info!("\nLogging:");
    info!("  Level: {}", config.logging.level);
    info!("  Format: {:?}", config.logging.format);

    if !config.listener_active() {
        warn!("Listener inactive: no persistence lines will be emitted");
    }

    let effective = serde_json::to_string_pretty(config)
        .map_err(|e| crate::error::ConfigError::Parse(e.to_string()))?;
    println!("{effective}");

    Ok(())
}
