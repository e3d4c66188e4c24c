use super::{types::Config, ConfigError};
use crate::process::HeapSize;

/// Validate configuration
/// Currently validates:
/// - Game port is not 0
/// - Relay polling has a non-zero interval and attempt budget
/// - Heap bounds parse and min <= max
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.relay.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "relay.poll_interval_ms cannot be 0".to_string(),
        ));
    }

    if config.relay.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "relay.max_attempts cannot be 0".to_string(),
        ));
    }

    let min = HeapSize::parse(&config.jvm.min_heap)
        .map_err(|e| ConfigError::ValidationError(format!("jvm.min_heap: {}", e)))?;
    let max = HeapSize::parse(&config.jvm.max_heap)
        .map_err(|e| ConfigError::ValidationError(format!("jvm.max_heap: {}", e)))?;
    if min.bytes() > max.bytes() {
        return Err(ConfigError::ValidationError(format!(
            "jvm.min_heap ({}) exceeds jvm.max_heap ({})",
            config.jvm.min_heap, config.jvm.max_heap
        )));
    }

    Ok(())
}
