use crate::config::{AdapterTransport, Config};
use crate::error::ConfigError;

/// Longest accepted request timeout.
const MAX_REQUEST_TIMEOUT_SECS: u64 = 600;

/// Validate a [`Config`], returning all detected violations.
///
/// Returns `Ok(())` when the config is valid, or `Err` with a
/// vector of every validation error found.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let timeout = config.session.request_timeout_secs;
    if timeout == 0 || timeout > MAX_REQUEST_TIMEOUT_SECS {
        errors.push(ConfigError::Validation {
            field: "session.request_timeout_secs".to_string(),
            message: format!("must be 1\u{2013}{MAX_REQUEST_TIMEOUT_SECS}, got {timeout}"),
        });
    }

    if config.session.event_capacity == 0 {
        errors.push(ConfigError::Validation {
            field: "session.event_capacity".to_string(),
            message: "must be at least 1".to_string(),
        });
    }

    if config.session.client_id.is_empty() {
        errors.push(ConfigError::Validation {
            field: "session.client_id".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    let mut names: Vec<&String> = config.adapters.keys().collect();
    names.sort();
    for name in names {
        let entry = &config.adapters[name];
        match entry.transport {
            AdapterTransport::Stdio if entry.command.trim().is_empty() => {
                errors.push(ConfigError::Validation {
                    field: format!("adapters.{name}.command"),
                    message: "must not be empty for stdio transport".to_string(),
                });
            }
            AdapterTransport::Tcp if entry.port.is_none() => {
                errors.push(ConfigError::Validation {
                    field: format!("adapters.{name}.port"),
                    message: "required for tcp transport".to_string(),
                });
            }
            _ => {}
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
