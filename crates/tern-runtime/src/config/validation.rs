//! Configuration validation utilities.

use std::collections::HashSet;

use tern_adapter_irc::IrcNetworkConfig;
use tern_core::WILDCARD;

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogLevel, LogOutput, LoggingConfig, TernConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &TernConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;

    if config.bus.queue_capacity == 0 {
        return Err(ConfigError::validation("Bus queue capacity must be greater than 0"));
    }

    if let Some(terminal) = &config.terminal {
        validate_sub_ident(&terminal.sub_ident, "terminal.sub_ident")?;
    }

    validate_irc_config(&config.irc)
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    for (target, level) in &logging.filters {
        if level.parse::<LogLevel>().is_err() {
            return Err(ConfigError::validation(format!(
                "Invalid log level for '{target}': {level}. Valid values are: {:?}",
                LogLevel::NAMES
            )));
        }
    }

    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    Ok(())
}

fn validate_sub_ident(sub_ident: &str, field: &str) -> ConfigResult<()> {
    if sub_ident.is_empty() {
        return Err(ConfigError::missing_field(field));
    }
    if sub_ident == WILDCARD {
        return Err(ConfigError::validation(format!(
            "{field} cannot be the wildcard '{WILDCARD}'"
        )));
    }
    Ok(())
}

fn validate_irc_config(networks: &[IrcNetworkConfig]) -> ConfigResult<()> {
    let mut seen = HashSet::new();

    for network in networks {
        validate_sub_ident(&network.sub_ident, "irc.sub_ident")?;

        if !seen.insert(network.sub_ident.as_str()) {
            return Err(ConfigError::DuplicateSubIdent(network.sub_ident.clone()));
        }

        network.client.validate().map_err(|e| {
            ConfigError::validation(format!("irc network '{}': {e}", network.sub_ident))
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_adapter_terminal::TerminalConfig;
    use tern_irc::ClientConfig;

    fn network(sub: &str) -> IrcNetworkConfig {
        IrcNetworkConfig::new(sub, ClientConfig::new("irc.example.org:6667", "tern"))
    }

    #[test]
    fn test_validate_empty_config() {
        assert!(validate_config(&TernConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_invalid_filter_level() {
        let mut config = TernConfig::default();
        config.logging.filters.insert("tern_irc".into(), "chatty".into());
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));

        config.logging.filters.insert("tern_irc".into(), "debug".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_file_output_needs_path() {
        let mut config = TernConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn test_validate_zero_bus_capacity() {
        let mut config = TernConfig::default();
        config.bus.queue_capacity = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_duplicate_sub_ident() {
        let config = TernConfig {
            irc: vec![network("libera"), network("libera")],
            ..Default::default()
        };
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::DuplicateSubIdent(sub)) if sub == "libera"
        ));
    }

    #[test]
    fn test_validate_wildcard_sub_ident() {
        let config = TernConfig {
            irc: vec![network("*")],
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());

        let config = TernConfig {
            terminal: Some(TerminalConfig {
                sub_ident: "*".into(),
                interactive: false,
            }),
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_client_settings() {
        let mut empty_address = network("a");
        empty_address.client.address.clear();

        let mut empty_nick = network("b");
        empty_nick.client.nick.clear();

        let mut zero_ping = network("c");
        zero_ping.client.ping_timeout_secs = 0;

        let mut zero_rate = network("d");
        zero_rate.client.rate_limit.target_ms_per_token = 0;

        for bad in [empty_address, empty_nick, zero_ping, zero_rate] {
            let sub = bad.sub_ident.clone();
            let config = TernConfig {
                irc: vec![bad],
                ..Default::default()
            };
            assert!(validate_config(&config).is_err(), "network {sub} should be rejected");
        }
    }
}
