//! Multiplexer Configuration Settings
//!
//! Configuration types for the subscription multiplexer, loaded from
//! environment variables (optionally seeded from a `.env` file).

/// Behavioural switches read on every processed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiplexerSettings {
    /// Rebuild active subscriptions after a reconnect instead of tearing them down.
    pub restore_on_reconnect: bool,
    /// The venue distinguishes subscriptions by instrument.
    pub support_subscription_by_security: bool,
}

impl Default for MultiplexerSettings {
    fn default() -> Self {
        Self {
            restore_on_reconnect: true,
            support_subscription_by_security: true,
        }
    }
}

/// Channel capacity settings.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// Capacity of the caller reply broadcast channel.
    pub replies_capacity: usize,
    /// Capacity of the channel towards the transport task.
    pub transport_capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            replies_capacity: 1_024,
            transport_capacity: 1_024,
        }
    }
}

/// Complete multiplexer configuration.
#[derive(Debug, Clone, Default)]
pub struct MultiplexerConfig {
    /// Behavioural switches.
    pub settings: MultiplexerSettings,
    /// Channel capacities.
    pub channels: ChannelSettings,
}

impl MultiplexerConfig {
    /// Load a `.env` file (current or ancestor directory), then read the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but malformed.
    pub fn load() -> Result<Self, ConfigError> {
        load_dotenv();
        Self::from_env()
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let settings = MultiplexerSettings {
            restore_on_reconnect: parse_bool(
                &lookup,
                "SUBSCRIPTION_MUX_RESTORE_ON_RECONNECT",
                defaults.settings.restore_on_reconnect,
            )?,
            support_subscription_by_security: parse_bool(
                &lookup,
                "SUBSCRIPTION_MUX_BY_SECURITY",
                defaults.settings.support_subscription_by_security,
            )?,
        };

        let channels = ChannelSettings {
            replies_capacity: parse_capacity(
                &lookup,
                "SUBSCRIPTION_MUX_REPLIES_CAPACITY",
                defaults.channels.replies_capacity,
            )?,
            transport_capacity: parse_capacity(
                &lookup,
                "SUBSCRIPTION_MUX_TRANSPORT_CAPACITY",
                defaults.channels.transport_capacity,
            )?,
        };

        Ok(Self { settings, channels })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has a value that cannot be parsed.
    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().to_lowercase().as_str() {
        "" => Err(ConfigError::EmptyValue(key.to_string())),
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
        }),
    }
}

fn parse_capacity<F>(lookup: &F, key: &str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<usize>() {
        Ok(capacity) if capacity > 0 => Ok(capacity),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
        }),
    }
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn multiplexer_settings_defaults() {
        let settings = MultiplexerSettings::default();
        assert!(settings.restore_on_reconnect);
        assert!(settings.support_subscription_by_security);
    }

    #[test]
    fn channel_settings_defaults() {
        let settings = ChannelSettings::default();
        assert_eq!(settings.replies_capacity, 1_024);
        assert_eq!(settings.transport_capacity, 1_024);
    }

    #[test]
    fn missing_variables_use_defaults() {
        let config = MultiplexerConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.settings, MultiplexerSettings::default());
    }

    #[test]
    fn bool_parsing() {
        let config = MultiplexerConfig::from_lookup(lookup_from(&[
            ("SUBSCRIPTION_MUX_RESTORE_ON_RECONNECT", "FALSE"),
            ("SUBSCRIPTION_MUX_BY_SECURITY", "off"),
        ]))
        .unwrap();
        assert!(!config.settings.restore_on_reconnect);
        assert!(!config.settings.support_subscription_by_security);
    }

    #[test]
    fn invalid_bool_is_rejected() {
        let err = MultiplexerConfig::from_lookup(lookup_from(&[(
            "SUBSCRIPTION_MUX_RESTORE_ON_RECONNECT",
            "sometimes",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn empty_bool_is_rejected() {
        let err =
            MultiplexerConfig::from_lookup(lookup_from(&[("SUBSCRIPTION_MUX_BY_SECURITY", " ")]))
                .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(_)));
    }

    #[test]
    fn capacity_parsing() {
        let config = MultiplexerConfig::from_lookup(lookup_from(&[(
            "SUBSCRIPTION_MUX_REPLIES_CAPACITY",
            "64",
        )]))
        .unwrap();
        assert_eq!(config.channels.replies_capacity, 64);

        let err = MultiplexerConfig::from_lookup(lookup_from(&[(
            "SUBSCRIPTION_MUX_TRANSPORT_CAPACITY",
            "0",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
