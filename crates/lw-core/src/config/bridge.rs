//! Bridge configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;
use lw_protocol::DEFAULT_MAX_LINE_LENGTH;

/// Tunables shared by every bridge in a process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// How long a connection waits for its object to be registered
    #[serde(with = "duration_secs")]
    pub connection_timeout: Duration,

    /// How long a shell connection waits for its widget after restoration
    #[serde(with = "duration_secs")]
    pub shell_connection_timeout: Duration,

    /// How long a shell connection waits for view restoration to finish
    #[serde(with = "duration_secs")]
    pub restoration_timeout: Duration,

    /// Maximum length of one envelope on stream transports
    pub max_line_length: usize,

    /// Prototype levels walked by `listProperties` when the caller gives none
    pub introspection_depth: usize,

    /// Skip underscore-prefixed names in `listProperties` by default
    pub omit_hidden: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            shell_connection_timeout: Duration::from_secs(10),
            restoration_timeout: Duration::from_secs(10),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            introspection_depth: 1,
            omit_hidden: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: BridgeConfig = toml::from_str("connection_timeout = 2\n").unwrap();
        assert_eq!(config.connection_timeout, Duration::from_secs(2));
        assert_eq!(config.shell_connection_timeout, Duration::from_secs(10));
        assert!(config.omit_hidden);
    }

    #[test]
    fn test_timeouts_are_reasonable() {
        let config = BridgeConfig::default();
        assert!(config.connection_timeout >= Duration::from_secs(1));
        assert!(config.restoration_timeout <= Duration::from_secs(60));
    }
}
