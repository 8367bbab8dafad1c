use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Exchange-wide settings shared by every call made with a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Nameserver port every resolved address is contacted on
    pub port: u16,

    /// Timeout for establishing each TCP connection
    pub connect_timeout: Duration,

    /// Timeout for writing the query and reading the framed reply
    pub read_timeout: Duration,

    /// Largest reply accepted from a single address
    pub max_response_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: 53,
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(2),
            max_response_size: u16::MAX as usize,
        }
    }
}

/// On-disk form; every key is optional and falls back to the default.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    port: Option<u16>,
    connect_timeout_ms: Option<u64>,
    read_timeout_ms: Option<u64>,
    max_response_size: Option<usize>,
}

impl ClientConfig {
    /// Load settings from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        let mut config = Self::default();
        if let Some(port) = file.port {
            config.port = port;
        }
        if let Some(ms) = file.connect_timeout_ms {
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.read_timeout_ms {
            config.read_timeout = Duration::from_millis(ms);
        }
        if let Some(size) = file.max_response_size {
            config.max_response_size = size;
        }
        config.validate()?;
        Ok(config)
    }

    /// Apply `TKEY_*` environment overrides on top of `self`
    /// Returns Err if a variable is present but invalid
    pub fn overlay_env(self) -> Result<Self, ConfigError> {
        self.overlay_vars(|name| std::env::var(name).ok())
    }

    /// Same as [`ClientConfig::overlay_env`] with variables read from `var`.
    pub fn overlay_vars(
        mut self,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(port) = var("TKEY_PORT") {
            self.port = port
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
        }

        if let Some(timeout_str) = var("TKEY_CONNECT_TIMEOUT_MS") {
            self.connect_timeout = parse_timeout_ms(&timeout_str)?;
        }

        if let Some(timeout_str) = var("TKEY_READ_TIMEOUT_MS") {
            self.read_timeout = parse_timeout_ms(&timeout_str)?;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort("Port must be greater than 0".to_string()));
        }
        if self.connect_timeout.is_zero() || self.read_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "Timeout must be greater than 0".to_string(),
            ));
        }
        if self.max_response_size == 0 {
            return Err(ConfigError::ParseError(
                "Max response size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_timeout_ms(value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidTimeout(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.port, 53);
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.read_timeout, Duration::from_secs(2));
        assert_eq!(config.max_response_size, 65535);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overlay() {
        let config = ClientConfig::default()
            .overlay_vars(vars(&[("TKEY_PORT", "5353"), ("TKEY_READ_TIMEOUT_MS", "750")]))
            .unwrap();
        assert_eq!(config.port, 5353);
        assert_eq!(config.read_timeout, Duration::from_millis(750));
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_env_values() {
        let err = ClientConfig::default()
            .overlay_vars(vars(&[("TKEY_PORT", "domain")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidPort("domain".to_string()));

        let err = ClientConfig::default()
            .overlay_vars(vars(&[("TKEY_CONNECT_TIMEOUT_MS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeout(_)));

        let err = ClientConfig::default()
            .overlay_vars(vars(&[("TKEY_PORT", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 8053").unwrap();
        writeln!(file, "connect_timeout_ms = 500").unwrap();
        file.flush().unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.port, 8053);
        assert_eq!(config.connect_timeout, Duration::from_millis(500));
        assert_eq!(config.read_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_from_file_errors() {
        let err = ClientConfig::from_file("/nonexistent/tkey.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));

        assert!(matches!(
            ClientConfig::from_toml("port = \"fifty-three\""),
            Err(ConfigError::ParseError(_))
        ));
        assert!(matches!(
            ClientConfig::from_toml("retries = 3"),
            Err(ConfigError::ParseError(_))
        ));
        assert!(matches!(
            ClientConfig::from_toml("read_timeout_ms = 0"),
            Err(ConfigError::InvalidTimeout(_))
        ));
    }
}
