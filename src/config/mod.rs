mod defaults;
mod types;

pub use types::*;

use crate::error::ConfigError;
use defaults::*;
use std::path::Path;
use std::time::Duration;
use url::Url;

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            server: ServerConfig::default(),
            model: None,
            retry: RetryConfig::default(),
            channel: ChannelConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Validate the config
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: self.version,
                supported: CONFIG_VERSION,
            });
        }

        self.base_url()?;
        self.channel_url()?;

        if self.server.timeout_sec == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.timeout_sec)
    }

    /// HTTP API base, always ending in `/` so relative joins keep its path
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url = parse_url(&self.server.base_url)?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            _ => Err(ConfigError::UnsupportedScheme {
                url: self.server.base_url.clone(),
                expected: "http, https",
            }),
        }
    }

    /// Push channel base; `ws/{session_id}` is joined onto it per session
    pub fn channel_url(&self) -> Result<Url, ConfigError> {
        if let Some(ref ws_url) = self.server.ws_url {
            let url = parse_url(ws_url)?;
            return match url.scheme() {
                "ws" | "wss" => Ok(url),
                _ => Err(ConfigError::UnsupportedScheme {
                    url: ws_url.clone(),
                    expected: "ws, wss",
                }),
            };
        }

        let mut url = self.base_url()?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| ConfigError::InvalidUrl {
                url: self.server.base_url.clone(),
                reason: format!("cannot switch scheme to {}", scheme),
            })?;
        Ok(url)
    }

    /// Resolve a report reference (e.g. `/report.md`) against the API base
    pub fn report_url(&self, report_ref: &str) -> Result<Url, ConfigError> {
        let base = self.base_url()?;
        base.join(report_ref.trim_start_matches('/'))
            .map_err(|e| ConfigError::InvalidUrl {
                url: report_ref.to_string(),
                reason: e.to_string(),
            })
    }
}

fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.base_url().unwrap().as_str(), "http://127.0.0.1:8001/");
        assert_eq!(config.channel_url().unwrap().as_str(), "ws://127.0.0.1:8001/");
    }

    #[test]
    fn test_channel_url_follows_tls() {
        let mut config = Config::default();
        config.server.base_url = "https://research.example.com/api".to_string();
        assert_eq!(
            config.channel_url().unwrap().as_str(),
            "wss://research.example.com/api/"
        );
    }

    #[test]
    fn test_explicit_ws_url() {
        let mut config = Config::default();
        config.server.ws_url = Some("ws://localhost:9000".to_string());
        assert_eq!(config.channel_url().unwrap().as_str(), "ws://localhost:9000/");

        config.server.ws_url = Some("http://localhost:9000".to_string());
        assert!(matches!(
            config.channel_url(),
            Err(ConfigError::UnsupportedScheme { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = Config::default();
        config.server.base_url = "ftp://example.com".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedScheme { .. })
        ));

        let mut config = Config::default();
        config.server.timeout_sec = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroTimeout)));

        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroAttempts)));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let config: Config = serde_yaml::from_str("version: 2\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedVersion {
                found: 2,
                supported: 1
            })
        ));

        let config: Config = serde_yaml::from_str("version: 1\n").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_report_url() {
        let mut config = Config::default();
        config.server.base_url = "http://localhost:8001/api".to_string();
        assert_eq!(
            config.report_url("/report.pdf").unwrap().as_str(),
            "http://localhost:8001/api/report.pdf"
        );
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
server:
  base_url: "http://10.0.0.5:8001"
model: llama3
retry:
  max_attempts: 5
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.model.as_deref(), Some("llama3"));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff_base_ms, 1000);
        assert_eq!(config.server.timeout_sec, 600);
        assert!(config.channel.reopen_after_answers);
    }
}
