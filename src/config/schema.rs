//! TOML-facing configuration schema (§4.1, §4.8).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level configuration file contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log: LogConfig,
    pub api: ApiConfig,
    pub rtsp: RtspConfig,
    /// Stream name → one or more source URLs, tried in order by [`Stream::play`](crate::core::Stream).
    pub streams: HashMap<String, StreamSource>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            api: ApiConfig::default(),
            rtsp: RtspConfig::default(),
            streams: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `"info"` or `"mediahub=debug,warn"`.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub listen: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:1984".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtspConfig {
    pub listen: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for RtspConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8554".to_string(),
            username: None,
            password: None,
        }
    }
}

/// Parses a bitrate hint such as `"2M"` or `"512K"` into bits per second.
///
/// Only the uppercase `K` and `M` suffixes are recognized; a bare number is
/// taken as bits per second as-is. This matches the source config format's
/// case-sensitivity exactly rather than also accepting `k`/`m`, since
/// existing configs may rely on the distinction (e.g. to reject a typo).
pub fn parse_bitrate(s: &str) -> Option<u64> {
    let s = s.trim();
    if let Some(digits) = s.strip_suffix('M') {
        return digits.trim().parse::<u64>().ok().map(|n| n * 1_000_000);
    }
    if let Some(digits) = s.strip_suffix('K') {
        return digits.trim().parse::<u64>().ok().map(|n| n * 1_000);
    }
    s.parse::<u64>().ok()
}

/// A stream's configured sources: one URL, or several tried in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamSource {
    One(String),
    Many(Vec<String>),
}

impl StreamSource {
    pub fn urls(&self) -> Vec<String> {
        match self {
            StreamSource::One(url) => vec![url.clone()],
            StreamSource::Many(urls) => urls.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_url_source_parses_from_a_bare_string() {
        let toml = r#"
            [streams]
            front_door = "rtsp://192.168.1.10/stream1"
        "#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(
            config.streams["front_door"].urls(),
            vec!["rtsp://192.168.1.10/stream1".to_string()]
        );
    }

    #[test]
    fn multi_url_source_parses_from_an_array() {
        let toml = r#"
            [streams]
            front_door = ["rtsp://a/stream1", "rtsp://b/stream1"]
        "#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.streams["front_door"].urls().len(), 2);
    }

    #[test]
    fn defaults_are_sane_when_file_is_empty() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.api.listen, "127.0.0.1:1984");
        assert_eq!(config.rtsp.listen, "127.0.0.1:8554");
        assert!(config.streams.is_empty());
    }

    #[test]
    fn bitrate_accepts_uppercase_k_and_m_suffixes() {
        assert_eq!(parse_bitrate("512K"), Some(512_000));
        assert_eq!(parse_bitrate("2M"), Some(2_000_000));
        assert_eq!(parse_bitrate("1500"), Some(1500));
    }

    #[test]
    fn bitrate_rejects_lowercase_suffixes() {
        assert_eq!(parse_bitrate("512k"), None);
        assert_eq!(parse_bitrate("2m"), None);
    }
}
