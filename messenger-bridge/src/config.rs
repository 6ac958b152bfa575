//! Configuration module for environment variable parsing.
//!
//! The four platform credentials are required; everything else has a default.
//! Values come from the environment first and fall back to an optional JSON
//! config file (`config/default.json` unless `CONFIG_FILE` says otherwise).

use std::{env, fmt, fs, io, path::Path};

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;
use url::Url;

/// Config file consulted when `CONFIG_FILE` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "config/default.json";

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_GRAPH_API_URL: &str = "https://graph.facebook.com/v2.6";
const DEFAULT_CATALOG_API_URL: &str = "http://www.trovamoda.com";
const DEFAULT_OUTBOUND_LINK_BASE: &str = "http://www.trovamoda.com/out/";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Errors that prevent the service from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required config value {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("failed to read config file {path}")]
    File {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Values accepted from the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    pub app_secret: Option<String>,
    pub validation_token: Option<String>,
    pub page_access_token: Option<String>,
    #[serde(rename = "serverURL")]
    pub server_url: Option<String>,
}

impl FileConfig {
    /// Load the config file, treating a missing file as empty.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::File {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Immutable application configuration, built once at startup.
#[derive(Clone)]
pub struct Config {
    /// App secret used to verify `x-hub-signature` headers
    pub app_secret: String,

    /// Token the platform echoes during webhook subscription
    pub validation_token: String,

    /// Page access token for the Graph API
    pub page_access_token: String,

    /// Public URL this server is reachable at
    pub server_url: String,

    /// Port for the web server to listen on
    pub port: u16,

    /// Graph API base, without trailing slash
    pub graph_api_url: String,

    /// Product catalog base, without trailing slash
    pub catalog_api_url: String,

    /// Prefix of the link sent after the greeting; the product id is appended
    pub outbound_link_base: String,

    /// Timeout applied to every outbound request
    pub request_timeout_ms: u64,
}

impl Config {
    /// Load configuration from the environment and the optional config file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = env::var("CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let file = FileConfig::load(Path::new(&path))?;
        Self::from_sources(|name| env::var(name).ok(), file)
    }

    /// Build a config from an arbitrary variable lookup plus file values.
    pub fn from_sources<F>(lookup: F, file: FileConfig) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_secret = required(&lookup, "MESSENGER_APP_SECRET", file.app_secret)?;
        let validation_token =
            required(&lookup, "MESSENGER_VALIDATION_TOKEN", file.validation_token)?;
        let page_access_token =
            required(&lookup, "MESSENGER_PAGE_ACCESS_TOKEN", file.page_access_token)?;
        let server_url = required(&lookup, "SERVER_URL", file.server_url)?;
        let server_url = parse_url("SERVER_URL", server_url)?;

        let graph_api_url = parse_url(
            "GRAPH_API_URL",
            optional(&lookup, "GRAPH_API_URL").unwrap_or_else(|| DEFAULT_GRAPH_API_URL.into()),
        )?;
        let catalog_api_url = parse_url(
            "CATALOG_API_URL",
            optional(&lookup, "CATALOG_API_URL").unwrap_or_else(|| DEFAULT_CATALOG_API_URL.into()),
        )?;

        Ok(Config {
            app_secret,
            validation_token,
            page_access_token,
            server_url,

            port: parse_or(&lookup, "PORT", DEFAULT_PORT),

            graph_api_url: graph_api_url.trim_end_matches('/').to_string(),

            catalog_api_url: catalog_api_url.trim_end_matches('/').to_string(),

            outbound_link_base: optional(&lookup, "OUTBOUND_LINK_BASE")
                .unwrap_or_else(|| DEFAULT_OUTBOUND_LINK_BASE.to_string()),

            request_timeout_ms: parse_or(&lookup, "REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS),
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("app_secret", &"<redacted>")
            .field("validation_token", &"<redacted>")
            .field("page_access_token", &"<redacted>")
            .field("server_url", &self.server_url)
            .field("port", &self.port)
            .field("graph_api_url", &self.graph_api_url)
            .field("catalog_api_url", &self.catalog_api_url)
            .field("outbound_link_base", &self.outbound_link_base)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

#[cfg(test)]
impl Config {
    /// Config pointing both collaborators at one local mock server.
    pub(crate) fn for_test(base_url: &str) -> Self {
        Config {
            app_secret: "test-app-secret".to_string(),
            validation_token: "test-validation-token".to_string(),
            page_access_token: "page-token".to_string(),
            server_url: "https://bot.example.com".to_string(),
            port: 0,
            graph_api_url: base_url.trim_end_matches('/').to_string(),
            catalog_api_url: base_url.trim_end_matches('/').to_string(),
            outbound_link_base: "http://www.trovamoda.com/out/".to_string(),
            request_timeout_ms: 2_000,
        }
    }
}

/// A trimmed, non-empty variable from the lookup.
fn optional<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<F>(
    lookup: &F,
    name: &'static str,
    fallback: Option<String>,
) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, name)
        .or_else(|| {
            fallback
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        })
        .ok_or(ConfigError::Missing(name))
}

fn parse_url(name: &'static str, value: String) -> Result<String, ConfigError> {
    match Url::parse(&value) {
        Ok(_) => Ok(value),
        Err(_) => Err(ConfigError::Invalid { name, value }),
    }
}

/// Parse an optional numeric variable, warning and falling back on garbage.
fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match optional(lookup, name) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(env_var = name, value = %raw, "Invalid numeric value, using default");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("MESSENGER_APP_SECRET", "secret"),
        ("MESSENGER_VALIDATION_TOKEN", "verify-me"),
        ("MESSENGER_PAGE_ACCESS_TOKEN", "page-token"),
        ("SERVER_URL", "https://bot.example.com"),
    ];

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_sources(lookup(REQUIRED), FileConfig::default()).unwrap();

        assert_eq!(config.app_secret, "secret");
        assert_eq!(config.port, 5000);
        assert_eq!(config.graph_api_url, "https://graph.facebook.com/v2.6");
        assert_eq!(config.catalog_api_url, "http://www.trovamoda.com");
        assert_eq!(config.outbound_link_base, "http://www.trovamoda.com/out/");
        assert_eq!(config.request_timeout_ms, 10_000);
    }

    #[test]
    fn test_each_required_value_is_enforced() {
        for (missing, _) in REQUIRED {
            let vars: Vec<_> = REQUIRED
                .iter()
                .copied()
                .filter(|(name, _)| name != missing)
                .collect();

            let err = Config::from_sources(lookup(&vars), FileConfig::default()).unwrap_err();
            assert!(
                matches!(err, ConfigError::Missing(name) if name == *missing),
                "expected Missing({missing}), got {err:?}"
            );
        }
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let mut vars = REQUIRED.to_vec();
        vars[1] = ("MESSENGER_VALIDATION_TOKEN", "   ");

        let err = Config::from_sources(lookup(&vars), FileConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("MESSENGER_VALIDATION_TOKEN")));
    }

    #[test]
    fn test_file_fills_gaps_and_env_wins() {
        let file: FileConfig = serde_json::from_str(
            r#"{
                "appSecret": "file-secret",
                "validationToken": "file-token",
                "pageAccessToken": "file-page-token",
                "serverURL": "https://file.example.com"
            }"#,
        )
        .unwrap();

        let config =
            Config::from_sources(lookup(&[("MESSENGER_APP_SECRET", "env-secret")]), file).unwrap();

        assert_eq!(config.app_secret, "env-secret");
        assert_eq!(config.validation_token, "file-token");
        assert_eq!(config.page_access_token, "file-page-token");
        assert_eq!(config.server_url, "https://file.example.com");
    }

    #[test]
    fn test_invalid_server_url_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars[3] = ("SERVER_URL", "not a url");

        let err = Config::from_sources(lookup(&vars), FileConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "SERVER_URL", .. }));
    }

    #[test]
    fn test_base_urls_trimmed_and_bad_numbers_defaulted() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("GRAPH_API_URL", "http://127.0.0.1:9000/"));
        vars.push(("PORT", "eighty"));
        vars.push(("REQUEST_TIMEOUT_MS", "250"));

        let config = Config::from_sources(lookup(&vars), FileConfig::default()).unwrap();

        assert_eq!(config.graph_api_url, "http://127.0.0.1:9000");
        assert_eq!(config.port, 5000);
        assert_eq!(config.request_timeout_ms, 250);
    }

    #[test]
    fn test_missing_config_file_is_empty() {
        let file = FileConfig::load(Path::new("definitely/not/here.json")).unwrap();
        assert!(file.app_secret.is_none());
        assert!(file.server_url.is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config::from_sources(lookup(REQUIRED), FileConfig::default()).unwrap();
        let debug = format!("{config:?}");

        assert!(!debug.contains("page-token"));
        assert!(!debug.contains("verify-me"));
        assert!(debug.contains("bot.example.com"));
    }
}
