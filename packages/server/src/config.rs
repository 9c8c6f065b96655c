//! Server configuration, populated from environment variables.

use std::net::SocketAddr;

use repolink::LinkOptions;
use thiserror::Error;

/// Invalid configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a valid socket address (e.g. 0.0.0.0:8080), got {value:?}")]
    InvalidAddress { var: &'static str, value: String },

    #[error("{var} must be a boolean (true/false/1/0), got {value:?}")]
    InvalidFlag { var: &'static str, value: String },
}

/// Runtime configuration for the server.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `REPOLINK_BIND` | `0.0.0.0:8080` | TCP socket address to listen on |
/// | `REPOLINK_BASE_URL` | `http://{bind}` | Base URL used for `absolute` links |
/// | `REPOLINK_OUTPUT_LINKS` | `true` | Emit `_links` blocks |
/// | `REPOLINK_RESOLVE_REFERENCES` | `false` | Embed reference targets |
/// | `REPOLINK_FULL_CHILDREN` | `false` | Expand grandchildren in children listings |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,

    /// Externally visible base URL, without a trailing slash.
    pub base_url: String,

    /// Process-wide projection options; requests may override them.
    pub link_options: LinkOptions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let bind_addr = SocketAddr::from(([0, 0, 0, 0], 8080));
        Self {
            bind_addr,
            base_url: format!("http://{bind_addr}"),
            link_options: LinkOptions::default(),
        }
    }
}

impl ServerConfig {
    /// Populate config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Populate config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let bind_addr = match lookup("REPOLINK_BIND") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidAddress {
                var: "REPOLINK_BIND",
                value,
            })?,
            None => defaults.bind_addr,
        };

        let base_url = lookup("REPOLINK_BASE_URL")
            .unwrap_or_else(|| format!("http://{bind_addr}"))
            .trim_end_matches('/')
            .to_string();

        let flag = |var: &'static str, default: bool| -> Result<bool, ConfigError> {
            match lookup(var) {
                None => Ok(default),
                Some(value) => match value.to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" => Ok(true),
                    "false" | "0" | "no" => Ok(false),
                    _ => Err(ConfigError::InvalidFlag { var, value }),
                },
            }
        };

        let link_options = LinkOptions {
            output_links: flag("REPOLINK_OUTPUT_LINKS", defaults.link_options.output_links)?,
            resolve_references: flag(
                "REPOLINK_RESOLVE_REFERENCES",
                defaults.link_options.resolve_references,
            )?,
            include_full_children: flag(
                "REPOLINK_FULL_CHILDREN",
                defaults.link_options.include_full_children,
            )?,
        };

        Ok(Self {
            bind_addr,
            base_url,
            link_options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.base_url, "http://0.0.0.0:8080");
    }

    #[test]
    fn base_url_follows_bind_unless_set() {
        let config = ServerConfig::from_lookup(lookup(&[("REPOLINK_BIND", "127.0.0.1:9000")])).unwrap();
        assert_eq!(config.base_url, "http://127.0.0.1:9000");

        let config = ServerConfig::from_lookup(lookup(&[
            ("REPOLINK_BIND", "127.0.0.1:9000"),
            ("REPOLINK_BASE_URL", "https://content.example.com/"),
        ]))
        .unwrap();
        assert_eq!(config.base_url, "https://content.example.com");
    }

    #[test]
    fn flags_parse_and_reject_garbage() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("REPOLINK_OUTPUT_LINKS", "false"),
            ("REPOLINK_RESOLVE_REFERENCES", "1"),
            ("REPOLINK_FULL_CHILDREN", "TRUE"),
        ]))
        .unwrap();
        assert!(!config.link_options.output_links);
        assert!(config.link_options.resolve_references);
        assert!(config.link_options.include_full_children);

        assert_eq!(
            ServerConfig::from_lookup(lookup(&[("REPOLINK_FULL_CHILDREN", "maybe")])),
            Err(ConfigError::InvalidFlag {
                var: "REPOLINK_FULL_CHILDREN",
                value: "maybe".into()
            })
        );
        assert!(matches!(
            ServerConfig::from_lookup(lookup(&[("REPOLINK_BIND", "nowhere")])),
            Err(ConfigError::InvalidAddress { .. })
        ));
    }
}
