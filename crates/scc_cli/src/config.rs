//! Configuration file support for scc.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags (`--token`, `--provider`)
//! 2. Environment variables (prefixed with `SCC_`, sections split by `__`,
//!    e.g. `SCC_GITHUB__TOKEN`, `SCC_SOURCE__WAIT_TAG_TIMEOUT_SECS`)
//! 3. Local config file (./scc.toml)
//! 4. XDG config file (~/.config/scc/config.toml)
//! 5. Built-in defaults
//!
//! Example config file:
//! ```toml
//! [github]
//! token = "ghp_..."  # or use SCC_GITHUB__TOKEN env var
//!
//! [gitlab]
//! token = "glpat-..."  # or use SCC_GITLAB__TOKEN env var
//! token_type = ""      # "bearer" for OAuth tokens
//!
//! [source]
//! gitlab_url = "https://gitlab.example.com"
//! create_repo_timeout_secs = 30
//! wait_tag_timeout_secs = 20
//! rate_limit_timeout_secs = 120
//! rate_limit_retry_count = 5
//! ```

use std::path::PathBuf;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use scc::{AccessToken, SourceConfig, SourceKind};
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// GitHub credentials.
    pub github: ProviderConfig,
    /// GitLab credentials.
    pub gitlab: ProviderConfig,
    /// Endpoints, timeouts and retry budgets passed to the provider facades.
    pub source: SourceConfig,
}

/// Credentials for one provider.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub token: Option<String>,
    /// OAuth token type; empty for personal access tokens.
    pub token_type: String,
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// A config that fails to build or deserialize is logged and replaced by
    /// the defaults.
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = Self::default_config_path()
            && path.exists()
        {
            tracing::debug!("Loading config from {:?}", path);
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        let local_config = PathBuf::from("scc.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./scc.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("SCC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    /// Get the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "scc").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    fn provider(&self, kind: SourceKind) -> &ProviderConfig {
        match kind {
            SourceKind::GitHub => &self.github,
            SourceKind::GitLab => &self.gitlab,
        }
    }

    /// Token for `kind`, preferring `flag` over the configured one.
    pub fn access_token(&self, kind: SourceKind, flag: Option<String>) -> Option<AccessToken> {
        let provider = self.provider(kind);
        let token = flag
            .or_else(|| provider.token.clone())
            .filter(|token| !token.is_empty())?;
        Some(AccessToken::new(token, provider.token_type.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(content: &str) -> Config {
        ConfigBuilder::builder()
            .add_source(config::File::from_str(content, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.github.token.is_none());
        assert!(config.gitlab.token.is_none());
        assert_eq!(config.source, SourceConfig::default());
    }

    #[test]
    fn test_config_builder_with_toml_string() {
        let config = from_toml(
            r#"
            [github]
            token = "ghp_test123"

            [gitlab]
            token = "glpat-abc"
            token_type = "bearer"

            [source]
            gitlab_url = "https://git.example.com"
            wait_tag_timeout_secs = 5
            "#,
        );

        assert_eq!(config.github.token.as_deref(), Some("ghp_test123"));
        assert_eq!(config.gitlab.token_type, "bearer");
        assert_eq!(config.source.gitlab_url, "https://git.example.com");
        assert_eq!(config.source.wait_tag_timeout_secs, 5);
        assert_eq!(config.source.create_repo_timeout_secs, 30);
    }

    #[test]
    fn test_config_unknown_fields_ignored() {
        let config = from_toml(
            r#"
            [github]
            token = "ghp_x"
            unknown = true

            [extra]
            value = 1
            "#,
        );
        assert_eq!(config.github.token.as_deref(), Some("ghp_x"));
    }

    #[test]
    fn test_flag_token_wins_over_config() {
        let config = from_toml(
            r#"
            [gitlab]
            token = "glpat-config"
            token_type = "oauth"
            "#,
        );

        let token = config
            .access_token(SourceKind::GitLab, Some("glpat-flag".to_string()))
            .expect("token");
        assert_eq!(token.token, "glpat-flag");
        assert!(token.is_oauth());

        let token = config
            .access_token(SourceKind::GitLab, None)
            .expect("token");
        assert_eq!(token.token, "glpat-config");

        assert!(config.access_token(SourceKind::GitHub, None).is_none());
        assert!(
            config
                .access_token(SourceKind::GitHub, Some(String::new()))
                .is_none()
        );
    }

    #[test]
    fn test_default_config_path_ends_with_config_toml() {
        if let Some(path) = Config::default_config_path() {
            assert!(path.ends_with("config.toml"));
        }
    }
}
