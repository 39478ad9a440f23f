//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Secrets (client secret, webhook secret, SMTP password) are loaded from
//! their env vars or `*_file` paths, never from the TOML body.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use common::Secret;
use serde::Deserialize;
use tracing::warn;

const CLIENT_SECRET_ENV: &str = "WEBEX_CLIENT_SECRET";
const WEBHOOK_SECRET_ENV: &str = "WEBEX_WEBHOOK_SECRET";
const SMTP_PASSWORD_ENV: &str = "SMTP_PASSWORD";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub webex: WebexConfig,
    pub smtp: SmtpConfig,
    pub spaces: Spaces,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Webex integration settings
#[derive(Debug, Deserialize)]
pub struct WebexConfig {
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Secret<String>,
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    /// Where Webex sends the user after consent (the `/oauth` route)
    pub redirect_uri: String,
    /// Public URL of the `/webhook` route, registered as the webhook target
    pub webhook_uri: String,
    #[serde(skip)]
    pub webhook_secret: Secret<String>,
    #[serde(default)]
    pub webhook_secret_file: Option<PathBuf>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_scopes")]
    pub scopes: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Persist the granted token pair here. Unset keeps tokens in memory only.
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

/// Outbound mail relay
#[derive(Debug, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: String,
    /// Sender address; defaults to `username`
    #[serde(default)]
    pub from: Option<String>,
    #[serde(skip)]
    pub password: Secret<String>,
    #[serde(default)]
    pub password_file: Option<PathBuf>,
    /// PNG embedded at the top of every email
    #[serde(default)]
    pub brand_image: Option<PathBuf>,
}

impl SmtpConfig {
    pub fn sender(&self) -> &str {
        self.from.as_deref().unwrap_or(&self.username)
    }
}

/// Space title → email recipients.
///
/// Titles are TOML table keys and therefore unique.
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct Spaces(BTreeMap<String, Vec<String>>);

impl Spaces {
    /// Recipients for a room, matched by exact title.
    pub fn recipients(&self, title: &str) -> Option<&[String]> {
        self.0.get(title).map(Vec::as_slice)
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Drop repeated addresses, keeping the first occurrence of each.
    fn dedup_recipients(&mut self) {
        for (title, recipients) in &mut self.0 {
            let before = recipients.len();
            let mut seen = std::collections::HashSet::new();
            recipients.retain(|r| seen.insert(r.clone()));
            if recipients.len() < before {
                warn!(
                    space = %title,
                    dropped = before - recipients.len(),
                    "duplicate recipients in config, each address is mailed once"
                );
            }
        }
    }

    fn validate(&self) -> common::Result<()> {
        if self.0.is_empty() {
            return Err(common::Error::Config(
                "[spaces] must map at least one space title to recipients".into(),
            ));
        }
        for (title, recipients) in &self.0 {
            if recipients.is_empty() {
                return Err(common::Error::Config(format!(
                    "space {title:?} has no recipients"
                )));
            }
            if let Some(bad) = recipients.iter().find(|r| !r.contains('@')) {
                return Err(common::Error::Config(format!(
                    "space {title:?} has an invalid recipient: {bad:?}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
impl FromIterator<(String, Vec<String>)> for Spaces {
    fn from_iter<I: IntoIterator<Item = (String, Vec<String>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn default_max_connections() -> usize {
    256
}

fn default_api_base_url() -> String {
    webex_auth::DEFAULT_API_BASE.to_string()
}

fn default_scopes() -> String {
    webex_auth::DEFAULT_SCOPES.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_smtp_port() -> u16 {
    587
}

fn require_http_url(field: &str, value: &str) -> common::Result<()> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(common::Error::Config(format!(
            "{field} must start with http:// or https://, got: {value}"
        )));
    }
    Ok(())
}

fn require_secret(
    name: &'static str,
    env: &'static str,
    file: Option<&Path>,
) -> common::Result<Secret<String>> {
    Secret::from_env_or_file(env, file)?.ok_or(common::Error::MissingSecret { name, env })
}

impl Config {
    /// Load configuration from a TOML file, then resolve secrets.
    ///
    /// Each secret comes from its env var, falling back to the matching
    /// `*_file` path. A secret with neither source is an error.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        require_http_url("redirect_uri", &config.webex.redirect_uri)?;
        require_http_url("webhook_uri", &config.webex.webhook_uri)?;
        require_http_url("api_base_url", &config.webex.api_base_url)?;

        if config.webex.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        config.spaces.dedup_recipients();
        config.spaces.validate()?;

        config.webex.client_secret = require_secret(
            "client_secret",
            CLIENT_SECRET_ENV,
            config.webex.client_secret_file.as_deref(),
        )?;
        config.webex.webhook_secret = require_secret(
            "webhook_secret",
            WEBHOOK_SECRET_ENV,
            config.webex.webhook_secret_file.as_deref(),
        )?;
        config.smtp.password = require_secret(
            "password",
            SMTP_PASSWORD_ENV,
            config.smtp.password_file.as_deref(),
        )?;

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("space-mailer.toml")
    }
}
