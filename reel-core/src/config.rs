use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::error::ReelError;

pub const DEFAULT_ADMIN_USER: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ReelConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: 5,
        }
    }
}

/// Credentials guarding the admin surfaces.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AdminConfig {
    pub username: String,
    pub password: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            username: DEFAULT_ADMIN_USER.to_string(),
            password: DEFAULT_ADMIN_PASSWORD.to_string(),
        }
    }
}

impl AdminConfig {
    pub fn uses_default_password(&self) -> bool {
        self.password == DEFAULT_ADMIN_PASSWORD
    }
}

/// Static files served next to the API: the capture engine bundle, the
/// recorder snippet and the replay player.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AssetsConfig {
    pub dir: String,
    pub capture_script: String,
    pub recorder_script: String,
    pub player_script: String,
    pub player_css: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            dir: "./assets".to_string(),
            capture_script: "rrweb.min.js".to_string(),
            recorder_script: "recorder.js".to_string(),
            player_script: "rrweb-player.js".to_string(),
            player_css: "rrweb-player.css".to_string(),
        }
    }
}

/// Database location used when nothing is configured: `./data/sessions.db`
/// if a `./data` directory exists, otherwise `./sessions.db`.
pub fn default_database_url() -> String {
    if Path::new("./data").is_dir() {
        "sqlite://./data/sessions.db".to_string()
    } else {
        "sqlite://./sessions.db".to_string()
    }
}

/// Environment variables recognised for deployment compatibility, mapped to
/// the config keys they override.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("PORT", "http.port"),
    ("BASIC_AUTH_USER", "admin.username"),
    ("BASIC_AUTH_PASS", "admin.password"),
    ("RRWEB_JS_NAME", "assets.capture_script"),
    ("RECORDER_JS_NAME", "assets.recorder_script"),
    ("DATABASE_URL", "database.url"),
];

impl ReelConfig {
    /// Load defaults, then the optional TOML file at `path`, then `REEL__*`
    /// variables, then the legacy variables in [`LEGACY_ENV`].
    pub fn load(path: &str) -> Result<Self, ReelError> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    pub fn load_with_env<F>(path: &str, lookup: F) -> Result<Self, ReelError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("REEL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        for (var, key) in LEGACY_ENV {
            let value = lookup(var).filter(|v| !v.is_empty());
            builder = builder.set_override_option(*key, value)?;
        }

        Ok(builder.build()?.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_file() {
        let config = ReelConfig::load_with_env("/nonexistent/reel.toml", no_env).unwrap();
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.admin.username, "admin");
        assert!(config.admin.uses_default_password());
        assert_eq!(config.assets.capture_script, "rrweb.min.js");
        assert_eq!(config.assets.recorder_script, "recorder.js");
        assert!(config.database.url.ends_with("sessions.db"));
    }

    #[test]
    fn test_file_values_are_applied() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[http]\nport = 9191\n\n[admin]\nusername = \"ops\"\npassword = \"s3cret\"\n"
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = ReelConfig::load_with_env(&path, no_env).unwrap();
        assert_eq!(config.http.port, 9191);
        assert_eq!(config.admin.username, "ops");
        assert!(!config.admin.uses_default_password());
        // Untouched sections keep their defaults
        assert_eq!(config.http.host, "0.0.0.0");
    }

    #[test]
    fn test_legacy_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PORT", "7000"),
            ("BASIC_AUTH_PASS", "hunter2"),
            ("RRWEB_JS_NAME", "capture.js"),
            ("RECORDER_JS_NAME", "snippet.js"),
        ]);
        let config = ReelConfig::load_with_env("/nonexistent/reel.toml", |k| {
            env.get(k).map(|v| v.to_string())
        })
        .unwrap();

        assert_eq!(config.http.port, 7000);
        assert_eq!(config.admin.password, "hunter2");
        assert_eq!(config.admin.username, "admin");
        assert_eq!(config.assets.capture_script, "capture.js");
        assert_eq!(config.assets.recorder_script, "snippet.js");
    }

    #[test]
    fn test_empty_legacy_env_is_ignored() {
        let config =
            ReelConfig::load_with_env("/nonexistent/reel.toml", |k| match k {
                "BASIC_AUTH_PASS" => Some(String::new()),
                _ => None,
            })
            .unwrap();
        assert!(config.admin.uses_default_password());
    }
}
