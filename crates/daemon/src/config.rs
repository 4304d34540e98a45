//! Runtime configuration
//!
//! Everything has a default, so the filesystem runs without a config file.
//! A TOML file may override any subset of fields:
//!
//! ```toml
//! cache_ttl_secs = 120
//!
//! [tools]
//! program = "/usr/local/bin/yt-dlp"
//! cookies_from_browser = "chromium"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::liveness::LivenessCacheConfig;
use crate::tools::ToolCommand;

pub const CONFIG_DIR_NAME: &str = "streamfs";
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How long a liveness answer is trusted
    pub cache_ttl_secs: u64,
    /// Upper bound on one liveness probe
    pub probe_timeout_secs: u64,
    /// Kernel attribute/entry cache TTL
    pub attr_ttl_secs: u64,
    /// Grace period between SIGTERM and SIGKILL for released streams
    pub kill_grace_secs: u64,
    /// Maximum number of channels held in the liveness cache
    pub max_cached_channels: u64,
    pub tools: ToolsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            probe_timeout_secs: 5,
            attr_ttl_secs: 1,
            kill_grace_secs: 5,
            max_cached_channels: 10_000,
            tools: ToolsConfig::default(),
        }
    }
}

/// How the external probe and fetch tools are invoked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// yt-dlp compatible program
    pub program: String,
    /// Channel page URL, `{channel}` is replaced by the channel name
    pub url_template: String,
    /// Browser whose cookie store the fetcher authenticates with
    pub cookies_from_browser: Option<String>,
    /// Extra arguments appended to the fetch command before `-o -`
    pub extra_fetch_args: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_string(),
            url_template: "https://www.twitch.tv/{channel}".to_string(),
            cookies_from_browser: Some("firefox".to_string()),
            extra_fetch_args: Vec::new(),
        }
    }
}

impl ToolsConfig {
    /// `<program> --quiet --no-warnings --print is_live <url>`
    pub fn probe_command(&self) -> ToolCommand {
        ToolCommand::new(
            self.program.clone(),
            ["--quiet", "--no-warnings", "--print", "is_live", "{url}"],
        )
        .with_url_template(self.url_template.clone())
    }

    /// `<program> <url> [--cookies-from-browser <browser>] [extra...] -o -`
    pub fn fetch_command(&self) -> ToolCommand {
        let mut args = vec!["{url}".to_string()];
        if let Some(browser) = &self.cookies_from_browser {
            args.push("--cookies-from-browser".to_string());
            args.push(browser.clone());
        }
        args.extend(self.extra_fetch_args.iter().cloned());
        args.push("-o".to_string());
        args.push("-".to_string());

        ToolCommand::new(self.program.clone(), args).with_url_template(self.url_template.clone())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl Config {
    /// Load a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `explicit` if given (it must exist), otherwise the default config
    /// file if present, otherwise built-in defaults
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::info!(path = %path.display(), "using config file");
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// `<config dir>/streamfs/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn attr_ttl(&self) -> Duration {
        Duration::from_secs(self.attr_ttl_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.kill_grace_secs)
    }

    pub fn liveness(&self) -> LivenessCacheConfig {
        LivenessCacheConfig {
            ttl: Duration::from_secs(self.cache_ttl_secs),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            max_channels: self.max_cached_channels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        let liveness = config.liveness();

        assert_eq!(liveness.ttl, Duration::from_secs(300));
        assert_eq!(liveness.probe_timeout, Duration::from_secs(5));
        assert_eq!(config.tools.program, "yt-dlp");
    }

    #[test]
    fn test_partial_file() {
        let config: Config = toml::from_str(
            r#"
            cache_ttl_secs = 60

            [tools]
            cookies_from_browser = "chromium"
            "#,
        )
        .unwrap();

        assert_eq!(config.cache_ttl_secs, 60);
        assert_eq!(config.probe_timeout_secs, 5);
        assert_eq!(config.tools.program, "yt-dlp");
        assert_eq!(config.tools.cookies_from_browser.as_deref(), Some("chromium"));
    }

    #[test]
    fn test_probe_command() {
        let tools = ToolsConfig::default();
        assert_eq!(
            tools.probe_command().render_args("chan"),
            vec![
                "--quiet",
                "--no-warnings",
                "--print",
                "is_live",
                "https://www.twitch.tv/chan"
            ]
        );
    }

    #[test]
    fn test_fetch_command() {
        let tools = ToolsConfig::default();
        assert_eq!(
            tools.fetch_command().render_args("chan"),
            vec![
                "https://www.twitch.tv/chan",
                "--cookies-from-browser",
                "firefox",
                "-o",
                "-"
            ]
        );

        let tools = ToolsConfig {
            cookies_from_browser: None,
            extra_fetch_args: vec!["--format".to_string(), "best".to_string()],
            ..ToolsConfig::default()
        };
        assert_eq!(
            tools.fetch_command().render_args("chan"),
            vec!["https://www.twitch.tv/chan", "--format", "best", "-o", "-"]
        );
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "probe_timeout_secs = 2").unwrap();

        let config = Config::discover(Some(file.path())).unwrap();
        assert_eq!(config.probe_timeout_secs, 2);
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cache_ttl_secs = \"soon\"").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
