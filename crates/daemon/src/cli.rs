use std::path::PathBuf;

use clap::Parser;

use streamfs::Config;

/// Mount live video channels as a filesystem
#[derive(Parser, Debug, Clone)]
#[command(name = "streamfs", version, about)]
pub struct Cli {
    /// Directory to mount the channel filesystem on
    pub mountpoint: PathBuf,

    /// Text file with one channel name per line, loaded at startup
    pub channels_file: Option<PathBuf>,

    /// Config file (TOML). Defaults to <config dir>/streamfs/config.toml if present
    #[arg(long, env = "STREAMFS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Seconds a liveness answer is trusted
    #[arg(long, env = "STREAMFS_CACHE_TTL")]
    pub cache_ttl: Option<u64>,

    /// Seconds before a liveness probe is abandoned
    #[arg(long)]
    pub probe_timeout: Option<u64>,

    /// yt-dlp compatible program used to probe and fetch streams
    #[arg(long, env = "STREAMFS_YT_DLP")]
    pub yt_dlp: Option<String>,

    /// Browser whose cookies the fetcher uses ("none" to disable)
    #[arg(long)]
    pub cookies_from_browser: Option<String>,
}

impl Cli {
    /// Layer command-line overrides on top of file configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(ttl) = self.cache_ttl {
            config.cache_ttl_secs = ttl;
        }
        if let Some(timeout) = self.probe_timeout {
            config.probe_timeout_secs = timeout;
        }
        if let Some(program) = &self.yt_dlp {
            config.tools.program = program.clone();
        }
        if let Some(browser) = &self.cookies_from_browser {
            config.tools.cookies_from_browser = match browser.as_str() {
                "none" | "" => None,
                other => Some(other.to_string()),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_args() {
        let cli = Cli::try_parse_from(["streamfs", "/mnt/tv", "channels.txt"]).unwrap();
        assert_eq!(cli.mountpoint, PathBuf::from("/mnt/tv"));
        assert_eq!(cli.channels_file, Some(PathBuf::from("channels.txt")));
    }

    #[test]
    fn test_mountpoint_required() {
        assert!(Cli::try_parse_from(["streamfs"]).is_err());
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from([
            "streamfs",
            "/mnt/tv",
            "--cache-ttl",
            "60",
            "--cookies-from-browser",
            "none",
        ])
        .unwrap();

        let mut config = Config::default();
        cli.apply(&mut config);

        assert_eq!(config.cache_ttl_secs, 60);
        assert_eq!(config.tools.cookies_from_browser, None);
        assert_eq!(config.probe_timeout_secs, 5);
    }
}
