use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::{
    net::IpAddr,
    path::{Path, PathBuf},
    time::Duration,
};

pub mod validation;

use validation::ConfigValidator;

const DEFAULT_CONFIG_FILE: &str = ".polyphon.toml";

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8081
}

fn default_program() -> String {
    "mplayer".to_string()
}

fn default_player_args() -> Vec<String> {
    vec!["-slave".into(), "-quiet".into(), "-idle".into()]
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_quit_timeout_ms() -> u64 {
    2000
}

fn default_cache_capacity() -> usize {
    1000
}

/// Command line arguments
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Remote control server for a slave-mode media player", long_about = None)]
pub struct Args {
    /// Path to the TOML configuration file [default: ~/.polyphon.toml]
    pub config: Option<PathBuf>,

    /// The network port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Music root directory, overrides the configuration file
    #[arg(short, long)]
    pub music: Option<PathBuf>,

    /// Verbose logging and no browse cache
    #[arg(short, long)]
    pub debug: bool,
}

/// Main application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub paths: PathsConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub radios: Vec<RadioConfig>,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            debug: false,
        }
    }
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of everything that can be browsed and played
    pub music: PathBuf,
    /// Directory holding the web client
    #[serde(rename = "static", default)]
    pub static_dir: Option<PathBuf>,
    #[serde(default)]
    pub logfile: Option<PathBuf>,
}

/// External player settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_player_args")]
    pub args: Vec<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_quit_timeout_ms")]
    pub quit_timeout_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_player_args(),
            poll_interval_ms: default_poll_interval_ms(),
            quit_timeout_ms: default_quit_timeout_ms(),
        }
    }
}

impl PlayerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn quit_timeout(&self) -> Duration {
        Duration::from_millis(self.quit_timeout_ms)
    }
}

/// Browse cache settings. Capacity 0 disables the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

/// A named internet radio stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioConfig {
    pub name: String,
    pub url: String,
}

impl AppConfig {
    /// Parse the command line, load the configuration file and apply overrides
    pub fn from_args() -> Result<Self> {
        let args = Args::parse();
        Self::load(&args)
    }

    /// Load the configuration selected by `args` and apply its overrides
    pub fn load(args: &Args) -> Result<Self> {
        let config_path = match &args.config {
            Some(path) => expand_home(path),
            None => dirs::home_dir()
                .map(|home| home.join(DEFAULT_CONFIG_FILE))
                .context("Cannot locate the home directory for the default config file")?,
        };

        if !config_path.exists() {
            anyhow::bail!("Config file \"{}\" not found", config_path.display());
        }

        let mut config = Self::load_from_file(&config_path)?;
        config.apply_args(args);
        config.resolve_paths()?;
        ConfigValidator::validate(&config)?;

        tracing::debug!("Loaded configuration from {}", config_path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file without validating it
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let content = std::fs::read_to_string(config_path.as_ref()).with_context(|| {
            format!("Failed to read config file: {}", config_path.as_ref().display())
        })?;

        Self::from_toml(&content).with_context(|| {
            format!("Failed to parse config file: {}", config_path.as_ref().display())
        })
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: AppConfig = toml::from_str(content)?;
        for radio in &mut config.radios {
            radio.url = strip_http_scheme(&radio.url).to_string();
        }
        Ok(config)
    }

    fn apply_args(&mut self, args: &Args) {
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(music) = &args.music {
            self.paths.music = music.clone();
        }
        if args.debug {
            self.server.debug = true;
        }
    }

    /// Expand `~` and canonicalise the music and static directories.
    pub fn resolve_paths(&mut self) -> Result<()> {
        let music = expand_home(&self.paths.music);
        self.paths.music = std::fs::canonicalize(&music)
            .with_context(|| format!("Path \"{}\" not found", music.display()))?;

        if let Some(static_dir) = &self.paths.static_dir {
            let static_dir = expand_home(static_dir);
            self.paths.static_dir = Some(
                std::fs::canonicalize(&static_dir)
                    .with_context(|| format!("Path \"{}\" not found", static_dir.display()))?,
            );
        }

        if let Some(logfile) = &self.paths.logfile {
            self.paths.logfile = Some(expand_home(logfile));
        }
        Ok(())
    }

    /// Effective browse cache capacity; debug mode disables caching
    pub fn cache_capacity(&self) -> usize {
        if self.server.debug {
            0
        } else {
            self.cache.capacity
        }
    }
}

/// Replace a leading `~` with the user's home directory
pub fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

/// Radio urls are stored without their scheme; `loadfile` adds it back
fn strip_http_scheme(url: &str) -> &str {
    url.strip_prefix("http://").unwrap_or(url)
}
