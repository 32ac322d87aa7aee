pub mod browse;
pub mod cache;
pub mod chroot;
pub mod config;
pub mod error;
pub mod logging;
pub mod player;
pub mod web;

pub mod state {
    use crate::{
        browse::Browser,
        cache::DirectoryCache,
        chroot::PathGuard,
        config::AppConfig,
        player::{
            launcher::{MplayerLauncher, PlayerLauncher},
            PlaybackSupervisor,
        },
    };
    use anyhow::Context;
    use bytes::Bytes;
    use std::sync::Arc;

    /// Server context shared by every request handler
    #[derive(Clone)]
    pub struct AppState {
        pub config: Arc<AppConfig>,
        pub guard: Arc<PathGuard>,
        pub supervisor: Arc<PlaybackSupervisor>,
        pub browser: Arc<Browser>,
        /// Gzipped listing pages keyed by the raw browse query
        pub cache: Arc<DirectoryCache<Bytes>>,
    }

    impl AppState {
        /// Build the context with the configured external player
        pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
            let launcher = MplayerLauncher::new(
                config.player.program.clone(),
                config.player.args.clone(),
            );
            Self::with_launcher(config, Arc::new(launcher))
        }

        pub fn with_launcher(
            config: AppConfig,
            launcher: Arc<dyn PlayerLauncher>,
        ) -> anyhow::Result<Self> {
            let guard = Arc::new(PathGuard::new(&config.paths.music).with_context(|| {
                format!("Invalid music root: {}", config.paths.music.display())
            })?);

            let supervisor = PlaybackSupervisor::new(Arc::clone(&guard), launcher)
                .with_poll_interval(config.player.poll_interval())
                .with_quit_timeout(config.player.quit_timeout());

            let browser = Browser::new(Arc::clone(&guard), config.radios.clone());
            let cache = DirectoryCache::new(config.cache_capacity());

            Ok(Self {
                config: Arc::new(config),
                guard,
                supervisor: Arc::new(supervisor),
                browser: Arc::new(browser),
                cache: Arc::new(cache),
            })
        }
    }
}
