use anyhow::{anyhow, Result};

use super::AppConfig;

/// Configuration validator for ensuring configuration integrity
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the entire application configuration
    pub fn validate(config: &AppConfig) -> Result<()> {
        Self::validate_server_config(config)?;
        Self::validate_paths_config(config)?;
        Self::validate_player_config(config)?;
        Self::validate_radios(config)?;
        Ok(())
    }

    fn validate_server_config(config: &AppConfig) -> Result<()> {
        if config.server.port == 0 {
            return Err(anyhow!("Server port cannot be 0"));
        }
        Ok(())
    }

    fn validate_paths_config(config: &AppConfig) -> Result<()> {
        let music = &config.paths.music;
        if !music.exists() {
            return Err(anyhow!("Music path does not exist: {}", music.display()));
        }
        if !music.is_dir() {
            return Err(anyhow!("Music path is not a directory: {}", music.display()));
        }

        if let Some(static_dir) = &config.paths.static_dir {
            if !static_dir.is_dir() {
                return Err(anyhow!(
                    "Static path is not a directory: {}",
                    static_dir.display()
                ));
            }
        }
        Ok(())
    }

    fn validate_player_config(config: &AppConfig) -> Result<()> {
        if config.player.program.trim().is_empty() {
            return Err(anyhow!("Player program cannot be empty"));
        }
        if config.player.poll_interval_ms == 0 {
            return Err(anyhow!("Player poll interval must be greater than 0"));
        }
        Ok(())
    }

    fn validate_radios(config: &AppConfig) -> Result<()> {
        for (index, radio) in config.radios.iter().enumerate() {
            if radio.name.trim().is_empty() {
                return Err(anyhow!("Radio #{} has an empty name", index + 1));
            }
            if radio.url.trim().is_empty() {
                return Err(anyhow!("Radio \"{}\" has an empty url", radio.name));
            }
        }
        Ok(())
    }
}
