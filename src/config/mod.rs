use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::error::ConfigError;

/// Number of samples per channel in each delivered frame
pub const DEFAULT_SAMPLES_PER_CHANNEL: usize = 2048;
/// Amount of data read from the physical bitstream on each read
pub const DEFAULT_CHUNK_SIZE: usize = 4096;
/// Number of frames buffered between the decode task and the consumer
pub const DEFAULT_FRAME_BUFFER: usize = 8;
/// Bytes scanned for the first page before a source is rejected
pub const DEFAULT_MAX_SYNC_BYTES: usize = 64 * 1024;

/// Tuning knobs for the streaming decoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub samples_per_channel: usize,
    pub chunk_size: usize,
    pub frame_buffer: usize,
    pub max_sync_bytes: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            samples_per_channel: DEFAULT_SAMPLES_PER_CHANNEL,
            chunk_size: DEFAULT_CHUNK_SIZE,
            frame_buffer: DEFAULT_FRAME_BUFFER,
            max_sync_bytes: DEFAULT_MAX_SYNC_BYTES,
        }
    }
}

impl DecoderConfig {
    pub fn with_samples_per_channel(samples_per_channel: usize) -> Self {
        Self {
            samples_per_channel,
            ..Self::default()
        }
    }

    /// Reject values that would stall or break the pipeline
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("samples_per_channel", self.samples_per_channel),
            ("chunk_size", self.chunk_size),
            ("frame_buffer", self.frame_buffer),
            ("max_sync_bytes", self.max_sync_bytes),
        ];
        for (field, value) in checks {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Player configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub preferred_device: Option<String>,
    pub log_level: String,
    pub decoder: DecoderConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            preferred_device: None,
            log_level: "warn".to_string(),
            decoder: DecoderConfig::default(),
        }
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    config: PlayerConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;
        let config = Self::load_config(&config_path).unwrap_or_default();

        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn get_config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn update_config<F>(&mut self, updater: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut PlayerConfig),
    {
        updater(&mut self.config);
        self.config.decoder.validate()?;
        self.save_config()
    }

    pub fn set_samples_per_channel(&mut self, samples_per_channel: usize) -> Result<(), ConfigError> {
        self.update_config(|config| config.decoder.samples_per_channel = samples_per_channel)
    }

    pub fn set_preferred_device(&mut self, device: Option<String>) -> Result<(), ConfigError> {
        self.config.preferred_device = device;
        self.save_config()
    }

    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.config = PlayerConfig::default();
        self.save_config()
    }

    fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::home_dir()
            .ok_or(ConfigError::ConfigDirNotFound)?
            .join(".config")
            .join("vorbis-player");

        Ok(config_dir.join("config.toml"))
    }

    fn load_config(path: &Path) -> Result<PlayerConfig, ConfigError> {
        if !path.exists() {
            return Ok(PlayerConfig::default());
        }

        let config_content = std::fs::read_to_string(path)
            .map_err(ConfigError::IoError)?;

        let config: PlayerConfig = toml::from_str(&config_content)
            .map_err(ConfigError::DeserializationError)?;

        config.decoder.validate()?;
        Ok(config)
    }

    fn save_config(&self) -> Result<(), ConfigError> {
        // Ensure the parent directory exists
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(ConfigError::IoError)?;
        }

        let config_content = toml::to_string_pretty(&self.config)
            .map_err(ConfigError::SerializationError)?;

        std::fs::write(&self.config_path, config_content)
            .map_err(ConfigError::IoError)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let config_manager = ConfigManager {
            config: PlayerConfig::default(),
            config_path,
        };

        (config_manager, temp_dir)
    }

    #[test]
    fn test_decoder_config_default() {
        let config = DecoderConfig::default();

        assert_eq!(config.samples_per_channel, 2048);
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.frame_buffer, 8);
        assert_eq!(config.max_sync_bytes, 65536);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_decoder_config_rejects_zero() {
        let config = DecoderConfig {
            frame_buffer: 0,
            ..DecoderConfig::default()
        };

        match config.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "frame_buffer"),
            other => panic!("Expected InvalidValue, got {:?}", other),
        }

        assert!(DecoderConfig::with_samples_per_channel(0).validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = PlayerConfig {
            decoder: DecoderConfig::with_samples_per_channel(1024),
            preferred_device: Some("Test Device".to_string()),
            log_level: "debug".to_string(),
        };

        let serialized = toml::to_string(&config).unwrap();
        let deserialized: PlayerConfig = toml::from_str(&serialized).unwrap();

        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: PlayerConfig = toml::from_str("[decoder]\nchunk_size = 8192\n").unwrap();

        assert_eq!(config.decoder.chunk_size, 8192);
        assert_eq!(config.decoder.samples_per_channel, DEFAULT_SAMPLES_PER_CHANNEL);
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.preferred_device, None);
    }

    #[test]
    fn test_save_and_load_config() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager.config.decoder.samples_per_channel = 512;
        config_manager.config.preferred_device = Some("Test Device".to_string());

        config_manager.save_config().unwrap();

        let loaded_config = ConfigManager::load_config(&config_manager.config_path).unwrap();

        assert_eq!(loaded_config.decoder.samples_per_channel, 512);
        assert_eq!(loaded_config.preferred_device, Some("Test Device".to_string()));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let temp_dir = TempDir::new().unwrap();
        let nonexistent_path = temp_dir.path().join("nonexistent.toml");

        let config = ConfigManager::load_config(&nonexistent_path).unwrap();

        assert_eq!(config, PlayerConfig::default());
    }

    #[test]
    fn test_load_invalid_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");

        fs::write(&config_path, "invalid toml content [[[").unwrap();

        match ConfigManager::load_config(&config_path) {
            Err(ConfigError::DeserializationError(_)) => {}
            other => panic!("Expected DeserializationError, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_load_config_with_zero_value() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("zero.toml");

        fs::write(&config_path, "[decoder]\nsamples_per_channel = 0\n").unwrap();

        assert!(matches!(
            ConfigManager::load_config(&config_path),
            Err(ConfigError::InvalidValue { field: "samples_per_channel", .. })
        ));
    }

    #[test]
    fn test_update_config() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager.update_config(|config| {
            config.decoder.frame_buffer = 16;
            config.log_level = "info".to_string();
        }).unwrap();

        let loaded_config = ConfigManager::load_config(&config_manager.config_path).unwrap();
        assert_eq!(loaded_config.decoder.frame_buffer, 16);
        assert_eq!(loaded_config.log_level, "info");
    }

    #[test]
    fn test_set_samples_per_channel_validates() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager.set_samples_per_channel(4096).unwrap();
        assert_eq!(config_manager.get_config().decoder.samples_per_channel, 4096);

        assert!(config_manager.set_samples_per_channel(0).is_err());
    }

    #[test]
    fn test_set_preferred_device() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager.set_preferred_device(Some("My DAC".to_string())).unwrap();
        assert_eq!(config_manager.config.preferred_device, Some("My DAC".to_string()));

        config_manager.set_preferred_device(None).unwrap();
        assert_eq!(config_manager.config.preferred_device, None);
    }

    #[test]
    fn test_reset_to_defaults() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager.config.decoder.chunk_size = 1;
        config_manager.config.preferred_device = Some("Custom Device".to_string());

        config_manager.reset_to_defaults().unwrap();

        assert_eq!(config_manager.config, PlayerConfig::default());
    }

    #[test]
    fn test_config_path_creation() {
        let temp_dir = TempDir::new().unwrap();
        let nested_path = temp_dir.path().join("nested").join("config").join("config.toml");

        let config_manager = ConfigManager {
            config: PlayerConfig::default(),
            config_path: nested_path.clone(),
        };

        config_manager.save_config().unwrap();

        assert!(nested_path.exists());
    }

    #[test]
    fn test_toml_format() {
        let config = PlayerConfig {
            decoder: DecoderConfig::default(),
            preferred_device: Some("AudioQuest DragonFly".to_string()),
            log_level: "warn".to_string(),
        };

        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[decoder]"));
        assert!(toml_string.contains("samples_per_channel = 2048"));
        assert!(toml_string.contains("chunk_size = 4096"));
        assert!(toml_string.contains("frame_buffer = 8"));
        assert!(toml_string.contains("AudioQuest DragonFly"));
    }
}
