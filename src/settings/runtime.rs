use crate::error::Result;
use crate::settings::pool::PoolOptions;
use crate::settings::throttle::ThrottleOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name used for the configuration inside the user config directory.
pub const CONFIG_FILE_NAME: &str = "netgate.toml";

/// Runtime control settings for the transport substrate.
///
/// Groups the bandwidth throttle limits and the task pool sizing. Every
/// field falls back to its default when missing from a configuration file.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Bandwidth throttle limits and cost model
    #[serde(default)]
    pub throttle: ThrottleOptions,

    /// Task pool sizing
    #[serde(default)]
    pub pool: PoolOptions,
}

impl Settings {
    /// Default location of the configuration file, if the platform has a
    /// user configuration directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("netgate").join(CONFIG_FILE_NAME))
    }

    /// Checks every section for unusable values.
    pub fn validate(&self) -> Result<()> {
        self.throttle.validate()
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Self>` - The loaded and validated configuration
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves current configuration to a TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path where the configuration will be saved
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        let mut file = fs::File::create(path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }

    /// Creates a configuration file with every value set to its default but
    /// commented out, as guidance for operators.
    ///
    /// # Arguments
    ///
    /// * `path` - Path where the template configuration will be saved
    pub fn create_default_config_file<P: AsRef<Path>>(path: P) -> Result<()> {
        let serialized = toml::to_string_pretty(&Self::default())?;

        let commented_out = serialized
            .lines()
            .map(|line| {
                if line.trim().is_empty() || line.starts_with('[') {
                    line.to_string()
                } else {
                    format!("# {}", line)
                }
            })
            .collect::<Vec<String>>()
            .join("\n");

        let mut file = fs::File::create(path)?;
        file.write_all(commented_out.as_bytes())?;
        Ok(())
    }
}
