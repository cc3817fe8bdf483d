use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::bail;
use log::debug;

use crate::{capability::FileFilter, sync::DEFAULT_API_URL};

const BASE_CONFIG_FILE: &str = "file_workspace.toml";
pub const API_URL_ENV: &str = "FILE_WORKSPACE_API_URL";

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    pub autosave_debounce_ms: u64,
    pub text_extensions: Vec<String>,
    pub api_url: Option<String>,
    pub remote_sync: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            autosave_debounce_ms: 500,
            text_extensions: vec!["txt".to_string()],
            api_url: None,
            remote_sync: false,
        }
    }
}

impl AppSettings {
    fn get_config_file_path() -> anyhow::Result<PathBuf> {
        match dirs::config_dir() {
            Some(directory) => Ok(directory.join(BASE_CONFIG_FILE)),
            None => bail!("Config path not found"),
        }
    }

    /// Settings from `config`, or from the config directory when it is `None`,
    /// with the API address taken from the environment when set there.
    pub fn load(config: Option<&Path>) -> anyhow::Result<Self> {
        let settings = match config {
            Some(path) => Self::load_from_path(path)?,
            None => Self::load_from_disk()?,
        };
        Ok(settings.with_api_url_override(std::env::var(API_URL_ENV).ok()))
    }

    /// Defaults when there is no config file yet. Nothing is written back.
    pub fn load_from_disk() -> anyhow::Result<Self> {
        let settings_file_path = Self::get_config_file_path()?;
        if settings_file_path.exists() {
            Self::load_from_path(&settings_file_path)
        } else {
            debug!("No settings file at {}", settings_file_path.display());
            Ok(Self::default())
        }
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        debug!("Loading settings from {}", path.as_ref().display());
        let mut settings_file = File::open(path)?;
        let mut toml = String::new();
        settings_file.read_to_string(&mut toml)?;
        Self::from_toml_str(&toml)
    }

    pub fn from_toml_str(toml: &str) -> anyhow::Result<Self> {
        let settings: Self = toml::from_str(toml)?;
        if settings.text_extensions.is_empty() {
            bail!("text_extensions can't be empty");
        }
        Ok(settings)
    }

    /// Writes to the config directory and returns the file written.
    pub fn save_to_disk(&self) -> anyhow::Result<PathBuf> {
        let path = Self::get_config_file_path()?;
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        debug!("Saving settings to {}", path.as_ref().display());
        let mut file = File::create(path)?;
        let toml = toml::to_string(&self)?;
        file.write_all(toml.as_bytes())?;
        Ok(())
    }

    /// Non-empty values replace the configured API address.
    pub fn with_api_url_override(mut self, api_url: Option<String>) -> Self {
        if let Some(url) = api_url.filter(|url| !url.trim().is_empty()) {
            self.api_url = Some(url);
        }
        self
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }

    pub fn file_filter(&self) -> FileFilter {
        FileFilter::text(self.text_extensions.as_slice())
    }

    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }
}
