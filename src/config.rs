//! Native host configuration.
//!
//! Read from `config.json` in the platform config directory, or from the file
//! named by `SITEWARDEN_CONFIG`. A missing file means defaults.

use directories::ProjectDirs;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::InitError;

pub const CONFIG_ENV: &str = "SITEWARDEN_CONFIG";
const DEFAULT_BLOCK_PAGE: &str = "chrome-extension://sitewarden/blocked.html";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostConfig {
    /// Page blocked navigations are redirected to. Derived from the calling
    /// extension's origin when absent.
    pub block_page_url: Option<String>,
    /// How often due timers are checked.
    pub tick_interval_secs: u64,
    /// Local hour of the daily summary.
    pub daily_summary_hour: u32,
    pub database_path: Option<PathBuf>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            block_page_url: None,
            tick_interval_secs: 5,
            daily_summary_hour: 21,
            database_path: None,
        }
    }
}

fn project_dirs() -> Result<ProjectDirs, InitError> {
    ProjectDirs::from("com", "sitewarden", "SiteWarden").ok_or(InitError::NoProjectDirs)
}

impl HostConfig {
    /// Load from `SITEWARDEN_CONFIG` or the default location.
    pub fn load() -> Result<Self, InitError> {
        let path = match std::env::var_os(CONFIG_ENV) {
            Some(path) => PathBuf::from(path),
            None => project_dirs()?.config_dir().join("config.json"),
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, InitError> {
        let config_error = |source: Box<dyn std::error::Error + Send + Sync>| InitError::Config {
            path: path.display().to_string(),
            source,
        };

        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|e| config_error(e.into()))?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| config_error(e.into()))?;

        if config.daily_summary_hour > 23 {
            return Err(config_error("dailySummaryHour must be 0-23".into()));
        }
        if config.tick_interval_secs == 0 {
            return Err(config_error("tickIntervalSecs must be positive".into()));
        }
        Ok(config)
    }

    /// Database location, creating its directory when needed.
    pub fn database_path(&self) -> Result<PathBuf, InitError> {
        let path = match &self.database_path {
            Some(path) => path.clone(),
            None => project_dirs()?.data_dir().join("sitewarden.db"),
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(InitError::DataDirCreation)?;
        }
        Ok(path)
    }

    /// Resolve the block page: configured URL, else `blocked.html` under the
    /// caller's origin, else a placeholder extension URL.
    pub fn block_page(&self, caller_origin: Option<&str>) -> Result<Url, InitError> {
        if let Some(configured) = &self.block_page_url {
            return Ok(Url::parse(configured)?);
        }
        match caller_origin.and_then(|origin| Url::parse(origin).ok()) {
            Some(origin) => Ok(origin.join("blocked.html")?),
            None => Ok(Url::parse(DEFAULT_BLOCK_PAGE)?),
        }
    }
}
