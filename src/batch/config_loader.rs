use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::batch::content_filter::{ContentFilterError, FilterConfig};
use crate::batch::models::{SortOrder, TagQuery};
use crate::batch::orchestration::RetryConfig;

/// Name of the configuration file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

// Define error types for config loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(String),

    #[error("Invalid filter settings: {0}")]
    Filter(#[from] ContentFilterError),

    #[error("Failed to acquire lock: {0}")]
    LockError(String),
}

// Result type alias for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Config structs for config.toml
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Paths {
    pub root_directory: String,
    pub download_list_directory: String,
    pub database_file: String,
    pub log_directory: String,
    pub feed_directory: String,
    pub ignore_list: String,
    pub list_file: String,
    pub tags_list_file: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ListSettings {
    pub process_from_db: bool,
    /// 0 selects every member
    pub day_last_updated: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Retry {
    pub retry_limit: u32,
    pub backoff_secs: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Filter {
    pub date_diff: i64,
    pub r18_mode: bool,
    pub use_blacklist_tags: bool,
    pub blacklist_tags: Vec<String>,
    pub use_blacklist_titles: bool,
    pub blacklist_titles_regex: bool,
    pub blacklist_titles: Vec<String>,
    pub required_tags: Vec<String>,
    /// Consecutive already-downloaded ids before a listing is abandoned, 0 disables
    pub check_limit: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Tags {
    pub start_page: u32,
    pub end_page: u32,
    pub wildcard: bool,
    pub sort_order: SortOrder,
    pub bookmark_count: Option<u32>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Logging {
    pub log_level: String,
    pub log_format: String,
    pub log_to_file: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub paths: Paths,
    pub list: ListSettings,
    pub retry: Retry,
    pub filter: Filter,
    pub tags: Tags,
    pub logging: Logging,
}

// Default implementation for AppConfig
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            paths: Paths {
                root_directory: "./downloads".to_string(),
                download_list_directory: ".".to_string(),
                database_file: "./data/members.sqlite".to_string(),
                log_directory: "./logs".to_string(),
                feed_directory: "./feeds".to_string(),
                ignore_list: "ignore_list.txt".to_string(),
                list_file: "list.txt".to_string(),
                tags_list_file: "tags.txt".to_string(),
            },
            list: ListSettings {
                process_from_db: false,
                day_last_updated: 0,
            },
            retry: Retry {
                retry_limit: 3,
                backoff_secs: 2.0,
            },
            filter: Filter {
                date_diff: 0,
                r18_mode: false,
                use_blacklist_tags: false,
                blacklist_tags: Vec::new(),
                use_blacklist_titles: false,
                blacklist_titles_regex: false,
                blacklist_titles: Vec::new(),
                required_tags: Vec::new(),
                check_limit: 0,
            },
            tags: Tags {
                start_page: 1,
                end_page: 0,
                wildcard: true,
                sort_order: SortOrder::DateD,
                bookmark_count: None,
                start_date: None,
                end_date: None,
            },
            logging: Logging {
                log_level: "info".to_string(),
                log_format: "text".to_string(),
                log_to_file: true,
            },
        }
    }
}

impl AppConfig {
    /// Build the validated filter settings, compiling title patterns
    pub fn filter_config(&self) -> ConfigResult<FilterConfig> {
        let filter = &self.filter;
        let config = FilterConfig::new(
            filter.date_diff,
            filter.r18_mode,
            filter.use_blacklist_tags,
            filter.blacklist_tags.iter().cloned().collect(),
            filter.use_blacklist_titles,
            filter.blacklist_titles_regex,
            filter.blacklist_titles.clone(),
        )?;
        Ok(config)
    }

    /// Retry settings for the orchestrator
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            retry_limit: self.retry.retry_limit,
            backoff_secs: self.retry.backoff_secs,
        }
    }

    /// Early-stop limit for the dedup gate
    pub fn check_limit(&self) -> Option<usize> {
        match self.filter.check_limit {
            0 => None,
            limit => Some(limit),
        }
    }

    /// Tag query carrying the configured paging and filter parameters
    pub fn tag_query(&self, tags: impl Into<String>) -> TagQuery {
        TagQuery {
            tags: tags.into(),
            start_page: self.tags.start_page.max(1),
            end_page: self.tags.end_page,
            wildcard: self.tags.wildcard,
            sort_order: self.tags.sort_order,
            bookmark_count: self.tags.bookmark_count,
            start_date: self.tags.start_date,
            end_date: self.tags.end_date,
            member_id: None,
        }
    }

    /// Full path of a list file inside the download list directory
    pub fn list_path(&self, list_name: &str) -> PathBuf {
        Path::new(&self.paths.download_list_directory).join(list_name)
    }
}

// Config manager to handle the configuration file
pub struct ConfigManager {
    app_config: Arc<RwLock<AppConfig>>,
    config_dir: PathBuf,
}

impl ConfigManager {
    // Create a new ConfigManager instance
    pub fn new(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        // Create the directory if it doesn't exist
        if !config_dir.exists() {
            info!("Creating config directory: {}", config_dir.display());
            fs::create_dir_all(&config_dir)?;
        }

        let app_config = Self::load_app_config(&config_dir)?;

        let manager = Self {
            app_config: Arc::new(RwLock::new(app_config)),
            config_dir,
        };

        manager.create_default_config()?;

        Ok(manager)
    }

    // Load app config from config.toml
    fn load_app_config(config_dir: &Path) -> ConfigResult<AppConfig> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            warn!("Config file not found: {}", config_path.display());
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&config_path)?;
        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                error!("Failed to parse {}: {}", CONFIG_FILE_NAME, e);
                info!("Backing up old config and creating new one with default values");

                if let Err(backup_err) = fs::rename(&config_path, config_path.with_extension("toml.backup")) {
                    warn!("Failed to backup old config: {}", backup_err);
                }

                let default_config = AppConfig::default();
                let toml_string = toml::to_string_pretty(&default_config)
                    .map_err(|e| ConfigError::TomlSer(e.to_string()))?;
                fs::write(&config_path, toml_string)?;
                info!("Created new {} with default values", CONFIG_FILE_NAME);

                Ok(default_config)
            }
        }
    }

    // Get app config
    pub fn get_app_config(&self) -> ConfigResult<AppConfig> {
        self.app_config
            .read()
            .map_err(|e| ConfigError::LockError(e.to_string()))
            .map(|config| config.clone())
    }

    // Save app config to file
    pub fn save_app_config(&self, config: &AppConfig) -> ConfigResult<()> {
        let config_path = self.config_dir.join(CONFIG_FILE_NAME);
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigError::TomlSer(e.to_string()))?;
        fs::write(&config_path, toml_string)?;

        let mut app_config = self.app_config
            .write()
            .map_err(|e| ConfigError::LockError(e.to_string()))?;
        *app_config = config.clone();

        Ok(())
    }

    // Write config.toml with defaults if it doesn't exist yet
    pub fn create_default_config(&self) -> ConfigResult<()> {
        let config_path = self.config_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            let default_config = AppConfig::default();
            self.save_app_config(&default_config)?;
            info!("Wrote default config to {}", config_path.display());
        }

        Ok(())
    }
}

// Helper function to create a ConfigManager instance
pub fn init_config(config_dir: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
    Ok(Arc::new(ConfigManager::new(config_dir)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_config_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new(dir.path()).unwrap();

        assert!(dir.path().join(CONFIG_FILE_NAME).exists());
        let config = manager.get_app_config().unwrap();
        assert_eq!(config.retry.retry_limit, 3);
        assert_eq!(config.paths.ignore_list, "ignore_list.txt");
    }

    #[test]
    fn test_saved_config_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new(dir.path()).unwrap();

        let mut config = manager.get_app_config().unwrap();
        config.filter.r18_mode = true;
        config.filter.blacklist_tags = vec!["gore".to_string()];
        config.tags.sort_order = SortOrder::PopularD;
        manager.save_app_config(&config).unwrap();

        let reloaded = ConfigManager::new(dir.path()).unwrap().get_app_config().unwrap();
        assert!(reloaded.filter.r18_mode);
        assert_eq!(reloaded.filter.blacklist_tags, vec!["gore".to_string()]);
        assert_eq!(reloaded.tags.sort_order, SortOrder::PopularD);
    }

    #[test]
    fn test_malformed_config_is_backed_up_and_replaced() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "this is = [not toml").unwrap();

        let manager = ConfigManager::new(dir.path()).unwrap();

        assert!(dir.path().join("config.toml.backup").exists());
        assert_eq!(manager.get_app_config().unwrap().retry.backoff_secs, 2.0);
    }

    #[test]
    fn test_invalid_title_pattern_is_rejected() {
        let mut config = AppConfig::default();
        config.filter.use_blacklist_titles = true;
        config.filter.blacklist_titles_regex = true;
        config.filter.blacklist_titles = vec!["(unclosed".to_string()];

        assert!(matches!(config.filter_config(), Err(ConfigError::Filter(_))));
    }

    #[test]
    fn test_check_limit_zero_disables_early_stop() {
        let mut config = AppConfig::default();
        assert_eq!(config.check_limit(), None);
        config.filter.check_limit = 5;
        assert_eq!(config.check_limit(), Some(5));
    }

    #[test]
    fn test_tag_query_uses_configured_paging() {
        let mut config = AppConfig::default();
        config.tags.start_page = 0;
        config.tags.end_page = 4;
        config.tags.bookmark_count = Some(100);

        let query = config.tag_query("landscape");
        assert_eq!(query.start_page, 1);
        assert_eq!(query.end_page, 4);
        assert_eq!(query.bookmark_count, Some(100));
        assert_eq!(query.member_id, None);
    }
}
