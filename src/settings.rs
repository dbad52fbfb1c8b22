//! Editor settings persistence
//!
//! Settings are stored in a JSON file at the platform-appropriate config location:
//! - macOS: ~/Library/Application Support/binedit/settings.json
//! - Windows: %APPDATA%/binedit/settings.json
//! - Linux: ~/.config/binedit/settings.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::content::HandlingMode;
use crate::editor::DEFAULT_MAX_UNDO_STEPS;

/// Maximum number of recent files to track
const MAX_RECENT_FILES: usize = 10;

/// Editor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Backing used for newly opened documents
    pub default_handling_mode: HandlingMode,

    /// Maximum number of undo steps kept per session; `None` for unbounded
    pub max_undo_steps: Option<usize>,

    /// List of recently opened files (most recent first)
    pub recent_files: Vec<PathBuf>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_handling_mode: HandlingMode::Memory,
            max_undo_steps: Some(DEFAULT_MAX_UNDO_STEPS),
            recent_files: Vec::new(),
        }
    }
}

impl SessionSettings {
    /// Get the path to the settings file
    fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push("binedit");
            path.push("settings.json");
            path
        })
    }

    /// Load settings from disk, or return defaults if not found
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => {
                log::warn!("Could not determine config directory, using defaults");
                Self::default()
            }
        }
    }

    /// Load settings from `path`, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    log::warn!("Failed to parse settings file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("Failed to read settings file: {}", e);
                }
                Self::default()
            }
        }
    }

    /// Save settings to disk
    pub fn save(&self) {
        match Self::settings_path() {
            Some(path) => self.save_to(&path),
            None => log::warn!("Could not determine config directory, settings not saved"),
        }
    }

    /// Save settings to `path`, creating its directory
    pub fn save_to(&self, path: &Path) {
        // Ensure the config directory exists
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("Failed to create config directory: {}", e);
                return;
            }
        }

        match serde_json::to_string_pretty(self) {
            Ok(contents) => {
                if let Err(e) = std::fs::write(path, contents) {
                    log::warn!("Failed to write settings file: {}", e);
                } else {
                    log::info!("Saved settings to {}", path.display());
                }
            }
            Err(e) => {
                log::warn!("Failed to serialize settings: {}", e);
            }
        }
    }

    /// Add a file to the recent files list
    pub fn add_recent_file(&mut self, path: PathBuf) {
        // Remove if already in list (to move to front)
        self.recent_files.retain(|p| p != &path);

        self.recent_files.insert(0, path);
        self.recent_files.truncate(MAX_RECENT_FILES);
    }

    /// Get the recent files list
    pub fn recent_files(&self) -> &[PathBuf] {
        &self.recent_files
    }

    pub fn clear_recent_files(&mut self) {
        self.recent_files.clear();
    }
}
