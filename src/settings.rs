use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

const APP_DIR: &str = "notyra";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("no config directory on this platform")]
    NoConfigDir,
    #[error("settings I/O: {0}")]
    Io(#[from] io::Error),
    #[error("settings JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditorLayoutMode {
    Editor,
    Preview,
    #[default]
    Split,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ja,
}

// App settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub root_dir: Option<String>,
    pub editor_layout_mode: EditorLayoutMode,
    pub theme: Theme,
    pub language: Language,
    pub last_opened_note_path: Option<String>,
    pub last_selected_folder: Option<String>,
    pub show_sidebar: bool,
    pub show_note_list: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root_dir: None,
            editor_layout_mode: EditorLayoutMode::default(),
            theme: Theme::default(),
            language: Language::default(),
            last_opened_note_path: None,
            last_selected_folder: None,
            show_sidebar: true,
            show_note_list: true,
        }
    }
}

// Settings file under the platform config dir
pub fn default_path() -> Result<PathBuf, SettingsError> {
    let dir = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
    Ok(dir.join(APP_DIR).join(SETTINGS_FILE))
}

// Load settings from disk
pub fn load(path: &Path) -> Settings {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            debug!("Using default settings, {} not read: {}", path.display(), e);
            return Settings::default();
        }
    };

    serde_json::from_str(&content).unwrap_or_else(|e| {
        warn!("Ignoring malformed settings {}: {}", path.display(), e);
        Settings::default()
    })
}

// Save settings to disk
pub fn save(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, content)?;
    Ok(())
}
