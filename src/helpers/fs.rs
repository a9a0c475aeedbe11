//! File System Utilities
//!
//! Platform directories for the config file and the log files.

use crate::error::{Error, Result};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("io", "vitapad", "vitapad-gui").ok_or_else(|| Error::Invalid {
        message: "Could not determine project directories".to_string(),
    })
}

fn ensure_dir(dir: &Path) -> Result<PathBuf> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    Ok(dir.to_path_buf())
}

/// Get or create the application's configuration directory
///
/// Platform-specific locations:
/// - **Linux**: `~/.config/vitapad-gui/` or `$XDG_CONFIG_HOME/vitapad-gui/`
/// - **macOS**: `~/Library/Application Support/io.vitapad.vitapad-gui/`
/// - **Windows**: `C:\Users\<User>\AppData\Roaming\vitapad\vitapad-gui\config\`
pub fn get_or_create_config_dir() -> Result<PathBuf> {
    ensure_dir(project_dirs()?.config_dir())
}

/// Get or create the data directory (log files)
pub fn get_or_create_data_dir() -> Result<PathBuf> {
    ensure_dir(project_dirs()?.data_dir())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_dir_creates_nested() {
        let root = std::env::temp_dir().join(format!("vitapad-gui-fs-{}", std::process::id()));
        let nested = root.join("a").join("b");

        let created = ensure_dir(&nested).expect("create");
        assert!(created.is_dir());
        // Second call is a no-op
        assert_eq!(ensure_dir(&nested).expect("exists"), nested);

        let _ = fs::remove_dir_all(&root);
    }
}
