//! Configuration loading from disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::{CanonicalConfig, InternalDocument, UserDocument};
use crate::config::validation::{normalize, ConfigWarning};

pub const USER_CONFIG_FILE: &str = "config.toml";
pub const INTERNAL_CONFIG_FILE: &str = "preferences.toml";
pub const APP_DIR_NAME: &str = "mixbridge";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config.toml not found (searched: {searched:?})")]
    NotFound { searched: Vec<PathBuf> },

    #[error("failed to parse {}: {cause}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        cause: ParseCause,
    },
}

/// Why a user document that exists could not be turned into a config.
#[derive(Debug, Error)]
pub enum ParseCause {
    #[error("invalid TOML: {0}")]
    Format(#[from] toml::de::Error),

    #[error("read error: {0}")]
    Io(#[from] io::Error),
}

impl ConfigError {
    /// Whether the failure is about the document's syntax rather than I/O.
    pub fn is_format_related(&self) -> bool {
        matches!(
            self,
            ConfigError::Parse {
                cause: ParseCause::Format(_),
                ..
            }
        )
    }
}

/// Where to look for the two configuration documents.
#[derive(Debug, Clone)]
pub struct SourceLocator {
    search_dirs: Vec<PathBuf>,
    internal_path: Option<PathBuf>,
}

impl SourceLocator {
    pub fn new(search_dirs: Vec<PathBuf>, internal_path: Option<PathBuf>) -> Self {
        Self {
            search_dirs,
            internal_path,
        }
    }

    /// The standard search order: executable directory, working directory,
    /// then the per-user config directory (which also holds the internal
    /// document).
    pub fn from_environment() -> Self {
        let mut search_dirs = Vec::new();

        match std::env::current_exe() {
            Ok(exe) => {
                if let Some(dir) = exe.parent() {
                    search_dirs.push(dir.to_path_buf());
                }
            }
            Err(e) => tracing::debug!(error = %e, "Could not resolve executable path"),
        }

        match std::env::current_dir() {
            Ok(cwd) => search_dirs.push(cwd),
            Err(e) => tracing::debug!(error = %e, "Could not resolve working directory"),
        }

        let user_dir = dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME));
        if let Some(dir) = &user_dir {
            search_dirs.push(dir.clone());
        }

        Self {
            search_dirs,
            internal_path: user_dir.map(|dir| dir.join(INTERNAL_CONFIG_FILE)),
        }
    }

    /// Candidate user document paths, in search order.
    pub fn candidates(&self) -> Vec<PathBuf> {
        self.search_dirs
            .iter()
            .map(|dir| dir.join(USER_CONFIG_FILE))
            .collect()
    }

    /// First candidate that exists.
    pub fn locate_user_source(&self) -> Result<PathBuf, ConfigError> {
        let candidates = self.candidates();
        let found = candidates.iter().find(|path| path.is_file()).cloned();
        found.ok_or(ConfigError::NotFound {
            searched: candidates,
        })
    }

    pub fn internal_path(&self) -> Option<&Path> {
        self.internal_path.as_deref()
    }
}

/// Result of a successful load, before publication.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: CanonicalConfig,
    pub warnings: Vec<ConfigWarning>,
}

/// Read the user document (required) and the internal document (optional)
/// and merge them.
pub fn load_config(user_path: &Path, internal_path: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    if !user_path.is_file() {
        return Err(ConfigError::NotFound {
            searched: vec![user_path.to_path_buf()],
        });
    }

    let user = read_document::<UserDocument>(user_path).map_err(|cause| ConfigError::Parse {
        path: user_path.to_path_buf(),
        cause,
    })?;

    let internal = internal_path.and_then(|path| match read_document::<InternalDocument>(path) {
        Ok(document) => Some(document),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "No usable internal config, continuing without it");
            None
        }
    });

    let (config, warnings) = normalize(user, internal);
    Ok(LoadedConfig { config, warnings })
}

fn read_document<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ParseCause> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_search_order_first_match_wins() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        fs::write(second.path().join(USER_CONFIG_FILE), "").unwrap();

        let locator = SourceLocator::new(
            vec![first.path().to_path_buf(), second.path().to_path_buf()],
            None,
        );
        assert_eq!(
            locator.locate_user_source().unwrap(),
            second.path().join(USER_CONFIG_FILE)
        );

        fs::write(first.path().join(USER_CONFIG_FILE), "").unwrap();
        assert_eq!(
            locator.locate_user_source().unwrap(),
            first.path().join(USER_CONFIG_FILE)
        );
    }

    #[test]
    fn test_not_found_lists_candidates() {
        let dir = TempDir::new().unwrap();
        let locator = SourceLocator::new(vec![dir.path().to_path_buf()], None);

        match locator.locate_user_source() {
            Err(ConfigError::NotFound { searched }) => {
                assert_eq!(searched, vec![dir.path().join(USER_CONFIG_FILE)]);
            }
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_document_is_format_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(USER_CONFIG_FILE);
        fs::write(&path, "baud_rate = = 9600").unwrap();

        let err = load_config(&path, None).unwrap_err();
        assert!(err.is_format_related());
    }

    #[test]
    fn test_wrong_value_type_is_a_warning() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(USER_CONFIG_FILE);
        fs::write(&path, "invert_sliders = \"sometimes\"\nbaud_rate = \"115200\"").unwrap();

        let loaded = load_config(&path, None).unwrap();
        assert!(!loaded.config.invert_sliders);
        assert_eq!(loaded.config.serial.baud_rate, 115200);
        assert_eq!(loaded.warnings.len(), 1);
        assert_eq!(loaded.warnings[0].key, "invert_sliders");
    }

    #[test]
    fn test_broken_internal_document_is_ignored() {
        let dir = TempDir::new().unwrap();
        let user_path = dir.path().join(USER_CONFIG_FILE);
        let internal_path = dir.path().join(INTERNAL_CONFIG_FILE);
        fs::write(&user_path, "[slider_mapping]\n0 = \"master\"").unwrap();
        fs::write(&internal_path, "[[[").unwrap();

        let loaded = load_config(&user_path, Some(&internal_path)).unwrap();
        assert_eq!(loaded.config.slider_mapping.get(0), ["master"]);
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(USER_CONFIG_FILE);
        fs::write(&path, "theme = \"dark\"\nudp_port = 4000").unwrap();

        let loaded = load_config(&path, None).unwrap();
        assert_eq!(loaded.config.udp.port, 4000);
        assert!(loaded.warnings.is_empty());
    }
}
