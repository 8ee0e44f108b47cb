//! Platform definition loading from TOML files.
//!
//! This module handles loading platform definitions from the
//! `platform-definitions/` directory. Unlike a best-effort cache refresh,
//! registry loading is strict: a definition that fails to parse or validate
//! is a configuration error and aborts startup.

use crate::{
    definition::PlatformDefinition,
    error::{PlatformError, Result},
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tradeveil_core::PlatformId;

/// Loader for platform definitions from TOML files.
pub struct PlatformLoader {
    /// Base directory containing platform definitions
    definitions_dir: PathBuf,
}

impl PlatformLoader {
    /// Create a new loader with the given definitions directory.
    ///
    /// # Errors
    /// Returns error if the directory doesn't exist.
    pub fn new(definitions_dir: impl Into<PathBuf>) -> Result<Self> {
        let definitions_dir = definitions_dir.into();

        if !definitions_dir.is_dir() {
            return Err(PlatformError::DirectoryNotFound {
                path: definitions_dir.display().to_string(),
            });
        }

        Ok(Self { definitions_dir })
    }

    /// Create a loader using the default definitions directory.
    ///
    /// Looks for `platform-definitions/` relative to the workspace root.
    ///
    /// # Errors
    /// Returns error if the default directory doesn't exist.
    pub fn with_default_dir() -> Result<Self> {
        // Find workspace root by looking for Cargo.toml with [workspace]
        let mut current_dir = std::env::current_dir()?;

        loop {
            let cargo_toml = current_dir.join("Cargo.toml");
            if cargo_toml.exists() {
                if let Ok(contents) = std::fs::read_to_string(&cargo_toml) {
                    if contents.contains("[workspace]") {
                        let definitions_dir = current_dir.join("platform-definitions");
                        return Self::new(definitions_dir);
                    }
                }
            }

            if let Some(parent) = current_dir.parent() {
                current_dir = parent.to_path_buf();
            } else {
                break;
            }
        }

        // Fallback: try relative path
        let definitions_dir = PathBuf::from("platform-definitions");
        Self::new(definitions_dir)
    }

    /// Load a single platform definition by ID.
    ///
    /// # Errors
    /// Returns error if the definition file doesn't exist, can't be read,
    /// or is invalid.
    pub fn load(&self, platform_id: &PlatformId) -> Result<PlatformDefinition> {
        let filename = format!("{}.toml", platform_id.as_str());

        let path = Self::find_file(&self.definitions_dir, &filename)?.ok_or_else(|| {
            PlatformError::NotFound {
                platform_id: platform_id.to_string(),
            }
        })?;

        let definition = Self::load_from_path(&path)?;
        definition.validate()?;

        debug!(
            platform_id = %platform_id,
            name = %definition.name(),
            "loaded platform definition"
        );

        Ok(definition)
    }

    /// Load all platform definitions from the definitions directory.
    ///
    /// Any definition that fails to parse or validate is a hard error:
    /// a registry with silently-missing platforms would leave clients
    /// unmonitored without anyone noticing.
    ///
    /// # Errors
    /// Returns error if the directory can't be read or any definition is
    /// malformed.
    pub fn load_all(&self) -> Result<Vec<PlatformDefinition>> {
        let mut definitions = Vec::new();

        Self::walk_and_load_recursive(&self.definitions_dir, &mut definitions)?;

        info!(
            count = definitions.len(),
            dir = %self.definitions_dir.display(),
            "loaded platform definitions"
        );

        Ok(definitions)
    }

    /// Recursively walk directory and load all TOML files.
    fn walk_and_load_recursive(
        dir: &Path,
        definitions: &mut Vec<PlatformDefinition>,
    ) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.is_dir() {
                Self::walk_and_load_recursive(&path, definitions)?;
            } else if path.extension().and_then(|s| s.to_str()) == Some("toml") {
                // Skip README files
                if path.file_name().and_then(|s| s.to_str()) == Some("README.toml") {
                    continue;
                }

                let definition = Self::load_from_path(&path)?;
                definition.validate()?;
                definitions.push(definition);
            }
        }

        Ok(())
    }

    /// Recursively search for a file by name.
    fn find_file(dir: &Path, filename: &str) -> Result<Option<PathBuf>> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.is_dir() {
                if let Some(found) = Self::find_file(&path, filename)? {
                    return Ok(Some(found));
                }
            } else if path.file_name().and_then(|s| s.to_str()) == Some(filename) {
                return Ok(Some(path));
            }
        }

        Ok(None)
    }

    /// Load a platform definition from a specific file path.
    fn load_from_path(path: &Path) -> Result<PlatformDefinition> {
        let contents = std::fs::read_to_string(path).map_err(|e| PlatformError::LoadError {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;

        toml::from_str(&contents).map_err(|e| PlatformError::ParseError {
            path: path.display().to_string(),
            source: e,
        })
    }
}
