//! Settings for the folder tree.

use std::path::Path;

use serde::{Deserialize, Serialize};
use wildmatch::WildMatch;

use crate::error::{Result, TreeError};

/// Default basename of a folder config file.
pub const DEFAULT_CONFIG_FILE_NAME: &str = "AssetConfig.toml";

/// Settings for a [`FolderTree`](crate::tree::FolderTree) and its
/// synchronizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeSettings {
    /// Exact basename that marks a file as a folder config.
    pub config_file_name: String,

    /// Directory name patterns (`*` and `?` wildcards) excluded from the
    /// tree together with their subtrees.
    pub ignore_patterns: Vec<String>,

    /// Re-apply the inherited config to a folder's targets after its own
    /// config was deleted.
    pub reapply_on_delete: bool,

    /// Whether walks follow symbolic links. A linked folder is indexed at
    /// the path the link resolves to.
    pub follow_symlinks: bool,
}

impl Default for TreeSettings {
    fn default() -> Self {
        Self {
            config_file_name: DEFAULT_CONFIG_FILE_NAME.to_string(),
            ignore_patterns: Self::default_ignores(),
            reapply_on_delete: true,
            follow_symlinks: false,
        }
    }
}

impl TreeSettings {
    /// Settings recognizing `config_file_name`.
    pub fn new(config_file_name: impl Into<String>) -> Self {
        Self {
            config_file_name: config_file_name.into(),
            ..Self::default()
        }
    }

    /// Add an ignore pattern.
    pub fn ignore(mut self, pattern: impl Into<String>) -> Self {
        self.ignore_patterns.push(pattern.into());
        self
    }

    /// Drop every ignore pattern, including the defaults.
    pub fn without_ignores(mut self) -> Self {
        self.ignore_patterns.clear();
        self
    }

    /// Set whether deleting a config re-applies the inherited one.
    pub fn with_reapply_on_delete(mut self, enabled: bool) -> Self {
        self.reapply_on_delete = enabled;
        self
    }

    /// Follow symbolic links during the initial walk.
    pub fn follow_symlinks(mut self) -> Self {
        self.follow_symlinks = true;
        self
    }

    /// Parse settings from TOML. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: Self = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject settings the tree cannot work with.
    pub fn validate(&self) -> Result<()> {
        let name = self.config_file_name.as_str();
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(TreeError::InvalidPattern(format!(
                "config file name must be a plain basename: {name:?}"
            )));
        }

        for pattern in &self.ignore_patterns {
            if pattern.is_empty() || pattern.contains(['/', '\\']) {
                return Err(TreeError::InvalidPattern(pattern.clone()));
            }
        }

        Ok(())
    }

    /// Whether `path`'s basename is the recognized config file name.
    pub fn is_config_file(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| name == self.config_file_name.as_str())
    }

    /// Whether a directory with this name is excluded from the tree.
    pub fn is_ignored_name(&self, name: &str) -> bool {
        self.ignore_patterns
            .iter()
            .any(|pattern| WildMatch::new(pattern).matches(name))
    }

    /// Whether any component of `path` below `root` is excluded.
    pub fn is_ignored(&self, root: &Path, path: &Path) -> bool {
        let relative = path.strip_prefix(root).unwrap_or(path);
        relative
            .components()
            .any(|component| self.is_ignored_name(&component.as_os_str().to_string_lossy()))
    }

    fn default_ignores() -> Vec<String> {
        vec![
            // Version control
            ".git".to_string(),
            ".svn".to_string(),
            ".hg".to_string(),
            // Hidden and temporary folders
            ".*".to_string(),
            "*~".to_string(),
        ]
    }
}
