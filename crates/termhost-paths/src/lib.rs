//! Where termhost keeps its files.
//!
//! ```text
//! ~/.termhost/
//!   config.toml            user configuration
//!   layouts/<ws>.json      one stored layout per workspace
//! <project>/.termhost/
//!   config.toml            project overrides
//! ```

use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("cannot locate a home directory; set $HOME")]
    HomeNotFound,
}

/// Paths under one termhost base directory.
///
/// Production code calls [`TermhostPaths::resolve`]; tests point
/// [`TermhostPaths::from_dir`] at a temp directory.
#[derive(Debug, Clone)]
pub struct TermhostPaths {
    base: PathBuf,
}

impl TermhostPaths {
    /// `~/.termhost`.
    pub fn resolve() -> Result<Self, PathError> {
        let home = dirs::home_dir().ok_or(PathError::HomeNotFound)?;
        Ok(Self::from_dir(home.join(".termhost")))
    }

    pub fn from_dir(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn termhost_dir(&self) -> &Path {
        &self.base
    }

    pub fn user_config(&self) -> PathBuf {
        self.base.join("config.toml")
    }

    pub fn layouts_dir(&self) -> PathBuf {
        self.base.join("layouts")
    }

    /// Stored layout of one workspace. Path separators in the id are
    /// replaced so every workspace maps to a single file.
    pub fn layout_file(&self, workspace_id: &str) -> PathBuf {
        let file_stem = workspace_id.replace(['/', '\\'], "_");
        self.layouts_dir().join(format!("{file_stem}.json"))
    }

    /// `<project_root>/.termhost/config.toml`.
    pub fn project_config(project_root: &Path) -> PathBuf {
        project_root.join(".termhost").join("config.toml")
    }
}
