use tracing::{error, warn};

use termhost_config::TermhostConfig;
use termhost_core::LayoutStore;
use termhost_paths::TermhostPaths;

/// Load configuration, falling back to defaults on errors.
///
/// The user sees a warning on stderr and `cli.config.load_failed` is logged.
pub fn load_config_with_warning() -> TermhostConfig {
    match TermhostConfig::load_hierarchy() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Could not load config: {}. Using defaults.\n\
                 Tip: Check ~/.termhost/config.toml and ./.termhost/config.toml for syntax errors.",
                e
            );
            warn!(event = "cli.config.load_failed", error = %e);
            TermhostConfig::default()
        }
    }
}

pub fn layout_store() -> Result<LayoutStore, Box<dyn std::error::Error>> {
    match TermhostPaths::resolve() {
        Ok(paths) => Ok(LayoutStore::new(paths)),
        Err(e) => {
            eprintln!("❌ {}", e);
            error!(event = "cli.paths.resolve_failed", error = %e);
            Err(e.into())
        }
    }
}
