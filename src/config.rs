use std::path::PathBuf;

use crate::compress::CompressionLevels;

/// Everything the core consumes, assembled by the binary from CLI flags and
/// environment. Owned by [`crate::ServerState`]; nothing in here is read
/// from process globals after startup.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Directory whose tree is pinned in memory and served.
    pub root: PathBuf,
    /// Route unmatched paths to the root route for client-side routing.
    pub spa_mode: bool,
    /// Re-stat and rebuild routes whose source file changed.
    pub dev_mode: bool,
    /// Environment variables with this prefix become template variables,
    /// prefix stripped.
    pub config_prefix: String,
    /// Extend startup templating beyond HTML to CSS/JS/JSON.
    pub template_assets: bool,
    pub levels: CompressionLevels,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("public"),
            spa_mode: false,
            dev_mode: false,
            config_prefix: "VITE_".to_string(),
            template_assets: false,
            levels: CompressionLevels::default(),
        }
    }
}
