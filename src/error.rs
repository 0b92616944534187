use std::path::PathBuf;

/// Startup failures. Everything else the server encounters is logged and
/// absorbed: per-file build problems skip the file, per-request problems
/// become status codes.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("served root {0:?} does not exist or is not a directory")]
    RootMissing(PathBuf),
    #[error("failed to read served root {path:?}: {source}")]
    RootUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
}
