use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::error::ServerError;
use crate::route::{Route, RouteBuilder};

const INDEX_FILE: &str = "index.html";

/// Concurrent URL-path to route map. Reads take a shared lock and clone an
/// `Arc`; writes (startup population, dev refresh) block readers only for
/// the individual insertion.
pub struct RouteCache {
    routes: RwLock<FxHashMap<Box<str>, Arc<Route>>>,
}

impl Default for RouteCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteCache {
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(FxHashMap::default()),
        }
    }

    /// Register a route under its canonical path, plus the directory alias
    /// when the file is an index.html ("/docs/index.html" also answers
    /// "/docs/", and "/index.html" answers "/"). Both keys are written under
    /// one lock so a refresh swaps them together.
    pub fn insert_route(&self, route: Arc<Route>) {
        let url_path = route.url_path.clone();
        let alias = url_path
            .strip_suffix(INDEX_FILE)
            .filter(|prefix| prefix.ends_with('/'))
            .map(Box::from);

        let mut routes = self.routes.write();
        if let Some(alias) = alias {
            routes.insert(alias, route.clone());
        }
        routes.insert(url_path, route);
    }

    /// A stable snapshot: the returned route never mutates, even if a later
    /// lookup observes a replacement.
    pub fn lookup(&self, path: &str) -> Option<Arc<Route>> {
        self.routes.read().get(path).cloned()
    }

    /// Lookup with dev-mode freshness: when the file on disk is newer than
    /// the cached route, rebuild and replace before answering. Stat or read
    /// failures keep the stale route servable.
    pub fn lookup_fresh(
        &self,
        path: &str,
        builder: &RouteBuilder,
        dev_mode: bool,
    ) -> Option<Arc<Route>> {
        let route = self.lookup(path)?;
        if !dev_mode {
            return Some(route);
        }

        let disk_mtime = match std::fs::metadata(&route.source_path).and_then(|m| m.modified()) {
            Ok(mtime) => mtime,
            Err(e) => {
                warn!(path = %route.source_path.display(), error = %e, "dev refresh stat failed, serving cached route");
                return Some(route);
            }
        };
        if disk_mtime <= route.mtime {
            return Some(route);
        }

        match std::fs::read(&route.source_path) {
            Ok(bytes) => {
                debug!(path = %route.url_path, "dev refresh rebuilding modified file");
                let fresh = Arc::new(builder.build(
                    &route.source_path,
                    &route.url_path,
                    bytes,
                    disk_mtime,
                ));
                self.insert_route(fresh.clone());
                Some(fresh)
            }
            Err(e) => {
                warn!(path = %route.source_path.display(), error = %e, "dev refresh read failed, serving cached route");
                Some(route)
            }
        }
    }

    pub fn entry_count(&self) -> usize {
        self.routes.read().len()
    }

    /// Walk `root`, build a route per regular file, and register it. Files
    /// are built in parallel across worker threads; only an unusable served
    /// root is fatal. Returns the number of files cached.
    pub fn populate(&self, root: &Path, builder: &RouteBuilder) -> Result<usize, ServerError> {
        if !root.is_dir() {
            return Err(ServerError::RootMissing(root.to_path_buf()));
        }

        let mut files = Vec::new();
        collect_files(root, "", &mut files).map_err(|source| ServerError::RootUnreadable {
            path: root.to_path_buf(),
            source,
        })?;

        let built = AtomicUsize::new(0);
        let next = AtomicUsize::new(0);
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(files.len())
            .max(1);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    let Some((fs_path, url_path)) = files.get(i) else {
                        break;
                    };
                    match load_one(fs_path) {
                        Ok((bytes, mtime)) => {
                            let route = builder.build(fs_path, url_path, bytes, mtime);
                            self.insert_route(Arc::new(route));
                            built.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            warn!(path = %fs_path.display(), error = %e, "skipping unreadable file");
                        }
                    }
                });
            }
        });

        Ok(built.into_inner())
    }
}

fn load_one(fs_path: &Path) -> std::io::Result<(Vec<u8>, std::time::SystemTime)> {
    let mtime = std::fs::metadata(fs_path)?
        .modified()
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
    let bytes = std::fs::read(fs_path)?;
    Ok((bytes, mtime))
}

// Depth-first walk carrying the URL-relative path. The URL key is the
// relative path with a leading slash, so keys can never contain ".."
// segments or escape the root.
fn collect_files(
    dir: &Path,
    relative: &str,
    files: &mut Vec<(PathBuf, String)>,
) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();

        let child_relative = if relative.is_empty() {
            file_name.to_string()
        } else {
            format!("{relative}/{file_name}")
        };

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "skipping entry without metadata");
                continue;
            }
        };

        if metadata.is_file() {
            files.push((entry.path(), format!("/{child_relative}")));
        } else if metadata.is_dir() {
            if let Err(e) = collect_files(&entry.path(), &child_relative, files) {
                warn!(dir = %entry.path().display(), error = %e, "skipping unreadable subdirectory");
            }
        }
    }
    Ok(())
}
