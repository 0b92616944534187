//! In-memory static file server core.
//!
//! At startup the served directory is walked once: every file is read,
//! text assets are optionally interpolated with environment-derived
//! variables, compressed variants are precomputed, and the result is pinned
//! behind a concurrent route cache. Request handling is then a path lookup,
//! an Accept-Encoding pick, and a reference handoff; the hot path performs
//! no disk I/O and no copies.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub mod cache;
pub mod compress;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod mime;
pub mod route;
pub mod server;
pub mod template;

pub use cache::RouteCache;
pub use compress::{CompressionLevels, Encoding};
pub use config::ServerConfig;
pub use dispatch::{negotiate_encoding, Body, Request, Response, Status};
pub use error::ServerError;
pub use mime::{mime_of, AssetClass, MimeType};
pub use route::{Content, Route, RouteBuilder, RouteHeaders};
pub use template::TemplateContext;

/// Top-level server object: owns the route cache, the route builder (with
/// its captured template context), and the request counters. One instance
/// is shared by every connection handler.
pub struct ServerState {
    pub config: ServerConfig,
    pub builder: RouteBuilder,
    pub cache: RouteCache,
    pub requests: AtomicU64,
    pub errors: AtomicU64,
}

impl ServerState {
    /// Snapshot the environment, build every route under the configured
    /// root, and assemble the shared state. Fails only when the served root
    /// is unusable.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let ctx = TemplateContext::from_env(&config.config_prefix);
        Self::with_context(config, ctx)
    }

    /// Like [`ServerState::new`] with an explicit template context instead
    /// of a process-environment snapshot.
    pub fn with_context(config: ServerConfig, ctx: TemplateContext) -> Result<Self, ServerError> {
        let builder = RouteBuilder::new(ctx, config.levels, config.template_assets);
        let cache = RouteCache::new();
        cache.populate(&config.root, &builder)?;
        Ok(Self {
            config,
            builder,
            cache,
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        })
    }

    pub(crate) fn lookup(&self, path: &str) -> Option<Arc<Route>> {
        self.cache
            .lookup_fresh(path, &self.builder, self.config.dev_mode)
    }

    /// Handle one request. Infallible: every failure mode is a response.
    pub fn handle(&self, request: &Request<'_>) -> Response {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let response = dispatch::dispatch(self, request);
        if response.status.is_error() {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        response
    }

    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}
