use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::compress::{compress_brotli, compress_gzip, compress_zstd, CompressionLevels, Encoding};
use crate::mime::MimeType;
use crate::template::TemplateContext;

/// The body variants of one route. `plain` is authoritative; the compressed
/// buffers are present iff the MIME type is compress-eligible. Each buffer is
/// independently shareable and never mutated after construction.
#[derive(Clone, Debug)]
pub struct Content {
    pub plain: Arc<[u8]>,
    pub gzip: Option<Arc<[u8]>>,
    pub brotli: Option<Arc<[u8]>>,
    pub zstd: Option<Arc<[u8]>>,
}

impl Content {
    /// The buffer for a coding, `None` when that variant was not built.
    pub fn variant(&self, encoding: Encoding) -> Option<&Arc<[u8]>> {
        match encoding {
            Encoding::Identity => Some(&self.plain),
            Encoding::Gzip => self.gzip.as_ref(),
            Encoding::Brotli => self.brotli.as_ref(),
            Encoding::Zstd => self.zstd.as_ref(),
        }
    }

    pub fn has_variant(&self, encoding: Encoding) -> bool {
        self.variant(encoding).is_some()
    }
}

/// Header values precomputed at build time so request handling only hands
/// out references.
#[derive(Clone, Debug)]
pub struct RouteHeaders {
    pub content_type: &'static str,
    pub last_modified: Arc<str>,
    pub etag: Arc<str>,
    pub cache_control: &'static str,
}

/// Immutable bundle served for one URL path. Replaced wholesale by the dev
/// refresher; never mutated in place.
#[derive(Debug)]
pub struct Route {
    pub url_path: Box<str>,
    pub source_path: PathBuf,
    pub mtime: SystemTime,
    pub mime: MimeType,
    pub content: Content,
    pub headers: RouteHeaders,
}

// Strong validator: SHA-256 over (url path, mtime nanos), first 16 bytes as
// hex, quoted. Deterministic, so it survives restarts for unchanged files.
fn strong_etag(url_path: &str, mtime: SystemTime) -> String {
    let nanos = mtime
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut hasher = Sha256::new();
    hasher.update(url_path.as_bytes());
    hasher.update(nanos.to_le_bytes());
    let digest = hasher.finalize();

    let mut tag = String::with_capacity(34);
    tag.push('"');
    for byte in &digest[..16] {
        let _ = write!(tag, "{byte:02x}");
    }
    tag.push('"');
    tag
}

// HTTP dates carry second precision; truncate so Last-Modified and mtime
// comparisons agree with what clients echo back.
fn truncate_to_seconds(mtime: SystemTime) -> SystemTime {
    let secs = mtime
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

/// Builds immutable [`Route`] records: template, compress, precompute
/// headers. Holds no mutable state, so any number of files can be built
/// concurrently against one builder.
pub struct RouteBuilder {
    pub ctx: TemplateContext,
    pub levels: CompressionLevels,
    pub template_assets: bool,
}

impl RouteBuilder {
    pub fn new(ctx: TemplateContext, levels: CompressionLevels, template_assets: bool) -> Self {
        Self {
            ctx,
            levels,
            template_assets,
        }
    }

    pub fn build(
        &self,
        source_path: &Path,
        url_path: &str,
        bytes: Vec<u8>,
        mtime: SystemTime,
    ) -> Route {
        let mime = MimeType::of_path(source_path);

        // Best effort: a template that fails to render is served verbatim
        let bytes = if mime.is_templateable(self.template_assets) {
            match self.ctx.render(url_path, &bytes) {
                Ok(rendered) => rendered,
                Err(e) => {
                    warn!(path = url_path, error = %e, "template render failed, serving source unmodified");
                    bytes
                }
            }
        } else {
            bytes
        };

        let plain: Arc<[u8]> = Arc::from(bytes.into_boxed_slice());
        let content = if mime.is_compressible() {
            Content {
                gzip: self.compress_variant(url_path, &plain, Encoding::Gzip),
                brotli: self.compress_variant(url_path, &plain, Encoding::Brotli),
                zstd: self.compress_variant(url_path, &plain, Encoding::Zstd),
                plain,
            }
        } else {
            Content {
                plain,
                gzip: None,
                brotli: None,
                zstd: None,
            }
        };

        let etag: Arc<str> = Arc::from(strong_etag(url_path, mtime));
        let last_modified: Arc<str> =
            Arc::from(httpdate::fmt_http_date(truncate_to_seconds(mtime)));

        Route {
            url_path: Box::from(url_path),
            source_path: source_path.to_path_buf(),
            mtime,
            mime,
            content,
            headers: RouteHeaders {
                content_type: mime.as_str(),
                last_modified,
                etag,
                cache_control: mime.asset_class().cache_control(),
            },
        }
    }

    // A codec failure drops that one variant and keeps the route servable
    fn compress_variant(
        &self,
        url_path: &str,
        plain: &[u8],
        encoding: Encoding,
    ) -> Option<Arc<[u8]>> {
        let result = match encoding {
            Encoding::Gzip => compress_gzip(plain, self.levels.gzip),
            Encoding::Brotli => compress_brotli(plain, self.levels.brotli),
            Encoding::Zstd => compress_zstd(plain, self.levels.zstd),
            Encoding::Identity => return None,
        };
        match result {
            Ok(compressed) => Some(Arc::from(compressed.into_boxed_slice())),
            Err(e) => {
                warn!(path = url_path, codec = ?encoding, error = %e, "compression failed, variant omitted");
                None
            }
        }
    }
}
