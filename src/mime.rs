use std::path::Path;

/// Cache-control classification for a served file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetClass {
    /// Fingerprinted build output and media: one year, immutable.
    LongCache,
    /// HTML documents: short-lived so deploys propagate.
    Html,
    /// Everything else: one hour.
    Other,
}

impl AssetClass {
    pub fn cache_control(self) -> &'static str {
        match self {
            AssetClass::LongCache => "public, max-age=31536000, immutable",
            AssetClass::Html => "public, max-age=900",
            AssetClass::Other => "public, max-age=3600",
        }
    }
}

// MIME type system using enum indices instead of per-request string handling
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MimeType {
    Html,
    Css,
    Javascript,
    Json,
    JsonLd,
    Manifest,
    Xml,
    Rss,
    Atom,
    Svg,
    PlainText,
    Markdown,
    Csv,
    Icon,
    Png,
    Jpeg,
    Gif,
    Webp,
    Avif,
    Bmp,
    Mp3,
    Ogg,
    Wav,
    Flac,
    Mp4,
    Webm,
    Woff,
    Woff2,
    Ttf,
    Otf,
    Eot,
    Pdf,
    Wasm,
    Zip,
    Gzip,
    Tar,
    OctetStream, // Default for unknown files
}

impl MimeType {
    // Convert enum to MIME string - zero allocation
    pub fn as_str(self) -> &'static str {
        match self {
            MimeType::Html => "text/html; charset=utf-8",
            MimeType::Css => "text/css; charset=utf-8",
            MimeType::Javascript => "text/javascript; charset=utf-8",
            MimeType::Json => "application/json; charset=utf-8",
            MimeType::JsonLd => "application/ld+json; charset=utf-8",
            MimeType::Manifest => "application/manifest+json; charset=utf-8",
            MimeType::Xml => "application/xml; charset=utf-8",
            MimeType::Rss => "application/rss+xml; charset=utf-8",
            MimeType::Atom => "application/atom+xml; charset=utf-8",
            MimeType::Svg => "image/svg+xml",
            MimeType::PlainText => "text/plain; charset=utf-8",
            MimeType::Markdown => "text/markdown; charset=utf-8",
            MimeType::Csv => "text/csv; charset=utf-8",
            MimeType::Icon => "image/x-icon",
            MimeType::Png => "image/png",
            MimeType::Jpeg => "image/jpeg",
            MimeType::Gif => "image/gif",
            MimeType::Webp => "image/webp",
            MimeType::Avif => "image/avif",
            MimeType::Bmp => "image/bmp",
            MimeType::Mp3 => "audio/mpeg",
            MimeType::Ogg => "audio/ogg",
            MimeType::Wav => "audio/wav",
            MimeType::Flac => "audio/flac",
            MimeType::Mp4 => "video/mp4",
            MimeType::Webm => "video/webm",
            MimeType::Woff => "font/woff",
            MimeType::Woff2 => "font/woff2",
            MimeType::Ttf => "font/ttf",
            MimeType::Otf => "font/otf",
            MimeType::Eot => "application/vnd.ms-fontobject",
            MimeType::Pdf => "application/pdf",
            MimeType::Wasm => "application/wasm",
            MimeType::Zip => "application/zip",
            MimeType::Gzip => "application/gzip",
            MimeType::Tar => "application/x-tar",
            MimeType::OctetStream => "application/octet-stream",
        }
    }

    // Lookup by lowercased extension, without the leading dot
    pub fn of_extension(ext: &str) -> MimeType {
        match ext {
            "html" | "htm" => MimeType::Html,
            "css" => MimeType::Css,
            "js" | "mjs" => MimeType::Javascript,
            "json" | "map" => MimeType::Json,
            "jsonld" => MimeType::JsonLd,
            "webmanifest" => MimeType::Manifest,
            "xml" => MimeType::Xml,
            "rss" => MimeType::Rss,
            "atom" => MimeType::Atom,
            "svg" => MimeType::Svg,
            "txt" => MimeType::PlainText,
            "md" | "markdown" => MimeType::Markdown,
            "csv" => MimeType::Csv,
            "ico" => MimeType::Icon,
            "png" => MimeType::Png,
            "jpg" | "jpeg" => MimeType::Jpeg,
            "gif" => MimeType::Gif,
            "webp" => MimeType::Webp,
            "avif" => MimeType::Avif,
            "bmp" => MimeType::Bmp,
            "mp3" => MimeType::Mp3,
            "ogg" => MimeType::Ogg,
            "wav" => MimeType::Wav,
            "flac" => MimeType::Flac,
            "mp4" => MimeType::Mp4,
            "webm" => MimeType::Webm,
            "woff" => MimeType::Woff,
            "woff2" => MimeType::Woff2,
            "ttf" => MimeType::Ttf,
            "otf" => MimeType::Otf,
            "eot" => MimeType::Eot,
            "pdf" => MimeType::Pdf,
            "wasm" => MimeType::Wasm,
            "zip" => MimeType::Zip,
            "gz" => MimeType::Gzip,
            "tar" => MimeType::Tar,
            _ => MimeType::OctetStream,
        }
    }

    // Final-extension lookup. Dotfiles without a further extension
    // (".htaccess") have no extension here and fall through to the default.
    pub fn of_path(file_path: &Path) -> MimeType {
        match file_path.extension().and_then(|s| s.to_str()) {
            Some(ext) if !ext.bytes().any(|b| b.is_ascii_uppercase()) => Self::of_extension(ext),
            Some(ext) => Self::of_extension(&ext.to_ascii_lowercase()),
            None => MimeType::OctetStream,
        }
    }

    /// Whether startup templating may run over this type. HTML only by
    /// default; `template_assets` extends it to the other text formats.
    pub fn is_templateable(self, template_assets: bool) -> bool {
        match self {
            MimeType::Html => true,
            MimeType::Css | MimeType::Javascript | MimeType::Json => template_assets,
            _ => false,
        }
    }

    /// Whether precomputed gzip/brotli/zstd variants are worth storing.
    /// Already-compressed containers (images, woff, archives) are excluded;
    /// raw TTF/OTF font tables compress well and are included.
    pub fn is_compressible(self) -> bool {
        matches!(
            self,
            MimeType::Html
                | MimeType::Css
                | MimeType::Javascript
                | MimeType::Json
                | MimeType::JsonLd
                | MimeType::Manifest
                | MimeType::Xml
                | MimeType::Rss
                | MimeType::Atom
                | MimeType::Svg
                | MimeType::PlainText
                | MimeType::Markdown
                | MimeType::Csv
                | MimeType::Ttf
                | MimeType::Otf
        )
    }

    pub fn asset_class(self) -> AssetClass {
        match self {
            MimeType::Html => AssetClass::Html,
            MimeType::Css
            | MimeType::Javascript
            | MimeType::Svg
            | MimeType::Icon
            | MimeType::Png
            | MimeType::Jpeg
            | MimeType::Gif
            | MimeType::Webp
            | MimeType::Avif
            | MimeType::Bmp
            | MimeType::Mp3
            | MimeType::Ogg
            | MimeType::Wav
            | MimeType::Flac
            | MimeType::Mp4
            | MimeType::Webm
            | MimeType::Woff
            | MimeType::Woff2
            | MimeType::Ttf
            | MimeType::Otf
            | MimeType::Eot => AssetClass::LongCache,
            _ => AssetClass::Other,
        }
    }
}

// String-based convenience used by callers holding a bare path
pub fn mime_of(file_path: &str) -> &'static str {
    MimeType::of_path(Path::new(file_path)).as_str()
}
