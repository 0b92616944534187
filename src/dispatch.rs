use std::sync::Arc;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::compress::Encoding;
use crate::route::{Content, Route};
use crate::ServerState;

/// The request surface the dispatcher consumes. The framing layer has
/// already URL-decoded the path and stripped any query string.
#[derive(Debug)]
pub struct Request<'a> {
    pub method: &'a [u8],
    pub path: &'a str,
    pub accept_encoding: Option<&'a str>,
    pub if_none_match: Option<&'a [u8]>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Ok,
    NotModified,
    BadRequest,
    NotFound,
    MethodNotAllowed,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::NotModified => 304,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::MethodNotAllowed => 405,
        }
    }

    pub fn status_line(self) -> &'static [u8] {
        match self {
            Status::Ok => b"HTTP/1.1 200 OK\r\n",
            Status::NotModified => b"HTTP/1.1 304 Not Modified\r\n",
            Status::BadRequest => b"HTTP/1.1 400 Bad Request\r\n",
            Status::NotFound => b"HTTP/1.1 404 Not Found\r\n",
            Status::MethodNotAllowed => b"HTTP/1.1 405 Method Not Allowed\r\n",
        }
    }

    pub fn is_error(self) -> bool {
        self.code() >= 400
    }
}

/// Response body: a reference into a route's pinned buffers on the happy
/// path, a literal for errors, owned bytes only for the health payload.
#[derive(Debug)]
pub enum Body {
    Empty,
    Shared(Arc<[u8]>),
    Literal(&'static [u8]),
    Owned(Vec<u8>),
}

impl Body {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Body::Empty => &[],
            Body::Shared(bytes) => bytes,
            Body::Literal(bytes) => bytes,
            Body::Owned(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What the dispatcher hands back to the framing layer. Header values are
/// shared references to buffers precomputed at build time; the framing
/// layer derives Content-Length from the body and appends the fixed Server
/// header itself.
#[derive(Debug)]
pub struct Response {
    pub status: Status,
    pub content_type: Option<&'static str>,
    pub last_modified: Option<Arc<str>>,
    pub etag: Option<Arc<str>>,
    pub cache_control: Option<&'static str>,
    pub content_encoding: Option<&'static str>,
    pub allow: Option<&'static str>,
    pub body: Body,
    /// HEAD: headers (including Content-Length) as if the body were sent,
    /// body bytes suppressed on the wire.
    pub head: bool,
}

impl Response {
    fn minimal(status: Status, body: &'static [u8], head: bool) -> Self {
        Self {
            status,
            content_type: Some("text/plain; charset=utf-8"),
            last_modified: None,
            etag: None,
            cache_control: None,
            content_encoding: None,
            allow: None,
            body: Body::Literal(body),
            head,
        }
    }

    fn not_found(head: bool) -> Self {
        Self::minimal(Status::NotFound, b"404 Not Found", head)
    }

    fn bad_request(head: bool) -> Self {
        Self::minimal(Status::BadRequest, b"400 Bad Request", head)
    }

    fn method_not_allowed() -> Self {
        let mut response = Self::minimal(Status::MethodNotAllowed, b"405 Method Not Allowed", false);
        response.allow = Some("GET, HEAD");
        response
    }

    fn not_modified(route: &Route, head: bool) -> Self {
        Self {
            status: Status::NotModified,
            content_type: None,
            last_modified: Some(route.headers.last_modified.clone()),
            etag: Some(route.headers.etag.clone()),
            cache_control: Some(route.headers.cache_control),
            content_encoding: None,
            allow: None,
            body: Body::Empty,
            head,
        }
    }

    fn route(route: &Route, encoding: Encoding, head: bool) -> Self {
        // The variant is guaranteed present: negotiation only picks codings
        // the content carries
        let body = route
            .content
            .variant(encoding)
            .unwrap_or(&route.content.plain)
            .clone();
        Self {
            status: Status::Ok,
            content_type: Some(route.headers.content_type),
            last_modified: Some(route.headers.last_modified.clone()),
            etag: Some(route.headers.etag.clone()),
            cache_control: Some(route.headers.cache_control),
            content_encoding: encoding.header_value(),
            allow: None,
            body: Body::Shared(body),
            head,
        }
    }

    fn health(head: bool) -> Self {
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        let payload = serde_json::json!({ "status": "ok", "timestamp": timestamp });
        Self {
            status: Status::Ok,
            content_type: Some("application/json"),
            last_modified: None,
            etag: None,
            cache_control: None,
            content_encoding: None,
            allow: None,
            body: Body::Owned(payload.to_string().into_bytes()),
            head,
        }
    }
}

// Paths are built from a directory walk so the cache can never hold such a
// key; the explicit reject exists so hostile requests fail loudly with 400
// instead of a silent miss.
fn valid_path(path: &str) -> bool {
    !path.contains('\0') && !path.split('/').any(|segment| segment == "..")
}

/// Accept-Encoding negotiation. Tokens match whole coding names only
/// (`vibrant` never yields `br`); a coding is eligible iff its quality is
/// above zero; eligible codings are taken in the fixed order
/// brotli > zstd > gzip > identity, skipping variants the route lacks.
pub fn negotiate_encoding(accept_encoding: Option<&str>, content: &Content) -> Encoding {
    let Some(accept_encoding) = accept_encoding else {
        return Encoding::Identity;
    };

    let mut brotli_ok = false;
    let mut zstd_ok = false;
    let mut gzip_ok = false;

    for token in accept_encoding.split(',') {
        let mut parts = token.split(';');
        let name = parts.next().unwrap_or("").trim();
        if name.is_empty() {
            continue;
        }

        let mut quality = 1.0f32;
        for param in parts {
            let param = param.trim();
            if let Some(value) = param
                .strip_prefix("q=")
                .or_else(|| param.strip_prefix("Q="))
            {
                quality = value.trim().parse().unwrap_or(0.0);
            }
        }
        if quality <= 0.0 {
            continue;
        }

        if name.eq_ignore_ascii_case("br") {
            brotli_ok = true;
        } else if name.eq_ignore_ascii_case("zstd") {
            zstd_ok = true;
        } else if name.eq_ignore_ascii_case("gzip") {
            gzip_ok = true;
        }
        // identity and unrecognized codings fall through: identity is
        // always the floor of the priority order
    }

    if brotli_ok && content.has_variant(Encoding::Brotli) {
        Encoding::Brotli
    } else if zstd_ok && content.has_variant(Encoding::Zstd) {
        Encoding::Zstd
    } else if gzip_ok && content.has_variant(Encoding::Gzip) {
        Encoding::Gzip
    } else {
        Encoding::Identity
    }
}

/// Per-request core: health short-circuit, path validation, cache lookup
/// with directory-index and SPA fallbacks, conditional check, encoding
/// selection, response assembly. Never performs I/O outside dev mode and
/// never propagates an error.
pub(crate) fn dispatch(state: &ServerState, request: &Request<'_>) -> Response {
    let head = match request.method {
        b"GET" => false,
        b"HEAD" => true,
        _ => return Response::method_not_allowed(),
    };

    if request.path == "/_health" || request.path == "/health" {
        return Response::health(head);
    }

    if !valid_path(request.path) {
        return Response::bad_request(head);
    }

    let route = state
        .lookup(request.path)
        .or_else(|| {
            // Directory request without the trailing slash the alias uses
            if request.path.ends_with('/') {
                None
            } else {
                state.lookup(&format!("{}/", request.path))
            }
        })
        .or_else(|| {
            if state.config.spa_mode {
                state.lookup("/")
            } else {
                None
            }
        });

    let Some(route) = route else {
        return Response::not_found(head);
    };

    // Byte-for-byte strong comparison, quotes included
    if let Some(client_etag) = request.if_none_match {
        if client_etag == route.headers.etag.as_bytes() {
            return Response::not_modified(&route, head);
        }
    }

    let encoding = negotiate_encoding(request.accept_encoding, &route.content);
    Response::route(&route, encoding, head)
}
