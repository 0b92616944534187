//! HTTP/1.1 framing: the TCP accept loop, request parsing, and response
//! serialization around the dispatcher. The core never sees a socket; this
//! layer reduces each request to a [`Request`] and writes the [`Response`]
//! back out, headers first, body straight from the shared buffer.

use std::io::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use percent_encoding::percent_decode_str;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::time::{timeout, Duration};
use tracing::{debug, info};

use crate::dispatch::{Request, Response, Status};
use crate::ServerState;

const MAX_REQUEST_SIZE: usize = 8192;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const KEEPALIVE_TIMEOUT_SECS: u64 = 5;

const SERVER_HEADER: &[u8] =
    concat!("Server: pinserve/", env!("CARGO_PKG_VERSION"), "\r\n").as_bytes();

// Framing-level failures happen before a Request exists, so they are
// precompiled wholesale and close the connection
const MALFORMED_RESPONSE: &[u8] = b"HTTP/1.1 400 Bad Request\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: 15\r\nConnection: close\r\n\r\n400 Bad Request";
const TOO_LARGE_RESPONSE: &[u8] = b"HTTP/1.1 413 Request Entity Too Large\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: 28\r\nConnection: close\r\n\r\n413 Request Entity Too Large";
const TIMEOUT_RESPONSE: &[u8] = b"HTTP/1.1 408 Request Timeout\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: 19\r\nConnection: close\r\n\r\n408 Request Timeout";

/// Accept connections until SIGINT/SIGTERM, spawning one task per
/// connection against the shared state.
pub async fn run(state: Arc<ServerState>, listener: TcpListener) -> std::io::Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let _ = stream.set_nodelay(true);
                        tokio::spawn(handle_connection(state.clone(), stream, shutdown.clone()));
                    }
                    Err(e) => {
                        debug!(error = %e, "accept failed");
                        continue;
                    }
                }
            }
            _ = shutdown_signal() => {
                info!("shutdown signal received, stopping server");
                shutdown.store(true, Ordering::Relaxed);
                break;
            }
        }
    }

    info!(
        requests = state.request_count(),
        errors = state.error_count(),
        "server stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn handle_connection(
    state: Arc<ServerState>,
    mut stream: TcpStream,
    shutdown: Arc<AtomicBool>,
) {
    let connection_result = timeout(
        Duration::from_secs(CONNECTION_TIMEOUT_SECS),
        handle_connection_inner(&state, &mut stream, &shutdown),
    )
    .await;

    if connection_result.is_err() {
        let _ = stream.write_all(TIMEOUT_RESPONSE).await;
        let _ = stream.flush().await;
    }
}

async fn handle_connection_inner(
    state: &ServerState,
    stream: &mut TcpStream,
    shutdown: &AtomicBool,
) -> Result<(), std::io::Error> {
    // Buffers reused across keep-alive requests on this connection
    let mut request_line = String::with_capacity(128);
    let mut header_buffer = Vec::with_capacity(256);
    let mut response_head = Vec::with_capacity(512);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        let mut reader = BufReader::new(&mut *stream);
        request_line.clear();

        match timeout(
            Duration::from_secs(KEEPALIVE_TIMEOUT_SECS),
            reader.read_line(&mut request_line),
        )
        .await
        {
            Ok(Ok(0)) | Err(_) => break, // closed or idle past keep-alive
            Ok(Err(_)) => break,
            Ok(Ok(size)) if size > MAX_REQUEST_SIZE => {
                stream.write_all(TOO_LARGE_RESPONSE).await?;
                stream.flush().await?;
                break;
            }
            Ok(Ok(_)) => {}
        }

        if request_line.trim().is_empty() {
            continue;
        }

        let request_bytes = request_line.trim().as_bytes();
        let Some((method, raw_path, version)) = parse_request_line(request_bytes) else {
            stream.write_all(MALFORMED_RESPONSE).await?;
            stream.flush().await?;
            break;
        };

        let mut keep_alive = version == "HTTP/1.1";
        let mut accept_encoding: Option<Vec<u8>> = None;
        let mut if_none_match: Option<Vec<u8>> = None;

        loop {
            header_buffer.clear();
            match read_line_bytes(&mut reader, &mut header_buffer).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = trim_header_line(&header_buffer);
                    if line.is_empty() {
                        break;
                    }
                    if header_starts_with(line, b"connection:") {
                        let close_requested = header_contains(line, b"close");
                        keep_alive = !close_requested
                            && (version == "HTTP/1.1" || header_contains(line, b"keep-alive"));
                    } else if header_starts_with(line, b"accept-encoding:") {
                        if let Some(value) = extract_header_value(line, b"accept-encoding:") {
                            accept_encoding = Some(value.to_vec());
                        }
                    } else if header_starts_with(line, b"if-none-match:") {
                        if let Some(value) = extract_header_value(line, b"if-none-match:") {
                            if_none_match = Some(value.to_vec());
                        }
                    }
                }
                Err(_) => break,
            }
        }

        // Query strings never select a different route
        let without_query = match raw_path.find('?') {
            Some(pos) => &raw_path[..pos],
            None => raw_path,
        };
        let Some(path) = percent_decode_str(without_query)
            .decode_utf8()
            .ok()
            .filter(|decoded| decoded.starts_with('/'))
        else {
            stream.write_all(MALFORMED_RESPONSE).await?;
            stream.flush().await?;
            break;
        };

        let accept_encoding =
            accept_encoding.as_deref().and_then(|v| std::str::from_utf8(v).ok());

        let request = Request {
            method,
            path: path.as_ref(),
            accept_encoding,
            if_none_match: if_none_match.as_deref(),
        };
        let response = state.handle(&request);

        serialize_head(&mut response_head, &response, keep_alive);
        stream.write_all(&response_head).await?;
        if !response.head && response.status != Status::NotModified && !response.body.is_empty() {
            // Body handoff straight from the route's pinned buffer
            stream.write_all(response.body.as_bytes()).await?;
        }
        stream.flush().await?;

        if !keep_alive {
            break;
        }
    }

    Ok(())
}

// Status line, precomputed header values, Content-Length from the selected
// body, fixed Server header, Connection per negotiation
fn serialize_head(buf: &mut Vec<u8>, response: &Response, keep_alive: bool) {
    buf.clear();
    buf.extend_from_slice(response.status.status_line());

    if let Some(content_type) = response.content_type {
        buf.extend_from_slice(b"Content-Type: ");
        buf.extend_from_slice(content_type.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    if let Some(last_modified) = &response.last_modified {
        buf.extend_from_slice(b"Last-Modified: ");
        buf.extend_from_slice(last_modified.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    if let Some(etag) = &response.etag {
        buf.extend_from_slice(b"ETag: ");
        buf.extend_from_slice(etag.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    if let Some(cache_control) = response.cache_control {
        buf.extend_from_slice(b"Cache-Control: ");
        buf.extend_from_slice(cache_control.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    if let Some(content_encoding) = response.content_encoding {
        buf.extend_from_slice(b"Content-Encoding: ");
        buf.extend_from_slice(content_encoding.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    if let Some(allow) = response.allow {
        buf.extend_from_slice(b"Allow: ");
        buf.extend_from_slice(allow.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    if response.status != Status::NotModified {
        let _ = write!(buf, "Content-Length: {}\r\n", response.body.len());
    }
    buf.extend_from_slice(SERVER_HEADER);
    buf.extend_from_slice(if keep_alive {
        b"Connection: keep-alive\r\n".as_slice()
    } else {
        b"Connection: close\r\n".as_slice()
    });
    buf.extend_from_slice(b"\r\n");
}

// Zero-allocation request line split: method, path, version, nothing more
fn parse_request_line(request: &[u8]) -> Option<(&[u8], &str, &str)> {
    let mut parts = request.split(|&b| b == b' ').filter(|part| !part.is_empty());

    let method = parts.next()?;
    let path = std::str::from_utf8(parts.next()?).ok()?;
    let version = std::str::from_utf8(parts.next()?).ok()?;

    if parts.next().is_some() {
        return None;
    }
    if method.is_empty() || path.is_empty() || version.is_empty() {
        return None;
    }

    Some((method, path, version))
}

async fn read_line_bytes(
    reader: &mut BufReader<&mut TcpStream>,
    buffer: &mut Vec<u8>,
) -> Result<usize, std::io::Error> {
    let mut total_bytes = 0;
    loop {
        let bytes_read = reader.read_until(b'\n', buffer).await?;
        total_bytes += bytes_read;
        if bytes_read == 0 || buffer.ends_with(b"\n") {
            break;
        }
    }
    Ok(total_bytes)
}

fn trim_header_line(line: &[u8]) -> &[u8] {
    let mut start = 0;
    let mut end = line.len();

    while end > 0 {
        match line[end - 1] {
            b'\r' | b'\n' | b' ' | b'\t' => end -= 1,
            _ => break,
        }
    }
    while start < end {
        match line[start] {
            b' ' | b'\t' => start += 1,
            _ => break,
        }
    }

    &line[start..end]
}

// Case-insensitive ASCII prefix check for header names
fn header_starts_with(header_line: &[u8], prefix: &[u8]) -> bool {
    header_line.len() >= prefix.len()
        && header_line[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn header_contains(header_line: &[u8], substring: &[u8]) -> bool {
    if substring.is_empty() {
        return true;
    }
    if header_line.len() < substring.len() {
        return false;
    }
    header_line
        .windows(substring.len())
        .any(|window| window.eq_ignore_ascii_case(substring))
}

fn extract_header_value<'a>(line: &'a [u8], header_name: &[u8]) -> Option<&'a [u8]> {
    if line.len() <= header_name.len() {
        return None;
    }

    let value_bytes = &line[header_name.len()..];
    let mut start = 0;
    while start < value_bytes.len() && (value_bytes[start] == b' ' || value_bytes[start] == b'\t') {
        start += 1;
    }
    if start >= value_bytes.len() {
        return None;
    }

    Some(&value_bytes[start..])
}
