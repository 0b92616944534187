use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use pinserve::{
    negotiate_encoding, Content, Encoding, Request, ServerConfig, ServerState, Status,
    TemplateContext,
};
use tempfile::TempDir;

fn write_file(root: &Path, relative: &str, content: &[u8]) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn serve(
    files: &[(&str, &[u8])],
    vars: &[(&str, &str)],
    spa_mode: bool,
) -> (TempDir, ServerState) {
    let temp_dir = TempDir::new().unwrap();
    for (relative, content) in files {
        write_file(temp_dir.path(), relative, content);
    }
    let config = ServerConfig {
        root: temp_dir.path().to_path_buf(),
        spa_mode,
        ..ServerConfig::default()
    };
    let ctx = TemplateContext::from_vars(
        vars.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
    );
    let state = ServerState::with_context(config, ctx).unwrap();
    (temp_dir, state)
}

fn get<'a>(path: &'a str, accept_encoding: Option<&'a str>) -> Request<'a> {
    Request {
        method: b"GET",
        path,
        accept_encoding,
        if_none_match: None,
    }
}

#[cfg(test)]
mod scenario_tests {
    use super::*;

    #[test]
    fn test_s1_templated_index_via_root_alias() {
        let (_tree, state) = serve(
            &[("index.html", b"<p>{{ env.SITE }}</p>")],
            &[("SITE", "Hello")],
            false,
        );

        let response = state.handle(&get("/", Some("identity")));
        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.content_type, Some("text/html; charset=utf-8"));
        assert_eq!(response.cache_control, Some("public, max-age=900"));
        assert_eq!(response.content_encoding, None);
        assert_eq!(response.body.as_bytes(), b"<p>Hello</p>");
    }

    #[test]
    fn test_s2_no_accept_encoding_header() {
        let (_tree, state) = serve(
            &[("index.html", b"<p>{{ env.SITE }}</p>")],
            &[("SITE", "Hello")],
            false,
        );

        let response = state.handle(&get("/index.html", None));
        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.content_encoding, None);
        assert_eq!(response.body.as_bytes(), b"<p>Hello</p>");
    }

    #[test]
    fn test_s3_brotli_wins_negotiation() {
        let body = "console.log('pinned');".repeat(96); // ~2 KiB
        let (_tree, state) = serve(&[("assets/app.js", body.as_bytes())], &[], false);

        let response = state.handle(&get("/assets/app.js", Some("gzip, br, zstd")));
        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.content_encoding, Some("br"));
        assert_eq!(
            response.cache_control,
            Some("public, max-age=31536000, immutable")
        );

        let route = state.cache.lookup("/assets/app.js").unwrap();
        let brotli_variant = route.content.brotli.as_ref().unwrap();
        assert_eq!(response.body.as_bytes(), &brotli_variant[..]);
    }

    #[test]
    fn test_s4_unknown_coding_falls_back_to_plain() {
        let body = "console.log('pinned');".repeat(96);
        let (_tree, state) = serve(&[("assets/app.js", body.as_bytes())], &[], false);

        let response = state.handle(&get("/assets/app.js", Some("vibrant, identity;q=1")));
        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.content_encoding, None, "vibrant must not match br");
        assert_eq!(response.body.as_bytes(), body.as_bytes());
    }

    #[test]
    fn test_s5_miss_without_spa_is_404() {
        let (_tree, state) = serve(&[("index.html", b"<p>home</p>")], &[], false);

        let response = state.handle(&get("/no/such/path", None));
        assert_eq!(response.status, Status::NotFound);
        assert_eq!(response.body.as_bytes(), b"404 Not Found");
        assert_eq!(response.cache_control, None, "error responses are uncacheable");
        assert_eq!(response.etag, None);
    }

    #[test]
    fn test_s6_miss_with_spa_serves_root() {
        let (_tree, state) = serve(&[("index.html", b"<p>app shell</p>")], &[], true);

        let response = state.handle(&get("/no/such/path", None));
        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.content_type, Some("text/html; charset=utf-8"));
        assert_eq!(response.body.as_bytes(), b"<p>app shell</p>");
    }

    #[test]
    fn test_s7_if_none_match_yields_304() {
        let (_tree, state) = serve(&[("index.html", b"<p>home</p>")], &[], false);

        let etag = state.cache.lookup("/").unwrap().headers.etag.clone();
        let request = Request {
            method: b"GET",
            path: "/",
            accept_encoding: None,
            if_none_match: Some(etag.as_bytes()),
        };
        let response = state.handle(&request);
        assert_eq!(response.status, Status::NotModified);
        assert!(response.body.is_empty());
        assert_eq!(response.etag.as_deref(), Some(&*etag));
        assert!(response.cache_control.is_some());
        assert!(response.last_modified.is_some());
    }

    #[test]
    fn test_s8_post_is_method_not_allowed() {
        let (_tree, state) = serve(&[("index.html", b"<p>home</p>")], &[], false);

        let request = Request {
            method: b"POST",
            path: "/anything",
            accept_encoding: None,
            if_none_match: None,
        };
        let response = state.handle(&request);
        assert_eq!(response.status, Status::MethodNotAllowed);
        assert_eq!(response.allow, Some("GET, HEAD"));
    }
}

#[cfg(test)]
mod lookup_tests {
    use super::*;

    #[test]
    fn test_directory_index_without_trailing_slash() {
        let (_tree, state) = serve(&[("docs/index.html", b"<p>docs</p>")], &[], false);

        let response = state.handle(&get("/docs", None));
        assert_eq!(response.status, Status::Ok, "lookup retries with a trailing slash");
        assert_eq!(response.body.as_bytes(), b"<p>docs</p>");

        let response = state.handle(&get("/docs/", None));
        assert_eq!(response.status, Status::Ok);
    }

    #[test]
    fn test_traversal_segments_are_rejected() {
        let (_tree, state) = serve(&[("index.html", b"<p>home</p>")], &[], false);

        let response = state.handle(&get("/../etc/passwd", None));
        assert_eq!(response.status, Status::BadRequest);

        let response = state.handle(&get("/a/../../b", None));
        assert_eq!(response.status, Status::BadRequest);
    }

    #[test]
    fn test_nul_bytes_are_rejected() {
        let (_tree, state) = serve(&[("index.html", b"<p>home</p>")], &[], false);

        let response = state.handle(&get("/a\0b", None));
        assert_eq!(response.status, Status::BadRequest);
    }

    #[test]
    fn test_dot_segments_that_are_not_traversal_pass_through() {
        let (_tree, state) = serve(&[("files/..data.txt", b"dots")], &[], false);

        let response = state.handle(&get("/files/..data.txt", None));
        assert_eq!(response.status, Status::Ok, "..data is a name, not a traversal");
    }

    #[test]
    fn test_spa_fallback_without_root_index_is_404() {
        let (_tree, state) = serve(&[("docs/page.html", b"<p>page</p>")], &[], true);

        let response = state.handle(&get("/missing", None));
        assert_eq!(response.status, Status::NotFound, "spa mode needs a root route");
    }
}

#[cfg(test)]
mod health_tests {
    use super::*;

    #[test]
    fn test_health_endpoints_bypass_cache() {
        // No files at all: health must still answer
        let (_tree, state) = serve(&[], &[], false);

        for path in ["/_health", "/health"] {
            let response = state.handle(&get(path, None));
            assert_eq!(response.status, Status::Ok);
            assert_eq!(response.content_type, Some("application/json"));
            let body = String::from_utf8(response.body.as_bytes().to_vec()).unwrap();
            assert!(body.starts_with(r#"{"status":"ok","timestamp":""#), "body: {body}");
            assert!(body.contains('T'), "timestamp should be RFC 3339: {body}");
        }
    }

    #[test]
    fn test_health_head_is_empty_bodied() {
        let (_tree, state) = serve(&[], &[], false);

        let request = Request {
            method: b"HEAD",
            path: "/_health",
            accept_encoding: None,
            if_none_match: None,
        };
        let response = state.handle(&request);
        assert_eq!(response.status, Status::Ok);
        assert!(response.head);
        assert!(!response.body.is_empty(), "Content-Length still reflects the payload");
    }
}

#[cfg(test)]
mod head_tests {
    use super::*;

    #[test]
    fn test_head_matches_get() {
        let body = "body { margin: 0; }".repeat(40);
        let (_tree, state) = serve(&[("style.css", body.as_bytes())], &[], false);

        let get_response = state.handle(&get("/style.css", Some("gzip, br")));
        let head_request = Request {
            method: b"HEAD",
            path: "/style.css",
            accept_encoding: Some("gzip, br"),
            if_none_match: None,
        };
        let head_response = state.handle(&head_request);

        assert_eq!(head_response.status, get_response.status);
        assert_eq!(head_response.content_type, get_response.content_type);
        assert_eq!(head_response.content_encoding, get_response.content_encoding);
        assert_eq!(head_response.cache_control, get_response.cache_control);
        assert_eq!(head_response.etag, get_response.etag);
        assert_eq!(
            head_response.body.len(),
            get_response.body.len(),
            "Content-Length must agree between GET and HEAD"
        );
        assert!(head_response.head, "HEAD suppresses the body on the wire");
        assert!(!get_response.head);
    }

    #[test]
    fn test_head_on_missing_path() {
        let (_tree, state) = serve(&[], &[], false);

        let request = Request {
            method: b"HEAD",
            path: "/nope",
            accept_encoding: None,
            if_none_match: None,
        };
        let response = state.handle(&request);
        assert_eq!(response.status, Status::NotFound);
        assert!(response.head);
    }
}

#[cfg(test)]
mod conditional_tests {
    use super::*;

    #[test]
    fn test_mismatched_etag_serves_full_response() {
        let (_tree, state) = serve(&[("index.html", b"<p>home</p>")], &[], false);

        let request = Request {
            method: b"GET",
            path: "/",
            accept_encoding: None,
            if_none_match: Some(b"\"0000000000000000\""),
        };
        let response = state.handle(&request);
        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.body.as_bytes(), b"<p>home</p>");
    }

    #[test]
    fn test_unquoted_etag_does_not_match() {
        let (_tree, state) = serve(&[("index.html", b"<p>home</p>")], &[], false);

        let etag = state.cache.lookup("/").unwrap().headers.etag.clone();
        let stripped = etag.trim_matches('"').as_bytes().to_vec();
        let request = Request {
            method: b"GET",
            path: "/",
            accept_encoding: None,
            if_none_match: Some(&stripped),
        };
        let response = state.handle(&request);
        assert_eq!(
            response.status,
            Status::Ok,
            "comparison is byte-for-byte including quotes"
        );
    }
}

#[cfg(test)]
mod negotiation_tests {
    use super::*;

    fn full_content() -> Content {
        Content {
            plain: Arc::from(&b"plain-bytes"[..]),
            gzip: Some(Arc::from(&b"gzip-bytes"[..])),
            brotli: Some(Arc::from(&b"brotli-bytes"[..])),
            zstd: Some(Arc::from(&b"zstd-bytes"[..])),
        }
    }

    fn plain_only_content() -> Content {
        Content {
            plain: Arc::from(&b"plain-bytes"[..]),
            gzip: None,
            brotli: None,
            zstd: None,
        }
    }

    #[test]
    fn test_priority_order() {
        let content = full_content();
        assert_eq!(
            negotiate_encoding(Some("gzip, br, zstd"), &content),
            Encoding::Brotli
        );
        assert_eq!(negotiate_encoding(Some("gzip, zstd"), &content), Encoding::Zstd);
        assert_eq!(negotiate_encoding(Some("gzip"), &content), Encoding::Gzip);
        assert_eq!(negotiate_encoding(Some("identity"), &content), Encoding::Identity);
    }

    #[test]
    fn test_missing_header_means_identity() {
        assert_eq!(negotiate_encoding(None, &full_content()), Encoding::Identity);
    }

    #[test]
    fn test_quality_zero_disqualifies() {
        let content = full_content();
        assert_eq!(
            negotiate_encoding(Some("br;q=0, gzip"), &content),
            Encoding::Gzip
        );
        assert_eq!(
            negotiate_encoding(Some("br;q=0.0, zstd;q=0, gzip;q=0"), &content),
            Encoding::Identity
        );
    }

    #[test]
    fn test_quality_values_do_not_reorder_priority() {
        // Priority is fixed; q only gates eligibility
        let content = full_content();
        assert_eq!(
            negotiate_encoding(Some("gzip;q=1.0, br;q=0.1"), &content),
            Encoding::Brotli
        );
    }

    #[test]
    fn test_whole_token_matching() {
        let content = full_content();
        assert_eq!(negotiate_encoding(Some("vibrant"), &content), Encoding::Identity);
        assert_eq!(negotiate_encoding(Some("gzipped"), &content), Encoding::Identity);
        assert_eq!(negotiate_encoding(Some("zstandard"), &content), Encoding::Identity);
        assert_eq!(
            negotiate_encoding(Some("vibrant, gzip"), &content),
            Encoding::Gzip
        );
    }

    #[test]
    fn test_case_and_whitespace_tolerance() {
        let content = full_content();
        assert_eq!(negotiate_encoding(Some("BR"), &content), Encoding::Brotli);
        assert_eq!(
            negotiate_encoding(Some("  gzip ; q=0.5 , zstd "), &content),
            Encoding::Zstd
        );
    }

    #[test]
    fn test_malformed_quality_disqualifies() {
        let content = full_content();
        assert_eq!(negotiate_encoding(Some("br;q=abc, gzip"), &content), Encoding::Gzip);
    }

    #[test]
    fn test_missing_variants_are_skipped() {
        let content = plain_only_content();
        assert_eq!(
            negotiate_encoding(Some("gzip, br, zstd"), &content),
            Encoding::Identity,
            "incompressible routes only ever serve plain"
        );
    }

    #[test]
    fn test_selection_is_deterministic() {
        let content = full_content();
        let first = negotiate_encoding(Some("zstd, gzip, br"), &content);
        for _ in 0..16 {
            assert_eq!(negotiate_encoding(Some("zstd, gzip, br"), &content), first);
        }
    }
}
