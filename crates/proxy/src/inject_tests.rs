// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write as _;

const SCRIPT: &str = "<script>agent()</script>";

fn inject_all(html: &str) -> String {
    let mut injector = HtmlInjector::new(SCRIPT);
    let mut out = injector.push(html.as_bytes());
    out.extend(injector.finish());
    String::from_utf8(out).unwrap()
}

#[test]
fn injects_right_after_head() {
    let out = inject_all("<html><head><title>x</title></head><body></body></html>");
    assert_eq!(
        out,
        "<html><head><script>agent()</script><title>x</title></head><body></body></html>"
    );
}

#[test]
fn head_with_attributes() {
    let out = inject_all("<html><head data-x=\"1\"><title>x</title></head></html>");
    assert!(out.starts_with("<html><head data-x=\"1\"><script>agent()</script>"));
}

#[test]
fn head_match_is_case_insensitive() {
    let out = inject_all("<HTML><HEAD></HEAD></HTML>");
    assert!(out.contains("<HEAD><script>agent()</script></HEAD>"));
}

#[test]
fn header_element_is_not_head() {
    let out = inject_all("<html><body><header>nav</header></body></html>");
    // Falls back to the top of <body>, not inside <header>.
    assert!(out.contains("<body><script>agent()</script><header>"));
}

#[test]
fn falls_back_to_body() {
    let out = inject_all("<html><body class=\"app\">hi</body></html>");
    assert!(out.contains("<body class=\"app\"><script>agent()</script>hi"));
}

#[test]
fn no_markers_prepends() {
    let out = inject_all("just a fragment");
    assert_eq!(out, "<script>agent()</script>just a fragment");
}

#[test]
fn marker_split_across_chunks() {
    let mut injector = HtmlInjector::new(SCRIPT);
    let mut out = injector.push(b"<html><he");
    assert!(out.is_empty());
    out.extend(injector.push(b"ad><title>x</title></head>"));
    out.extend(injector.finish());
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("<head><script>agent()</script><title>"));
}

#[test]
fn tail_streams_through_after_injection() {
    let mut injector = HtmlInjector::new(SCRIPT);
    let first = injector.push(b"<head></head>");
    assert!(!first.is_empty());
    // Later chunks pass through verbatim without buffering.
    let tail = injector.push(b"<body>chunk</body>");
    assert_eq!(tail, b"<body>chunk</body>".to_vec());
}

#[test]
fn gzip_round_trip_via_buffered_pipeline() {
    let html = "<html><head><title>x</title></head><body>ok</body></html>";
    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(html.as_bytes()).unwrap();
    let compressed = enc.finish().unwrap();

    let out = inject_buffered(&compressed, Encoding::Gzip, SCRIPT, None).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("<head><script>agent()</script><title>x</title></head>"));
    assert!(text.ends_with("</html>"));
}

#[test]
fn deflate_decoding() {
    let html = "<head></head>";
    let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(html.as_bytes()).unwrap();
    let compressed = enc.finish().unwrap();

    let out = inject_buffered(&compressed, Encoding::Deflate, SCRIPT, None).unwrap();
    assert!(String::from_utf8(out).unwrap().contains("agent()"));
}

#[test]
fn corrupt_gzip_is_an_error() {
    assert!(inject_buffered(b"not gzip", Encoding::Gzip, SCRIPT, None).is_err());
}

#[test]
fn streaming_decoder_handles_chunked_gzip() {
    let html = "<head></head>".repeat(100);
    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(html.as_bytes()).unwrap();
    let compressed = enc.finish().unwrap();

    let mut decoder = StreamDecoder::new(Encoding::Gzip);
    let mut decoded = Vec::new();
    for chunk in compressed.chunks(7) {
        decoded.extend(decoder.push(chunk).unwrap());
    }
    decoded.extend(decoder.finish().unwrap());
    assert_eq!(String::from_utf8(decoded).unwrap(), html);
}

#[test]
fn encoding_header_parsing() {
    assert_eq!(Encoding::from_header(Some("gzip")), Encoding::Gzip);
    assert_eq!(Encoding::from_header(Some("GZIP")), Encoding::Gzip);
    assert_eq!(Encoding::from_header(Some("deflate")), Encoding::Deflate);
    assert_eq!(Encoding::from_header(Some("br")), Encoding::Identity);
    assert_eq!(Encoding::from_header(None), Encoding::Identity);
}

#[test]
fn rewrites_self_referential_origins() {
    let html = "<a href=\"http://localhost:3000/page\">x</a>";
    let out = rewrite_origins(html, "http://localhost:3000", "https://demo.tunnel.dev");
    assert_eq!(out, "<a href=\"https://demo.tunnel.dev/page\">x</a>");
}

#[test]
fn rewrite_is_noop_for_same_origin() {
    let html = "<a href=\"http://x/\">x</a>";
    assert_eq!(rewrite_origins(html, "http://x", "http://x"), html);
}
