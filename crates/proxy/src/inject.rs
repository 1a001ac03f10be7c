// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTML injection pipeline: decode, splice, re-emit.
//!
//! Compressed bodies (gzip/deflate) are decoded incrementally; the
//! injector buffers only up to the insertion point and then passes
//! the remainder through chunk by chunk. Re-emission is always
//! uncompressed — the caller strips `Content-Encoding` and
//! `Content-Length` and lets the transfer go chunked.

use std::io::{self, Write};

use flate2::write::{GzDecoder, ZlibDecoder};

/// Give up scanning for a marker after this much buffered HTML and
/// fall back to prepending at the document start.
const MAX_SCAN_BYTES: usize = 64 * 1024;

/// Supported response content encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Identity,
    Gzip,
    Deflate,
}

impl Encoding {
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "gzip" || v == "x-gzip" => Encoding::Gzip,
            Some(v) if v == "deflate" => Encoding::Deflate,
            _ => Encoding::Identity,
        }
    }
}

enum DecoderKind {
    Identity,
    Gzip(GzDecoder<Vec<u8>>),
    Deflate(ZlibDecoder<Vec<u8>>),
}

/// Incremental body decoder.
pub struct StreamDecoder {
    kind: DecoderKind,
}

impl StreamDecoder {
    pub fn new(encoding: Encoding) -> Self {
        let kind = match encoding {
            Encoding::Identity => DecoderKind::Identity,
            Encoding::Gzip => DecoderKind::Gzip(GzDecoder::new(Vec::new())),
            Encoding::Deflate => DecoderKind::Deflate(ZlibDecoder::new(Vec::new())),
        };
        Self { kind }
    }

    /// Feed one compressed chunk, returning whatever decodes now.
    pub fn push(&mut self, chunk: &[u8]) -> io::Result<Vec<u8>> {
        match &mut self.kind {
            DecoderKind::Identity => Ok(chunk.to_vec()),
            DecoderKind::Gzip(dec) => {
                dec.write_all(chunk)?;
                Ok(std::mem::take(dec.get_mut()))
            }
            DecoderKind::Deflate(dec) => {
                dec.write_all(chunk)?;
                Ok(std::mem::take(dec.get_mut()))
            }
        }
    }

    /// Flush the trailing decoded bytes.
    pub fn finish(self) -> io::Result<Vec<u8>> {
        match self.kind {
            DecoderKind::Identity => Ok(Vec::new()),
            DecoderKind::Gzip(dec) => dec.finish(),
            DecoderKind::Deflate(dec) => dec.finish(),
        }
    }
}

/// Streaming `<script>` splicer.
///
/// Buffers decoded HTML until it finds the insertion point — as close
/// to the start of `<head>` as possible, falling back to the top of
/// `<body>`, then to prepending at the document start — and emits
/// everything after injection without further buffering.
pub struct HtmlInjector {
    script: Vec<u8>,
    pending: Vec<u8>,
    injected: bool,
}

impl HtmlInjector {
    pub fn new(script: &str) -> Self {
        Self {
            script: script.as_bytes().to_vec(),
            pending: Vec::new(),
            injected: false,
        }
    }

    /// Feed decoded HTML, returning bytes ready to send downstream.
    pub fn push(&mut self, decoded: &[u8]) -> Vec<u8> {
        if self.injected {
            return decoded.to_vec();
        }
        self.pending.extend_from_slice(decoded);

        if let Some(pos) = self.insertion_point() {
            let mut out = Vec::with_capacity(self.pending.len() + self.script.len());
            out.extend_from_slice(&self.pending[..pos]);
            out.extend_from_slice(&self.script);
            out.extend_from_slice(&self.pending[pos..]);
            self.pending.clear();
            self.injected = true;
            return out;
        }

        if self.pending.len() > MAX_SCAN_BYTES {
            // No marker in a reasonable prefix; prepend and stream on.
            let mut out = Vec::with_capacity(self.pending.len() + self.script.len());
            out.extend_from_slice(&self.script);
            out.append(&mut self.pending);
            self.injected = true;
            return out;
        }

        Vec::new()
    }

    /// Flush at end of body; injects at the start when no marker was found.
    pub fn finish(&mut self) -> Vec<u8> {
        if self.injected {
            return Vec::new();
        }
        self.injected = true;
        let mut out = Vec::with_capacity(self.pending.len() + self.script.len());
        out.extend_from_slice(&self.script);
        out.append(&mut self.pending);
        out
    }

    /// Byte offset right after `<head…>`, else right after `<body…>`.
    ///
    /// Returns None while neither tag has fully arrived. A `<body` hit
    /// is authoritative: in well-formed HTML no `<head>` follows it.
    fn insertion_point(&self) -> Option<usize> {
        if let Some(pos) = find_tag_end(&self.pending, b"<head") {
            return Some(pos);
        }
        if let Some(pos) = find_tag_end(&self.pending, b"<body") {
            return Some(pos);
        }
        None
    }
}

/// Find the offset just past the `>` of an opening tag, matching
/// case-insensitively and rejecting longer names (`<header>`).
fn find_tag_end(haystack: &[u8], tag: &[u8]) -> Option<usize> {
    let mut start = 0;
    while let Some(rel) = find_ci(&haystack[start..], tag) {
        let tag_start = start + rel;
        let after = tag_start + tag.len();
        match haystack.get(after) {
            Some(b'>') => return Some(after + 1),
            Some(c) if c.is_ascii_whitespace() => {
                // Attributes follow; need the closing '>'.
                return haystack[after..]
                    .iter()
                    .position(|&b| b == b'>')
                    .map(|close| after + close + 1);
            }
            Some(_) => {
                start = after;
                continue;
            }
            None => return None,
        }
    }
    None
}

fn find_ci(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

/// Rewrite absolute self-referential URLs so tunneled clients reach
/// the proxy's public origin instead of the local target.
pub fn rewrite_origins(html: &str, target_origin: &str, public_origin: &str) -> String {
    if target_origin.is_empty() || target_origin == public_origin {
        return html.to_string();
    }
    html.replace(target_origin, public_origin)
}

/// One-shot pipeline for fully-buffered bodies (used when a public URL
/// rewrite forces whole-document processing).
pub fn inject_buffered(
    body: &[u8],
    encoding: Encoding,
    script: &str,
    rewrite: Option<(&str, &str)>,
) -> io::Result<Vec<u8>> {
    let mut decoder = StreamDecoder::new(encoding);
    let mut decoded = decoder.push(body)?;
    decoded.extend(decoder.finish()?);

    let mut injector = HtmlInjector::new(script);
    let mut out = injector.push(&decoded);
    out.extend(injector.finish());

    match rewrite {
        Some((target, public)) => {
            let text = String::from_utf8_lossy(&out);
            Ok(rewrite_origins(&text, target, public).into_bytes())
        }
        None => Ok(out),
    }
}

#[cfg(test)]
#[path = "inject_tests.rs"]
mod tests;
