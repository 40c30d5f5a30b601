use std::fmt::Write;

use chunksign_core::hash::hex_sha256;
use chunksign_core::utils::compact_whitespace;
use chunksign_core::{Error, Result, SigningRequest};
use http::HeaderMap;
use percent_encoding::{percent_decode_str, utf8_percent_encode};

use crate::constants::{AWS_QUERY_ENCODE_SET, AWS_URI_ENCODE_SET, HEADERS_NOT_SIGNED};

/// Options that change how the canonical uri is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalOptions {
    /// Encode the already encoded path a second time.
    ///
    /// Every service except S3 expects this.
    pub double_url_encode: bool,
    /// Remove `.`/`..` and empty segments from the path.
    ///
    /// Disable it to keep consecutive slashes and dot segments byte-for-byte.
    pub normalize_path: bool,
}

impl Default for CanonicalOptions {
    fn default() -> Self {
        Self {
            double_url_encode: true,
            normalize_path: true,
        }
    }
}

impl CanonicalOptions {
    /// Options used by S3, the path is encoded once and never normalized.
    pub fn s3() -> Self {
        Self {
            double_url_encode: false,
            normalize_path: false,
        }
    }
}

/// CanonicalRequest is the exact byte input of the request signature.
///
/// ```text
/// METHOD
/// CANONICAL_URI
/// CANONICAL_QUERY
/// CANONICAL_HEADERS
///
/// SIGNED_HEADERS
/// CONTENT_HASH
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest {
    canonical: String,
    signed_headers: String,
    hash: String,
}

impl CanonicalRequest {
    /// Build the canonical request.
    ///
    /// `req.query` is expected to be percent decoded, `content_hash` is the
    /// payload hash or one of the sentinel tokens.
    pub fn build(
        req: &SigningRequest,
        content_hash: &str,
        options: CanonicalOptions,
    ) -> Result<Self> {
        // 256 is specially chosen to avoid reallocation for most requests.
        let mut f = String::with_capacity(256);

        writeln!(f, "{}", req.method)?;
        writeln!(f, "{}", canonical_uri(&req.path, options))?;
        writeln!(f, "{}", canonical_query_string(&req.query))?;

        let (headers, signed_headers) = canonical_headers(&req.headers)?;
        for (name, value) in headers.iter() {
            writeln!(f, "{name}:{value}")?;
        }
        writeln!(f)?;
        writeln!(f, "{signed_headers}")?;
        write!(f, "{content_hash}")?;

        let hash = hex_sha256(f.as_bytes());
        Ok(Self {
            canonical: f,
            signed_headers,
            hash,
        })
    }

    /// The canonical request string.
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Signed header names joined by `;`.
    pub fn signed_headers(&self) -> &str {
        &self.signed_headers
    }

    /// Lowercase hex SHA-256 of the canonical request.
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

/// Build the canonical uri from a percent encoded path.
pub fn canonical_uri(path: &str, options: CanonicalOptions) -> String {
    let decoded = percent_decode_str(path).decode_utf8_lossy();
    let path = if options.normalize_path {
        normalize_path(&decoded)
    } else {
        decoded.into_owned()
    };

    let mut encoded = utf8_percent_encode(&path, &AWS_URI_ENCODE_SET).to_string();
    if options.double_url_encode {
        encoded = utf8_percent_encode(&encoded, &AWS_URI_ENCODE_SET).to_string();
    }

    if encoded.is_empty() {
        "/".to_string()
    } else {
        encoded
    }
}

fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            v => segments.push(v),
        }
    }

    let mut out = String::with_capacity(path.len());
    out.push('/');
    out.push_str(&segments.join("/"));
    if path.ends_with('/') && !segments.is_empty() {
        out.push('/');
    }
    out
}

/// Encode and sort decoded query pairs.
pub fn canonical_query(query: &[(String, String)]) -> Vec<(String, String)> {
    let mut pairs = query
        .iter()
        .map(|(k, v)| {
            (
                utf8_percent_encode(k, &AWS_QUERY_ENCODE_SET).to_string(),
                utf8_percent_encode(v, &AWS_QUERY_ENCODE_SET).to_string(),
            )
        })
        .collect::<Vec<_>>();
    pairs.sort();
    pairs
}

fn canonical_query_string(query: &[(String, String)]) -> String {
    canonical_query(query)
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Names of the headers that will be signed, sorted.
pub fn signed_header_names(headers: &HeaderMap) -> Vec<&str> {
    let mut names = headers
        .keys()
        .map(|k| k.as_str())
        .filter(|k| !HEADERS_NOT_SIGNED.contains(k))
        .collect::<Vec<_>>();
    names.sort_unstable();
    names
}

/// Canonical `(name, value)` pairs plus the signed header list.
///
/// `HeaderMap` keeps every value of a name in insertion order, so joining
/// them with `,` is stable for repeated headers.
fn canonical_headers(headers: &HeaderMap) -> Result<(Vec<(String, String)>, String)> {
    let names = signed_header_names(headers);
    let mut out = Vec::with_capacity(names.len());
    for name in names.iter() {
        let mut values = Vec::new();
        for value in headers.get_all(*name) {
            let value = value.to_str().map_err(|e| {
                Error::request_invalid(format!("header {name} is not valid ascii")).with_source(e)
            })?;
            values.push(compact_whitespace(value));
        }
        out.push((name.to_string(), values.join(",")));
    }

    Ok((out, names.join(";")))
}
