use std::mem;
use std::str::FromStr;
use std::time::Duration;

use http::uri::Authority;
use http::uri::PathAndQuery;
use http::uri::Scheme;
use http::HeaderMap;
use http::HeaderValue;
use http::Method;
use http::Uri;

use crate::utils::compact_whitespace;
use crate::{Error, Result};

/// Signing context for request.
#[derive(Debug)]
pub struct SigningRequest {
    /// HTTP method.
    pub method: Method,
    /// HTTP scheme.
    pub scheme: Scheme,
    /// HTTP authority.
    pub authority: Authority,
    /// HTTP path, still percent encoded as it appeared in the uri.
    pub path: String,
    /// HTTP query parameters, percent decoded.
    pub query: Vec<(String, String)>,
    /// HTTP headers.
    pub headers: HeaderMap,
}

impl SigningRequest {
    /// Build a signing context from http::request::Parts.
    pub fn build(parts: &mut http::request::Parts) -> Result<Self> {
        let uri = mem::take(&mut parts.uri).into_parts();
        let paq = uri
            .path_and_query
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        Ok(SigningRequest {
            method: parts.method.clone(),
            scheme: uri.scheme.unwrap_or(Scheme::HTTP),
            authority: uri.authority.ok_or_else(|| {
                Error::request_invalid("request without authority is invalid for signing")
            })?,
            path: paq.path().to_string(),
            query: paq
                .query()
                .map(|v| {
                    form_urlencoded::parse(v.as_bytes())
                        .map(|(k, v)| (k.into_owned(), v.into_owned()))
                        .collect()
                })
                .unwrap_or_default(),

            // Take the headers out of the request to avoid copy.
            // We will return it back when apply the context.
            headers: mem::take(&mut parts.headers),
        })
    }

    /// Apply the signing context back to http::request::Parts.
    ///
    /// Query pairs are written as is, callers must have encoded them already.
    pub fn apply(mut self, parts: &mut http::request::Parts) -> Result<()> {
        let query_size = self.query_size();

        // Return headers back.
        mem::swap(&mut parts.headers, &mut self.headers);
        parts.method = self.method;
        parts.uri = {
            let mut uri_parts = mem::take(&mut parts.uri).into_parts();
            uri_parts.scheme = Some(self.scheme);
            uri_parts.authority = Some(self.authority);
            uri_parts.path_and_query = {
                let paq = if self.query.is_empty() {
                    self.path
                } else {
                    let mut s = self.path;
                    s.reserve(query_size + 1);

                    s.push('?');
                    for (i, (k, v)) in self.query.iter().enumerate() {
                        if i > 0 {
                            s.push('&');
                        }

                        s.push_str(k);
                        if !v.is_empty() {
                            s.push('=');
                            s.push_str(v);
                        }
                    }

                    s
                };

                Some(PathAndQuery::from_str(&paq)?)
            };
            Uri::from_parts(uri_parts)?
        };

        Ok(())
    }

    /// Is this request sent over an encrypted transport.
    pub fn is_https(&self) -> bool {
        self.scheme == Scheme::HTTPS
    }

    /// Get query size.
    #[inline]
    pub fn query_size(&self) -> usize {
        self.query
            .iter()
            .map(|(k, v)| k.len() + v.len() + 2)
            .sum::<usize>()
    }

    /// Push a new query pair into query list.
    #[inline]
    pub fn query_push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.query.push((key.into(), value.into()));
    }

    /// Normalize header value.
    ///
    /// Surrounding whitespace is trimmed and inner runs are compacted.
    pub fn header_value_normalize(v: &mut HeaderValue) -> Result<()> {
        let Ok(s) = v.to_str() else {
            // Opaque bytes are left untouched.
            return Ok(());
        };
        let normalized = compact_whitespace(s);
        if normalized != s {
            let sensitive = v.is_sensitive();
            *v = HeaderValue::from_str(&normalized)?;
            v.set_sensitive(sensitive);
        }
        Ok(())
    }
}

/// SigningMethod is the method that used in signing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SigningMethod {
    /// Signing with header.
    Header,
    /// Signing with query.
    Query(Duration),
}

impl From<Option<Duration>> for SigningMethod {
    fn from(expires_in: Option<Duration>) -> Self {
        match expires_in {
            Some(d) => SigningMethod::Query(d),
            None => SigningMethod::Header,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_build_then_apply_restores_request() -> Result<()> {
        let (mut parts, _) = http::Request::put("https://bucket.example.com/a%20b?x=1&y=2")
            .header("x-amz-meta-a", "  spaced   out  ")
            .body(())?
            .into_parts();

        let mut req = SigningRequest::build(&mut parts)?;
        assert!(req.is_https());
        assert_eq!(req.path, "/a%20b");
        assert_eq!(
            req.query,
            vec![("x".to_string(), "1".to_string()), ("y".to_string(), "2".to_string())]
        );

        for (_, v) in req.headers.iter_mut() {
            SigningRequest::header_value_normalize(v)?;
        }
        assert_eq!(req.headers["x-amz-meta-a"], "spaced out");
        req.query_push("z", "3");
        req.apply(&mut parts)?;

        assert_eq!(
            parts.uri.to_string(),
            "https://bucket.example.com/a%20b?x=1&y=2&z=3"
        );
        assert_eq!(parts.headers["x-amz-meta-a"], "spaced out");
        Ok(())
    }

    #[test]
    fn test_build_without_authority_fails() -> Result<()> {
        let (mut parts, _) = http::Request::get("/relative").body(())?.into_parts();
        let err = SigningRequest::build(&mut parts).expect_err("must fail");
        assert_eq!(err.kind(), crate::ErrorKind::RequestInvalid);
        Ok(())
    }

    #[test]
    fn test_signing_method_from_expiry() {
        assert_eq!(SigningMethod::from(None), SigningMethod::Header);
        assert_eq!(
            SigningMethod::from(Some(Duration::from_secs(60))),
            SigningMethod::Query(Duration::from_secs(60))
        );
    }
}
