use std::fmt::{Debug, Formatter};
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chunksign_core::hash::{base64_encode, hex_hmac_sha256, EMPTY_STRING_SHA256};
use chunksign_core::time::{now, DateTime};
use chunksign_core::{Context, Error, Result, SignRequest, SigningMethod, SigningRequest};
use futures::stream::BoxStream;
use http::header::{AUTHORIZATION, CONTENT_ENCODING, CONTENT_LENGTH, HOST};
use http::request::Parts;
use http::HeaderValue;
use log::{debug, warn};

use crate::canonical::{canonical_query, signed_header_names, CanonicalOptions, CanonicalRequest};
use crate::checksum::ChecksumAlgorithm;
use crate::checksum_stream::ChecksumReader;
use crate::chunked::{
    encoded_length, move_content_length, take_trailers, AwsChunkedReader, AwsChunkedStream,
    ChunkEncoder,
};
use crate::constants::*;
use crate::key_cache::{derive_signing_key, SigningKey};
use crate::rolling::{EcdsaChunkSigner, HmacChunkSigner, RollingSigner, SignAsymmetric, Signature};
use crate::{Config, Credential, CredentialScope};

/// Blocking body source that can be replayed from the start.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Payload handed to the signer together with the request head.
pub enum Payload {
    /// No body.
    Empty,
    /// Body fully in memory.
    Bytes(Bytes),
    /// Seekable body, read from the start.
    Reader(Box<dyn ReadSeek>),
    /// Single shot async body of a known length.
    Stream {
        /// Body content.
        stream: BoxStream<'static, io::Result<Bytes>>,
        /// Number of bytes the stream yields.
        content_length: u64,
    },
}

impl Payload {
    /// Wrap a seekable reader.
    pub fn reader(r: impl ReadSeek + 'static) -> Self {
        Payload::Reader(Box::new(r))
    }

    /// Raw length of the payload.
    ///
    /// Readers are measured by seeking to their end and back to the start.
    fn content_length(&mut self) -> Result<u64> {
        match self {
            Payload::Empty => Ok(0),
            Payload::Bytes(bs) => Ok(bs.len() as u64),
            Payload::Reader(r) => {
                let len = r.seek(SeekFrom::End(0))?;
                r.rewind()?;
                Ok(len)
            }
            Payload::Stream { content_length, .. } => Ok(*content_length),
        }
    }

    /// Raw digests over the whole payload, one per algorithm.
    fn digests(&mut self, algorithms: &[ChecksumAlgorithm]) -> Result<Vec<Vec<u8>>> {
        match self {
            Payload::Empty => Ok(algorithms.iter().map(|v| v.compute(&[])).collect()),
            Payload::Bytes(bs) => Ok(algorithms.iter().map(|v| v.compute(bs)).collect()),
            Payload::Reader(r) => {
                let mut cr = ChecksumReader::new(r, algorithms);
                io::copy(&mut cr, &mut io::sink())?;
                let digests = algorithms
                    .iter()
                    .map(|v| cr.digest(*v).map(<[u8]>::to_vec))
                    .collect::<Result<Vec<_>>>()?;
                cr.into_inner().rewind()?;
                Ok(digests)
            }
            Payload::Stream { .. } => Err(Error::request_invalid(
                "stream payload can not be hashed up front, enable chunk encoding instead",
            )),
        }
    }
}

impl Debug for Payload {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Empty => f.write_str("Empty"),
            Payload::Bytes(bs) => f.debug_tuple("Bytes").field(&bs.len()).finish(),
            Payload::Reader(_) => f.write_str("Reader"),
            Payload::Stream { content_length, .. } => f
                .debug_struct("Stream")
                .field("content_length", content_length)
                .finish_non_exhaustive(),
        }
    }
}

/// Body to transmit after signing.
pub enum SignedPayload {
    /// No body.
    Empty,
    /// Unmodified in-memory body.
    Bytes(Bytes),
    /// Unmodified reader, positioned at the start.
    Reader(Box<dyn ReadSeek>),
    /// Unmodified stream.
    Stream(BoxStream<'static, io::Result<Bytes>>),
    /// `aws-chunked` framing over a replayable source.
    Chunked(AwsChunkedReader<Box<dyn ReadSeek>>),
    /// `aws-chunked` framing over a single shot stream.
    ChunkedStream(AwsChunkedStream<BoxStream<'static, io::Result<Bytes>>>),
}

impl From<Payload> for SignedPayload {
    fn from(body: Payload) -> Self {
        match body {
            Payload::Empty => SignedPayload::Empty,
            Payload::Bytes(bs) => SignedPayload::Bytes(bs),
            Payload::Reader(r) => SignedPayload::Reader(r),
            Payload::Stream { stream, .. } => SignedPayload::Stream(stream),
        }
    }
}

impl Debug for SignedPayload {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SignedPayload::Empty => f.write_str("Empty"),
            SignedPayload::Bytes(bs) => f.debug_tuple("Bytes").field(&bs.len()).finish(),
            SignedPayload::Reader(_) => f.write_str("Reader"),
            SignedPayload::Stream(_) => f.write_str("Stream"),
            SignedPayload::Chunked(r) => f.debug_tuple("Chunked").field(r.encoder()).finish(),
            SignedPayload::ChunkedStream(_) => f.write_str("ChunkedStream"),
        }
    }
}

/// Algorithm used for the request signature and rolling chunk signatures.
#[derive(Debug, Clone)]
pub enum SigningAlgorithm {
    /// SigV4, `AWS4-HMAC-SHA256`.
    HmacSha256,
    /// SigV4a, `AWS4-ECDSA-P256-SHA256`, signed by an external provider.
    EcdsaP256Sha256(Arc<dyn SignAsymmetric>),
}

impl SigningAlgorithm {
    fn name(&self) -> &'static str {
        match self {
            SigningAlgorithm::HmacSha256 => HMAC_SHA256_ALGORITHM,
            SigningAlgorithm::EcdsaP256Sha256(_) => ECDSA_P256_SHA256_ALGORITHM,
        }
    }

    fn signature_hex_len(&self) -> usize {
        match self {
            SigningAlgorithm::HmacSha256 => HMAC_SIGNATURE_HEX_LEN,
            SigningAlgorithm::EcdsaP256Sha256(_) => ECDSA_SIGNATURE_HEX_LEN,
        }
    }

    fn streaming_sentinel(&self, trailer: bool) -> &'static str {
        match (self, trailer) {
            (SigningAlgorithm::HmacSha256, false) => STREAMING_HMAC_PAYLOAD,
            (SigningAlgorithm::HmacSha256, true) => STREAMING_HMAC_PAYLOAD_TRAILER,
            (SigningAlgorithm::EcdsaP256Sha256(_), false) => STREAMING_ECDSA_PAYLOAD,
            (SigningAlgorithm::EcdsaP256Sha256(_), true) => STREAMING_ECDSA_PAYLOAD_TRAILER,
        }
    }
}

/// How the body takes part in the signature.
#[derive(Debug, Clone, PartialEq, Eq)]
enum BodyMode {
    /// `UNSIGNED-PAYLOAD`, optional checksum header.
    Unsigned,
    /// Literal SHA-256 of the whole payload, optional checksum header.
    Hashed,
    /// Fixed event stream sentinel.
    Events,
    /// `aws-chunked` framing.
    Chunked { content_hash: &'static str, signed: bool },
}

/// RequestSigner that implement AWS SigV4 and SigV4a.
///
/// - [Signature Version 4 signing process](https://docs.aws.amazon.com/general/latest/gr/signature-version-4.html)
/// - [Signature calculations for streaming uploads](https://docs.aws.amazon.com/AmazonS3/latest/API/sigv4-streaming.html)
#[derive(Debug, Clone)]
pub struct RequestSigner {
    service: String,
    region: String,
    algorithm: SigningAlgorithm,

    payload_signing: bool,
    chunk_encoding: bool,
    chunk_size: usize,
    checksum_algorithm: Option<ChecksumAlgorithm>,
    event_stream: bool,
    double_url_encode: bool,
    normalize_path: bool,

    time: Option<DateTime>,
}

impl RequestSigner {
    /// Create a new builder for AWS V4 signer.
    ///
    /// S3 paths are encoded once and not normalized, every other service
    /// gets both.
    pub fn new(service: &str, region: &str) -> Self {
        let not_s3 = service != "s3";
        Self {
            service: service.into(),
            region: region.into(),
            algorithm: SigningAlgorithm::HmacSha256,

            payload_signing: false,
            chunk_encoding: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            checksum_algorithm: None,
            event_stream: false,
            double_url_encode: not_s3,
            normalize_path: not_s3,

            time: None,
        }
    }

    /// Build a signer from config.
    ///
    /// `service` and `region` are required.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let service = cfg
            .service
            .as_deref()
            .ok_or_else(|| Error::config_invalid("service is required to sign requests"))?;
        let region = cfg
            .region
            .as_deref()
            .ok_or_else(|| Error::config_invalid("region is required to sign requests"))?;

        let mut signer = Self::new(service, region);
        if let Some(v) = cfg.payload_signing {
            signer.payload_signing = v;
        }
        if let Some(v) = cfg.chunk_encoding {
            signer.chunk_encoding = v;
        }
        if let Some(v) = cfg.chunk_size {
            if v < MIN_CHUNK_SIZE {
                return Err(Error::config_invalid(format!(
                    "chunk size {v} is below the minimum of {MIN_CHUNK_SIZE} bytes"
                )));
            }
            signer.chunk_size = v;
        }
        signer.checksum_algorithm = cfg.checksum_algorithm;
        if let Some(v) = cfg.double_url_encode {
            signer.double_url_encode = v;
        }
        if let Some(v) = cfg.normalize_path {
            signer.normalize_path = v;
        }
        Ok(signer)
    }

    /// Sign with SigV4a through `provider`.
    pub fn with_asymmetric_signer(mut self, provider: Arc<dyn SignAsymmetric>) -> Self {
        self.algorithm = SigningAlgorithm::EcdsaP256Sha256(provider);
        self
    }

    /// Hash the payload instead of sending `UNSIGNED-PAYLOAD`.
    ///
    /// Payloads sent over plaintext are always signed.
    pub fn with_payload_signing(mut self, enabled: bool) -> Self {
        self.payload_signing = enabled;
        self
    }

    /// Frame non-empty payloads with `aws-chunked`.
    pub fn with_chunk_encoding(mut self, enabled: bool) -> Self {
        self.chunk_encoding = enabled;
        self
    }

    /// Size of each data chunk.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Send a flexible checksum, as header or as trailer when chunked.
    pub fn with_checksum_algorithm(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.checksum_algorithm = Some(algorithm);
        self
    }

    /// Mark the body as an event stream.
    pub fn with_event_stream(mut self, enabled: bool) -> Self {
        self.event_stream = enabled;
        self
    }

    /// Encode the path a second time.
    pub fn with_double_url_encode(mut self, enabled: bool) -> Self {
        self.double_url_encode = enabled;
        self
    }

    /// Remove dot and empty segments from the path.
    pub fn with_normalize_path(mut self, enabled: bool) -> Self {
        self.normalize_path = enabled;
        self
    }

    /// Specify the signing time.
    ///
    /// # Note
    ///
    /// We should always take current time to sign requests.
    /// Only use this function for testing.
    pub fn with_time(mut self, time: DateTime) -> Self {
        self.time = Some(time);
        self
    }

    fn body_mode(
        &self,
        req: &SigningRequest,
        method: SigningMethod,
        content_length: u64,
    ) -> Result<BodyMode> {
        if let SigningMethod::Query(_) = method {
            return Ok(BodyMode::Unsigned);
        }
        if self.event_stream {
            return Ok(BodyMode::Events);
        }

        let mut payload_signing = self.payload_signing;
        if !payload_signing && content_length > 0 && !req.is_https() {
            warn!(
                "payload of {content_length} bytes is sent over plaintext to {}, payload signing is enforced",
                req.authority
            );
            payload_signing = true;
        }

        if !self.chunk_encoding || content_length == 0 {
            return Ok(if payload_signing {
                BodyMode::Hashed
            } else {
                BodyMode::Unsigned
            });
        }

        let trailer = self.checksum_algorithm.is_some() || req.headers.contains_key(X_AMZ_TRAILER);
        if payload_signing {
            Ok(BodyMode::Chunked {
                content_hash: self.algorithm.streaming_sentinel(trailer),
                signed: true,
            })
        } else if trailer {
            Ok(BodyMode::Chunked {
                content_hash: STREAMING_UNSIGNED_PAYLOAD_TRAILER,
                signed: false,
            })
        } else {
            Err(Error::config_invalid(
                "unsigned chunked payload requires a checksum or a trailer",
            ))
        }
    }
}

#[async_trait]
impl SignRequest for RequestSigner {
    type Credential = Credential;
    type Body = Payload;
    type SignedBody = SignedPayload;

    async fn sign_request(
        &self,
        _: &Context,
        parts: &mut Parts,
        mut body: Self::Body,
        credential: Option<&Self::Credential>,
        expires_in: Option<Duration>,
    ) -> Result<Self::SignedBody> {
        let Some(cred) = credential.map(Credential::trimmed) else {
            return Ok(body.into());
        };
        if cred.is_anonymous() {
            debug!("anonymous credential, request is sent unsigned");
            return Ok(body.into());
        }

        let method = SigningMethod::from(expires_in);
        if let SigningMethod::Query(expire) = method {
            if expire > PRESIGN_MAX_EXPIRY {
                return Err(Error::config_invalid(format!(
                    "presigned url expiry of {}s exceeds the maximum of {}s",
                    expire.as_secs(),
                    PRESIGN_MAX_EXPIRY.as_secs()
                )));
            }
        }
        if self.chunk_size == 0 {
            return Err(Error::config_invalid("chunk size must be positive"));
        }

        let now = self.time.unwrap_or_else(now);
        let region = cred
            .credential_scope
            .clone()
            .unwrap_or_else(|| self.region.clone());
        let scope = CredentialScope::new(&region, &self.service, now);
        let scope_str = match self.algorithm {
            SigningAlgorithm::HmacSha256 => scope.to_string(),
            SigningAlgorithm::EcdsaP256Sha256(_) => scope.to_asymmetric_string(),
        };
        debug!("calculated scope: {scope_str}");

        let mut req = SigningRequest::build(parts)?;
        let content_length = body.content_length()?;
        let mode = self.body_mode(&req, method, content_length)?;

        // Work out the content hash and prepare the body.
        let mut encoder = None;
        let content_hash = match &mode {
            BodyMode::Unsigned | BodyMode::Hashed => {
                // Only an aws-chunked body can carry trailers.
                if self.chunk_encoding && req.headers.remove(X_AMZ_TRAILER).is_some() {
                    warn!("body is not chunk encoded, dropping {X_AMZ_TRAILER} header");
                }

                let mut algorithms = Vec::with_capacity(2);
                if mode == BodyMode::Hashed {
                    algorithms.push(ChecksumAlgorithm::Sha256);
                }
                if method == SigningMethod::Header {
                    algorithms.extend(self.checksum_algorithm);
                }

                let digests = if algorithms.is_empty() {
                    Vec::new()
                } else {
                    body.digests(&algorithms)?
                };
                for (alg, digest) in algorithms.iter().zip(digests.iter()) {
                    if *alg != ChecksumAlgorithm::Sha256 || Some(*alg) == self.checksum_algorithm {
                        req.headers.insert(
                            alg.header_name(),
                            HeaderValue::try_from(base64_encode(digest))?,
                        );
                    }
                }

                match (&mode, digests.first()) {
                    (BodyMode::Hashed, Some(sha256)) => hex::encode(sha256),
                    (BodyMode::Hashed, None) => EMPTY_STRING_SHA256.to_string(),
                    _ => UNSIGNED_PAYLOAD.to_string(),
                }
            }
            BodyMode::Events => STREAMING_HMAC_EVENTS.to_string(),
            BodyMode::Chunked {
                content_hash,
                signed,
            } => {
                let decoded = move_content_length(&mut req.headers, Some(content_length))?;
                let trailers = take_trailers(&mut req.headers)?;

                let mut e = ChunkEncoder::new(self.chunk_size)?;
                for (name, value) in trailers.iter() {
                    e = e.with_trailer(name.as_str(), value.as_str());
                }
                if let Some(alg) = self.checksum_algorithm {
                    e = e.with_checksum(alg);
                }

                let encoded = encoded_length(
                    decoded,
                    self.chunk_size,
                    signed.then(|| self.algorithm.signature_hex_len()),
                    &trailers,
                    self.checksum_algorithm,
                );
                req.headers.insert(CONTENT_LENGTH, HeaderValue::from(encoded));

                let content_encoding = match req.headers.get(CONTENT_ENCODING) {
                    Some(v) if !v.to_str()?.trim().is_empty() => {
                        format!("{AWS_CHUNKED},{}", v.to_str()?.trim())
                    }
                    _ => AWS_CHUNKED.to_string(),
                };
                req.headers
                    .insert(CONTENT_ENCODING, HeaderValue::try_from(content_encoding)?);

                let names = e.trailer_names();
                if !names.is_empty() {
                    req.headers
                        .insert(X_AMZ_TRAILER, HeaderValue::try_from(names.join(","))?);
                }

                encoder = Some((e, *signed));
                content_hash.to_string()
            }
        };

        // Canonicalize headers.
        for value in req.headers.values_mut() {
            SigningRequest::header_value_normalize(value)?;
        }
        if !req.headers.contains_key(HOST) {
            let host = HeaderValue::try_from(req.authority.as_str())?;
            req.headers.insert(HOST, host);
        }

        match method {
            SigningMethod::Header => {
                req.headers
                    .insert(X_AMZ_DATE, HeaderValue::try_from(scope.datetime())?);
                if let Some(token) = &cred.session_token {
                    let mut value = HeaderValue::from_str(token)?;
                    // Set token value sensitive to avoid leaking.
                    value.set_sensitive(true);
                    req.headers.insert(X_AMZ_SECURITY_TOKEN, value);
                }
                req.headers
                    .insert(X_AMZ_CONTENT_SHA_256, HeaderValue::try_from(&content_hash)?);
                if let SigningAlgorithm::EcdsaP256Sha256(_) = self.algorithm {
                    req.headers
                        .insert(X_AMZ_REGION_SET, HeaderValue::try_from(scope.region())?);
                }
            }
            SigningMethod::Query(expire) => {
                req.query_push(X_AMZ_ALGORITHM_QUERY, self.algorithm.name());
                req.query_push(
                    X_AMZ_CREDENTIAL_QUERY,
                    format!("{}/{scope_str}", cred.access_key_id),
                );
                req.query_push(X_AMZ_DATE_QUERY, scope.datetime());
                req.query_push(X_AMZ_EXPIRES_QUERY, expire.as_secs().to_string());
                req.query_push(
                    X_AMZ_SIGNED_HEADERS_QUERY,
                    signed_header_names(&req.headers).join(";"),
                );
                if let Some(token) = &cred.session_token {
                    req.query_push(X_AMZ_SECURITY_TOKEN_QUERY, token.as_str());
                }
                if let SigningAlgorithm::EcdsaP256Sha256(_) = self.algorithm {
                    req.query_push(X_AMZ_REGION_SET_QUERY, scope.region());
                }
            }
        }

        let creq = CanonicalRequest::build(
            &req,
            &content_hash,
            CanonicalOptions {
                double_url_encode: self.double_url_encode,
                normalize_path: self.normalize_path,
            },
        )?;
        debug!("calculated canonical request: {}", creq.as_str());

        // StringToSign:
        //
        // AWS4-HMAC-SHA256
        // 20220313T072004Z
        // 20220313/<region>/<service>/aws4_request
        // <hashed_canonical_request>
        let string_to_sign = format!(
            "{}\n{}\n{scope_str}\n{}",
            self.algorithm.name(),
            scope.datetime(),
            creq.hash()
        );
        debug!("calculated string to sign: {string_to_sign}");

        let mut signing_key: Option<SigningKey> = None;
        let signature = match &self.algorithm {
            SigningAlgorithm::HmacSha256 => {
                let key = derive_signing_key(&cred, &scope)?;
                let sig = hex_hmac_sha256(key.as_bytes(), string_to_sign.as_bytes());
                signing_key = Some(key);
                Signature::from_hex(sig)
            }
            SigningAlgorithm::EcdsaP256Sha256(provider) => {
                Signature::from_bytes(&provider.sign(string_to_sign.as_bytes())?)
            }
        };

        req.query = canonical_query(&req.query);
        match method {
            SigningMethod::Header => {
                let mut authorization = HeaderValue::from_str(&format!(
                    "{} Credential={}/{scope_str}, SignedHeaders={}, Signature={signature}",
                    self.algorithm.name(),
                    cred.access_key_id,
                    creq.signed_headers(),
                ))?;
                authorization.set_sensitive(true);
                req.headers.insert(AUTHORIZATION, authorization);
            }
            SigningMethod::Query(_) => {
                req.query_push(X_AMZ_SIGNATURE_QUERY, signature.as_str());
            }
        }

        // Apply to the request.
        req.apply(parts)?;

        let Some((mut encoder, signed)) = encoder else {
            return Ok(body.into());
        };
        if signed {
            let rolling = match (&self.algorithm, signing_key) {
                (SigningAlgorithm::HmacSha256, Some(key)) => {
                    RollingSigner::new(HmacChunkSigner::new(&key), scope, signature)
                }
                (SigningAlgorithm::EcdsaP256Sha256(provider), _) => {
                    RollingSigner::new(EcdsaChunkSigner::new(provider.clone()), scope, signature)
                }
                (SigningAlgorithm::HmacSha256, None) => {
                    return Err(Error::unexpected("signing key is missing for chunk signing"))
                }
            };
            encoder = encoder.with_signer(rolling);
        }

        Ok(match body {
            Payload::Empty => SignedPayload::Empty,
            Payload::Bytes(bs) => {
                let r: Box<dyn ReadSeek> = Box::new(Cursor::new(bs));
                SignedPayload::Chunked(AwsChunkedReader::new(r, encoder))
            }
            Payload::Reader(r) => SignedPayload::Chunked(AwsChunkedReader::new(r, encoder)),
            Payload::Stream { stream, .. } => {
                SignedPayload::ChunkedStream(AwsChunkedStream::new(stream, encoder))
            }
        })
    }
}
