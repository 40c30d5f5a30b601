//! AWS SigV4 and SigV4a signer for requests and streamed bodies.
//!
//! [`RequestSigner`] signs the request head and decides how the body takes
//! part in the signature. Chunked bodies are framed with `aws-chunked`
//! and every chunk chains on the previous signature through
//! [`RollingSigner`].
//!
//! ## Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use chunksign_aws_v4::{Payload, RequestSigner, StaticCredentialProvider};
//! use chunksign_core::{Context, Result, Signer};
//!
//! # async fn example() -> Result<()> {
//! let signer = Signer::new(
//!     Context::new(),
//!     StaticCredentialProvider::new("access_key_id", "secret_access_key"),
//!     RequestSigner::new("s3", "us-east-1")
//!         .with_payload_signing(true)
//!         .with_chunk_encoding(true),
//! );
//!
//! let (mut parts, _) = http::Request::put("https://bucket.s3.amazonaws.com/key")
//!     .header("content-length", 11)
//!     .body(())?
//!     .into_parts();
//! let _body = signer
//!     .sign(&mut parts, Payload::Bytes(Bytes::from_static(b"Hello world")), None)
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod canonical;
pub use canonical::{canonical_query, canonical_uri, CanonicalOptions, CanonicalRequest};

mod checksum;
pub use checksum::{ChecksumAccumulator, ChecksumAlgorithm};

mod checksum_stream;
pub use checksum_stream::{ChecksumReader, ChecksumStream, ChecksumValidatingReader};

mod chunked;
pub use chunked::{
    encoded_length, move_content_length, take_trailers, AwsChunkedReader, AwsChunkedStream,
    ChunkEncoder,
};

mod config;
pub use config::Config;

mod credential;
pub use credential::Credential;

mod key_cache;
pub use key_cache::{
    derive_signing_key, derive_signing_key_with, global_cache, SigningKey, SigningKeyCache,
};

mod provide_credential;
pub use provide_credential::*;

mod rolling;
pub use rolling::{
    canonical_trailers, EcdsaChunkSigner, HmacChunkSigner, RollingInput, RollingSigner,
    SignAsymmetric, SignChunk, Signature,
};

mod scope;
pub use scope::CredentialScope;

mod sign_request;
pub use sign_request::{Payload, ReadSeek, RequestSigner, SignedPayload, SigningAlgorithm};

mod constants;
pub use constants::{
    DEFAULT_CHUNK_SIZE, ECDSA_SIGNATURE_HEX_LEN, HMAC_SIGNATURE_HEX_LEN, MIN_CHUNK_SIZE,
    PRESIGN_MAX_EXPIRY, SIGNING_KEY_CACHE_CAPACITY,
};
