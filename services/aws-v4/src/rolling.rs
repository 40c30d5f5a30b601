//! Rolling signatures over chunk and trailer sequences.

use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;

use chunksign_core::hash::{hex_hmac_sha256, hex_sha256, EMPTY_STRING_SHA256};
use chunksign_core::{Error, Result};
use log::debug;

use crate::constants::{
    ECDSA_P256_SHA256_ALGORITHM, ECDSA_SIGNATURE_HEX_LEN, ECDSA_SIGNATURE_PADDING,
    HMAC_SHA256_PAYLOAD_ALGORITHM, HMAC_SHA256_TRAILER_ALGORITHM, HMAC_SIGNATURE_HEX_LEN,
};
use crate::key_cache::SigningKey;
use crate::CredentialScope;

/// Signature in its wire form, lowercase hex.
///
/// The content is opaque, it is only fed back as the previous signature of
/// the next rolling step.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Signature(String);

impl Signature {
    /// Hex encode raw signature bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Hex encode a DER encoded ECDSA signature and pad it to
    /// [`ECDSA_SIGNATURE_HEX_LEN`].
    ///
    /// DER signatures vary between 70 and 72 bytes while the encoded body
    /// length is computed up front, so every ECDSA signature on the wire has
    /// the same width.
    pub fn from_ecdsa(der: &[u8]) -> Result<Self> {
        let mut hex = hex::encode(der);
        if hex.len() > ECDSA_SIGNATURE_HEX_LEN {
            return Err(Error::unexpected(format!(
                "ecdsa signature of {} bytes exceeds {} bytes",
                der.len(),
                ECDSA_SIGNATURE_HEX_LEN / 2
            )));
        }
        let padding = ECDSA_SIGNATURE_HEX_LEN - hex.len();
        hex.extend(std::iter::repeat(ECDSA_SIGNATURE_PADDING).take(padding));
        Ok(Self(hex))
    }

    /// Wrap an already hex encoded signature.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// The hex text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Debug for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.0)
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One step of a rolling signature.
#[derive(Debug, Clone, Copy)]
pub enum RollingInput<'a> {
    /// Data chunk bytes, empty for the terminal chunk.
    Chunk(&'a [u8]),
    /// Canonical trailer bytes.
    Trailer(&'a [u8]),
}

/// SignChunk is the primitive that turns one rolling step into a signature.
pub trait SignChunk: Debug + Send + Sync + 'static {
    /// Sign `input` chained after `previous`.
    fn sign(
        &self,
        input: RollingInput<'_>,
        previous: &Signature,
        scope: &CredentialScope,
    ) -> Result<Signature>;

    /// Hex length of every signature this primitive produces.
    fn signature_hex_len(&self) -> usize;
}

/// SignAsymmetric delegates ECDSA-P256 signing to an external provider.
///
/// Implementations receive the complete string to sign and return the raw
/// signature bytes. The private key never enters this crate.
pub trait SignAsymmetric: Debug + Send + Sync + 'static {
    /// Sign one string to sign.
    fn sign(&self, string_to_sign: &[u8]) -> Result<Vec<u8>>;
}

/// HMAC-SHA256 rolling primitive keyed with the derived signing key.
#[derive(Clone)]
pub struct HmacChunkSigner {
    key: Vec<u8>,
}

impl HmacChunkSigner {
    /// Create a primitive from a derived signing key.
    pub fn new(key: &SigningKey) -> Self {
        Self::from_key_bytes(key.as_bytes())
    }

    /// Create a primitive from raw key bytes.
    pub fn from_key_bytes(key: &[u8]) -> Self {
        Self { key: key.to_vec() }
    }
}

impl Debug for HmacChunkSigner {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacChunkSigner")
            .field("key", &"***")
            .finish()
    }
}

impl SignChunk for HmacChunkSigner {
    fn sign(
        &self,
        input: RollingInput<'_>,
        previous: &Signature,
        scope: &CredentialScope,
    ) -> Result<Signature> {
        let string_to_sign = match input {
            RollingInput::Chunk(data) => format!(
                "{HMAC_SHA256_PAYLOAD_ALGORITHM}\n{}\n{scope}\n{previous}\n{EMPTY_STRING_SHA256}\n{}",
                scope.datetime(),
                hex_sha256(data)
            ),
            RollingInput::Trailer(data) => format!(
                "{HMAC_SHA256_TRAILER_ALGORITHM}\n{}\n{scope}\n{previous}\n{}",
                scope.datetime(),
                hex_sha256(data)
            ),
        };

        Ok(Signature::from_hex(hex_hmac_sha256(
            &self.key,
            string_to_sign.as_bytes(),
        )))
    }

    fn signature_hex_len(&self) -> usize {
        HMAC_SIGNATURE_HEX_LEN
    }
}

/// ECDSA-P256 rolling primitive backed by a [`SignAsymmetric`] provider.
#[derive(Debug, Clone)]
pub struct EcdsaChunkSigner {
    provider: Arc<dyn SignAsymmetric>,
}

impl EcdsaChunkSigner {
    /// Create a primitive signing through `provider`.
    pub fn new(provider: Arc<dyn SignAsymmetric>) -> Self {
        Self { provider }
    }
}

impl SignChunk for EcdsaChunkSigner {
    fn sign(
        &self,
        input: RollingInput<'_>,
        previous: &Signature,
        scope: &CredentialScope,
    ) -> Result<Signature> {
        let scope_str = scope.to_asymmetric_string();
        let string_to_sign = match input {
            RollingInput::Chunk(data) => format!(
                "{ECDSA_P256_SHA256_ALGORITHM}-PAYLOAD\n{}\n{scope_str}\n{previous}\n{EMPTY_STRING_SHA256}\n{}",
                scope.datetime(),
                hex_sha256(data)
            ),
            RollingInput::Trailer(data) => format!(
                "{ECDSA_P256_SHA256_ALGORITHM}-TRAILER\n{}\n{scope_str}\n{previous}\n{}",
                scope.datetime(),
                hex_sha256(data)
            ),
        };

        let der = self.provider.sign(string_to_sign.as_bytes())?;
        Signature::from_ecdsa(&der)
    }

    fn signature_hex_len(&self) -> usize {
        ECDSA_SIGNATURE_HEX_LEN
    }
}

/// RollingSigner chains chunk and trailer signatures starting from a seed.
///
/// Each signature feeds the next step as its previous signature.
/// [`RollingSigner::reset`] restores the seed so a replay yields the same
/// sequence.
#[derive(Debug)]
pub struct RollingSigner {
    primitive: Box<dyn SignChunk>,
    scope: CredentialScope,
    seed: Signature,
    previous: Signature,
}

impl RollingSigner {
    /// Start a rolling sequence at `seed`, the request signature.
    pub fn new(primitive: impl SignChunk, scope: CredentialScope, seed: Signature) -> Self {
        Self {
            primitive: Box::new(primitive),
            scope,
            previous: seed.clone(),
            seed,
        }
    }

    /// Sign the next chunk, empty for the terminal chunk.
    pub fn sign_chunk(&mut self, chunk: &[u8]) -> Result<Signature> {
        let sig = self
            .primitive
            .sign(RollingInput::Chunk(chunk), &self.previous, &self.scope)?;
        debug!("signed chunk of {} bytes: {sig}", chunk.len());

        self.previous = sig.clone();
        Ok(sig)
    }

    /// Sign the trailer set, chained after the terminal chunk.
    pub fn sign_trailer(&mut self, trailers: &[(String, String)]) -> Result<Signature> {
        let canonical = canonical_trailers(trailers);
        let sig = self.primitive.sign(
            RollingInput::Trailer(canonical.as_bytes()),
            &self.previous,
            &self.scope,
        )?;
        debug!("signed {} trailers: {sig}", trailers.len());

        self.previous = sig.clone();
        Ok(sig)
    }

    /// Go back to the seed.
    pub fn reset(&mut self) {
        self.previous = self.seed.clone();
    }

    /// The latest signature, the seed before any step.
    pub fn previous(&self) -> &Signature {
        &self.previous
    }

    /// The seed signature.
    pub fn seed(&self) -> &Signature {
        &self.seed
    }

    /// Scope of every step.
    pub fn scope(&self) -> &CredentialScope {
        &self.scope
    }

    /// Hex length of each produced signature.
    pub fn signature_hex_len(&self) -> usize {
        self.primitive.signature_hex_len()
    }
}

/// `name:value\n` per trailer, names lowercased and sorted.
pub fn canonical_trailers(trailers: &[(String, String)]) -> String {
    let mut lines = trailers
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.as_str()))
        .collect::<Vec<_>>();
    lines.sort_by(|a, b| a.0.cmp(&b.0));

    lines
        .iter()
        .map(|(k, v)| format!("{k}:{v}\n"))
        .collect::<String>()
}
