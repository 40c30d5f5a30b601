//! Content checksums carried in `x-amz-checksum-*` headers and trailers.

use std::fmt::{self, Debug, Formatter};
use std::str::FromStr;

use chunksign_core::hash::base64_encode;
use chunksign_core::Error;
use serde::Deserialize;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Supported checksum algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChecksumAlgorithm {
    /// CRC-32 (IEEE 802.3).
    Crc32,
    /// CRC-32C (Castagnoli).
    Crc32c,
    /// CRC-64/NVME.
    Crc64Nvme,
    /// SHA-1.
    Sha1,
    /// SHA-256.
    Sha256,
}

impl ChecksumAlgorithm {
    /// Canonical name as used in `x-amz-sdk-checksum-algorithm`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crc32 => "CRC32",
            Self::Crc32c => "CRC32C",
            Self::Crc64Nvme => "CRC64NVME",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
        }
    }

    /// Header (or trailer) carrying the base64 digest.
    pub fn header_name(&self) -> &'static str {
        match self {
            Self::Crc32 => "x-amz-checksum-crc32",
            Self::Crc32c => "x-amz-checksum-crc32c",
            Self::Crc64Nvme => "x-amz-checksum-crc64nvme",
            Self::Sha1 => "x-amz-checksum-sha1",
            Self::Sha256 => "x-amz-checksum-sha256",
        }
    }

    /// Length of the raw digest in bytes.
    pub fn digest_len(&self) -> usize {
        match self {
            Self::Crc32 | Self::Crc32c => 4,
            Self::Crc64Nvme => 8,
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }

    /// Length of the base64 encoded digest.
    pub fn encoded_len(&self) -> usize {
        self.digest_len().div_ceil(3) * 4
    }

    /// Compute the raw digest of `data` in one go.
    pub fn compute(&self, data: &[u8]) -> Vec<u8> {
        let mut acc = ChecksumAccumulator::new(*self);
        acc.update(data);
        acc.finalize()
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CRC32" => Ok(Self::Crc32),
            "CRC32C" => Ok(Self::Crc32c),
            "CRC64NVME" => Ok(Self::Crc64Nvme),
            "SHA1" => Ok(Self::Sha1),
            "SHA256" => Ok(Self::Sha256),
            _ => Err(Error::config_invalid(format!("unknown checksum algorithm: {s}"))),
        }
    }
}

enum State {
    Crc32(crc32fast::Hasher),
    Crc32c(u32),
    Crc64Nvme(crc64fast_nvme::Digest),
    Sha1(Sha1),
    Sha256(Sha256),
}

impl State {
    fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Crc32 => State::Crc32(crc32fast::Hasher::new()),
            ChecksumAlgorithm::Crc32c => State::Crc32c(0),
            ChecksumAlgorithm::Crc64Nvme => State::Crc64Nvme(crc64fast_nvme::Digest::new()),
            ChecksumAlgorithm::Sha1 => State::Sha1(Sha1::new()),
            ChecksumAlgorithm::Sha256 => State::Sha256(Sha256::new()),
        }
    }
}

/// ChecksumAccumulator keeps the running state of one algorithm.
pub struct ChecksumAccumulator {
    algorithm: ChecksumAlgorithm,
    state: State,
    length: u64,
}

impl ChecksumAccumulator {
    /// Create an empty accumulator.
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        Self {
            algorithm,
            state: State::new(algorithm),
            length: 0,
        }
    }

    /// Algorithm of this accumulator.
    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// Bytes seen so far.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Feed a byte range.
    pub fn update(&mut self, data: &[u8]) {
        self.length += data.len() as u64;
        match &mut self.state {
            State::Crc32(h) => h.update(data),
            State::Crc32c(v) => *v = crc32c::crc32c_append(*v, data),
            State::Crc64Nvme(d) => d.write(data),
            State::Sha1(h) => h.update(data),
            State::Sha256(h) => h.update(data),
        }
    }

    /// Fixed width digest of everything seen so far, big endian for CRCs.
    pub fn finalize(&self) -> Vec<u8> {
        match &self.state {
            State::Crc32(h) => h.clone().finalize().to_be_bytes().to_vec(),
            State::Crc32c(v) => v.to_be_bytes().to_vec(),
            State::Crc64Nvme(d) => d.sum64().to_be_bytes().to_vec(),
            State::Sha1(h) => h.clone().finalize().to_vec(),
            State::Sha256(h) => h.clone().finalize().to_vec(),
        }
    }

    /// Base64 of [`ChecksumAccumulator::finalize`], the header wire form.
    pub fn finalize_base64(&self) -> String {
        base64_encode(&self.finalize())
    }

    /// Drop all state, as if nothing had been seen.
    pub fn reset(&mut self) {
        self.state = State::new(self.algorithm);
        self.length = 0;
    }
}

impl Debug for ChecksumAccumulator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChecksumAccumulator")
            .field("algorithm", &self.algorithm)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}
