//! Pass-through and validating checksum layers over byte streams.

use std::io::{self, Read, Seek};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use chunksign_core::{Error, Result};
use futures::{Stream, StreamExt};

use crate::checksum::{ChecksumAccumulator, ChecksumAlgorithm};

/// A set of accumulators that all see the same byte ranges.
#[derive(Debug)]
struct Accumulators {
    list: Vec<ChecksumAccumulator>,
    digests: Option<Vec<Vec<u8>>>,
}

impl Accumulators {
    fn new(algorithms: &[ChecksumAlgorithm]) -> Self {
        let mut list: Vec<ChecksumAccumulator> = Vec::with_capacity(algorithms.len());
        for algorithm in algorithms {
            if list.iter().all(|v| v.algorithm() != *algorithm) {
                list.push(ChecksumAccumulator::new(*algorithm));
            }
        }
        Self { list, digests: None }
    }

    fn update(&mut self, data: &[u8]) {
        for acc in self.list.iter_mut() {
            acc.update(data);
        }
    }

    fn complete(&mut self) {
        if self.digests.is_none() {
            self.digests = Some(self.list.iter().map(|v| v.finalize()).collect());
        }
    }

    fn is_complete(&self) -> bool {
        self.digests.is_some()
    }

    fn digest(&self, algorithm: ChecksumAlgorithm) -> Result<&[u8]> {
        let Some(digests) = &self.digests else {
            return Err(Error::request_invalid(
                "checksum is not available before the stream completes",
            ));
        };
        self.list
            .iter()
            .position(|v| v.algorithm() == algorithm)
            .map(|idx| digests[idx].as_slice())
            .ok_or_else(|| Error::request_invalid(format!("checksum {algorithm} is not attached")))
    }

    fn reset(&mut self) {
        for acc in self.list.iter_mut() {
            acc.reset();
        }
        self.digests = None;
    }
}

/// ChecksumReader forwards bytes unmodified while checksumming them.
///
/// Digests become readable once the inner reader hits EOF.
#[derive(Debug)]
pub struct ChecksumReader<R> {
    inner: R,
    accumulators: Accumulators,
}

impl<R> ChecksumReader<R> {
    /// Wrap `inner` with one accumulator per algorithm.
    pub fn new(inner: R, algorithms: &[ChecksumAlgorithm]) -> Self {
        Self {
            inner,
            accumulators: Accumulators::new(algorithms),
        }
    }

    /// Has the inner reader been drained.
    pub fn is_complete(&self) -> bool {
        self.accumulators.is_complete()
    }

    /// Raw digest for `algorithm`, an error before completion.
    pub fn digest(&self, algorithm: ChecksumAlgorithm) -> Result<&[u8]> {
        self.accumulators.digest(algorithm)
    }

    /// Base64 digest for `algorithm`, an error before completion.
    pub fn digest_base64(&self, algorithm: ChecksumAlgorithm) -> Result<String> {
        self.digest(algorithm).map(chunksign_core::hash::base64_encode)
    }

    /// Clear every accumulator. The caller rewinds the source.
    pub fn reset(&mut self) {
        self.accumulators.reset();
    }

    /// Unwrap the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> ChecksumReader<R> {
    /// Seek the source back to the start and clear every accumulator.
    pub fn rewind(&mut self) -> Result<()> {
        self.inner.rewind()?;
        self.reset();
        Ok(())
    }
}

impl<R: Read> Read for ChecksumReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let n = self.inner.read(buf)?;
        if n == 0 {
            self.accumulators.complete();
        } else {
            self.accumulators.update(&buf[..n]);
        }
        Ok(n)
    }
}

/// ChecksumStream is the async counterpart of [`ChecksumReader`].
#[derive(Debug)]
pub struct ChecksumStream<S> {
    inner: S,
    accumulators: Accumulators,
    failed: bool,
}

impl<S> ChecksumStream<S> {
    /// Wrap `inner` with one accumulator per algorithm.
    pub fn new(inner: S, algorithms: &[ChecksumAlgorithm]) -> Self {
        Self {
            inner,
            accumulators: Accumulators::new(algorithms),
            failed: false,
        }
    }

    /// Has the inner stream ended without error.
    pub fn is_complete(&self) -> bool {
        self.accumulators.is_complete()
    }

    /// Raw digest for `algorithm`, an error before completion.
    pub fn digest(&self, algorithm: ChecksumAlgorithm) -> Result<&[u8]> {
        self.accumulators.digest(algorithm)
    }
}

impl<S> Stream for ChecksumStream<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.failed || self.accumulators.is_complete() {
            return Poll::Ready(None);
        }

        match self.inner.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(data))) => {
                self.accumulators.update(&data);
                Poll::Ready(Some(Ok(data)))
            }
            Poll::Ready(Some(Err(err))) => {
                // A failing source never exposes its digests.
                self.failed = true;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                self.accumulators.complete();
                Poll::Ready(None)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValidateState {
    Reading,
    Verified,
    Failed,
}

/// ChecksumValidatingReader reads content followed by its raw digest.
///
/// The trailing `digest_len` bytes never reach the caller. At EOF the
/// computed digest is compared with them and a mismatch fails the read with
/// a data integrity error.
#[derive(Debug)]
pub struct ChecksumValidatingReader<R> {
    inner: R,
    accumulator: ChecksumAccumulator,
    pending: Vec<u8>,
    scratch: Vec<u8>,
    state: ValidateState,
}

impl<R> ChecksumValidatingReader<R> {
    /// Wrap `inner`, whose tail is the `algorithm` digest of the rest.
    pub fn new(inner: R, algorithm: ChecksumAlgorithm) -> Self {
        Self {
            inner,
            accumulator: ChecksumAccumulator::new(algorithm),
            pending: Vec::with_capacity(algorithm.digest_len() * 2),
            scratch: vec![0; 8 * 1024],
            state: ValidateState::Reading,
        }
    }

    /// Has the trailing digest been verified.
    pub fn is_verified(&self) -> bool {
        self.state == ValidateState::Verified
    }

    fn verify(&mut self) -> Result<()> {
        let algorithm = self.accumulator.algorithm();
        if self.pending.len() < algorithm.digest_len() {
            return Err(Error::data_integrity(format!(
                "stream ended before its {algorithm} checksum"
            )));
        }

        let computed = self.accumulator.finalize();
        if computed != self.pending {
            return Err(Error::data_integrity(format!(
                "{algorithm} checksum mismatch: computed {}, transmitted {}",
                hex::encode(&computed),
                hex::encode(&self.pending)
            )));
        }
        Ok(())
    }
}

impl<R: Read> Read for ChecksumValidatingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let digest_len = self.accumulator.algorithm().digest_len();

        loop {
            match self.state {
                ValidateState::Verified => return Ok(0),
                ValidateState::Failed => {
                    return Err(Error::data_integrity("checksum validation failed").into())
                }
                ValidateState::Reading => {}
            }

            // Everything before the last `digest_len` bytes is content.
            if self.pending.len() > digest_len {
                let n = (self.pending.len() - digest_len).min(buf.len());
                buf[..n].copy_from_slice(&self.pending[..n]);
                self.accumulator.update(&buf[..n]);
                self.pending.drain(..n);
                return Ok(n);
            }

            let n = match self.inner.read(&mut self.scratch) {
                Ok(n) => n,
                Err(err) => {
                    self.state = ValidateState::Failed;
                    return Err(err);
                }
            };
            if n == 0 {
                return match self.verify() {
                    Ok(()) => {
                        self.state = ValidateState::Verified;
                        Ok(0)
                    }
                    Err(err) => {
                        self.state = ValidateState::Failed;
                        Err(err.into())
                    }
                };
            }
            self.pending.extend_from_slice(&self.scratch[..n]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunksign_core::ErrorKind;
    use futures::stream;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    const CONTENT: &[u8] = b"AWS SDK for Java";

    /// Hands out at most `max` bytes per read.
    struct Trickle<R> {
        inner: R,
        max: usize,
    }

    impl<R: Read> Read for Trickle<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.max);
            self.inner.read(&mut buf[..n])
        }
    }

    fn read_with_buffer(r: &mut impl Read, size: usize) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = vec![0; size];
        loop {
            let n = r.read(&mut buf)?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    #[test]
    fn test_reader_reports_all_digests_after_eof() -> Result<()> {
        let mut r = ChecksumReader::new(
            Cursor::new(CONTENT),
            &[
                ChecksumAlgorithm::Sha256,
                ChecksumAlgorithm::Crc32,
                ChecksumAlgorithm::Crc64Nvme,
            ],
        );

        let mut first = [0u8; 3];
        r.read_exact(&mut first)?;
        assert!(r.digest(ChecksumAlgorithm::Crc32).is_err());

        let mut rest = Vec::new();
        r.read_to_end(&mut rest)?;
        assert_eq!([&first[..], &rest[..]].concat(), CONTENT);

        assert!(r.is_complete());
        assert_eq!(
            hex::encode(r.digest(ChecksumAlgorithm::Sha256)?),
            "004c6bbd87e7fe70109b3bc23c8b1ab8f18a8bede0ed38c9233f6cdfd4f7b5d6"
        );
        assert_eq!(hex::encode(r.digest(ChecksumAlgorithm::Crc32)?), "4ac37ece");
        assert_eq!(
            hex::encode(r.digest(ChecksumAlgorithm::Crc64Nvme)?),
            "7c05fe704e3e02bc"
        );
        assert_eq!(r.digest_base64(ChecksumAlgorithm::Crc32)?, "SsN+zg==");
        assert!(r.digest(ChecksumAlgorithm::Sha1).is_err());
        Ok(())
    }

    #[test]
    fn test_reader_rewind_replays_identically() -> Result<()> {
        let mut r = ChecksumReader::new(Cursor::new(CONTENT), &[ChecksumAlgorithm::Crc32c]);
        io::copy(&mut r, &mut io::sink())?;
        let first = r.digest(ChecksumAlgorithm::Crc32c)?.to_vec();

        r.rewind()?;
        assert!(!r.is_complete());
        io::copy(&mut r, &mut io::sink())?;
        assert_eq!(r.digest(ChecksumAlgorithm::Crc32c)?, first.as_slice());
        assert_eq!(hex::encode(first), "10aff583");
        Ok(())
    }

    #[tokio::test]
    async fn test_stream_pass_through() -> Result<()> {
        let source = stream::iter(vec![
            Ok(Bytes::from_static(b"AWS ")),
            Ok(Bytes::from_static(b"SDK for")),
            Ok(Bytes::from_static(b" Java")),
        ]);
        let mut s = ChecksumStream::new(
            source,
            &[ChecksumAlgorithm::Sha256, ChecksumAlgorithm::Crc32],
        );

        let mut seen = Vec::new();
        while let Some(chunk) = s.next().await {
            assert!(s.digest(ChecksumAlgorithm::Crc32).is_err());
            seen.extend_from_slice(&chunk?);
        }

        assert_eq!(seen, CONTENT);
        assert_eq!(hex::encode(s.digest(ChecksumAlgorithm::Crc32)?), "4ac37ece");
        Ok(())
    }

    #[tokio::test]
    async fn test_stream_error_hides_digests() {
        let source = stream::iter(vec![
            Ok(Bytes::from_static(b"AWS ")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ]);
        let mut s = ChecksumStream::new(source, &[ChecksumAlgorithm::Crc32]);

        assert!(s.next().await.expect("first item").is_ok());
        assert!(s.next().await.expect("second item").is_err());
        assert!(s.next().await.is_none());
        assert!(!s.is_complete());
        assert!(s.digest(ChecksumAlgorithm::Crc32).is_err());
    }

    #[test]
    fn test_validating_reader_any_buffer_size() -> Result<()> {
        for algorithm in [
            ChecksumAlgorithm::Crc32,
            ChecksumAlgorithm::Crc64Nvme,
            ChecksumAlgorithm::Sha256,
        ] {
            let mut wire = CONTENT.to_vec();
            wire.extend_from_slice(&algorithm.compute(CONTENT));

            for (read_size, buf_size) in [(1, 1), (1, 64), (3, 2), (7, 5), (64, 64), (17, 1)] {
                let mut r = ChecksumValidatingReader::new(
                    Trickle {
                        inner: Cursor::new(&wire),
                        max: read_size,
                    },
                    algorithm,
                );
                let out = read_with_buffer(&mut r, buf_size)?;

                assert_eq!(out, CONTENT, "{algorithm} {read_size}/{buf_size}");
                assert!(r.is_verified());
            }
        }
        Ok(())
    }

    #[test]
    fn test_validating_reader_detects_corruption() {
        let algorithm = ChecksumAlgorithm::Sha256;
        let mut wire = CONTENT.to_vec();
        wire.extend_from_slice(&algorithm.compute(CONTENT));
        let last = wire.len() - 1;
        wire[last] ^= 0x01;

        let mut r = ChecksumValidatingReader::new(
            Trickle {
                inner: Cursor::new(&wire),
                max: 1,
            },
            algorithm,
        );
        let err = read_with_buffer(&mut r, 1).expect_err("corruption must be detected");
        assert_eq!(Error::from(err).kind(), ErrorKind::DataIntegrity);

        // Stays failed.
        let mut buf = [0u8; 4];
        assert!(r.read(&mut buf).is_err());
    }

    #[test]
    fn test_validating_reader_short_stream() {
        let mut r =
            ChecksumValidatingReader::new(Cursor::new(&b"ab"[..]), ChecksumAlgorithm::Crc32);
        let err = read_with_buffer(&mut r, 8).expect_err("too short");
        assert!(Error::from(err).is_retryable());
    }
}
