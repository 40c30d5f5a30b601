//! `aws-chunked` transfer encoding.
//!
//! ```text
//! <hex-len>[;chunk-signature=<sig>]\r\n<data>\r\n
//! ...
//! 0[;chunk-signature=<sig>]\r\n
//! <name>:<value>\r\n
//! [x-amz-trailer-signature:<sig>\r\n]
//! \r\n
//! ```

use std::io::{self, Read, Seek};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use chunksign_core::{Error, Result};
use futures::{Stream, StreamExt};
use http::header::{HeaderName, CONTENT_LENGTH};
use http::{HeaderMap, HeaderValue};
use log::debug;

use crate::checksum::{ChecksumAccumulator, ChecksumAlgorithm};
use crate::constants::{
    CHUNK_SIGNATURE_EXTENSION, X_AMZ_DECODED_CONTENT_LENGTH, X_AMZ_TRAILER,
    X_AMZ_TRAILER_SIGNATURE,
};
use crate::rolling::{RollingSigner, Signature};

const CRLF: &[u8] = b"\r\n";

/// ChunkEncoder frames a body into `aws-chunked` chunks.
///
/// Every chunk except the last carries exactly `chunk_size` bytes. With a
/// [`RollingSigner`] attached each chunk gets a `chunk-signature` extension
/// and the trailer set gets an `x-amz-trailer-signature` line.
#[derive(Debug)]
pub struct ChunkEncoder {
    chunk_size: usize,
    signer: Option<RollingSigner>,
    checksum: Option<ChecksumAccumulator>,
    trailers: Vec<(String, String)>,
}

impl ChunkEncoder {
    /// Create an unsigned encoder with no trailers.
    pub fn new(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::config_invalid("chunk size must be positive"));
        }

        Ok(Self {
            chunk_size,
            signer: None,
            checksum: None,
            trailers: Vec::new(),
        })
    }

    /// Sign every chunk and the trailers with `signer`.
    pub fn with_signer(mut self, signer: RollingSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Append an `x-amz-checksum-*` trailer computed over the body.
    pub fn with_checksum(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.checksum = Some(ChecksumAccumulator::new(algorithm));
        self
    }

    /// Append a trailer with a known value, written before the checksum.
    pub fn with_trailer(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.trailers.push((name.into(), value.into()));
        self
    }

    /// Size of every full chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Is a rolling signer attached.
    pub fn is_signed(&self) -> bool {
        self.signer.is_some()
    }

    /// Trailer names in wire order.
    pub fn trailer_names(&self) -> Vec<String> {
        let mut names = self
            .trailers
            .iter()
            .map(|(k, _)| k.clone())
            .collect::<Vec<_>>();
        if let Some(acc) = &self.checksum {
            names.push(acc.algorithm().header_name().to_string());
        }
        names
    }

    /// Exact encoded size for a body of `decoded` bytes.
    pub fn encoded_length(&self, decoded: u64) -> u64 {
        encoded_length(
            decoded,
            self.chunk_size,
            self.signer.as_ref().map(|v| v.signature_hex_len()),
            &self.trailers,
            self.checksum.as_ref().map(|v| v.algorithm()),
        )
    }

    /// Frame one data chunk.
    ///
    /// Empty input produces nothing, the terminal chunk is written by
    /// [`ChunkEncoder::finish`].
    pub fn encode_chunk(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        if data.len() > self.chunk_size {
            return Err(Error::unexpected(format!(
                "chunk of {} bytes exceeds chunk size {}",
                data.len(),
                self.chunk_size
            )));
        }

        if let Some(acc) = self.checksum.as_mut() {
            acc.update(data);
        }
        let sig = match self.signer.as_mut() {
            Some(signer) => Some(signer.sign_chunk(data)?),
            None => None,
        };

        let mut out = Vec::with_capacity(data.len() + 96);
        write_chunk(&mut out, data, sig.as_ref());
        Ok(out)
    }

    /// Write the terminal chunk, the trailers and the closing CRLF.
    pub fn finish(&mut self) -> Result<Vec<u8>> {
        let sig = match self.signer.as_mut() {
            Some(signer) => Some(signer.sign_chunk(&[])?),
            None => None,
        };

        let mut out = Vec::with_capacity(256);
        write_chunk_header(&mut out, 0, sig.as_ref());

        let mut trailers = self.trailers.clone();
        if let Some(acc) = &self.checksum {
            trailers.push((
                acc.algorithm().header_name().to_string(),
                acc.finalize_base64(),
            ));
        }
        for (name, value) in trailers.iter() {
            out.extend_from_slice(name.as_bytes());
            out.push(b':');
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(CRLF);
        }

        if let Some(signer) = self.signer.as_mut() {
            if !trailers.is_empty() {
                let sig = signer.sign_trailer(&trailers)?;
                out.extend_from_slice(X_AMZ_TRAILER_SIGNATURE.as_bytes());
                out.push(b':');
                out.extend_from_slice(sig.as_str().as_bytes());
                out.extend_from_slice(CRLF);
            }
        }
        out.extend_from_slice(CRLF);

        debug!("finished aws-chunked body with {} trailers", trailers.len());
        Ok(out)
    }

    /// Restore the initial state so the body can be encoded again.
    ///
    /// Resets the rolling signer to its seed and clears the checksum.
    pub fn reset(&mut self) {
        if let Some(signer) = self.signer.as_mut() {
            signer.reset();
        }
        if let Some(acc) = self.checksum.as_mut() {
            acc.reset();
        }
    }
}

fn write_chunk_header(out: &mut Vec<u8>, len: usize, sig: Option<&Signature>) {
    out.extend_from_slice(format!("{len:x}").as_bytes());
    if let Some(sig) = sig {
        out.push(b';');
        out.extend_from_slice(CHUNK_SIGNATURE_EXTENSION.as_bytes());
        out.push(b'=');
        out.extend_from_slice(sig.as_str().as_bytes());
    }
    out.extend_from_slice(CRLF);
}

fn write_chunk(out: &mut Vec<u8>, data: &[u8], sig: Option<&Signature>) {
    write_chunk_header(out, data.len(), sig);
    out.extend_from_slice(data);
    out.extend_from_slice(CRLF);
}

fn hex_len(v: u64) -> u64 {
    format!("{v:x}").len() as u64
}

/// Compute the encoded size without encoding anything.
///
/// `signature_hex_len` is `None` for unsigned chunks. The trailer signature
/// line is counted for signed bodies that carry at least one trailer.
pub fn encoded_length(
    decoded: u64,
    chunk_size: usize,
    signature_hex_len: Option<usize>,
    trailers: &[(String, String)],
    checksum: Option<ChecksumAlgorithm>,
) -> u64 {
    let chunk_size = chunk_size.max(1) as u64;
    // ;chunk-signature=<sig>
    let ext = signature_hex_len
        .map(|v| (CHUNK_SIGNATURE_EXTENSION.len() + 2 + v) as u64)
        .unwrap_or(0);

    let full = decoded / chunk_size;
    let remaining = decoded % chunk_size;

    let mut length = full * (hex_len(chunk_size) + ext + 2 + chunk_size + 2);
    if remaining > 0 {
        length += hex_len(remaining) + ext + 2 + remaining + 2;
    }
    // 0<ext>\r\n
    length += 1 + ext + 2;

    for (name, value) in trailers {
        length += (name.len() + 1 + value.len() + 2) as u64;
    }
    if let Some(algorithm) = checksum {
        length += (algorithm.header_name().len() + 1 + algorithm.encoded_len() + 2) as u64;
    }
    if let Some(sig_len) = signature_hex_len {
        if !trailers.is_empty() || checksum.is_some() {
            length += (X_AMZ_TRAILER_SIGNATURE.len() + 1 + sig_len + 2) as u64;
        }
    }

    length + 2
}

/// Move `Content-Length` into `x-amz-decoded-content-length`.
///
/// `measured` is used when the request carries no `Content-Length`.
pub fn move_content_length(headers: &mut HeaderMap, measured: Option<u64>) -> Result<u64> {
    let declared = match headers.remove(CONTENT_LENGTH) {
        Some(v) => Some(v.to_str()?.trim().parse::<u64>().map_err(|e| {
            Error::request_invalid("content-length is not a valid integer").with_source(e)
        })?),
        None => None,
    };

    let decoded = declared
        .or(measured)
        .ok_or_else(|| Error::request_invalid("content length of the body is unknown"))?;
    headers.insert(
        HeaderName::from_static(X_AMZ_DECODED_CONTENT_LENGTH),
        HeaderValue::from(decoded),
    );
    Ok(decoded)
}

/// Take every header named by `x-amz-trailer` out of the request.
///
/// The `x-amz-trailer` header itself is removed too, the caller writes the
/// final list. Repeated values are joined with `,`.
pub fn take_trailers(headers: &mut HeaderMap) -> Result<Vec<(String, String)>> {
    let mut names = Vec::new();
    for value in headers.get_all(X_AMZ_TRAILER) {
        for name in value.to_str()?.split(',') {
            let name = name.trim();
            if !name.is_empty() {
                names.push(name.to_lowercase());
            }
        }
    }
    headers.remove(X_AMZ_TRAILER);

    let mut trailers = Vec::with_capacity(names.len());
    for name in names {
        let values = headers
            .get_all(name.as_str())
            .iter()
            .map(|v| v.to_str().map(|v| v.trim().to_string()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if values.is_empty() {
            return Err(Error::request_invalid(format!(
                "trailer {name} must be present in the request headers"
            )));
        }
        headers.remove(name.as_str());
        trailers.push((name, values.join(",")));
    }
    Ok(trailers)
}

/// AwsChunkedReader encodes a blocking reader on the fly.
#[derive(Debug)]
pub struct AwsChunkedReader<R> {
    inner: R,
    encoder: ChunkEncoder,
    chunk: Vec<u8>,
    output: Vec<u8>,
    pos: usize,
    finished: bool,
    failed: Option<(io::ErrorKind, String)>,
}

impl<R> AwsChunkedReader<R> {
    /// Encode `inner` with `encoder`.
    pub fn new(inner: R, encoder: ChunkEncoder) -> Self {
        Self {
            chunk: vec![0; encoder.chunk_size()],
            inner,
            encoder,
            output: Vec::new(),
            pos: 0,
            finished: false,
            failed: None,
        }
    }

    /// The encoder in use.
    pub fn encoder(&self) -> &ChunkEncoder {
        &self.encoder
    }
}

impl<R: Read> AwsChunkedReader<R> {
    /// Read until the chunk buffer is full or the source ends.
    fn fill_chunk(&mut self) -> io::Result<usize> {
        let mut filled = 0;
        while filled < self.chunk.len() {
            match self.inner.read(&mut self.chunk[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(filled)
    }

    /// Encode the next chunk into `output`, with the tail once the source ends.
    fn next_frame(&mut self) -> io::Result<()> {
        let filled = self.fill_chunk()?;
        if filled > 0 {
            let frame = self.encoder.encode_chunk(&self.chunk[..filled])?;
            self.output.extend_from_slice(&frame);
        }
        if filled < self.chunk.len() {
            let tail = self.encoder.finish()?;
            self.output.extend_from_slice(&tail);
            self.finished = true;
        }
        Ok(())
    }
}

impl<R: Read + Seek> AwsChunkedReader<R> {
    /// Rewind the source and restart encoding from the first chunk.
    ///
    /// The replayed bytes are identical to the first attempt. This is also
    /// the only way out of a failed read.
    pub fn reset(&mut self) -> Result<()> {
        self.inner.rewind()?;
        self.encoder.reset();
        self.output.clear();
        self.pos = 0;
        self.finished = false;
        self.failed = None;
        Ok(())
    }
}

impl<R: Read> Read for AwsChunkedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if self.pos < self.output.len() {
                let n = (self.output.len() - self.pos).min(buf.len());
                buf[..n].copy_from_slice(&self.output[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if let Some((kind, message)) = &self.failed {
                return Err(io::Error::new(
                    *kind,
                    format!("aws-chunked body failed earlier: {message}"),
                ));
            }
            if self.finished {
                return Ok(0);
            }

            self.output.clear();
            self.pos = 0;

            // The partial chunk is gone, framing more bytes would corrupt the body.
            if let Err(err) = self.next_frame() {
                debug!("aws-chunked body failed: {err}");
                self.output.clear();
                self.failed = Some((err.kind(), err.to_string()));
                return Err(err);
            }
        }
    }
}

/// AwsChunkedStream encodes a byte stream on the fly.
///
/// Incoming buffers are regrouped into `chunk_size` chunks. A stream can not
/// be replayed, retries need a fresh source.
#[derive(Debug)]
pub struct AwsChunkedStream<S> {
    inner: S,
    encoder: ChunkEncoder,
    buf: BytesMut,
    inner_done: bool,
    finished: bool,
}

impl<S> AwsChunkedStream<S> {
    /// Encode `inner` with `encoder`.
    pub fn new(inner: S, encoder: ChunkEncoder) -> Self {
        Self {
            buf: BytesMut::with_capacity(encoder.chunk_size()),
            inner,
            encoder,
            inner_done: false,
            finished: false,
        }
    }

    fn next_frame(&mut self) -> Result<Bytes> {
        let size = self.encoder.chunk_size();
        if self.buf.len() >= size {
            let data = self.buf.split_to(size);
            return Ok(Bytes::from(self.encoder.encode_chunk(&data)?));
        }

        let data = self.buf.split();
        let mut out = self.encoder.encode_chunk(&data)?;
        out.extend_from_slice(&self.encoder.finish()?);
        self.finished = true;
        Ok(Bytes::from(out))
    }
}

impl<S> Stream for AwsChunkedStream<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if this.finished {
                return Poll::Ready(None);
            }
            if this.inner_done || this.buf.len() >= this.encoder.chunk_size() {
                let frame = this.next_frame().map_err(|err| {
                    this.finished = true;
                    io::Error::from(err)
                });
                return Poll::Ready(Some(frame));
            }

            match this.inner.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(data))) => this.buf.extend_from_slice(&data),
                Poll::Ready(Some(Err(err))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => this.inner_done = true,
            }
        }
    }
}
