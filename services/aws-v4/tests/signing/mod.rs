mod presigned;
mod upload;

use anyhow::{anyhow, ensure, Result};
use chrono::{TimeZone, Utc};
use chunksign_aws_v4::{
    derive_signing_key, Credential, CredentialScope, HmacChunkSigner, RollingSigner, Signature,
};
use chunksign_core::time::DateTime;
use http::request::Parts;
use pretty_assertions::assert_eq;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Signing time shared by every test.
pub fn fixed_time() -> DateTime {
    Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 0)
        .single()
        .expect("time must be valid")
}

pub fn header<'a>(parts: &'a Parts, name: &str) -> &'a str {
    parts
        .headers
        .get(name)
        .unwrap_or_else(|| panic!("{name} must be set"))
        .to_str()
        .expect("header must be visible ascii")
}

/// Deterministic payload that is not a repetition of the chunk size.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Body as a server sees it after parsing the `aws-chunked` framing.
#[derive(Debug, Default)]
pub struct Decoded {
    pub chunks: Vec<(Vec<u8>, Option<String>)>,
    pub trailers: Vec<(String, String)>,
    pub trailer_signature: Option<String>,
}

impl Decoded {
    pub fn data(&self) -> Vec<u8> {
        self.chunks.iter().flat_map(|(v, _)| v.clone()).collect()
    }
}

fn split_line(input: &[u8]) -> Result<(&str, &[u8])> {
    let end = input
        .windows(2)
        .position(|w| w == b"\r\n")
        .ok_or_else(|| anyhow!("missing CRLF"))?;
    Ok((std::str::from_utf8(&input[..end])?, &input[end + 2..]))
}

pub fn decode_chunked(body: &[u8]) -> Result<Decoded> {
    let mut decoded = Decoded::default();
    let mut rest = body;

    loop {
        let (line, tail) = split_line(rest)?;
        let (size, signature) = match line.split_once(";chunk-signature=") {
            Some((size, sig)) => (size, Some(sig.to_string())),
            None => (line, None),
        };
        let size = usize::from_str_radix(size, 16)?;
        if size == 0 {
            decoded.chunks.push((Vec::new(), signature));
            rest = tail;
            break;
        }
        ensure!(tail.len() >= size + 2, "chunk of {size} bytes is truncated");
        ensure!(&tail[size..size + 2] == b"\r\n", "chunk is not terminated");
        decoded.chunks.push((tail[..size].to_vec(), signature));
        rest = &tail[size + 2..];
    }

    loop {
        let (line, tail) = split_line(rest)?;
        rest = tail;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| anyhow!("malformed trailer: {line}"))?;
        if name == "x-amz-trailer-signature" {
            decoded.trailer_signature = Some(value.to_string());
        } else {
            decoded.trailers.push((name.to_string(), value.to_string()));
        }
    }
    ensure!(rest.is_empty(), "{} bytes after the final CRLF", rest.len());

    Ok(decoded)
}

/// Recompute the rolling chain the way the service does.
pub fn verify_chain(
    decoded: &Decoded,
    cred: &Credential,
    scope: CredentialScope,
    seed: &str,
) -> Result<()> {
    let key = derive_signing_key(cred, &scope)?;
    let mut rolling = RollingSigner::new(
        HmacChunkSigner::new(&key),
        scope,
        Signature::from_hex(seed),
    );

    for (idx, (data, signature)) in decoded.chunks.iter().enumerate() {
        let expected = rolling.sign_chunk(data)?;
        assert_eq!(
            signature.as_deref(),
            Some(expected.as_str()),
            "chunk {idx} signature mismatch"
        );
    }
    if !decoded.trailers.is_empty() {
        let expected = rolling.sign_trailer(&decoded.trailers)?;
        assert_eq!(
            decoded.trailer_signature.as_deref(),
            Some(expected.as_str()),
            "trailer signature mismatch"
        );
    }
    Ok(())
}

/// Signature of the request itself.
pub fn seed_signature(parts: &Parts) -> String {
    header(parts, "authorization")
        .rsplit("Signature=")
        .next()
        .expect("authorization must carry a signature")
        .to_string()
}
