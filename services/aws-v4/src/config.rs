use std::fmt::{Debug, Formatter};

use chunksign_core::utils::Redact;
use chunksign_core::{Context, Error, Result};
use serde::Deserialize;

use crate::checksum::ChecksumAlgorithm;
use crate::constants::*;

/// Config for the SigV4 request signer.
///
/// Every field is optional, unset fields fall back to the signer defaults.
#[derive(Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Config {
    /// `region` will be loaded from:
    ///
    /// - this field if it's `is_some`
    /// - env value: [`AWS_REGION`]
    pub region: Option<String>,
    /// Signing name of the service, `s3` for example.
    pub service: Option<String>,
    /// `access_key_id` will be loaded from
    ///
    /// - this field if it's `is_some`
    /// - env value: [`AWS_ACCESS_KEY_ID`]
    pub access_key_id: Option<String>,
    /// `secret_access_key` will be loaded from
    ///
    /// - this field if it's `is_some`
    /// - env value: [`AWS_SECRET_ACCESS_KEY`]
    pub secret_access_key: Option<String>,
    /// `session_token` will be loaded from
    ///
    /// - this field if it's `is_some`
    /// - env value: [`AWS_SESSION_TOKEN`]
    pub session_token: Option<String>,

    /// Hash the payload instead of sending `UNSIGNED-PAYLOAD`.
    pub payload_signing: Option<bool>,
    /// Frame the payload with `aws-chunked`.
    pub chunk_encoding: Option<bool>,
    /// Size of each data chunk, at least 8 KiB.
    pub chunk_size: Option<usize>,
    /// Flexible checksum sent as header or trailer.
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
    /// Encode the path twice, defaults to `true` for every service but S3.
    pub double_url_encode: Option<bool>,
    /// Normalize the path, defaults to `true` for every service but S3.
    pub normalize_path: Option<bool>,
}

impl Debug for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("region", &self.region)
            .field("service", &self.service)
            .field("access_key_id", &Redact::from(&self.access_key_id))
            .field("secret_access_key", &Redact::from(&self.secret_access_key))
            .field("session_token", &Redact::from(&self.session_token))
            .field("payload_signing", &self.payload_signing)
            .field("chunk_encoding", &self.chunk_encoding)
            .field("chunk_size", &self.chunk_size)
            .field("checksum_algorithm", &self.checksum_algorithm)
            .field("double_url_encode", &self.double_url_encode)
            .field("normalize_path", &self.normalize_path)
            .finish()
    }
}

impl Config {
    /// Parse config from a JSON document.
    pub fn from_json(input: &str) -> Result<Self> {
        serde_json::from_str(input)
            .map_err(|e| Error::config_invalid("failed to parse signer config").with_source(e))
    }

    /// Load config from env.
    ///
    /// Values already set stay untouched.
    pub fn from_env(mut self, ctx: &Context) -> Self {
        let envs = ctx.env_vars();

        if self.region.is_none() {
            self.region = envs.get(AWS_REGION).cloned();
        }
        if self.access_key_id.is_none() {
            self.access_key_id = envs.get(AWS_ACCESS_KEY_ID).cloned();
        }
        if self.secret_access_key.is_none() {
            self.secret_access_key = envs.get(AWS_SECRET_ACCESS_KEY).cloned();
        }
        if self.session_token.is_none() {
            self.session_token = envs.get(AWS_SESSION_TOKEN).cloned();
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunksign_core::{ErrorKind, StaticEnv};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_json() -> Result<()> {
        let cfg = Config::from_json(
            r#"{
                "region": "us-west-2",
                "service": "s3",
                "payload_signing": true,
                "chunk_encoding": true,
                "chunk_size": 65536,
                "checksum_algorithm": "CRC32C"
            }"#,
        )?;

        assert_eq!(cfg.region.as_deref(), Some("us-west-2"));
        assert_eq!(cfg.service.as_deref(), Some("s3"));
        assert_eq!(cfg.payload_signing, Some(true));
        assert_eq!(cfg.chunk_size, Some(65536));
        assert_eq!(cfg.checksum_algorithm, Some(ChecksumAlgorithm::Crc32c));
        assert_eq!(cfg.double_url_encode, None);
        Ok(())
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        for input in [
            "{",
            r#"{"chunk_size": "big"}"#,
            r#"{"checksum_algorithm": "MD5"}"#,
        ] {
            let err = Config::from_json(input).expect_err("must fail");
            assert_eq!(err.kind(), ErrorKind::ConfigInvalid, "{input}");
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_from_env_keeps_explicit_values() {
        let ctx = Context::new().with_env(StaticEnv::from_pairs([
            (AWS_REGION, "eu-central-1"),
            (AWS_ACCESS_KEY_ID, "env_ak"),
            (AWS_SECRET_ACCESS_KEY, "env_sk"),
        ]));

        let cfg = Config {
            access_key_id: Some("explicit_ak".to_string()),
            ..Default::default()
        }
        .from_env(&ctx);

        assert_eq!(cfg.region.as_deref(), Some("eu-central-1"));
        assert_eq!(cfg.access_key_id.as_deref(), Some("explicit_ak"));
        assert_eq!(cfg.secret_access_key.as_deref(), Some("env_sk"));
        assert_eq!(cfg.session_token, None);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let cfg = Config {
            secret_access_key: Some("wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string()),
            ..Default::default()
        };
        assert!(!format!("{cfg:?}").contains("K7MDENG"));
    }
}
