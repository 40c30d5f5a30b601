use crate::{Config, Credential};
use async_trait::async_trait;
use chunksign_core::utils::Redact;
use chunksign_core::{Context, ProvideCredential, Result};
use std::fmt::{self, Debug};

/// StaticCredentialProvider provides static AWS credentials.
///
/// This provider is used when you have the access key ID and secret access key
/// directly and want to use them without any dynamic loading.
#[derive(Clone)]
pub struct StaticCredentialProvider {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
    credential_scope: Option<String>,
}

impl StaticCredentialProvider {
    /// Create a new StaticCredentialProvider with access key ID and secret access key.
    pub fn new(access_key_id: &str, secret_access_key: &str) -> Self {
        Self {
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            session_token: None,
            credential_scope: None,
        }
    }

    /// Build a provider from the keys in config.
    ///
    /// Returns `None` if either key is missing.
    pub fn from_config(cfg: &Config) -> Option<Self> {
        let (Some(ak), Some(sk)) = (&cfg.access_key_id, &cfg.secret_access_key) else {
            return None;
        };
        let mut provider = Self::new(ak, sk);
        provider.session_token = cfg.session_token.clone();
        Some(provider)
    }

    /// Set the session token.
    pub fn with_session_token(mut self, token: &str) -> Self {
        self.session_token = Some(token.to_string());
        self
    }

    /// Pin the signing region of the returned credential.
    pub fn with_credential_scope(mut self, region: &str) -> Self {
        self.credential_scope = Some(region.to_string());
        self
    }
}

impl Debug for StaticCredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentialProvider")
            .field("access_key_id", &Redact::from(&self.access_key_id))
            .field("secret_access_key", &Redact::from(&self.secret_access_key))
            .field("session_token", &Redact::from(&self.session_token))
            .field("credential_scope", &self.credential_scope)
            .finish()
    }
}

#[async_trait]
impl ProvideCredential for StaticCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, _: &Context) -> Result<Option<Self::Credential>> {
        Ok(Some(Credential {
            access_key_id: self.access_key_id.clone(),
            secret_access_key: self.secret_access_key.clone(),
            session_token: self.session_token.clone(),
            credential_scope: self.credential_scope.clone(),
            expires_in: None,
        }))
    }
}
