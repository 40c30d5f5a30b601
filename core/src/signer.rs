use crate::{Context, Error, ProvideCredential, Result, SignRequest, SigningCredential};
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Signer is the main struct used to sign the request.
///
/// It caches the last loaded credential and only asks the provider again once
/// that credential is no longer valid.
pub struct Signer<S: SignRequest> {
    ctx: Context,
    loader: Arc<dyn ProvideCredential<Credential = S::Credential>>,
    builder: Arc<S>,
    credential: Arc<Mutex<Option<S::Credential>>>,
}

impl<S: SignRequest> Clone for Signer<S> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            loader: self.loader.clone(),
            builder: self.builder.clone(),
            credential: self.credential.clone(),
        }
    }
}

impl<S: SignRequest> Debug for Signer<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("ctx", &self.ctx)
            .field("loader", &self.loader)
            .field("builder", &self.builder)
            .finish_non_exhaustive()
    }
}

impl<S> Signer<S>
where
    S: SignRequest,
    S::Credential: SigningCredential,
{
    /// Create a new signer.
    pub fn new(
        ctx: Context,
        loader: impl ProvideCredential<Credential = S::Credential>,
        builder: S,
    ) -> Self {
        Self {
            ctx,

            loader: Arc::new(loader),
            builder: Arc::new(builder),
            credential: Arc::new(Mutex::new(None)),
        }
    }

    /// Signing request.
    pub async fn sign(
        &self,
        req: &mut http::request::Parts,
        body: S::Body,
        expires_in: Option<Duration>,
    ) -> Result<S::SignedBody> {
        let credential = self.cached()?;
        let credential = if credential.is_valid() {
            credential
        } else {
            log::debug!("cached credential is missing or invalid, loading a new one");
            let loaded = self.loader.provide_credential(&self.ctx).await?;
            *self
                .credential
                .lock()
                .map_err(|_| Error::unexpected("credential lock poisoned"))? = loaded.clone();
            loaded
        };

        self.builder
            .sign_request(&self.ctx, req, body, credential.as_ref(), expires_in)
            .await
    }

    fn cached(&self) -> Result<Option<S::Credential>> {
        let guard = self
            .credential
            .lock()
            .map_err(|_| Error::unexpected("credential lock poisoned"))?;
        Ok(guard.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Debug)]
    struct Token(&'static str);

    impl SigningCredential for Token {
        fn is_valid(&self) -> bool {
            !self.0.is_empty()
        }
    }

    #[derive(Debug, Default)]
    struct CountingLoader {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ProvideCredential for CountingLoader {
        type Credential = Token;

        async fn provide_credential(&self, _: &Context) -> Result<Option<Self::Credential>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Token("secret")))
        }
    }

    #[derive(Debug)]
    struct HeaderBuilder;

    #[async_trait]
    impl SignRequest for HeaderBuilder {
        type Credential = Token;
        type Body = Vec<u8>;
        type SignedBody = Vec<u8>;

        async fn sign_request(
            &self,
            _: &Context,
            req: &mut http::request::Parts,
            body: Self::Body,
            credential: Option<&Self::Credential>,
            _: Option<Duration>,
        ) -> Result<Self::SignedBody> {
            if let Some(token) = credential {
                req.headers.insert("x-token", token.0.parse()?);
            }
            Ok(body)
        }
    }

    #[tokio::test]
    async fn test_signer_caches_valid_credential() -> Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let signer = Signer::new(
            Context::new(),
            CountingLoader {
                calls: calls.clone(),
            },
            HeaderBuilder,
        );

        for _ in 0..3 {
            let (mut parts, _) = http::Request::get("https://example.com/")
                .body(())?
                .into_parts();
            let body = signer.sign(&mut parts, b"hello".to_vec(), None).await?;

            assert_eq!(body, b"hello");
            assert_eq!(parts.headers["x-token"], "secret");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        Ok(())
    }
}
