use std::collections::{HashMap, VecDeque};
use std::fmt::{Debug, Formatter};
use std::sync::{Mutex, MutexGuard};

use chunksign_core::hash::hmac_sha256;
use chunksign_core::Result;
use log::{debug, warn};
use once_cell::sync::Lazy;

use crate::constants::{AWS4_REQUEST, SIGNING_KEY_CACHE_CAPACITY};
use crate::{Credential, CredentialScope};

static GLOBAL_CACHE: Lazy<SigningKeyCache> =
    Lazy::new(|| SigningKeyCache::with_capacity(SIGNING_KEY_CACHE_CAPACITY));

/// SigningKey is the derived key for one `(secret, date, region, service)`.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey {
    bytes: [u8; 32],
    date: String,
}

impl SigningKey {
    /// Derive the signing key via the four chained HMAC-SHA256 steps.
    pub fn derive(secret: &str, scope: &CredentialScope) -> Self {
        let secret = format!("AWS4{secret}");
        let sign_date = hmac_sha256(secret.as_bytes(), scope.date().as_bytes());
        let sign_region = hmac_sha256(&sign_date, scope.region().as_bytes());
        let sign_service = hmac_sha256(&sign_region, scope.service().as_bytes());
        let bytes = hmac_sha256(&sign_service, AWS4_REQUEST.as_bytes());

        Self {
            bytes,
            date: scope.date().to_string(),
        }
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The `YYYYMMDD` day this key is valid for.
    pub fn date(&self) -> &str {
        &self.date
    }
}

impl Debug for SigningKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("bytes", &"***")
            .field("date", &self.date)
            .finish()
    }
}

/// SigningKeyCache is a bounded map with FIFO eviction.
///
/// When full, the oldest inserted entry makes room for the new one.
/// Replacing the value of an existing entry keeps its position.
pub struct SigningKeyCache {
    capacity: usize,
    inner: Mutex<Fifo>,
}

#[derive(Default)]
struct Fifo {
    entries: HashMap<String, SigningKey>,
    order: VecDeque<String>,
}

impl SigningKeyCache {
    /// Create a cache holding at most `capacity` keys.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Fifo::default()),
        }
    }

    /// Max entries of this cache.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Is the cache empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Is `key` physically present, regardless of its date.
    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Get the cached key if it is valid for `date`.
    pub fn get(&self, key: &str, date: &str) -> Result<Option<SigningKey>> {
        let fifo = self.lock();
        Ok(fifo.entries.get(key).filter(|v| v.date == date).cloned())
    }

    /// Insert a key, evicting the oldest entry if at capacity.
    pub fn insert(&self, key: &str, value: SigningKey) -> Result<()> {
        let mut fifo = self.lock();
        if let Some(existing) = fifo.entries.get_mut(key) {
            *existing = value;
            return Ok(());
        }

        if fifo.entries.len() >= self.capacity {
            if let Some(oldest) = fifo.order.pop_front() {
                debug!("signing key cache is full, evicting oldest entry");
                fifo.entries.remove(&oldest);
            }
        }
        fifo.order.push_back(key.to_string());
        fifo.entries.insert(key.to_string(), value);
        Ok(())
    }

    /// Return the cached key for `date`, or derive and insert a fresh one.
    ///
    /// Derivation runs outside the lock.
    pub fn get_or_derive(
        &self,
        key: &str,
        date: &str,
        derive: impl FnOnce() -> SigningKey,
    ) -> Result<SigningKey> {
        if let Some(v) = self.get(key, date)? {
            return Ok(v);
        }

        let value = derive();
        self.insert(key, value.clone())?;
        Ok(value)
    }

    /// Entries are only touched by panic free code, a poisoned lock still
    /// guards a consistent map.
    fn lock(&self) -> MutexGuard<'_, Fifo> {
        self.inner.lock().unwrap_or_else(|err| {
            warn!("signing key cache lock poisoned, recovering");
            err.into_inner()
        })
    }
}

impl Debug for SigningKeyCache {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

/// The process wide signing key cache.
pub fn global_cache() -> &'static SigningKeyCache {
    &GLOBAL_CACHE
}

/// Derive the signing key for `cred` in `scope` through the global cache.
pub fn derive_signing_key(cred: &Credential, scope: &CredentialScope) -> Result<SigningKey> {
    derive_signing_key_with(global_cache(), cred, scope)
}

/// Derive the signing key for `cred` in `scope` through the given cache.
pub fn derive_signing_key_with(
    cache: &SigningKeyCache,
    cred: &Credential,
    scope: &CredentialScope,
) -> Result<SigningKey> {
    let key = format!(
        "{}-{}-{}",
        cred.secret_access_key,
        scope.region(),
        scope.service()
    );
    cache.get_or_derive(&key, scope.date(), || {
        SigningKey::derive(&cred.secret_access_key, scope)
    })
}
