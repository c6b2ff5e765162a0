//! Destination public key cache and sealed-box encryption
//!
//! Keys are fetched per destination and kept in process memory for a fixed
//! TTL. Plaintext is sealed to the destination key with an ephemeral sender
//! key, so nothing this process holds can open the result.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use crypto_box::aead::OsRng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{Error, Result};
use crate::remote::{SealedSecret, SecretStoreApi};
use crate::resilient::ResilientCaller;
use crate::security::SecretString;
use crate::types::{Destination, OperationContext};

/// Statistics about key cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyCacheStats {
    /// Lookups served from a live entry
    pub hits: u64,
    /// Lookups that found no entry or an expired one
    pub misses: u64,
    /// Successful key fetches from the remote
    pub fetches: u64,
    /// Entries currently held
    pub entries: usize,
}

impl KeyCacheStats {
    /// Get hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

#[derive(Clone)]
struct CachedKey {
    key_id: String,
    key: [u8; crypto_box::KEY_SIZE],
    expires_at: Instant,
}

/// Per-destination public key cache with TTL
pub struct KeyCache {
    api: Arc<dyn SecretStoreApi>,
    caller: ResilientCaller,
    ttl: Duration,
    entries: RwLock<HashMap<Destination, CachedKey>>,
    stats: RwLock<KeyCacheStats>,
}

impl KeyCache {
    pub fn new(api: Arc<dyn SecretStoreApi>, caller: ResilientCaller, ttl: Duration) -> Self {
        Self {
            api,
            caller,
            ttl,
            entries: RwLock::new(HashMap::new()),
            stats: RwLock::new(KeyCacheStats::default()),
        }
    }

    /// Seal `plaintext` for `dest`, fetching its key on miss or expiry
    ///
    /// A fresh sealed box is produced on every call.
    pub async fn encrypt(
        &self,
        ctx: &OperationContext,
        dest: &Destination,
        plaintext: &SecretString,
    ) -> Result<SealedSecret> {
        let cached = self.key_for(ctx, dest).await?;
        let public_key = crypto_box::PublicKey::from(cached.key);
        let sealed = public_key
            .seal(&mut OsRng, plaintext.expose().as_bytes())
            .map_err(|e| Error::encryption_unavailable(dest, format!("sealing failed: {}", e)))?;

        Ok(SealedSecret {
            encrypted_value: BASE64.encode(sealed),
            key_id: cached.key_id,
        })
    }

    /// Drop the cached key so the next call re-fetches it
    pub async fn invalidate(&self, dest: &Destination) {
        if self.entries.write().await.remove(dest).is_some() {
            debug!("Invalidated public key for {}", dest);
        }
    }

    pub async fn stats(&self) -> KeyCacheStats {
        let mut stats = *self.stats.read().await;
        stats.entries = self.entries.read().await.len();
        stats
    }

    async fn key_for(&self, ctx: &OperationContext, dest: &Destination) -> Result<CachedKey> {
        let now = Instant::now();
        let cached = self.entries.read().await.get(dest).cloned();

        match cached {
            Some(entry) if entry.expires_at > now => {
                self.stats.write().await.hits += 1;
                debug!("Public key cache hit for {}", dest);
                return Ok(entry);
            }
            Some(_) => debug!("Public key expired for {}", dest),
            None => debug!("Public key cache miss for {}", dest),
        }
        self.stats.write().await.misses += 1;

        // Two callers racing on a miss both fetch; the later insert wins
        let fetched = self.fetch(ctx, dest).await?;
        self.stats.write().await.fetches += 1;
        self.entries
            .write()
            .await
            .insert(dest.clone(), fetched.clone());
        Ok(fetched)
    }

    async fn fetch(&self, ctx: &OperationContext, dest: &Destination) -> Result<CachedKey> {
        let public_key = self
            .caller
            .call("public-key", ctx, || self.api.public_key(dest))
            .await
            .map_err(|e| match e {
                Error::DeadlineExceeded { .. } => e,
                other => Error::encryption_unavailable(dest, other.to_string()),
            })?;

        let bytes = BASE64
            .decode(public_key.key.trim())
            .map_err(|e| Error::encryption_unavailable(dest, format!("key is not base64: {}", e)))?;
        let key: [u8; crypto_box::KEY_SIZE] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            Error::encryption_unavailable(
                dest,
                format!("key has {} bytes, expected {}", bytes.len(), crypto_box::KEY_SIZE),
            )
        })?;

        Ok(CachedKey {
            key_id: public_key.key_id,
            key,
            expires_at: Instant::now() + self.ttl,
        })
    }
}
