//! Token metadata model and the resolver seam.
//!
//! Token metadata is owned by an external resolver (typically cache-backed);
//! the pipeline only holds resolved copies. A mint's metadata is immutable
//! once resolved and is refreshed only by re-querying the resolver.

use crate::error::SwapError;
use async_trait::async_trait;
use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;

/// Resolved metadata for one mint.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub mint: Pubkey,
    pub symbol: String,
    pub name: String,
    /// Decimal precision of the mint's atomic unit.
    pub decimals: u8,
    /// Reference price in USD, when the resolver knows one.
    pub price_usd: Option<f64>,
    pub logo_uri: Option<String>,
}

impl Token {
    pub fn new(mint: Pubkey, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            mint,
            symbol: symbol.into(),
            name: String::new(),
            decimals,
            price_usd: None,
            logo_uri: None,
        }
    }
}

/// External collaborator answering mint lookups.
///
/// Implementations are expected to answer from a local cache when possible
/// and make at most one outbound lookup otherwise. An unknown mint surfaces
/// as [`SwapError::UnresolvedToken`].
#[async_trait]
pub trait TokenResolver: Send + Sync {
    async fn resolve(&self, mint: &Pubkey) -> Result<Token, SwapError>;
}

/// Memoizing wrapper around another resolver.
///
/// First successful lookup per mint goes outbound; every later lookup is
/// served from the in-process map. Failed lookups are not cached, so a mint
/// that appears later (e.g. freshly listed) resolves on retry.
pub struct CachedTokenResolver {
    inner: Arc<dyn TokenResolver>,
    cache: DashMap<Pubkey, Token>,
}

impl CachedTokenResolver {
    pub fn new(inner: Arc<dyn TokenResolver>) -> Self {
        Self { inner, cache: DashMap::new() }
    }

    /// Number of mints currently cached.
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl TokenResolver for CachedTokenResolver {
    async fn resolve(&self, mint: &Pubkey) -> Result<Token, SwapError> {
        if let Some(hit) = self.cache.get(mint) {
            return Ok(hit.clone());
        }
        let token = self.inner.resolve(mint).await?;
        self.cache.insert(*mint, token.clone());
        Ok(token)
    }
}
