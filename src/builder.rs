//! Turning an accepted quote into an unsigned transaction payload.
//!
//! Building delegates to the aggregator's swap endpoint, which assembles the
//! route into a serialized transaction for the payer. The quote's TTL is
//! re-checked first so a stale price is never built against.

use crate::error::SwapError;
use crate::quote::Quote;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::debug;

/// Serialized swap transaction, not yet signed.
///
/// Produced once per accepted quote and discarded after one submission
/// attempt; the embedded route and expiry height make reuse invalid.
#[derive(Debug, Clone)]
pub struct UnsignedTransaction {
    /// Wire-format transaction bytes.
    pub payload: Vec<u8>,
    /// Last ledger height at which this payload may still be broadcast.
    pub last_valid_block_height: u64,
}

/// Remote collaborator converting a quote + payer into transaction bytes.
#[async_trait]
pub trait BuildService: Send + Sync {
    async fn build_swap(
        &self,
        route: &serde_json::Value,
        payer: &Pubkey,
    ) -> Result<UnsignedTransaction, SwapError>;
}

#[derive(Debug, Serialize)]
struct SwapBuildRequest<'a> {
    #[serde(rename = "userPublicKey")]
    user_public_key: String,
    /// The quote's route blob, round-tripped unmodified.
    #[serde(rename = "quoteResponse")]
    quote_response: &'a serde_json::Value,
    #[serde(rename = "dynamicComputeUnitLimit")]
    dynamic_compute_unit_limit: bool,
}

#[derive(Debug, Deserialize)]
struct SwapBuildResponse {
    #[serde(rename = "swapTransaction")]
    swap_transaction: String,
    #[serde(rename = "lastValidBlockHeight")]
    last_valid_block_height: u64,
}

/// HTTP client for a Jupiter-style `/swap` endpoint.
pub struct HttpBuildService {
    http: Client,
    base_url: String,
}

impl HttpBuildService {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into() }
    }

    fn endpoint(&self) -> String {
        format!("{}/swap", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl BuildService for HttpBuildService {
    async fn build_swap(
        &self,
        route: &serde_json::Value,
        payer: &Pubkey,
    ) -> Result<UnsignedTransaction, SwapError> {
        let request = SwapBuildRequest {
            user_public_key: payer.to_string(),
            quote_response: route,
            dynamic_compute_unit_limit: true,
        };

        let response = self.http.post(self.endpoint()).json(&request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // Client errors mean the route or payer configuration was not
            // acceptable; everything else is transport.
            if status.is_client_error() {
                return Err(SwapError::BuildError(format!("{status}: {body}")));
            }
            return Err(SwapError::NetworkError(format!("build service returned {status}: {body}")));
        }

        let parsed: SwapBuildResponse = serde_json::from_str(&body)
            .map_err(|e| SwapError::BuildError(format!("malformed build response: {e}")))?;
        let payload = STANDARD
            .decode(&parsed.swap_transaction)
            .map_err(|e| SwapError::BuildError(format!("payload is not valid base64: {e}")))?;

        Ok(UnsignedTransaction {
            payload,
            last_valid_block_height: parsed.last_valid_block_height,
        })
    }
}

/// Transaction Builder stage of the pipeline.
pub struct SwapTransactionBuilder {
    service: Arc<dyn BuildService>,
}

impl SwapTransactionBuilder {
    pub fn new(service: Arc<dyn BuildService>) -> Self {
        Self { service }
    }

    /// Build an unsigned transaction for an accepted quote.
    ///
    /// Fails with [`SwapError::QuoteExpired`] before any network call when
    /// the quote's TTL has elapsed. Side-effect free beyond the service
    /// round trip; neither the quote nor token state is mutated.
    pub async fn build(
        &self,
        quote: &Quote,
        payer: &Pubkey,
    ) -> Result<UnsignedTransaction, SwapError> {
        if quote.is_expired() {
            return Err(SwapError::QuoteExpired);
        }

        let unsigned = self.service.build_swap(&quote.route, payer).await?;
        debug!(
            payload_len = unsigned.payload.len(),
            last_valid_block_height = unsigned.last_valid_block_height,
            "built unsigned swap transaction"
        );
        Ok(unsigned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    struct CountingBuildService {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BuildService for CountingBuildService {
        async fn build_swap(
            &self,
            _route: &serde_json::Value,
            _payer: &Pubkey,
        ) -> Result<UnsignedTransaction, SwapError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(UnsignedTransaction { payload: vec![1, 2, 3], last_valid_block_height: 100 })
        }
    }

    fn quote_with_ttl(ttl: Duration) -> Quote {
        Quote {
            input_mint: Pubkey::new_unique(),
            output_mint: Pubkey::new_unique(),
            input_amount: 1_000,
            output_amount: 2_000,
            slippage_bps: 50,
            price_impact_pct: None,
            route: json!({"outAmount": "2000"}),
            context_slot: 7,
            created_at: Instant::now(),
            ttl,
        }
    }

    #[tokio::test]
    async fn builds_against_fresh_quote() {
        let service = Arc::new(CountingBuildService { calls: AtomicUsize::new(0) });
        let builder = SwapTransactionBuilder::new(service.clone());
        let quote = quote_with_ttl(Duration::from_secs(60));

        let unsigned = builder.build(&quote, &Pubkey::new_unique()).await.unwrap();
        assert_eq!(unsigned.payload, vec![1, 2, 3]);
        assert_eq!(unsigned.last_valid_block_height, 100);
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_quote_fails_without_network_call() {
        let service = Arc::new(CountingBuildService { calls: AtomicUsize::new(0) });
        let builder = SwapTransactionBuilder::new(service.clone());
        let quote = quote_with_ttl(Duration::ZERO);

        let err = builder.build(&quote, &Pubkey::new_unique()).await.unwrap_err();
        assert_eq!(err, SwapError::QuoteExpired);
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn quote_goes_stale_one_tick_past_ttl() {
        let service = Arc::new(CountingBuildService { calls: AtomicUsize::new(0) });
        let builder = SwapTransactionBuilder::new(service.clone());
        let quote = quote_with_ttl(Duration::from_secs(2));

        tokio::time::sleep(Duration::from_secs(3)).await;

        let err = builder.build(&quote, &Pubkey::new_unique()).await.unwrap_err();
        assert_eq!(err, SwapError::QuoteExpired);
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }
}
