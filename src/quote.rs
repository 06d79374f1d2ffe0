//! Quote negotiation against a swap-aggregation service.
//!
//! The negotiator turns (input token, output token, human amount) into a
//! [`Quote`] and suppresses redundant network traffic: overlapping requests
//! are resolved last-call-wins, so a result arriving for a superseded request
//! is discarded unconditionally. No retry happens here; a failed quote is
//! surfaced immediately and the caller decides whether to re-request.

use crate::common::SwapConfig;
use crate::error::SwapError;
use crate::token::Token;
use crate::utils::amount::to_atomic;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// A priced swap, valid only for the exact (input, output, amount) triple it
/// was issued for and only until its TTL elapses.
#[derive(Debug, Clone)]
pub struct Quote {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    /// Input amount in atomic units of the input mint.
    pub input_amount: u64,
    /// Quoted output amount in atomic units of the output mint.
    pub output_amount: u64,
    pub slippage_bps: u16,
    /// Price impact as reported by the service, for display only.
    pub price_impact_pct: Option<String>,
    /// Opaque route descriptor, round-tripped unmodified into the build
    /// request. Never inspected by the pipeline.
    pub route: serde_json::Value,
    /// Ledger slot the quote was computed at.
    pub context_slot: u64,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl Quote {
    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }

    /// Time left before the quote goes stale; zero once expired.
    pub fn remaining_ttl(&self) -> Duration {
        self.ttl.saturating_sub(self.created_at.elapsed())
    }
}

/// Parameters of one quote lookup.
#[derive(Debug, Clone)]
pub struct QuoteRequest {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    /// Atomic units of the input mint.
    pub amount: u64,
    pub slippage_bps: u16,
}

/// Raw quote as returned by the service, before TTL stamping.
#[derive(Debug, Clone)]
pub struct ServiceQuote {
    pub input_amount: u64,
    pub output_amount: u64,
    pub price_impact_pct: Option<String>,
    pub route: serde_json::Value,
    pub context_slot: u64,
    /// Service-supplied validity window, when present.
    pub ttl: Option<Duration>,
}

/// Remote price-discovery collaborator.
#[async_trait]
pub trait QuoteService: Send + Sync {
    async fn fetch_quote(&self, request: &QuoteRequest) -> Result<ServiceQuote, SwapError>;
}

/// Typed view of the fields the pipeline needs from the aggregator's quote
/// response. The full body is kept as the route blob.
#[derive(Debug, Deserialize)]
struct QuoteResponseView {
    #[serde(rename = "inAmount")]
    in_amount: String,
    #[serde(rename = "outAmount")]
    out_amount: String,
    #[serde(rename = "priceImpactPct")]
    price_impact_pct: Option<String>,
    #[serde(rename = "contextSlot", default)]
    context_slot: u64,
}

#[derive(Debug, Deserialize)]
struct QuoteErrorBody {
    error: Option<String>,
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
}

/// HTTP client for a Jupiter-style `/quote` endpoint.
pub struct HttpQuoteService {
    http: Client,
    base_url: String,
}

impl HttpQuoteService {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into() }
    }

    fn endpoint(&self) -> String {
        format!("{}/quote", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl QuoteService for HttpQuoteService {
    async fn fetch_quote(&self, request: &QuoteRequest) -> Result<ServiceQuote, SwapError> {
        let response = self
            .http
            .get(self.endpoint())
            .query(&[
                ("inputMint", request.input_mint.to_string()),
                ("outputMint", request.output_mint.to_string()),
                ("amount", request.amount.to_string()),
                ("slippageBps", request.slippage_bps.to_string()),
                ("swapMode", "ExactIn".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // The aggregator reports "no viable route" as a client error with
            // a structured body; anything else is a transport-level failure.
            if let Ok(err) = serde_json::from_str::<QuoteErrorBody>(&body) {
                let code = err.error_code.unwrap_or_default();
                let message = err.error.unwrap_or_else(|| body.clone());
                if code.contains("ROUTE") || message.to_lowercase().contains("route") {
                    return Err(SwapError::InsufficientLiquidity(message));
                }
            }
            return Err(SwapError::NetworkError(format!("quote service returned {status}: {body}")));
        }

        let route: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| SwapError::NetworkError(format!("malformed quote response: {e}")))?;
        let view: QuoteResponseView = serde_json::from_value(route.clone())
            .map_err(|e| SwapError::NetworkError(format!("malformed quote response: {e}")))?;

        let input_amount = view
            .in_amount
            .parse()
            .map_err(|_| SwapError::NetworkError(format!("bad inAmount: {}", view.in_amount)))?;
        let output_amount = view
            .out_amount
            .parse()
            .map_err(|_| SwapError::NetworkError(format!("bad outAmount: {}", view.out_amount)))?;

        Ok(ServiceQuote {
            input_amount,
            output_amount,
            price_impact_pct: view.price_impact_pct,
            route,
            context_slot: view.context_slot,
            ttl: None,
        })
    }
}

/// Result of a negotiation round.
#[derive(Debug, Clone)]
pub enum QuoteOutcome {
    /// This was the most recent request when its result arrived.
    Delivered(Quote),
    /// A newer request was issued while this one was in flight; its result
    /// (success or failure) was discarded.
    Superseded,
}

/// Debounced front door for quote lookups.
///
/// Each call bumps a generation counter before suspending on the network.
/// When the round trip completes, the result is delivered only if no newer
/// call has been issued in the meantime.
pub struct QuoteNegotiator {
    service: Arc<dyn QuoteService>,
    default_ttl: Duration,
    generation: AtomicU64,
}

impl QuoteNegotiator {
    pub fn new(service: Arc<dyn QuoteService>, config: &SwapConfig) -> Self {
        Self { service, default_ttl: config.quote_ttl, generation: AtomicU64::new(0) }
    }

    /// Request a fresh quote for swapping `human_amount` of `input` into
    /// `output`.
    ///
    /// Validates the amount before any network call: zero, negative or
    /// non-numeric input fails with [`SwapError::InvalidAmount`].
    pub async fn request_quote(
        &self,
        input: &Token,
        output: &Token,
        human_amount: &str,
        slippage_bps: u16,
    ) -> Result<QuoteOutcome, SwapError> {
        let amount = to_atomic(human_amount, input.decimals)?;
        if amount == 0 {
            return Err(SwapError::InvalidAmount(format!(
                "amount must be positive: {human_amount}"
            )));
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let request = QuoteRequest {
            input_mint: input.mint,
            output_mint: output.mint,
            amount,
            slippage_bps,
        };

        debug!(
            input = %input.symbol,
            output = %output.symbol,
            amount,
            slippage_bps,
            generation,
            "requesting quote"
        );
        let result = self.service.fetch_quote(&request).await;

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "quote result superseded, discarding");
            return Ok(QuoteOutcome::Superseded);
        }

        let service_quote = result?;
        Ok(QuoteOutcome::Delivered(Quote {
            input_mint: input.mint,
            output_mint: output.mint,
            input_amount: service_quote.input_amount,
            output_amount: service_quote.output_amount,
            slippage_bps,
            price_impact_pct: service_quote.price_impact_pct,
            route: service_quote.route,
            context_slot: service_quote.context_slot,
            created_at: Instant::now(),
            ttl: service_quote.ttl.unwrap_or(self.default_ttl),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::time::sleep;

    fn test_token(decimals: u8) -> Token {
        Token::new(Pubkey::new_unique(), "TEST", decimals)
    }

    struct DelayedService {
        delay: Duration,
        output_amount: u64,
    }

    #[async_trait]
    impl QuoteService for DelayedService {
        async fn fetch_quote(&self, request: &QuoteRequest) -> Result<ServiceQuote, SwapError> {
            sleep(self.delay).await;
            Ok(ServiceQuote {
                input_amount: request.amount,
                output_amount: self.output_amount,
                price_impact_pct: None,
                route: json!({"outAmount": self.output_amount.to_string()}),
                context_slot: 1,
                ttl: None,
            })
        }
    }

    #[tokio::test]
    async fn rejects_zero_amount_before_network() {
        let service = Arc::new(DelayedService { delay: Duration::ZERO, output_amount: 1 });
        let negotiator = QuoteNegotiator::new(service, &SwapConfig::default());
        let (a, b) = (test_token(9), test_token(6));

        let err = negotiator.request_quote(&a, &b, "0", 50).await.unwrap_err();
        assert!(matches!(err, SwapError::InvalidAmount(_)));
        let err = negotiator.request_quote(&a, &b, "-3", 50).await.unwrap_err();
        assert!(matches!(err, SwapError::InvalidAmount(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_requests_resolve_last_call_wins() {
        let service = Arc::new(DelayedService {
            delay: Duration::from_millis(100),
            output_amount: 777,
        });
        let negotiator =
            Arc::new(QuoteNegotiator::new(service, &SwapConfig::default()));
        let (a, b) = (test_token(9), test_token(6));

        let slow = {
            let negotiator = negotiator.clone();
            let (a, b) = (a.clone(), b.clone());
            tokio::spawn(async move { negotiator.request_quote(&a, &b, "1", 50).await })
        };
        // With the clock paused, time only advances once the first call is
        // parked on its network delay, so it has definitely taken its
        // generation before the second call is issued.
        sleep(Duration::from_millis(1)).await;
        let fast = {
            let negotiator = negotiator.clone();
            let (a, b) = (a.clone(), b.clone());
            tokio::spawn(async move { negotiator.request_quote(&a, &b, "2", 50).await })
        };

        let slow = slow.await.unwrap().unwrap();
        let fast = fast.await.unwrap().unwrap();

        assert!(matches!(slow, QuoteOutcome::Superseded));
        match fast {
            QuoteOutcome::Delivered(quote) => assert_eq!(quote.input_amount, 2_000_000_000),
            QuoteOutcome::Superseded => panic!("latest call must deliver"),
        }
    }

    #[tokio::test]
    async fn delivered_quote_carries_default_ttl() {
        let service = Arc::new(DelayedService { delay: Duration::ZERO, output_amount: 5 });
        let config = SwapConfig::default();
        let negotiator = QuoteNegotiator::new(service, &config);
        let (a, b) = (test_token(9), test_token(6));

        let outcome = negotiator.request_quote(&a, &b, "1.5", 50).await.unwrap();
        let quote = match outcome {
            QuoteOutcome::Delivered(q) => q,
            QuoteOutcome::Superseded => panic!("no competing request"),
        };
        assert_eq!(quote.input_amount, 1_500_000_000);
        assert_eq!(quote.ttl, config.quote_ttl);
        assert!(!quote.is_expired());
    }

    #[test]
    fn quote_expires_after_ttl() {
        let mut quote = Quote {
            input_mint: Pubkey::new_unique(),
            output_mint: Pubkey::new_unique(),
            input_amount: 1,
            output_amount: 1,
            slippage_bps: 50,
            price_impact_pct: None,
            route: json!({}),
            context_slot: 0,
            created_at: Instant::now(),
            ttl: Duration::from_secs(60),
        };
        assert!(!quote.is_expired());

        quote.ttl = Duration::ZERO;
        assert!(quote.is_expired());
        assert_eq!(quote.remaining_ttl(), Duration::ZERO);
    }
}
