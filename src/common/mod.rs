//! Shared configuration and client plumbing.

use anyhow::Result;
use reqwest::Client;
use solana_commitment_config::CommitmentConfig;
use std::time::Duration;

/// Nonblocking Solana RPC client used across the pipeline.
pub type SolanaRpcClient = solana_client::nonblocking::rpc_client::RpcClient;

/// Pipeline configuration.
///
/// Timings are deliberately conservative defaults; callers tune them per
/// deployment. A quote's TTL is short because aggregator pricing goes stale
/// within a few slots.
#[derive(Debug, Clone)]
pub struct SwapConfig {
    /// Base URL of the swap-aggregation service, e.g. `https://api.jup.ag/swap/v1`.
    pub quote_api_base: String,
    /// Solana RPC endpoint used for broadcast and confirmation.
    pub rpc_url: String,
    pub commitment: CommitmentConfig,
    /// Timeout applied to every HTTP request.
    pub http_timeout: Duration,
    /// How long a quote stays usable when the service does not supply a TTL.
    pub quote_ttl: Duration,
    /// Upper bound on broadcast attempts for one signed payload.
    pub max_broadcast_attempts: u32,
    /// First retry delay; doubles on each subsequent attempt.
    pub broadcast_backoff_base: Duration,
    /// Interval between confirmation status polls.
    pub confirm_poll_interval: Duration,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            quote_api_base: "https://api.jup.ag/swap/v1".to_string(),
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            commitment: CommitmentConfig::confirmed(),
            http_timeout: Duration::from_secs(10),
            quote_ttl: Duration::from_secs(3),
            max_broadcast_attempts: 3,
            broadcast_backoff_base: Duration::from_millis(250),
            confirm_poll_interval: Duration::from_millis(400),
        }
    }
}

/// Build the shared HTTP client with pooled keep-alive connections.
pub fn build_http_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(64)
        .tcp_nodelay(true)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(5))
        .build()?;
    Ok(client)
}
