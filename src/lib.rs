pub mod builder;
pub mod common;
pub mod error;
pub mod orchestrator;
pub mod quote;
pub mod submit;
pub mod token;
pub mod utils;

pub use crate::builder::{BuildService, HttpBuildService, SwapTransactionBuilder, UnsignedTransaction};
pub use crate::common::{SolanaRpcClient, SwapConfig, build_http_client};
pub use crate::error::SwapError;
pub use crate::orchestrator::{QuoteDisplay, SwapOrchestrator, SwapStage};
pub use crate::quote::{HttpQuoteService, Quote, QuoteNegotiator, QuoteOutcome, QuoteService};
pub use crate::submit::{
    KeypairSigner, LedgerRpc, SignedTransaction, SolanaLedgerRpc, SubmissionEngine,
    SubmissionResult, WalletSigner,
};
pub use crate::token::{CachedTokenResolver, Token, TokenResolver};

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Top-level client wiring the swap pipeline together.
///
/// Owns the HTTP collaborators, the RPC connection and the orchestrator. The
/// token resolver and wallet signer are injected: the resolver is typically
/// cache-backed ([`CachedTokenResolver`]) and the signer is either a local
/// keypair ([`KeypairSigner`]) or an external wallet capability.
pub struct SwapClient {
    pub config: SwapConfig,
    /// RPC client for broadcast and confirmation.
    pub rpc: Arc<SolanaRpcClient>,
    /// Public address paying for and signing the swap.
    pub payer: Pubkey,
    orchestrator: Arc<SwapOrchestrator>,
}

impl SwapClient {
    /// Wire the pipeline against the configured quote/build service and RPC
    /// endpoint.
    pub fn new(
        config: SwapConfig,
        resolver: Arc<dyn TokenResolver>,
        signer: Arc<dyn WalletSigner>,
        payer: Pubkey,
    ) -> Result<Self, SwapError> {
        let http = build_http_client(config.http_timeout)
            .map_err(|e| SwapError::NetworkError(e.to_string()))?;
        let rpc = Arc::new(SolanaRpcClient::new_with_commitment(
            config.rpc_url.clone(),
            config.commitment,
        ));

        let quote_service =
            Arc::new(HttpQuoteService::new(http.clone(), config.quote_api_base.clone()));
        let build_service = Arc::new(HttpBuildService::new(http, config.quote_api_base.clone()));

        let negotiator = Arc::new(QuoteNegotiator::new(quote_service, &config));
        let builder = Arc::new(SwapTransactionBuilder::new(build_service));
        let ledger = Arc::new(SolanaLedgerRpc::new(rpc.clone()));
        let engine = Arc::new(SubmissionEngine::new(signer, ledger, &config));
        let orchestrator =
            Arc::new(SwapOrchestrator::new(resolver, negotiator, builder, engine, payer));

        Ok(Self { config, rpc, payer, orchestrator })
    }

    /// Convenience constructor signing in-process with a local keypair.
    pub fn with_keypair(
        config: SwapConfig,
        resolver: Arc<dyn TokenResolver>,
        keypair: Arc<Keypair>,
    ) -> Result<Self, SwapError> {
        let signer = KeypairSigner::new(keypair);
        let payer = signer.pubkey();
        Self::new(config, resolver, Arc::new(signer), payer)
    }

    /// Execute a swap end to end, streaming [`SwapStage`] updates.
    ///
    /// See [`SwapOrchestrator::execute_swap`] for the single-flight and
    /// cancellation semantics.
    pub fn execute_swap(
        &self,
        input_mint: Pubkey,
        output_mint: Pubkey,
        human_amount: impl Into<String>,
        slippage_bps: u16,
    ) -> mpsc::UnboundedReceiver<SwapStage> {
        self.orchestrator.execute_swap(input_mint, output_mint, human_amount.into(), slippage_bps)
    }

    /// Refresh pricing for display before committing to a swap.
    pub async fn refresh_quote(
        &self,
        input_mint: &Pubkey,
        output_mint: &Pubkey,
        human_amount: &str,
        slippage_bps: u16,
    ) -> Result<Option<QuoteDisplay>, SwapError> {
        self.orchestrator.refresh_quote(input_mint, output_mint, human_amount, slippage_bps).await
    }
}
