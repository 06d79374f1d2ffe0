//! End-to-end swap driver.
//!
//! One orchestrator owns the whole flow Quote -> Build -> Sign -> Broadcast
//! -> Confirm and exposes it as a stream of [`SwapStage`] updates. Stages are
//! strictly sequential per attempt; no step starts before the previous one's
//! result is known. Illegal transitions (double broadcast, building against
//! a quote that was never delivered) are unrepresentable rather than merely
//! checked.

use crate::builder::SwapTransactionBuilder;
use crate::error::SwapError;
use crate::quote::{Quote, QuoteNegotiator, QuoteOutcome};
use crate::submit::{SubmissionEngine, SubmissionResult};
use crate::token::TokenResolver;
use crate::utils::amount::to_human;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Externally observable state of an in-flight swap.
#[derive(Debug, Clone)]
pub enum SwapStage {
    Idle,
    QuotePending,
    QuoteReady {
        quote: Quote,
        /// Human-readable estimated output, recomputed whenever the quote
        /// changes.
        estimated_output: String,
    },
    Building,
    AwaitingSignature,
    Broadcasting,
    Confirming { signature: Signature },
    Succeeded { signature: Signature },
    Failed { reason: SwapError },
}

/// A delivered quote plus its display form, for callers refreshing pricing
/// before committing.
#[derive(Debug, Clone)]
pub struct QuoteDisplay {
    pub quote: Quote,
    pub estimated_output: String,
}

/// Releases the single-flight slot when the attempt reaches a terminal
/// state, however it exits. No partial state survives an attempt.
struct FlightGuard {
    flag: Arc<AtomicBool>,
}

impl FlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Swap Orchestrator: composes resolver, negotiator, builder and engine.
pub struct SwapOrchestrator {
    resolver: Arc<dyn TokenResolver>,
    negotiator: Arc<QuoteNegotiator>,
    builder: Arc<SwapTransactionBuilder>,
    engine: Arc<SubmissionEngine>,
    payer: Pubkey,
    in_flight: Arc<AtomicBool>,
}

impl SwapOrchestrator {
    pub fn new(
        resolver: Arc<dyn TokenResolver>,
        negotiator: Arc<QuoteNegotiator>,
        builder: Arc<SwapTransactionBuilder>,
        engine: Arc<SubmissionEngine>,
        payer: Pubkey,
    ) -> Self {
        Self {
            resolver,
            negotiator,
            builder,
            engine,
            payer,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Drive a full swap, streaming stage updates as they happen.
    ///
    /// Must be called from within a tokio runtime; the flow runs in a
    /// spawned task and keeps going even if the receiver is dropped, so an
    /// in-flight submission is never abandoned mid-broadcast. Only one swap
    /// may be past `Building` at a time; a competing call fails with
    /// [`SwapError::SwapInProgress`] without touching the in-flight one.
    pub fn execute_swap(
        &self,
        input_mint: Pubkey,
        output_mint: Pubkey,
        human_amount: String,
        slippage_bps: u16,
    ) -> mpsc::UnboundedReceiver<SwapStage> {
        let (updates, stream) = mpsc::unbounded_channel();

        let resolver = self.resolver.clone();
        let negotiator = self.negotiator.clone();
        let builder = self.builder.clone();
        let engine = self.engine.clone();
        let payer = self.payer;
        let in_flight = self.in_flight.clone();

        tokio::spawn(async move {
            let _ = updates.send(SwapStage::QuotePending);
            let outcome = run_attempt(
                &resolver,
                &negotiator,
                &builder,
                &engine,
                payer,
                &in_flight,
                input_mint,
                output_mint,
                &human_amount,
                slippage_bps,
                &updates,
            )
            .await;

            match outcome {
                Ok(Some(signature)) => {
                    let _ = updates.send(SwapStage::Succeeded { signature });
                }
                // Superseded before acceptance: the newer request carries on,
                // this attempt just steps aside.
                Ok(None) => {
                    let _ = updates.send(SwapStage::Idle);
                }
                Err(reason) => {
                    warn!(%reason, "swap attempt failed");
                    let _ = updates.send(SwapStage::Failed { reason });
                }
            }
        });

        stream
    }

    /// Fetch a fresh quote for display without committing to a swap.
    ///
    /// Returns `None` when a newer refresh superseded this one while it was
    /// in flight. Usable at any time, including while a submission is in
    /// flight; it only affects quote display.
    pub async fn refresh_quote(
        &self,
        input_mint: &Pubkey,
        output_mint: &Pubkey,
        human_amount: &str,
        slippage_bps: u16,
    ) -> Result<Option<QuoteDisplay>, SwapError> {
        let input = self.resolver.resolve(input_mint).await?;
        let output = self.resolver.resolve(output_mint).await?;

        match self.negotiator.request_quote(&input, &output, human_amount, slippage_bps).await? {
            QuoteOutcome::Delivered(quote) => {
                let estimated_output = to_human(quote.output_amount, output.decimals);
                Ok(Some(QuoteDisplay { quote, estimated_output }))
            }
            QuoteOutcome::Superseded => Ok(None),
        }
    }
}

/// One swap attempt, start to terminal. `Ok(None)` means the quote was
/// superseded before acceptance and the attempt stepped aside.
async fn run_attempt(
    resolver: &Arc<dyn TokenResolver>,
    negotiator: &QuoteNegotiator,
    builder: &SwapTransactionBuilder,
    engine: &SubmissionEngine,
    payer: Pubkey,
    in_flight: &Arc<AtomicBool>,
    input_mint: Pubkey,
    output_mint: Pubkey,
    human_amount: &str,
    slippage_bps: u16,
    updates: &mpsc::UnboundedSender<SwapStage>,
) -> Result<Option<Signature>, SwapError> {
    let input = resolver.resolve(&input_mint).await?;
    let output = resolver.resolve(&output_mint).await?;

    let quote: Quote =
        match negotiator.request_quote(&input, &output, human_amount, slippage_bps).await? {
            QuoteOutcome::Delivered(quote) => quote,
            QuoteOutcome::Superseded => {
                debug!("quote superseded mid-swap, yielding to the newer request");
                return Ok(None);
            }
        };

    let estimated_output = to_human(quote.output_amount, output.decimals);
    let _ = updates.send(SwapStage::QuoteReady { quote: quote.clone(), estimated_output });

    // From Building onward the session is single-flight. The guard drops on
    // every exit path, so a terminal state always frees the slot.
    let _guard = FlightGuard::acquire(in_flight).ok_or(SwapError::SwapInProgress)?;

    let _ = updates.send(SwapStage::Building);
    let unsigned = builder.build(&quote, &payer).await?;

    let _ = updates.send(SwapStage::AwaitingSignature);
    let signed = engine.sign(&unsigned).await?;

    let _ = updates.send(SwapStage::Broadcasting);
    let signature = engine.broadcast(&signed).await?;

    let _ = updates.send(SwapStage::Confirming { signature });
    match engine.confirm(&signature, unsigned.last_valid_block_height).await? {
        SubmissionResult::Confirmed(signature) => Ok(Some(signature)),
        SubmissionResult::Rejected(reason) => Err(SwapError::LedgerRejected(reason)),
        SubmissionResult::TimedOut => Err(SwapError::ConfirmationTimedOut),
    }
}
