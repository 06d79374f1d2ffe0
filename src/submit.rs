//! Signing, broadcast and confirmation of one swap transaction.
//!
//! Per attempt the engine moves `BUILT -> SIGNED -> BROADCAST -> CONFIRMED`
//! (or a terminal failure). For a given unsigned transaction at most one
//! signature is ever produced and at most one broadcast attempt sequence is
//! ever made: retries reuse the identical signed bytes, since the signature
//! is derived from transaction content and re-signing between retries would
//! risk duplicate submissions. Confirmation polling is idempotent and never
//! resubmits.

use crate::builder::UnsignedTransaction;
use crate::common::{SolanaRpcClient, SwapConfig};
use crate::error::SwapError;
use async_trait::async_trait;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use solana_sdk::transaction::VersionedTransaction;
use solana_transaction_status_client_types::TransactionConfirmationStatus;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Signed wire bytes plus the content-derived signature. The signature is
/// the idempotency key for confirmation polling.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub payload: Vec<u8>,
    pub signature: Signature,
}

/// Terminal outcome of one submission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionResult {
    Confirmed(Signature),
    Rejected(String),
    /// The chain height passed the payload's expiry height before the
    /// transaction was observed as finalized. Status unknown, not a
    /// definite failure.
    TimedOut,
}

/// Failure from the ledger RPC seam. `transient` marks errors worth
/// retrying (transport hiccups, busy node); everything else is permanent
/// so the retry policy never guesses from message text.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RpcFailure {
    pub transient: bool,
    pub message: String,
}

impl RpcFailure {
    pub fn transient(message: impl Into<String>) -> Self {
        Self { transient: true, message: message.into() }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self { transient: false, message: message.into() }
    }
}

/// Observed ledger-side status of a broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Finalized,
    Rejected(String),
}

/// Wallet-signing capability. May suspend while awaiting user approval; a
/// decline is terminal for the attempt and is never retried.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    async fn sign_transaction(&self, payload: &[u8]) -> Result<SignedTransaction, SwapError>;
}

/// Ledger RPC seam: broadcast plus the two confirmation primitives.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    async fn broadcast_transaction(&self, payload: &[u8]) -> Result<Signature, RpcFailure>;
    async fn get_status(&self, signature: &Signature) -> Result<TxStatus, RpcFailure>;
    async fn get_height(&self) -> Result<u64, RpcFailure>;
}

/// In-process signer backed by a local keypair.
pub struct KeypairSigner {
    keypair: Arc<Keypair>,
}

impl KeypairSigner {
    pub fn new(keypair: Arc<Keypair>) -> Self {
        Self { keypair }
    }

    pub fn pubkey(&self) -> solana_sdk::pubkey::Pubkey {
        self.keypair.pubkey()
    }
}

#[async_trait]
impl WalletSigner for KeypairSigner {
    async fn sign_transaction(&self, payload: &[u8]) -> Result<SignedTransaction, SwapError> {
        let mut tx: VersionedTransaction = bincode::deserialize(payload)
            .map_err(|e| SwapError::BuildError(format!("undecodable transaction payload: {e}")))?;

        let message_bytes = tx.message.serialize();
        let signature = self
            .keypair
            .try_sign_message(&message_bytes)
            .map_err(|_| SwapError::SignatureDeclined)?;

        // The payer's signature occupies slot zero in the wire format.
        if tx.signatures.is_empty() {
            tx.signatures.push(signature);
        } else {
            tx.signatures[0] = signature;
        }

        let payload = bincode::serialize(&tx)
            .map_err(|e| SwapError::BuildError(format!("unserializable transaction: {e}")))?;
        Ok(SignedTransaction { payload, signature })
    }
}

/// Ledger RPC over the nonblocking Solana client.
pub struct SolanaLedgerRpc {
    rpc: Arc<SolanaRpcClient>,
}

impl SolanaLedgerRpc {
    pub fn new(rpc: Arc<SolanaRpcClient>) -> Self {
        Self { rpc }
    }

    fn classify(err: solana_client::client_error::ClientError) -> RpcFailure {
        use solana_client::client_error::ClientErrorKind;
        // Transport-level failures are worth retrying; RPC-level responses
        // (preflight failures, malformed requests) are not.
        let transient = matches!(*err.kind, ClientErrorKind::Io(_) | ClientErrorKind::Reqwest(_));
        RpcFailure { transient, message: err.to_string() }
    }
}

#[async_trait]
impl LedgerRpc for SolanaLedgerRpc {
    async fn broadcast_transaction(&self, payload: &[u8]) -> Result<Signature, RpcFailure> {
        let tx: VersionedTransaction = bincode::deserialize(payload)
            .map_err(|e| RpcFailure::permanent(format!("undecodable signed payload: {e}")))?;
        self.rpc.send_transaction(&tx).await.map_err(Self::classify)
    }

    async fn get_status(&self, signature: &Signature) -> Result<TxStatus, RpcFailure> {
        let response = self
            .rpc
            .get_signature_statuses(&[*signature])
            .await
            .map_err(Self::classify)?;

        match response.value.into_iter().next().flatten() {
            Some(status) => {
                if let Some(err) = status.err {
                    return Ok(TxStatus::Rejected(err.to_string()));
                }
                match status.confirmation_status {
                    Some(TransactionConfirmationStatus::Finalized) => Ok(TxStatus::Finalized),
                    _ => Ok(TxStatus::Pending),
                }
            }
            // Not yet observed by this node.
            None => Ok(TxStatus::Pending),
        }
    }

    async fn get_height(&self) -> Result<u64, RpcFailure> {
        self.rpc.get_block_height().await.map_err(Self::classify)
    }
}

/// Submission Engine stage of the pipeline.
pub struct SubmissionEngine {
    signer: Arc<dyn WalletSigner>,
    ledger: Arc<dyn LedgerRpc>,
    max_broadcast_attempts: u32,
    backoff_base: Duration,
    poll_interval: Duration,
}

impl SubmissionEngine {
    pub fn new(
        signer: Arc<dyn WalletSigner>,
        ledger: Arc<dyn LedgerRpc>,
        config: &SwapConfig,
    ) -> Self {
        Self {
            signer,
            ledger,
            max_broadcast_attempts: config.max_broadcast_attempts.max(1),
            backoff_base: config.broadcast_backoff_base,
            poll_interval: config.confirm_poll_interval,
        }
    }

    /// Delegate signing to the wallet capability. A decline surfaces as
    /// [`SwapError::SignatureDeclined`] and ends the attempt.
    pub async fn sign(&self, unsigned: &UnsignedTransaction) -> Result<SignedTransaction, SwapError> {
        let signed = self.signer.sign_transaction(&unsigned.payload).await?;
        debug!(signature = %signed.signature, "transaction signed");
        Ok(signed)
    }

    /// Broadcast the signed payload with bounded exponential backoff.
    ///
    /// Only transient failures are retried, the delay doubles per attempt,
    /// and every attempt sends the identical signed bytes. Exhaustion (or a
    /// permanent failure) surfaces as [`SwapError::BroadcastFailed`].
    pub async fn broadcast(&self, signed: &SignedTransaction) -> Result<Signature, SwapError> {
        let mut delay = self.backoff_base;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.ledger.broadcast_transaction(&signed.payload).await {
                Ok(signature) => {
                    if signature != signed.signature {
                        warn!(
                            expected = %signed.signature,
                            observed = %signature,
                            "ledger echoed an unexpected signature"
                        );
                    }
                    info!(signature = %signed.signature, attempt, "broadcast accepted");
                    return Ok(signed.signature);
                }
                Err(failure) if failure.transient && attempt < self.max_broadcast_attempts => {
                    warn!(
                        attempt,
                        max_attempts = self.max_broadcast_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "transient broadcast failure, backing off"
                    );
                    sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Err(failure) => {
                    return Err(SwapError::BroadcastFailed(failure.message));
                }
            }
        }
    }

    /// Poll the ledger until the transaction finalizes, is rejected, or the
    /// chain height passes `last_valid_block_height`.
    ///
    /// Transient RPC failures during polling are tolerated and polling
    /// continues; the transaction is never resubmitted from here.
    pub async fn confirm(
        &self,
        signature: &Signature,
        last_valid_block_height: u64,
    ) -> Result<SubmissionResult, SwapError> {
        loop {
            match self.ledger.get_status(signature).await {
                Ok(TxStatus::Finalized) => {
                    info!(%signature, "transaction finalized");
                    return Ok(SubmissionResult::Confirmed(*signature));
                }
                Ok(TxStatus::Rejected(reason)) => {
                    warn!(%signature, %reason, "transaction rejected by ledger");
                    return Ok(SubmissionResult::Rejected(reason));
                }
                Ok(TxStatus::Pending) => {}
                Err(failure) if failure.transient => {
                    debug!(error = %failure, "status poll failed, will retry");
                }
                Err(failure) => return Err(SwapError::NetworkError(failure.message)),
            }

            match self.ledger.get_height().await {
                Ok(height) if height > last_valid_block_height => {
                    warn!(
                        %signature,
                        height,
                        last_valid_block_height,
                        "confirmation window elapsed"
                    );
                    return Ok(SubmissionResult::TimedOut);
                }
                Ok(_) => {}
                Err(failure) if failure.transient => {
                    debug!(error = %failure, "height poll failed, will retry");
                }
                Err(failure) => return Err(SwapError::NetworkError(failure.message)),
            }

            sleep(self.poll_interval).await;
        }
    }
}
