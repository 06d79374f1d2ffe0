//! Pipeline error kinds.
//!
//! Every terminal failure of a swap attempt carries exactly one of these
//! variants; nothing is collapsed into a catch-all.

use thiserror::Error;

/// Errors surfaced by the swap pipeline.
///
/// Variants map one-to-one onto the stages that can fail: input validation,
/// quoting, building, signing, broadcast and confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwapError {
    /// Amount is negative, non-numeric, zero, or does not fit in 64 bits
    /// once scaled to atomic units.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The token resolver has no entry for the given mint.
    #[error("unresolved token: {0}")]
    UnresolvedToken(String),

    /// The quote service reported that no viable route exists for the pair
    /// at the requested size.
    #[error("insufficient liquidity: {0}")]
    InsufficientLiquidity(String),

    /// The quote's time-to-live elapsed before it was used. A fresh quote
    /// must be requested; the stale one is never built against.
    #[error("quote expired before use")]
    QuoteExpired,

    /// The build service returned malformed route data or rejected the
    /// payer/account configuration.
    #[error("transaction build failed: {0}")]
    BuildError(String),

    /// The wallet declined to sign. Terminal for the attempt, never retried.
    #[error("signature declined by wallet")]
    SignatureDeclined,

    /// Broadcast failed after exhausting the bounded retry budget.
    #[error("broadcast failed after retries: {0}")]
    BroadcastFailed(String),

    /// The ledger observed the transaction and rejected it.
    #[error("transaction rejected by ledger: {0}")]
    LedgerRejected(String),

    /// The chain height passed the transaction's expiry height without the
    /// transaction being finalized. Status is unknown, not definitely
    /// failed; the transaction may still land and should be checked on an
    /// explorer.
    #[error("confirmation window elapsed; transaction status unknown, check an explorer")]
    ConfirmationTimedOut,

    /// Transport-level failure talking to a remote collaborator.
    #[error("network error: {0}")]
    NetworkError(String),

    /// A swap is already past the quote stage for this session; the new
    /// request was refused rather than abandoning the in-flight submission.
    #[error("a swap submission is already in flight")]
    SwapInProgress,
}

impl From<reqwest::Error> for SwapError {
    fn from(err: reqwest::Error) -> Self {
        SwapError::NetworkError(err.to_string())
    }
}
