use thiserror::Error;

use crate::asset::AssetError;

/// Canonical error taxonomy for the ledger operations.
///
/// Every failure is synchronous and leaves the ledger state exactly as it
/// was before the call; no partial credit or debit survives an error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// A zero-amount deposit or withdrawal was attempted.
    #[error("amount must be nonzero")]
    InvalidAmount,

    /// The debited principal holds less than the requested amount.
    #[error("insufficient balance")]
    InsufficientBalance,

    /// The spender's allowance from the owner is below the requested amount.
    #[error("insufficient allowance")]
    InsufficientAllowance,

    /// The caller is not authorized for this operation.
    #[error("caller is not authorized")]
    Unauthorized,

    /// Minting the requested amount would push total supply past the cap.
    #[error("mint would exceed max supply")]
    SupplyExceeded,

    /// The external asset pull or push failed; nothing moved.
    #[error("asset transfer failed: {0}")]
    TransferFailed(#[from] AssetError),

    /// A constructor argument was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(&'static str),

    /// Crediting the amount would overflow the pool total.
    #[error("balance overflow")]
    BalanceOverflow,
}
