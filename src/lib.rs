//! Pool ledger primitives.
//!
//! A shared-pool balance ledger ([`Vault`]) whose pool total always equals
//! the sum of the per-principal balances, and a capped-supply token ledger
//! in two layouts: the plain [`TokenLedger`] and the storage-optimized
//! [`PackedTokenLedger`], which are observably identical. External value
//! moves through an [`AssetSource`] handle bound at construction.

pub mod asset;
mod commit;
pub mod error;
pub mod token;
pub mod vault;

pub use asset::{Amount, AssetError, AssetSource, ExternalAsset, Principal};
pub use error::LedgerError;
pub use token::packed::{LedgerMeta, PackedTokenLedger};
pub use token::{TokenConfig, TokenEvent, TokenLedger, TokenOp, TokenSnapshot};
pub use vault::{Vault, VaultEvent, VaultSnapshot};
