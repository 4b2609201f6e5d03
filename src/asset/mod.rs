//! Asset Reference boundary.
//!
//! The ledgers never hold external value themselves; they move it through
//! an [`AssetSource`], an opaque fungible-asset handle. Deposits pull value
//! from a principal's external holdings into the ledger's custody, and
//! withdrawals push it back out. Both calls are fallible and atomic: a
//! failed pull or push has moved nothing.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Accounting unit shared by every ledger in the crate.
pub type Amount = u128;

/// An opaque address-like identity that can hold a balance and invoke
/// operations. The all-zero principal is reserved as the "nowhere"
/// sentinel used by mint and burn events.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Principal([u8; 32]);

impl Principal {
    /// Sentinel principal that never holds a balance.
    pub const ZERO: Principal = Principal([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Principal(bytes)
    }

    /// Deterministic identity derived from a human-readable label.
    /// Used by scenario files and tests; production callers supply
    /// real address bytes.
    pub fn from_label(label: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"principal:");
        hasher.update(label.as_bytes());
        Principal(hasher.finalize().into())
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First four bytes are enough to tell principals apart in logs.
        write!(f, "Principal({}..)", hex::encode(&self.0[..4]))
    }
}

impl FromStr for Principal {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut bytes)?;
        Ok(Principal(bytes))
    }
}

// Principals serialize as hex strings so snapshots keyed by principal
// stay plain JSON objects.
impl Serialize for Principal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Principal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Failure modes of the external asset boundary.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AssetError {
    /// The principal's external holdings do not cover the pull.
    #[error("insufficient external funds")]
    InsufficientFunds,

    /// The principal has not authorized the ledger to pull this amount.
    #[error("custody not authorized")]
    NotAuthorized,
}

/// External fungible-value store the ledger moves value through.
///
/// Implementations must be atomic: on `Err` no value has moved in either
/// direction. The ledger assumes nothing else about them.
pub trait AssetSource {
    /// Move `amount` from `from`'s external holdings into ledger custody.
    fn pull(&mut self, from: &Principal, amount: Amount) -> Result<(), AssetError>;

    /// Move `amount` from ledger custody to `to`'s external holdings.
    fn push(&mut self, to: &Principal, amount: Amount) -> Result<(), AssetError>;
}

/// In-memory asset contract used by the scenario runner and the tests.
///
/// Pulls require both sufficient holdings and a prior custody approval
/// (granted with [`ExternalAsset::approve_custody`]); both are consumed
/// by the pull. Pushes only require custody to cover the amount.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalAsset {
    holdings: BTreeMap<Principal, Amount>,
    approvals: BTreeMap<Principal, Amount>,
    custody: Amount,
}

impl ExternalAsset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit a principal's external holdings, e.g. when seeding a scenario.
    pub fn fund(&mut self, principal: Principal, amount: Amount) {
        let holding = self.holdings.entry(principal).or_default();
        *holding = holding.saturating_add(amount);
    }

    /// Authorize the ledger to pull up to `amount` from `principal`.
    /// Overwrites any prior approval.
    pub fn approve_custody(&mut self, principal: Principal, amount: Amount) {
        self.approvals.insert(principal, amount);
    }

    pub fn holdings_of(&self, principal: &Principal) -> Amount {
        self.holdings.get(principal).copied().unwrap_or(0)
    }

    pub fn custody(&self) -> Amount {
        self.custody
    }
}

impl AssetSource for ExternalAsset {
    fn pull(&mut self, from: &Principal, amount: Amount) -> Result<(), AssetError> {
        let approved = self.approvals.get(from).copied().unwrap_or(0);
        if approved < amount {
            return Err(AssetError::NotAuthorized);
        }
        let held = self.holdings_of(from);
        if held < amount {
            return Err(AssetError::InsufficientFunds);
        }
        self.approvals.insert(*from, approved - amount);
        self.holdings.insert(*from, held - amount);
        self.custody += amount;
        Ok(())
    }

    fn push(&mut self, to: &Principal, amount: Amount) -> Result<(), AssetError> {
        if self.custody < amount {
            return Err(AssetError::InsufficientFunds);
        }
        self.custody -= amount;
        let holding = self.holdings.entry(*to).or_default();
        *holding += amount;
        Ok(())
    }
}
