//! Standard Token Ledger.
//!
//! A capped-supply fungible token ledger with delegated transfers. Two
//! variants share this module's event, op, and snapshot types:
//!
//! - [`TokenLedger`]: the straightforward layout, one field per logical
//!   value, every arithmetic step checked at the point of use;
//! - [`packed::PackedTokenLedger`]: the storage-optimized layout
//!   (read-once locals, bounded-then-trusted arithmetic, packed metadata).
//!
//! The two are externally indistinguishable: identical operation
//! sequences yield identical balances, supplies, and event streams.

pub mod packed;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::asset::{Amount, Principal};
use crate::commit;
use crate::error::LedgerError;

/// Constructor parameters, also the scenario-file form.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenConfig {
    pub name: String,
    pub symbol: String,
    pub owner: Principal,
    pub max_supply: Amount,
}

/// Events emitted by both token variants, one per successful mutating
/// call, in call order. Mints and burns are transfers from/to the zero
/// principal.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenEvent {
    Transfer {
        from: Principal,
        to: Principal,
        amount: Amount,
    },
    Approval {
        owner: Principal,
        spender: Principal,
        amount: Amount,
    },
}

/// Scripted operation form consumed by `apply` on both variants.
/// The caller principal is supplied by the boundary layer, never by
/// the script step itself.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TokenOp {
    Transfer { to: Principal, amount: Amount },
    Approve { spender: Principal, amount: Amount },
    TransferFrom {
        from: Principal,
        to: Principal,
        amount: Amount,
    },
    Mint { to: Principal, amount: Amount },
    Burn { amount: Amount },
    SetPaused { paused: bool },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllowanceEntry {
    pub owner: Principal,
    pub spender: Principal,
    pub amount: Amount,
}

/// Committed view of a token ledger plus its merkle root. Both variants
/// produce this same shape, so snapshots compare directly.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenSnapshot {
    pub name: String,
    pub symbol: String,
    pub owner: Principal,
    pub max_supply: Amount,
    pub total_supply: Amount,
    pub balances: BTreeMap<Principal, Amount>,
    pub allowances: Vec<AllowanceEntry>,
    pub last_update: u64,
    pub paused: bool,
    pub events: Vec<TokenEvent>,
    pub state_root: [u8; 32],
}

fn snapshot_root(snapshot: &TokenSnapshot) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = snapshot
        .balances
        .iter()
        .map(|(principal, amount)| commit::balance_leaf(b"bal", principal, *amount))
        .collect();
    for entry in &snapshot.allowances {
        leaves.push(commit::allowance_leaf(&entry.owner, &entry.spender, entry.amount));
    }
    commit::merkle_root(leaves)
}

pub struct TokenLedger {
    name: String,
    symbol: String,
    owner: Principal,
    max_supply: Amount,
    total_supply: Amount,
    balances: BTreeMap<Principal, Amount>,
    allowances: BTreeMap<(Principal, Principal), Amount>,
    last_update: u64,
    paused: bool,
    events: Vec<TokenEvent>,
}

impl TokenLedger {
    pub fn new(config: TokenConfig) -> Result<Self, LedgerError> {
        if config.owner.is_zero() {
            return Err(LedgerError::InvalidConfiguration(
                "owner must not be the zero principal",
            ));
        }
        if config.max_supply == 0 {
            return Err(LedgerError::InvalidConfiguration(
                "max supply must be nonzero",
            ));
        }
        Ok(Self {
            name: config.name,
            symbol: config.symbol,
            owner: config.owner,
            max_supply: config.max_supply,
            total_supply: 0,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
            last_update: 0,
            paused: false,
            events: Vec::new(),
        })
    }

    /// Move `amount` from the caller to `to`.
    pub fn transfer(
        &mut self,
        caller: Principal,
        to: Principal,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let from_balance = self.balance_of(&caller);
        if from_balance < amount {
            return Err(LedgerError::InsufficientBalance);
        }
        self.set_balance(caller, from_balance - amount);
        // Credit after the debit so a self-transfer nets to zero.
        let to_balance = self.balance_of(&to);
        self.set_balance(to, to_balance + amount);
        self.events.push(TokenEvent::Transfer {
            from: caller,
            to,
            amount,
        });
        Ok(())
    }

    /// Set (not add to) the spender's allowance from the caller.
    pub fn approve(
        &mut self,
        caller: Principal,
        spender: Principal,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.set_allowance(caller, spender, amount);
        self.events.push(TokenEvent::Approval {
            owner: caller,
            spender,
            amount,
        });
        Ok(())
    }

    /// Move `amount` from `from` to `to` on the caller's allowance.
    /// Allowance is checked before balance; both before any mutation.
    pub fn transfer_from(
        &mut self,
        caller: Principal,
        from: Principal,
        to: Principal,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let allowed = self.allowance(&from, &caller);
        if allowed < amount {
            return Err(LedgerError::InsufficientAllowance);
        }
        let from_balance = self.balance_of(&from);
        if from_balance < amount {
            return Err(LedgerError::InsufficientBalance);
        }
        self.set_allowance(from, caller, allowed - amount);
        self.set_balance(from, from_balance - amount);
        let to_balance = self.balance_of(&to);
        self.set_balance(to, to_balance + amount);
        self.events.push(TokenEvent::Transfer { from, to, amount });
        Ok(())
    }

    /// Create `amount` new units for `to`. Owner only; capped.
    pub fn mint(
        &mut self,
        caller: Principal,
        to: Principal,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        if caller != self.owner {
            return Err(LedgerError::Unauthorized);
        }
        let new_supply = match self.total_supply.checked_add(amount) {
            Some(supply) if supply <= self.max_supply => supply,
            _ => return Err(LedgerError::SupplyExceeded),
        };
        self.total_supply = new_supply;
        let to_balance = self.balance_of(&to);
        self.set_balance(to, to_balance + amount);
        self.events.push(TokenEvent::Transfer {
            from: Principal::ZERO,
            to,
            amount,
        });
        Ok(())
    }

    /// Destroy `amount` units held by the caller.
    pub fn burn(&mut self, caller: Principal, amount: Amount) -> Result<(), LedgerError> {
        let balance = self.balance_of(&caller);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance);
        }
        self.set_balance(caller, balance - amount);
        self.total_supply -= amount;
        self.events.push(TokenEvent::Transfer {
            from: caller,
            to: Principal::ZERO,
            amount,
        });
        Ok(())
    }

    /// Flip the circuit-breaker latch. Owner only; no event.
    pub fn set_paused(&mut self, caller: Principal, paused: bool) -> Result<(), LedgerError> {
        if caller != self.owner {
            return Err(LedgerError::Unauthorized);
        }
        self.paused = paused;
        Ok(())
    }

    /// Scripted entry point: dispatch one op and, on success, record the
    /// boundary-supplied timestamp of the mutation.
    pub fn apply(
        &mut self,
        caller: Principal,
        op: TokenOp,
        timestamp: u64,
    ) -> Result<(), LedgerError> {
        match op {
            TokenOp::Transfer { to, amount } => self.transfer(caller, to, amount)?,
            TokenOp::Approve { spender, amount } => self.approve(caller, spender, amount)?,
            TokenOp::TransferFrom { from, to, amount } => {
                self.transfer_from(caller, from, to, amount)?
            }
            TokenOp::Mint { to, amount } => self.mint(caller, to, amount)?,
            TokenOp::Burn { amount } => self.burn(caller, amount)?,
            TokenOp::SetPaused { paused } => self.set_paused(caller, paused)?,
        }
        self.last_update = timestamp;
        Ok(())
    }

    fn set_balance(&mut self, principal: Principal, amount: Amount) {
        if amount == 0 {
            self.balances.remove(&principal);
        } else {
            self.balances.insert(principal, amount);
        }
    }

    fn set_allowance(&mut self, owner: Principal, spender: Principal, amount: Amount) {
        if amount == 0 {
            self.allowances.remove(&(owner, spender));
        } else {
            self.allowances.insert((owner, spender), amount);
        }
    }

    pub fn balance_of(&self, principal: &Principal) -> Amount {
        self.balances.get(principal).copied().unwrap_or(0)
    }

    pub fn allowance(&self, owner: &Principal, spender: &Principal) -> Amount {
        self.allowances.get(&(*owner, *spender)).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn max_supply(&self) -> Amount {
        self.max_supply
    }

    pub fn owner(&self) -> Principal {
        self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn last_update(&self) -> u64 {
        self.last_update
    }

    pub fn events(&self) -> &[TokenEvent] {
        &self.events
    }

    pub fn snapshot(&self) -> TokenSnapshot {
        let mut snapshot = TokenSnapshot {
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            owner: self.owner,
            max_supply: self.max_supply,
            total_supply: self.total_supply,
            balances: self.balances.clone(),
            allowances: self
                .allowances
                .iter()
                .map(|((owner, spender), amount)| AllowanceEntry {
                    owner: *owner,
                    spender: *spender,
                    amount: *amount,
                })
                .collect(),
            last_update: self.last_update,
            paused: self.paused,
            events: self.events.clone(),
            state_root: [0u8; 32],
        };
        snapshot.state_root = snapshot_root(&snapshot);
        snapshot
    }
}
