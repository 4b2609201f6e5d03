//! Storage-optimized token ledger variant.
//!
//! Same observable behavior as [`TokenLedger`](super::TokenLedger), with a
//! storage-access discipline layered on top:
//!
//! 1. every balance or allowance slot an operation touches is loaded at
//!    most once into a local, and all checks and arithmetic reuse the
//!    local instead of re-reading;
//! 2. once a precondition bounds an arithmetic step, the step runs
//!    without redundant range re-validation;
//! 3. the mutation timestamp and the pause latch share one [`LedgerMeta`]
//!    composite, always written as a unit.
//!
//! None of this changes which operations fail, what they return, or which
//! events they emit.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::asset::{Amount, Principal};
use crate::error::LedgerError;

use super::{snapshot_root, AllowanceEntry, TokenConfig, TokenEvent, TokenOp, TokenSnapshot};

/// Two logically independent fields kept in one composite and written as
/// a unit. Purely a layout/grouping decision; either field read alone
/// behaves as if it were stored alone.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerMeta {
    pub last_update: u64,
    pub paused: bool,
}

pub struct PackedTokenLedger {
    name: String,
    symbol: String,
    owner: Principal,
    max_supply: Amount,
    total_supply: Amount,
    balances: BTreeMap<Principal, Amount>,
    allowances: BTreeMap<(Principal, Principal), Amount>,
    meta: LedgerMeta,
    events: Vec<TokenEvent>,
}

impl PackedTokenLedger {
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
            meta: LedgerMeta::default(),
            events: Vec::new(),
        })
    }

    pub fn transfer(
        &mut self,
        caller: Principal,
        to: Principal,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let from_balance = self.load_balance(&caller);
        if from_balance < amount {
            return Err(LedgerError::InsufficientBalance);
        }
        if caller == to {
            // One slot, debit and credit cancel: validated, nothing to write.
        } else {
            let to_balance = self.load_balance(&to);
            // from_balance covers amount; the credit is bounded by
            // total_supply <= max_supply.
            self.store_balance(caller, from_balance - amount);
            self.store_balance(to, to_balance + amount);
        }
        self.events.push(TokenEvent::Transfer {
            from: caller,
            to,
            amount,
        });
        Ok(())
    }

    pub fn approve(
        &mut self,
        caller: Principal,
        spender: Principal,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        // Unconditional overwrite: no read of the prior value at all.
        self.store_allowance(caller, spender, amount);
        self.events.push(TokenEvent::Approval {
            owner: caller,
            spender,
            amount,
        });
        Ok(())
    }

    pub fn transfer_from(
        &mut self,
        caller: Principal,
        from: Principal,
        to: Principal,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let allowed = self.load_allowance(&from, &caller);
        if allowed < amount {
            return Err(LedgerError::InsufficientAllowance);
        }
        let from_balance = self.load_balance(&from);
        if from_balance < amount {
            return Err(LedgerError::InsufficientBalance);
        }
        self.store_allowance(from, caller, allowed - amount);
        if from == to {
            // Same aliasing rule as transfer: the slot is untouched.
        } else {
            let to_balance = self.load_balance(&to);
            self.store_balance(from, from_balance - amount);
            self.store_balance(to, to_balance + amount);
        }
        self.events.push(TokenEvent::Transfer { from, to, amount });
        Ok(())
    }

    pub fn mint(
        &mut self,
        caller: Principal,
        to: Principal,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        if caller != self.owner {
            return Err(LedgerError::Unauthorized);
        }
        let supply = self.total_supply;
        let new_supply = match supply.checked_add(amount) {
            Some(supply) if supply <= self.max_supply => supply,
            _ => return Err(LedgerError::SupplyExceeded),
        };
        let to_balance = self.load_balance(&to);
        self.total_supply = new_supply;
        // to_balance + amount <= new_supply <= max_supply.
        self.store_balance(to, to_balance + amount);
        self.events.push(TokenEvent::Transfer {
            from: Principal::ZERO,
            to,
            amount,
        });
        Ok(())
    }

    pub fn burn(&mut self, caller: Principal, amount: Amount) -> Result<(), LedgerError> {
        let balance = self.load_balance(&caller);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance);
        }
        // balance <= total_supply, so both subtractions are covered.
        self.store_balance(caller, balance - amount);
        self.total_supply -= amount;
        self.events.push(TokenEvent::Transfer {
            from: caller,
            to: Principal::ZERO,
            amount,
        });
        Ok(())
    }

    pub fn set_paused(&mut self, caller: Principal, paused: bool) -> Result<(), LedgerError> {
        if caller != self.owner {
            return Err(LedgerError::Unauthorized);
        }
        self.meta = LedgerMeta {
            paused,
            ..self.meta
        };
        Ok(())
    }

    /// Scripted entry point; on success the whole meta composite is
    /// committed in one write.
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
        self.meta = LedgerMeta {
            last_update: timestamp,
            paused: self.meta.paused,
        };
        Ok(())
    }

    fn load_balance(&self, principal: &Principal) -> Amount {
        self.balances.get(principal).copied().unwrap_or(0)
    }

    fn store_balance(&mut self, principal: Principal, amount: Amount) {
        if amount == 0 {
            self.balances.remove(&principal);
        } else {
            self.balances.insert(principal, amount);
        }
    }

    fn load_allowance(&self, owner: &Principal, spender: &Principal) -> Amount {
        self.allowances.get(&(*owner, *spender)).copied().unwrap_or(0)
    }

    fn store_allowance(&mut self, owner: Principal, spender: Principal, amount: Amount) {
        if amount == 0 {
            self.allowances.remove(&(owner, spender));
        } else {
            self.allowances.insert((owner, spender), amount);
        }
    }

    pub fn balance_of(&self, principal: &Principal) -> Amount {
        self.load_balance(principal)
    }

    pub fn allowance(&self, owner: &Principal, spender: &Principal) -> Amount {
        self.load_allowance(owner, spender)
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
        self.meta.paused
    }

    pub fn last_update(&self) -> u64 {
        self.meta.last_update
    }

    pub fn meta(&self) -> LedgerMeta {
        self.meta
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
            last_update: self.meta.last_update,
            paused: self.meta.paused,
            events: self.events.clone(),
            state_root: [0u8; 32],
        };
        snapshot.state_root = snapshot_root(&snapshot);
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::super::tests::test_config;
    use super::super::TokenLedger;
    use super::*;

    fn both() -> (TokenLedger, PackedTokenLedger) {
        (
            TokenLedger::new(test_config()).unwrap(),
            PackedTokenLedger::new(test_config()).unwrap(),
        )
    }

    fn apply_both(
        plain: &mut TokenLedger,
        packed: &mut PackedTokenLedger,
        caller: Principal,
        op: TokenOp,
        timestamp: u64,
    ) {
        let a = plain.apply(caller, op.clone(), timestamp);
        let b = packed.apply(caller, op, timestamp);
        assert_eq!(a, b);
    }

    #[test]
    fn variants_agree_on_a_directed_sequence() {
        let owner = Principal::from_label("owner");
        let alice = Principal::from_label("alice");
        let bob = Principal::from_label("bob");
        let (mut plain, mut packed) = both();

        let steps: Vec<(Principal, TokenOp)> = vec![
            (owner, TokenOp::Mint { to: alice, amount: 500 }),
            (alice, TokenOp::Transfer { to: bob, amount: 120 }),
            (alice, TokenOp::Approve { spender: bob, amount: 80 }),
            (bob, TokenOp::TransferFrom { from: alice, to: bob, amount: 80 }),
            (bob, TokenOp::Burn { amount: 50 }),
            (owner, TokenOp::SetPaused { paused: true }),
            // Failures must also agree.
            (alice, TokenOp::Transfer { to: bob, amount: 10_000 }),
            (alice, TokenOp::Mint { to: alice, amount: 1 }),
            (bob, TokenOp::TransferFrom { from: alice, to: bob, amount: 1 }),
        ];
        for (i, (caller, op)) in steps.into_iter().enumerate() {
            apply_both(&mut plain, &mut packed, caller, op, i as u64);
        }
        assert_eq!(plain.snapshot(), packed.snapshot());
        assert!(packed.is_paused());
    }

    #[test]
    fn variants_agree_on_the_aliasing_edges() {
        let owner = Principal::from_label("owner");
        let alice = Principal::from_label("alice");
        let bob = Principal::from_label("bob");
        let (mut plain, mut packed) = both();

        apply_both(&mut plain, &mut packed, owner, TokenOp::Mint { to: alice, amount: 100 }, 1);
        // Self-transfer must not create or destroy units in either layout.
        apply_both(&mut plain, &mut packed, alice, TokenOp::Transfer { to: alice, amount: 60 }, 2);
        apply_both(&mut plain, &mut packed, alice, TokenOp::Approve { spender: bob, amount: 90 }, 3);
        apply_both(
            &mut plain,
            &mut packed,
            bob,
            TokenOp::TransferFrom { from: alice, to: alice, amount: 40 },
            4,
        );
        assert_eq!(packed.balance_of(&alice), 100);
        assert_eq!(packed.allowance(&alice, &bob), 50);
        assert_eq!(plain.snapshot(), packed.snapshot());
    }

    #[test]
    fn variants_agree_on_seeded_random_sequences() {
        let owner = Principal::from_label("owner");
        let principals: Vec<Principal> = ["owner", "alice", "bob", "carol"]
            .iter()
            .map(|label| Principal::from_label(label))
            .collect();

        for seed in 0..8u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let (mut plain, mut packed) = both();
            plain.mint(owner, principals[1], 10_000).unwrap();
            packed.mint(owner, principals[1], 10_000).unwrap();

            for step in 0..300u64 {
                let caller = principals[rng.gen_range(0..principals.len())];
                let other = principals[rng.gen_range(0..principals.len())];
                let third = principals[rng.gen_range(0..principals.len())];
                let amount = rng.gen_range(0..400u128);
                let op = match rng.gen_range(0..6) {
                    0 => TokenOp::Transfer { to: other, amount },
                    1 => TokenOp::Approve { spender: other, amount },
                    2 => TokenOp::TransferFrom { from: other, to: third, amount },
                    3 => TokenOp::Mint { to: other, amount },
                    4 => TokenOp::Burn { amount },
                    _ => TokenOp::SetPaused { paused: amount % 2 == 0 },
                };
                apply_both(&mut plain, &mut packed, caller, op, step);
            }
            assert_eq!(plain.snapshot(), packed.snapshot());

            let sum: Amount = packed.snapshot().balances.values().sum();
            assert_eq!(packed.total_supply(), sum);
            assert!(packed.total_supply() <= packed.max_supply());
        }
    }

    #[test]
    fn meta_composite_keeps_fields_independent() {
        let owner = Principal::from_label("owner");
        let alice = Principal::from_label("alice");
        let mut packed = PackedTokenLedger::new(test_config()).unwrap();

        packed.set_paused(owner, true).unwrap();
        assert_eq!(
            packed.meta(),
            LedgerMeta {
                last_update: 0,
                paused: true,
            }
        );
        packed
            .apply(owner, TokenOp::Mint { to: alice, amount: 1 }, 42)
            .unwrap();
        // The timestamp write must not clobber the latch, and vice versa.
        assert_eq!(
            packed.meta(),
            LedgerMeta {
                last_update: 42,
                paused: true,
            }
        );
        packed.set_paused(owner, false).unwrap();
        assert_eq!(packed.last_update(), 42);
    }
}
