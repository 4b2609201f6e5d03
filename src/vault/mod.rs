//! Balance Ledger: a single shared pool of deposits.
//!
//! Many independent principals deposit into one pool; the ledger guarantees
//! that the pool total always equals the sum of the individual balances and
//! that every mutation is atomic. Value enters and leaves through the bound
//! [`AssetSource`] handle, set once at construction.
//!
//! Ordering discipline against reentrancy: a deposit pulls external value
//! before crediting (so nothing is credited for value never received), and
//! a withdrawal debits internal state before pushing (so the books are
//! consistent before control ever leaves the ledger).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::asset::{Amount, AssetSource, Principal};
use crate::commit;
use crate::error::LedgerError;

/// Events emitted by the vault, one per successful mutating call,
/// in call order.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VaultEvent {
    Deposited {
        principal: Principal,
        amount: Amount,
        new_total: Amount,
    },
    Withdrawn {
        principal: Principal,
        amount: Amount,
        new_total: Amount,
    },
}

/// Committed view of the vault state plus its merkle root.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VaultSnapshot {
    pub balances: BTreeMap<Principal, Amount>,
    pub total: Amount,
    pub events: Vec<VaultEvent>,
    pub state_root: [u8; 32],
}

pub struct Vault<A> {
    asset: A,
    balances: BTreeMap<Principal, Amount>,
    total: Amount,
    events: Vec<VaultEvent>,
}

impl<A: AssetSource> Vault<A> {
    /// Bind the vault to its asset handle. The handle is never reassigned.
    pub fn new(asset: A) -> Self {
        Self {
            asset,
            balances: BTreeMap::new(),
            total: 0,
            events: Vec::new(),
        }
    }

    /// Pull `amount` from the principal's external holdings into the pool
    /// and credit the principal. Pull-then-credit: internal state changes
    /// only after the external transfer has fully succeeded.
    pub fn deposit(&mut self, principal: Principal, amount: Amount) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        // Establish the credited total before calling out, so a pull that
        // succeeds is never followed by an internal failure.
        let new_total = self
            .total
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow)?;
        self.asset.pull(&principal, amount)?;

        let balance = self.balances.entry(principal).or_default();
        // balance <= total, so this cannot overflow once new_total exists.
        *balance += amount;
        self.total = new_total;
        self.events.push(VaultEvent::Deposited {
            principal,
            amount,
            new_total,
        });
        Ok(())
    }

    /// Debit the principal and push `amount` back to its external holdings.
    /// Debit-then-push: the books are consistent before the asset call; if
    /// the push itself fails, the debit is restored and the pre-call state
    /// is preserved exactly.
    pub fn withdraw(&mut self, principal: Principal, amount: Amount) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let balance = self.balance_of(&principal);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance);
        }
        self.set_balance(principal, balance - amount);
        self.total -= amount;

        if let Err(err) = self.asset.push(&principal, amount) {
            // The failed push moved nothing; undo the debit.
            self.set_balance(principal, balance);
            self.total += amount;
            return Err(LedgerError::TransferFailed(err));
        }
        self.events.push(VaultEvent::Withdrawn {
            principal,
            amount,
            new_total: self.total,
        });
        Ok(())
    }

    // Zero balances are dropped so a withdrawn-to-zero principal is
    // indistinguishable from one that never deposited.
    fn set_balance(&mut self, principal: Principal, amount: Amount) {
        if amount == 0 {
            self.balances.remove(&principal);
        } else {
            self.balances.insert(principal, amount);
        }
    }

    /// A zero balance is indistinguishable from a never-deposited principal.
    pub fn balance_of(&self, principal: &Principal) -> Amount {
        self.balances.get(principal).copied().unwrap_or(0)
    }

    pub fn total_deposited(&self) -> Amount {
        self.total
    }

    pub fn events(&self) -> &[VaultEvent] {
        &self.events
    }

    pub fn asset(&self) -> &A {
        &self.asset
    }

    pub fn snapshot(&self) -> VaultSnapshot {
        let leaves = self
            .balances
            .iter()
            .map(|(principal, amount)| commit::balance_leaf(b"acct", principal, *amount))
            .collect();
        VaultSnapshot {
            balances: self.balances.clone(),
            total: self.total,
            events: self.events.clone(),
            state_root: commit::merkle_root(leaves),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{AssetError, ExternalAsset};

    /// Accepts every pull and refuses every push, so the withdraw
    /// restore branch can be driven.
    struct PushRefusingAsset;

    impl AssetSource for PushRefusingAsset {
        fn pull(&mut self, _from: &Principal, _amount: Amount) -> Result<(), AssetError> {
            Ok(())
        }

        fn push(&mut self, _to: &Principal, _amount: Amount) -> Result<(), AssetError> {
            Err(AssetError::InsufficientFunds)
        }
    }

    fn funded_vault(seed: &[(&str, Amount)]) -> Vault<ExternalAsset> {
        let mut asset = ExternalAsset::new();
        for (label, amount) in seed {
            let principal = Principal::from_label(label);
            asset.fund(principal, *amount);
            asset.approve_custody(principal, *amount);
        }
        Vault::new(asset)
    }

    fn assert_solvent(vault: &Vault<ExternalAsset>) {
        let sum: Amount = vault.snapshot().balances.values().sum();
        assert_eq!(vault.total_deposited(), sum);
    }

    #[test]
    fn deposit_then_withdraw_restores_pre_deposit_state() {
        let alice = Principal::from_label("alice");
        let mut vault = funded_vault(&[("alice", 1_000)]);

        vault.deposit(alice, 100).unwrap();
        assert_eq!(vault.balance_of(&alice), 100);
        assert_eq!(vault.total_deposited(), 100);

        vault.withdraw(alice, 50).unwrap();
        assert_eq!(vault.balance_of(&alice), 50);
        assert_eq!(vault.total_deposited(), 50);
        assert_solvent(&vault);

        vault.withdraw(alice, 50).unwrap();
        assert_eq!(vault.balance_of(&alice), 0);
        assert_eq!(vault.total_deposited(), 0);
        assert_eq!(vault.asset().holdings_of(&alice), 1_000);
    }

    #[test]
    fn pool_total_tracks_all_principals() {
        let alice = Principal::from_label("alice");
        let bob = Principal::from_label("bob");
        let mut vault = funded_vault(&[("alice", 100), ("bob", 200)]);

        vault.deposit(alice, 100).unwrap();
        vault.deposit(bob, 200).unwrap();
        assert_eq!(vault.total_deposited(), 300);

        vault.withdraw(alice, 100).unwrap();
        assert_eq!(vault.total_deposited(), 200);
        assert_eq!(vault.balance_of(&alice), 0);
        assert_eq!(vault.balance_of(&bob), 200);
        assert_solvent(&vault);
    }

    #[test]
    fn zero_amounts_are_rejected_without_mutation() {
        let alice = Principal::from_label("alice");
        let mut vault = funded_vault(&[("alice", 100)]);
        vault.deposit(alice, 100).unwrap();
        let before = vault.snapshot();

        assert_eq!(vault.deposit(alice, 0), Err(LedgerError::InvalidAmount));
        assert_eq!(vault.withdraw(alice, 0), Err(LedgerError::InvalidAmount));
        assert_eq!(vault.snapshot(), before);
    }

    #[test]
    fn overdraw_fails_and_leaves_state_untouched() {
        let alice = Principal::from_label("alice");
        let mut vault = funded_vault(&[("alice", 100)]);
        vault.deposit(alice, 100).unwrap();
        let before = vault.snapshot();

        assert_eq!(
            vault.withdraw(alice, 101),
            Err(LedgerError::InsufficientBalance)
        );
        assert_eq!(vault.snapshot(), before);
    }

    #[test]
    fn failed_pull_leaves_state_untouched() {
        let alice = Principal::from_label("alice");
        // Funded but no custody approval: the pull must be refused.
        let mut asset = ExternalAsset::new();
        asset.fund(alice, 500);
        let mut vault = Vault::new(asset);
        let before = vault.snapshot();

        let err = vault.deposit(alice, 100).unwrap_err();
        assert!(matches!(err, LedgerError::TransferFailed(_)));
        assert_eq!(vault.snapshot(), before);
        assert_eq!(vault.asset().holdings_of(&alice), 500);
    }

    #[test]
    fn failed_push_restores_the_debit() {
        let alice = Principal::from_label("alice");
        let mut vault = Vault::new(PushRefusingAsset);
        vault.deposit(alice, 100).unwrap();
        let before = vault.snapshot();

        assert_eq!(
            vault.withdraw(alice, 60),
            Err(LedgerError::TransferFailed(AssetError::InsufficientFunds))
        );
        assert_eq!(vault.snapshot(), before);
        assert_eq!(vault.balance_of(&alice), 100);
        assert_eq!(vault.total_deposited(), 100);

        // A full withdrawal must restore the entry it removed.
        assert_eq!(
            vault.withdraw(alice, 100),
            Err(LedgerError::TransferFailed(AssetError::InsufficientFunds))
        );
        assert_eq!(vault.snapshot(), before);
    }

    #[test]
    fn unknown_principal_reads_as_zero() {
        let vault = funded_vault(&[]);
        assert_eq!(vault.balance_of(&Principal::from_label("nobody")), 0);
    }

    #[test]
    fn events_record_each_mutation_in_order() {
        let alice = Principal::from_label("alice");
        let mut vault = funded_vault(&[("alice", 100)]);
        vault.deposit(alice, 100).unwrap();
        vault.withdraw(alice, 40).unwrap();

        assert_eq!(
            vault.events(),
            &[
                VaultEvent::Deposited {
                    principal: alice,
                    amount: 100,
                    new_total: 100,
                },
                VaultEvent::Withdrawn {
                    principal: alice,
                    amount: 40,
                    new_total: 60,
                },
            ]
        );
    }

    #[test]
    fn snapshot_root_follows_balances() {
        let alice = Principal::from_label("alice");
        let mut vault = funded_vault(&[("alice", 100)]);
        let empty_root = vault.snapshot().state_root;
        vault.deposit(alice, 100).unwrap();
        assert_ne!(vault.snapshot().state_root, empty_root);
        assert_eq!(vault.snapshot().state_root, vault.snapshot().state_root);
    }
}
