//! State-commitment helpers shared by the ledger snapshots.

use sha2::{Digest, Sha256};

use crate::asset::{Amount, Principal};

pub(crate) fn balance_leaf(tag: &[u8], principal: &Principal, amount: Amount) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(tag);
    hasher.update(principal.as_bytes());
    hasher.update(amount.to_le_bytes());
    hasher.finalize().into()
}

pub(crate) fn allowance_leaf(owner: &Principal, spender: &Principal, amount: Amount) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"allow");
    hasher.update(owner.as_bytes());
    hasher.update(spender.as_bytes());
    hasher.update(amount.to_le_bytes());
    hasher.finalize().into()
}

/// Fold leaves into a binary merkle root, duplicating the last leaf of an
/// odd level. The empty ledger commits to a fixed domain-separated hash.
pub(crate) fn merkle_root(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"pool-ledger-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            if chunk.len() == 2 {
                hasher.update(chunk[1]);
            } else {
                hasher.update(chunk[0]);
            }
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_changes_when_a_leaf_changes() {
        let a = Principal::from_label("a");
        let b = Principal::from_label("b");
        let one = merkle_root(vec![
            balance_leaf(b"acct", &a, 10),
            balance_leaf(b"acct", &b, 20),
        ]);
        let two = merkle_root(vec![
            balance_leaf(b"acct", &a, 10),
            balance_leaf(b"acct", &b, 21),
        ]);
        assert_ne!(one, two);
    }

    #[test]
    fn empty_root_is_fixed() {
        assert_eq!(merkle_root(vec![]), merkle_root(vec![]));
    }
}
