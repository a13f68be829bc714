//! Wallet-cap enforcement.
//!
//! Policy: never reject a legitimate earn outright, clip it to the
//! remaining headroom instead. Only a clip all the way to zero fails the
//! transaction. Clipped remainders are attributed back to the treasury so
//! the ledger stays closed.

use tavern_shared::Coins;
use tavern_store::{Treasury, Wallet};

/// How much of `proposed` a wallet can actually absorb.
///
/// The effective cap is the wallet's own override when set, otherwise the
/// treasury's global default. System wallets are uncapped.
pub fn clip_credit(wallet: &Wallet, treasury: &Treasury, proposed: Coins) -> Coins {
    if wallet.owner.is_system() {
        return proposed;
    }

    let cap = wallet.cap.unwrap_or(treasury.wallet_cap_amount);
    let headroom = (cap - wallet.balance).max(0);
    proposed.min(headroom)
}
