use std::str::FromStr;

use rust_decimal::Decimal;

use crate::models::FillDeltas;

use super::rpc::{TokenBalance, TxBalanceSnapshot};

/// Lamports per SOL expressed as a decimal scale.
const SOL_DECIMALS: u32 = 9;

/// Convert a signed lamport amount to SOL.
pub fn lamports_to_sol(lamports: i64) -> Decimal {
    Decimal::new(lamports, SOL_DECIMALS)
}

/// Display amount of a token balance: the node's precomputed value when
/// present, otherwise raw amount / 10^decimals.
pub(crate) fn token_amount(balance: &TokenBalance) -> Decimal {
    if let Some(ui) = balance.ui_amount {
        if let Ok(d) = Decimal::try_from(ui) {
            return d;
        }
    }
    match u64::from_str(&balance.amount) {
        Ok(raw) => Decimal::from_i128_with_scale(raw as i128, balance.decimals as u32),
        Err(_) => Decimal::ZERO,
    }
}

fn owned_total(balances: &[TokenBalance], account_keys: &[String], payer: &str, mint: &str) -> Decimal {
    balances
        .iter()
        .filter(|b| b.mint == mint)
        .filter(|b| match &b.owner {
            Some(owner) => owner == payer,
            // Older nodes omit the owner; fall back to the account itself.
            None => account_keys.get(b.account_index).map(String::as_str) == Some(payer),
        })
        .map(token_amount)
        .sum()
}

/// Reconcile a confirmed transaction's balance snapshot into realized deltas
/// for `payer`. Returns `None` when the payer is not among the account keys.
pub fn compute_fill_deltas(
    snapshot: &TxBalanceSnapshot,
    payer: &str,
    mint: Option<&str>,
) -> Option<FillDeltas> {
    let index = snapshot.account_keys.iter().position(|k| k == payer)?;
    let pre = *snapshot.pre_balances.get(index)?;
    let post = *snapshot.post_balances.get(index)?;
    let sol_delta = lamports_to_sol(post as i64 - pre as i64);

    let token_delta = mint.map(|mint| {
        let after = owned_total(&snapshot.post_token_balances, &snapshot.account_keys, payer, mint);
        let before = owned_total(&snapshot.pre_token_balances, &snapshot.account_keys, payer, mint);
        after - before
    });

    Some(FillDeltas {
        sol_delta,
        token_delta,
    })
}
