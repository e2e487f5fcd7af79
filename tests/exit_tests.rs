mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signer::Signer;

use launch_sniper::execution::rpc::{TokenBalance, TxBalanceSnapshot};
use launch_sniper::db::PositionStore;
use launch_sniper::execution::{
    AdmissionConfig, EntryGate, EntryOutcome, EntryPipeline, ExecError, SellAmount,
    SharedPosition, TransitionMeta,
};
use launch_sniper::intelligence::{RiskEngine, StrategyEngine};
use launch_sniper::models::{Position, PositionState, TakeProfitRung};
use launch_sniper::services::{ExitConfig, ExitManager};

use common::{harness, seed_momentum, Harness};

fn d(value: i64, scale: u32) -> Decimal {
    Decimal::new(value, scale)
}

fn two_rungs() -> Vec<TakeProfitRung> {
    vec![
        TakeProfitRung::new(d(5, 1), d(3, 1)),
        TakeProfitRung::new(d(5, 1), d(6, 1)),
    ]
}

/// Create a position for `mint` and move it to OPEN.
async fn open_position(
    h: &Harness,
    mint: &str,
    entry: Option<Decimal>,
    ladder: Vec<TakeProfitRung>,
) -> SharedPosition {
    let pos = h
        .ctx
        .machine
        .create(mint, d(4, 1), d(25, 2), ladder, "volatility")
        .await
        .unwrap();
    let handle = h.ctx.book.attach(pos).await;
    {
        let mut pos = handle.lock().await;
        pos.entry_price = entry;
        pos.tokens = Some(Decimal::from(1000));
        h.ctx
            .machine
            .transition(&mut pos, PositionState::Open, TransitionMeta::entry(None))
            .await
            .unwrap();
    }
    handle
}

fn manager(h: &Harness) -> ExitManager {
    ExitManager::new(h.ctx.clone(), ExitConfig::default())
}

#[tokio::test]
async fn test_stop_loss_closes_and_releases() {
    let h = harness(false);
    let handle = open_position(&h, "mintA", Some(Decimal::ONE), two_rungs()).await;
    h.ctx.market.set_price("mintA", d(74, 2));

    manager(&h).tick(Utc::now()).await;

    let pos = handle.lock().await;
    assert_eq!(pos.state, PositionState::Closed);
    assert_eq!(pos.exit_reason.as_deref(), Some("stop_loss"));
    assert!(!h.ctx.book.is_active("mintA").await);
    assert_eq!(h.store.position(&pos.id).unwrap().state, PositionState::Closed);
}

#[tokio::test]
async fn test_two_rung_ladder() {
    let h = harness(false);
    let handle = open_position(&h, "mintA", Some(Decimal::ONE), two_rungs()).await;
    let exits = manager(&h);
    let now = Utc::now();

    h.ctx.market.set_price("mintA", d(135, 2));
    exits.tick(now).await;
    {
        let pos = handle.lock().await;
        assert_eq!(pos.state, PositionState::Open);
        assert_eq!(pos.tp_filled, 1);
        assert_eq!(pos.tokens, Some(Decimal::from(500)));
    }

    h.ctx.market.set_price("mintA", d(165, 2));
    exits.tick(now + Duration::seconds(2)).await;
    {
        let pos = handle.lock().await;
        assert_eq!(pos.state, PositionState::Open);
        assert_eq!(pos.tp_filled, 2);
        assert_eq!(pos.tokens, Some(Decimal::from(250)));
    }

    // Ladder exhausted, no giveback yet: holds.
    exits.tick(now + Duration::seconds(4)).await;
    let pos = handle.lock().await;
    assert_eq!(pos.state, PositionState::Open);
    assert_eq!(pos.tp_filled, 2);
    assert!(h.ctx.book.is_active("mintA").await);
}

#[tokio::test]
async fn test_trailing_giveback_fires_at_twenty_points() {
    let h = harness(false);
    let handle = open_position(&h, "mintA", Some(Decimal::ONE), vec![]).await;
    let exits = manager(&h);
    let now = Utc::now();

    h.ctx.market.set_price("mintA", d(170, 2));
    exits.tick(now).await;
    assert_eq!(handle.lock().await.peak_pnl_pct, Some(d(70, 2)));

    h.ctx.market.set_price("mintA", d(150, 2));
    exits.tick(now + Duration::seconds(1)).await;

    let pos = handle.lock().await;
    assert_eq!(pos.state, PositionState::Closed);
    assert_eq!(pos.exit_reason.as_deref(), Some("trailing_giveback"));
}

#[tokio::test]
async fn test_trailing_holds_below_giveback() {
    let h = harness(false);
    let handle = open_position(&h, "mintA", Some(Decimal::ONE), vec![]).await;
    let exits = manager(&h);
    let now = Utc::now();

    h.ctx.market.set_price("mintA", d(170, 2));
    exits.tick(now).await;
    h.ctx.market.set_price("mintA", d(155, 2));
    exits.tick(now + Duration::seconds(1)).await;

    let pos = handle.lock().await;
    assert_eq!(pos.state, PositionState::Open);
    assert_eq!(pos.peak_pnl_pct, Some(d(70, 2)));
    assert_eq!(h.store.position(&pos.id).unwrap().peak_pnl_pct, Some(d(70, 2)));
}

#[tokio::test]
async fn test_time_stop_exits_in_profit() {
    let h = harness(false);
    let handle = open_position(&h, "mintA", Some(Decimal::ONE), vec![]).await;
    h.ctx.market.set_price("mintA", d(11, 1));

    let entered = handle.lock().await.entry_timestamp.unwrap();
    manager(&h).tick(entered + Duration::seconds(121)).await;

    let pos = handle.lock().await;
    assert_eq!(pos.state, PositionState::Closed);
    assert_eq!(pos.exit_reason.as_deref(), Some("time_stop"));
}

#[tokio::test]
async fn test_missing_entry_price_is_initialised_from_market() {
    let h = harness(false);
    let handle = open_position(&h, "mintA", None, two_rungs()).await;
    h.ctx.market.set_price("mintA", d(2, 3));

    manager(&h).tick(Utc::now()).await;

    let pos = handle.lock().await;
    assert_eq!(pos.state, PositionState::Open);
    assert_eq!(pos.entry_price, Some(d(2, 3)));
    assert_eq!(h.store.position(&pos.id).unwrap().entry_price, Some(d(2, 3)));
}

#[tokio::test]
async fn test_position_without_price_is_skipped() {
    let h = harness(false);
    let handle = open_position(&h, "mintA", Some(Decimal::ONE), two_rungs()).await;

    manager(&h).tick(Utc::now()).await;

    let pos = handle.lock().await;
    assert_eq!(pos.state, PositionState::Open);
    assert_eq!(pos.peak_pnl_pct, None);
}

#[tokio::test]
async fn test_failed_exit_reopens_and_respects_cooldown() {
    let h = harness(true);
    let handle = open_position(&h, "mintA", Some(Decimal::ONE), two_rungs()).await;
    h.endpoint.fail_sends(ExecError::Transport {
        endpoint: "http://primary".into(),
        message: "timeout".into(),
    });
    h.ctx.market.set_price("mintA", d(7, 1));
    let exits = manager(&h);
    let now = Utc::now();

    exits.tick(now).await;
    {
        let pos = handle.lock().await;
        assert_eq!(pos.state, PositionState::Open);
        assert!(pos.last_error.as_deref().unwrap().contains("timeout"));
    }
    assert_eq!(h.endpoint.sends(), 3);

    // Inside the 1200ms re-trigger window.
    exits.tick(now + Duration::milliseconds(500)).await;
    assert_eq!(h.endpoint.sends(), 3);

    exits.tick(now + Duration::milliseconds(1500)).await;
    assert_eq!(h.endpoint.sends(), 6);
    assert!(h.ctx.book.is_active("mintA").await);
    assert_eq!(
        h.adapter.sell_amounts(),
        vec![SellAmount::Percent(Decimal::ONE_HUNDRED); 6]
    );
}

#[tokio::test]
async fn test_live_ladder_sell_uses_fill_delta() {
    let h = harness(true);
    let handle = open_position(&h, "mintA", Some(Decimal::ONE), two_rungs()).await;
    let payer = h.ctx.payer.pubkey().to_string();
    let balance = |amount: f64| TokenBalance {
        account_index: 1,
        mint: "mintA".into(),
        owner: Some(payer.clone()),
        ui_amount: Some(amount),
        amount: format!("{}", (amount * 1_000_000.0) as u64),
        decimals: 6,
    };
    h.endpoint.set_fill(TxBalanceSnapshot {
        account_keys: vec![payer.clone(), "Ata".into()],
        pre_balances: vec![1_000_000_000, 0],
        post_balances: vec![1_100_000_000, 0],
        pre_token_balances: vec![balance(1000.0)],
        post_token_balances: vec![balance(700.0)],
    });
    h.ctx.market.set_price("mintA", d(13, 1));

    manager(&h).tick(Utc::now()).await;

    let pos = handle.lock().await;
    assert_eq!(pos.state, PositionState::Open);
    assert_eq!(pos.tp_filled, 1);
    assert_eq!(pos.tokens, Some(Decimal::from(700)));
    assert_eq!(h.adapter.sell_amounts(), vec![SellAmount::Percent(Decimal::from(50))]);
}

#[tokio::test]
async fn test_recover_reopens_interrupted_exit() {
    let h = harness(false);
    let handle = open_position(&h, "mintA", Some(Decimal::ONE), two_rungs()).await;
    {
        let mut pos = handle.lock().await;
        h.ctx
            .machine
            .transition(&mut pos, PositionState::PendingExit, TransitionMeta::default())
            .await
            .unwrap();
    }

    manager(&h).recover().await;

    let pos = handle.lock().await;
    assert_eq!(pos.state, PositionState::Open);
    assert_eq!(pos.last_error.as_deref(), Some("exit interrupted by restart"));
}

/// Persist PENDING_ENTRY positions for `mints`, then rebuild the book from
/// the store the way startup does.
async fn restart_with_pending_entries(h: &Harness, mints: &[String]) -> Vec<Position> {
    for mint in mints {
        h.ctx
            .machine
            .create(mint, d(4, 1), d(25, 2), two_rungs(), "volatility")
            .await
            .unwrap();
    }
    let open = h.store.list_open_positions().await.unwrap();
    h.ctx.book.rebuild(open.clone()).await;
    open
}

fn stored(h: &Harness, pos: &Position) -> Position {
    h.store.position(&pos.id).unwrap()
}

#[tokio::test]
async fn test_dry_run_restart_closes_interrupted_entries() {
    let h = harness(false);
    let mints: Vec<String> = (0..3).map(|i| format!("mint{i}")).collect();
    let pending = restart_with_pending_entries(&h, &mints).await;
    assert_eq!(h.ctx.book.len().await, 3);

    manager(&h).recover().await;

    for pos in &pending {
        let pos = stored(&h, pos);
        assert_eq!(pos.state, PositionState::Closed);
        assert_eq!(pos.last_error.as_deref(), Some("entry interrupted by restart"));
    }
    assert!(h.ctx.book.is_empty().await);

    // The freed slots admit a new candidate.
    let entries = EntryPipeline::new(
        h.ctx.clone(),
        AdmissionConfig::default(),
        EntryGate::new(),
        h.store.clone(),
        Arc::new(RiskEngine),
        Arc::new(StrategyEngine::default()),
    );
    seed_momentum(&h.ctx.market, "fresh", d(1, 3));
    let outcome = entries
        .consider_entry("fresh", Utc::now() + Duration::hours(1))
        .await;
    assert!(matches!(outcome, EntryOutcome::Opened(_)), "got {outcome:?}");
}

#[tokio::test]
async fn test_live_restart_opens_entry_that_holds_tokens() {
    let h = harness(true);
    let mint = Pubkey::new_unique().to_string();
    let pending = restart_with_pending_entries(&h, std::slice::from_ref(&mint)).await;
    h.endpoint.set_holdings(1500.0);
    h.ctx.market.set_price(&mint, d(2, 3));
    let exits = manager(&h);

    exits.recover().await;

    let pos = stored(&h, &pending[0]);
    assert_eq!(pos.state, PositionState::Open);
    assert_eq!(pos.tokens, Some(Decimal::from(1500)));
    assert_eq!(pos.entry_price, Some(d(2, 3)));
    assert!(pos.entry_timestamp.is_some());
    assert!(h.ctx.book.is_active(&mint).await);

    // Now under the exit rules: a 30% drop trips the stop loss.
    h.ctx.market.set_price(&mint, d(14, 4));
    exits.tick(Utc::now()).await;
    assert_eq!(stored(&h, &pending[0]).state, PositionState::Closed);
    assert!(!h.ctx.book.is_active(&mint).await);
}

#[tokio::test]
async fn test_live_restart_closes_entry_with_no_tokens() {
    let h = harness(true);
    let mint = Pubkey::new_unique().to_string();
    let pending = restart_with_pending_entries(&h, std::slice::from_ref(&mint)).await;

    manager(&h).recover().await;

    let pos = stored(&h, &pending[0]);
    assert_eq!(pos.state, PositionState::Closed);
    assert!(!h.ctx.book.is_active(&mint).await);
}

#[tokio::test]
async fn test_unreadable_holdings_are_retried_on_later_ticks() {
    let h = harness(true);
    let mint = Pubkey::new_unique().to_string();
    let pending = restart_with_pending_entries(&h, std::slice::from_ref(&mint)).await;
    h.endpoint.fail_holdings(Some(ExecError::Transport {
        endpoint: "http://primary".into(),
        message: "timeout".into(),
    }));
    let exits = manager(&h);

    exits.recover().await;
    exits.tick(Utc::now()).await;
    assert_eq!(stored(&h, &pending[0]).state, PositionState::PendingEntry);
    assert!(h.ctx.book.is_active(&mint).await);

    h.endpoint.fail_holdings(None);
    h.endpoint.set_holdings(10.0);
    exits.tick(Utc::now()).await;

    let pos = stored(&h, &pending[0]);
    assert_eq!(pos.state, PositionState::Open);
    assert_eq!(pos.tokens, Some(Decimal::from(10)));
}
