mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rust_decimal::Decimal;

use launch_sniper::execution::{AdmissionConfig, AdmissionReject, EntryGate, EntryOutcome, EntryPipeline};
use launch_sniper::ingestion::{EventPipeline, FeedEvent};
use launch_sniper::intelligence::{RiskEngine, StrategyEngine};
use launch_sniper::models::{Side, TokenInfo};

use common::{harness, seed_momentum, trade, Harness};

fn event_pipeline(h: &Harness) -> (EventPipeline, Arc<AtomicBool>) {
    let entries = Arc::new(EntryPipeline::new(
        h.ctx.clone(),
        AdmissionConfig::default(),
        EntryGate::new(),
        h.store.clone(),
        Arc::new(RiskEngine),
        Arc::new(StrategyEngine::default()),
    ));
    let connected = Arc::new(AtomicBool::new(false));
    let pipeline = EventPipeline::new(
        h.ctx.market.clone(),
        h.store.clone(),
        entries,
        connected.clone(),
    );
    (pipeline, connected)
}

#[tokio::test]
async fn test_connection_events_toggle_flag() {
    let h = harness(false);
    let (pipeline, connected) = event_pipeline(&h);

    assert!(pipeline.process(FeedEvent::Connected).await.is_none());
    assert!(connected.load(Ordering::Relaxed));

    pipeline.process(FeedEvent::Disconnected).await;
    assert!(!connected.load(Ordering::Relaxed));
}

#[tokio::test]
async fn test_new_token_is_recorded_and_stored() {
    let h = harness(false);
    let (pipeline, _) = event_pipeline(&h);

    let info = TokenInfo {
        mint: "mintA".into(),
        creator: "creator".into(),
        decimals: 6,
        freeze_authority: None,
        mint_authority: Some("Minter".into()),
    };
    pipeline.process(FeedEvent::NewToken(info.clone())).await;

    assert_eq!(h.store.token("mintA"), Some(info.clone()));
    assert_eq!(h.ctx.market.token("mintA"), Some(info));
}

#[tokio::test]
async fn test_trade_is_recorded_then_evaluated() {
    let h = harness(false);
    let (pipeline, _) = event_pipeline(&h);

    let handle = pipeline
        .process(FeedEvent::Trade(trade("mintA", 1, Decimal::new(1, 3), Side::Buy)))
        .await
        .expect("trade spawns an evaluation");

    assert_eq!(h.store.trade_count(), 1);
    assert_eq!(h.ctx.market.trades("mintA").len(), 1);
    assert_eq!(
        handle.await.unwrap(),
        EntryOutcome::Rejected(AdmissionReject::InsufficientHistory { have: 1, need: 5 })
    );
}

#[tokio::test]
async fn test_trade_on_hot_mint_opens_position() {
    let h = harness(false);
    let (pipeline, _) = event_pipeline(&h);
    seed_momentum(&h.ctx.market, "mintA", Decimal::new(1, 3));

    let handle = pipeline
        .process(FeedEvent::Trade(trade("mintA", 42, Decimal::new(12, 4), Side::Buy)))
        .await
        .unwrap();

    match handle.await.unwrap() {
        EntryOutcome::Opened(pos) => assert_eq!(pos.entry_price, Some(Decimal::new(12, 4))),
        other => panic!("expected Opened, got {other:?}"),
    }
    assert!(h.ctx.book.is_active("mintA").await);
}
