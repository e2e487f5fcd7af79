use std::collections::VecDeque;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::models::{Side, TokenInfo, TradeEvent};

use super::dedupe::{dedupe_key, RollingDedupe};

const PING_INTERVAL: Duration = Duration::from_secs(15);
const RECONNECT_STEP: Duration = Duration::from_secs(5);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(15);
const DEDUPE_CAPACITY: usize = 6000;
/// Mints re-subscribed after a reconnect.
const MAX_TRACKED_MINTS: usize = 500;

/// Events the feed emits to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Connected,
    Disconnected,
    NewToken(TokenInfo),
    Trade(TradeEvent),
}

/// Raw PumpPortal data message. Creates and trades share one shape.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PortalMessage {
    tx_type: Option<String>,
    signature: Option<String>,
    mint: Option<String>,
    #[serde(alias = "trader")]
    trader_public_key: Option<String>,
    creator: Option<String>,
    is_buy: Option<bool>,
    price: Option<f64>,
    sol_amount: Option<f64>,
    v_sol_in_bonding_curve: Option<f64>,
    v_tokens_in_bonding_curve: Option<f64>,
    slot: Option<u64>,
    decimals: Option<u8>,
    freeze_authority: Option<String>,
    mint_authority: Option<String>,
}

fn decimal(v: Option<f64>) -> Option<Decimal> {
    v.and_then(|f| Decimal::try_from(f).ok())
}

impl PortalMessage {
    fn dedupe_key(&self) -> [u8; 32] {
        let slot = self.slot.map(|s| s.to_string()).unwrap_or_default();
        dedupe_key(&[
            self.tx_type.as_deref().unwrap_or(""),
            self.signature.as_deref().unwrap_or(""),
            self.mint.as_deref().unwrap_or(""),
            &slot,
        ])
    }

    /// Explicit price when present, else the bonding-curve ratio.
    fn price(&self) -> Decimal {
        if let Some(p) = decimal(self.price) {
            return p;
        }
        match (decimal(self.v_sol_in_bonding_curve), decimal(self.v_tokens_in_bonding_curve)) {
            (Some(sol), Some(tokens)) if tokens > Decimal::ZERO => sol / tokens,
            _ => Decimal::ZERO,
        }
    }

    fn into_event(self) -> Option<FeedEvent> {
        let mint = self.mint.clone()?;
        if Pubkey::from_str(&mint).is_err() {
            tracing::warn!(mint = %mint, "Dropping feed message with invalid mint");
            return None;
        }
        match self.tx_type.as_deref()? {
            "create" => Some(FeedEvent::NewToken(TokenInfo {
                mint,
                creator: self
                    .creator
                    .clone()
                    .or_else(|| self.trader_public_key.clone())
                    .unwrap_or_else(|| "unknown".into()),
                decimals: self.decimals.unwrap_or(6),
                freeze_authority: self.freeze_authority.clone(),
                mint_authority: self.mint_authority.clone(),
            })),
            kind @ ("trade" | "buy" | "sell") => {
                let side = match kind {
                    "buy" => Side::Buy,
                    "sell" => Side::Sell,
                    _ => Side::from_is_buy(self.is_buy.unwrap_or(false)),
                };
                Some(FeedEvent::Trade(TradeEvent {
                    signature: self.signature.clone().unwrap_or_default(),
                    mint,
                    price: self.price(),
                    sol_amount: decimal(self.sol_amount).unwrap_or(Decimal::ZERO),
                    side,
                    slot: self.slot.unwrap_or(0),
                    trader: self.trader_public_key.clone().unwrap_or_else(|| "unknown".into()),
                    // Receipt time; the feed carries no block time.
                    timestamp: Utc::now(),
                }))
            }
            _ => None,
        }
    }
}

/// Parses and dedupes raw feed frames.
pub struct FeedParser {
    dedupe: RollingDedupe,
}

impl Default for FeedParser {
    fn default() -> Self {
        Self {
            dedupe: RollingDedupe::new(DEDUPE_CAPACITY),
        }
    }
}

impl FeedParser {
    /// `None` for acks, unknown message types, malformed JSON, and repeats.
    pub fn parse(&mut self, raw: &str) -> Option<FeedEvent> {
        let msg: PortalMessage = match serde_json::from_str(raw) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, raw, "Failed to parse feed message");
                return None;
            }
        };
        if !self.dedupe.insert(msg.dedupe_key()) {
            tracing::trace!(raw, "Duplicate feed message dropped");
            return None;
        }
        msg.into_event()
    }
}

fn subscribe_new_token() -> String {
    json!({ "method": "subscribeNewToken" }).to_string()
}

fn subscribe_token_trade(mints: &[String]) -> String {
    json!({ "method": "subscribeTokenTrade", "keys": mints }).to_string()
}

/// Run the PumpPortal websocket client forever, reconnecting on failure.
///
/// Subscribes to new-token events on connect and to trades for each new
/// mint as it appears. Mints seen on earlier connections are re-subscribed
/// after a reconnect.
pub async fn run_feed(url: String, tx: mpsc::Sender<FeedEvent>) {
    let mut retry: u32 = 0;
    let mut parser = FeedParser::default();
    let mut tracked: VecDeque<String> = VecDeque::new();

    loop {
        tracing::info!(url = %url, "Connecting to PumpPortal feed...");

        match connect_async(&url).await {
            Ok((ws_stream, _response)) => {
                tracing::info!("PumpPortal feed connected");
                retry = 0;
                let (mut write, mut read) = ws_stream.split();

                let mut initial = vec![subscribe_new_token()];
                if !tracked.is_empty() {
                    let mints: Vec<String> = tracked.iter().cloned().collect();
                    initial.push(subscribe_token_trade(&mints));
                }
                let mut subscribed = true;
                for msg in initial {
                    if let Err(e) = write.send(Message::Text(msg.into())).await {
                        tracing::error!(error = %e, "Failed to send subscribe message");
                        subscribed = false;
                        break;
                    }
                }

                if subscribed {
                    let _ = tx.send(FeedEvent::Connected).await;

                    let mut ping_timer = interval(PING_INTERVAL);
                    ping_timer.tick().await; // consume the first immediate tick

                    loop {
                        tokio::select! {
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        let Some(event) = parser.parse(text.as_ref()) else {
                                            continue;
                                        };
                                        if let FeedEvent::NewToken(info) = &event {
                                            let sub = subscribe_token_trade(std::slice::from_ref(&info.mint));
                                            if let Err(e) = write.send(Message::Text(sub.into())).await {
                                                tracing::error!(error = %e, mint = %info.mint, "Failed to subscribe to token trades");
                                                break;
                                            }
                                            tracked.push_back(info.mint.clone());
                                            if tracked.len() > MAX_TRACKED_MINTS {
                                                tracked.pop_front();
                                            }
                                        }
                                        if tx.send(event).await.is_err() {
                                            tracing::warn!("Feed receiver dropped, stopping feed");
                                            return;
                                        }
                                    }
                                    Some(Ok(Message::Ping(data))) => {
                                        if let Err(e) = write.send(Message::Pong(data)).await {
                                            tracing::warn!(error = %e, "Failed to send pong");
                                            break;
                                        }
                                    }
                                    Some(Ok(Message::Close(_))) => {
                                        tracing::warn!("PumpPortal sent close frame");
                                        break;
                                    }
                                    Some(Ok(_)) => {}
                                    Some(Err(e)) => {
                                        tracing::error!(error = %e, "Feed read error");
                                        break;
                                    }
                                    None => {
                                        tracing::warn!("Feed stream ended");
                                        break;
                                    }
                                }
                            }
                            _ = ping_timer.tick() => {
                                if let Err(e) = write.send(Message::Ping(vec![].into())).await {
                                    tracing::warn!(error = %e, "Failed to send ping");
                                    break;
                                }
                            }
                        }
                    }

                    let _ = tx.send(FeedEvent::Disconnected).await;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Feed connection failed");
            }
        }

        // Linear backoff, capped
        let delay = (RECONNECT_STEP * retry.saturating_add(1)).min(MAX_RECONNECT_DELAY);
        retry = retry.saturating_add(1);
        tracing::info!(delay_secs = delay.as_secs(), retry, "Reconnecting feed...");
        sleep(delay).await;
    }
}
