use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::models::{TokenInfo, TradeEvent};

/// Trades and prices kept per mint.
pub const WINDOW_LEN: usize = 200;

#[derive(Default)]
struct MintWindow {
    trades: VecDeque<TradeEvent>,
    prices: VecDeque<Decimal>,
}

#[derive(Default)]
struct Inner {
    windows: HashMap<String, MintWindow>,
    tokens: HashMap<String, TokenInfo>,
    /// Last write per mint; covers every key of `windows` and `tokens`.
    last_seen: HashMap<String, DateTime<Utc>>,
}

impl Inner {
    fn touch(&mut self, mint: &str) {
        self.last_seen.insert(mint.to_string(), Utc::now());
    }
}

/// Bounded per-mint trade and price windows plus the token registry.
///
/// Guarded by a single std mutex that is never held across an await.
#[derive(Default)]
pub struct MarketState {
    inner: Mutex<Inner>,
}

fn push_bounded<T>(buf: &mut VecDeque<T>, item: T) {
    buf.push_back(item);
    while buf.len() > WINDOW_LEN {
        buf.pop_front();
    }
}

impl MarketState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a trade; its price joins the price window when positive.
    pub fn record_trade(&self, event: &TradeEvent) {
        let mut inner = self.lock();
        inner.touch(&event.mint);
        let window = inner.windows.entry(event.mint.clone()).or_default();
        push_bounded(&mut window.trades, event.clone());
        if event.price > Decimal::ZERO {
            push_bounded(&mut window.prices, event.price);
        }
    }

    pub fn record_token(&self, info: TokenInfo) {
        let mut inner = self.lock();
        inner.touch(&info.mint);
        inner.tokens.insert(info.mint.clone(), info);
    }

    pub fn token(&self, mint: &str) -> Option<TokenInfo> {
        self.lock().tokens.get(mint).cloned()
    }

    /// Trade window for `mint`, oldest first.
    pub fn trades(&self, mint: &str) -> Vec<TradeEvent> {
        self.lock()
            .windows
            .get(mint)
            .map(|w| w.trades.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Price window for `mint`, oldest first.
    pub fn prices(&self, mint: &str) -> Vec<Decimal> {
        self.lock()
            .windows
            .get(mint)
            .map(|w| w.prices.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Most recent observed price.
    pub fn last_price(&self, mint: &str) -> Option<Decimal> {
        self.lock()
            .windows
            .get(mint)
            .and_then(|w| w.prices.back().copied())
    }

    /// Override the latest price, used by dry-run tooling and tests.
    pub fn set_price(&self, mint: &str, price: Decimal) {
        let mut inner = self.lock();
        inner.touch(mint);
        let window = inner.windows.entry(mint.to_string()).or_default();
        push_bounded(&mut window.prices, price);
    }

    /// Forget every mint not written to within `idle` of `now`, except the
    /// mints in `keep`. Returns the number evicted.
    pub fn evict_idle(&self, now: DateTime<Utc>, idle: Duration, keep: &HashSet<String>) -> usize {
        let cutoff = now - idle;
        let mut inner = self.lock();
        let stale: Vec<String> = inner
            .last_seen
            .iter()
            .filter(|(mint, seen)| **seen < cutoff && !keep.contains(*mint))
            .map(|(mint, _)| mint.clone())
            .collect();
        for mint in &stale {
            inner.last_seen.remove(mint);
            inner.windows.remove(mint);
            inner.tokens.remove(mint);
        }
        stale.len()
    }

    /// Number of mints currently held.
    pub fn mint_count(&self) -> usize {
        self.lock().last_seen.len()
    }
}
