use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use metrics::counter;
use rust_decimal::Decimal;
use solana_sdk::signer::Signer;
use tokio::time::interval;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::execution::cooldown::Cooldown;
use crate::execution::{
    ExecError, SellAmount, SellParams, SharedPosition, TradingContext, TransitionMeta,
};
use crate::models::{Position, PositionState};
use crate::services::notifier::{self, notify};

/// Peak PnL that arms the trailing giveback rule.
pub const TRAIL_ARM_PCT: Decimal = Decimal::from_parts(35, 0, 0, false, 2);
/// Giveback from peak that fires the trailing rule once armed.
pub const TRAIL_GIVEBACK_PCT: Decimal = Decimal::from_parts(20, 0, 0, false, 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    TimeStop,
    StopLoss,
    TrailingGiveback,
    TakeProfit,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::TimeStop => "time_stop",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TrailingGiveback => "trailing_giveback",
            ExitReason::TakeProfit => "take_profit",
        }
    }

    pub fn is_full(&self) -> bool {
        !matches!(self, ExitReason::TakeProfit)
    }
}

/// What the rules decided for one position on one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitDecision {
    /// Entry price was unknown and has been set from the observed price.
    EntryPriceInitialised,
    Hold,
    Exit {
        reason: ExitReason,
        /// Fraction of holdings to sell, in (0, 1].
        sell_fraction: Decimal,
        pnl_pct: Decimal,
    },
}

/// Evaluate the exit rules for an OPEN position at `price`, first match
/// wins. Updates `entry_price` (when unset) and `peak_pnl_pct` in place.
pub fn evaluate_exit(
    pos: &mut Position,
    price: Decimal,
    now: DateTime<Utc>,
    time_stop: chrono::Duration,
) -> ExitDecision {
    // 1. Initialise entry price
    if pos.entry_price.is_none() {
        pos.entry_price = Some(price);
        return ExitDecision::EntryPriceInitialised;
    }
    let Some(pnl) = pos.pnl_pct(price) else {
        return ExitDecision::Hold;
    };

    // 2. Peak tracking
    let peak = pos.peak_pnl_pct.map_or(pnl, |p| p.max(pnl));
    pos.peak_pnl_pct = Some(peak);

    let full = |reason| ExitDecision::Exit {
        reason,
        sell_fraction: Decimal::ONE,
        pnl_pct: pnl,
    };

    // 3. Time stop
    if let Some(entered) = pos.entry_timestamp {
        if now - entered >= time_stop {
            return full(ExitReason::TimeStop);
        }
    }

    // 4. Stop loss
    if pnl <= -pos.stop_loss_pct {
        return full(ExitReason::StopLoss);
    }

    // 5. Trailing giveback
    if peak >= TRAIL_ARM_PCT && peak - pnl >= TRAIL_GIVEBACK_PCT {
        return full(ExitReason::TrailingGiveback);
    }

    // 6. Take-profit ladder
    if let Some(rung) = pos.next_rung() {
        if pnl >= rung.profit_threshold {
            return ExitDecision::Exit {
                reason: ExitReason::TakeProfit,
                sell_fraction: rung.sell_pct,
                pnl_pct: pnl,
            };
        }
    }

    ExitDecision::Hold
}

#[derive(Debug, Clone)]
pub struct ExitConfig {
    pub tick: Duration,
    pub time_stop: chrono::Duration,
    pub exit_cooldown_ms: i64,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(1000),
            time_stop: chrono::Duration::seconds(120),
            exit_cooldown_ms: 1200,
        }
    }
}

impl ExitConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            tick: Duration::from_millis(config.exit_tick_ms),
            time_stop: chrono::Duration::seconds(config.time_stop_sec),
            exit_cooldown_ms: config.exit_cooldown_ms,
        }
    }
}

/// Periodically evaluates every OPEN position and drives exits.
pub struct ExitManager {
    ctx: TradingContext,
    config: ExitConfig,
    cooldown: Cooldown,
    /// Entries interrupted by a restart and not yet reconciled.
    stranded: Mutex<HashSet<Uuid>>,
}

impl ExitManager {
    pub fn new(ctx: TradingContext, config: ExitConfig) -> Self {
        let cooldown = Cooldown::from_millis(config.exit_cooldown_ms);
        Self {
            ctx,
            config,
            cooldown,
            stranded: Mutex::new(HashSet::new()),
        }
    }

    /// Forget exit cooldown stamps that have expired at `now`.
    pub fn prune_cooldowns(&self, now: DateTime<Utc>) -> usize {
        self.cooldown.prune(now)
    }

    /// Tick forever. Each tick runs on its own task so a slow exit never
    /// delays the timer.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(self.config.tick);
        tracing::info!(tick_ms = self.config.tick.as_millis() as u64, "Exit manager started");

        loop {
            ticker.tick().await;
            let me = self.clone();
            tokio::spawn(async move { me.tick(Utc::now()).await });
        }
    }

    /// Evaluate every tracked position once. Positions are independent;
    /// a failure on one never affects another.
    pub async fn tick(&self, now: DateTime<Utc>) {
        let handles = self.ctx.book.handles().await;
        if handles.is_empty() {
            tracing::trace!("Exit manager: no positions");
            return;
        }
        join_all(handles.into_iter().map(|h| self.evaluate_position(h, now))).await;
    }

    /// Resolve positions a restart left in flight. Interrupted exits go
    /// back to OPEN so the rules run again. Interrupted entries are settled
    /// against the wallet: tokens held means OPEN, nothing held means CLOSED.
    /// Entries whose holdings cannot be read yet are retried on later ticks.
    pub async fn recover(&self) {
        for handle in self.ctx.book.handles().await {
            let mut pos = handle.lock().await;
            match pos.state {
                PositionState::PendingExit => {
                    tracing::warn!(mint = %pos.mint, position_id = %pos.id, "Recovering interrupted exit");
                    if let Err(e) = self
                        .ctx
                        .machine
                        .transition(
                            &mut pos,
                            PositionState::Open,
                            TransitionMeta::error("exit interrupted by restart"),
                        )
                        .await
                    {
                        tracing::error!(mint = %pos.mint, error = %e, "Recovery transition failed");
                    }
                }
                PositionState::PendingEntry => {
                    tracing::warn!(mint = %pos.mint, position_id = %pos.id, "Recovering interrupted entry");
                    self.stranded_lock().insert(pos.id);
                    self.reconcile_entry(&mut pos).await;
                }
                _ => {}
            }
        }
    }

    fn stranded_lock(&self) -> std::sync::MutexGuard<'_, HashSet<Uuid>> {
        self.stranded.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn reconcile_entry(&self, pos: &mut Position) {
        let held = if self.ctx.live {
            match self
                .ctx
                .engine
                .token_holdings(&self.ctx.payer.pubkey(), &pos.mint)
                .await
            {
                Ok(held) => held,
                Err(ExecError::InvalidMint(_)) => Decimal::ZERO,
                Err(e) => {
                    tracing::warn!(mint = %pos.mint, error = %e, "Holdings unavailable, entry stays pending");
                    return;
                }
            }
        } else {
            Decimal::ZERO
        };

        let result = if held > Decimal::ZERO {
            pos.tokens = Some(held);
            if pos.entry_price.is_none() {
                pos.entry_price = self.ctx.market.last_price(&pos.mint);
            }
            tracing::info!(
                mint = %pos.mint,
                tokens = %held,
                entry_price = ?pos.entry_price,
                "Interrupted entry holds tokens, opening"
            );
            self.ctx
                .machine
                .transition(pos, PositionState::Open, TransitionMeta::entry(None))
                .await
        } else {
            tracing::info!(mint = %pos.mint, "Interrupted entry holds nothing, closing");
            self.ctx
                .machine
                .transition(
                    pos,
                    PositionState::Closed,
                    TransitionMeta::error("entry interrupted by restart"),
                )
                .await
        };

        match result {
            Ok(()) => {
                self.stranded_lock().remove(&pos.id);
                if pos.state == PositionState::Closed {
                    self.ctx.book.release(&pos.mint).await;
                }
            }
            Err(e) => {
                tracing::error!(mint = %pos.mint, error = %e, "Cannot settle interrupted entry");
            }
        }
    }

    async fn evaluate_position(&self, handle: SharedPosition, now: DateTime<Utc>) {
        // An evaluation from an earlier tick still holds it.
        let Ok(mut pos) = handle.try_lock() else {
            tracing::debug!("Position evaluation in flight, skipping");
            return;
        };
        if pos.state == PositionState::PendingEntry && self.stranded_lock().contains(&pos.id) {
            self.reconcile_entry(&mut pos).await;
            return;
        }
        if pos.state != PositionState::Open {
            return;
        }

        let Some(price) = self.ctx.market.last_price(&pos.mint) else {
            tracing::debug!(mint = %pos.mint, "No observed price, skipping");
            return;
        };

        let peak_before = pos.peak_pnl_pct;
        match evaluate_exit(&mut pos, price, now, self.config.time_stop) {
            ExitDecision::EntryPriceInitialised => {
                tracing::info!(mint = %pos.mint, entry_price = %price, "Entry price initialised from market");
                self.persist(&mut pos).await;
            }
            ExitDecision::Hold => {
                if pos.peak_pnl_pct != peak_before {
                    self.persist(&mut pos).await;
                }
                tracing::trace!(mint = %pos.mint, price = %price, "Position within bounds");
            }
            ExitDecision::Exit {
                reason,
                sell_fraction,
                pnl_pct,
            } => {
                if !self.cooldown.try_acquire(&pos.mint, now) {
                    tracing::debug!(mint = %pos.mint, reason = reason.as_str(), "Exit cooldown active");
                    return;
                }
                tracing::info!(
                    mint = %pos.mint,
                    reason = reason.as_str(),
                    price = %price,
                    pnl_pct = %pnl_pct,
                    peak_pnl_pct = ?pos.peak_pnl_pct,
                    "Exit triggered"
                );
                self.execute_exit(&mut pos, reason, sell_fraction, pnl_pct).await;
            }
        }
    }

    async fn persist(&self, pos: &mut Position) {
        if let Err(e) = self.ctx.machine.persist(pos).await {
            tracing::error!(mint = %pos.mint, error = %e, "Failed to persist position");
        }
    }

    async fn execute_exit(
        &self,
        pos: &mut Position,
        reason: ExitReason,
        sell_fraction: Decimal,
        pnl_pct: Decimal,
    ) {
        if let Err(e) = self
            .ctx
            .machine
            .transition(pos, PositionState::PendingExit, TransitionMeta::default())
            .await
        {
            tracing::error!(mint = %pos.mint, error = %e, "Cannot begin exit");
            return;
        }

        let (confirmed, signature, error, token_delta) = if self.ctx.live {
            let params = SellParams {
                payer: self.ctx.payer.pubkey(),
                mint: pos.mint.clone(),
                amount: SellAmount::Percent(sell_fraction * Decimal::ONE_HUNDRED),
            };
            let adapter = &self.ctx.adapter;
            let exec = self
                .ctx
                .engine
                .send_with_retry_and_fetch_fill(
                    || adapter.build_sell_tx(&params),
                    &self.ctx.payer,
                    Some(pos.mint.as_str()),
                    self.ctx.fill_max_wait,
                )
                .await;
            (
                exec.result.confirmed,
                exec.result.signature,
                exec.result.error,
                exec.fill.and_then(|f| f.token_delta),
            )
        } else {
            tracing::info!(
                mint = %pos.mint,
                reason = reason.as_str(),
                sell_pct = %(sell_fraction * Decimal::ONE_HUNDRED),
                "[DRY-RUN] Would sell"
            );
            (true, None, None, None)
        };

        if !confirmed {
            let error = error.unwrap_or_else(|| "exit not confirmed".into());
            tracing::warn!(mint = %pos.mint, reason = reason.as_str(), error = %error, "Exit failed, will retry");
            if let Err(e) = self
                .ctx
                .machine
                .transition(pos, PositionState::Open, TransitionMeta::error(error.clone()))
                .await
            {
                tracing::error!(mint = %pos.mint, error = %e, "Cannot reopen after failed exit");
            }
            counter!("exits_failed_total").increment(1);
            notify(
                self.ctx.notifier.as_ref(),
                notifier::format_exit_failed(&pos.mint, reason.as_str(), &error),
            );
            return;
        }

        counter!("exits_confirmed_total", "reason" => reason.as_str()).increment(1);

        if reason.is_full() {
            if let Err(e) = self
                .ctx
                .machine
                .transition(
                    pos,
                    PositionState::Closed,
                    TransitionMeta::exit(signature, reason.as_str()),
                )
                .await
            {
                tracing::error!(mint = %pos.mint, error = %e, "Cannot close position");
                return;
            }
            self.ctx.book.release(&pos.mint).await;
            notify(
                self.ctx.notifier.as_ref(),
                notifier::format_exit(pos, reason.as_str(), Some(pnl_pct), false),
            );
            return;
        }

        // Ladder sell: holdings shrink, position stays OPEN.
        pos.tp_filled += 1;
        pos.tokens = match (pos.tokens, token_delta) {
            (Some(held), Some(delta)) => Some((held + delta).max(Decimal::ZERO)),
            (Some(held), None) => Some(held * (Decimal::ONE - sell_fraction)),
            (None, _) => None,
        };
        tracing::info!(
            mint = %pos.mint,
            rung = pos.tp_filled,
            signature = ?signature,
            "Take-profit rung filled"
        );
        if let Err(e) = self
            .ctx
            .machine
            .transition(pos, PositionState::Open, TransitionMeta::default())
            .await
        {
            tracing::error!(mint = %pos.mint, error = %e, "Cannot reopen after ladder sell");
        }
        notify(
            self.ctx.notifier.as_ref(),
            notifier::format_exit(pos, reason.as_str(), Some(pnl_pct), true),
        );
    }
}
