use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use solana_sdk::signer::Signer;

use crate::config::AppConfig;
use crate::db::PositionStore;
use crate::intelligence::{RiskCheck, RiskContext, Strategy, StrategyContext};
use crate::models::position::validate_ladder;
use crate::models::{
    FillDeltas, Position, PositionState, StopOverride, StrategySignal, TakeProfitRung, TokenInfo,
};
use crate::services::notifier::{self, notify};

use super::adapter::{BuyParams, SellAmount, SellParams};
use super::cooldown::Cooldown;
use super::position_machine::TransitionMeta;
use super::position_sizer::{calculate_size, SizingLimits};
use super::risk_manager::{check_wallet_reserve, AdmissionReject, RiskLimits};
use super::TradingContext;

/// Trades handed to the risk check.
const RISK_WINDOW: usize = 30;

/// Operator switch that stops new entries. Exits keep running.
#[derive(Debug, Clone, Default)]
pub struct EntryGate {
    paused: Arc<AtomicBool>,
}

impl EntryGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }
}

/// Configuration for the entry pipeline.
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    pub sizing: SizingLimits,
    pub limits: RiskLimits,
    pub stop_loss_pct: Decimal,
    pub tp_ladder: Vec<TakeProfitRung>,
    pub trail_mode: String,
    pub min_trade_history: usize,
    pub entry_cooldown_ms: i64,
    /// Percent of holdings used for the sell leg of the simulation gate.
    pub gate_sell_pct: Decimal,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            sizing: SizingLimits::default(),
            limits: RiskLimits::default(),
            stop_loss_pct: Decimal::new(25, 2),
            tp_ladder: vec![
                TakeProfitRung::new(Decimal::new(25, 2), Decimal::new(3, 1)),
                TakeProfitRung::new(Decimal::new(25, 2), Decimal::new(6, 1)),
                TakeProfitRung::new(Decimal::new(25, 2), Decimal::ONE),
            ],
            trail_mode: "volatility".into(),
            min_trade_history: 5,
            entry_cooldown_ms: 750,
            gate_sell_pct: Decimal::ONE,
        }
    }
}

impl AdmissionConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            sizing: SizingLimits {
                base: config.base_size_sol,
                min: config.min_trade_sol,
                max: config.max_trade_sol,
            },
            limits: RiskLimits {
                max_open_positions: config.max_open_positions,
                max_total_exposure_sol: config.max_total_exposure_sol,
                min_sol_balance: config.min_sol_balance,
            },
            stop_loss_pct: config.stop_loss_pct,
            tp_ladder: config.tp_ladder.clone(),
            trail_mode: config.trail_mode.clone(),
            min_trade_history: config.min_trade_history,
            entry_cooldown_ms: config.entry_cooldown_ms,
            gate_sell_pct: config.gate_sell_pct,
        }
    }
}

/// What happened to one entry candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    Rejected(AdmissionReject),
    Opened(Position),
    /// Admitted, but the gate or the submission failed; the position is CLOSED.
    Failed(Position),
    /// Admitted, but the position could not be recorded.
    Aborted(String),
}

/// Admitted candidate, ready to execute.
struct Admission {
    size: Decimal,
    signal: StrategySignal,
}

/// Decides whether a mint gets a position and, if so, opens it.
pub struct EntryPipeline {
    ctx: TradingContext,
    config: AdmissionConfig,
    gate: EntryGate,
    cooldown: Cooldown,
    store: Arc<dyn PositionStore>,
    risk: Arc<dyn RiskCheck>,
    strategy: Arc<dyn Strategy>,
}

impl EntryPipeline {
    pub fn new(
        ctx: TradingContext,
        config: AdmissionConfig,
        gate: EntryGate,
        store: Arc<dyn PositionStore>,
        risk: Arc<dyn RiskCheck>,
        strategy: Arc<dyn Strategy>,
    ) -> Self {
        let cooldown = Cooldown::from_millis(config.entry_cooldown_ms);
        Self {
            ctx,
            config,
            gate,
            cooldown,
            store,
            risk,
            strategy,
        }
    }

    /// Forget entry cooldown stamps that have expired at `now`.
    pub fn prune_cooldowns(&self, now: DateTime<Utc>) -> usize {
        self.cooldown.prune(now)
    }

    /// Run admission for `mint` and, when admitted, execute the entry.
    pub async fn consider_entry(&self, mint: &str, now: DateTime<Utc>) -> EntryOutcome {
        match self.admit(mint, now).await {
            Ok(admission) => self.execute_entry(mint, admission).await,
            Err(reject) => {
                counter!("admission_rejects_total", "reason" => reject.code()).increment(1);
                match &reject {
                    AdmissionReject::Paused
                    | AdmissionReject::Cooldown
                    | AdmissionReject::DuplicatePosition
                    | AdmissionReject::InsufficientHistory { .. }
                    | AdmissionReject::StrategySkip(_) => {
                        tracing::debug!(mint, reason = %reject, "Entry skipped");
                    }
                    AdmissionReject::RiskDenied { reasons } => {
                        tracing::warn!(mint, reason = %reject, "Entry rejected");
                        notify(
                            self.ctx.notifier.as_ref(),
                            notifier::format_risk_blocked(mint, reasons),
                        );
                    }
                    _ => {
                        tracing::warn!(mint, reason = %reject, "Entry rejected");
                    }
                }
                EntryOutcome::Rejected(reject)
            }
        }
    }

    /// Ordered admission checks. The first failure aborts.
    async fn admit(&self, mint: &str, now: DateTime<Utc>) -> Result<Admission, AdmissionReject> {
        // 0. Operator pause
        if self.gate.is_paused() {
            return Err(AdmissionReject::Paused);
        }

        // 1. Per-mint cooldown
        if !self.cooldown.try_acquire(mint, now) {
            return Err(AdmissionReject::Cooldown);
        }

        // 2. Duplicate guard (re-checked atomically at reservation)
        if self.ctx.book.is_active(mint).await {
            return Err(AdmissionReject::DuplicatePosition);
        }

        // 3. Trade history depth
        let trades = self.ctx.market.trades(mint);
        if trades.len() < self.config.min_trade_history {
            return Err(AdmissionReject::InsufficientHistory {
                have: trades.len(),
                need: self.config.min_trade_history,
            });
        }

        // 4. Risk verdict
        let token = self
            .ctx
            .market
            .token(mint)
            .unwrap_or_else(|| TokenInfo::unknown(mint));
        let recent = &trades[trades.len().saturating_sub(RISK_WINDOW)..];
        let report = self.risk.evaluate(&RiskContext {
            token: &token,
            recent_trades: recent,
        });
        if let Err(e) = self.store.save_risk_report(mint, &report).await {
            tracing::warn!(mint, error = %e, "Failed to save risk report");
        }
        if !report.allow {
            return Err(AdmissionReject::RiskDenied {
                reasons: report.reasons,
            });
        }

        // 5. Strategy verdict and sizing
        let prices = self.ctx.market.prices(mint);
        let signal = self.strategy.evaluate(&StrategyContext {
            trades: &trades,
            price_history: &prices,
        });
        if !signal.is_enter() {
            return Err(AdmissionReject::StrategySkip(signal.rationale));
        }
        let size = calculate_size(&self.config.sizing, signal.size_multiplier);

        // 6. Duplicate + exposure, reserved atomically
        self.ctx
            .book
            .try_reserve(mint, size, &self.config.limits)
            .await?;

        // 7. Wallet guard
        if self.ctx.live {
            if let Err(reject) = self.check_wallet(size).await {
                self.ctx.book.release(mint).await;
                return Err(reject);
            }
        }

        tracing::info!(
            mint,
            size = %size,
            confidence = %signal.confidence,
            rationale = %signal.rationale,
            "Entry admitted"
        );
        Ok(Admission { size, signal })
    }

    async fn check_wallet(&self, size: Decimal) -> Result<(), AdmissionReject> {
        let balance = self
            .ctx
            .engine
            .balance(&self.ctx.payer.pubkey())
            .await
            .map_err(|e| AdmissionReject::BalanceUnavailable(e.to_string()))?;
        check_wallet_reserve(balance, size, &self.config.limits)
    }

    /// Stop loss and ladder for a new position. A strategy override is used
    /// only when it passes the checks applied to configured values.
    fn exit_plan(&self, mint: &str, suggested: Option<StopOverride>) -> (Decimal, Vec<TakeProfitRung>) {
        let suggested = suggested.unwrap_or_default();

        let stop_loss_pct = match suggested.stop_loss_pct {
            Some(pct) if pct > Decimal::ZERO => pct,
            Some(pct) => {
                tracing::warn!(mint, stop_loss_pct = %pct, "Ignoring non-positive suggested stop loss");
                self.config.stop_loss_pct
            }
            None => self.config.stop_loss_pct,
        };

        let ladder = match suggested.take_profits {
            Some(rungs) => match validate_ladder(&rungs) {
                Ok(()) => rungs,
                Err(e) => {
                    tracing::warn!(mint, error = %e, "Ignoring invalid suggested take-profit ladder");
                    self.config.tp_ladder.clone()
                }
            },
            None => self.config.tp_ladder.clone(),
        };

        (stop_loss_pct, ladder)
    }

    async fn execute_entry(&self, mint: &str, admission: Admission) -> EntryOutcome {
        let (stop_loss_pct, ladder) = self.exit_plan(mint, admission.signal.suggested);

        let position = match self
            .ctx
            .machine
            .create(mint, admission.size, stop_loss_pct, ladder, &self.config.trail_mode)
            .await
        {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(mint, error = %e, "Failed to record new position");
                self.ctx.book.release(mint).await;
                counter!("entries_failed_total").increment(1);
                return EntryOutcome::Aborted(e.to_string());
            }
        };

        let handle = self.ctx.book.attach(position).await;
        let mut pos = handle.lock().await;
        notify(
            self.ctx.notifier.as_ref(),
            notifier::format_entry(mint, admission.size, !self.ctx.live),
        );

        if !self.ctx.live {
            pos.entry_price = self.ctx.market.last_price(mint);
            tracing::info!(
                mint,
                size = %admission.size,
                entry_price = ?pos.entry_price,
                "[DRY-RUN] Would buy"
            );
            return self.open(&mut pos, None).await;
        }

        let payer = self.ctx.payer.pubkey();
        let buy = BuyParams {
            payer,
            mint: mint.to_string(),
            amount_sol: admission.size,
        };
        let gate_sell = SellParams {
            payer,
            mint: mint.to_string(),
            amount: SellAmount::Percent(self.config.gate_sell_pct),
        };
        let adapter = &self.ctx.adapter;

        let gate = self
            .ctx
            .engine
            .simulate_buy_sell_gate(
                || adapter.build_buy_tx(&buy),
                || adapter.build_sell_tx(&gate_sell),
                &self.ctx.payer,
            )
            .await;
        if !gate.ok {
            let reason = gate
                .reason
                .unwrap_or_else(|| "simulation gate failed".into());
            return self.fail_entry(&mut pos, reason).await;
        }

        let exec = self
            .ctx
            .engine
            .send_with_retry_and_fetch_fill(
                || adapter.build_buy_tx(&buy),
                &self.ctx.payer,
                Some(mint),
                self.ctx.fill_max_wait,
            )
            .await;
        if !exec.result.confirmed {
            let reason = exec
                .result
                .error
                .unwrap_or_else(|| "entry not confirmed".into());
            return self.fail_entry(&mut pos, reason).await;
        }

        match exec.fill.as_ref().and_then(FillDeltas::entry_price) {
            Some(price) => pos.entry_price = Some(price),
            None => {
                let fallback = self.ctx.market.last_price(mint);
                tracing::warn!(
                    mint,
                    fallback = ?fallback,
                    fill_error = ?exec.fill_error,
                    "Fill incomplete, using last observed price as entry"
                );
                pos.entry_price = fallback;
            }
        }
        pos.tokens = exec
            .fill
            .and_then(|f| f.token_delta)
            .filter(|t| *t > Decimal::ZERO);

        self.open(&mut pos, exec.result.signature).await
    }

    async fn open(&self, pos: &mut Position, signature: Option<String>) -> EntryOutcome {
        if let Err(e) = self
            .ctx
            .machine
            .transition(pos, PositionState::Open, TransitionMeta::entry(signature))
            .await
        {
            tracing::error!(mint = %pos.mint, error = %e, "Could not open position");
        }
        counter!("entries_opened_total").increment(1);
        notify(self.ctx.notifier.as_ref(), notifier::format_opened(pos));
        EntryOutcome::Opened(pos.clone())
    }

    async fn fail_entry(&self, pos: &mut Position, reason: String) -> EntryOutcome {
        tracing::warn!(mint = %pos.mint, position_id = %pos.id, reason = %reason, "Entry failed");
        if let Err(e) = self
            .ctx
            .machine
            .transition(pos, PositionState::Closed, TransitionMeta::error(reason.clone()))
            .await
        {
            tracing::error!(mint = %pos.mint, error = %e, "Could not close failed entry");
        }
        self.ctx.book.release(&pos.mint).await;
        counter!("entries_failed_total").increment(1);
        notify(
            self.ctx.notifier.as_ref(),
            notifier::format_entry_failed(&pos.mint, &reason),
        );
        EntryOutcome::Failed(pos.clone())
    }
}
