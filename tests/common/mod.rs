use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use solana_sdk::hash::Hash;
use solana_sdk::message::{Message, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::transaction::VersionedTransaction;

use launch_sniper::db::MemoryStore;
use launch_sniper::execution::rpc::{
    BlockhashContext, SignatureStatus, SimOutcome, TokenBalance, TxBalanceSnapshot,
};
use launch_sniper::execution::{
    BuyParams, EngineConfig, ExecError, ExecutionAdapter, PositionBook, PositionMachine,
    RpcEndpoint, SellAmount, SellParams, TradingContext, TransactionEngine,
};
use launch_sniper::ingestion::MarketState;
use launch_sniper::models::{Side, TokenInfo, TradeEvent};

/// RPC endpoint whose answers are scripted by the test.
pub struct ScriptedEndpoint {
    url: String,
    /// Simulation outcomes consumed in order; an empty queue simulates ok.
    pub simulations: Mutex<VecDeque<SimOutcome>>,
    /// When set, every `send` fails with this error.
    pub send_error: Mutex<Option<ExecError>>,
    pub status: Mutex<SignatureStatus>,
    pub fill: Mutex<Option<TxBalanceSnapshot>>,
    pub lamports: AtomicU64,
    pub sends: AtomicUsize,
    /// Token accounts reported for any owner and mint.
    pub holdings: Mutex<Vec<TokenBalance>>,
    pub holdings_error: Mutex<Option<ExecError>>,
}

#[allow(dead_code)]
impl ScriptedEndpoint {
    pub fn new(url: &str) -> Arc<Self> {
        Arc::new(Self {
            url: url.to_string(),
            simulations: Mutex::new(VecDeque::new()),
            send_error: Mutex::new(None),
            status: Mutex::new(SignatureStatus::Confirmed),
            fill: Mutex::new(None),
            lamports: AtomicU64::new(10_000_000_000),
            sends: AtomicUsize::new(0),
            holdings: Mutex::new(Vec::new()),
            holdings_error: Mutex::new(None),
        })
    }

    pub fn push_simulation(&self, outcome: SimOutcome) {
        self.simulations.lock().unwrap().push_back(outcome);
    }

    pub fn fail_sends(&self, error: ExecError) {
        *self.send_error.lock().unwrap() = Some(error);
    }

    pub fn set_status(&self, status: SignatureStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn set_fill(&self, snapshot: TxBalanceSnapshot) {
        *self.fill.lock().unwrap() = Some(snapshot);
    }

    /// Report a single token account holding `amount` (6 decimals).
    pub fn set_holdings(&self, amount: f64) {
        *self.holdings.lock().unwrap() = vec![TokenBalance {
            account_index: 0,
            mint: String::new(),
            owner: None,
            ui_amount: Some(amount),
            amount: format!("{}", (amount * 1_000_000.0) as u64),
            decimals: 6,
        }];
    }

    pub fn fail_holdings(&self, error: Option<ExecError>) {
        *self.holdings_error.lock().unwrap() = error;
    }

    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RpcEndpoint for ScriptedEndpoint {
    fn url(&self) -> &str {
        &self.url
    }

    async fn latest_blockhash(&self) -> Result<BlockhashContext, ExecError> {
        Ok(BlockhashContext {
            blockhash: Hash::new_unique(),
            last_valid_block_height: 1_000,
        })
    }

    async fn simulate(&self, _tx: &VersionedTransaction) -> Result<SimOutcome, ExecError> {
        let next = self.simulations.lock().unwrap().pop_front();
        Ok(next.unwrap_or(SimOutcome {
            ok: true,
            err: None,
            logs: vec![],
        }))
    }

    async fn send(&self, tx: &VersionedTransaction) -> Result<Signature, ExecError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.send_error.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(tx.signatures[0])
    }

    async fn signature_status(&self, _signature: &Signature) -> Result<SignatureStatus, ExecError> {
        Ok(self.status.lock().unwrap().clone())
    }

    async fn block_height(&self) -> Result<u64, ExecError> {
        Ok(10)
    }

    async fn transaction_balances(
        &self,
        _signature: &Signature,
    ) -> Result<Option<TxBalanceSnapshot>, ExecError> {
        Ok(self.fill.lock().unwrap().clone())
    }

    async fn balance_lamports(&self, _owner: &Pubkey) -> Result<u64, ExecError> {
        Ok(self.lamports.load(Ordering::SeqCst))
    }

    async fn token_accounts(
        &self,
        _owner: &Pubkey,
        _mint: &Pubkey,
    ) -> Result<Vec<TokenBalance>, ExecError> {
        if let Some(e) = self.holdings_error.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(self.holdings.lock().unwrap().clone())
    }
}

/// Execution adapter that returns a minimal payer-signed message.
#[derive(Default)]
pub struct ScriptedAdapter {
    pub fail_builds: AtomicBool,
    pub buys: AtomicUsize,
    pub sells: Mutex<Vec<SellAmount>>,
}

#[allow(dead_code)]
impl ScriptedAdapter {
    pub fn sell_amounts(&self) -> Vec<SellAmount> {
        self.sells.lock().unwrap().clone()
    }
}

fn message_for(payer: &Pubkey) -> VersionedMessage {
    VersionedMessage::Legacy(Message::new(&[], Some(payer)))
}

#[async_trait]
impl ExecutionAdapter for ScriptedAdapter {
    async fn build_buy_tx(&self, params: &BuyParams) -> anyhow::Result<VersionedMessage> {
        self.buys.fetch_add(1, Ordering::SeqCst);
        if self.fail_builds.load(Ordering::SeqCst) {
            anyhow::bail!("trade-local returned 500");
        }
        Ok(message_for(&params.payer))
    }

    async fn build_sell_tx(&self, params: &SellParams) -> anyhow::Result<VersionedMessage> {
        self.sells.lock().unwrap().push(params.amount);
        if self.fail_builds.load(Ordering::SeqCst) {
            anyhow::bail!("trade-local returned 500");
        }
        Ok(message_for(&params.payer))
    }
}

/// Engine timings short enough for tests.
#[allow(dead_code)]
pub fn fast_engine_config() -> EngineConfig {
    EngineConfig {
        max_attempts: 3,
        backoff_step: Duration::from_millis(1),
        confirm_timeout: Duration::from_millis(200),
        confirm_poll: Duration::from_millis(1),
        fill_poll: Duration::from_millis(1),
    }
}

/// Everything a trading test needs, sharing one memory store.
#[allow(dead_code)]
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub endpoint: Arc<ScriptedEndpoint>,
    pub adapter: Arc<ScriptedAdapter>,
    pub ctx: TradingContext,
}

#[allow(dead_code)]
pub fn harness(live: bool) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let endpoint = ScriptedEndpoint::new("http://primary");
    let adapter = Arc::new(ScriptedAdapter::default());
    let engine = TransactionEngine::new(
        vec![endpoint.clone() as Arc<dyn RpcEndpoint>],
        fast_engine_config(),
    )
    .expect("engine");

    let ctx = TradingContext {
        book: PositionBook::new(),
        market: Arc::new(MarketState::new()),
        machine: Arc::new(PositionMachine::new(store.clone())),
        engine: Arc::new(engine),
        adapter: adapter.clone(),
        payer: Arc::new(Keypair::new()),
        notifier: None,
        live,
        fill_max_wait: Duration::from_millis(20),
    };

    Harness {
        store,
        endpoint,
        adapter,
        ctx,
    }
}

/// A trade on `mint` at `price` from a distinct trader.
#[allow(dead_code)]
pub fn trade(mint: &str, n: u32, price: Decimal, side: Side) -> TradeEvent {
    TradeEvent {
        signature: format!("{mint}-sig-{n}"),
        mint: mint.to_string(),
        price,
        sol_amount: Decimal::new(5, 1),
        side,
        slot: 100 + n as u64,
        trader: format!("trader{n}"),
        timestamp: Utc::now(),
    }
}

/// Seed `mint` with a clean token and a strong burst of buys.
#[allow(dead_code)]
pub fn seed_momentum(market: &MarketState, mint: &str, price: Decimal) {
    market.record_token(TokenInfo {
        mint: mint.to_string(),
        creator: "creator".into(),
        decimals: 6,
        freeze_authority: None,
        mint_authority: None,
    });
    for n in 0..10 {
        market.record_trade(&trade(mint, n, price, Side::Buy));
    }
}

/// Balance snapshot in which `payer` spent `sol_spent_lamports` and
/// received `tokens` of `mint`.
#[allow(dead_code)]
pub fn buy_fill(payer: &Pubkey, mint: &str, sol_spent_lamports: u64, tokens: f64) -> TxBalanceSnapshot {
    let payer = payer.to_string();
    TxBalanceSnapshot {
        account_keys: vec![payer.clone(), "Ata".into()],
        pre_balances: vec![10_000_000_000, 0],
        post_balances: vec![10_000_000_000 - sol_spent_lamports, 0],
        pre_token_balances: vec![],
        post_token_balances: vec![TokenBalance {
            account_index: 1,
            mint: mint.to_string(),
            owner: Some(payer),
            ui_amount: Some(tokens),
            amount: format!("{}", (tokens * 1_000_000.0) as u64),
            decimals: 6,
        }],
    }
}

/// Router over a memory store with a dry-run status provider.
#[allow(dead_code)]
pub fn test_app() -> (axum::Router, Arc<MemoryStore>, launch_sniper::execution::EntryGate) {
    use launch_sniper::api::router::create_router;
    use launch_sniper::config::AppConfig;
    use launch_sniper::execution::EntryGate;
    use launch_sniper::services::StatusProvider;
    use launch_sniper::AppState;

    let store = Arc::new(MemoryStore::new());
    let gate = EntryGate::new();
    let status = StatusProvider::new(
        Pubkey::new_unique(),
        None,
        PositionBook::new(),
        gate.clone(),
        Arc::new(AtomicBool::new(false)),
        true,
        false,
    );
    let state = AppState {
        store: store.clone(),
        config: AppConfig::from_env().expect("default config"),
        status,
        metrics_handle: launch_sniper::metrics::detached_handle(),
    };
    (create_router(state), store, gate)
}
