use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use solana_sdk::signer::Signer;

use launch_sniper::api::router::create_router;
use launch_sniper::config::AppConfig;
use launch_sniper::db::{self, trade_repo, MemoryStore, PgStore, PositionStore};
use launch_sniper::execution::{
    AdmissionConfig, EngineConfig, EntryGate, EntryPipeline, ExecutionAdapter, PositionBook,
    PositionMachine, PumpPortalAdapter, RpcEndpoint, SolanaRpcEndpoint, TradingContext,
    TransactionEngine,
};
use launch_sniper::ingestion::{run_feed, EventPipeline, FeedEvent, MarketState};
use launch_sniper::intelligence::{RiskEngine, StrategyEngine};
use launch_sniper::services::{
    ExitConfig, ExitManager, Notifier, StatusProvider, SweepConfig, Sweeper,
};
use launch_sniper::{metrics, wallet, AppState};

/// Trades loaded per open mint so the exit manager has a price after restart.
const WARMUP_TRADES: i64 = 200;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    // Both the websocket and HTTP clients share the process-wide provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = AppConfig::from_env()?;
    let addr = format!("{}:{}", config.host, config.port);
    let live = config.is_live();
    let metrics_handle = metrics::init_metrics();

    tracing::info!(
        live,
        dry_run = config.dry_run,
        enable_live_trading = config.enable_live_trading,
        rpc_endpoints = config.rpc_urls.len(),
        "Starting launch sniper"
    );

    // --- Store ---
    let pg = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let pool = db::init_pool(url).await?;
            tracing::info!("Database connected");
            Some(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, positions are kept in memory only");
            None
        }
    };
    let store: Arc<dyn PositionStore> = match &pg {
        Some(pg) => Arc::new(pg.clone()),
        None => Arc::new(MemoryStore::new()),
    };

    // --- Wallet + execution ---
    let payer = Arc::new(wallet::load_keypair(&config)?);
    let endpoints: Vec<Arc<dyn RpcEndpoint>> = config
        .rpc_urls
        .iter()
        .map(|url| Arc::new(SolanaRpcEndpoint::new(url.clone())) as Arc<dyn RpcEndpoint>)
        .collect();
    let engine = Arc::new(TransactionEngine::new(
        endpoints,
        EngineConfig {
            confirm_timeout: Duration::from_millis(config.confirm_timeout_ms),
            ..EngineConfig::default()
        },
    )?);

    if live {
        let balance = engine
            .balance(&payer.pubkey())
            .await
            .map_err(|e| anyhow::anyhow!("cannot read wallet balance: {e}"))?;
        if balance < config.min_sol_balance {
            anyhow::bail!(
                "wallet {} holds {balance} SOL, below MIN_SOL_BALANCE {}",
                payer.pubkey(),
                config.min_sol_balance
            );
        }
        tracing::info!(wallet = %payer.pubkey(), balance = %balance, "Live trading enabled");
    } else {
        tracing::info!(wallet = %payer.pubkey(), "Dry-run mode: no transactions will be sent");
    }

    let adapter: Arc<dyn ExecutionAdapter> = Arc::new(PumpPortalAdapter::new(
        config.trade_local_url.clone(),
        config.portal_slippage_pct,
        config.portal_priority_fee_sol,
        config.portal_pool.clone(),
    ));

    let notifier = if config.has_telegram() {
        tracing::info!("Telegram notifications enabled");
        Some(Arc::new(Notifier::new(
            config.telegram_bot_token.clone().unwrap_or_default(),
            config.telegram_chat_id.clone().unwrap_or_default(),
        )))
    } else {
        None
    };

    // --- Rebuild in-memory state from the store ---
    let book = PositionBook::new();
    let market = Arc::new(MarketState::new());
    let open = store.list_open_positions().await?;
    if let Some(pg) = &pg {
        for pos in &open {
            match trade_repo::get_recent_trades(pg.pool(), &pos.mint, WARMUP_TRADES).await {
                Ok(trades) => trades.iter().for_each(|t| market.record_trade(t)),
                Err(e) => tracing::warn!(mint = %pos.mint, error = %e, "Failed to warm trade window"),
            }
        }
    }
    book.rebuild(open).await;

    let ctx = TradingContext {
        book: book.clone(),
        market: market.clone(),
        machine: Arc::new(PositionMachine::new(store.clone())),
        engine: engine.clone(),
        adapter,
        payer: payer.clone(),
        notifier,
        live,
        fill_max_wait: Duration::from_millis(config.fill_max_wait_ms),
    };

    // --- Exit manager ---
    let exits = Arc::new(ExitManager::new(ctx.clone(), ExitConfig::from_app(&config)));
    exits.recover().await;
    tokio::spawn(exits.clone().run());

    // --- Feed → pipeline → admission ---
    let gate = EntryGate::new();
    let feed_connected = Arc::new(AtomicBool::new(false));
    let entries = Arc::new(EntryPipeline::new(
        ctx,
        AdmissionConfig::from_app(&config),
        gate.clone(),
        store.clone(),
        Arc::new(RiskEngine),
        Arc::new(StrategyEngine::default()),
    ));

    let (feed_tx, feed_rx) = tokio::sync::mpsc::channel::<FeedEvent>(1000);
    let feed_url = config.pump_portal_url.clone();
    tokio::spawn(async move {
        run_feed(feed_url, feed_tx).await;
    });
    let sweeper = Sweeper::new(
        market.clone(),
        book.clone(),
        entries.clone(),
        exits,
        SweepConfig::from_app(&config),
    );
    tokio::spawn(sweeper.run());

    let pipeline = EventPipeline::new(market, store.clone(), entries, feed_connected.clone());
    tokio::spawn(pipeline.run(feed_rx));

    // --- Operator API ---
    let status = StatusProvider::new(
        payer.pubkey(),
        Some(engine),
        book,
        gate,
        feed_connected,
        config.dry_run,
        live,
    );
    let state = AppState {
        store,
        config,
        status,
        metrics_handle,
    };
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {addr}");
    axum::serve(listener, router).await?;

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(EnvFilter::from_default_env());
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
