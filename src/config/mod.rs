use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

use crate::models::position::{validate_ladder, TakeProfitRung};

const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
const DEFAULT_PUMP_PORTAL_URL: &str = "wss://pumpportal.fun/api/data";
const DEFAULT_TRADE_LOCAL_URL: &str = "https://pumpportal.fun/api/trade-local";
const DEFAULT_TP_LADDER: &str =
    r#"[{"pct":0.25,"profit":0.3},{"pct":0.25,"profit":0.6},{"pct":0.25,"profit":1.0}]"#;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Postgres URL. When unset positions are kept in memory only.
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,

    // Chain access
    pub rpc_urls: Vec<String>,
    pub enable_live_trading: bool,
    pub dry_run: bool,

    // Sizing / risk
    pub base_size_sol: Decimal,
    pub min_trade_sol: Decimal,
    pub max_trade_sol: Decimal,
    pub max_open_positions: usize,
    pub max_total_exposure_sol: Decimal,
    pub stop_loss_pct: Decimal,
    pub time_stop_sec: i64,
    pub tp_ladder: Vec<TakeProfitRung>,
    pub trail_mode: String,

    // Wallet
    pub keypair_b58: Option<String>,
    pub keypair_path: Option<String>,
    pub min_sol_balance: Decimal,

    // Telegram
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,

    // PumpPortal feed + trade-local transaction builder
    pub pump_portal_url: String,
    pub trade_local_url: String,
    pub portal_slippage_pct: Decimal,
    pub portal_priority_fee_sol: Decimal,
    pub portal_pool: String,

    // Engine timing
    pub entry_cooldown_ms: i64,
    pub exit_cooldown_ms: i64,
    pub exit_tick_ms: u64,
    pub min_trade_history: usize,
    pub fill_max_wait_ms: u64,
    pub confirm_timeout_ms: u64,
    /// Mints with no feed activity for this long are dropped from memory.
    pub market_idle_sec: i64,
    pub market_sweep_sec: u64,
    /// Percent of holdings used for the sell leg of the simulation gate.
    pub gate_sell_pct: Decimal,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.into())
}

fn parse_var<T>(key: &str, default: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = var_or(key, default);
    raw.trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("{key}: cannot parse {raw:?}: {e}"))
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let rpc_urls: Vec<String> = var_or("RPC_URLS", DEFAULT_RPC_URL)
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if rpc_urls.is_empty() {
            anyhow::bail!("RPC_URLS must contain at least one endpoint");
        }

        let tp_ladder: Vec<TakeProfitRung> =
            serde_json::from_str(&var_or("TP_LADDER_JSON", DEFAULT_TP_LADDER))
                .map_err(|e| anyhow::anyhow!("TP_LADDER_JSON: {e}"))?;

        let config = Self {
            database_url: non_empty("DATABASE_URL"),
            host: var_or("HOST", "0.0.0.0"),
            port: parse_var("PORT", "8080")?,

            rpc_urls,
            enable_live_trading: var_or("ENABLE_LIVE_TRADING", "false").trim() == "true",
            // Anything other than an explicit "false" keeps dry-run on.
            dry_run: var_or("DRY_RUN", "true").trim() != "false",

            base_size_sol: parse_var("BASE_SIZE_SOL", "0.4")?,
            min_trade_sol: parse_var("MIN_TRADE_SOL", "0.1")?,
            max_trade_sol: parse_var("MAX_TRADE_SOL", "0.75")?,
            max_open_positions: parse_var("MAX_OPEN_POSITIONS", "3")?,
            max_total_exposure_sol: parse_var("MAX_TOTAL_EXPOSURE_SOL", "1.2")?,
            stop_loss_pct: parse_var("STOP_LOSS_PCT", "0.25")?,
            time_stop_sec: parse_var("TIME_STOP_SEC", "120")?,
            tp_ladder,
            trail_mode: var_or("TRAIL_MODE", "volatility"),

            keypair_b58: non_empty("KEYPAIR_B58"),
            keypair_path: non_empty("KEYPAIR_PATH"),
            min_sol_balance: parse_var("MIN_SOL_BALANCE", "0.05")?,

            telegram_bot_token: non_empty("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: non_empty("TELEGRAM_ADMIN_CHAT_ID"),

            pump_portal_url: var_or("PUMP_PORTAL_URL", DEFAULT_PUMP_PORTAL_URL),
            trade_local_url: var_or("PUMP_TRADE_LOCAL_URL", DEFAULT_TRADE_LOCAL_URL),
            portal_slippage_pct: parse_var("PORTAL_SLIPPAGE_PCT", "10")?,
            portal_priority_fee_sol: parse_var("PORTAL_PRIORITY_FEE_SOL", "0.00001")?,
            portal_pool: var_or("PORTAL_POOL", "pump"),

            entry_cooldown_ms: parse_var("ENTRY_COOLDOWN_MS", "750")?,
            exit_cooldown_ms: parse_var("EXIT_COOLDOWN_MS", "1200")?,
            exit_tick_ms: parse_var("EXIT_TICK_MS", "1000")?,
            min_trade_history: parse_var("MIN_TRADE_HISTORY", "5")?,
            fill_max_wait_ms: parse_var("FILL_MAX_WAIT_MS", "8000")?,
            confirm_timeout_ms: parse_var("CONFIRM_TIMEOUT_MS", "30000")?,
            market_idle_sec: parse_var("MARKET_IDLE_SEC", "600")?,
            market_sweep_sec: parse_var("MARKET_SWEEP_SEC", "60")?,
            gate_sell_pct: parse_var("GATE_SELL_PCT", "1")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Range checks that parsing alone cannot express.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.stop_loss_pct <= Decimal::ZERO {
            anyhow::bail!("STOP_LOSS_PCT must be positive");
        }
        if self.min_trade_sol > self.max_trade_sol {
            anyhow::bail!("MIN_TRADE_SOL must not exceed MAX_TRADE_SOL");
        }
        validate_ladder(&self.tp_ladder)?;
        if self.exit_tick_ms == 0 {
            anyhow::bail!("EXIT_TICK_MS must be positive");
        }
        if self.market_sweep_sec == 0 {
            anyhow::bail!("MARKET_SWEEP_SEC must be positive");
        }
        if self.market_idle_sec <= 0 {
            anyhow::bail!("MARKET_IDLE_SEC must be positive");
        }
        if self.time_stop_sec <= 0 {
            anyhow::bail!("TIME_STOP_SEC must be positive");
        }
        if self.gate_sell_pct <= Decimal::ZERO || self.gate_sell_pct > Decimal::ONE_HUNDRED {
            anyhow::bail!("GATE_SELL_PCT must be in (0, 100]");
        }
        Ok(())
    }

    /// Real transactions are sent only when live trading is enabled and
    /// dry-run is explicitly switched off.
    pub fn is_live(&self) -> bool {
        self.enable_live_trading && !self.dry_run
    }

    /// Returns true if both Telegram settings are configured.
    pub fn has_telegram(&self) -> bool {
        self.telegram_bot_token.is_some() && self.telegram_chat_id.is_some()
    }
}
