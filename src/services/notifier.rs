use rust_decimal::Decimal;
use serde_json::json;

use crate::models::Position;

/// Telegram notification service. Failures are logged but never block the main flow.
#[derive(Debug, Clone)]
pub struct Notifier {
    http: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl Notifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            bot_token,
            chat_id,
        }
    }

    /// Send a Telegram message. Failures are logged as warnings.
    pub async fn send(&self, message: &str) {
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.bot_token
        );

        let body = json!({
            "chat_id": self.chat_id,
            "text": message,
            "parse_mode": "Markdown",
        });

        match self.http.post(&url).json(&body).send().await {
            Ok(resp) => {
                if !resp.status().is_success() {
                    tracing::warn!(
                        status = %resp.status(),
                        "Telegram sendMessage returned non-2xx"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to send Telegram notification");
            }
        }
    }
}

/// Send `message` if a notifier is configured, without awaiting delivery.
pub fn notify(notifier: Option<&std::sync::Arc<Notifier>>, message: String) {
    if let Some(n) = notifier {
        let n = n.clone();
        tokio::spawn(async move { n.send(&message).await });
    }
}

fn short(mint: &str) -> String {
    let chars: Vec<char> = mint.chars().collect();
    if chars.len() > 10 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        mint.to_string()
    }
}

fn pct(fraction: Decimal) -> Decimal {
    (fraction * Decimal::ONE_HUNDRED).round_dp(1)
}

pub fn format_entry(mint: &str, size_sol: Decimal, dry_run: bool) -> String {
    format!(
        "*Entering*\nMint: `{}`\nSize: {} SOL\nDry run: {}",
        short(mint),
        size_sol.round_dp(2),
        dry_run,
    )
}

pub fn format_opened(pos: &Position) -> String {
    let entry = pos
        .entry_price
        .map(|p| p.normalize().to_string())
        .unwrap_or_else(|| "unknown".into());
    format!(
        "*Position open*\nMint: `{}`\nSize: {} SOL\nEntry: {}",
        short(&pos.mint),
        pos.size_sol.round_dp(2),
        entry,
    )
}

pub fn format_entry_failed(mint: &str, error: &str) -> String {
    format!("*Entry failed*\nMint: `{}`\nError: {}", short(mint), error)
}

pub fn format_risk_blocked(mint: &str, reasons: &[String]) -> String {
    format!("*Risk blocked*\nMint: `{}`\n{}", short(mint), reasons.join(", "))
}

pub fn format_exit(pos: &Position, reason: &str, pnl_pct: Option<Decimal>, partial: bool) -> String {
    let pnl = pnl_pct
        .map(|p| format!("{}%", pct(p)))
        .unwrap_or_else(|| "n/a".into());
    let title = if partial { "Take profit" } else { "Position closed" };
    format!(
        "*{}*\nMint: `{}`\nReason: {}\nPnL: {}\nRungs filled: {}/{}",
        title,
        short(&pos.mint),
        reason,
        pnl,
        pos.tp_filled,
        pos.take_profits.len(),
    )
}

pub fn format_exit_failed(mint: &str, reason: &str, error: &str) -> String {
    format!(
        "*Exit failed*\nMint: `{}`\nReason: {}\nError: {}",
        short(mint),
        reason,
        error,
    )
}
