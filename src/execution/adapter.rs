use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use solana_sdk::message::VersionedMessage;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::VersionedTransaction;

#[derive(Debug, Clone, PartialEq)]
pub struct BuyParams {
    pub payer: Pubkey,
    pub mint: String,
    pub amount_sol: Decimal,
}

/// How much of a holding to sell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SellAmount {
    /// Percent of current holdings, 0..=100.
    Percent(Decimal),
    /// Absolute token quantity.
    Tokens(Decimal),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SellParams {
    pub payer: Pubkey,
    pub mint: String,
    pub amount: SellAmount,
}

/// Builds unsigned venue transactions. The engine signs and submits them.
///
/// A message whose recent blockhash is the default hash gets one filled in
/// by the engine.
#[async_trait]
pub trait ExecutionAdapter: Send + Sync {
    async fn build_buy_tx(&self, params: &BuyParams) -> anyhow::Result<VersionedMessage>;

    async fn build_sell_tx(&self, params: &SellParams) -> anyhow::Result<VersionedMessage>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TradeLocalRequest<'a> {
    public_key: String,
    action: &'a str,
    mint: &'a str,
    amount: serde_json::Value,
    denominated_in_sol: &'a str,
    slippage: f64,
    priority_fee: f64,
    pool: &'a str,
}

/// Bonding-curve venue adapter backed by the PumpPortal trade-local API,
/// which returns a serialized transaction for the caller to sign.
pub struct PumpPortalAdapter {
    http: reqwest::Client,
    url: String,
    slippage_pct: Decimal,
    priority_fee_sol: Decimal,
    pool: String,
}

impl PumpPortalAdapter {
    pub fn new(
        url: impl Into<String>,
        slippage_pct: Decimal,
        priority_fee_sol: Decimal,
        pool: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            slippage_pct,
            priority_fee_sol,
            pool: pool.into(),
        }
    }

    async fn request(&self, body: TradeLocalRequest<'_>) -> anyhow::Result<VersionedMessage> {
        let resp = self.http.post(&self.url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("trade-local {} for {}: {status} {text}", body.action, body.mint);
        }

        let bytes = resp.bytes().await?;
        let tx: VersionedTransaction = bincode::deserialize(&bytes)
            .map_err(|e| anyhow::anyhow!("trade-local returned an undecodable transaction: {e}"))?;
        Ok(tx.message)
    }
}

fn as_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

#[async_trait]
impl ExecutionAdapter for PumpPortalAdapter {
    async fn build_buy_tx(&self, params: &BuyParams) -> anyhow::Result<VersionedMessage> {
        self.request(TradeLocalRequest {
            public_key: params.payer.to_string(),
            action: "buy",
            mint: &params.mint,
            amount: serde_json::json!(as_f64(params.amount_sol)),
            denominated_in_sol: "true",
            slippage: as_f64(self.slippage_pct),
            priority_fee: as_f64(self.priority_fee_sol),
            pool: &self.pool,
        })
        .await
    }

    async fn build_sell_tx(&self, params: &SellParams) -> anyhow::Result<VersionedMessage> {
        let amount = match params.amount {
            SellAmount::Percent(pct) => serde_json::json!(format!("{}%", pct.normalize())),
            SellAmount::Tokens(tokens) => serde_json::json!(as_f64(tokens)),
        };
        self.request(TradeLocalRequest {
            public_key: params.payer.to_string(),
            action: "sell",
            mint: &params.mint,
            amount,
            denominated_in_sol: "false",
            slippage: as_f64(self.slippage_pct),
            priority_fee: as_f64(self.priority_fee_sol),
            pool: &self.pool,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sell_request_uses_percent_string() {
        let body = TradeLocalRequest {
            public_key: "payer".into(),
            action: "sell",
            mint: "mintA",
            amount: serde_json::json!(format!("{}%", Decimal::new(2500, 2).normalize())),
            denominated_in_sol: "false",
            slippage: 10.0,
            priority_fee: 0.00001,
            pool: "pump",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["amount"], "25%");
        assert_eq!(json["publicKey"], "payer");
        assert_eq!(json["denominatedInSol"], "false");
        assert_eq!(json["priorityFee"], 0.00001);
    }
}
