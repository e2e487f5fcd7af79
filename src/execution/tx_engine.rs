use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use solana_sdk::hash::Hash;
use solana_sdk::message::VersionedMessage;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use solana_sdk::transaction::VersionedTransaction;
use thiserror::Error;

use crate::models::{ExecutionResult, FillDeltas};

use super::fills::{compute_fill_deltas, lamports_to_sol, token_amount};
use super::rpc::{RpcEndpoint, SignatureStatus, SimOutcome};

/// Failure taxonomy of the execution layer.
///
/// `Transport`, `Build` and `ConfirmTimeout` are transient and retried with
/// backoff. `OnChain` means the transaction landed and failed; it is retried
/// immediately with a freshly built transaction.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecError {
    #[error("rpc error ({endpoint}): {message}")]
    Transport { endpoint: String, message: String },

    #[error("transaction build failed: {0}")]
    Build(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("transaction failed on-chain: {0}")]
    OnChain(String),

    #[error("confirmation timed out for {0}")]
    ConfirmTimeout(String),

    #[error("blockhash expired before {0} confirmed")]
    Expired(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid mint: {0}")]
    InvalidMint(String),

    #[error("fill for {signature} not available after {waited_ms}ms")]
    FillUnavailable { signature: String, waited_ms: u64 },
}

impl ExecError {
    /// Whether the submission ladder backs off before the next attempt.
    pub fn backs_off(&self) -> bool {
        !matches!(self, ExecError::OnChain(_))
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_attempts: u32,
    /// Backoff after a transient failure is `backoff_step × attempt`.
    pub backoff_step: Duration,
    pub confirm_timeout: Duration,
    pub confirm_poll: Duration,
    pub fill_poll: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_millis(150),
            confirm_timeout: Duration::from_secs(30),
            confirm_poll: Duration::from_millis(400),
            fill_poll: Duration::from_millis(500),
        }
    }
}

/// Outcome of the pre-trade simulation gate.
#[derive(Debug, Clone, PartialEq)]
pub struct GateOutcome {
    pub ok: bool,
    pub reason: Option<String>,
    pub buy: SimOutcome,
    pub sell: Option<SimOutcome>,
}

/// A submission plus its reconciled fill, when one could be read back.
#[derive(Debug, Clone, PartialEq)]
pub struct FilledExecution {
    pub result: ExecutionResult,
    pub fill: Option<FillDeltas>,
    pub fill_error: Option<String>,
}

/// Signs, simulates, submits and confirms transactions across a pool of
/// interchangeable endpoints.
pub struct TransactionEngine {
    endpoints: Vec<Arc<dyn RpcEndpoint>>,
    rpc_index: AtomicUsize,
    config: EngineConfig,
}

impl TransactionEngine {
    pub fn new(endpoints: Vec<Arc<dyn RpcEndpoint>>, config: EngineConfig) -> anyhow::Result<Self> {
        if endpoints.is_empty() {
            anyhow::bail!("transaction engine needs at least one rpc endpoint");
        }
        Ok(Self {
            endpoints,
            rpc_index: AtomicUsize::new(0),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn primary(&self) -> &Arc<dyn RpcEndpoint> {
        &self.endpoints[0]
    }

    /// Advance the shared round-robin cursor and return that endpoint.
    fn next_endpoint(&self) -> &Arc<dyn RpcEndpoint> {
        let len = self.endpoints.len();
        let idx = self.rpc_index.fetch_add(1, Ordering::Relaxed).wrapping_add(1) % len;
        &self.endpoints[idx]
    }

    /// Fill a missing blockhash from `endpoint` and sign with `payer`.
    async fn sign(
        &self,
        endpoint: &Arc<dyn RpcEndpoint>,
        mut message: VersionedMessage,
        payer: &Keypair,
    ) -> Result<VersionedTransaction, ExecError> {
        match message.static_account_keys().first() {
            Some(fee_payer) if *fee_payer == payer.pubkey() => {}
            Some(other) => {
                return Err(ExecError::Build(format!(
                    "fee payer {other} does not match signer {}",
                    payer.pubkey()
                )))
            }
            None => return Err(ExecError::Build("message has no accounts".into())),
        }

        if *message.recent_blockhash() == Hash::default() {
            let ctx = endpoint.latest_blockhash().await?;
            message.set_recent_blockhash(ctx.blockhash);
        }

        VersionedTransaction::try_new(message, &[payer]).map_err(|e| ExecError::Signing(e.to_string()))
    }

    /// Dry-run a transaction on the primary endpoint. Transport failures are
    /// folded into a failed outcome.
    pub async fn simulate(&self, tx: &VersionedTransaction) -> SimOutcome {
        match self.primary().simulate(tx).await {
            Ok(outcome) => outcome,
            Err(e) => SimOutcome::failed(e.to_string()),
        }
    }

    async fn build_and_simulate<F, Fut>(&self, build: F, payer: &Keypair) -> SimOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<VersionedMessage>>,
    {
        let message = match build().await {
            Ok(m) => m,
            Err(e) => return SimOutcome::failed(format!("build failed: {e}")),
        };
        match self.sign(self.primary(), message, payer).await {
            Ok(tx) => self.simulate(&tx).await,
            Err(e) => SimOutcome::failed(e.to_string()),
        }
    }

    /// Simulate a buy and then a sell; both must pass before capital is
    /// committed. The sell is not simulated when the buy fails.
    pub async fn simulate_buy_sell_gate<B, BF, S, SF>(
        &self,
        build_buy: B,
        build_sell: S,
        payer: &Keypair,
    ) -> GateOutcome
    where
        B: FnOnce() -> BF,
        BF: Future<Output = anyhow::Result<VersionedMessage>>,
        S: FnOnce() -> SF,
        SF: Future<Output = anyhow::Result<VersionedMessage>>,
    {
        let buy = self.build_and_simulate(build_buy, payer).await;
        if !buy.ok {
            let reason = format!(
                "BUY simulation failed: {}",
                buy.err.clone().unwrap_or_else(|| "unknown".into())
            );
            return GateOutcome {
                ok: false,
                reason: Some(reason),
                buy,
                sell: None,
            };
        }

        let sell = self.build_and_simulate(build_sell, payer).await;
        if !sell.ok {
            let reason = format!(
                "SELL simulation failed: {}",
                sell.err.clone().unwrap_or_else(|| "unknown".into())
            );
            return GateOutcome {
                ok: false,
                reason: Some(reason),
                buy,
                sell: Some(sell),
            };
        }

        GateOutcome {
            ok: true,
            reason: None,
            buy,
            sell: Some(sell),
        }
    }

    /// Poll the signature until it is confirmed, fails on-chain, its
    /// blockhash expires, or the confirm timeout elapses.
    async fn confirm(
        &self,
        endpoint: &Arc<dyn RpcEndpoint>,
        signature: &Signature,
    ) -> Result<(), ExecError> {
        let ctx = endpoint.latest_blockhash().await?;
        let deadline = Instant::now() + self.config.confirm_timeout;

        loop {
            match endpoint.signature_status(signature).await? {
                SignatureStatus::Confirmed => return Ok(()),
                SignatureStatus::Failed(err) => return Err(ExecError::OnChain(err)),
                SignatureStatus::Pending => {}
            }

            if Instant::now() >= deadline {
                return Err(ExecError::ConfirmTimeout(signature.to_string()));
            }
            if endpoint.block_height().await? > ctx.last_valid_block_height {
                return Err(ExecError::Expired(signature.to_string()));
            }
            tokio::time::sleep(self.config.confirm_poll).await;
        }
    }

    async fn attempt_once<F, Fut>(
        &self,
        endpoint: &Arc<dyn RpcEndpoint>,
        build: &F,
        payer: &Keypair,
    ) -> Result<Signature, ExecError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = anyhow::Result<VersionedMessage>>,
    {
        let message = build().await.map_err(|e| ExecError::Build(e.to_string()))?;
        let tx = self.sign(endpoint, message, payer).await?;
        let signature = endpoint.send(&tx).await?;
        tracing::debug!(endpoint = endpoint.url(), %signature, "Transaction submitted");
        self.confirm(endpoint, &signature).await?;
        Ok(signature)
    }

    /// Submit with up to `max_attempts` tries, rebuilding the transaction
    /// each time. Attempt 1 uses the primary endpoint; later attempts rotate.
    pub async fn send_with_retry<F, Fut>(&self, build: F, payer: &Keypair) -> ExecutionResult
    where
        F: Fn() -> Fut,
        Fut: Future<Output = anyhow::Result<VersionedMessage>>,
    {
        let mut last_error: Option<String> = None;

        for attempt in 1..=self.config.max_attempts {
            let endpoint = if attempt == 1 {
                self.primary()
            } else {
                self.next_endpoint()
            };
            metrics::counter!("tx_attempts_total").increment(1);
            let started = Instant::now();

            match self.attempt_once(endpoint, &build, payer).await {
                Ok(signature) => {
                    metrics::histogram!("send_latency_seconds")
                        .record(started.elapsed().as_secs_f64());
                    tracing::info!(attempt, endpoint = endpoint.url(), %signature, "Transaction confirmed");
                    return ExecutionResult::confirmed(signature.to_string(), attempt);
                }
                Err(e) => {
                    tracing::warn!(attempt, endpoint = endpoint.url(), error = %e, "Transaction attempt failed");
                    let backs_off = e.backs_off();
                    last_error = Some(e.to_string());
                    if backs_off {
                        tokio::time::sleep(self.config.backoff_step * attempt).await;
                    }
                }
            }
        }

        ExecutionResult::failed(last_error, self.config.max_attempts)
    }

    /// Read back realized balance deltas for a confirmed signature, polling
    /// until the record is available or `max_wait` elapses.
    pub async fn get_fill_deltas(
        &self,
        signature: &str,
        payer: &Pubkey,
        mint: Option<&str>,
        max_wait: Duration,
    ) -> Result<FillDeltas, ExecError> {
        let sig = Signature::from_str(signature)
            .map_err(|_| ExecError::InvalidSignature(signature.to_string()))?;
        let payer = payer.to_string();
        let started = Instant::now();

        loop {
            match self.primary().transaction_balances(&sig).await {
                Ok(Some(snapshot)) => match compute_fill_deltas(&snapshot, &payer, mint) {
                    Some(fill) => return Ok(fill),
                    None => tracing::debug!(signature, "Payer missing from transaction balances"),
                },
                Ok(None) => tracing::debug!(signature, "Transaction record not indexed yet"),
                Err(e) => tracing::debug!(signature, error = %e, "Fill lookup failed"),
            }

            if started.elapsed() >= max_wait {
                return Err(ExecError::FillUnavailable {
                    signature: signature.to_string(),
                    waited_ms: max_wait.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.config.fill_poll).await;
        }
    }

    /// `send_with_retry`, then on confirmation read back the fill. A missing
    /// fill never downgrades a confirmed submission.
    pub async fn send_with_retry_and_fetch_fill<F, Fut>(
        &self,
        build: F,
        payer: &Keypair,
        mint: Option<&str>,
        max_wait: Duration,
    ) -> FilledExecution
    where
        F: Fn() -> Fut,
        Fut: Future<Output = anyhow::Result<VersionedMessage>>,
    {
        let result = self.send_with_retry(build, payer).await;
        let Some(signature) = result.signature.clone().filter(|_| result.confirmed) else {
            return FilledExecution {
                result,
                fill: None,
                fill_error: None,
            };
        };

        match self
            .get_fill_deltas(&signature, &payer.pubkey(), mint, max_wait)
            .await
        {
            Ok(fill) => FilledExecution {
                result,
                fill: Some(fill),
                fill_error: None,
            },
            Err(e) => {
                tracing::warn!(%signature, error = %e, "Confirmed but fill unavailable");
                FilledExecution {
                    result,
                    fill: None,
                    fill_error: Some(e.to_string()),
                }
            }
        }
    }

    /// Native balance of `owner` in SOL, read from the primary endpoint.
    pub async fn balance(&self, owner: &Pubkey) -> Result<Decimal, ExecError> {
        let lamports = self.primary().balance_lamports(owner).await?;
        Ok(lamports_to_sol(lamports as i64))
    }

    /// Tokens of `mint` held by `owner` across all of its token accounts,
    /// read from the primary endpoint.
    pub async fn token_holdings(&self, owner: &Pubkey, mint: &str) -> Result<Decimal, ExecError> {
        let mint_key =
            Pubkey::from_str(mint).map_err(|_| ExecError::InvalidMint(mint.to_string()))?;
        let accounts = self.primary().token_accounts(owner, &mint_key).await?;
        Ok(accounts.iter().map(token_amount).sum())
    }
}
