use std::str::FromStr;

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{
    RpcSendTransactionConfig, RpcSimulateTransactionConfig, RpcTransactionConfig,
};
use solana_client::rpc_request::TokenAccountsFilter;
use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use solana_transaction_status::{
    EncodedConfirmedTransactionWithStatusMeta, UiLoadedAddresses, UiTransactionEncoding,
    UiTransactionTokenBalance,
};

use super::tx_engine::ExecError;

/// Short-lived reference state a transaction is built and confirmed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockhashContext {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// Result of a dry run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimOutcome {
    pub ok: bool,
    pub err: Option<String>,
    pub logs: Vec<String>,
}

impl SimOutcome {
    pub fn failed(err: impl Into<String>) -> Self {
        Self {
            ok: false,
            err: Some(err.into()),
            logs: Vec::new(),
        }
    }
}

/// Status of a submitted signature at `confirmed` commitment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    Pending,
    Confirmed,
    /// Landed, but the program returned an error.
    Failed(String),
}

/// One token balance entry of a confirmed transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBalance {
    pub account_index: usize,
    pub mint: String,
    pub owner: Option<String>,
    /// Precomputed display amount, when the node provides one.
    pub ui_amount: Option<f64>,
    /// Raw integer amount as a string.
    pub amount: String,
    pub decimals: u8,
}

/// Before/after balances of a confirmed transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TxBalanceSnapshot {
    pub account_keys: Vec<String>,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub pre_token_balances: Vec<TokenBalance>,
    pub post_token_balances: Vec<TokenBalance>,
}

/// One interchangeable network endpoint.
///
/// The engine only ever talks to this trait; retries and failover live in
/// the engine, so implementations do not retry.
#[async_trait]
pub trait RpcEndpoint: Send + Sync {
    fn url(&self) -> &str;

    async fn latest_blockhash(&self) -> Result<BlockhashContext, ExecError>;

    async fn simulate(&self, tx: &VersionedTransaction) -> Result<SimOutcome, ExecError>;

    /// Submit without transport-level retries.
    async fn send(&self, tx: &VersionedTransaction) -> Result<Signature, ExecError>;

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureStatus, ExecError>;

    async fn block_height(&self) -> Result<u64, ExecError>;

    /// `Ok(None)` while the node has not indexed the transaction yet.
    async fn transaction_balances(
        &self,
        signature: &Signature,
    ) -> Result<Option<TxBalanceSnapshot>, ExecError>;

    async fn balance_lamports(&self, owner: &Pubkey) -> Result<u64, ExecError>;

    /// Current balances of every `owner` token account holding `mint`.
    async fn token_accounts(
        &self,
        owner: &Pubkey,
        mint: &Pubkey,
    ) -> Result<Vec<TokenBalance>, ExecError>;
}

/// Solana JSON-RPC endpoint backed by the nonblocking client.
pub struct SolanaRpcEndpoint {
    url: String,
    client: RpcClient,
}

impl SolanaRpcEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let client = RpcClient::new_with_commitment(url.clone(), CommitmentConfig::confirmed());
        Self { url, client }
    }

    fn transport(&self, e: impl std::fmt::Display) -> ExecError {
        ExecError::Transport {
            endpoint: self.url.clone(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl RpcEndpoint for SolanaRpcEndpoint {
    fn url(&self) -> &str {
        &self.url
    }

    async fn latest_blockhash(&self) -> Result<BlockhashContext, ExecError> {
        let (blockhash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(CommitmentConfig::processed())
            .await
            .map_err(|e| self.transport(e))?;

        Ok(BlockhashContext {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn simulate(&self, tx: &VersionedTransaction) -> Result<SimOutcome, ExecError> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            commitment: Some(CommitmentConfig::processed()),
            ..RpcSimulateTransactionConfig::default()
        };

        let response = self
            .client
            .simulate_transaction_with_config(tx, config)
            .await
            .map_err(|e| self.transport(e))?;

        let value = response.value;
        Ok(SimOutcome {
            ok: value.err.is_none(),
            err: value.err.map(|e| format!("{e:?}")),
            logs: value.logs.unwrap_or_default(),
        })
    }

    async fn send(&self, tx: &VersionedTransaction) -> Result<Signature, ExecError> {
        let config = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(CommitmentLevel::Processed),
            max_retries: Some(0),
            ..RpcSendTransactionConfig::default()
        };

        self.client
            .send_transaction_with_config(tx, config)
            .await
            .map_err(|e| self.transport(e))
    }

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureStatus, ExecError> {
        let status = self
            .client
            .get_signature_status_with_commitment(signature, CommitmentConfig::confirmed())
            .await
            .map_err(|e| self.transport(e))?;

        Ok(match status {
            None => SignatureStatus::Pending,
            Some(Ok(())) => SignatureStatus::Confirmed,
            Some(Err(e)) => SignatureStatus::Failed(format!("{e:?}")),
        })
    }

    async fn block_height(&self) -> Result<u64, ExecError> {
        self.client
            .get_block_height()
            .await
            .map_err(|e| self.transport(e))
    }

    async fn transaction_balances(
        &self,
        signature: &Signature,
    ) -> Result<Option<TxBalanceSnapshot>, ExecError> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            commitment: Some(CommitmentConfig::confirmed()),
            max_supported_transaction_version: Some(0),
        };

        // The node answers `null` (surfaced as a decode error) until the
        // transaction is indexed; the caller polls either way.
        let tx = self
            .client
            .get_transaction_with_config(signature, config)
            .await
            .map_err(|e| self.transport(e))?;

        Ok(snapshot_from_encoded(tx))
    }

    async fn balance_lamports(&self, owner: &Pubkey) -> Result<u64, ExecError> {
        self.client
            .get_balance(owner)
            .await
            .map_err(|e| self.transport(e))
    }

    async fn token_accounts(
        &self,
        owner: &Pubkey,
        mint: &Pubkey,
    ) -> Result<Vec<TokenBalance>, ExecError> {
        let accounts = self
            .client
            .get_token_accounts_by_owner(owner, TokenAccountsFilter::Mint(*mint))
            .await
            .map_err(|e| self.transport(e))?;

        let mut balances = Vec::with_capacity(accounts.len());
        for (index, keyed) in accounts.into_iter().enumerate() {
            let account = Pubkey::from_str(&keyed.pubkey).map_err(|e| self.transport(e))?;
            let amount = self
                .client
                .get_token_account_balance(&account)
                .await
                .map_err(|e| self.transport(e))?;
            balances.push(TokenBalance {
                account_index: index,
                mint: mint.to_string(),
                owner: Some(owner.to_string()),
                ui_amount: amount.ui_amount,
                amount: amount.amount,
                decimals: amount.decimals,
            });
        }
        Ok(balances)
    }
}

fn token_balances(raw: Option<Vec<UiTransactionTokenBalance>>) -> Vec<TokenBalance> {
    raw.unwrap_or_default()
        .into_iter()
        .map(|b| {
            let owner: Option<String> = b.owner.into();
            TokenBalance {
                account_index: b.account_index as usize,
                mint: b.mint,
                owner,
                ui_amount: b.ui_token_amount.ui_amount,
                amount: b.ui_token_amount.amount,
                decimals: b.ui_token_amount.decimals,
            }
        })
        .collect()
}

fn snapshot_from_encoded(tx: EncodedConfirmedTransactionWithStatusMeta) -> Option<TxBalanceSnapshot> {
    let meta = tx.transaction.meta?;
    let decoded = tx.transaction.transaction.decode()?;

    let mut account_keys: Vec<String> = decoded
        .message
        .static_account_keys()
        .iter()
        .map(|k| k.to_string())
        .collect();
    let loaded: Option<UiLoadedAddresses> = meta.loaded_addresses.into();
    if let Some(loaded) = loaded {
        account_keys.extend(loaded.writable);
        account_keys.extend(loaded.readonly);
    }

    Some(TxBalanceSnapshot {
        account_keys,
        pre_balances: meta.pre_balances,
        post_balances: meta.post_balances,
        pre_token_balances: token_balances(meta.pre_token_balances.into()),
        post_token_balances: token_balances(meta.post_token_balances.into()),
    })
}
