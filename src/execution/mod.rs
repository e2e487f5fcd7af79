pub mod adapter;
pub mod admission;
pub mod cooldown;
pub mod fills;
pub mod position_book;
pub mod position_machine;
pub mod position_sizer;
pub mod risk_manager;
pub mod rpc;
pub mod tx_engine;

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::signature::Keypair;

use crate::ingestion::market_state::MarketState;
use crate::services::notifier::Notifier;

pub use adapter::{BuyParams, ExecutionAdapter, PumpPortalAdapter, SellAmount, SellParams};
pub use admission::{AdmissionConfig, EntryGate, EntryOutcome, EntryPipeline};
pub use position_book::{PositionBook, SharedPosition};
pub use position_machine::{PositionMachine, TransitionError, TransitionMeta};
pub use risk_manager::{AdmissionReject, RiskLimits};
pub use rpc::{RpcEndpoint, SolanaRpcEndpoint};
pub use tx_engine::{EngineConfig, ExecError, TransactionEngine};

/// Collaborators shared by the entry pipeline and the exit manager.
#[derive(Clone)]
pub struct TradingContext {
    pub book: PositionBook,
    pub market: Arc<MarketState>,
    pub machine: Arc<PositionMachine>,
    pub engine: Arc<TransactionEngine>,
    pub adapter: Arc<dyn ExecutionAdapter>,
    pub payer: Arc<Keypair>,
    pub notifier: Option<Arc<Notifier>>,
    /// Submit real transactions. When false, fills are simulated.
    pub live: bool,
    pub fill_max_wait: Duration,
}
