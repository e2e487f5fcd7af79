pub mod risk;
pub mod strategy;

pub use risk::{RiskCheck, RiskContext, RiskEngine};
pub use strategy::{LaunchMomentum, PullbackReclaim, Strategy, StrategyContext, StrategyEngine};
