pub mod exit_manager;
pub mod notifier;
pub mod status;
pub mod sweeper;

pub use exit_manager::{ExitConfig, ExitManager};
pub use notifier::Notifier;
pub use status::{StatusProvider, StatusSnapshot};
pub use sweeper::{SweepConfig, SweepStats, Sweeper};
