pub mod dedupe;
pub mod feed;
pub mod market_state;
pub mod pipeline;

pub use feed::{run_feed, FeedEvent, FeedParser};
pub use market_state::MarketState;
pub use pipeline::EventPipeline;
