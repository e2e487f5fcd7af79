use serde::{Deserialize, Serialize};

/// Metadata carried by a new-token detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub mint: String,
    pub creator: String,
    pub decimals: u8,
    pub freeze_authority: Option<String>,
    pub mint_authority: Option<String>,
}

impl TokenInfo {
    /// Placeholder used when trades arrive for a mint we never saw created.
    pub fn unknown(mint: &str) -> Self {
        Self {
            mint: mint.to_string(),
            creator: "unknown".into(),
            decimals: 6,
            freeze_authority: None,
            mint_authority: None,
        }
    }
}
