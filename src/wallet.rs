use solana_sdk::signature::{read_keypair_file, Keypair};
use solana_sdk::signer::Signer;

use crate::config::AppConfig;

/// Decode a base58-encoded 64-byte secret key.
pub fn keypair_from_base58(encoded: &str) -> anyhow::Result<Keypair> {
    let bytes = bs58::decode(encoded.trim())
        .into_vec()
        .map_err(|e| anyhow::anyhow!("KEYPAIR_B58 is not valid base58: {e}"))?;
    if bytes.len() != 64 {
        anyhow::bail!("KEYPAIR_B58 must decode to 64 bytes, got {}", bytes.len());
    }
    Keypair::from_bytes(&bytes).map_err(|e| anyhow::anyhow!("KEYPAIR_B58 is not a valid keypair: {e}"))
}

/// Load the trading keypair: `KEYPAIR_B58` first, then `KEYPAIR_PATH`.
///
/// Live mode without a configured keypair is an error. Dry-run falls back
/// to an ephemeral keypair that never holds funds.
pub fn load_keypair(config: &AppConfig) -> anyhow::Result<Keypair> {
    let loaded = if let Some(encoded) = &config.keypair_b58 {
        Some(keypair_from_base58(encoded)?)
    } else if let Some(path) = &config.keypair_path {
        let kp = read_keypair_file(path)
            .map_err(|e| anyhow::anyhow!("failed to read keypair file {path}: {e}"))?;
        Some(kp)
    } else {
        None
    };

    match loaded {
        Some(kp) => {
            tracing::info!(wallet = %kp.pubkey(), "Wallet loaded");
            Ok(kp)
        }
        None if config.is_live() => {
            anyhow::bail!("live trading requires KEYPAIR_B58 or KEYPAIR_PATH")
        }
        None => {
            let kp = Keypair::new();
            tracing::warn!(wallet = %kp.pubkey(), "No keypair configured, using ephemeral dry-run wallet");
            Ok(kp)
        }
    }
}
