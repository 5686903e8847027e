use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_DIFFICULTY, DEFAULT_GAS_FEE, DEFAULT_MINING_REWARD, HASH_HEX_SIZE};
use crate::error::{LedgerError, Result};

/// Economic and consensus parameters of one ledger instance.
///
/// Every peer in a run is expected to share these values: fork choice compares
/// chain length only, which is a fair proxy for work only while difficulty is
/// uniform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Amount minted to the miner of each block, before fees.
    pub mining_reward: u64,
    /// Fee stamped on every accepted transaction and paid to the miner.
    pub gas_fee: u64,
    /// Leading zero hex digits required of mined blocks.
    pub difficulty: usize,
    /// Re-check hash, index and proof-of-work of blocks and chains received
    /// from peers instead of trusting linkage alone.
    pub verify_external_blocks: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            mining_reward: DEFAULT_MINING_REWARD,
            gas_fee: DEFAULT_GAS_FEE,
            difficulty: DEFAULT_DIFFICULTY,
            verify_external_blocks: true,
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.difficulty > HASH_HEX_SIZE {
            return Err(LedgerError::Config(format!(
                "difficulty {} exceeds the {HASH_HEX_SIZE} characters of a hash",
                self.difficulty
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = LedgerConfig::default();
        assert_eq!(cfg.mining_reward, 10);
        assert_eq!(cfg.gas_fee, 3);
        assert!(cfg.verify_external_blocks);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_unreachable_difficulty() {
        let cfg = LedgerConfig {
            difficulty: HASH_HEX_SIZE + 1,
            ..LedgerConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(LedgerError::Config(_))));
    }

    #[test]
    fn zero_reward_and_fee_are_allowed() {
        let cfg = LedgerConfig {
            mining_reward: 0,
            gas_fee: 0,
            ..LedgerConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: LedgerConfig = serde_json::from_str(r#"{"difficulty":1}"#).unwrap();
        assert_eq!(cfg.difficulty, 1);
        assert_eq!(cfg.gas_fee, DEFAULT_GAS_FEE);
    }
}
