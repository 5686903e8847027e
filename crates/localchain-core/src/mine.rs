use crate::{constants::MINING_BATCH_SIZE, pow, Block};
use tracing::{debug, info};

/// Mines `block` until its hash carries `difficulty` leading zero digits.
///
/// The search runs in batches of [`MINING_BATCH_SIZE`] attempts. After each
/// unsuccessful batch the current nonce is handed to `on_progress` and the
/// task yields to the runtime, so other work on the same executor keeps
/// running. There is no timeout: the future completes only when a qualifying
/// nonce is found, or when the task driving it is aborted.
pub async fn mine_block<F>(mut block: Block, difficulty: usize, mut on_progress: F) -> Block
where
    F: FnMut(u64),
{
    while !pow::search(&mut block, difficulty, MINING_BATCH_SIZE) {
        debug!(index = block.index, nonce = block.nonce, "mining");
        on_progress(block.nonce);
        tokio::task::yield_now().await;
    }

    info!(
        "Mined block {} with nonce {} and hash {}",
        block.index, block.nonce, block.hash
    );
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Payload, Transaction};

    fn candidate() -> Block {
        Block::new(
            1,
            1_600_000_000_000,
            Payload::Transactions(vec![Transaction::reward("miner", 10, "Mining reward")]),
            "prev",
        )
    }

    #[tokio::test]
    async fn mines_to_requested_difficulty() {
        let mined = mine_block(candidate(), 3, |_| {}).await;
        assert!(mined.hash.starts_with("000"));
        assert!(mined.is_intact());
    }

    #[tokio::test]
    async fn matches_blocking_search() {
        let mined = mine_block(candidate(), 2, |_| {}).await;
        let reference = pow::mine_blocking(candidate(), 2);
        assert_eq!(mined, reference);
    }

    #[tokio::test]
    async fn reports_progress_in_batches() {
        let mut reports = Vec::new();
        let mined = mine_block(candidate(), 4, |nonce| reports.push(nonce)).await;
        // a batch ending exactly on the winning nonce succeeds without a report
        assert_eq!(
            reports.len() as u64,
            mined.nonce.saturating_sub(1) / MINING_BATCH_SIZE
        );
        for (i, nonce) in reports.iter().enumerate() {
            assert_eq!(*nonce, (i as u64 + 1) * MINING_BATCH_SIZE);
        }
    }

    #[tokio::test]
    async fn difficulty_zero_never_reports() {
        let mut reports = 0;
        let mined = mine_block(candidate(), 0, |_| reports += 1).await;
        assert_eq!(mined.nonce, 0);
        assert_eq!(reports, 0);
    }
}
