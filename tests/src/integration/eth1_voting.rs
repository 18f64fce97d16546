//! # Eth1 Voting
//!
//! Checks the eth1 vote that ends up in produced blocks when the node sees a
//! populated eth1 chain. The oracle is exercised through `ProduceBlock` so
//! the state it votes on is the one advanced to the proposal slot.
//!
//! Minimal preset timing used below:
//!
//! ```text
//! slot 96 -> voting period start  G + 576
//! follow distance 16 * 14s        224s
//! window                          [G + 128, G + 352]
//! eth1 block n at                 G + 14n   -> last block in window is 25
//! ```

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use block_production::domain::BlockBody;
    use block_production::ports::Eth1BlockHeader;
    use block_production::test_utils::{
        test_state, FixedTimeSource, MockEth1Fetcher, TestHarness, TEST_GENESIS_TIME,
    };
    use block_production::{
        BlockContents, BlockProductionConfig, ProduceBlockRequest, ProposerApi, ProposerService,
    };
    use primitive_types::H256;
    use shared_types::{ChainSpec, Eth1Data};
    use tokio_util::sync::CancellationToken;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    const DUTY_SLOT: u64 = 96;
    const LAST_BLOCK_IN_WINDOW: u64 = 25;
    const HEAD_DEPOSITS: u64 = 64;

    fn deposit_root() -> H256 {
        H256::repeat_byte(0x5d)
    }

    fn eth1_chain(genesis_time: u64) -> Arc<MockEth1Fetcher> {
        let blocks = (0..=40u64)
            .map(|n| Eth1BlockHeader {
                number: n,
                timestamp: genesis_time + n * 14,
            })
            .collect();
        Arc::new(MockEth1Fetcher::new(genesis_time, blocks))
    }

    fn harness() -> TestHarness {
        let mut harness = TestHarness::new();
        harness.eth1 = eth1_chain(TEST_GENESIS_TIME);
        harness.builder.set_configured(false);
        harness
    }

    /// Produce a block at `slot` on a head one slot earlier; return its eth1 vote.
    async fn vote_in_block(harness: &TestHarness, config: BlockProductionConfig, slot: u64) -> Eth1Data {
        let spec = ChainSpec::minimal();
        harness
            .chain
            .set_head(H256::repeat_byte(0x01), test_state(slot - 1, 16, &spec));
        harness.chain.set_highest_received_slot(slot - 1);
        let clock = FixedTimeSource::new((TEST_GENESIS_TIME + slot * 6) * 1000 + 100);
        let service = ProposerService::new(harness.dependencies(), config, spec)
            .with_time_source(Box::new(clock));

        let request = ProduceBlockRequest {
            slot,
            randao_reveal: vec![0x11; 96],
            ..Default::default()
        };
        let produced = service
            .produce_block(request, &CancellationToken::new())
            .await
            .unwrap();
        let contents = BlockContents::decode(&produced.data).unwrap();
        contents.block.body().phase0().eth1_data.clone()
    }

    // =============================================================================
    // INTEGRATION TESTS
    // =============================================================================

    #[tokio::test]
    async fn test_vote_follows_deposits_at_last_block_in_window() {
        let harness = harness();
        harness.deposits.set_at_height(20, 80, deposit_root());
        // Deposits after the window must not leak into the vote.
        harness.deposits.set_at_height(30, 120, H256::repeat_byte(0x77));

        let vote = vote_in_block(&harness, BlockProductionConfig::default(), DUTY_SLOT).await;

        assert_eq!(
            vote,
            Eth1Data {
                deposit_root: deposit_root(),
                deposit_count: 80,
                block_hash: MockEth1Fetcher::hash_of(LAST_BLOCK_IN_WINDOW),
            }
        );
    }

    #[tokio::test]
    async fn test_vote_never_lowers_deposit_count() {
        let harness = harness();
        harness.deposits.set_at_height(10, HEAD_DEPOSITS - 14, deposit_root());

        let vote = vote_in_block(&harness, BlockProductionConfig::default(), DUTY_SLOT).await;

        let head = test_state(DUTY_SLOT, 16, &ChainSpec::minimal()).eth1_data;
        assert_eq!(vote, head);
    }

    #[tokio::test]
    async fn test_no_deposits_votes_chain_start() {
        let harness = harness();
        let chain_start = Eth1Data {
            deposit_root: H256::repeat_byte(0xc5),
            deposit_count: HEAD_DEPOSITS,
            block_hash: H256::repeat_byte(0xc6),
        };
        harness.deposits.set_chain_start(chain_start.clone());

        let vote = vote_in_block(&harness, BlockProductionConfig::default(), DUTY_SLOT).await;
        assert_eq!(vote, chain_start);
    }

    #[tokio::test]
    async fn test_no_deposits_keeps_head_when_chain_start_is_behind() {
        let harness = harness();
        harness.deposits.set_chain_start(Eth1Data {
            deposit_root: H256::repeat_byte(0xc5),
            deposit_count: 0,
            block_hash: H256::repeat_byte(0xc6),
        });

        let vote = vote_in_block(&harness, BlockProductionConfig::default(), DUTY_SLOT).await;

        let head = test_state(DUTY_SLOT, 16, &ChainSpec::minimal()).eth1_data;
        assert_eq!(vote, head);
    }

    #[tokio::test]
    async fn test_offline_eth1_still_produces_block() {
        let harness = harness();
        harness.eth1.set_connected(false);
        harness.deposits.set_at_height(20, 80, deposit_root());

        let vote = vote_in_block(&harness, BlockProductionConfig::default(), DUTY_SLOT).await;

        assert_eq!(vote.deposit_count, HEAD_DEPOSITS);
        assert_ne!(vote.deposit_root, deposit_root());
        assert_eq!(harness.block_receiver.received().len(), 0);
    }

    #[tokio::test]
    async fn test_window_before_time_zero_votes_head_data() {
        let mut harness = harness();
        // An eth1 genesis this early puts the window start below zero.
        harness.eth1 = eth1_chain(100);

        let vote = vote_in_block(&harness, BlockProductionConfig::default(), 1).await;

        let head = test_state(0, 16, &ChainSpec::minimal()).eth1_data;
        assert_eq!(vote, head);
        assert_ne!(vote.block_hash, H256::zero());
    }

    #[tokio::test]
    async fn test_mock_votes_agree_across_nodes() {
        let mut config = BlockProductionConfig::default();
        config.eth1.mock_votes = true;

        let first = vote_in_block(&harness(), config.clone(), DUTY_SLOT).await;
        let second = vote_in_block(&harness(), config, DUTY_SLOT).await;

        assert_eq!(first, second);
        assert_eq!(first.deposit_count, HEAD_DEPOSITS);
    }
}
