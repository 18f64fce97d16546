//! # Validator Duties
//!
//! Non-proposal duties a validator client drives in the same slot:
//! attestation data for every committee, sync committee subnet registration
//! from the node's own duty tracking, and explicit subscriptions from the
//! validator client. Both subnet paths write into one registry, so the node
//! ends up listening on the union.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use block_production::test_utils::{
        test_pubkey, test_state, FixedTimeSource, TestHarness, TEST_GENESIS_TIME,
    };
    use block_production::{
        BlockProductionConfig, ProposerApi, ProposerService, RegistrationOutcome,
        SyncCommitteeSubscription, SyncSubnetRegistration,
    };
    use primitive_types::H256;
    use shared_types::{ChainSpec, Checkpoint, SyncCommittee, ValidatorStatus};
    use tokio_util::sync::CancellationToken;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    // Minimal preset: 8 slots per epoch, 8 epochs per sync period, subcommittees of 8.
    const HEAD_SLOT: u64 = 12;
    const CURRENT_EPOCH: u64 = 1;

    fn head_root() -> H256 {
        H256::repeat_byte(0x01)
    }

    fn epoch_boundary_root() -> H256 {
        H256::repeat_byte(0x08)
    }

    fn justified() -> Checkpoint {
        Checkpoint {
            epoch: 0,
            root: H256::repeat_byte(0x33),
        }
    }

    fn now_ms() -> u64 {
        (TEST_GENESIS_TIME + HEAD_SLOT * 6) * 1000 + 500
    }

    fn node() -> (TestHarness, Arc<ProposerService>) {
        let spec = ChainSpec::minimal();
        let harness = TestHarness::new();
        let mut state = test_state(HEAD_SLOT, 32, &spec);
        state.current_justified_checkpoint = justified();
        state.set_block_root(8, epoch_boundary_root()).unwrap();
        harness.chain.set_head(head_root(), state);
        harness.chain.set_highest_received_slot(HEAD_SLOT);

        let service = ProposerService::new(harness.dependencies(), BlockProductionConfig::default(), spec)
            .with_time_source(Box::new(FixedTimeSource::new(now_ms())));
        (harness, Arc::new(service))
    }

    fn committee_with(holder: u64, positions: &[usize]) -> SyncCommittee {
        let mut pubkeys = vec![test_pubkey(31); 32];
        for &position in positions {
            pubkeys[position] = test_pubkey(holder);
        }
        SyncCommittee {
            pubkeys,
            ..Default::default()
        }
    }

    // =============================================================================
    // INTEGRATION TESTS
    // =============================================================================

    #[tokio::test]
    async fn test_all_committees_share_one_computation() {
        let (harness, service) = node();
        let api: Arc<dyn ProposerApi> = service.clone();
        let cancel = CancellationToken::new();

        for committee_index in 0..4 {
            let data = api
                .get_attestation_data(HEAD_SLOT, committee_index, &cancel)
                .await
                .unwrap();
            assert_eq!(data.index, committee_index);
            assert_eq!(data.beacon_block_root, head_root());
            assert_eq!(data.source, justified());
            assert_eq!(
                data.target,
                Checkpoint {
                    epoch: CURRENT_EPOCH,
                    root: epoch_boundary_root(),
                }
            );
        }

        assert_eq!(service.metrics().attestation_data_computations(), 1);
        assert_eq!(service.metrics().attestation_cache_hits(), 3);
        assert_eq!(harness.transition.process_slots_calls(), 0);
    }

    #[tokio::test]
    async fn test_subnet_paths_merge_into_one_registry() {
        let (_harness, service) = node();
        let api: Arc<dyn ProposerApi> = service.clone();

        // Duty tracking: validator 5 holds positions 8 and 12 of the current committee.
        let registration = SyncSubnetRegistration {
            current_epoch: CURRENT_EPOCH,
            period: 0,
            pubkey: test_pubkey(5),
            committee: committee_with(5, &[8, 12]),
            status: ValidatorStatus::Active,
        };
        match api.register_sync_subnets(&registration) {
            RegistrationOutcome::Registered(sub) => assert_eq!(sub.subnets, vec![1]),
            other => panic!("expected registration, got {:?}", other),
        }

        // Validator client: validator 3 subscribes for positions 0, 17 and 31.
        api.submit_sync_committee_subscriptions(vec![SyncCommitteeSubscription {
            validator_index: 3,
            sync_committee_indices: vec![0, 17, 31],
            until_epoch: 10,
        }])
        .await
        .unwrap();

        let active: Vec<u64> = service.sync_subnets().active_subnets(now_ms()).into_iter().collect();
        assert_eq!(active, vec![0, 1, 2, 3]);

        let submitted = service.sync_subnets().subnets_for(&test_pubkey(3), 0).unwrap();
        let epoch_ms = ChainSpec::minimal().epoch_duration_ms();
        assert_eq!(submitted.expires_at_ms, now_ms() + 10 * epoch_ms);

        // The registered entry runs to the end of period 0 (epoch 8).
        let registered = service.sync_subnets().subnets_for(&test_pubkey(5), 0).unwrap();
        assert_eq!(registered.expires_at_ms, now_ms() + 7 * epoch_ms);
        assert!(service.sync_subnets().active_subnets(now_ms() + 7 * epoch_ms).contains(&0));
        assert!(!service.sync_subnets().active_subnets(now_ms() + 7 * epoch_ms).contains(&1));
    }

    #[tokio::test]
    async fn test_next_period_registration_waits() {
        let (_harness, service) = node();

        let registration = SyncSubnetRegistration {
            current_epoch: CURRENT_EPOCH,
            period: 1,
            pubkey: test_pubkey(6),
            committee: committee_with(6, &[24]),
            status: ValidatorStatus::Active,
        };
        assert_eq!(
            service.register_sync_subnets(&registration),
            RegistrationOutcome::Deferred
        );
        assert!(service.sync_subnets().is_empty());

        // Four epochs before the period starts, the node may subscribe.
        let registration = SyncSubnetRegistration {
            current_epoch: 4,
            ..registration
        };
        match service.register_sync_subnets(&registration) {
            RegistrationOutcome::Registered(sub) => {
                assert_eq!(sub.period_start_epoch, 8);
                assert_eq!(sub.subnets, vec![3]);
            }
            other => panic!("expected registration, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_syncing_node_refuses_duties() {
        let (harness, service) = node();
        harness.chain.set_syncing(true);

        assert!(service
            .get_attestation_data(HEAD_SLOT, 0, &CancellationToken::new())
            .await
            .is_err());
        assert!(service
            .submit_sync_committee_subscriptions(vec![SyncCommitteeSubscription {
                validator_index: 3,
                sync_committee_indices: vec![0],
                until_epoch: 4,
            }])
            .await
            .is_err());
        assert!(service.sync_subnets().is_empty());
        assert_eq!(harness.chain.head_state_reads(), 0);
    }
}
