//! # Proposer Service Tests

use super::*;
use crate::config::BuildMode;
use crate::domain::{
    BlockBody, BlockContents, BlockDraft, BuilderBid, ExecutionField, LocalPayload,
    SignedBeaconBlock, SignedBlockContents, SignedBuilderBid,
};
use crate::error::ErrorKind;
use crate::ports::UnblindedPayload;
use crate::test_utils::{test_pubkey, test_state, FixedTimeSource, TestHarness, TEST_GENESIS_TIME};
use shared_types::{
    gwei_to_wei, BlobsBundle, BlsSignature, Checkpoint, ExecutionPayload, KzgCommitment, KzgProof,
    SignedBlobSidecar, SyncCommittee, ValidatorRegistration, ValidatorStatus, Wei, H256,
};
use std::time::Duration;

const HEAD_ROOT: Root = H256([0x01; 32]);
const JUSTIFIED_ROOT: Root = H256([0x33; 32]);
const BID_BLOCK_HASH: H256 = H256([0x99; 32]);
const GAS_LIMIT: u64 = 30_000_000;
const HEAD_SLOT: Slot = 4;

fn slot_ms(slot: Slot) -> u64 {
    (TEST_GENESIS_TIME + slot * 6) * 1000
}

struct Fixture {
    harness: TestHarness,
    clock: Arc<FixedTimeSource>,
    service: ProposerService,
}

fn fixture_with(spec: ChainSpec, config: BlockProductionConfig, head_slot: Slot) -> Fixture {
    let harness = TestHarness::new();
    let mut state = test_state(head_slot, 16, &spec);
    state.current_justified_checkpoint = Checkpoint {
        epoch: 0,
        root: JUSTIFIED_ROOT,
    };
    harness.chain.set_head(HEAD_ROOT, state);
    harness.chain.set_highest_received_slot(head_slot);

    let clock = Arc::new(FixedTimeSource::new(slot_ms(head_slot + 1) + 100));
    let service = ProposerService::new(harness.dependencies(), config, spec)
        .with_time_source(Box::new(clock.clone()));
    Fixture {
        harness,
        clock,
        service,
    }
}

fn fixture(spec: ChainSpec) -> Fixture {
    fixture_with(spec, BlockProductionConfig::default(), HEAD_SLOT)
}

fn pre_merge_spec() -> ChainSpec {
    ChainSpec::minimal().with_fork_epochs(100, 100, 100, 100)
}

fn request(slot: Slot) -> ProduceBlockRequest {
    ProduceBlockRequest {
        slot,
        randao_reveal: vec![0x11; 96],
        graffiti: Some(b"test".to_vec()),
        ..Default::default()
    }
}

fn local_payload(value_gwei: u64, blobs: usize) -> LocalPayload {
    let blobs_bundle = (blobs > 0).then(|| BlobsBundle {
        kzg_commitments: (0..blobs).map(|i| KzgCommitment([i as u8 + 1; 48])).collect(),
        proofs: vec![KzgProof::default(); blobs],
        blobs: (0..blobs).map(|i| vec![i as u8; 4]).collect(),
    });
    LocalPayload {
        payload: ExecutionPayload {
            withdrawals: Some(Vec::new()),
            block_hash: H256::repeat_byte(0x77),
            ..Default::default()
        },
        value: gwei_to_wei(value_gwei),
        blobs_bundle,
        should_override_builder: false,
    }
}

fn builder_payload(slot: Slot) -> ExecutionPayload {
    ExecutionPayload {
        parent_hash: H256::repeat_byte(0xee),
        gas_limit: GAS_LIMIT,
        timestamp: TEST_GENESIS_TIME + slot * 6,
        transactions: vec![vec![1]],
        withdrawals: Some(Vec::new()),
        block_hash: BID_BLOCK_HASH,
        ..Default::default()
    }
}

fn arm_builder(harness: &TestHarness, slot: Slot, value_gwei: u64) {
    harness.builder.set_registration(Ok(ValidatorRegistration {
        gas_limit: GAS_LIMIT,
        ..Default::default()
    }));
    harness.builder.set_bid(Ok(SignedBuilderBid {
        message: BuilderBid {
            header: builder_payload(slot).to_header(),
            value: gwei_to_wei(value_gwei),
            version: Some(ForkName::Deneb),
            ..Default::default()
        },
        ..Default::default()
    }));
}

fn decode(produced: &ProducedBlock) -> BlockContents {
    BlockContents::decode(&produced.data).unwrap()
}

fn sign(contents: BlockContents) -> Vec<u8> {
    SignedBlockContents {
        signed_block: SignedBeaconBlock {
            message: contents.block,
            signature: BlsSignature::default(),
        },
        signed_blob_sidecars: contents
            .blob_sidecars
            .into_iter()
            .map(|message| SignedBlobSidecar {
                message,
                signature: BlsSignature::default(),
            })
            .collect(),
        signed_blinded_blob_sidecars: Vec::new(),
    }
    .encode()
    .unwrap()
}

// =============================================================================
// PRODUCE BLOCK
// =============================================================================

#[tokio::test]
async fn test_produce_phase0_block() {
    let f = fixture(pre_merge_spec());
    let produced = f
        .service
        .produce_block(request(5), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(produced.version, ForkName::Phase0);
    assert!(!produced.is_blinded);
    assert_eq!(produced.payload_value, Wei::zero());

    let contents = decode(&produced);
    let block = &contents.block;
    assert_eq!(block.slot(), 5);
    assert_eq!(block.parent_root(), HEAD_ROOT);
    assert_eq!(block.state_root(), H256::repeat_byte(0x5a));
    assert!(block.body().execution().is_none());
    assert!(block.body().sync_aggregate().is_none());

    let base = block.body().phase0();
    assert_eq!(&base.graffiti.as_bytes()[..4], b"test");
    assert_eq!(base.eth1_data.deposit_count, 64);
    assert!(f.harness.execution.requests().is_empty());
    assert_eq!(f.service.metrics().blocks_produced(), 1);
}

#[tokio::test]
async fn test_produce_deneb_block_with_local_blobs() {
    let f = fixture(ChainSpec::minimal());
    f.harness.builder.set_configured(false);
    f.harness.execution.set_payload(local_payload(10, 2));

    let produced = f
        .service
        .produce_block(request(5), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(produced.version, ForkName::Deneb);
    assert!(!produced.is_blinded);
    assert_eq!(produced.payload_value, gwei_to_wei(10));

    let contents = decode(&produced);
    let root = contents.block.canonical_root().unwrap();
    assert_eq!(contents.blob_sidecars.len(), 2);
    for (i, sidecar) in contents.blob_sidecars.iter().enumerate() {
        assert_eq!(sidecar.index, i as u64);
        assert_eq!(sidecar.block_root, root);
        assert_eq!(sidecar.slot, 5);
    }
    assert_eq!(contents.block.body().blob_kzg_commitments().map(Vec::len), Some(2));
    assert!(contents.block.body().sync_aggregate().is_some());

    let requests = f.harness.execution.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].timestamp, TEST_GENESIS_TIME + 5 * 6);
    assert_eq!(requests[0].parent_hash, H256::repeat_byte(0xee));
}

#[tokio::test]
async fn test_builder_failure_falls_back_to_local() {
    let f = fixture(ChainSpec::minimal());
    f.harness.execution.set_payload(local_payload(10, 0));

    let produced = f
        .service
        .produce_block(request(5), &CancellationToken::new())
        .await
        .unwrap();
    assert!(!produced.is_blinded);
    assert_eq!(f.harness.builder.header_calls(), 1);
    assert_eq!(f.service.metrics().builder_misses(), 1);
}

#[tokio::test]
async fn test_builder_bid_wins_produces_blinded_block() {
    let f = fixture(ChainSpec::minimal());
    f.harness.execution.set_payload(local_payload(10, 0));
    arm_builder(&f.harness, 5, 50);

    let produced = f
        .service
        .produce_block(request(5), &CancellationToken::new())
        .await
        .unwrap();
    assert!(produced.is_blinded);
    assert_eq!(produced.payload_value, gwei_to_wei(50));
    assert_eq!(f.service.metrics().builder_misses(), 0);

    let contents = decode(&produced);
    match contents.block.body().execution() {
        Some(ExecutionField::Blinded(header)) => assert_eq!(header.block_hash, BID_BLOCK_HASH),
        other => panic!("expected blinded payload, got {:?}", other),
    }
}

#[tokio::test]
async fn test_low_bid_keeps_local_payload() {
    let f = fixture(ChainSpec::minimal());
    f.harness.execution.set_payload(local_payload(100, 0));
    arm_builder(&f.harness, 5, 50);

    let produced = f
        .service
        .produce_block(request(5), &CancellationToken::new())
        .await
        .unwrap();
    assert!(!produced.is_blinded);
    assert_eq!(produced.payload_value, gwei_to_wei(100));
}

#[tokio::test]
async fn test_skip_mev_boost_never_asks_builder() {
    let f = fixture(ChainSpec::minimal());
    arm_builder(&f.harness, 5, 50);

    let mut req = request(5);
    req.skip_mev_boost = true;
    let produced = f
        .service
        .produce_block(req, &CancellationToken::new())
        .await
        .unwrap();
    assert!(!produced.is_blinded);
    assert_eq!(f.harness.builder.header_calls(), 0);
}

#[tokio::test]
async fn test_open_circuit_breaker_uses_local() {
    let f = fixture(ChainSpec::minimal());
    arm_builder(&f.harness, 5, 50);
    f.harness.chain.set_highest_received_slot(0);

    let produced = f
        .service
        .produce_block(request(5), &CancellationToken::new())
        .await
        .unwrap();
    assert!(!produced.is_blinded);
    assert_eq!(f.harness.builder.header_calls(), 0);
    assert_eq!(f.service.metrics().circuit_breaker_trips(), 1);
}

#[tokio::test]
async fn test_syncing_node_refuses_to_produce() {
    let f = fixture(pre_merge_spec());
    f.harness.chain.set_syncing(true);

    let err = f
        .service
        .produce_block(request(5), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BlockProductionError::Syncing));
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert_eq!(f.harness.chain.head_updates(), 0);
}

#[tokio::test]
async fn test_optimistic_head_blocks_post_merge_only() {
    let f = fixture(ChainSpec::minimal());
    f.harness.chain.set_optimistic(true);
    let err = f
        .service
        .produce_block(request(5), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BlockProductionError::Optimistic));

    let f = fixture(pre_merge_spec());
    f.harness.chain.set_optimistic(true);
    assert!(f
        .service
        .produce_block(request(5), &CancellationToken::new())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_production_duration_is_observed() {
    let f = fixture(pre_merge_spec());
    let before = beacon_telemetry::metrics::BLOCK_PRODUCTION_DURATION.get_sample_count();
    f.service
        .produce_block(request(5), &CancellationToken::new())
        .await
        .unwrap();
    assert!(beacon_telemetry::metrics::BLOCK_PRODUCTION_DURATION.get_sample_count() > before);
}

#[tokio::test]
async fn test_invalid_randao_is_bad_request() {
    let f = fixture(pre_merge_spec());
    let mut req = request(5);
    req.randao_reveal = vec![0; 10];

    let err = f
        .service
        .produce_block(req, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert_eq!(f.harness.chain.head_updates(), 0);
}

#[tokio::test]
async fn test_sequential_and_parallel_build_same_block() {
    let spec = ChainSpec::minimal();
    let parallel = fixture_with(spec.clone(), BlockProductionConfig::default(), HEAD_SLOT);
    let sequential = fixture_with(
        spec,
        BlockProductionConfig {
            build_mode: BuildMode::Sequential,
            ..Default::default()
        },
        HEAD_SLOT,
    );
    for f in [&parallel, &sequential] {
        f.harness.builder.set_configured(false);
        f.harness.execution.set_payload(local_payload(10, 1));
        f.harness.attestation_pool.set_items(vec![Default::default(); 3]);
    }

    let cancel = CancellationToken::new();
    let a = parallel.service.produce_block(request(5), &cancel).await.unwrap();
    let b = sequential.service.produce_block(request(5), &cancel).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(decode(&a).block.body().phase0().attestations.len(), 3);
}

#[tokio::test]
async fn test_cancelled_request_stops_at_next_suspension_point() {
    let f = fixture(pre_merge_spec());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = f.service.produce_block(request(5), &cancel).await.unwrap_err();
    assert!(matches!(err, BlockProductionError::Cancelled { stage: "update head" }));

    f.harness.transition.set_delay(Duration::from_secs(10));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });
    let err = f.service.produce_block(request(5), &cancel).await.unwrap_err();
    assert!(matches!(err, BlockProductionError::Cancelled { stage: "process slots" }));
    assert!(err.is_recoverable());
    assert_eq!(f.harness.transition.state_root_calls(), 0);
}

#[tokio::test]
async fn test_late_head_is_reorged_out() {
    let spec = pre_merge_spec();
    let f = fixture(spec.clone());
    let parent = H256::repeat_byte(0x02);
    f.harness.chain.insert_state(parent, test_state(3, 16, &spec));
    f.harness.chain.set_proposer_head(parent);

    let produced = f
        .service
        .produce_block(request(5), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(decode(&produced).block.parent_root(), parent);
    assert_eq!(f.service.metrics().late_block_reorg_attempts(), 1);
}

#[tokio::test]
async fn test_state_root_failure_is_internal() {
    let f = fixture(pre_merge_spec());
    f.harness.transition.fail_state_root(true);

    let err = f
        .service
        .produce_block(request(5), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(f.service.metrics().blocks_produced(), 0);
}

#[tokio::test]
async fn test_failing_pool_yields_empty_operations() {
    let f = fixture(pre_merge_spec());
    f.harness.attestation_pool.set_items(vec![Default::default(); 2]);
    f.harness.attestation_pool.fail_pack(true);

    let produced = f
        .service
        .produce_block(request(5), &CancellationToken::new())
        .await
        .unwrap();
    assert!(decode(&produced).block.body().phase0().attestations.is_empty());
}

// =============================================================================
// ACCEPT SIGNED BLOCK
// =============================================================================

#[tokio::test]
async fn test_accept_full_block_broadcasts_and_imports() {
    let f = fixture(ChainSpec::minimal());
    f.harness.builder.set_configured(false);
    f.harness.execution.set_payload(local_payload(10, 2));
    f.harness.attestation_pool.set_items(vec![Default::default()]);
    let cancel = CancellationToken::new();

    let contents = decode(&f.service.produce_block(request(5), &cancel).await.unwrap());
    let expected_root = contents.block.canonical_root().unwrap();
    let root = f
        .service
        .accept_signed_block(&sign(contents), &cancel)
        .await
        .unwrap();
    assert_eq!(root, expected_root);

    assert_eq!(f.harness.broadcaster.blocks().len(), 1);
    let subnets: Vec<u64> = f.harness.broadcaster.sidecars().iter().map(|(s, _)| *s).collect();
    assert_eq!(subnets, vec![0, 1]);
    assert_eq!(f.harness.blob_store.saved()[0].len(), 2);
    assert_eq!(f.harness.block_receiver.received()[0].1, root);
    assert_eq!(f.harness.attestation_pool.removed().len(), 1);

    let events = f.harness.events.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].block_root, root);
    assert_eq!(events[0].blob_count, 2);
    assert!(!events[0].was_blinded);
    assert_eq!(f.service.metrics().blocks_proposed(), 1);
}

#[tokio::test]
async fn test_sidecar_broadcast_failure_is_not_fatal() {
    let f = fixture(ChainSpec::minimal());
    f.harness.builder.set_configured(false);
    f.harness.execution.set_payload(local_payload(10, 2));
    f.harness.broadcaster.fail_sidecar(1);
    let cancel = CancellationToken::new();

    let contents = decode(&f.service.produce_block(request(5), &cancel).await.unwrap());
    f.service
        .accept_signed_block(&sign(contents), &cancel)
        .await
        .unwrap();
    assert_eq!(f.harness.broadcaster.sidecars().len(), 1);
    assert_eq!(f.harness.blob_store.saved()[0].len(), 2);
    assert_eq!(f.service.metrics().blob_broadcast_failures(), 1);
}

#[tokio::test]
async fn test_sidecars_not_saved_when_none_broadcast() {
    let f = fixture(ChainSpec::minimal());
    f.harness.builder.set_configured(false);
    f.harness.execution.set_payload(local_payload(10, 2));
    f.harness.broadcaster.fail_sidecar(0);
    f.harness.broadcaster.fail_sidecar(1);
    let cancel = CancellationToken::new();

    let contents = decode(&f.service.produce_block(request(5), &cancel).await.unwrap());
    f.service
        .accept_signed_block(&sign(contents), &cancel)
        .await
        .unwrap();
    assert!(f.harness.broadcaster.sidecars().is_empty());
    assert!(f.harness.blob_store.saved().is_empty());
    assert_eq!(f.service.metrics().blob_broadcast_failures(), 2);
    assert_eq!(f.harness.block_receiver.received().len(), 1);
}

#[tokio::test]
async fn test_accept_blinded_block_unblinds_before_broadcast() {
    let f = fixture(ChainSpec::minimal());
    f.harness.execution.set_payload(local_payload(10, 0));
    arm_builder(&f.harness, 5, 50);
    f.harness.builder.set_unblinded(Ok(UnblindedPayload {
        payload: builder_payload(5),
        blobs_bundle: None,
    }));
    let cancel = CancellationToken::new();

    let contents = decode(&f.service.produce_block(request(5), &cancel).await.unwrap());
    assert!(contents.block.is_blinded());
    let blinded_root = contents.block.canonical_root().unwrap();

    let root = f
        .service
        .accept_signed_block(&sign(contents), &cancel)
        .await
        .unwrap();
    assert_eq!(root, blinded_root);

    let broadcast = f.harness.broadcaster.blocks();
    assert!(!broadcast[0].message.is_blinded());
    match broadcast[0].message.body().execution() {
        Some(ExecutionField::Full(payload)) => assert_eq!(payload.block_hash, BID_BLOCK_HASH),
        other => panic!("expected full payload, got {:?}", other),
    }
    assert!(f.harness.events.events()[0].was_blinded);
}

#[tokio::test]
async fn test_unblind_failure_is_internal_and_broadcasts_nothing() {
    let f = fixture(ChainSpec::minimal());
    f.harness.execution.set_payload(local_payload(10, 0));
    arm_builder(&f.harness, 5, 50);
    let cancel = CancellationToken::new();

    let contents = decode(&f.service.produce_block(request(5), &cancel).await.unwrap());
    let err = f
        .service
        .accept_signed_block(&sign(contents), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(f.harness.builder.submit_calls(), 1);
    assert!(f.harness.broadcaster.blocks().is_empty());
    assert!(f.harness.block_receiver.received().is_empty());
}

#[tokio::test]
async fn test_unblinded_payload_must_match_header() {
    let f = fixture(ChainSpec::minimal());
    f.harness.execution.set_payload(local_payload(10, 0));
    arm_builder(&f.harness, 5, 50);
    let mut wrong = builder_payload(5);
    wrong.block_hash = H256::repeat_byte(0x42);
    f.harness.builder.set_unblinded(Ok(UnblindedPayload {
        payload: wrong,
        blobs_bundle: None,
    }));
    let cancel = CancellationToken::new();

    let contents = decode(&f.service.produce_block(request(5), &cancel).await.unwrap());
    let err = f
        .service
        .accept_signed_block(&sign(contents), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(f.harness.broadcaster.blocks().is_empty());
}

#[tokio::test]
async fn test_too_many_blobs_rejected_before_side_effects() {
    let spec = ChainSpec::minimal();
    let f = fixture(spec.clone());
    let contents = SignedBlockContents {
        signed_block: SignedBeaconBlock {
            message: BlockDraft::empty(5, &spec),
            signature: BlsSignature::default(),
        },
        signed_blob_sidecars: vec![SignedBlobSidecar::default(); 7],
        signed_blinded_blob_sidecars: Vec::new(),
    };

    let err = f
        .service
        .accept_signed_block(&contents.encode().unwrap(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BlockProductionError::TooManyBlobs { count: 7, max: 6 }));
    assert!(f.harness.broadcaster.blocks().is_empty());
}

#[tokio::test]
async fn test_block_fork_must_match_slot_fork() {
    let f = fixture(ChainSpec::minimal());
    // Phase0 body for a slot where every fork is active
    let contents = SignedBlockContents {
        signed_block: SignedBeaconBlock {
            message: BlockDraft::empty(5, &pre_merge_spec()),
            signature: BlsSignature::default(),
        },
        signed_blob_sidecars: Vec::new(),
        signed_blinded_blob_sidecars: Vec::new(),
    };

    let err = f
        .service
        .accept_signed_block(&contents.encode().unwrap(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BlockProductionError::InvalidRequest(_)));
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert!(f.harness.broadcaster.blocks().is_empty());
    assert!(f.harness.block_receiver.received().is_empty());
}

#[tokio::test]
async fn test_undecodable_block_is_bad_request() {
    let f = fixture(ChainSpec::minimal());
    let err = f
        .service
        .accept_signed_block(b"not a block", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BlockProductionError::Decode(_)));
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

// =============================================================================
// ATTESTATION DATA
// =============================================================================

#[tokio::test]
async fn test_attestation_data_for_head() {
    let f = fixture(pre_merge_spec());
    f.clock.set(slot_ms(HEAD_SLOT) + 1000);

    let data = f
        .service
        .get_attestation_data(HEAD_SLOT, 3, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(data.slot, HEAD_SLOT);
    assert_eq!(data.index, 3);
    assert_eq!(data.beacon_block_root, HEAD_ROOT);
    assert_eq!(data.source.root, JUSTIFIED_ROOT);
    assert_eq!(data.target, Checkpoint { epoch: 0, root: HEAD_ROOT });
    assert_eq!(f.harness.transition.process_slots_calls(), 0);
}

#[tokio::test]
async fn test_attestation_herd_computes_once() {
    let f = fixture_with(pre_merge_spec(), BlockProductionConfig::default(), 7);
    f.clock.set(slot_ms(8) + 500);
    f.harness.transition.set_delay(Duration::from_millis(20));
    let harness = f.harness;
    let service = Arc::new(f.service);

    let handles: Vec<_> = (0..8)
        .map(|index| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .get_attestation_data(8, index, &CancellationToken::new())
                    .await
            })
        })
        .collect();

    for (index, handle) in handles.into_iter().enumerate() {
        let data = handle.await.unwrap().unwrap();
        assert_eq!(data.index, index as u64);
        assert_eq!(data.target, Checkpoint { epoch: 1, root: HEAD_ROOT });
    }
    assert_eq!(harness.transition.process_slots_calls(), 1);
    assert_eq!(service.metrics().attestation_data_computations(), 1);
    assert_eq!(service.metrics().attestation_cache_hits(), 7);
}

#[tokio::test]
async fn test_attestation_slot_window() {
    let f = fixture(pre_merge_spec());
    let cancel = CancellationToken::new();

    f.clock.set(slot_ms(7));
    let err = f.service.get_attestation_data(5, 0, &cancel).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    let err = f.service.get_attestation_data(9, 0, &cancel).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    // Inside the clock disparity allowance on both edges.
    f.clock.set(slot_ms(6) + 200);
    assert!(f.service.get_attestation_data(5, 0, &cancel).await.is_ok());
    f.clock.set(slot_ms(7) - 200);
    assert!(f.service.get_attestation_data(7, 0, &cancel).await.is_ok());
}

#[tokio::test]
async fn test_attestation_for_slot_behind_head_uses_block_at_slot() {
    let spec = pre_merge_spec();
    let f = fixture_with(spec.clone(), BlockProductionConfig::default(), 10);
    let old_root = H256::repeat_byte(0x66);
    let mut head = test_state(10, 16, &spec);
    head.set_block_root(6, old_root).unwrap();
    f.harness.chain.set_head(HEAD_ROOT, head);
    f.harness.chain.insert_state(old_root, test_state(6, 16, &spec));
    f.clock.set(slot_ms(6) + 100);

    let data = f
        .service
        .get_attestation_data(6, 0, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(data.beacon_block_root, old_root);
    assert_eq!(data.target.root, old_root);
}

#[tokio::test]
async fn test_optimistic_head_leaves_cache_empty() {
    let f = fixture(pre_merge_spec());
    f.clock.set(slot_ms(HEAD_SLOT) + 100);
    f.harness.chain.set_optimistic(true);

    let err = f
        .service
        .get_attestation_data(HEAD_SLOT, 0, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BlockProductionError::Optimistic));
    assert_eq!(f.service.attestation_cache().cached_slot().await, None);
}

// =============================================================================
// SYNC COMMITTEE
// =============================================================================

#[tokio::test]
async fn test_register_subnets_is_idempotent() {
    let f = fixture(pre_merge_spec());
    let pubkey = test_pubkey(3);
    let mut pubkeys = vec![test_pubkey(0); 32];
    pubkeys[0] = pubkey;
    pubkeys[9] = pubkey;
    let registration = SyncSubnetRegistration {
        current_epoch: 0,
        period: 0,
        pubkey,
        committee: SyncCommittee {
            pubkeys,
            ..Default::default()
        },
        status: ValidatorStatus::Active,
    };

    match f.service.register_sync_subnets(&registration) {
        RegistrationOutcome::Registered(sub) => assert_eq!(sub.subnets, vec![0, 1]),
        other => panic!("expected registration, got {:?}", other),
    }
    assert_eq!(
        f.service.register_sync_subnets(&registration),
        RegistrationOutcome::AlreadySubscribed
    );
    assert_eq!(f.service.metrics().sync_subnet_registrations(), 1);
}

#[tokio::test]
async fn test_submit_subscriptions_stores_subnets() {
    let spec = pre_merge_spec();
    let f = fixture(spec.clone());
    f.clock.set(slot_ms(9));

    f.service
        .submit_sync_committee_subscriptions(vec![SyncCommitteeSubscription {
            validator_index: 2,
            sync_committee_indices: vec![1, 9, 10],
            until_epoch: 8,
        }])
        .await
        .unwrap();

    let stored = f.service.sync_subnets().subnets_for(&test_pubkey(2), 0).unwrap();
    assert_eq!(stored.subnets, vec![0, 1]);
    assert_eq!(stored.expires_at_ms, slot_ms(9) + 8 * spec.epoch_duration_ms());
}

#[tokio::test]
async fn test_invalid_subscription_rejects_whole_batch() {
    let f = fixture(pre_merge_spec());
    f.clock.set(slot_ms(9));
    let valid = SyncCommitteeSubscription {
        validator_index: 2,
        sync_committee_indices: vec![1],
        until_epoch: 8,
    };
    let invalid = [
        SyncCommitteeSubscription {
            until_epoch: 17,
            ..valid.clone()
        },
        SyncCommitteeSubscription {
            until_epoch: 1,
            ..valid.clone()
        },
        SyncCommitteeSubscription {
            validator_index: 99,
            ..valid.clone()
        },
    ];

    for bad in invalid {
        let err = f
            .service
            .submit_sync_committee_subscriptions(vec![valid.clone(), bad])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }
    assert!(f.service.sync_subnets().is_empty());

    let err = f
        .service
        .submit_sync_committee_subscriptions(Vec::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[tokio::test]
async fn test_exited_validator_cannot_subscribe() {
    let spec = pre_merge_spec();
    let f = fixture(spec.clone());
    f.clock.set(slot_ms(9));
    let mut state = test_state(HEAD_SLOT, 16, &spec);
    state.validators[2].status = ValidatorStatus::Exited;
    f.harness.chain.set_head(HEAD_ROOT, state);

    let err = f
        .service
        .submit_sync_committee_subscriptions(vec![SyncCommitteeSubscription {
            validator_index: 2,
            sync_committee_indices: vec![1],
            until_epoch: 8,
        }])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}
