//! # Block Production Benchmarks
//!
//! Hot paths a proposer or attester hits every slot:
//!
//! | Path | Called | Target |
//! |------|--------|--------|
//! | Payload selection | once per proposal | < 10us |
//! | Attestation data cache hit | once per committee per slot | < 5us |
//! | Sync subnet registration | once per validator per epoch | < 10us |
//! | ProduceBlock (mocked collaborators) | once per proposal | < 5ms |

use block_production::domain::{
    select_payload, BuilderBid, LocalPayload, SelectionPolicy, SyncSubnetRegistration,
};
use block_production::test_utils::{
    test_pubkey, test_state, FixedTimeSource, TestHarness, TEST_GENESIS_TIME,
};
use block_production::{
    AttestationCacheEntry, AttestationDataCache, BlockProductionConfig, BuildMode, ForkName,
    ProduceBlockRequest, ProposerApi, ProposerService, SyncSubnetRegistry,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use primitive_types::H256;
use shared_types::{
    gwei_to_wei, ChainSpec, Checkpoint, ExecutionPayload, SyncCommittee, ValidatorStatus,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Payload selection
// ============================================================================

fn bench_payload_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("payload-selection");

    let payload = ExecutionPayload {
        withdrawals: Some(Vec::new()),
        transactions: vec![vec![0xab; 128]; 64],
        ..Default::default()
    };
    let local = LocalPayload {
        payload: payload.clone(),
        value: gwei_to_wei(40_000),
        ..Default::default()
    };
    let bid = BuilderBid {
        header: payload.to_header(),
        value: gwei_to_wei(90_000),
        version: Some(ForkName::Deneb),
        ..Default::default()
    };
    let policy = SelectionPolicy::default();

    group.bench_function("builder_wins", |b| {
        b.iter(|| black_box(select_payload(ForkName::Deneb, &local, Some(&bid), &policy)))
    });
    group.bench_function("no_bid", |b| {
        b.iter(|| black_box(select_payload(ForkName::Deneb, &local, None, &policy)))
    });

    group.finish();
}

// ============================================================================
// Attestation data cache
// ============================================================================

fn bench_attestation_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("attestation-data-cache");
    let runtime = tokio::runtime::Runtime::new().unwrap();

    let cache = AttestationDataCache::new();
    let entry = AttestationCacheEntry {
        slot: 42,
        head_root: H256::repeat_byte(0x01),
        source: Checkpoint::default(),
        target: Checkpoint {
            epoch: 5,
            root: H256::repeat_byte(0x02),
        },
    };
    runtime
        .block_on(cache.get_or_compute(42, || async { Ok(entry.clone()) }))
        .unwrap();

    group.bench_function("hit", |b| {
        b.to_async(&runtime).iter(|| async {
            let (entry, _) = cache
                .get_or_compute(42, || async { Ok(entry.clone()) })
                .await
                .unwrap();
            black_box(entry.to_attestation_data(3))
        })
    });

    group.finish();
}

// ============================================================================
// Sync subnet registry
// ============================================================================

fn bench_sync_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("sync-subnet-registry");
    let spec = ChainSpec::minimal();

    for validators in [16u64, 128, 512] {
        let committee = SyncCommittee {
            pubkeys: (0..spec.sync_committee_size).map(test_pubkey).collect(),
            ..Default::default()
        };
        let registrations: Vec<SyncSubnetRegistration> = (0..validators)
            .map(|index| SyncSubnetRegistration {
                current_epoch: 0,
                period: 0,
                pubkey: test_pubkey(index),
                committee: committee.clone(),
                status: ValidatorStatus::Active,
            })
            .collect();

        group.throughput(Throughput::Elements(validators));
        group.bench_with_input(
            BenchmarkId::new("register_fresh", validators),
            &registrations,
            |b, registrations| {
                b.iter(|| {
                    let registry = SyncSubnetRegistry::new(spec.clone());
                    for registration in registrations {
                        black_box(registry.register(registration, 1_000));
                    }
                    black_box(registry.active_subnets(1_000))
                })
            },
        );
    }

    group.finish();
}

// ============================================================================
// ProduceBlock end to end
// ============================================================================

fn bench_produce_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("produce-block");
    group.measurement_time(Duration::from_secs(10));
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let spec = ChainSpec::minimal();

    for mode in [BuildMode::Sequential, BuildMode::Parallel] {
        let harness = TestHarness::new();
        harness.builder.set_configured(false);
        harness
            .chain
            .set_head(H256::repeat_byte(0x01), test_state(20, 64, &spec));
        harness.chain.set_highest_received_slot(20);
        let config = BlockProductionConfig {
            build_mode: mode,
            ..Default::default()
        };
        let service = ProposerService::new(harness.dependencies(), config, spec.clone())
            .with_time_source(Box::new(FixedTimeSource::new(
                (TEST_GENESIS_TIME + 21 * 6) * 1000 + 100,
            )));

        group.bench_function(BenchmarkId::new("local_payload", format!("{:?}", mode)), |b| {
            b.to_async(&runtime).iter(|| async {
                let request = ProduceBlockRequest {
                    slot: 21,
                    randao_reveal: vec![0x11; 96],
                    ..Default::default()
                };
                black_box(
                    service
                        .produce_block(request, &CancellationToken::new())
                        .await
                        .unwrap(),
                )
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_payload_selection,
    bench_attestation_cache,
    bench_sync_registry,
    bench_produce_block,
);
criterion_main!(benches);
