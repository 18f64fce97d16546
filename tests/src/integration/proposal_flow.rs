//! # Proposal Flow
//!
//! Drives a proposer through the validator-client API only:
//!
//! 1. **ProduceBlock**: unsigned block contents for the duty slot
//! 2. **Sign**: the validator client signs block and sidecars (zero signatures here)
//! 3. **AcceptSignedBlock**: unblind if needed, gossip, store blobs, import
//!
//! Both payload paths are covered: a local Deneb payload with blobs and a
//! builder payload whose blobs are revealed only after signing.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use block_production::domain::{BlockBody, BuilderBid, LocalPayload, SignedBuilderBid};
    use block_production::ports::UnblindedPayload;
    use block_production::test_utils::{test_state, FixedTimeSource, TestHarness, TEST_GENESIS_TIME};
    use block_production::{
        BlockContents, BlockProductionConfig, ForkName, ProduceBlockRequest, ProposerApi,
        ProposerService, SignedBeaconBlock, SignedBlockContents,
    };
    use primitive_types::H256;
    use shared_types::{
        blob_root, gwei_to_wei, BlindedBlobsBundle, BlobsBundle, BlsSignature, ChainSpec,
        ExecutionPayload, KzgCommitment, KzgProof, SignedBlindedBlobSidecar, SignedBlobSidecar,
        ValidatorRegistration,
    };
    use tokio_util::sync::CancellationToken;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    const HEAD_SLOT: u64 = 20;
    const DUTY_SLOT: u64 = 21;
    const GAS_LIMIT: u64 = 30_000_000;

    fn blobs() -> Vec<Vec<u8>> {
        vec![vec![0xa1; 64], vec![0xb2; 64], vec![0xc3; 64]]
    }

    fn commitments() -> Vec<KzgCommitment> {
        (1..=3).map(|i| KzgCommitment([i; 48])).collect()
    }

    /// Harness with a head at `HEAD_SLOT` and a clock inside the duty slot.
    fn proposer(harness: &TestHarness) -> Arc<dyn ProposerApi> {
        let spec = ChainSpec::minimal();
        harness
            .chain
            .set_head(H256::repeat_byte(0x01), test_state(HEAD_SLOT, 64, &spec));
        harness.chain.set_highest_received_slot(HEAD_SLOT);
        let clock = FixedTimeSource::new((TEST_GENESIS_TIME + DUTY_SLOT * 6) * 1000 + 250);
        Arc::new(
            ProposerService::new(harness.dependencies(), BlockProductionConfig::default(), spec)
                .with_time_source(Box::new(clock)),
        )
    }

    fn duty_request() -> ProduceBlockRequest {
        ProduceBlockRequest {
            slot: DUTY_SLOT,
            randao_reveal: vec![0x42; 96],
            graffiti: Some(b"integration".to_vec()),
            ..Default::default()
        }
    }

    fn builder_payload() -> ExecutionPayload {
        ExecutionPayload {
            parent_hash: H256::repeat_byte(0xee),
            gas_limit: GAS_LIMIT,
            timestamp: TEST_GENESIS_TIME + DUTY_SLOT * 6,
            transactions: vec![vec![0xde, 0xad]],
            withdrawals: Some(Vec::new()),
            block_hash: H256::repeat_byte(0xbb),
            ..Default::default()
        }
    }

    /// Validator client: sign whatever the node handed out.
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
            signed_blinded_blob_sidecars: contents
                .blinded_blob_sidecars
                .into_iter()
                .map(|message| SignedBlindedBlobSidecar {
                    message,
                    signature: BlsSignature::default(),
                })
                .collect(),
        }
        .encode()
        .unwrap()
    }

    // =============================================================================
    // INTEGRATION TESTS
    // =============================================================================

    #[tokio::test]
    async fn test_local_payload_round_trip() {
        let harness = TestHarness::new();
        harness.builder.set_configured(false);
        harness.execution.set_payload(LocalPayload {
            payload: ExecutionPayload {
                withdrawals: Some(Vec::new()),
                ..Default::default()
            },
            value: gwei_to_wei(25),
            blobs_bundle: Some(BlobsBundle {
                kzg_commitments: commitments(),
                proofs: vec![KzgProof::default(); 3],
                blobs: blobs(),
            }),
            should_override_builder: false,
        });
        let api = proposer(&harness);
        let cancel = CancellationToken::new();

        let produced = api.produce_block(duty_request(), &cancel).await.unwrap();
        assert_eq!(produced.version, ForkName::Deneb);
        assert!(!produced.is_blinded);

        let contents = BlockContents::decode(&produced.data).unwrap();
        assert_eq!(contents.blob_sidecars.len(), 3);
        let expected_root = contents.block.canonical_root().unwrap();

        let root = api.accept_signed_block(&sign(contents), &cancel).await.unwrap();
        assert_eq!(root, expected_root);

        let gossiped: Vec<u64> = harness
            .broadcaster
            .sidecars()
            .iter()
            .map(|(subnet, sidecar)| {
                assert_eq!(sidecar.message.block_root, root);
                *subnet
            })
            .collect();
        assert_eq!(gossiped, vec![0, 1, 2]);
        assert_eq!(harness.blob_store.saved().len(), 1);
        assert_eq!(harness.block_receiver.received().len(), 1);
    }

    #[tokio::test]
    async fn test_builder_payload_round_trip_reveals_blobs() {
        let harness = TestHarness::new();
        harness.execution.set_payload(LocalPayload {
            payload: ExecutionPayload {
                withdrawals: Some(Vec::new()),
                ..Default::default()
            },
            value: gwei_to_wei(5),
            ..Default::default()
        });
        harness.builder.set_registration(Ok(ValidatorRegistration {
            gas_limit: GAS_LIMIT,
            ..Default::default()
        }));
        harness.builder.set_bid(Ok(SignedBuilderBid {
            message: BuilderBid {
                header: builder_payload().to_header(),
                blinded_blobs_bundle: Some(BlindedBlobsBundle {
                    kzg_commitments: commitments(),
                    proofs: vec![KzgProof::default(); 3],
                    blob_roots: blobs().iter().map(|blob| blob_root(blob)).collect(),
                }),
                value: gwei_to_wei(80),
                version: Some(ForkName::Deneb),
                ..Default::default()
            },
            ..Default::default()
        }));
        harness.builder.set_unblinded(Ok(UnblindedPayload {
            payload: builder_payload(),
            blobs_bundle: Some(BlobsBundle {
                kzg_commitments: commitments(),
                proofs: vec![KzgProof::default(); 3],
                blobs: blobs(),
            }),
        }));
        let api = proposer(&harness);
        let cancel = CancellationToken::new();

        let produced = api.produce_block(duty_request(), &cancel).await.unwrap();
        assert!(produced.is_blinded);
        assert_eq!(produced.payload_value, gwei_to_wei(80));

        let contents = BlockContents::decode(&produced.data).unwrap();
        assert!(contents.blob_sidecars.is_empty());
        assert_eq!(contents.blinded_blob_sidecars.len(), 3);
        let blinded_root = contents.block.canonical_root().unwrap();

        let root = api.accept_signed_block(&sign(contents), &cancel).await.unwrap();
        assert_eq!(root, blinded_root);
        assert_eq!(harness.builder.submit_calls(), 1);

        let imported = &harness.block_receiver.received()[0].0;
        assert!(!imported.message.is_blinded());
        assert_eq!(
            imported.message.body().blob_kzg_commitments().cloned(),
            Some(commitments())
        );
        let stored = &harness.blob_store.saved()[0];
        let stored_blobs: Vec<Vec<u8>> = stored.iter().map(|s| s.message.blob.clone()).collect();
        assert_eq!(stored_blobs, blobs());

        let event = &harness.events.events()[0];
        assert!(event.was_blinded);
        assert_eq!(event.blob_count, 3);
    }

    #[tokio::test]
    async fn test_metrics_exported_after_proposal() {
        // Another test in this process may have registered already.
        let _ = beacon_telemetry::register_metrics();

        let harness = TestHarness::new();
        harness.builder.set_configured(false);
        let api = proposer(&harness);
        let cancel = CancellationToken::new();
        let produced = api.produce_block(duty_request(), &cancel).await.unwrap();
        let contents = BlockContents::decode(&produced.data).unwrap();
        api.accept_signed_block(&sign(contents), &cancel).await.unwrap();

        let exported = beacon_telemetry::gather_metrics().unwrap();
        assert!(exported.contains("bn_proposer_blocks_produced_total"));
        assert!(exported.contains("bn_proposer_blocks_proposed_total"));
    }
}
