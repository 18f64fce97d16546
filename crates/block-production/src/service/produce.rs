//! ProduceBlock pipeline.

use super::{cancellable, OperationPools, ProposerService};
use crate::admission::Admission;
use crate::config::{BuildMode, DEFAULT_BUILDER_BOOST_FACTOR};
use crate::domain::{
    blinded_blob_sidecars, blob_sidecars, select_payload, validate_bid, BidExpectations,
    BlobsData, BlockContents, BlockDraft, BuilderBid, ConsensusFields, DraftStage,
    ExecutionFields, ForkName, PayloadSource, SelectionPolicy,
};
use crate::error::{BlockProductionError, Result};
use crate::eth1_vote::{zero_hash_vote, Eth1VoteOracle};
use crate::ports::{PackContext, PayloadRequest, PortResult, ProduceBlockRequest, ProducedBlock};
use beacon_telemetry::metrics::BLOCK_PRODUCTION_DURATION;
use beacon_telemetry::time_histogram;
use shared_types::{BeaconState, BlsSignature, ChainSpec, Root, SyncAggregate, ValidatorIndex, H256};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const GRAFFITI_LEN: usize = 32;

/// Validated randao reveal and zero-padded graffiti.
fn parse_request(request: &ProduceBlockRequest) -> Result<(BlsSignature, H256)> {
    let randao_reveal = BlsSignature::try_from(request.randao_reveal.as_slice())
        .map_err(|e| BlockProductionError::InvalidRequest(format!("randao reveal: {}", e)))?;

    let mut graffiti = [0u8; GRAFFITI_LEN];
    if let Some(bytes) = &request.graffiti {
        if bytes.len() > GRAFFITI_LEN {
            return Err(BlockProductionError::InvalidRequest(format!(
                "graffiti is {} bytes, at most {} allowed",
                bytes.len(),
                GRAFFITI_LEN
            )));
        }
        graffiti[..bytes.len()].copy_from_slice(bytes);
    }
    Ok((randao_reveal, H256(graffiti)))
}

/// Packed operations, or an empty list when the pool fails.
fn or_empty<T>(packed: PortResult<Vec<T>>, operation: &'static str) -> Vec<T> {
    packed.unwrap_or_else(|e| {
        error!(error = %e, operation, "Could not pack operations, proposing without them");
        Vec::new()
    })
}

/// Builds the consensus half of a body. Cheap to clone into a task.
#[derive(Clone)]
struct ConsensusBuilder {
    pools: OperationPools,
    oracle: Arc<Eth1VoteOracle>,
    spec: ChainSpec,
}

impl ConsensusBuilder {
    async fn build(
        &self,
        state: &BeaconState,
        parent_root: Root,
        fork: ForkName,
        cancel: &CancellationToken,
    ) -> Result<ConsensusFields> {
        let eth1_data = match self.oracle.select_eth1_data(state, cancel).await {
            Ok(vote) => vote,
            Err(e @ BlockProductionError::Cancelled { .. }) => return Err(e),
            Err(e) => {
                error!(error = %e, slot = state.slot, "Could not get eth1data, using zero hash vote");
                zero_hash_vote(state)
            }
        };

        let ctx = PackContext {
            state,
            eth1_data: &eth1_data,
        };
        let spec = &self.spec;
        let (deposits, attestations) = cancellable(cancel, "pack deposits and attestations", async {
            tokio::join!(
                self.pools.deposits.pack(&ctx, spec.max_deposits),
                self.pools.attestations.pack(&ctx, spec.max_attestations)
            )
        })
        .await?;
        let proposer_slashings = cancellable(
            cancel,
            "pack proposer slashings",
            self.pools.proposer_slashings.pack(&ctx, spec.max_proposer_slashings),
        )
        .await?;
        let attester_slashings = cancellable(
            cancel,
            "pack attester slashings",
            self.pools.attester_slashings.pack(&ctx, spec.max_attester_slashings),
        )
        .await?;
        let voluntary_exits = cancellable(
            cancel,
            "pack voluntary exits",
            self.pools.voluntary_exits.pack(&ctx, spec.max_voluntary_exits),
        )
        .await?;

        let sync_aggregate = if fork.has_sync_aggregate() {
            let aggregate = cancellable(
                cancel,
                "get sync aggregate",
                self.pools.sync_aggregates.sync_aggregate(state.slot, parent_root),
            )
            .await?;
            Some(aggregate.unwrap_or_else(|e| {
                error!(error = %e, slot = state.slot, "Could not get sync aggregate, using empty aggregate");
                SyncAggregate::empty(spec.sync_committee_size)
            }))
        } else {
            None
        };

        let bls_to_execution_changes = if fork.has_withdrawals() {
            let changes = cancellable(
                cancel,
                "pack bls to execution changes",
                self.pools
                    .bls_to_execution_changes
                    .pack(&ctx, spec.max_bls_to_execution_changes),
            )
            .await?;
            or_empty(changes, "bls_to_execution_changes")
        } else {
            Vec::new()
        };

        Ok(ConsensusFields {
            eth1_data,
            deposits: or_empty(deposits, "deposits"),
            attestations: or_empty(attestations, "attestations"),
            proposer_slashings: or_empty(proposer_slashings, "proposer_slashings"),
            attester_slashings: or_empty(attester_slashings, "attester_slashings"),
            voluntary_exits: or_empty(voluntary_exits, "voluntary_exits"),
            sync_aggregate,
            bls_to_execution_changes,
        })
    }

    /// Build on a separate task; the task is cancelled through a child of
    /// `cancel` and aborted if the handle is dropped.
    fn spawn(
        self,
        state: Arc<BeaconState>,
        parent_root: Root,
        fork: ForkName,
        cancel: &CancellationToken,
    ) -> ConsensusTask {
        let token = cancel.child_token();
        let task_token = token.clone();
        let handle =
            tokio::spawn(async move { self.build(&state, parent_root, fork, &task_token).await });
        ConsensusTask { handle, token }
    }
}

/// Handle to a spawned consensus half.
struct ConsensusTask {
    handle: JoinHandle<Result<ConsensusFields>>,
    token: CancellationToken,
}

impl ConsensusTask {
    async fn join(&mut self) -> Result<ConsensusFields> {
        match (&mut self.handle).await {
            Ok(fields) => fields,
            Err(e) => Err(BlockProductionError::internal("build consensus fields", e)),
        }
    }
}

impl Drop for ConsensusTask {
    fn drop(&mut self) {
        self.token.cancel();
        self.handle.abort();
    }
}

impl ProposerService {
    pub(super) async fn produce(
        &self,
        request: ProduceBlockRequest,
        cancel: &CancellationToken,
    ) -> Result<ProducedBlock> {
        let _timer = time_histogram!(BLOCK_PRODUCTION_DURATION);
        let (randao_reveal, graffiti) = parse_request(&request)?;
        let slot = request.slot;

        if self.sync.is_syncing() {
            return Err(BlockProductionError::Syncing);
        }
        info!(
            slot,
            since_slot_start_ms = self.since_slot_start_ms(slot),
            "Begin building block"
        );

        cancellable(cancel, "update head", self.fork_choice.update_head())
            .await?
            .map_err(|e| BlockProductionError::from_port("update head", e))?;
        let head_root = self.fork_choice.cached_head_root();
        let parent_root = cancellable(cancel, "get proposer head", self.fork_choice.proposer_head(slot)).await?;
        if parent_root != head_root {
            self.metrics.record_late_block_reorg_attempt();
            info!(slot, head_root = ?head_root, parent_root = ?parent_root, "Attempting to reorg late head block");
        }

        let fork = self.fork_at_slot(slot);
        if fork.has_execution_payload() {
            let optimistic = cancellable(cancel, "check optimistic status", self.chain.is_optimistic())
                .await?
                .map_err(|e| BlockProductionError::from_port("check optimistic status", e))?;
            if optimistic {
                return Err(BlockProductionError::Optimistic);
            }
        }

        let mut draft = BlockDraft::empty(slot, &self.spec);
        let mut stage = DraftStage::Empty;

        let parent_state = if parent_root == head_root {
            cancellable(cancel, "get head state", self.chain.head_state()).await?
        } else {
            cancellable(cancel, "get parent state", self.chain.state_by_root(parent_root)).await?
        };
        let parent_state =
            parent_state.map_err(|e| BlockProductionError::from_port("get parent state", e))?;

        let cached = cancellable(
            cancel,
            "process slots",
            self.transition.cached_next_slot_state(parent_root, slot),
        )
        .await?;
        let state = match cached {
            Some(state) => state,
            None => cancellable(
                cancel,
                "process slots",
                self.transition.process_slots(parent_state.clone(), slot),
            )
            .await?
            .map_err(|e| BlockProductionError::from_port("process slots", e))?,
        };
        let proposer_index = self
            .transition
            .proposer_index(&state)
            .map_err(|e| BlockProductionError::from_port("compute proposer index", e))?;

        draft.set_header(proposer_index, parent_root);
        let base = draft.body_mut().phase0_mut();
        base.randao_reveal = randao_reveal;
        base.graffiti = graffiti;

        let state = Arc::new(state);
        let consensus_builder = ConsensusBuilder {
            pools: self.pools.clone(),
            oracle: self.eth1_oracle.clone(),
            spec: self.spec.clone(),
        };
        let (consensus, execution) = match self.config.build_mode {
            BuildMode::Parallel => {
                let mut task = consensus_builder.spawn(state.clone(), parent_root, fork, cancel);
                let execution = self
                    .execution_fields(&state, fork, proposer_index, &request, cancel)
                    .await?;
                (task.join().await?, execution)
            }
            BuildMode::Sequential => {
                let consensus = consensus_builder.build(&state, parent_root, fork, cancel).await?;
                let execution = self
                    .execution_fields(&state, fork, proposer_index, &request, cancel)
                    .await?;
                (consensus, execution)
            }
        };

        draft.apply_consensus(consensus);
        stage.advance(DraftStage::ConsensusPopulated)?;
        draft.apply_execution(&execution);
        stage.advance(DraftStage::ExecutionPopulated)?;

        let state_root = cancellable(
            cancel,
            "compute state root",
            self.transition.compute_state_root(&parent_state, &draft),
        )
        .await?
        .map_err(|e| BlockProductionError::from_port("compute state root", e))?;
        draft.set_state_root(state_root);
        stage.advance(DraftStage::StateRootComputed)?;

        let block_root = draft.canonical_root()?;
        let (blob_sidecars, blinded_blob_sidecars) = match &execution.blobs {
            Some(BlobsData::Full(bundle)) => (blob_sidecars(&draft, block_root, bundle)?, Vec::new()),
            Some(BlobsData::Blinded(bundle)) => {
                (Vec::new(), blinded_blob_sidecars(&draft, block_root, bundle)?)
            }
            None => (Vec::new(), Vec::new()),
        };

        let is_blinded = draft.is_blinded();
        let contents = BlockContents {
            block: draft,
            blob_sidecars,
            blinded_blob_sidecars,
        };
        let data = contents
            .encode()
            .map_err(|e| BlockProductionError::internal("encode block", e))?;
        stage.advance(DraftStage::Serialized)?;

        self.metrics.record_block_produced(fork.as_str(), is_blinded);
        info!(
            slot,
            fork = %fork,
            blinded = is_blinded,
            since_slot_start_ms = self.since_slot_start_ms(slot),
            "Finished building block"
        );

        Ok(ProducedBlock {
            version: fork,
            is_blinded,
            payload_value: execution.payload_value,
            data,
        })
    }

    /// Execution half: local payload, optionally replaced by a builder bid.
    ///
    /// Only a failing local engine or cancellation is an error; every
    /// builder failure falls back to the local payload.
    async fn execution_fields(
        &self,
        state: &BeaconState,
        fork: ForkName,
        proposer_index: ValidatorIndex,
        request: &ProduceBlockRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionFields> {
        if !fork.has_execution_payload() {
            return Ok(ExecutionFields::default());
        }

        let payload_request = PayloadRequest {
            slot: state.slot,
            fork,
            timestamp: self.spec.slot_start_time(state.genesis_time, state.slot),
            parent_hash: state.latest_execution_block_hash,
            proposer_index,
        };
        let local = cancellable(
            cancel,
            "get local payload",
            self.execution.get_local_payload(&payload_request),
        )
        .await?
        .map_err(|e| BlockProductionError::from_port("get local payload", e))?;

        let bid = if local.should_override_builder {
            debug!(slot = state.slot, "Execution engine asked to override builder");
            None
        } else if request.skip_mev_boost {
            debug!(slot = state.slot, "Builder skipped by request");
            None
        } else {
            self.builder_bid(state, &payload_request, cancel).await?
        };

        let policy = SelectionPolicy {
            local_block_value_boost: self.config.builder.local_block_value_boost,
            min_bid_gwei: self.config.builder.min_bid_gwei,
            min_bid_difference_gwei: self.config.builder.min_bid_difference_gwei,
            builder_boost_factor: request
                .builder_boost_factor
                .unwrap_or(DEFAULT_BUILDER_BOOST_FACTOR),
        };
        let selection = select_payload(fork, &local, bid.as_ref(), &policy);
        if bid.is_some() {
            self.metrics
                .record_payload_values(selection.builder_gwei, selection.local_gwei);
        }

        match (selection.source, bid) {
            (PayloadSource::Builder, Some(bid)) => {
                info!(
                    slot = state.slot,
                    builder_gwei = selection.builder_gwei,
                    local_gwei = selection.local_gwei,
                    "Using builder payload"
                );
                Ok(ExecutionFields::from_bid(fork, bid))
            }
            _ => {
                if let Some(reason) = selection.reason {
                    debug!(slot = state.slot, reason, "Using local payload");
                }
                Ok(ExecutionFields::from_local(fork, local))
            }
        }
    }

    /// A validated builder bid, if the builder may be used and answers in
    /// time with something usable.
    async fn builder_bid(
        &self,
        state: &BeaconState,
        payload_request: &PayloadRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<BuilderBid>> {
        let slot = payload_request.slot;
        let proposer_index = payload_request.proposer_index;

        let admission = cancellable(
            cancel,
            "check builder admission",
            self.admission.can_use_builder(slot, proposer_index),
        )
        .await?;
        match admission {
            Ok(Admission::Allowed) => {}
            Ok(Admission::CircuitOpen) => {
                self.metrics.record_circuit_breaker_trip();
                return Ok(None);
            }
            Ok(other) => {
                debug!(slot, admission = ?other, "Builder not used");
                return Ok(None);
            }
            Err(e) => {
                warn!(error = %e, slot, "Could not determine if builder can be used, using local payload");
                return Ok(None);
            }
        }

        let pubkey = match state.validator(proposer_index) {
            Ok(validator) => validator.pubkey,
            Err(e) => {
                warn!(error = %e, slot, "Could not read proposer key, using local payload");
                return Ok(None);
            }
        };
        let gas_limit = match cancellable(
            cancel,
            "read builder registration",
            self.builder.registration(proposer_index),
        )
        .await?
        {
            Ok(registration) => Some(registration.gas_limit),
            Err(e) => {
                warn!(error = %e, slot, "Could not read registered gas limit, skipping gas limit check");
                None
            }
        };

        let timeout = self.config.builder.get_header_timeout();
        let fetched = cancellable(
            cancel,
            "get builder header",
            tokio::time::timeout(
                timeout,
                self.builder
                    .get_header(slot, payload_request.parent_hash, pubkey),
            ),
        )
        .await?;
        let signed_bid = match fetched {
            Ok(Ok(bid)) => bid,
            Ok(Err(e)) => {
                self.metrics.record_builder_miss();
                warn!(error = %e, slot, "Could not get builder payload, using local payload");
                return Ok(None);
            }
            Err(_) => {
                self.metrics.record_builder_miss();
                warn!(
                    slot,
                    timeout_ms = self.config.builder.get_header_timeout_ms,
                    "Timed out waiting for builder header, using local payload"
                );
                return Ok(None);
            }
        };

        let expectations = BidExpectations {
            fork: payload_request.fork,
            parent_hash: payload_request.parent_hash,
            gas_limit,
            timestamp: payload_request.timestamp,
            max_blobs: self.spec.max_blobs_per_block,
        };
        if let Err(e) = validate_bid(&signed_bid.message, &expectations) {
            self.metrics.record_builder_miss();
            warn!(error = %e, slot, "Builder bid rejected, using local payload");
            return Ok(None);
        }
        Ok(Some(signed_bid.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(randao_len: usize, graffiti: Option<Vec<u8>>) -> ProduceBlockRequest {
        ProduceBlockRequest {
            slot: 1,
            randao_reveal: vec![7; randao_len],
            graffiti,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_request_pads_graffiti() {
        let (randao, graffiti) = parse_request(&request(96, Some(b"hello".to_vec()))).unwrap();
        assert_eq!(randao.0, [7u8; 96]);
        assert_eq!(&graffiti.as_bytes()[..5], b"hello");
        assert!(graffiti.as_bytes()[5..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_parse_request_rejects_bad_lengths() {
        let err = parse_request(&request(95, None)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::BadRequest);
        let err = parse_request(&request(96, Some(vec![1; 33]))).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::BadRequest);
    }

    #[test]
    fn test_missing_graffiti_is_zero() {
        let (_, graffiti) = parse_request(&request(96, None)).unwrap();
        assert!(graffiti.is_zero());
    }
}
