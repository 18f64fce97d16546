//! Proposer Service - Block production and proposal
//!
//! # Architecture
//! - `produce`: ProduceBlock pipeline (consensus and execution halves,
//!   sequential or on two concurrent tasks)
//! - `propose`: AcceptSignedBlock (unblind, broadcast, import)
//! - `attestation`: attestation data behind the single-entry cache
//! - `sync_committee`: sync subnet registration and batch subscriptions
//!
//! Every suspension point observes the caller's `CancellationToken`.

mod attestation;
mod produce;
mod propose;
mod sync_committee;

#[cfg(test)]
mod tests;

use crate::admission::BuilderAdmissionController;
use crate::config::BlockProductionConfig;
use crate::domain::{
    AttestationDataCache, ForkName, RegistrationOutcome, SyncSubnetRegistration,
    SyncSubnetRegistry,
};
use crate::error::{BlockProductionError, Result};
use crate::eth1_vote::Eth1VoteOracle;
use crate::metrics::Metrics;
use crate::ports::{
    BlobStore, BlockReceiver, Broadcaster, BuilderClient, ChainInfo, DepositFetcher, Eth1Fetcher,
    EventPublisher, ExecutionEngine, ForkChoice, OperationPool, ProduceBlockRequest,
    ProducedBlock, ProposerApi, StateTransition, SyncAggregateSource, SyncChecker,
    SyncCommitteeSubscription, SystemTimeSource, TimeSource,
};
use async_trait::async_trait;
use shared_types::{
    Attestation, AttestationData, AttesterSlashing, ChainSpec, CommitteeIndex, Deposit,
    ProposerSlashing, Root, SignedBlsToExecutionChange, SignedVoluntaryExit, Slot,
};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Operation pools feeding a block body.
#[derive(Clone)]
pub struct OperationPools {
    /// Pending deposits
    pub deposits: Arc<dyn OperationPool<Deposit>>,
    /// Aggregated attestations
    pub attestations: Arc<dyn OperationPool<Attestation>>,
    /// Proposer slashings
    pub proposer_slashings: Arc<dyn OperationPool<ProposerSlashing>>,
    /// Attester slashings
    pub attester_slashings: Arc<dyn OperationPool<AttesterSlashing>>,
    /// Voluntary exits
    pub voluntary_exits: Arc<dyn OperationPool<SignedVoluntaryExit>>,
    /// BLS-to-execution changes
    pub bls_to_execution_changes: Arc<dyn OperationPool<SignedBlsToExecutionChange>>,
    /// Sync committee contributions
    pub sync_aggregates: Arc<dyn SyncAggregateSource>,
}

/// Dependencies for ProposerService
pub struct ProposerDependencies {
    pub sync: Arc<dyn SyncChecker>,
    pub chain: Arc<dyn ChainInfo>,
    pub fork_choice: Arc<dyn ForkChoice>,
    pub transition: Arc<dyn StateTransition>,
    pub eth1: Arc<dyn Eth1Fetcher>,
    pub deposits: Arc<dyn DepositFetcher>,
    pub pools: OperationPools,
    pub execution: Arc<dyn ExecutionEngine>,
    pub builder: Arc<dyn BuilderClient>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub blob_store: Arc<dyn BlobStore>,
    pub block_receiver: Arc<dyn BlockReceiver>,
    pub events: Arc<dyn EventPublisher>,
}

/// Proposer Service
///
/// Owns the two pieces of state shared across requests (the attestation
/// data cache and the sync subnet registry); everything else is per call.
pub struct ProposerService {
    sync: Arc<dyn SyncChecker>,
    chain: Arc<dyn ChainInfo>,
    fork_choice: Arc<dyn ForkChoice>,
    transition: Arc<dyn StateTransition>,
    pools: OperationPools,
    execution: Arc<dyn ExecutionEngine>,
    builder: Arc<dyn BuilderClient>,
    broadcaster: Arc<dyn Broadcaster>,
    blob_store: Arc<dyn BlobStore>,
    block_receiver: Arc<dyn BlockReceiver>,
    events: Arc<dyn EventPublisher>,
    eth1_oracle: Arc<Eth1VoteOracle>,
    admission: BuilderAdmissionController,
    attestation_cache: AttestationDataCache,
    sync_subnets: SyncSubnetRegistry,
    config: BlockProductionConfig,
    spec: ChainSpec,
    metrics: Arc<Metrics>,
    time_source: Box<dyn TimeSource>,
}

impl ProposerService {
    /// Create a new ProposerService
    pub fn new(deps: ProposerDependencies, config: BlockProductionConfig, spec: ChainSpec) -> Self {
        info!(
            build_mode = ?config.build_mode,
            builder_configured = deps.builder.is_configured(),
            mock_eth1_votes = config.eth1.mock_votes,
            "Initializing proposer service"
        );

        let eth1_oracle = Arc::new(Eth1VoteOracle::new(
            deps.eth1,
            deps.deposits,
            spec.clone(),
            config.eth1.clone(),
        ));
        let admission =
            BuilderAdmissionController::new(deps.builder.clone(), deps.fork_choice.clone(), spec.clone());

        Self {
            sync: deps.sync,
            chain: deps.chain,
            fork_choice: deps.fork_choice,
            transition: deps.transition,
            pools: deps.pools,
            execution: deps.execution,
            builder: deps.builder,
            broadcaster: deps.broadcaster,
            blob_store: deps.blob_store,
            block_receiver: deps.block_receiver,
            events: deps.events,
            eth1_oracle,
            admission,
            attestation_cache: AttestationDataCache::new(),
            sync_subnets: SyncSubnetRegistry::new(spec.clone()),
            config,
            spec,
            metrics: Arc::new(Metrics::new()),
            time_source: Box::new(SystemTimeSource),
        }
    }

    /// Set custom time source (for testing)
    pub fn with_time_source(mut self, time_source: Box<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    /// Counters of this instance.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Eth1 vote oracle.
    pub fn eth1_oracle(&self) -> &Eth1VoteOracle {
        &self.eth1_oracle
    }

    /// Sync subnet subscriptions recorded so far.
    pub fn sync_subnets(&self) -> &SyncSubnetRegistry {
        &self.sync_subnets
    }

    /// Attestation data cache.
    pub fn attestation_cache(&self) -> &AttestationDataCache {
        &self.attestation_cache
    }

    /// Network constants.
    pub fn spec(&self) -> &ChainSpec {
        &self.spec
    }

    // === CLOCK ===

    fn now_ms(&self) -> u64 {
        self.time_source.now_millis()
    }

    /// Wall-clock slot.
    fn current_slot(&self) -> Slot {
        let genesis_ms = self.chain.genesis_time().saturating_mul(1000);
        let slot_ms = self.spec.seconds_per_slot.saturating_mul(1000).max(1);
        self.now_ms().saturating_sub(genesis_ms) / slot_ms
    }

    /// Milliseconds elapsed since `slot` started; zero before it starts.
    fn since_slot_start_ms(&self, slot: Slot) -> u64 {
        let start = self
            .spec
            .slot_start_time(self.chain.genesis_time(), slot)
            .saturating_mul(1000);
        self.now_ms().saturating_sub(start)
    }

    fn fork_at_slot(&self, slot: Slot) -> ForkName {
        ForkName::from_epoch(self.spec.epoch_at_slot(slot), &self.spec)
    }
}

/// Run `fut` unless `cancel` fires first.
pub(crate) async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    stage: &'static str,
    fut: F,
) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BlockProductionError::Cancelled { stage }),
        output = fut => Ok(output),
    }
}

#[async_trait]
impl ProposerApi for ProposerService {
    async fn produce_block(
        &self,
        request: ProduceBlockRequest,
        cancel: &CancellationToken,
    ) -> Result<ProducedBlock> {
        self.produce(request, cancel).await
    }

    async fn accept_signed_block(&self, encoded: &[u8], cancel: &CancellationToken) -> Result<Root> {
        self.accept(encoded, cancel).await
    }

    async fn get_attestation_data(
        &self,
        slot: Slot,
        committee_index: CommitteeIndex,
        cancel: &CancellationToken,
    ) -> Result<AttestationData> {
        self.attestation_data(slot, committee_index, cancel).await
    }

    fn register_sync_subnets(&self, registration: &SyncSubnetRegistration) -> RegistrationOutcome {
        self.register_subnets(registration)
    }

    async fn submit_sync_committee_subscriptions(
        &self,
        subscriptions: Vec<SyncCommitteeSubscription>,
    ) -> Result<()> {
        self.submit_subscriptions(subscriptions).await
    }
}
