//! Mock collaborators for block production tests.
//!
//! Every mock records what it was asked and can be told to fail. Compiled
//! for unit tests and, behind the `test-utils` feature, for the integration
//! test crate.

use crate::domain::{LocalPayload, SignedBeaconBlock, SignedBuilderBid};
use crate::error::{BuilderError, PortError};
use crate::events::BlockReceivedEvent;
use crate::ports::{
    BlobStore, BlockReceiver, Broadcaster, BuilderClient, ChainInfo, DepositFetcher,
    Eth1BlockHeader, Eth1Fetcher, EventPublisher, ExecutionEngine, ForkChoice, OperationPool,
    PackContext, PayloadRequest, PortResult, StateTransition, SyncAggregateSource, SyncChecker,
    TimeSource, UnblindedPayload,
};
use crate::service::{OperationPools, ProposerDependencies};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{
    hash, Attestation, AttesterSlashing, BeaconState, BlsPublicKey, ChainSpec, Deposit, Eth1Data,
    Hash32, ProposerSlashing, Root, SignedBlindedBlobSidecar, SignedBlobSidecar,
    SignedBlsToExecutionChange, SignedVoluntaryExit, Slot, SyncAggregate, ValidatorIndex,
    ValidatorRecord, ValidatorRegistration, ValidatorStatus, H256,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Genesis time used by [`TestHarness`].
pub const TEST_GENESIS_TIME: u64 = 1_600_000_000;

/// Key of validator `index` in [`test_state`].
pub fn test_pubkey(index: ValidatorIndex) -> BlsPublicKey {
    let mut bytes = [0u8; shared_types::BLS_PUBLIC_KEY_LEN];
    bytes[..8].copy_from_slice(&index.to_be_bytes());
    bytes[8] = 0xaa;
    BlsPublicKey(bytes)
}

/// State at `slot` with `validators` active validators and a full
/// `block_roots` ring buffer.
pub fn test_state(slot: Slot, validators: u64, spec: &ChainSpec) -> BeaconState {
    BeaconState {
        genesis_time: TEST_GENESIS_TIME,
        slot,
        block_roots: vec![Root::zero(); spec.slots_per_historical_root as usize],
        eth1_data: Eth1Data {
            deposit_root: H256::repeat_byte(0x0d),
            deposit_count: 64,
            block_hash: H256::repeat_byte(0x0b),
        },
        validators: (0..validators)
            .map(|index| ValidatorRecord {
                pubkey: test_pubkey(index),
                status: ValidatorStatus::Active,
            })
            .collect(),
        latest_execution_block_hash: H256::repeat_byte(0xee),
        ..Default::default()
    }
}

// =============================================================================
// CLOCK
// =============================================================================

/// Settable clock.
#[derive(Debug, Default)]
pub struct FixedTimeSource {
    now_ms: AtomicU64,
}

impl FixedTimeSource {
    /// Clock reading `now_ms`.
    pub fn new(now_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(now_ms),
        }
    }

    /// Jump to `now_ms`.
    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    /// Move forward by `ms`.
    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl TimeSource for FixedTimeSource {
    fn now_millis(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

impl TimeSource for Arc<FixedTimeSource> {
    fn now_millis(&self) -> u64 {
        self.as_ref().now_millis()
    }
}

// =============================================================================
// ETH1
// =============================================================================

/// Eth1 chain with a fixed block list.
pub struct MockEth1Fetcher {
    genesis_time: u64,
    blocks: Vec<Eth1BlockHeader>,
    connected: AtomicBool,
    fail_lookups: AtomicBool,
    delay: Mutex<Duration>,
}

impl MockEth1Fetcher {
    /// Connected fetcher over `blocks`, which must be sorted by timestamp.
    pub fn new(genesis_time: u64, blocks: Vec<Eth1BlockHeader>) -> Self {
        Self {
            genesis_time,
            blocks,
            connected: AtomicBool::new(true),
            fail_lookups: AtomicBool::new(false),
            delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Block hash reported for height `number`.
    pub fn hash_of(number: u64) -> Hash32 {
        hash(&number.to_be_bytes())
    }

    /// Toggle connectivity.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make every block lookup fail.
    pub fn fail_block_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    /// Delay every block lookup.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    async fn lookup_guard(&self) -> PortResult<()> {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("eth1 endpoint unreachable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Eth1Fetcher for MockEth1Fetcher {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn eth2_genesis_time(&self) -> u64 {
        self.genesis_time
    }

    async fn block_by_timestamp(&self, timestamp: u64) -> PortResult<Eth1BlockHeader> {
        self.lookup_guard().await?;
        self.blocks
            .iter()
            .rev()
            .find(|block| block.timestamp <= timestamp)
            .copied()
            .ok_or_else(|| PortError::NotFound(format!("eth1 block at or before {}", timestamp)))
    }

    async fn block_hash_by_height(&self, height: u64) -> PortResult<Hash32> {
        self.lookup_guard().await?;
        if self.blocks.iter().any(|block| block.number == height) {
            Ok(Self::hash_of(height))
        } else {
            Err(PortError::NotFound(format!("eth1 block {}", height)))
        }
    }
}

/// Deposit log with counts recorded at chosen heights.
#[derive(Default)]
pub struct MockDepositFetcher {
    by_height: Mutex<BTreeMap<u64, (u64, Root)>>,
    chain_start: Mutex<Eth1Data>,
    fail: AtomicBool,
}

impl MockDepositFetcher {
    /// From `height` on, report `count` deposits with `root`.
    pub fn set_at_height(&self, height: u64, count: u64, root: Root) {
        self.by_height.lock().insert(height, (count, root));
    }

    /// Eth1 data the chain started from.
    pub fn set_chain_start(&self, data: Eth1Data) {
        *self.chain_start.lock() = data;
    }

    /// Make deposit lookups fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DepositFetcher for MockDepositFetcher {
    async fn deposits_number_and_root_at_height(&self, height: u64) -> PortResult<(u64, Root)> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PortError::Other("deposit cache corrupted".into()));
        }
        Ok(self
            .by_height
            .lock()
            .range(..=height)
            .next_back()
            .map(|(_, observed)| *observed)
            .unwrap_or((0, Root::zero())))
    }

    fn chain_start_eth1_data(&self) -> Eth1Data {
        self.chain_start.lock().clone()
    }
}

// =============================================================================
// CHAIN
// =============================================================================

/// Head, fork choice and sync status in one mock.
pub struct MockChain {
    genesis_time: AtomicU64,
    head_root: Mutex<Root>,
    head_state: Mutex<BeaconState>,
    states: Mutex<HashMap<Root, BeaconState>>,
    proposer_head: Mutex<Option<Root>>,
    optimistic: AtomicBool,
    syncing: AtomicBool,
    fail_head_state: AtomicBool,
    highest_received_slot: AtomicU64,
    received_last_epoch: Mutex<PortResult<u64>>,
    head_state_reads: AtomicU64,
    head_updates: AtomicU64,
}

impl Default for MockChain {
    fn default() -> Self {
        Self {
            genesis_time: AtomicU64::new(TEST_GENESIS_TIME),
            head_root: Mutex::new(H256::repeat_byte(0x01)),
            head_state: Mutex::new(BeaconState::default()),
            states: Mutex::new(HashMap::new()),
            proposer_head: Mutex::new(None),
            optimistic: AtomicBool::new(false),
            syncing: AtomicBool::new(false),
            fail_head_state: AtomicBool::new(false),
            highest_received_slot: AtomicU64::new(0),
            received_last_epoch: Mutex::new(Ok(32)),
            head_state_reads: AtomicU64::new(0),
            head_updates: AtomicU64::new(0),
        }
    }
}

impl MockChain {
    /// Set genesis time (seconds).
    pub fn set_genesis_time(&self, genesis_time: u64) {
        self.genesis_time.store(genesis_time, Ordering::SeqCst);
    }

    /// Set the head block root and post-state; the state is also
    /// reachable by root.
    pub fn set_head(&self, root: Root, state: BeaconState) {
        *self.head_root.lock() = root;
        self.states.lock().insert(root, state.clone());
        *self.head_state.lock() = state;
    }

    /// Make `state` reachable by `root`.
    pub fn insert_state(&self, root: Root, state: BeaconState) {
        self.states.lock().insert(root, state);
    }

    /// Parent fork choice proposes on; defaults to the head.
    pub fn set_proposer_head(&self, root: Root) {
        *self.proposer_head.lock() = Some(root);
    }

    /// Mark the head optimistic.
    pub fn set_optimistic(&self, optimistic: bool) {
        self.optimistic.store(optimistic, Ordering::SeqCst);
    }

    /// Mark the node syncing.
    pub fn set_syncing(&self, syncing: bool) {
        self.syncing.store(syncing, Ordering::SeqCst);
    }

    /// Make head state reads fail.
    pub fn fail_head_state(&self, fail: bool) {
        self.fail_head_state.store(fail, Ordering::SeqCst);
    }

    /// Highest slot of any received block.
    pub fn set_highest_received_slot(&self, slot: Slot) {
        self.highest_received_slot.store(slot, Ordering::SeqCst);
    }

    /// Result of the received-blocks counter.
    pub fn set_received_last_epoch(&self, received: PortResult<u64>) {
        *self.received_last_epoch.lock() = received;
    }

    /// Number of head state reads so far.
    pub fn head_state_reads(&self) -> u64 {
        self.head_state_reads.load(Ordering::SeqCst)
    }

    /// Number of head recomputations so far.
    pub fn head_updates(&self) -> u64 {
        self.head_updates.load(Ordering::SeqCst)
    }
}

impl SyncChecker for MockChain {
    fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainInfo for MockChain {
    fn genesis_time(&self) -> u64 {
        self.genesis_time.load(Ordering::SeqCst)
    }

    async fn head_root(&self) -> PortResult<Root> {
        Ok(*self.head_root.lock())
    }

    async fn head_state(&self) -> PortResult<BeaconState> {
        self.head_state_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_head_state.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("state cache evicted".into()));
        }
        Ok(self.head_state.lock().clone())
    }

    async fn state_by_root(&self, root: Root) -> PortResult<BeaconState> {
        self.states
            .lock()
            .get(&root)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("state for block {:?}", root)))
    }

    async fn is_optimistic(&self) -> PortResult<bool> {
        Ok(self.optimistic.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl ForkChoice for MockChain {
    async fn update_head(&self) -> PortResult<()> {
        self.head_updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn cached_head_root(&self) -> Root {
        *self.head_root.lock()
    }

    async fn proposer_head(&self, _slot: Slot) -> Root {
        let proposer_head = *self.proposer_head.lock();
        proposer_head.unwrap_or_else(|| *self.head_root.lock())
    }

    fn highest_received_block_slot(&self) -> Slot {
        self.highest_received_slot.load(Ordering::SeqCst)
    }

    fn received_blocks_last_epoch(&self) -> PortResult<u64> {
        self.received_last_epoch.lock().clone()
    }
}

/// State transition that only moves the slot forward.
///
/// Slots skipped by `process_slots` get a zero block root.
pub struct MockStateTransition {
    proposer: AtomicU64,
    state_root: Mutex<Root>,
    cached_state: Mutex<Option<BeaconState>>,
    delay: Mutex<Duration>,
    fail_state_root: AtomicBool,
    process_slots_calls: AtomicU64,
    state_root_calls: AtomicU64,
}

impl Default for MockStateTransition {
    fn default() -> Self {
        Self {
            proposer: AtomicU64::new(0),
            state_root: Mutex::new(H256::repeat_byte(0x5a)),
            cached_state: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
            fail_state_root: AtomicBool::new(false),
            process_slots_calls: AtomicU64::new(0),
            state_root_calls: AtomicU64::new(0),
        }
    }
}

impl MockStateTransition {
    /// Proposer reported for every slot.
    pub fn set_proposer(&self, index: ValidatorIndex) {
        self.proposer.store(index, Ordering::SeqCst);
    }

    /// Post-state root reported for every block.
    pub fn set_state_root(&self, root: Root) {
        *self.state_root.lock() = root;
    }

    /// Precomputed next-slot state.
    pub fn set_cached_state(&self, state: Option<BeaconState>) {
        *self.cached_state.lock() = state;
    }

    /// Delay every `process_slots` call.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Make state root computation fail.
    pub fn fail_state_root(&self, fail: bool) {
        self.fail_state_root.store(fail, Ordering::SeqCst);
    }

    /// Number of `process_slots` calls so far.
    pub fn process_slots_calls(&self) -> u64 {
        self.process_slots_calls.load(Ordering::SeqCst)
    }

    /// Number of state root computations so far.
    pub fn state_root_calls(&self) -> u64 {
        self.state_root_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateTransition for MockStateTransition {
    async fn process_slots(&self, mut state: BeaconState, slot: Slot) -> PortResult<BeaconState> {
        self.process_slots_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if slot < state.slot {
            return Err(PortError::Other(format!(
                "cannot process slots backwards from {} to {}",
                state.slot, slot
            )));
        }
        for skipped in state.slot..slot {
            if state.set_block_root(skipped, Root::zero()).is_err() {
                break;
            }
        }
        state.slot = slot;
        Ok(state)
    }

    async fn cached_next_slot_state(&self, _parent_root: Root, slot: Slot) -> Option<BeaconState> {
        self.cached_state
            .lock()
            .as_ref()
            .filter(|state| state.slot == slot)
            .cloned()
    }

    fn proposer_index(&self, _state: &BeaconState) -> PortResult<ValidatorIndex> {
        Ok(self.proposer.load(Ordering::SeqCst))
    }

    async fn compute_state_root(
        &self,
        _state: &BeaconState,
        _block: &crate::domain::BlockDraft,
    ) -> PortResult<Root> {
        self.state_root_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_state_root.load(Ordering::SeqCst) {
            return Err(PortError::Other("invalid block".into()));
        }
        Ok(*self.state_root.lock())
    }
}

// =============================================================================
// POOLS
// =============================================================================

/// Operation pool holding a fixed list.
pub struct MockPool<T> {
    items: Mutex<Vec<T>>,
    removed: Mutex<Vec<T>>,
    fail: AtomicBool,
}

impl<T> Default for MockPool<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }
}

impl<T: Clone> MockPool<T> {
    /// Replace the pooled entries.
    pub fn set_items(&self, items: Vec<T>) {
        *self.items.lock() = items;
    }

    /// Make packing fail.
    pub fn fail_pack(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Entries removed after import.
    pub fn removed(&self) -> Vec<T> {
        self.removed.lock().clone()
    }
}

#[async_trait]
impl<T> OperationPool<T> for MockPool<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn pack(&self, _ctx: &PackContext<'_>, max: u64) -> PortResult<Vec<T>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PortError::Other("pool locked".into()));
        }
        Ok(self.items.lock().iter().take(max as usize).cloned().collect())
    }

    async fn remove(&self, included: &[T]) -> PortResult<()> {
        self.removed.lock().extend_from_slice(included);
        Ok(())
    }
}

/// Sync contribution pool returning a fixed aggregate.
#[derive(Default)]
pub struct MockSyncAggregateSource {
    aggregate: Mutex<SyncAggregate>,
    fail: AtomicBool,
}

impl MockSyncAggregateSource {
    /// Aggregate returned for every slot.
    pub fn set_aggregate(&self, aggregate: SyncAggregate) {
        *self.aggregate.lock() = aggregate;
    }

    /// Make aggregation fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SyncAggregateSource for MockSyncAggregateSource {
    async fn sync_aggregate(&self, _slot: Slot, _parent_root: Root) -> PortResult<SyncAggregate> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PortError::Other("no contributions".into()));
        }
        Ok(self.aggregate.lock().clone())
    }
}

// =============================================================================
// EXECUTION / BUILDER
// =============================================================================

/// Execution engine returning a fixed payload.
#[derive(Default)]
pub struct MockExecutionEngine {
    payload: Mutex<LocalPayload>,
    fail: AtomicBool,
    requests: Mutex<Vec<PayloadRequest>>,
}

impl MockExecutionEngine {
    /// Payload returned for every request.
    pub fn set_payload(&self, payload: LocalPayload) {
        *self.payload.lock() = payload;
    }

    /// Make payload building fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<PayloadRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ExecutionEngine for MockExecutionEngine {
    async fn get_local_payload(&self, request: &PayloadRequest) -> PortResult<LocalPayload> {
        self.requests.lock().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("engine offline".into()));
        }
        Ok(self.payload.lock().clone())
    }
}

/// Builder relay with scripted answers.
pub struct MockBuilder {
    configured: AtomicBool,
    registration: Mutex<Result<ValidatorRegistration, BuilderError>>,
    bid: Mutex<Result<SignedBuilderBid, BuilderError>>,
    unblinded: Mutex<Result<UnblindedPayload, BuilderError>>,
    header_delay: Mutex<Duration>,
    header_calls: AtomicU64,
    submit_calls: AtomicU64,
}

impl Default for MockBuilder {
    fn default() -> Self {
        Self {
            configured: AtomicBool::new(true),
            registration: Mutex::new(Ok(ValidatorRegistration::default())),
            bid: Mutex::new(Err(BuilderError::Request("no bid".into()))),
            unblinded: Mutex::new(Err(BuilderError::Request("no payload".into()))),
            header_delay: Mutex::new(Duration::ZERO),
            header_calls: AtomicU64::new(0),
            submit_calls: AtomicU64::new(0),
        }
    }
}

impl MockBuilder {
    /// Toggle whether a relay is configured.
    pub fn set_configured(&self, configured: bool) {
        self.configured.store(configured, Ordering::SeqCst);
    }

    /// Registration lookup result.
    pub fn set_registration(&self, registration: Result<ValidatorRegistration, BuilderError>) {
        *self.registration.lock() = registration;
    }

    /// Bid returned by `get_header`.
    pub fn set_bid(&self, bid: Result<SignedBuilderBid, BuilderError>) {
        *self.bid.lock() = bid;
    }

    /// Payload returned by `submit_blinded_block`.
    pub fn set_unblinded(&self, unblinded: Result<UnblindedPayload, BuilderError>) {
        *self.unblinded.lock() = unblinded;
    }

    /// Delay every `get_header` call.
    pub fn set_header_delay(&self, delay: Duration) {
        *self.header_delay.lock() = delay;
    }

    /// Number of `get_header` calls so far.
    pub fn header_calls(&self) -> u64 {
        self.header_calls.load(Ordering::SeqCst)
    }

    /// Number of unblinding calls so far.
    pub fn submit_calls(&self) -> u64 {
        self.submit_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BuilderClient for MockBuilder {
    fn is_configured(&self) -> bool {
        self.configured.load(Ordering::SeqCst)
    }

    async fn registration(&self, _index: ValidatorIndex) -> Result<ValidatorRegistration, BuilderError> {
        self.registration.lock().clone()
    }

    async fn get_header(
        &self,
        _slot: Slot,
        _parent_hash: Hash32,
        _pubkey: BlsPublicKey,
    ) -> Result<SignedBuilderBid, BuilderError> {
        self.header_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.header_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.bid.lock().clone()
    }

    async fn submit_blinded_block(
        &self,
        _block: &SignedBeaconBlock,
        _sidecars: &[SignedBlindedBlobSidecar],
    ) -> Result<UnblindedPayload, BuilderError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.unblinded.lock().clone()
    }
}

// =============================================================================
// OUTPUTS
// =============================================================================

/// Gossip publisher that records what it sent.
#[derive(Default)]
pub struct MockBroadcaster {
    blocks: Mutex<Vec<SignedBeaconBlock>>,
    sidecars: Mutex<Vec<(u64, SignedBlobSidecar)>>,
    fail_blocks: AtomicBool,
    failing_sidecars: Mutex<HashSet<u64>>,
}

impl MockBroadcaster {
    /// Blocks broadcast so far.
    pub fn blocks(&self) -> Vec<SignedBeaconBlock> {
        self.blocks.lock().clone()
    }

    /// Sidecars broadcast so far, with their subnets.
    pub fn sidecars(&self) -> Vec<(u64, SignedBlobSidecar)> {
        self.sidecars.lock().clone()
    }

    /// Make block broadcast fail.
    pub fn fail_blocks(&self, fail: bool) {
        self.fail_blocks.store(fail, Ordering::SeqCst);
    }

    /// Make broadcast of the sidecar with `index` fail.
    pub fn fail_sidecar(&self, index: u64) {
        self.failing_sidecars.lock().insert(index);
    }
}

#[async_trait]
impl Broadcaster for MockBroadcaster {
    async fn broadcast_block(&self, block: &SignedBeaconBlock) -> PortResult<()> {
        if self.fail_blocks.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("no peers".into()));
        }
        self.blocks.lock().push(block.clone());
        Ok(())
    }

    async fn broadcast_blob_sidecar(&self, subnet: u64, sidecar: &SignedBlobSidecar) -> PortResult<()> {
        if self.failing_sidecars.lock().contains(&sidecar.message.index) {
            return Err(PortError::Unavailable("no peers on subnet".into()));
        }
        self.sidecars.lock().push((subnet, sidecar.clone()));
        Ok(())
    }
}

/// Blob store that records saved sidecars.
#[derive(Default)]
pub struct MockBlobStore {
    saved: Mutex<Vec<Vec<SignedBlobSidecar>>>,
}

impl MockBlobStore {
    /// Sidecar sets saved so far, one entry per call.
    pub fn saved(&self) -> Vec<Vec<SignedBlobSidecar>> {
        self.saved.lock().clone()
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn save_blob_sidecars(&self, sidecars: &[SignedBlobSidecar]) -> PortResult<()> {
        self.saved.lock().push(sidecars.to_vec());
        Ok(())
    }
}

/// Block import that records received blocks.
#[derive(Default)]
pub struct MockBlockReceiver {
    received: Mutex<Vec<(SignedBeaconBlock, Root)>>,
    fail: AtomicBool,
}

impl MockBlockReceiver {
    /// Blocks imported so far, with their roots.
    pub fn received(&self) -> Vec<(SignedBeaconBlock, Root)> {
        self.received.lock().clone()
    }

    /// Make import fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlockReceiver for MockBlockReceiver {
    async fn receive_block(&self, block: SignedBeaconBlock, root: Root) -> PortResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PortError::Other("block failed state transition".into()));
        }
        self.received.lock().push((block, root));
        Ok(())
    }
}

/// Event feed that records published events.
#[derive(Default)]
pub struct MockEventPublisher {
    events: Mutex<Vec<BlockReceivedEvent>>,
}

impl MockEventPublisher {
    /// Events published so far.
    pub fn events(&self) -> Vec<BlockReceivedEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl EventPublisher for MockEventPublisher {
    async fn publish(&self, event: BlockReceivedEvent) -> PortResult<()> {
        self.events.lock().push(event);
        Ok(())
    }
}

// =============================================================================
// HARNESS
// =============================================================================

/// One mock per collaborator, wired into [`ProposerDependencies`].
pub struct TestHarness {
    /// Head, fork choice and sync status
    pub chain: Arc<MockChain>,
    /// State transition
    pub transition: Arc<MockStateTransition>,
    /// Eth1 chain (no blocks)
    pub eth1: Arc<MockEth1Fetcher>,
    /// Deposit log
    pub deposits: Arc<MockDepositFetcher>,
    /// Deposit pool
    pub deposit_pool: Arc<MockPool<Deposit>>,
    /// Attestation pool
    pub attestation_pool: Arc<MockPool<Attestation>>,
    /// Proposer slashing pool
    pub proposer_slashing_pool: Arc<MockPool<ProposerSlashing>>,
    /// Attester slashing pool
    pub attester_slashing_pool: Arc<MockPool<AttesterSlashing>>,
    /// Voluntary exit pool
    pub exit_pool: Arc<MockPool<SignedVoluntaryExit>>,
    /// BLS-to-execution change pool
    pub bls_change_pool: Arc<MockPool<SignedBlsToExecutionChange>>,
    /// Sync contribution pool
    pub sync_aggregates: Arc<MockSyncAggregateSource>,
    /// Execution engine
    pub execution: Arc<MockExecutionEngine>,
    /// Builder relay
    pub builder: Arc<MockBuilder>,
    /// Gossip
    pub broadcaster: Arc<MockBroadcaster>,
    /// Blob storage
    pub blob_store: Arc<MockBlobStore>,
    /// Block import
    pub block_receiver: Arc<MockBlockReceiver>,
    /// Event feed
    pub events: Arc<MockEventPublisher>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self {
            chain: Arc::new(MockChain::default()),
            transition: Arc::new(MockStateTransition::default()),
            eth1: Arc::new(MockEth1Fetcher::new(TEST_GENESIS_TIME, Vec::new())),
            deposits: Arc::new(MockDepositFetcher::default()),
            deposit_pool: Arc::default(),
            attestation_pool: Arc::default(),
            proposer_slashing_pool: Arc::default(),
            attester_slashing_pool: Arc::default(),
            exit_pool: Arc::default(),
            bls_change_pool: Arc::default(),
            sync_aggregates: Arc::new(MockSyncAggregateSource::default()),
            execution: Arc::new(MockExecutionEngine::default()),
            builder: Arc::new(MockBuilder::default()),
            broadcaster: Arc::new(MockBroadcaster::default()),
            blob_store: Arc::new(MockBlobStore::default()),
            block_receiver: Arc::new(MockBlockReceiver::default()),
            events: Arc::new(MockEventPublisher::default()),
        }
    }
}

impl TestHarness {
    /// Fresh mocks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collaborators for a [`crate::service::ProposerService`].
    pub fn dependencies(&self) -> ProposerDependencies {
        ProposerDependencies {
            sync: self.chain.clone(),
            chain: self.chain.clone(),
            fork_choice: self.chain.clone(),
            transition: self.transition.clone(),
            eth1: self.eth1.clone(),
            deposits: self.deposits.clone(),
            pools: OperationPools {
                deposits: self.deposit_pool.clone(),
                attestations: self.attestation_pool.clone(),
                proposer_slashings: self.proposer_slashing_pool.clone(),
                attester_slashings: self.attester_slashing_pool.clone(),
                voluntary_exits: self.exit_pool.clone(),
                bls_to_execution_changes: self.bls_change_pool.clone(),
                sync_aggregates: self.sync_aggregates.clone(),
            },
            execution: self.execution.clone(),
            builder: self.builder.clone(),
            broadcaster: self.broadcaster.clone(),
            blob_store: self.blob_store.clone(),
            block_receiver: self.block_receiver.clone(),
            events: self.events.clone(),
        }
    }
}
