//! Outbound ports (driven side - SPI)
//!
//! Collaborators the proposer consumes: fork choice, the state transition,
//! the eth1 and deposit fetchers, operation pools, the execution engine, the
//! builder network, gossip and storage.

use crate::domain::{BlockDraft, ForkName, LocalPayload, SignedBeaconBlock, SignedBuilderBid};
use crate::error::{BuilderError, PortError};
use crate::events::BlockReceivedEvent;
use async_trait::async_trait;
use shared_types::{
    BeaconState, BlobsBundle, BlsPublicKey, Eth1Data, ExecutionPayload, Hash32, Root,
    SignedBlindedBlobSidecar, SignedBlobSidecar, Slot, SyncAggregate, ValidatorIndex,
    ValidatorRegistration,
};

/// Result type returned by collaborators.
pub type PortResult<T> = std::result::Result<T, PortError>;

/// Port: Node sync status
pub trait SyncChecker: Send + Sync {
    /// Whether the node is still catching up to the network head
    fn is_syncing(&self) -> bool;
}

/// Port: Head block and state lookups
#[async_trait]
pub trait ChainInfo: Send + Sync {
    /// Beacon chain genesis time (unix seconds)
    fn genesis_time(&self) -> u64;

    /// Root of the current head block
    async fn head_root(&self) -> PortResult<Root>;

    /// Post-state of the current head block
    async fn head_state(&self) -> PortResult<BeaconState>;

    /// Post-state of the block with `root`
    async fn state_by_root(&self, root: Root) -> PortResult<BeaconState>;

    /// Whether the head is only optimistically imported
    async fn is_optimistic(&self) -> PortResult<bool>;
}

/// Port: Fork choice store
#[async_trait]
pub trait ForkChoice: Send + Sync {
    /// Recompute the head
    async fn update_head(&self) -> PortResult<()>;

    /// Head root as of the last update
    fn cached_head_root(&self) -> Root;

    /// Parent to build on at `slot`; differs from the head when a late
    /// head block should be re-orged out
    async fn proposer_head(&self, slot: Slot) -> Root;

    /// Highest slot of any block received
    fn highest_received_block_slot(&self) -> Slot;

    /// Blocks received over the last epoch of slots
    fn received_blocks_last_epoch(&self) -> PortResult<u64>;
}

/// Port: State transition function
#[async_trait]
pub trait StateTransition: Send + Sync {
    /// Advance `state` through empty slots up to `slot`
    async fn process_slots(&self, state: BeaconState, slot: Slot) -> PortResult<BeaconState>;

    /// Precomputed state of `parent_root` advanced to `slot`, if available
    async fn cached_next_slot_state(&self, _parent_root: Root, _slot: Slot) -> Option<BeaconState> {
        None
    }

    /// Proposer of the state's slot
    fn proposer_index(&self, state: &BeaconState) -> PortResult<ValidatorIndex>;

    /// Post-state root of applying `block` to `state`, signature checks off
    async fn compute_state_root(&self, state: &BeaconState, block: &BlockDraft) -> PortResult<Root>;
}

/// Eth1 block summary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Eth1BlockHeader {
    /// Block height
    pub number: u64,
    /// Block timestamp (unix seconds)
    pub timestamp: u64,
}

/// Port: Eth1 chain reader
#[async_trait]
pub trait Eth1Fetcher: Send + Sync {
    /// Whether the eth1 endpoint is reachable
    fn is_connected(&self) -> bool;

    /// Beacon genesis time as derived from the eth1 genesis block
    fn eth2_genesis_time(&self) -> u64;

    /// Latest block with timestamp at or before `timestamp`
    async fn block_by_timestamp(&self, timestamp: u64) -> PortResult<Eth1BlockHeader>;

    /// Hash of the block at `height`
    async fn block_hash_by_height(&self, height: u64) -> PortResult<Hash32>;
}

/// Port: Deposit contract log reader
#[async_trait]
pub trait DepositFetcher: Send + Sync {
    /// Deposit count and deposit root as of eth1 block `height`
    async fn deposits_number_and_root_at_height(&self, height: u64) -> PortResult<(u64, Root)>;

    /// Eth1 data the chain started from
    fn chain_start_eth1_data(&self) -> Eth1Data;
}

/// Inputs an operation pool needs to pick valid entries.
#[derive(Clone, Copy, Debug)]
pub struct PackContext<'a> {
    /// Pre-state advanced to the proposal slot
    pub state: &'a BeaconState,
    /// Eth1 vote of the block being built
    pub eth1_data: &'a Eth1Data,
}

/// Port: Pool of pending operations of type `T`
#[async_trait]
pub trait OperationPool<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// Valid entries for a block on `ctx.state`, at most `max`
    async fn pack(&self, ctx: &PackContext<'_>, max: u64) -> PortResult<Vec<T>>;

    /// Drop entries included in an imported block
    async fn remove(&self, included: &[T]) -> PortResult<()>;
}

/// Port: Sync committee contribution pool
#[async_trait]
pub trait SyncAggregateSource: Send + Sync {
    /// Best aggregate over contributions for `slot - 1` on `parent_root`
    async fn sync_aggregate(&self, slot: Slot, parent_root: Root) -> PortResult<SyncAggregate>;
}

/// Inputs for a local payload.
#[derive(Clone, Debug)]
pub struct PayloadRequest {
    /// Proposal slot
    pub slot: Slot,
    /// Proposal fork
    pub fork: ForkName,
    /// Slot start time (unix seconds)
    pub timestamp: u64,
    /// Head execution block hash
    pub parent_hash: Hash32,
    /// Proposer index
    pub proposer_index: ValidatorIndex,
}

/// Port: Local execution engine
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Build (or fetch the prepared) payload for `request`
    async fn get_local_payload(&self, request: &PayloadRequest) -> PortResult<LocalPayload>;
}

/// Payload revealed by a builder for a signed blinded block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnblindedPayload {
    /// Full payload
    pub payload: ExecutionPayload,
    /// Blobs, Deneb onward
    pub blobs_bundle: Option<BlobsBundle>,
}

/// Port: Builder network (relay) client
#[async_trait]
pub trait BuilderClient: Send + Sync {
    /// Whether a builder endpoint is configured
    fn is_configured(&self) -> bool;

    /// Builder registration of `index`
    async fn registration(&self, index: ValidatorIndex) -> Result<ValidatorRegistration, BuilderError>;

    /// Best bid for `slot` on `parent_hash`
    async fn get_header(
        &self,
        slot: Slot,
        parent_hash: Hash32,
        pubkey: BlsPublicKey,
    ) -> Result<SignedBuilderBid, BuilderError>;

    /// Exchange a signed blinded block for its payload
    async fn submit_blinded_block(
        &self,
        block: &SignedBeaconBlock,
        sidecars: &[SignedBlindedBlobSidecar],
    ) -> Result<UnblindedPayload, BuilderError>;
}

/// Port: Gossip publisher
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Publish a block on the block topic
    async fn broadcast_block(&self, block: &SignedBeaconBlock) -> PortResult<()>;

    /// Publish a sidecar on blob subnet `subnet`
    async fn broadcast_blob_sidecar(&self, subnet: u64, sidecar: &SignedBlobSidecar) -> PortResult<()>;
}

/// Port: Blob sidecar storage
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist sidecars of one block
    async fn save_blob_sidecars(&self, sidecars: &[SignedBlobSidecar]) -> PortResult<()>;
}

/// Port: Block import
#[async_trait]
pub trait BlockReceiver: Send + Sync {
    /// Run the state transition on `block` and add it to fork choice
    async fn receive_block(&self, block: SignedBeaconBlock, root: Root) -> PortResult<()>;
}

/// Port: Operation feed
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Notify subscribers of a proposed block
    async fn publish(&self, event: BlockReceivedEvent) -> PortResult<()>;
}

/// Port: Wall clock
pub trait TimeSource: Send + Sync {
    /// Milliseconds since the unix epoch
    fn now_millis(&self) -> u64;
}

/// Wall clock backed by `chrono`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_millis(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
    }
}
