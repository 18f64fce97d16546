//! Domain layer - Pure logic for block production
//!
//! Nothing here talks to a collaborator. The two shared structures (the
//! attestation data cache and the sync subnet registry) carry their own
//! locking; everything else is call-scoped.
//!
//! ## Blocks
//!
//! - [`ForkName`]: fork schedule lookup by epoch
//! - [`BlockDraft`]: closed union of the five fork-specific block shapes
//! - [`DraftStage`]: ordered assembly stages
//! - [`ConsensusFields`] / [`ExecutionFields`]: partial bodies merged after
//!   the parallel join
//!
//! ## Payloads
//!
//! - [`validate_bid`] / [`select_payload`]: builder bid checks and the
//!   local-versus-builder comparison
//! - [`blob_sidecars`] / [`blinded_blob_sidecars`] / [`unblind_sidecars`]
//!
//! ## Shared state
//!
//! - [`AttestationDataCache`]: single-entry, double-checked
//! - [`SyncSubnetRegistry`]: expiring subnet subscriptions

pub mod assembly;
pub mod attestation_cache;
pub mod block;
pub mod execution;
pub mod fork;
pub mod sidecars;
pub mod sync_subnets;

pub use assembly::{BlobsData, ConsensusFields, DraftStage, ExecutionFields};
pub use attestation_cache::{AttestationCacheEntry, AttestationDataCache, CacheOutcome};
pub use block::{
    AltairBody, BeaconBlock, BellatrixBody, BlockBody, BlockContents, BlockDraft, CapellaBody,
    DenebBody, ExecutionField, Phase0Body, SignedBeaconBlock, SignedBlockContents,
};
pub use execution::{
    select_payload, validate_bid, BidError, BidExpectations, BuilderBid, LocalPayload,
    PayloadSource, Selection, SelectionPolicy, SignedBuilderBid,
};
pub use fork::ForkName;
pub use sidecars::{blinded_blob_sidecars, blob_sidecars, unblind_sidecars};
pub use sync_subnets::{
    subnets_from_committee, RegistrationOutcome, SubnetSubscription, SyncSubnetRegistration,
    SyncSubnetRegistry,
};
