//! # Beacon Block Production
//!
//! **Bounded Context:** Block proposal and validator duties
//! **Architecture:** Hexagonal (domain / ports / service)
//!
//! ## Purpose
//!
//! Produces beacon blocks for validator clients and accepts them back once
//! signed:
//! - Eth1 majority-vote data for the block body
//! - Builder admission through a missed-slot circuit breaker
//! - Fork-typed block assembly with local or builder payloads
//! - Attestation data behind a single-entry cache
//! - Sync committee subnet registration
//!
//! ## Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │  Service                                            │
//! │  - ProposerService: produce, accept, attest, sync   │
//! └─────────────────────────────────────────────────────┘
//!                         │
//! ┌─────────────────────────────────────────────────────┐
//! │  Ports                                              │
//! │  - Inbound: ProposerApi                             │
//! │  - Outbound: ChainInfo, ForkChoice, StateTransition,│
//! │    Eth1Fetcher, OperationPool, ExecutionEngine,     │
//! │    BuilderClient, Broadcaster, BlobStore, ...       │
//! └─────────────────────────────────────────────────────┘
//!                         │
//! ┌─────────────────────────────────────────────────────┐
//! │  Domain (pure)                                      │
//! │  - BlockDraft, DraftStage, payload selection,       │
//! │    blob sidecars, attestation cache, subnet registry│
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`domain`]: block shapes, payload selection, shared caches
//! - [`ports`]: inbound API and outbound collaborators
//! - [`service`]: the proposer service wiring it together
//! - [`eth1_vote`]: eth1 data vote oracle
//! - [`admission`]: builder circuit breaker

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod admission;
pub mod domain;
pub mod eth1_vote;
pub mod events;
pub mod ports;
pub mod service;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

mod config;
mod error;
mod metrics;

pub use admission::{circuit_breaker_tripped, Admission, BuilderAdmissionController};
pub use config::{
    BlockProductionConfig, BuildMode, BuilderConfig, Eth1Config, DEFAULT_BUILDER_BOOST_FACTOR,
};
pub use error::{BlockProductionError, BuilderError, ErrorKind, PortError, Result};
pub use eth1_vote::{zero_hash_vote, Eth1VoteOracle};
pub use metrics::Metrics;

pub use domain::{
    AttestationCacheEntry, AttestationDataCache, BlockContents, BlockDraft, ForkName,
    RegistrationOutcome, SignedBeaconBlock, SignedBlockContents, SubnetSubscription,
    SyncSubnetRegistration, SyncSubnetRegistry,
};

pub use ports::{
    ProduceBlockRequest, ProducedBlock, ProposerApi, SyncCommitteeSubscription, TimeSource,
};

pub use events::BlockReceivedEvent;

pub use service::{OperationPools, ProposerDependencies, ProposerService};
