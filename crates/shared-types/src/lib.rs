//! # Shared Types Crate
//!
//! Consensus primitives, containers and network constants used by every
//! beacon-node crate.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: Wire-level containers are defined once, here.
//! - **Plain Values**: Containers own their data and are `Clone`, so they can be
//!   moved into concurrent tasks without sharing.
//! - **Fork Additions Are Optional**: Execution fields introduced by later forks
//!   are `Option`s; block-level fork shapes live in the block-production crate.

pub mod chain_spec;
pub mod entities;
pub mod errors;
pub mod primitives;
pub mod state;

pub use chain_spec::*;
pub use entities::*;
pub use errors::*;
pub use primitives::*;
pub use state::BeaconState;

pub use primitive_types::{H160, H256, U256};
